//! Per-requester cooldown gate.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::RouterError;

/// Default cooldown between accepted requests from one requester.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// Default number of requesters tracked before expired ones are evicted.
pub const DEFAULT_CAPACITY: usize = 10_000;

const SHARDS: usize = 16;

/// Tracks when each requester was last admitted.
///
/// State is split across independently locked shards, so check-and-record is
/// atomic for one requester while different requesters rarely contend. Each
/// shard is ordered by admission time and holds its share of the capacity.
/// A full shard only drops requesters whose window has expired; while every
/// tracked requester is still cooling down the shard grows past its share.
pub struct RateLimiter {
    window: Duration,
    per_shard: usize,
    hasher: RandomState,
    shards: Vec<Mutex<LruCache<String, Instant>>>,
}

impl RateLimiter {
    /// Create a limiter with the given cooldown window and capacity.
    #[must_use]
    pub fn new(window: Duration, capacity: usize) -> Self {
        let per_shard = capacity.div_ceil(SHARDS).max(1);
        let shards = (0..SHARDS).map(|_| Mutex::new(LruCache::unbounded())).collect();
        Self { window, per_shard, hasher: RandomState::new(), shards }
    }

    /// Admit `requester_id` at `now`, or report how long it must wait.
    ///
    /// A rejected call leaves the recorded timestamp untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::RateLimited`] while inside the cooldown window.
    pub fn check_and_record(&self, requester_id: &str, now: Instant) -> Result<(), RouterError> {
        let mut shard = self.shard(requester_id).lock();

        // peek keeps LRU order equal to admission order
        if let Some(last) = shard.peek(requester_id).copied() {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.window {
                return Err(RouterError::RateLimited { retry_after: self.window - elapsed });
            }
        } else {
            self.evict_expired(&mut shard, now);
        }

        shard.put(requester_id.to_string(), now);
        Ok(())
    }

    /// Make room in a full shard by dropping requesters out of their window.
    fn evict_expired(&self, shard: &mut LruCache<String, Instant>, now: Instant) {
        while shard.len() >= self.per_shard {
            let expired = shard
                .peek_lru()
                .is_some_and(|(_, last)| now.saturating_duration_since(*last) >= self.window);
            if !expired {
                break;
            }
            shard.pop_lru();
        }
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    fn shard(&self, requester_id: &str) -> &Mutex<LruCache<String, Instant>> {
        #[allow(clippy::cast_possible_truncation)]
        let index = (self.hasher.hash_one(requester_id) as usize) % self.shards.len();
        &self.shards[index]
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, DEFAULT_CAPACITY)
    }
}
