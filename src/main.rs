//! Dreamforge - image generation backend with multi-provider fallback.

mod adapters;
mod cassette;
mod cli;
mod config;
mod context;
mod error;
mod normalize;
mod output;
mod ports;
mod rate_limit;
mod router;
mod server;

use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, GenerateArgs};
use crate::config::Config;
use crate::context::{RecordingSession, ServiceContext};
use crate::error::AppError;
use crate::output::{fetch_bytes, resolve_output_path, save_image};
use crate::ports::GenerationRequest;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` wins over the verbosity flag.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config_path = config::discover_config_path(cli.config.as_deref());
    let config = Config::load(&config_path).map_err(AppError::Config)?;
    tracing::debug!("config: {}", config_path.display());

    match cli.command {
        Command::Generate(args) => {
            // Validate input before any cassette or provider is touched
            let prompt = args.resolve_prompt()?;
            let (ctx, session) = build_context(&config)?;
            let result = generate(&ctx, &args, prompt).await;
            finish_recording(session);
            result
        }
        Command::Serve(args) => {
            let (ctx, session) = build_context(&config)?;
            let result = server::serve(Arc::clone(&ctx.router), &args.bind).await;
            finish_recording(session);
            result
        }
    }
}

fn finish_recording(session: Option<RecordingSession>) {
    if let Some(session) = session {
        match session.finish() {
            Ok(path) => eprintln!("Cassette saved: {}", path.display()),
            Err(e) => eprintln!("Warning: failed to save cassette: {e}"),
        }
    }
}

/// Pick live, recording, or replaying providers from the environment.
fn build_context(config: &Config) -> Result<(ServiceContext, Option<RecordingSession>), AppError> {
    let replay_path = std::env::var("DREAMFORGE_REPLAY").ok();
    let is_recording = std::env::var("DREAMFORGE_REC").is_ok_and(|v| v == "true" || v == "1");

    if let Some(ref cassette_path) = replay_path {
        tracing::info!("replaying from {cassette_path}");
        Ok((ServiceContext::replaying(Path::new(cassette_path), config)?, None))
    } else if is_recording {
        tracing::info!("recording mode enabled");
        let (ctx, session) = ServiceContext::recording(config)?;
        Ok((ctx, Some(session)))
    } else {
        Ok((ServiceContext::live(config)?, None))
    }
}

async fn generate(ctx: &ServiceContext, args: &GenerateArgs, prompt: String) -> Result<(), AppError> {
    let mut request = GenerationRequest::new(prompt).with_high_quality(args.high_quality);
    request.identity_image = args.identity_image.clone();
    request.requester_id = args.requester.clone();

    let image = ctx.router.generate(&request).await?;
    println!("{image}");

    if args.wants_file() {
        let (bytes, mime_type) = fetch_bytes(&ctx.client, &image).await?;
        let path = resolve_output_path(args.output.as_deref(), &request.prompt, &mime_type);
        save_image(&bytes, &mime_type, &path)?;
        eprintln!("Saved: {}", path.display());
    }

    Ok(())
}
