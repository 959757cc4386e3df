//! HTTP surface over the router.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, RouterError};
use crate::normalize::CanonicalImageResult;
use crate::ports::GenerationRequest;
use crate::router::Router;

/// Header consulted when the body carries no requester id.
const REQUESTER_HEADER: &str = "x-requester-id";

#[derive(Debug, Deserialize)]
struct GenerateImageBody {
    #[serde(default)]
    prompt: String,
    #[serde(default, alias = "identity_image")]
    identity_image_url: Option<String>,
    #[serde(default)]
    requester_id: Option<String>,
    #[serde(default)]
    high_quality: bool,
}

#[derive(Debug, Serialize)]
struct GenerateImageResponse {
    image_url: CanonicalImageResult,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    providers: Vec<String>,
}

/// Router errors rendered as HTTP responses.
struct ApiError(RouterError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RouterError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RouterError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RouterError::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RouterError::AllProvidersFailed { .. } => StatusCode::BAD_GATEWAY,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            providers: self.0.attempted_providers().iter().map(ToString::to_string).collect(),
        };

        let mut response = (status, Json(body)).into_response();
        if let RouterError::RateLimited { retry_after } = &self.0 {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Build the HTTP application.
pub fn app(router: Arc<Router>) -> axum::Router {
    axum::Router::new()
        .route("/generate-image", post(generate_image))
        .route("/health", get(health))
        .with_state(router)
}

async fn generate_image(
    State(router): State<Arc<Router>>,
    headers: HeaderMap,
    Json(body): Json<GenerateImageBody>,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    let requester_id = body.requester_id.or_else(|| {
        headers.get(REQUESTER_HEADER).and_then(|v| v.to_str().ok()).map(String::from)
    });
    let request = GenerationRequest {
        prompt: body.prompt,
        identity_image: body.identity_image_url.filter(|s| !s.trim().is_empty()),
        high_quality: body.high_quality,
        requester_id,
    };

    let image_url = router.generate(&request).await.map_err(ApiError)?;
    Ok(Json(GenerateImageResponse { image_url }))
}

async fn health() -> &'static str {
    "ok"
}

/// Serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(router: Arc<Router>, bind: &str) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app(router))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NoResultReason, ProviderError};
    use crate::ports::image_provider::{AttemptFuture, ImageProvider, ProviderAttemptOutcome, ProviderKind};
    use crate::router::{PolicyRejection, ProviderSet, RouterSettings};
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    struct Fixed(ProviderKind, ProviderAttemptOutcome);

    impl ImageProvider for Fixed {
        fn kind(&self) -> ProviderKind {
            self.0
        }

        fn attempt<'a>(&'a self, _: &'a str, _: Option<&'a str>) -> AttemptFuture<'a> {
            Box::pin(async move { self.1.clone() })
        }
    }

    fn app_with(primary: ProviderAttemptOutcome) -> axum::Router {
        app_with_settings(primary, &RouterSettings::default())
    }

    fn app_with_settings(primary: ProviderAttemptOutcome, settings: &RouterSettings) -> axum::Router {
        let providers = ProviderSet {
            primary: Box::new(Fixed(ProviderKind::PrimaryDiffusion, primary)),
            identity: Box::new(Fixed(
                ProviderKind::IdentityPreserving,
                ProviderAttemptOutcome::NoResult(NoResultReason::MissingIdentityImage),
            )),
            controlnet: Box::new(Fixed(
                ProviderKind::ControlNetStyle,
                ProviderAttemptOutcome::NoResult(NoResultReason::MissingApiKey),
            )),
        };
        app(Arc::new(Router::new(providers, settings)))
    }

    fn post_json(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/generate-image")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn generates_image_url() {
        let app = app_with(ProviderAttemptOutcome::Success("http://img.example/a.png".into()));

        let response =
            app.oneshot(post_json(&serde_json::json!({"prompt": "a red bicycle"}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["image_url"], "https://img.example/a.png");
    }

    #[tokio::test]
    async fn empty_prompt_is_bad_request() {
        let app = app_with(ProviderAttemptOutcome::Success("https://a".into()));
        let response = app.oneshot(post_json(&serde_json::json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_request_is_throttled_with_retry_after() {
        let app = app_with(ProviderAttemptOutcome::Success("https://a".into()));
        let body = serde_json::json!({"prompt": "a cat", "requester_id": "u-1"});

        let first = app.clone().oneshot(post_json(&body)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(post_json(&body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = second.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
        assert!((1..=10).contains(&retry_after));
    }

    #[tokio::test]
    async fn requester_header_is_used_as_fallback() {
        let app = app_with(ProviderAttemptOutcome::Success("https://a".into()));
        let request = |id: &str| {
            Request::builder()
                .method("POST")
                .uri("/generate-image")
                .header("content-type", "application/json")
                .header(REQUESTER_HEADER, id)
                .body(Body::from(r#"{"prompt": "a cat"}"#))
                .unwrap()
        };

        assert_eq!(app.clone().oneshot(request("a")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(app.clone().oneshot(request("b")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(app.oneshot(request("a")).await.unwrap().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn total_failure_is_bad_gateway_with_providers() {
        let app = app_with(ProviderAttemptOutcome::Failure(ProviderError::Transient {
            status: Some(500),
            message: "down".into(),
        }));

        let response = app.oneshot(post_json(&serde_json::json!({"prompt": "a cat"}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(
            body["providers"],
            serde_json::json!(["primary_diffusion", "identity_preserving", "controlnet_style"])
        );
    }

    #[tokio::test]
    async fn aborted_policy_rejection_is_unprocessable() {
        let settings =
            RouterSettings { on_policy_rejection: PolicyRejection::Abort, ..RouterSettings::default() };
        let app = app_with_settings(
            ProviderAttemptOutcome::Failure(ProviderError::Policy {
                status: Some(400),
                message: "content_policy_violation".into(),
            }),
            &settings,
        );

        let response = app.oneshot(post_json(&serde_json::json!({"prompt": "a cat"}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Rejected by primary_diffusion: content_policy_violation");
        assert!(body.get("providers").is_none());
    }

    #[tokio::test]
    async fn health_check() {
        let app = app_with(ProviderAttemptOutcome::Success("https://a".into()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
