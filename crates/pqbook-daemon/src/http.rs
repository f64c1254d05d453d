//! HTTP transport for the admission pipeline.
//!
//! # Routes
//!
//! - `GET /api/messages`: all admitted messages, newest first
//! - `POST /api/post`: submit a signed message
//! - `OPTIONS /api/post`: CORS preflight
//! - `GET /health`: liveness and ledger size
//!
//! Every other path is served from the static asset directory. API
//! responses carry the security and CORS headers; rejections are
//! mapped to a status code and a `{"error", "message"}` JSON body.

use std::path::Path;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    USER_AGENT,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pqbook_node::pipeline::SubmissionPipeline;
use pqbook_types::{PqbookError, StoredMessage, Submission};
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Body returned for an accepted submission.
pub const ACCEPTED_STATUS: &str = "quantum-safe post accepted";

/// Headers attached to every API response.
const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "no-referrer"),
    (
        "permissions-policy",
        "geolocation=(), microphone=(), camera=()",
    ),
];

// ---------------------------------------------------------------------------
// State and router
// ---------------------------------------------------------------------------

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SubmissionPipeline>,
    pub allowed_origin: HeaderValue,
}

/// Builds the full application router.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    let max_body = state.pipeline.config().max_request_bytes;

    let api = Router::new()
        .route("/api/messages", get(list_messages))
        .route("/api/post", post(submit_post).options(preflight))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(middleware::from_fn_with_state(state.clone(), api_headers))
        .with_state(state);

    Router::new()
        .merge(api)
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_messages(
    State(state): State<AppState>,
) -> Result<Json<Vec<Arc<StoredMessage>>>, ApiError> {
    Ok(Json(state.pipeline.ledger().list_all()?))
}

async fn submit_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut submission: Submission =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadJson(e.to_string()))?;

    if submission.client.user_agent.is_none() {
        submission.client.user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
    }

    // ML-DSA verification is CPU-bound; keep it off the async workers.
    let pipeline = Arc::clone(&state.pipeline);
    tokio::task::spawn_blocking(move || pipeline.submit(&submission))
        .await
        .map_err(|e| PqbookError::Internal {
            reason: format!("submission task failed: {e}"),
        })??;

    Ok(Json(json!({ "status": ACCEPTED_STATUS })))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "messages": state.pipeline.ledger().len(),
    }))
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Adds security and CORS headers to API responses.
async fn api_headers(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, state.allowed_origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, User-Agent"),
    );

    response
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Handler error: an admission outcome or an undecodable body.
#[derive(Debug)]
pub enum ApiError {
    Rejected(PqbookError),
    BadJson(String),
}

impl From<PqbookError> for ApiError {
    fn from(e: PqbookError) -> Self {
        Self::Rejected(e)
    }
}

/// HTTP status for each admission outcome.
pub fn status_for(err: &PqbookError) -> StatusCode {
    match err {
        PqbookError::InvalidInput { .. }
        | PqbookError::UnsupportedKeySize { .. }
        | PqbookError::MalformedKey { .. } => StatusCode::BAD_REQUEST,
        PqbookError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        PqbookError::StaleOrFutureTimestamp { .. }
        | PqbookError::ReplayDetected { .. }
        | PqbookError::SignatureInvalid { .. } => StatusCode::UNAUTHORIZED,
        PqbookError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        PqbookError::ConfigError { .. }
        | PqbookError::CryptoError { .. }
        | PqbookError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Rejected(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    tracing::error!(kind = %e.kind(), %e, "request failed");
                }
                let body = json!({ "error": e.kind().as_str(), "message": e.to_string() });
                (status, Json(body)).into_response()
            }
            Self::BadJson(detail) => {
                let body = json!({ "error": "bad_json", "message": detail });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request as HttpRequest};
    use pqbook_crypto::mac::DeviceSecret;
    use pqbook_crypto::signing::SchemeKeypair;
    use pqbook_node::ledger::MessageLedger;
    use pqbook_node::rate_limiter::AdmissionLimiter;
    use pqbook_protocol::canonical::canonicalize;
    use pqbook_protocol::replay::ReplayGuard;
    use pqbook_protocol::validation::{current_time_ms, encode_base64};
    use pqbook_types::config::AdmissionConfig;
    use pqbook_types::SignatureScheme;
    use tower::ServiceExt;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn app_with(config: AdmissionConfig) -> std::result::Result<Router, PqbookError> {
        let limiter = AdmissionLimiter::new(DeviceSecret::from_bytes([0x33; 32]), &config)?;
        let retention = config.replay_retention_ms;
        let pipeline = SubmissionPipeline::new(
            config,
            Arc::new(ReplayGuard::new(retention)),
            Arc::new(limiter),
            Arc::new(MessageLedger::new()),
        )?;
        let state = AppState {
            pipeline: Arc::new(pipeline),
            allowed_origin: HeaderValue::from_static("https://pq-guestbook.fly.dev"),
        };
        Ok(router(state, &PathBuf::from("static-does-not-exist")))
    }

    fn app() -> std::result::Result<Router, PqbookError> {
        app_with(AdmissionConfig::default())
    }

    fn signed_body(kp: &SchemeKeypair, content: &str, ua: Option<&str>) -> std::result::Result<String, PqbookError> {
        let ts = current_time_ms();
        let sig = kp.sign(&canonicalize("ada", content, ts))?;
        let mut body = json!({
            "author": "ada",
            "content": content,
            "ts": ts,
            "algo": kp.scheme().name(),
            "sig": encode_base64(&sig),
            "pubkey": encode_base64(&kp.public_key_bytes()),
        });
        if let Some(ua) = ua {
            body["ua"] = json!(ua);
        }
        Ok(body.to_string())
    }

    fn post_json(body: String) -> std::result::Result<HttpRequest<Body>, axum::http::Error> {
        HttpRequest::builder()
            .method(Method::POST)
            .uri("/api/post")
            .header("content-type", "application/json")
            .body(Body::from(body))
    }

    async fn json_body(response: Response) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn empty_listing_has_security_headers() -> TestResult {
        let response = app()?
            .oneshot(HttpRequest::get("/api/messages").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["referrer-policy"], "no-referrer");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "https://pq-guestbook.fly.dev");
        assert_eq!(json_body(response).await?, json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn accepted_post_is_listed() -> TestResult {
        let app = app()?;
        let kp = SchemeKeypair::generate(SignatureScheme::MlDsa65);

        let response = app
            .clone()
            .oneshot(post_json(signed_body(&kp, "hello over http", Some("agent"))?)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await?, json!({ "status": ACCEPTED_STATUS }));

        let response = app
            .oneshot(HttpRequest::get("/api/messages").body(Body::empty())?)
            .await?;
        let listed = json_body(response).await?;
        assert_eq!(listed[0]["content"], "hello over http");
        assert_eq!(listed[0]["scheme"], "ML-DSA-65");
        Ok(())
    }

    #[tokio::test]
    async fn replayed_post_is_unauthorized() -> TestResult {
        let app = app()?;
        let kp = SchemeKeypair::generate(SignatureScheme::MlDsa44);
        let body = signed_body(&kp, "once", Some("agent"))?;

        let first = app.clone().oneshot(post_json(body.clone())?).await?;
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(post_json(body)?).await?;
        assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(second).await?["error"], "replay_detected");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() -> TestResult {
        let response = app()?.oneshot(post_json("{ nope".into())?).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await?["error"], "bad_json");
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_key_is_bad_request() -> TestResult {
        let body = json!({
            "author": "ada",
            "content": "hi",
            "ts": current_time_ms(),
            "sig": encode_base64(&[0u8; 64]),
            "pubkey": encode_base64(&[0u8; 32]),
        });
        let response = app()?.oneshot(post_json(body.to_string())?).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await?["error"], "unsupported_key_size");
        Ok(())
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() -> TestResult {
        let body = format!(r#"{{"author":"ada","content":"{}"}}"#, "x".repeat(20_000));
        let response = app()?.oneshot(post_json(body)?).await?;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        Ok(())
    }

    #[tokio::test]
    async fn non_get_listing_is_method_not_allowed() -> TestResult {
        let request = HttpRequest::builder()
            .method(Method::DELETE)
            .uri("/api/messages")
            .body(Body::empty())?;
        let response = app()?.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        Ok(())
    }

    #[tokio::test]
    async fn preflight_advertises_cors() -> TestResult {
        let request = HttpRequest::builder()
            .method(Method::OPTIONS)
            .uri("/api/post")
            .body(Body::empty())?;
        let response = app()?.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, User-Agent"
        );
        Ok(())
    }

    #[tokio::test]
    async fn user_agent_header_feeds_quota_when_body_omits_ua() -> TestResult {
        let app = app_with(AdmissionConfig {
            burst_capacity: 1.0,
            ..AdmissionConfig::default()
        })?;

        let send = |kp: &SchemeKeypair, content: &str, agent: &str| -> std::result::Result<HttpRequest<Body>, Box<dyn std::error::Error>> {
            let mut request = post_json(signed_body(kp, content, None)?)?;
            request
                .headers_mut()
                .insert(USER_AGENT, HeaderValue::from_str(agent)?);
            Ok(request)
        };

        let a = SchemeKeypair::generate(SignatureScheme::MlDsa44);
        let b = SchemeKeypair::generate(SignatureScheme::MlDsa44);

        let first = app.clone().oneshot(send(&a, "one", "browser-1")?).await?;
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.clone().oneshot(send(&b, "two", "browser-1")?).await?;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(second).await?["error"], "quota_exceeded");

        let third = app.oneshot(send(&b, "two", "browser-2")?).await?;
        assert_eq!(third.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_ledger_size() -> TestResult {
        let response = app()?
            .oneshot(HttpRequest::get("/health").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await?, json!({ "status": "ok", "messages": 0 }));
        Ok(())
    }

    #[test]
    fn status_mapping_follows_outcome_kind() {
        let cases = [
            (PqbookError::InvalidInput { reason: String::new() }, 400),
            (PqbookError::PayloadTooLarge { reason: String::new() }, 413),
            (PqbookError::StaleOrFutureTimestamp { drift_ms: 1, window_ms: 0 }, 401),
            (PqbookError::ReplayDetected { reason: String::new() }, 401),
            (PqbookError::UnsupportedKeySize { len: 1 }, 400),
            (PqbookError::MalformedKey { reason: String::new() }, 400),
            (PqbookError::SignatureInvalid { reason: String::new() }, 401),
            (PqbookError::QuotaExceeded, 429),
            (PqbookError::Internal { reason: String::new() }, 500),
        ];
        for (err, code) in cases {
            assert_eq!(status_for(&err).as_u16(), code, "{err}");
        }
    }
}
