//! HTTP surface: `POST /api/analyze` and `GET /health`.
//!
//! ```text
//! multipart ──▶ validate ──▶ stage ──▶ extract ─┐
//!   (size, extension)   (temp files)  (pdfium)  ├──▶ analyze (deadline) ──▶ envelope
//!                                   digest ─────┘
//! ```
//!
//! Uploads are validated while they stream in: a file past the size ceiling
//! is rejected before it is fully read, and nothing touches the disk until
//! both fields have passed. Temp files are dropped with the handler, on every
//! exit path.

use crate::analyze::{demographic_digest, demographics_used, run_with_deadline, AnalysisRequest, PolicyAnalyzer};
use crate::config::{CorsOrigins, ServerConfig};
use crate::error::PolicyLensError;
use crate::output::{AnalysisOutcome, AnalysisResponse, ErrorCategory};
use crate::pipeline::demographics::NO_DATA_PROVIDED;
use crate::pipeline::extract::{PdfiumExtractor, TextExtractor};
use crate::pipeline::input::{self, check_size, validate_extension, Upload, UploadField};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const SERVICE_NAME: &str = "PolicyLens API";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

const QUOTA_DETAIL: &str =
    "API quota exceeded. Please wait a moment and try again, or check your API plan and billing details.";

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    /// `None` when the model gateway failed to initialize.
    analyzer: Option<Arc<PolicyAnalyzer>>,
    startup_error: Option<String>,
    extractor: Arc<dyn TextExtractor>,
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(analyzer: Arc<PolicyAnalyzer>, config: ServerConfig) -> Self {
        Self {
            analyzer: Some(analyzer),
            startup_error: None,
            extractor: Arc::new(PdfiumExtractor),
            config: Arc::new(config),
        }
    }

    /// State for a server whose gateway could not be built. `/health`
    /// reports the error and analysis requests get 503.
    pub fn unavailable(error: impl Into<String>, config: ServerConfig) -> Self {
        Self {
            analyzer: None,
            startup_error: Some(error.into()),
            extractor: Arc::new(PdfiumExtractor),
            config: Arc::new(config),
        }
    }

    /// Replace the policy text extractor (pdfium by default).
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Build state from a gateway construction result.
    pub fn from_analyzer(
        analyzer: Result<PolicyAnalyzer, PolicyLensError>,
        config: ServerConfig,
    ) -> Self {
        match analyzer {
            Ok(a) => Self::new(Arc::new(a), config),
            Err(e) => {
                error!("Model gateway unavailable: {}", e);
                Self::unavailable(e.to_string(), config)
            }
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// JSON error body: `{detail, error_code}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub error_code: String,
}

/// An HTTP error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            error_code: format!("HTTP_{}", status.as_u16()),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "An internal server error occurred".into(),
            error_code: "INTERNAL_ERROR".into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PolicyLensError> for ApiError {
    fn from(err: PolicyLensError) -> Self {
        if err.is_client_error() {
            warn!("Rejected request: {}", err);
            return ApiError::new(StatusCode::BAD_REQUEST, err.to_string());
        }
        match err {
            PolicyLensError::AnalysisTimeout { .. } => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, err.to_string())
            }
            PolicyLensError::ProviderNotConfigured { .. } => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            other => {
                error!("Internal error: {}", other);
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.detail,
            error_code: self.error_code,
        };
        (self.status, Json(body)).into_response()
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        CorsOrigins::List(list) => {
            let parsed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin '{}'", o);
                        None
                    }
                })
                .collect();
            layer.allow_origin(parsed)
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    // Two files plus multipart framing.
    let body_limit = state
        .config
        .max_file_size
        .saturating_mul(2)
        .saturating_add(1024 * 1024);
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/analyze", post(analyze_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> Result<(), PolicyLensError> {
    let addr = state.config.socket_addr();
    let router = build_router(state);

    info!("Starting {} v{} on {}", SERVICE_NAME, SERVICE_VERSION, addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PolicyLensError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, router)
        .await
        .map_err(|e| PolicyLensError::Internal(format!("Server error: {}", e)))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> Response {
    match &state.startup_error {
        None => Json(json!({
            "status": "healthy",
            "service": SERVICE_NAME,
            "version": SERVICE_VERSION,
        }))
        .into_response(),
        Some(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy", "error": err})),
        )
            .into_response(),
    }
}

#[derive(Debug, Default)]
struct Uploads {
    policy: Option<Upload>,
    demographic: Option<Upload>,
}

/// Read both upload fields, enforcing extension and size limits as they
/// stream in. Unknown fields are drained and ignored.
async fn collect_uploads(
    multipart: &mut Multipart,
    config: &ServerConfig,
) -> Result<Uploads, PolicyLensError> {
    let mut uploads = Uploads::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| PolicyLensError::MalformedUpload(e.body_text()))?
    {
        let Some(slot) = field.name().and_then(UploadField::from_form_name) else {
            continue;
        };
        let file_name = field.file_name().unwrap_or_default().to_string();

        // An empty demographic slot is how browsers send "no file".
        if file_name.is_empty() && slot == UploadField::Demographic {
            continue;
        }

        let allowed = match slot {
            UploadField::Policy => &config.policy_extensions,
            UploadField::Demographic => &config.demographic_extensions,
        };
        let extension = validate_extension(slot, &file_name, allowed)?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| PolicyLensError::MalformedUpload(e.body_text()))?
        {
            check_size(slot, bytes.len() + chunk.len(), config.max_file_size)?;
            bytes.extend_from_slice(&chunk);
        }

        let upload = Upload {
            field: slot,
            file_name,
            extension,
            bytes,
        };
        match slot {
            UploadField::Policy => uploads.policy = Some(upload),
            UploadField::Demographic => uploads.demographic = Some(upload),
        }
    }

    Ok(uploads)
}

async fn analyze_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let analyzer = state.analyzer.clone().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            state
                .startup_error
                .clone()
                .unwrap_or_else(|| "Model gateway is not available".into()),
        )
    })?;

    let uploads = collect_uploads(&mut multipart, &state.config).await?;
    let policy = uploads.policy.ok_or(PolicyLensError::MissingUpload {
        field: UploadField::Policy,
    })?;
    info!(
        "Analyzing '{}' ({} bytes){}",
        policy.file_name,
        policy.bytes.len(),
        if uploads.demographic.is_some() {
            " with demographic data"
        } else {
            ""
        }
    );

    let policy_file = input::stage(&policy)?;
    let policy_text = state.extractor.extract(policy_file.path()).await?;
    info!("Extracted {} characters of policy text", policy_text.len());

    let supplied = uploads.demographic.is_some();
    let digest = match &uploads.demographic {
        None => NO_DATA_PROVIDED.to_string(),
        Some(upload) => match input::stage(upload) {
            Ok(staged) => demographic_digest(Some(staged.path())).await,
            Err(e) => {
                warn!("Could not stage demographic file: {}", e);
                format!("Error loading demographic data: {}", e)
            }
        },
    };
    let used = demographics_used(supplied, &digest);

    let request = AnalysisRequest::new(policy_text, Some(digest));
    let outcome = run_with_deadline(analyzer, request, state.config.request_timeout()).await?;

    shape_response(outcome, used).map(Json)
}

/// Envelope for a finished analysis. Quota exhaustion is promoted to 429;
/// every other degraded outcome is a 200 with `error` set.
fn shape_response(
    outcome: AnalysisOutcome,
    demographics_used: bool,
) -> Result<AnalysisResponse, ApiError> {
    if outcome.category() == Some(ErrorCategory::QuotaExceeded) {
        warn!("Model quota exhausted; responding 429");
        return Err(ApiError::new(StatusCode::TOO_MANY_REQUESTS, QUOTA_DETAIL));
    }
    Ok(AnalysisResponse::from_outcome(outcome, demographics_used))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_codes() {
        let e = ApiError::from(PolicyLensError::MissingUpload {
            field: UploadField::Policy,
        });
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.error_code, "HTTP_400");
        assert_eq!(e.detail, "Policy file is required");

        let e = ApiError::from(PolicyLensError::AnalysisTimeout { secs: 300 });
        assert_eq!(e.status(), StatusCode::GATEWAY_TIMEOUT);

        let e = ApiError::from(PolicyLensError::Internal("secret path /etc/x".into()));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.error_code, "INTERNAL_ERROR");
        assert!(!e.detail.contains("/etc/x"));
    }

    #[test]
    fn pdfium_binding_failure_is_internal() {
        let e = ApiError::from(PolicyLensError::PdfiumBindingFailed("not found".into()));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn quota_outcome_becomes_429() {
        let (result, category) = crate::pipeline::classify::degraded_result(
            &crate::error::GenerationError::Api {
                status: 429,
                body: "Please retry in 12.5s".into(),
            },
        );
        let err = shape_response(AnalysisOutcome::Degraded(result, category), true).unwrap_err();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_code, "HTTP_429");
        assert!(err.detail.starts_with("API quota exceeded"));
    }

    #[test]
    fn other_degraded_outcomes_stay_200() {
        let result = crate::pipeline::classify::parse_error_result();
        let resp = shape_response(
            AnalysisOutcome::Degraded(result, ErrorCategory::ParseError),
            false,
        )
        .unwrap();
        assert_eq!(resp.error.as_deref(), Some("parse_error"));
        assert!(!resp.demographics_used);
        assert_eq!(resp.affected_groups[0].group, "Error parsing response");
    }

    #[test]
    fn provider_missing_is_unavailable() {
        let e = ApiError::from(PolicyLensError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "set a key".into(),
        });
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
