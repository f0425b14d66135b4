//! HTTP surface: `POST /upload` hands each request to the supervisor and
//! maps its single terminal outcome to a single response.

use crate::error::ConversionError;
use crate::job::{ConversionOutcome, InputFile, Job, PageOutput};
use crate::supervisor::Supervisor;
use crate::validate::SkippedFile;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tower_http::trace::TraceLayer;

pub const UPLOAD_FIELD: &str = "media";

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
}

impl AppState {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor: Arc::new(supervisor),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Conversion(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.kind()),
            ApiError::Conversion(e) => {
                tracing::error!("conversion failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.kind())
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub images: Vec<String>,
    #[serde(default)]
    pub skipped: Vec<SkippedFile>,
}

impl From<ConversionOutcome> for UploadResponse {
    fn from(outcome: ConversionOutcome) -> Self {
        let images = outcome
            .pages
            .into_iter()
            .map(|p| match p.output {
                PageOutput::Path(path) => path.display().to_string(),
                PageOutput::Inline(bytes) => {
                    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
                }
            })
            .collect();
        Self {
            message: "PDFs converted".to_string(),
            images,
            skipped: outcome.skipped,
        }
    }
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the PDF to Image Converter API",
        "endpoints": { "upload": "/upload (POST)" },
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /upload
///
/// Multipart field `media`, repeatable. One job per request.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("failed to read multipart field: {}", e);
        ApiError::BadRequest(format!("invalid multipart body: {e}"))
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload-{}.pdf", files.len() + 1));
        let media_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read {name}: {e}")))?;
        files.push(InputFile::new(name, bytes.to_vec(), media_type));
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded.".to_string()));
    }

    let job = Job::new(files);
    tracing::info!(job_id = %job.id, files = job.files.len(), "upload accepted");
    let outcome = state.supervisor.submit(job).await?;
    Ok(Json(outcome.into()))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
