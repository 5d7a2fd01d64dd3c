//! HTTP surface for the conversion service.
//!
//! - `POST /process` – multipart upload with a `file` part; responds with the document converted
//!   to Markdown (`text/markdown`) or a JSON error body `{"error": ..., "details": ...}`.
//! - `GET /health` – converter readiness (`503` when it failed to initialize at startup).
//! - `GET /metrics` – conversion counters since startup.

use crate::metrics::MetricsSnapshot;
use crate::processing::{ProcessingError, ProcessingService, Upload};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use uuid::Uuid;

/// Content type of successful conversions.
pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

const FILE_FIELD: &str = "file";

/// Build the HTTP router.
///
/// `max_upload_bytes` caps request bodies; `None` lifts axum's default limit entirely so uploads
/// are bounded only by memory and whatever proxy sits in front of the service.
pub fn create_router(service: Arc<ProcessingService>, max_upload_bytes: Option<usize>) -> Router {
    let body_limit = match max_upload_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };
    Router::new()
        .route("/process", post(process_document))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .layer(body_limit)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Convert an uploaded document to Markdown.
///
/// Checks run in a fixed order: converter availability, presence of a `file` part carrying a
/// filename, then a non-empty filename. Only then is the upload read, staged, and converted.
#[tracing::instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
async fn process_document(
    State(service): State<Arc<ProcessingService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let Some(converter) = service.converter() else {
        tracing::error!("Docling converter was not initialized");
        return Err(ApiError::Unavailable);
    };

    let upload = read_upload(multipart).await.inspect_err(|err| {
        if matches!(err, ApiError::Processing(_)) {
            service.record_failure();
        }
    })?;
    let markdown = service.convert_upload(converter, &upload).await?;

    tracing::info!(filename = %upload.filename, "Returning Markdown response");
    Ok(([(header::CONTENT_TYPE, MARKDOWN_CONTENT_TYPE)], markdown).into_response())
}

/// Pull the first `file` part with a filename out of the request.
///
/// Parts named `file` without a `filename` parameter are plain form fields and are skipped.
async fn read_upload(multipart: Result<Multipart, MultipartRejection>) -> Result<Upload, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::warn!(%rejection, "Request is not a multipart upload");
        ApiError::NoFilePart
    })?;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                tracing::warn!("No 'file' part in the request");
                return Err(ApiError::NoFilePart);
            }
            Err(err) if is_too_large(&err) => return Err(ApiError::PayloadTooLarge),
            Err(err) => {
                tracing::warn!(error = %err, "Malformed multipart body");
                return Err(ApiError::NoFilePart);
            }
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if filename.is_empty() {
            tracing::warn!("No file selected");
            return Err(ApiError::NoSelectedFile);
        }

        let bytes = field.bytes().await.map_err(|err| {
            if is_too_large(&err) {
                ApiError::PayloadTooLarge
            } else {
                ApiError::Processing(ProcessingError::ReadUpload(err.to_string()))
            }
        })?;
        return Ok(Upload {
            filename,
            bytes: bytes.to_vec(),
        });
    }
}

/// Turn a panic inside a handler or converter into the usual processing-failure body.
///
/// Staged files are still removed while the panic unwinds, since their guards drop.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "converter panicked".to_string()
    };
    tracing::error!(details = %details, "Panic while processing request");
    let body = ErrorBody {
        error: "Failed to process document with docling".to_string(),
        details: Some(details),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

fn is_too_large(err: &MultipartError) -> bool {
    err.status() == StatusCode::PAYLOAD_TOO_LARGE
}

/// Response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    converter: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Report whether the converter came up at startup.
async fn health(State(service): State<Arc<ProcessingService>>) -> Response {
    match service.converter_handle().unavailable_reason() {
        None => Json(HealthResponse {
            status: "ok",
            converter: Some("ready"),
            error: None,
        })
        .into_response(),
        Some(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable",
                converter: None,
                error: Some(reason),
            }),
        )
            .into_response(),
    }
}

/// Return the conversion counters.
async fn get_metrics(State(service): State<Arc<ProcessingService>>) -> Json<MetricsSnapshot> {
    Json(service.metrics_snapshot())
}

/// Failures surfaced by `POST /process`, each mapped to one status code and JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The converter failed to initialize at startup.
    #[error("Docling converter not initialized during startup")]
    Unavailable,
    /// No `file` part with a filename was found.
    #[error("No file part in the request")]
    NoFilePart,
    /// The `file` part carried an empty filename.
    #[error("No selected file")]
    NoSelectedFile,
    /// The request body exceeded `MAX_UPLOAD_BYTES`.
    #[error("Uploaded file exceeds the configured size limit")]
    PayloadTooLarge,
    /// Reading, staging, converting, or exporting failed.
    #[error("Failed to process document with docling")]
    Processing(#[from] ProcessingError),
}

impl ApiError {
    /// HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoFilePart | Self::NoSelectedFile => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let details = match &self {
            Self::Processing(inner) => Some(inner.to_string()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            details,
        };
        (self.status(), Json(body)).into_response()
    }
}
