use std::io::SeekFrom;

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::core::error::{DeliveryError, UploadError};
use crate::ingest::http_upload::HttpUploadHandler;
use crate::observability::metrics as obs;
use crate::storage::VideoInfo;

use super::range;
use super::router::AppState;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    status: u16,
}

fn error_json(status: StatusCode, error: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        status: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

/// Turn a DeliveryError into its HTTP response.
///
/// 416 carries `Content-Range: bytes */{size}` and no body.
fn delivery_error_response(err: &DeliveryError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match err {
        DeliveryError::RangeNotSatisfiable { size } => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", size))],
        )
            .into_response(),
        DeliveryError::Metadata(_) => error_json(status, err.error_code(), "Failed to get file info."),
        DeliveryError::Storage(_) => error_json(status, err.error_code(), "Failed to read video."),
        _ => error_json(status, err.error_code(), &err.to_string()),
    }
}

fn upload_error_response(err: &UploadError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match err {
        UploadError::Storage(_) => "Failed to save file.".to_string(),
        _ => err.to_string(),
    };
    error_json(status, err.error_code(), &message)
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// `GET /stream/{filename}`
///
/// Serves the whole file (200) or the single byte range named by the
/// `Range` header (206). Once headers are out, a read failure ends the body
/// stream with an error and the connection is dropped; the status can't
/// change anymore.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Response {
    let start = std::time::Instant::now();
    let kind = if headers.contains_key(header::RANGE) {
        "range"
    } else {
        "full"
    };

    let response = match serve_video(&state, &filename, &headers).await {
        Ok(response) => response,
        Err(e) => {
            match &e {
                DeliveryError::Metadata(_) | DeliveryError::Storage(_) => {
                    error!(filename = %filename, error = %e, "failed to serve video")
                }
                _ => debug!(filename = %filename, error = %e, "stream request rejected"),
            }
            delivery_error_response(&e)
        }
    };

    obs::inc_delivery_request(response.status().as_u16(), kind);
    obs::record_delivery_setup_duration(start.elapsed().as_secs_f64());
    response
}

async fn serve_video(
    state: &AppState,
    filename: &str,
    headers: &HeaderMap,
) -> Result<Response, DeliveryError> {
    let mut file = state.store.open(filename).await?;
    let metadata = file.metadata().await.map_err(DeliveryError::Metadata)?;
    if !metadata.is_file() {
        return Err(DeliveryError::VideoNotFound {
            filename: filename.to_string(),
        });
    }
    let size = metadata.len();
    let content_type = state.config.delivery.content_type.clone();

    let Some(raw_range) = headers.get(header::RANGE) else {
        debug!(filename, size, "streaming full video");
        obs::add_delivery_bytes(size);
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, size.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            Body::from_stream(ReaderStream::new(file)),
        )
            .into_response());
    };

    let raw_range = raw_range.to_str().map_err(|_| DeliveryError::InvalidRange {
        reason: "header is not valid ASCII".to_string(),
    })?;
    let range = range::parse_range_header(raw_range)?.resolve(size)?;

    file.seek(SeekFrom::Start(range.start()))
        .await
        .map_err(DeliveryError::Storage)?;

    debug!(
        filename,
        start = range.start(),
        end = range.end(),
        size,
        "streaming byte range"
    );
    obs::add_delivery_bytes(range.len());

    // `take` bounds the copy at `end`; the rest of the file is never read.
    let body = Body::from_stream(ReaderStream::new(file.take(range.len())));
    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, range.len().to_string()),
            (header::CONTENT_RANGE, range.content_range()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        body,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub videos: Vec<VideoInfo>,
}

/// `GET /videos`
pub async fn list_videos(State(state): State<AppState>) -> Response {
    match state.store.list().await {
        Ok(videos) => {
            obs::inc_list_request("ok");
            debug!(count = videos.len(), "listed videos");
            Json(ListResponse { videos }).into_response()
        }
        Err(e) => {
            obs::inc_list_request("error");
            error!(dir = %state.store.root().display(), error = %e, "failed to read videos directory");
            error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "Failed to read videos directory.",
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// `POST /upload`
///
/// - Body: multipart/form-data with a `video` file field
/// - Returns: 200 with `{filename, size, message}` or a JSON error
pub async fn upload_video(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let start = std::time::Instant::now();

    let multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            obs::inc_upload("rejected");
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                UploadError::PayloadTooLarge {
                    max_bytes: state.config.upload.max_upload_size_bytes,
                }
            } else {
                UploadError::MalformedForm {
                    reason: rejection.body_text(),
                }
            };
            debug!(error = %err, "upload rejected before reading the form");
            return upload_error_response(&err);
        }
    };

    let handler = HttpUploadHandler::new(state.config.upload.clone(), state.store.clone());
    match handler.receive(multipart).await {
        Ok(response) => {
            obs::inc_upload("ok");
            obs::record_upload_duration(start.elapsed().as_secs_f64());
            obs::record_upload_size(response.size as f64);
            Json(response).into_response()
        }
        Err(e) => {
            if e.status_code() >= 500 {
                obs::inc_upload("error");
                error!(error = %e, "upload failed");
            } else {
                obs::inc_upload("rejected");
                warn!(error = %e, "upload rejected");
            }
            upload_error_response(&e)
        }
    }
}

// ---------------------------------------------------------------------------
// Health endpoints
// ---------------------------------------------------------------------------

/// `GET /metrics` — Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        )
            .into_response(),
        None => error_json(
            StatusCode::NOT_FOUND,
            "metrics_disabled",
            "Metrics are disabled in this deployment.",
        ),
    }
}

/// `GET /healthz` — Liveness probe.
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Log a one-line summary of the storage directory at startup.
pub async fn log_storage_summary(state: &AppState) {
    match state.store.list().await {
        Ok(videos) => {
            let total_bytes: u64 = videos.iter().map(|v| v.size).sum();
            info!(
                dir = %state.store.root().display(),
                videos = videos.len(),
                total_bytes,
                "storage directory ready"
            );
        }
        Err(e) => warn!(
            dir = %state.store.root().display(),
            error = %e,
            "storage directory is not listable"
        ),
    }
}
