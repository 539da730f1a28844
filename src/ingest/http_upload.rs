use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::config::UploadConfig;
use crate::core::error::UploadError;
use crate::storage::local::LocalVideoStore;

/// Multipart field carrying the uploaded video.
pub const VIDEO_FIELD: &str = "video";

// ---------------------------------------------------------------------------
// Upload API types
// ---------------------------------------------------------------------------

/// Successful upload response.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub size: u64,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Upload handler
// ---------------------------------------------------------------------------

/// Multipart upload into the storage directory.
///
/// Processing flow:
/// 1. Walk the form fields until the `video` field is found
/// 2. Validate the client-supplied filename
/// 3. Stream the field body chunk by chunk into a temp file
/// 4. Move the temp file onto the final name and report the byte count
///
/// The request body is capped by the router's `DefaultBodyLimit`; crossing
/// it surfaces here as a multipart read error mapped to `PayloadTooLarge`.
pub struct HttpUploadHandler {
    config: UploadConfig,
    store: Arc<LocalVideoStore>,
}

impl HttpUploadHandler {
    pub fn new(config: UploadConfig, store: Arc<LocalVideoStore>) -> Self {
        Self { config, store }
    }

    /// Receive the upload and store it.
    pub async fn receive(&self, mut multipart: Multipart) -> Result<UploadResponse, UploadError> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| self.map_multipart_error(e))?
        {
            if field.name() != Some(VIDEO_FIELD) {
                debug!(field = ?field.name(), "skipping unrelated form field");
                continue;
            }
            return self.store_field(field).await;
        }

        Err(UploadError::MissingField { field: VIDEO_FIELD })
    }

    async fn store_field(&self, mut field: Field<'_>) -> Result<UploadResponse, UploadError> {
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or(UploadError::MissingFilename { field: VIDEO_FIELD })?;

        let mut pending = self.store.begin_upload(&filename).await?;

        loop {
            let chunk: Bytes = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    pending.abort().await;
                    return Err(self.map_multipart_error(e));
                }
            };
            if let Err(e) = pending.write_chunk(&chunk).await {
                pending.abort().await;
                return Err(e.into());
            }
        }

        let size = pending.commit().await?;
        info!(filename = %filename, size, "upload accepted");

        Ok(UploadResponse {
            filename,
            size,
            message: "Upload successful".to_string(),
        })
    }

    fn map_multipart_error(&self, err: MultipartError) -> UploadError {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::PayloadTooLarge {
                max_bytes: self.config.max_upload_size_bytes,
            }
        } else {
            UploadError::MalformedForm {
                reason: err.body_text(),
            }
        }
    }
}
