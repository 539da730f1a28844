use thiserror::Error;

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors originating from the storage directory.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid filename: {reason}")]
    InvalidFilename { reason: String },

    #[error("video not found: {filename}")]
    NotFound { filename: String },

    #[error("video already exists: {filename}")]
    AlreadyExists { filename: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Upload errors
// ---------------------------------------------------------------------------

/// Errors originating from the multipart upload path.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to parse form: {reason}")]
    MalformedForm { reason: String },

    #[error("missing form field '{field}'")]
    MissingField { field: &'static str },

    #[error("form field '{field}' carries no filename")]
    MissingFilename { field: &'static str },

    #[error("upload exceeds limit of {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: u64 },

    #[error("invalid filename: {reason}")]
    InvalidFilename { reason: String },

    #[error("video already exists: {filename}")]
    AlreadyExists { filename: String },

    #[error("failed to save file: {0}")]
    Storage(#[source] std::io::Error),
}

impl UploadError {
    pub fn status_code(&self) -> u16 {
        match self {
            UploadError::MalformedForm { .. }
            | UploadError::MissingField { .. }
            | UploadError::MissingFilename { .. }
            | UploadError::InvalidFilename { .. } => 400,
            UploadError::AlreadyExists { .. } => 409,
            UploadError::PayloadTooLarge { .. } => 413,
            UploadError::Storage(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            UploadError::MalformedForm { .. } => "malformed_form",
            UploadError::MissingField { .. } => "missing_field",
            UploadError::MissingFilename { .. } => "missing_filename",
            UploadError::PayloadTooLarge { .. } => "payload_too_large",
            UploadError::InvalidFilename { .. } => "invalid_filename",
            UploadError::AlreadyExists { .. } => "already_exists",
            UploadError::Storage(_) => "upload_failed",
        }
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidFilename { reason } => UploadError::InvalidFilename { reason },
            StorageError::AlreadyExists { filename } => UploadError::AlreadyExists { filename },
            StorageError::NotFound { filename } => UploadError::Storage(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("storage path vanished while writing {filename}"),
            )),
            StorageError::Io(e) => UploadError::Storage(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery errors
// ---------------------------------------------------------------------------

/// Errors originating from the listing and streaming handlers.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid filename: {reason}")]
    InvalidFilename { reason: String },

    #[error("video not found: {filename}")]
    VideoNotFound { filename: String },

    #[error("invalid range header: {reason}")]
    InvalidRange { reason: String },

    #[error("range not satisfiable for resource of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error("failed to get file info: {0}")]
    Metadata(#[source] std::io::Error),

    #[error("storage backend error: {0}")]
    Storage(#[source] std::io::Error),
}

impl DeliveryError {
    /// Map a DeliveryError to its HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            DeliveryError::InvalidFilename { .. } => 400,
            DeliveryError::InvalidRange { .. } => 400,
            DeliveryError::VideoNotFound { .. } => 404,
            DeliveryError::RangeNotSatisfiable { .. } => 416,
            DeliveryError::Metadata(_) => 500,
            DeliveryError::Storage(_) => 500,
        }
    }

    /// Return the error code string for JSON responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            DeliveryError::InvalidFilename { .. } => "invalid_filename",
            DeliveryError::InvalidRange { .. } => "invalid_range",
            DeliveryError::VideoNotFound { .. } => "video_not_found",
            DeliveryError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            DeliveryError::Metadata(_) => "metadata_error",
            DeliveryError::Storage(_) => "storage_error",
        }
    }
}

impl From<StorageError> for DeliveryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidFilename { reason } => DeliveryError::InvalidFilename { reason },
            StorageError::NotFound { filename } => DeliveryError::VideoNotFound { filename },
            StorageError::AlreadyExists { filename } => DeliveryError::Storage(
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, filename),
            ),
            StorageError::Io(e) => DeliveryError::Storage(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_status_codes() {
        let not_found = DeliveryError::VideoNotFound {
            filename: "a.mp4".to_string(),
        };
        assert_eq!(not_found.status_code(), 404);
        assert_eq!(not_found.error_code(), "video_not_found");

        let unsatisfiable = DeliveryError::RangeNotSatisfiable { size: 10 };
        assert_eq!(unsatisfiable.status_code(), 416);

        let bad_range = DeliveryError::InvalidRange {
            reason: "x".to_string(),
        };
        assert_eq!(bad_range.status_code(), 400);
    }

    #[test]
    fn test_storage_error_maps_into_delivery() {
        let err: DeliveryError = StorageError::NotFound {
            filename: "gone.mp4".to_string(),
        }
        .into();
        assert!(matches!(err, DeliveryError::VideoNotFound { .. }));

        let err: DeliveryError = StorageError::InvalidFilename {
            reason: "..".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_upload_status_codes() {
        assert_eq!(
            UploadError::MissingField { field: "video" }.status_code(),
            400
        );
        assert_eq!(
            UploadError::PayloadTooLarge { max_bytes: 1 }.status_code(),
            413
        );
        let io = std::io::Error::other("disk full");
        assert_eq!(UploadError::Storage(io).status_code(), 500);

        let err: UploadError = StorageError::AlreadyExists {
            filename: "a.mp4".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 409);
    }
}
