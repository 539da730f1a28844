pub mod local;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Storage types
// ---------------------------------------------------------------------------

/// A stored video as reported by listings and uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub filename: String,
    pub size: u64,
}

/// Prefix of the hidden temp files that hold uploads still in flight.
///
/// Validated filenames never start with `.`, so these can't collide with
/// stored videos and are excluded from listings.
pub const UPLOAD_TEMP_PREFIX: &str = ".upload-";

/// Suffix of in-flight upload temp files.
pub const UPLOAD_TEMP_SUFFIX: &str = ".partial";

/// Returns true if a directory entry name belongs to an in-flight upload.
pub fn is_upload_temp_name(name: &str) -> bool {
    name.starts_with(UPLOAD_TEMP_PREFIX) && name.ends_with(UPLOAD_TEMP_SUFFIX)
}
