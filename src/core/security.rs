// ---------------------------------------------------------------------------
// Filename validation
// ---------------------------------------------------------------------------

/// Maximum accepted filename length in bytes (common filesystem NAME_MAX).
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Validate an untrusted filename before it touches the storage directory.
///
/// Accepted names are a single path component: non-empty, at most
/// `MAX_FILENAME_LENGTH` bytes, no `/` or `\` separators, no NUL or other
/// control characters, not `.`/`..`, and not starting with `.` (hidden
/// names are reserved for in-flight upload temp files).
///
/// Containment is re-checked after canonicalization when a file is opened,
/// so symlinks pointing outside the directory are caught there.
pub fn validate_filename(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("filename is empty".to_string());
    }
    if name.len() > MAX_FILENAME_LENGTH {
        return Err(format!(
            "filename is {} bytes (max {})",
            name.len(),
            MAX_FILENAME_LENGTH
        ));
    }
    if name == "." || name == ".." {
        return Err(format!("'{}' is not a file name", name));
    }
    if name.contains('/') || name.contains('\\') {
        return Err("filename must not contain path separators".to_string());
    }
    if name.chars().any(|c| c.is_control()) {
        return Err("filename must not contain control characters".to_string());
    }
    if name.starts_with('.') {
        return Err("filename must not start with '.'".to_string());
    }
    Ok(())
}
