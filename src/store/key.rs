//! Storage key rules shared by every backend.

/// Longest accepted key, in bytes (the S3 limit).
pub const MAX_KEY_LEN: usize = 1024;

/// Check that `key` is usable as an object key.
///
/// Keys must be non-empty, relative, free of `.`/`..` and empty segments, and
/// free of control characters. Returns the reason on failure.
pub fn validate_key(key: &str) -> Result<(), &'static str> {
    if key.is_empty() {
        return Err("key must not be empty");
    }
    if key.len() > MAX_KEY_LEN {
        return Err("key is longer than 1024 bytes");
    }
    if key.starts_with('/') {
        return Err("key must not start with '/'");
    }
    if key.chars().any(|c| c.is_control()) {
        return Err("key must not contain control characters");
    }
    if key.contains('\\') {
        return Err("key must not contain '\\'");
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err("key must not contain empty segments"),
            "." | ".." => return Err("key must not contain '.' or '..' segments"),
            _ => {}
        }
    }
    Ok(())
}

/// The final path segment of `key`.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
