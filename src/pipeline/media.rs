//! Accepted upload media types.

use std::path::Path;

use crate::error::PipelineError;

/// An accepted source media type.
///
/// HEIC/HEIF are accepted at the door for parity with phone uploads; whether
/// they decode depends on the codec stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Jpeg,
    Png,
    Gif,
    Webp,
    Heic,
    Heif,
}

impl MediaType {
    pub const ALL: [MediaType; 6] = [
        MediaType::Jpeg,
        MediaType::Png,
        MediaType::Gif,
        MediaType::Webp,
        MediaType::Heic,
        MediaType::Heif,
    ];

    /// Parse a MIME type, ignoring case and parameters.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Some(MediaType::Jpeg),
            "image/png" => Some(MediaType::Png),
            "image/gif" => Some(MediaType::Gif),
            "image/webp" => Some(MediaType::Webp),
            "image/heic" => Some(MediaType::Heic),
            "image/heif" => Some(MediaType::Heif),
            _ => None,
        }
    }

    /// Parse a file extension without the leading dot, ignoring case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "png" => Some(MediaType::Png),
            "gif" => Some(MediaType::Gif),
            "webp" => Some(MediaType::Webp),
            "heic" => Some(MediaType::Heic),
            "heif" => Some(MediaType::Heif),
            _ => None,
        }
    }

    /// Canonical MIME type.
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Gif => "image/gif",
            MediaType::Webp => "image/webp",
            MediaType::Heic => "image/heic",
            MediaType::Heif => "image/heif",
        }
    }

    /// Canonical extension.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "jpg",
            MediaType::Png => "png",
            MediaType::Gif => "gif",
            MediaType::Webp => "webp",
            MediaType::Heic => "heic",
            MediaType::Heif => "heif",
        }
    }
}

/// Lowercased extension of `filename`, or an empty string.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Resolve a request's media type.
///
/// Both the declared MIME type and the file extension must be on the
/// allow-list, and they must name the same type.
pub fn resolve_media(mime_type: &str, filename: &str) -> Result<MediaType, PipelineError> {
    let extension = extension_of(filename);
    let unsupported = || PipelineError::UnsupportedMediaType {
        mime_type: mime_type.to_string(),
        extension: extension.clone(),
    };

    let by_mime = MediaType::from_mime(mime_type).ok_or_else(unsupported)?;
    let by_ext = MediaType::from_extension(&extension).ok_or_else(unsupported)?;

    if by_mime != by_ext {
        return Err(unsupported());
    }
    Ok(by_mime)
}
