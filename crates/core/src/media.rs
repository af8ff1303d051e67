use serde::{Deserialize, Serialize};
use std::path::Path;

/// Coarse file classification used to choose metadata extractors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaCategory {
    Image,
    HeicImage,
    Video,
    Unknown,
}

impl MediaCategory {
    /// Classifies a file by the MIME type guessed from its extension.
    pub fn detect(path: &Path) -> Self {
        match mime_guess::from_path(path).first() {
            Some(mime) => Self::from_mime(mime.essence_str()),
            None if has_heif_extension(path) => MediaCategory::HeicImage,
            None => MediaCategory::Unknown,
        }
    }

    pub fn from_mime(essence: &str) -> Self {
        let essence = essence.to_ascii_lowercase();
        if essence == "image/heic" || essence == "image/heif" {
            MediaCategory::HeicImage
        } else if essence.starts_with("image/") {
            MediaCategory::Image
        } else if essence.starts_with("video/") {
            MediaCategory::Video
        } else {
            MediaCategory::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaCategory::Image => "image",
            MediaCategory::HeicImage => "heic_image",
            MediaCategory::Video => "video",
            MediaCategory::Unknown => "unknown",
        }
    }
}

// Older MIME tables have no entry for HEIF extensions.
fn has_heif_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            ext.eq_ignore_ascii_case("heic") || ext.eq_ignore_ascii_case("heif")
        })
        .unwrap_or(false)
}
