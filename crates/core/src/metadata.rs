use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a resolved capture time came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DateSource {
    Exif,
    HeifExif,
    HeifXmp,
    VideoContainer,
    FallbackFileModified,
}

impl DateSource {
    pub fn label(self) -> &'static str {
        match self {
            DateSource::Exif => "EXIF",
            DateSource::HeifExif => "HEIF EXIF",
            DateSource::HeifXmp => "HEIF XMP",
            DateSource::VideoContainer => "video container",
            DateSource::FallbackFileModified => "file modified time",
        }
    }
}

/// The single capture time chosen for a file, in the target zone.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedDate {
    pub timestamp: DateTime<Tz>,
    pub is_fallback: bool,
    pub source: DateSource,
}

impl ResolvedDate {
    pub fn from_metadata(timestamp: DateTime<Tz>, source: DateSource) -> Self {
        Self {
            timestamp,
            is_fallback: source == DateSource::FallbackFileModified,
            source,
        }
    }

    pub fn fallback(timestamp: DateTime<Tz>) -> Self {
        Self {
            timestamp,
            is_fallback: true,
            source: DateSource::FallbackFileModified,
        }
    }
}

/// One enumerated file with its resolved date and raw filesystem times.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub resolved: ResolvedDate,
    /// Filesystem creation time as local wall clock, where the platform has one.
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
}

impl FileRecord {
    pub fn is_fallback(&self) -> bool {
        self.resolved.is_fallback
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}
