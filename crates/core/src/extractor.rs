use crate::exif_reader::{read_exif_block_date, read_exif_date};
use crate::heif::{read_heif_metadata, HeifError, HeifMetadata};
use crate::media::MediaCategory;
use crate::metadata::DateSource;
use crate::timestamp::RawFormat;
use crate::video_probe::VideoProbe;
use crate::xmp_reader::read_xmp_create_date;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Failure while reading one metadata source. Always local to that source.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed EXIF data: {0}")]
    Exif(#[from] exif::Error),
    #[error("malformed HEIF container: {0}")]
    Heif(#[from] HeifError),
    #[error("metadata text is not valid UTF-8")]
    NonUtf8,
    #[error("malformed XMP packet: {0}")]
    Xmp(String),
    #[error("`{program}` failed: {reason}")]
    Probe { program: String, reason: String },
    #[error("`{program}` did not finish within {timeout:?}")]
    ProbeTimeout { program: String, timeout: Duration },
}

/// One metadata source that may yield a raw capture-time string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    Exif,
    HeifExif,
    HeifXmp,
    VideoContainer,
}

/// Extractors tried for each category, highest priority first.
const CHAINS: &[(MediaCategory, &[Extractor])] = &[
    (MediaCategory::Image, &[Extractor::Exif]),
    (
        MediaCategory::HeicImage,
        &[Extractor::HeifExif, Extractor::HeifXmp],
    ),
    (MediaCategory::Video, &[Extractor::VideoContainer]),
];

impl Extractor {
    pub fn chain(category: MediaCategory) -> &'static [Extractor] {
        CHAINS
            .iter()
            .find(|(entry, _)| *entry == category)
            .map(|(_, chain)| *chain)
            .unwrap_or(&[])
    }

    pub fn raw_format(self) -> RawFormat {
        match self {
            Extractor::Exif | Extractor::HeifExif => RawFormat::Exif,
            Extractor::HeifXmp => RawFormat::Iso,
            Extractor::VideoContainer => RawFormat::IsoZulu,
        }
    }

    pub fn source(self) -> DateSource {
        match self {
            Extractor::Exif => DateSource::Exif,
            Extractor::HeifExif => DateSource::HeifExif,
            Extractor::HeifXmp => DateSource::HeifXmp,
            Extractor::VideoContainer => DateSource::VideoContainer,
        }
    }

    pub fn label(self) -> &'static str {
        self.source().label()
    }

    pub fn extract(self, path: &Path, probe: &VideoProbe) -> Result<Option<String>, ExtractionError> {
        match self {
            Extractor::Exif => read_exif_date(path),
            Extractor::HeifExif => match read_heif_items(path)?.exif {
                Some(block) => read_exif_block_date(&block),
                None => Ok(None),
            },
            Extractor::HeifXmp => match read_heif_items(path)?.xmp {
                Some(packet) if !packet.is_empty() => read_xmp_create_date(&packet),
                _ => Ok(None),
            },
            Extractor::VideoContainer => probe.creation_time(path),
        }
    }
}

fn read_heif_items(path: &Path) -> Result<HeifMetadata, ExtractionError> {
    let data = fs::read(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(read_heif_metadata(&data)?)
}
