use crate::extractor::ExtractionError;
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Capture-time tags in lookup order; the first one present wins.
const DATE_TAGS: [Tag; 2] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized];

/// Reads the capture time from an image's embedded EXIF tag table.
pub fn read_exif_date(path: &Path) -> Result<Option<String>, ExtractionError> {
    let file = File::open(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut buf = BufReader::new(file);
    match Reader::new().read_from_container(&mut buf) {
        Ok(exif) => first_date_value(&exif),
        Err(exif::Error::NotFound(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Decodes a bare TIFF-structured EXIF block, as stored in HEIF items.
pub fn read_exif_block_date(tiff: &[u8]) -> Result<Option<String>, ExtractionError> {
    if tiff.is_empty() {
        return Ok(None);
    }
    let exif = Reader::new().read_raw(tiff.to_vec())?;
    first_date_value(&exif)
}

fn first_date_value(exif: &Exif) -> Result<Option<String>, ExtractionError> {
    for tag in DATE_TAGS {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        if let Some(text) = ascii_text(&field.value)? {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

fn ascii_text(value: &Value) -> Result<Option<String>, ExtractionError> {
    let Value::Ascii(parts) = value else {
        return Ok(None);
    };
    let Some(first) = parts.first() else {
        return Ok(None);
    };
    let text = std::str::from_utf8(first).map_err(|_| ExtractionError::NonUtf8)?;
    Ok(normalize(text))
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
