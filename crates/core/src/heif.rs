//! Minimal ISO-BMFF reader for HEIC/HEIF metadata items.
//!
//! Only the boxes needed to locate item payloads are parsed: `meta`, `iinf`
//! with its `infe` children, `iloc` and `idat`. Image data is never touched.

use thiserror::Error;

const XMP_CONTENT_TYPE: &str = "application/rdf+xml";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeifError {
    #[error("truncated {0} box")]
    Truncated(&'static str),
    #[error("box size {size} is invalid at offset {offset}")]
    BadBoxSize { offset: usize, size: u64 },
    #[error("no meta box in container")]
    MissingMeta,
    #[error("unsupported {field} width of {width} bytes")]
    UnsupportedWidth { field: &'static str, width: u8 },
    #[error("item {item_id} points outside the file")]
    ExtentOutOfRange { item_id: u32 },
    #[error("item {item_id} uses unsupported construction method {method}")]
    UnsupportedConstruction { item_id: u32, method: u16 },
    #[error("EXIF item has a TIFF header offset past its end")]
    ExifHeaderOffset,
}

/// Metadata payloads carried as items in a HEIF container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeifMetadata {
    /// TIFF-structured EXIF block with the item's header offset removed.
    pub exif: Option<Vec<u8>>,
    /// Raw XMP packet bytes.
    pub xmp: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct ItemInfo {
    id: u32,
    item_type: [u8; 4],
    content_type: Option<String>,
}

#[derive(Debug, Clone)]
struct ItemLocation {
    id: u32,
    construction_method: u16,
    base_offset: u64,
    extents: Vec<(u64, u64)>,
}

pub fn read_heif_metadata(data: &[u8]) -> Result<HeifMetadata, HeifError> {
    let meta = child_boxes(data)
        .find_map(|entry| match entry {
            Ok((kind, body)) if &kind == b"meta" => Some(Ok(body)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
        .ok_or(HeifError::MissingMeta)??;
    let meta = meta.get(4..).ok_or(HeifError::Truncated("meta"))?;

    let mut infos = Vec::new();
    let mut locations = Vec::new();
    let mut idat: &[u8] = &[];
    for entry in child_boxes(meta) {
        let (kind, body) = entry?;
        match &kind {
            b"iinf" => infos = parse_iinf(body)?,
            b"iloc" => locations = parse_iloc(body)?,
            b"idat" => idat = body,
            _ => {}
        }
    }

    let mut out = HeifMetadata::default();
    for info in &infos {
        let is_exif = &info.item_type == b"Exif";
        let is_xmp = &info.item_type == b"mime"
            && info
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.eq_ignore_ascii_case(XMP_CONTENT_TYPE));
        if (!is_exif || out.exif.is_some()) && (!is_xmp || out.xmp.is_some()) {
            continue;
        }
        let Some(location) = locations.iter().find(|loc| loc.id == info.id) else {
            continue;
        };
        let payload = item_payload(data, idat, location)?;
        if is_exif {
            out.exif = Some(strip_exif_header(&payload)?.to_vec());
        } else {
            out.xmp = Some(payload);
        }
    }

    Ok(out)
}

fn strip_exif_header(payload: &[u8]) -> Result<&[u8], HeifError> {
    let mut reader = ByteReader::new(payload, "Exif");
    let offset = reader.u32()? as usize;
    payload
        .get(4 + offset..)
        .ok_or(HeifError::ExifHeaderOffset)
}

fn item_payload(file: &[u8], idat: &[u8], location: &ItemLocation) -> Result<Vec<u8>, HeifError> {
    let source = match location.construction_method {
        0 => file,
        1 => idat,
        method => {
            return Err(HeifError::UnsupportedConstruction {
                item_id: location.id,
                method,
            })
        }
    };
    let out_of_range = HeifError::ExtentOutOfRange {
        item_id: location.id,
    };

    let mut payload = Vec::new();
    for &(offset, length) in &location.extents {
        let start = location
            .base_offset
            .checked_add(offset)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| out_of_range.clone())?;
        let end = if length == 0 {
            source.len()
        } else {
            usize::try_from(length)
                .ok()
                .and_then(|len| start.checked_add(len))
                .ok_or_else(|| out_of_range.clone())?
        };
        let bytes = source.get(start..end).ok_or_else(|| out_of_range.clone())?;
        payload.extend_from_slice(bytes);
    }
    Ok(payload)
}

fn parse_iinf(body: &[u8]) -> Result<Vec<ItemInfo>, HeifError> {
    let mut reader = ByteReader::new(body, "iinf");
    let version = reader.u8()?;
    reader.skip(3)?;
    if version == 0 {
        reader.u16()?;
    } else {
        reader.u32()?;
    }

    let mut infos = Vec::new();
    for entry in child_boxes(reader.rest()) {
        let (kind, body) = entry?;
        if &kind == b"infe" {
            infos.push(parse_infe(body)?);
        }
    }
    Ok(infos)
}

fn parse_infe(body: &[u8]) -> Result<ItemInfo, HeifError> {
    let mut reader = ByteReader::new(body, "infe");
    let version = reader.u8()?;
    reader.skip(3)?;

    if version < 2 {
        let id = u32::from(reader.u16()?);
        reader.u16()?;
        reader.cstring()?;
        let content_type = reader.cstring()?;
        return Ok(ItemInfo {
            id,
            item_type: *b"mime",
            content_type: Some(content_type),
        });
    }

    let id = if version == 2 {
        u32::from(reader.u16()?)
    } else {
        reader.u32()?
    };
    reader.u16()?;
    let item_type = reader.fourcc()?;
    reader.cstring()?;
    let content_type = if &item_type == b"mime" {
        Some(reader.cstring()?)
    } else {
        None
    };

    Ok(ItemInfo {
        id,
        item_type,
        content_type,
    })
}

fn parse_iloc(body: &[u8]) -> Result<Vec<ItemLocation>, HeifError> {
    let mut reader = ByteReader::new(body, "iloc");
    let version = reader.u8()?;
    reader.skip(3)?;

    let sizes = reader.u8()?;
    let offset_size = sizes >> 4;
    let length_size = sizes & 0x0f;
    let sizes = reader.u8()?;
    let base_offset_size = sizes >> 4;
    let index_size = if version == 1 || version == 2 {
        sizes & 0x0f
    } else {
        0
    };

    let item_count = if version < 2 {
        u32::from(reader.u16()?)
    } else {
        reader.u32()?
    };

    let mut locations = Vec::with_capacity(item_count.min(1024) as usize);
    for _ in 0..item_count {
        let id = if version < 2 {
            u32::from(reader.u16()?)
        } else {
            reader.u32()?
        };
        let construction_method = if version == 1 || version == 2 {
            reader.u16()? & 0x0f
        } else {
            0
        };
        reader.u16()?;
        let base_offset = reader.uint(base_offset_size, "base_offset")?;
        let extent_count = reader.u16()?;

        let mut extents = Vec::with_capacity(usize::from(extent_count));
        for _ in 0..extent_count {
            if index_size > 0 {
                reader.uint(index_size, "extent_index")?;
            }
            let offset = reader.uint(offset_size, "extent_offset")?;
            let length = reader.uint(length_size, "extent_length")?;
            extents.push((offset, length));
        }

        locations.push(ItemLocation {
            id,
            construction_method,
            base_offset,
            extents,
        });
    }
    Ok(locations)
}

/// Iterates the boxes laid end to end in `data`, yielding type and body.
fn child_boxes(data: &[u8]) -> impl Iterator<Item = Result<([u8; 4], &[u8]), HeifError>> {
    let mut cursor = 0usize;
    let mut failed = false;
    std::iter::from_fn(move || {
        if failed || cursor >= data.len() {
            return None;
        }
        let next = read_box(data, cursor);
        match next {
            Ok((kind, body, end)) => {
                cursor = end;
                Some(Ok((kind, body)))
            }
            Err(err) => {
                failed = true;
                Some(Err(err))
            }
        }
    })
}

fn read_box(data: &[u8], start: usize) -> Result<([u8; 4], &[u8], usize), HeifError> {
    let mut reader = ByteReader::new(&data[start..], "box header");
    let size32 = reader.u32()?;
    let kind = reader.fourcc()?;
    let (header_len, size) = match size32 {
        0 => (8usize, (data.len() - start) as u64),
        1 => (16usize, reader.u64()?),
        n => (8usize, u64::from(n)),
    };

    let bad_size = HeifError::BadBoxSize {
        offset: start,
        size,
    };
    let size = usize::try_from(size).map_err(|_| bad_size.clone())?;
    if size < header_len {
        return Err(bad_size);
    }
    let end = start.checked_add(size).ok_or_else(|| bad_size.clone())?;
    if end > data.len() {
        return Err(bad_size);
    }
    Ok((kind, &data[start + header_len..end], end))
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8], context: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            context,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], HeifError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(HeifError::Truncated(self.context))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), HeifError> {
        self.take(len).map(|_| ())
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn u8(&mut self) -> Result<u8, HeifError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, HeifError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, HeifError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, HeifError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    fn uint(&mut self, width: u8, field: &'static str) -> Result<u64, HeifError> {
        match width {
            0 => Ok(0),
            4 => self.u32().map(u64::from),
            8 => self.u64(),
            width => Err(HeifError::UnsupportedWidth { field, width }),
        }
    }

    fn fourcc(&mut self) -> Result<[u8; 4], HeifError> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn cstring(&mut self) -> Result<String, HeifError> {
        let rest = self.rest();
        let len = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(HeifError::Truncated(self.context))?;
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(text)
    }
}

/// Builds small HEIF containers for tests.
#[cfg(test)]
pub(crate) mod fixture {
    fn boxed(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + 8);
        out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn full_box(kind: &[u8; 4], version: u8, body: &[u8]) -> Vec<u8> {
        let mut inner = vec![version, 0, 0, 0];
        inner.extend_from_slice(body);
        boxed(kind, &inner)
    }

    /// An item stored in `mdat`: (item type, mime content type, payload).
    pub struct Item<'a> {
        pub item_type: &'a [u8; 4],
        pub content_type: Option<&'a str>,
        pub payload: &'a [u8],
    }

    /// Wraps a TIFF block the way HEIF stores EXIF items.
    pub fn exif_item_payload(tiff: &[u8]) -> Vec<u8> {
        let mut out = 0u32.to_be_bytes().to_vec();
        out.extend_from_slice(tiff);
        out
    }

    pub fn build(items: &[Item<'_>]) -> Vec<u8> {
        let ftyp = boxed(b"ftyp", b"heic\0\0\0\0mif1heic");

        let mut infes = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let mut body = ((index + 1) as u16).to_be_bytes().to_vec();
            body.extend_from_slice(&0u16.to_be_bytes());
            body.extend_from_slice(item.item_type);
            body.push(0);
            if let Some(ct) = item.content_type {
                body.extend_from_slice(ct.as_bytes());
                body.push(0);
            }
            infes.extend(full_box(b"infe", 2, &body));
        }
        let mut iinf_body = (items.len() as u16).to_be_bytes().to_vec();
        iinf_body.extend(infes);
        let iinf = full_box(b"iinf", 0, &iinf_body);

        // iloc v0 with 4-byte offsets and lengths; its size does not depend
        // on the offset values, so it can be laid out before they are known.
        let iloc_len = 8 + 4 + 2 + 2 + items.len() * (2 + 2 + 2 + 8);
        let meta_len = 8 + 4 + iinf.len() + iloc_len;
        let mdat_payload_start = ftyp.len() + meta_len + 8;

        let mut iloc_body = vec![0x44, 0x00];
        iloc_body.extend_from_slice(&(items.len() as u16).to_be_bytes());
        let mut offset = mdat_payload_start;
        for (index, item) in items.iter().enumerate() {
            iloc_body.extend_from_slice(&((index + 1) as u16).to_be_bytes());
            iloc_body.extend_from_slice(&0u16.to_be_bytes());
            iloc_body.extend_from_slice(&1u16.to_be_bytes());
            iloc_body.extend_from_slice(&(offset as u32).to_be_bytes());
            iloc_body.extend_from_slice(&(item.payload.len() as u32).to_be_bytes());
            offset += item.payload.len();
        }
        let iloc = full_box(b"iloc", 0, &iloc_body);

        let mut meta_body = iinf;
        meta_body.extend(iloc);
        let meta = full_box(b"meta", 0, &meta_body);
        assert_eq!(meta.len(), meta_len);

        let mut mdat_body = Vec::new();
        for item in items {
            mdat_body.extend_from_slice(item.payload);
        }

        let mut out = ftyp;
        out.extend(meta);
        out.extend(boxed(b"mdat", &mdat_body));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::{build, exif_item_payload, Item};
    use super::{read_heif_metadata, HeifError};

    #[test]
    fn read_heif_metadata_finds_exif_and_xmp_items() {
        let tiff = b"MM\0*\0\0\0\x08rest";
        let exif = exif_item_payload(tiff);
        let xmp = b"<x:xmpmeta/>";
        let data = build(&[
            Item {
                item_type: b"hvc1",
                content_type: None,
                payload: b"pixels",
            },
            Item {
                item_type: b"Exif",
                content_type: None,
                payload: &exif,
            },
            Item {
                item_type: b"mime",
                content_type: Some("application/rdf+xml"),
                payload: xmp,
            },
        ]);

        let meta = read_heif_metadata(&data).expect("parse container");
        assert_eq!(meta.exif.as_deref(), Some(&tiff[..]));
        assert_eq!(meta.xmp.as_deref(), Some(&xmp[..]));
    }

    #[test]
    fn read_heif_metadata_ignores_other_mime_items() {
        let data = build(&[Item {
            item_type: b"mime",
            content_type: Some("image/jpeg"),
            payload: b"thumb",
        }]);

        let meta = read_heif_metadata(&data).expect("parse container");
        assert!(meta.exif.is_none());
        assert!(meta.xmp.is_none());
    }

    #[test]
    fn read_heif_metadata_reports_missing_meta_and_truncation() {
        assert_eq!(
            read_heif_metadata(b"\0\0\0\x10ftypheic\0\0\0\0"),
            Err(HeifError::MissingMeta)
        );

        let mut data = build(&[Item {
            item_type: b"Exif",
            content_type: None,
            payload: &exif_item_payload(b"II*\0"),
        }]);
        data.truncate(data.len() - 6);
        assert!(read_heif_metadata(&data).is_err());
    }
}
