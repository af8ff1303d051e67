use crate::config::AppConfig;
use crate::extractor::Extractor;
use crate::media::MediaCategory;
use crate::metadata::ResolvedDate;
use crate::report::RunContext;
use crate::timestamp::parse_timestamp;
use crate::video_probe::VideoProbe;
use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fs;
use std::path::Path;

/// Chooses one capture time per file. Holds configuration only; every call
/// to [`DateResolver::resolve`] is independent.
#[derive(Debug, Clone)]
pub struct DateResolver {
    zone: Tz,
    probe: VideoProbe,
}

impl DateResolver {
    pub fn new(zone: Tz, probe: VideoProbe) -> Self {
        Self { zone, probe }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let probe = VideoProbe::new(&config.ffprobe_path).with_timeout(config.probe_timeout());
        Ok(Self::new(config.target_zone()?, probe))
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Walks the extractor chain for the file's category and falls back to
    /// the modification time. Never fails; problems are logged to `ctx`.
    pub fn resolve(&self, path: &Path, ctx: &mut RunContext<'_>) -> ResolvedDate {
        let category = MediaCategory::detect(path);
        for extractor in Extractor::chain(category) {
            let raw = match extractor.extract(path, &self.probe) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    tracing::debug!(path = %path.display(), source = extractor.label(), "no date in source");
                    continue;
                }
                Err(err) => {
                    tracing::debug!(path = %path.display(), source = extractor.label(), error = %err, "extraction failed");
                    ctx.log(format!(
                        "[ERROR] Failed to read {} metadata for {}: {}",
                        extractor.label(),
                        path.display(),
                        err
                    ));
                    continue;
                }
            };

            match parse_timestamp(&raw, extractor.raw_format(), self.zone) {
                Ok(timestamp) => return ResolvedDate::from_metadata(timestamp, extractor.source()),
                Err(err) => {
                    tracing::debug!(path = %path.display(), source = extractor.label(), error = %err, "unparseable date");
                    ctx.log(format!(
                        "[ERROR] Unusable {} date for {}: {}",
                        extractor.label(),
                        path.display(),
                        err
                    ));
                }
            }
        }

        ResolvedDate::fallback(self.modified_in_zone(path, ctx))
    }

    fn modified_in_zone(&self, path: &Path, ctx: &mut RunContext<'_>) -> DateTime<Tz> {
        match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified).with_timezone(&self.zone),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "modification time unavailable");
                ctx.log(format!(
                    "[ERROR] Could not read modification time for {}: {}. Using the current time.",
                    path.display(),
                    err
                ));
                Utc::now().with_timezone(&self.zone)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DateResolver;
    use crate::exif_reader::fixture::{bare_jpeg, jpeg_with_dates, tiff_with_dates};
    use crate::heif::fixture::{build, exif_item_payload, Item};
    use crate::metadata::DateSource;
    use crate::report::{MemoryReporter, RunContext};
    use crate::video_probe::VideoProbe;
    use chrono::{NaiveDate, NaiveDateTime, TimeZone};
    use chrono_tz::America::New_York;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .expect("valid date")
    }

    fn set_mtime_eastern(path: &Path, local: NaiveDateTime) {
        let instant = New_York
            .from_local_datetime(&local)
            .single()
            .expect("unambiguous time");
        set_file_mtime(path, FileTime::from_unix_time(instant.timestamp(), 0)).expect("set mtime");
    }

    fn resolver() -> DateResolver {
        DateResolver::new(New_York, VideoProbe::new("/nonexistent/ffprobe"))
    }

    #[test]
    fn resolve_uses_exif_date_for_images() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("IMG_0001.jpg");
        fs::write(&path, jpeg_with_dates(Some("2023:05:01 10:00:00"), None)).expect("write");

        let mut reporter = MemoryReporter::default();
        let resolved = resolver().resolve(&path, &mut RunContext::new(&mut reporter));
        assert!(!resolved.is_fallback);
        assert_eq!(resolved.source, DateSource::Exif);
        assert_eq!(resolved.timestamp.naive_local(), naive(2023, 5, 1, 10, 0, 0));
    }

    #[test]
    fn resolve_falls_back_to_mtime_without_metadata() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("IMG_0002.jpg");
        fs::write(&path, bare_jpeg()).expect("write");
        set_mtime_eastern(&path, naive(2023, 5, 1, 12, 0, 0));

        let mut reporter = MemoryReporter::default();
        let resolved = resolver().resolve(&path, &mut RunContext::new(&mut reporter));
        assert!(resolved.is_fallback);
        assert_eq!(resolved.source, DateSource::FallbackFileModified);
        assert_eq!(resolved.timestamp.naive_local(), naive(2023, 5, 1, 12, 0, 0));
        assert_eq!(resolved.timestamp.timezone(), New_York);
        assert_eq!(reporter.lines().count(), 0);
    }

    #[test]
    fn resolve_logs_and_falls_back_on_malformed_metadata() {
        let temp = tempdir().expect("tempdir");
        let corrupt = temp.path().join("corrupt.jpg");
        fs::write(&corrupt, b"not really a jpeg").expect("write");
        set_mtime_eastern(&corrupt, naive(2020, 1, 2, 3, 4, 5));

        let bad_value = temp.path().join("bad_value.jpg");
        fs::write(&bad_value, jpeg_with_dates(Some("sometime in May"), None)).expect("write");

        let mut reporter = MemoryReporter::default();
        let mut ctx = RunContext::new(&mut reporter);
        let corrupt_date = resolver().resolve(&corrupt, &mut ctx);
        let bad_date = resolver().resolve(&bad_value, &mut ctx);
        drop(ctx);

        assert!(corrupt_date.is_fallback);
        assert_eq!(corrupt_date.timestamp.naive_local(), naive(2020, 1, 2, 3, 4, 5));
        assert!(bad_date.is_fallback);

        let lines: Vec<&str> = reporter.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.starts_with("[ERROR]")));
    }

    #[test]
    fn resolve_ignores_metadata_of_unknown_types() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("notes.zzq");
        fs::write(&path, jpeg_with_dates(Some("2023:05:01 10:00:00"), None)).expect("write");
        set_mtime_eastern(&path, naive(2019, 8, 9, 10, 11, 12));

        let mut reporter = MemoryReporter::default();
        let resolved = resolver().resolve(&path, &mut RunContext::new(&mut reporter));
        assert!(resolved.is_fallback);
        assert_eq!(resolved.timestamp.naive_local(), naive(2019, 8, 9, 10, 11, 12));
    }

    #[test]
    fn resolve_reads_heif_exif_before_xmp() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("IMG_1000.HEIC");
        let exif = exif_item_payload(&tiff_with_dates(Some("2022:12:24 18:00:00"), None));
        let xmp = br#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:Description xmlns:xmp="http://ns.adobe.com/xap/1.0/" xmp:CreateDate="2001-01-01T00:00:00"/></x:xmpmeta>"#;
        fs::write(
            &path,
            build(&[
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
            ]),
        )
        .expect("write");

        let mut reporter = MemoryReporter::default();
        let resolved = resolver().resolve(&path, &mut RunContext::new(&mut reporter));
        assert_eq!(resolved.source, DateSource::HeifExif);
        assert_eq!(resolved.timestamp.naive_local(), naive(2022, 12, 24, 18, 0, 0));
    }

    #[test]
    fn resolve_uses_heif_xmp_when_exif_absent() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("IMG_1001.heic");
        let xmp = br#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><rdf:Description xmlns:xmp="http://ns.adobe.com/xap/1.0/"><xmp:CreateDate>2021-06-15T08:30:00</xmp:CreateDate></rdf:Description></rdf:RDF></x:xmpmeta>"#;
        fs::write(
            &path,
            build(&[Item {
                item_type: b"mime",
                content_type: Some("application/rdf+xml"),
                payload: xmp,
            }]),
        )
        .expect("write");

        let mut reporter = MemoryReporter::default();
        let resolved = resolver().resolve(&path, &mut RunContext::new(&mut reporter));
        assert!(!resolved.is_fallback);
        assert_eq!(resolved.source, DateSource::HeifXmp);
        assert_eq!(resolved.timestamp.naive_local(), naive(2021, 6, 15, 8, 30, 0));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_converts_video_creation_time_from_utc() {
        use crate::video_probe::fixture::fake_probe;

        let temp = tempdir().expect("tempdir");
        let probe = fake_probe(temp.path(), "echo '2022-01-01T00:00:00Z'");
        let path = temp.path().join("clip.mp4");
        fs::write(&path, b"\0\0\0\x18ftypmp42").expect("write");

        let resolver = DateResolver::new(New_York, VideoProbe::new(probe));
        let mut reporter = MemoryReporter::default();
        let resolved = resolver.resolve(&path, &mut RunContext::new(&mut reporter));
        assert!(!resolved.is_fallback);
        assert_eq!(resolved.source, DateSource::VideoContainer);
        assert_eq!(resolved.timestamp.naive_utc(), naive(2022, 1, 1, 0, 0, 0));
        assert_eq!(resolved.timestamp.naive_local(), naive(2021, 12, 31, 19, 0, 0));
    }

    #[test]
    fn resolve_survives_missing_probe() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("clip.mov");
        fs::write(&path, b"movie").expect("write");
        set_mtime_eastern(&path, naive(2024, 2, 29, 6, 0, 0));

        let mut reporter = MemoryReporter::default();
        let resolved = resolver().resolve(&path, &mut RunContext::new(&mut reporter));
        assert!(resolved.is_fallback);
        assert_eq!(resolved.timestamp.naive_local(), naive(2024, 2, 29, 6, 0, 0));
        assert_eq!(reporter.lines().count(), 1);
    }
}
