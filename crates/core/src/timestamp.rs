use chrono::{DateTime, LocalResult, NaiveDateTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Text layout a metadata source is known to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawFormat {
    /// `YYYY:MM:DD HH:MM:SS`, no zone.
    Exif,
    /// `YYYY-MM-DDTHH:MM:SS`, optionally with fraction or offset.
    Iso,
    /// ISO layout with a trailing `Z`, as container tags are written.
    IsoZulu,
}

impl RawFormat {
    fn naive_layouts(self) -> &'static [&'static str] {
        match self {
            RawFormat::Exif => &["%Y:%m:%d %H:%M:%S"],
            RawFormat::Iso | RawFormat::IsoZulu => &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"],
        }
    }

    fn carries_zone(self) -> bool {
        !matches!(self, RawFormat::Exif)
    }
}

impl fmt::Display for RawFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RawFormat::Exif => "EXIF (YYYY:MM:DD HH:MM:SS)",
            RawFormat::Iso => "ISO-8601 (YYYY-MM-DDTHH:MM:SS)",
            RawFormat::IsoZulu => "ISO-8601 UTC (YYYY-MM-DDTHH:MM:SSZ)",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("timestamp is empty")]
    Empty,
    #[error("`{input}` does not match the {format} layout")]
    Layout { input: String, format: RawFormat },
    #[error("`{0}` does not exist in the target time zone")]
    NonexistentLocal(NaiveDateTime),
}

/// Parses `raw` in the given layout and normalizes it into `zone`.
///
/// Values without a zone designator are read as wall-clock time in `zone`.
/// A trailing `Z` (or an explicit offset on ISO layouts) marks an absolute
/// instant, which is converted into `zone` instead.
pub fn parse_timestamp(raw: &str, format: RawFormat, zone: Tz) -> Result<DateTime<Tz>, ParseError> {
    let input = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    if format.carries_zone() {
        if let Some(utc) = input.strip_suffix('Z').or_else(|| input.strip_suffix('z')) {
            let naive = parse_naive(utc, format).ok_or_else(|| layout_error(input, format))?;
            return Ok(zone.from_utc_datetime(&naive));
        }
        if let Ok(with_offset) = DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f%:z") {
            return Ok(with_offset.with_timezone(&zone));
        }
    }

    let naive = parse_naive(input, format).ok_or_else(|| layout_error(input, format))?;
    attach_zone(&naive, zone)
}

/// Reads a wall-clock time as local to `zone`.
///
/// Ambiguous times (clocks turned back) resolve to the earlier instant. Times
/// skipped by a forward transition are read with the pre-transition offset,
/// which lands one hour later on the wall clock.
pub fn attach_zone(naive: &NaiveDateTime, zone: Tz) -> Result<DateTime<Tz>, ParseError> {
    match zone.from_local_datetime(naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => naive
            .checked_add_signed(TimeDelta::hours(1))
            .and_then(|shifted| zone.from_local_datetime(&shifted).earliest())
            .ok_or(ParseError::NonexistentLocal(*naive)),
    }
}

fn parse_naive(input: &str, format: RawFormat) -> Option<NaiveDateTime> {
    format
        .naive_layouts()
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(input, layout).ok())
}

fn layout_error(input: &str, format: RawFormat) -> ParseError {
    ParseError::Layout {
        input: input.to_string(),
        format,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_timestamp, ParseError, RawFormat};
    use chrono::{NaiveDate, NaiveDateTime};
    use chrono_tz::America::New_York;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .expect("valid date")
    }

    #[test]
    fn exif_layout_is_read_as_wall_clock_in_target_zone() {
        let dt = parse_timestamp("2023:05:01 10:00:00", RawFormat::Exif, New_York).expect("parse");
        assert_eq!(dt.naive_local(), naive(2023, 5, 1, 10, 0, 0));
        assert_eq!(dt.naive_utc(), naive(2023, 5, 1, 14, 0, 0));
    }

    #[test]
    fn exif_value_tolerates_trailing_nul_and_spaces() {
        let dt = parse_timestamp("2023:05:01 10:00:00\0 ", RawFormat::Exif, New_York).expect("parse");
        assert_eq!(dt.naive_local(), naive(2023, 5, 1, 10, 0, 0));
    }

    #[test]
    fn zulu_value_is_converted_not_relabelled() {
        let dt = parse_timestamp("2022-01-01T00:00:00Z", RawFormat::IsoZulu, New_York).expect("parse");
        assert_eq!(dt.naive_utc(), naive(2022, 1, 1, 0, 0, 0));
        assert_eq!(dt.naive_local(), naive(2021, 12, 31, 19, 0, 0));
    }

    #[test]
    fn zulu_value_accepts_probe_fraction() {
        let dt = parse_timestamp("2022-07-04T16:30:00.000000Z", RawFormat::IsoZulu, New_York)
            .expect("parse");
        assert_eq!(dt.naive_local(), naive(2022, 7, 4, 12, 30, 0));
    }

    #[test]
    fn iso_value_without_zone_is_wall_clock() {
        let dt = parse_timestamp("2021-06-15T08:30:00", RawFormat::Iso, New_York).expect("parse");
        assert_eq!(dt.naive_local(), naive(2021, 6, 15, 8, 30, 0));
    }

    #[test]
    fn iso_value_with_offset_is_converted() {
        let dt = parse_timestamp("2021-06-15T08:30:00-07:00", RawFormat::Iso, New_York)
            .expect("parse");
        assert_eq!(dt.naive_local(), naive(2021, 6, 15, 11, 30, 0));
    }

    #[test]
    fn layout_mismatch_is_a_parse_error() {
        let err = parse_timestamp("2023-05-01 10:00:00", RawFormat::Exif, New_York)
            .expect_err("dashes are not the EXIF layout");
        assert!(matches!(err, ParseError::Layout { .. }));

        let err = parse_timestamp("   ", RawFormat::Iso, New_York).expect_err("blank");
        assert_eq!(err, ParseError::Empty);

        assert!(parse_timestamp("0000:00:00 00:00:00", RawFormat::Exif, New_York).is_err());
    }

    #[test]
    fn ambiguous_local_time_takes_earlier_instant() {
        let dt = parse_timestamp("2023-11-05T01:30:00", RawFormat::Iso, New_York).expect("parse");
        assert_eq!(dt.naive_utc(), naive(2023, 11, 5, 5, 30, 0));
    }

    #[test]
    fn skipped_local_time_moves_forward_one_hour() {
        let dt = parse_timestamp("2023:03:12 02:30:00", RawFormat::Exif, New_York).expect("parse");
        assert_eq!(dt.naive_local(), naive(2023, 3, 12, 3, 30, 0));
    }
}
