use crate::config::AppConfig;
use crate::metadata::FileRecord;
use crate::report::{RunContext, RunStage};
use crate::resolver::DateResolver;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Timelike};
use serde::Serialize;
use std::ffi::OsString;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

pub const FALLBACK_PREFIX: &str = "ZZZ_";
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";
const HOUR_BUCKET_FORMAT: &str = "%Y_%m_%d_%H";

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub folder: PathBuf,
    pub excluded_extensions: Vec<String>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            folder: PathBuf::new(),
            excluded_extensions: vec![".txt".to_string()],
        }
    }
}

impl PlanOptions {
    pub fn from_config(folder: impl Into<PathBuf>, config: &AppConfig) -> Self {
        Self {
            folder: folder.into(),
            excluded_extensions: config.excluded_extensions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameCandidate {
    pub original_path: PathBuf,
    pub target_path: PathBuf,
    /// 1-based rank in date order.
    pub sequence: usize,
    pub new_name: String,
    pub record: FileRecord,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct RenameStats {
    pub total_files: usize,
    pub fallback_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenamePlan {
    pub folder: PathBuf,
    pub timezone: String,
    pub candidates: Vec<RenameCandidate>,
    pub stats: RenameStats,
}

/// Enumerates, dates, orders and names every file in `options.folder`.
/// Nothing on disk changes. Fails only when the folder cannot be listed.
pub fn generate_plan(
    options: &PlanOptions,
    resolver: &DateResolver,
    ctx: &mut RunContext<'_>,
) -> Result<RenamePlan> {
    if !options.folder.is_dir() {
        anyhow::bail!("folder does not exist: {}", options.folder.display());
    }
    let excluded = normalize_extensions(&options.excluded_extensions);

    ctx.stage(RunStage::FindingFiles);
    ctx.log("Step 2:  Finding files in folder...");
    let files = collect_files(&options.folder, &excluded)?;
    ctx.log(format!(
        "Found {} files in folder:  {} (excluding {} files)",
        files.len(),
        options.folder.display(),
        excluded_label(&excluded)
    ));

    ctx.stage(RunStage::ExtractingDates);
    ctx.log("Step 3:  Extracting dates from files...");
    let mut records = Vec::with_capacity(files.len());
    for path in files {
        let record = resolve_record(path, resolver, ctx);
        log_record(&record, ctx);
        records.push(record);
    }

    ctx.stage(RunStage::SortingFiles);
    ctx.log("Step 4:  Sorting files by date...");
    sort_records(&mut records);
    ctx.log("Files sorted by date.");

    let candidates = assign_names(&options.folder, records);
    let stats = RenameStats {
        total_files: candidates.len(),
        fallback_count: candidates.iter().filter(|c| c.record.is_fallback()).count(),
    };

    Ok(RenamePlan {
        folder: options.folder.clone(),
        timezone: resolver.zone().name().to_string(),
        candidates,
        stats,
    })
}

/// Stable ascending sort by resolved instant; equal instants keep their
/// enumeration (file name) order.
pub fn sort_records(records: &mut [FileRecord]) {
    records.sort_by(|a, b| a.resolved.timestamp.cmp(&b.resolved.timestamp));
}

/// Turns date-ordered records into rename candidates.
pub fn assign_names(folder: &Path, records: Vec<FileRecord>) -> Vec<RenameCandidate> {
    let width = sequence_width(records.len());
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let sequence = index + 1;
            let stem = build_file_name(
                &record.resolved.timestamp,
                sequence,
                width,
                record.is_fallback(),
                "",
            );
            let mut file_name = OsString::from(stem);
            if let Some(extension) = record.path.extension() {
                file_name.push(".");
                file_name.push(extension);
            }
            let target_path = folder.join(&file_name);
            let changed = record.path.file_name() != Some(file_name.as_os_str());
            let new_name = file_name.to_string_lossy().into_owned();
            RenameCandidate {
                original_path: record.path.clone(),
                target_path,
                sequence,
                new_name,
                record,
                changed,
            }
        })
        .collect()
}

/// Digits needed for the largest sequence number of a batch.
pub fn sequence_width(total: usize) -> usize {
    total.to_string().len()
}

/// `[ZZZ_]<year>_<MM>_<DD>_<HH>_<seq><extension>`
pub fn build_file_name<Tz: TimeZone>(
    timestamp: &DateTime<Tz>,
    sequence: usize,
    width: usize,
    is_fallback: bool,
    extension: &str,
) -> String {
    let prefix = if is_fallback { FALLBACK_PREFIX } else { "" };
    format!(
        "{}{}_{:02}_{:02}_{:02}_{:0width$}{}",
        prefix,
        timestamp.year(),
        timestamp.month(),
        timestamp.day(),
        timestamp.hour(),
        sequence,
        extension,
        width = width
    )
}

fn collect_files(folder: &Path, excluded: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("could not list folder: {}", folder.display()))?;
        let path = entry.path();
        if !path.is_file() || is_excluded(path, excluded) {
            continue;
        }
        out.push(path.to_path_buf());
    }
    Ok(out)
}

fn resolve_record(path: PathBuf, resolver: &DateResolver, ctx: &mut RunContext<'_>) -> FileRecord {
    let resolved = resolver.resolve(&path, ctx);
    let meta = fs::metadata(&path).ok();
    let created = meta
        .as_ref()
        .and_then(|m| m.created().ok())
        .map(local_naive);
    let modified = meta
        .as_ref()
        .and_then(|m| m.modified().ok())
        .map(local_naive);
    FileRecord {
        path,
        resolved,
        created,
        modified,
    }
}

fn log_record(record: &FileRecord, ctx: &mut RunContext<'_>) {
    let date = &record.resolved.timestamp;
    let shown = date.format(DISPLAY_FORMAT);
    let bucket = date.format(HOUR_BUCKET_FORMAT);
    if record.is_fallback() {
        ctx.log(format!(
            "No Date Taken Found. Fallback Date Modified for {}:  {} ({})",
            record.path.display(),
            shown,
            bucket
        ));
        ctx.log("  Date Taken: N/A");
    } else {
        ctx.log(format!(
            "Date Taken for {}:  {} ({})",
            record.path.display(),
            shown,
            bucket
        ));
        ctx.log(format!(
            "  Date Taken:  {} [{}]",
            shown,
            record.resolved.source.label()
        ));
    }
    ctx.log(format!("  Creation:  {}", or_na(record.created.as_ref())));
    ctx.log(format!("  Last Modified:  {}", or_na(record.modified.as_ref())));
}

fn or_na<T: Display>(value: Option<&T>) -> String {
    value
        .map(ToString::to_string)
        .unwrap_or_else(|| "N/A".to_string())
}

fn local_naive(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

/// Lowercases entries and gives each a leading dot.
fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{ext}")
            }
        })
        .collect()
}

fn is_excluded(path: &Path, excluded: &[String]) -> bool {
    let name = path
        .file_name()
        .map(|v| v.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    excluded.iter().any(|ext| name.ends_with(ext.as_str()))
}

fn excluded_label(excluded: &[String]) -> String {
    if excluded.is_empty() {
        "no".to_string()
    } else {
        excluded.join(", ")
    }
}
