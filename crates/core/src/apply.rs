use crate::planner::{RenameCandidate, RenamePlan};
use crate::report::{RunContext, RunStage};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const TEMP_PREFIX: &str = ".mdr_tmp_";

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct ApplyResult {
    pub applied: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// A changed candidate and where its file currently sits.
#[derive(Debug, Clone)]
struct PendingRename<'a> {
    candidate: &'a RenameCandidate,
    current_path: PathBuf,
    staged: bool,
}

/// Renames every changed candidate of `plan` inside its folder.
///
/// A file whose target is another batch file's current name is first moved
/// to a hidden temporary name that keeps its original file name; every
/// other file is renamed directly. Direct renames run first so the names
/// they vacate are free for the staged files. A file that cannot be moved
/// is logged, put back under its original name and skipped; renames that
/// already succeeded stay in place. Only an inconsistent plan is rejected,
/// before anything is touched.
pub fn apply_plan(plan: &RenamePlan, ctx: &mut RunContext<'_>) -> Result<ApplyResult> {
    validate_plan(plan)?;

    ctx.stage(RunStage::RenamingFiles);
    ctx.log("Step 5:  Renaming files...");

    let held_names: HashSet<&Path> = plan
        .candidates
        .iter()
        .map(|c| c.original_path.as_path())
        .collect();

    let mut result = ApplyResult::default();
    let mut direct = Vec::<PendingRename<'_>>::new();
    let mut staged = Vec::<PendingRename<'_>>::new();
    for (index, candidate) in plan.candidates.iter().enumerate() {
        if !candidate.changed {
            result.unchanged += 1;
            ctx.log(format!(
                "Unchanged:  {}",
                candidate.original_path.display()
            ));
            continue;
        }

        if !held_names.contains(candidate.target_path.as_path()) {
            direct.push(PendingRename {
                candidate,
                current_path: candidate.original_path.clone(),
                staged: false,
            });
            continue;
        }

        let temp_path = temp_path_for(&candidate.original_path, index);
        match fs::rename(&candidate.original_path, &temp_path) {
            Ok(()) => staged.push(PendingRename {
                candidate,
                current_path: temp_path,
                staged: true,
            }),
            Err(err) => {
                result.failed += 1;
                log_failure(ctx, candidate, &err);
            }
        }
    }

    for entry in direct.iter().chain(staged.iter()) {
        let candidate = entry.candidate;
        let outcome = if candidate.target_path.exists() {
            Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", candidate.target_path.display()),
            ))
        } else {
            fs::rename(&entry.current_path, &candidate.target_path)
        };

        match outcome {
            Ok(()) => {
                result.applied += 1;
                ctx.log(format!(
                    "Renamed:  {}  -->  {}",
                    candidate.original_path.display(),
                    candidate.new_name
                ));
            }
            Err(err) => {
                result.failed += 1;
                log_failure(ctx, candidate, &err);
                if entry.staged {
                    restore_original(entry, ctx);
                }
            }
        }
    }

    ctx.log("Renaming complete.");
    Ok(result)
}

fn log_failure(ctx: &mut RunContext<'_>, candidate: &RenameCandidate, err: &io::Error) {
    tracing::warn!(
        path = %candidate.original_path.display(),
        target = %candidate.target_path.display(),
        error = %err,
        "rename failed"
    );
    let label = if err.kind() == io::ErrorKind::PermissionDenied {
        "PermissionError"
    } else {
        "RenameError"
    };
    ctx.log(format!(
        "{}:  {} on file {}",
        label,
        err,
        candidate.original_path.display()
    ));
}

fn restore_original(entry: &PendingRename<'_>, ctx: &mut RunContext<'_>) {
    let original = &entry.candidate.original_path;
    if let Err(err) = fs::rename(&entry.current_path, original) {
        tracing::warn!(
            temp = %entry.current_path.display(),
            path = %original.display(),
            error = %err,
            "could not restore original name"
        );
        ctx.log(format!(
            "[ERROR] Could not restore {} from {}: {}",
            original.display(),
            entry.current_path.display(),
            err
        ));
    }
}

fn validate_plan(plan: &RenamePlan) -> Result<()> {
    let folder = fs::canonicalize(&plan.folder)
        .with_context(|| format!("could not resolve folder: {}", plan.folder.display()))?;
    let mut seen_original_paths = HashSet::<&Path>::new();
    let mut seen_target_paths = HashSet::<&Path>::new();

    for candidate in &plan.candidates {
        if !seen_original_paths.insert(candidate.original_path.as_path()) {
            bail!(
                "plan lists the same file twice: {}",
                candidate.original_path.display()
            );
        }
        if !seen_target_paths.insert(candidate.target_path.as_path()) {
            bail!(
                "plan assigns the same name twice: {}",
                candidate.target_path.display()
            );
        }

        let parent = candidate
            .target_path
            .parent()
            .with_context(|| {
                format!(
                    "rename target has no parent directory: {}",
                    candidate.target_path.display()
                )
            })?;
        let parent = fs::canonicalize(parent)
            .with_context(|| format!("could not resolve target folder: {}", parent.display()))?;
        if parent != folder {
            bail!(
                "rename target is outside the folder: {}",
                candidate.target_path.display()
            );
        }
    }

    Ok(())
}

fn temp_path_for(original_path: &Path, index: usize) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let parent = original_path.parent().unwrap_or_else(|| Path::new("."));
    let mut name = OsString::from(format!("{}{}_{}_", TEMP_PREFIX, now, index));
    name.push(original_path.file_name().unwrap_or_else(|| OsStr::new("file")));
    parent.join(name)
}
