use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Phases of one rename run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RunStage {
    Waiting,
    Launching,
    FindingFiles,
    ExtractingDates,
    SortingFiles,
    RenamingFiles,
    OutputStatistics,
    Complete,
}

impl RunStage {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            RunStage::Waiting => "Waiting...",
            RunStage::Launching => "Launching...",
            RunStage::FindingFiles => "Finding Files...",
            RunStage::ExtractingDates => "Extracting Dates...",
            RunStage::SortingFiles => "Sorting Files...",
            RunStage::RenamingFiles => "Renaming Files...",
            RunStage::OutputStatistics => "Output Statistics...",
            RunStage::Complete => "Complete...",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunEvent {
    Stage(RunStage),
    Line(String),
}

/// Receives run log lines and stage changes.
pub trait Reporter {
    fn report(&mut self, event: &RunEvent);
}

/// Per-run handle through which the core reports; it holds no other state.
pub struct RunContext<'a> {
    reporter: &'a mut dyn Reporter,
}

impl<'a> RunContext<'a> {
    pub fn new(reporter: &'a mut dyn Reporter) -> Self {
        Self { reporter }
    }

    pub fn report(&mut self, event: RunEvent) {
        self.reporter.report(&event);
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.report(RunEvent::Line(line.into()));
    }

    pub fn stage(&mut self, stage: RunStage) {
        self.report(RunEvent::Stage(stage));
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    pub events: Vec<RunEvent>,
}

impl MemoryReporter {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|event| match event {
            RunEvent::Line(line) => Some(line.as_str()),
            RunEvent::Stage(_) => None,
        })
    }

    pub fn stages(&self) -> Vec<RunStage> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RunEvent::Stage(stage) => Some(*stage),
                RunEvent::Line(_) => None,
            })
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&mut self, event: &RunEvent) {
        self.events.push(event.clone());
    }
}

/// Appends every log line to each of its files.
#[derive(Debug)]
pub struct LogFileReporter {
    files: Vec<(PathBuf, File)>,
}

impl LogFileReporter {
    pub fn create(paths: &[PathBuf]) -> Result<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("could not create log directory: {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("could not open log file: {}", path.display()))?;
            files.push((path.clone(), file));
        }
        Ok(Self { files })
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|(path, _)| path.as_path())
    }
}

impl Reporter for LogFileReporter {
    fn report(&mut self, event: &RunEvent) {
        let RunEvent::Line(line) = event else {
            return;
        };
        for (path, file) in &mut self.files {
            if let Err(err) = writeln!(file, "{line}") {
                tracing::warn!(path = %path.display(), error = %err, "failed to write log line");
            }
        }
    }
}

/// First of `<base>.txt`, `<base>_2.txt`, `<base>_3.txt`, … not present in `dir`.
pub fn unique_log_path(dir: &Path, base_name: &str) -> PathBuf {
    let candidate = dir.join(format!("{base_name}.txt"));
    if !candidate.exists() {
        return candidate;
    }

    let mut n = 2usize;
    loop {
        let candidate = dir.join(format!("{base_name}_{n}.txt"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        unique_log_path, LogFileReporter, MemoryReporter, RunContext, RunEvent, RunStage,
    };
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn unique_log_path_skips_taken_names() {
        let temp = tempdir().expect("tempdir");
        let first = unique_log_path(temp.path(), "file_rename_log");
        assert_eq!(first, temp.path().join("file_rename_log.txt"));

        fs::write(&first, b"x").expect("write first");
        fs::write(temp.path().join("file_rename_log_2.txt"), b"x").expect("write second");
        let third = unique_log_path(temp.path(), "file_rename_log");
        assert_eq!(third, temp.path().join("file_rename_log_3.txt"));
    }

    #[test]
    fn log_file_reporter_writes_lines_to_every_file() {
        let temp = tempdir().expect("tempdir");
        let app_log = temp.path().join("logs").join("run.txt");
        let folder_log = temp.path().join("run.txt");

        let mut reporter =
            LogFileReporter::create(&[app_log.clone(), folder_log.clone()]).expect("create logs");
        {
            let mut ctx = RunContext::new(&mut reporter);
            ctx.stage(RunStage::Launching);
            ctx.log("File Rename Log");
            ctx.log("done");
        }
        drop(reporter);

        for path in [app_log, folder_log] {
            let body = fs::read_to_string(&path).expect("read log");
            assert_eq!(body, "File Rename Log\ndone\n");
        }
    }

    #[test]
    fn memory_reporter_splits_lines_and_stages() {
        let mut reporter = MemoryReporter::default();
        {
            let mut ctx = RunContext::new(&mut reporter);
            ctx.stage(RunStage::FindingFiles);
            ctx.log("Found 0 files");
            ctx.report(RunEvent::Stage(RunStage::Complete));
        }

        assert_eq!(reporter.lines().collect::<Vec<_>>(), vec!["Found 0 files"]);
        assert_eq!(
            reporter.stages(),
            vec![RunStage::FindingFiles, RunStage::Complete]
        );
        assert_eq!(RunStage::ExtractingDates.index(), 3);
        assert_eq!(RunStage::Complete.label(), "Complete...");
    }
}
