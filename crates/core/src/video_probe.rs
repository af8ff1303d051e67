use crate::extractor::ExtractionError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Reads container-level `creation_time` tags through `ffprobe`.
#[derive(Debug, Clone)]
pub struct VideoProbe {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl VideoProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kills the probe and reports a failure once `timeout` elapses.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the raw `creation_time` tag, or `None` when the container has
    /// none.
    pub fn creation_time(&self, path: &Path) -> Result<Option<String>, ExtractionError> {
        let mut command = Command::new(&self.program);
        command
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "format_tags=creation_time",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(|err| self.failure(err.to_string()))?;
        let output = match self.timeout {
            Some(timeout) => self.wait_with_timeout(child, timeout)?,
            None => child
                .wait_with_output()
                .map_err(|err| self.failure(err.to_string()))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => format!("exited with {}", output.status),
                detail => format!("exited with {}: {}", output.status, detail),
            };
            return Err(self.failure(reason));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }

    // The pipes are drained on their own threads: a process the probe left
    // behind may keep them open after the probe itself has exited.
    fn wait_with_timeout(&self, mut child: Child, timeout: Duration) -> Result<Output, ExtractionError> {
        let started = Instant::now();
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(self.timed_out(timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => return Err(self.failure(err.to_string())),
            }
        };

        let stdout = stdout
            .recv_timeout(timeout.saturating_sub(started.elapsed()))
            .map_err(|_| self.timed_out(timeout))?;
        let stderr = stderr
            .recv_timeout(timeout.saturating_sub(started.elapsed()))
            .map_err(|_| self.timed_out(timeout))?;
        Ok(Output {
            status,
            stdout,
            stderr,
        })
    }

    fn timed_out(&self, timeout: Duration) -> ExtractionError {
        ExtractionError::ProbeTimeout {
            program: self.program.display().to_string(),
            timeout,
        }
    }

    fn failure(&self, reason: String) -> ExtractionError {
        ExtractionError::Probe {
            program: self.program.display().to_string(),
            reason,
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(err) = pipe.read_to_end(&mut buf) {
                tracing::debug!(error = %err, "could not read probe output");
            }
        }
        let _ = tx.send(buf);
    });
    rx
}
