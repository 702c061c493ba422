//! Process execution utilities with timeout support
//!
//! Provides helpers for running external processes (ffmpeg, ffprobe, yt-dlp)
//! with configurable timeouts so a hung process never blocks the pipeline.
//! Arguments are always passed as discrete tokens, never through a shell.

use std::collections::VecDeque;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::core::error::PipelineError;

/// Default timeout for ffprobe metadata queries (30 seconds)
pub const FFPROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum stderr lines kept from a long-running process
pub const STDERR_TAIL_LINES: usize = 200;

/// Run an async Command with a timeout.
///
/// stdout and stderr are drained concurrently so a chatty process never
/// blocks on a full pipe. When the timeout fires the process is killed and
/// reaped before the error is returned.
pub async fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output, PipelineError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| PipelineError::other(format!("Failed to start process: {}", e)))?;
    let stdout_task = tokio::spawn(read_all(child.stdout.take()));
    let stderr_task = tokio::spawn(read_all(child.stderr.take()));

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            log::error!("Process timed out after {}s, killing", timeout.as_secs());
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill timed out process: {}", e);
            }
            return Err(PipelineError::TranscodeTimeout {
                seconds: timeout.as_secs(),
            });
        }
    };

    Ok(Output {
        status,
        stdout: stdout_task.await.unwrap_or_default(),
        stderr: stderr_task.await.unwrap_or_default(),
    })
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            log::debug!("Failed to read process output: {}", e);
        }
    }
    buf
}

/// Bounded ring of the most recent lines a process wrote.
#[derive(Debug, Default)]
pub struct LineTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LineTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Last `max_lines` non-empty lines of `text`, joined with newlines.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Checks whether a binary can be started (`<bin> <version_flag>` exits successfully).
pub async fn tool_available(bin: &str, version_flag: &str) -> bool {
    let mut cmd = Command::new(bin);
    cmd.arg(version_flag);
    matches!(
        run_with_timeout(&mut cmd, Duration::from_secs(15)).await,
        Ok(output) if output.status.success()
    )
}
