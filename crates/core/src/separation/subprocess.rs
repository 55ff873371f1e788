//! Child process management for the separator.
//!
//! [`run_streaming`] spawns a prepared [`Command`], feeds every stderr line
//! to a callback as it arrives, and enforces a wall-clock timeout. Both
//! `\n` and `\r` end a line, since tqdm redraws its bar with carriage
//! returns.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use super::executor::SeparationError;

/// Maximum stderr retained for error reports (64 KiB).
pub const MAX_STDERR_TAIL_BYTES: usize = 64 * 1024;

/// Bounded ring of the most recent output lines.
#[derive(Debug, Default)]
pub struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    pub fn push(&mut self, line: &str) {
        self.bytes += line.len();
        self.lines.push_back(line.to_string());
        while self.bytes > MAX_STDERR_TAIL_BYTES {
            match self.lines.pop_front() {
                Some(old) => self.bytes -= old.len(),
                None => break,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Join the retained lines and keep at most the last `max_chars`.
    pub fn summary(&self, max_chars: usize) -> String {
        let joined = self.lines.iter().cloned().collect::<Vec<_>>().join("\n");
        let count = joined.chars().count();
        if count <= max_chars {
            joined
        } else {
            joined.chars().skip(count - max_chars).collect()
        }
    }
}

/// Spawn `cmd`, stream its stderr line by line into `on_line`, and wait for
/// it to exit within `timeout`.
///
/// Stdout is discarded. The child is killed if the timeout fires or the
/// returned future is dropped.
pub async fn run_streaming<F>(
    cmd: &mut Command,
    timeout: Duration,
    mut on_line: F,
) -> Result<ExitStatus, SeparationError>
where
    F: FnMut(&str) + Send,
{
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(SeparationError::Spawn)?;

    let result = tokio::time::timeout(timeout, drain_and_wait(&mut child, &mut on_line)).await;

    match result {
        Ok(Ok(status)) => Ok(status),
        Ok(Err(e)) => Err(SeparationError::Io(e)),
        Err(_elapsed) => {
            let _ = child.kill().await;
            Err(SeparationError::Timeout {
                elapsed_secs: start.elapsed().as_secs(),
            })
        }
    }
}

async fn drain_and_wait<F>(child: &mut Child, on_line: &mut F) -> std::io::Result<ExitStatus>
where
    F: FnMut(&str) + Send,
{
    if let Some(stderr) = child.stderr.take() {
        read_lines(stderr, on_line).await?;
    }
    child.wait().await
}

/// Read `stream` to EOF, splitting on `\n` and `\r`. Empty lines are skipped.
async fn read_lines<R, F>(mut stream: R, on_line: &mut F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str) + Send,
{
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                emit(&mut pending, on_line);
            } else {
                pending.push(byte);
            }
        }
    }
    emit(&mut pending, on_line);
    Ok(())
}

fn emit<F: FnMut(&str)>(pending: &mut Vec<u8>, on_line: &mut F) {
    if pending.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(pending);
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        on_line(trimmed);
    }
    pending.clear();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
