//! Demucs-backed [`StemSeparator`].
//!
//! Runs `python3 -m demucs.separate <args>` (program and leading arguments
//! are configurable) and reports tqdm progress from its stderr.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::command::{build_args, parse_progress, BagProgress};
use super::executor::{ProgressCallback, SeparationError, SeparationRequest, StemSeparator};
use super::output::{locate_stems, StemFile};
use super::subprocess::{run_streaming, StderrTail};

/// Characters of stderr kept in a failure message.
const MAX_ERROR_CHARS: usize = 500;

/// How long `probe` waits for `--version`.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// How to invoke Demucs.
#[derive(Debug, Clone)]
pub struct DemucsConfig {
    /// Executable to spawn (default `python3`).
    pub program: String,
    /// Arguments placed before the generated ones (default `-m demucs.separate`).
    pub leading_args: Vec<String>,
    /// Upper bound on a single run.
    pub timeout: Duration,
}

impl Default for DemucsConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            leading_args: vec!["-m".to_string(), "demucs.separate".to_string()],
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Separator that shells out to the Demucs CLI.
pub struct DemucsSeparator {
    config: DemucsConfig,
}

impl DemucsSeparator {
    pub fn new(config: DemucsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DemucsConfig {
        &self.config
    }

    fn command(&self, request: &SeparationRequest) -> (Command, Vec<String>) {
        let mut args = self.config.leading_args.clone();
        args.extend(build_args(
            &request.params,
            &request.input,
            &request.output_dir,
        ));

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args);
        (cmd, args)
    }
}

#[async_trait]
impl StemSeparator for DemucsSeparator {
    async fn separate(
        &self,
        request: &SeparationRequest,
        progress: ProgressCallback,
    ) -> Result<Vec<StemFile>, SeparationError> {
        if !request.input.is_file() {
            return Err(SeparationError::InputNotFound(
                request.input.to_string_lossy().into_owned(),
            ));
        }
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let (mut cmd, args) = self.command(request);
        tracing::debug!(
            program = %self.config.program,
            args = %args.join(" "),
            "Starting Demucs"
        );

        let mut tail = StderrTail::default();
        let mut bag = BagProgress::new(request.params.model.bag_size());
        let status = run_streaming(&mut cmd, self.config.timeout, |line| {
            match parse_progress(line) {
                Some(fraction) => progress(bag.update(fraction)),
                None => {
                    tracing::trace!(line, "demucs stderr");
                    tail.push(line);
                }
            }
        })
        .await?;

        if !status.success() {
            let stderr = if tail.is_empty() {
                "no error output".to_string()
            } else {
                tail.summary(MAX_ERROR_CHARS)
            };
            return Err(SeparationError::Failed {
                exit_code: status.code(),
                stderr,
            });
        }

        locate_stems(&request.output_dir, &request.params, &request.input)
    }

    async fn probe(&self) -> Result<String, SeparationError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("--version").kill_on_drop(true);

        let output = tokio::time::timeout(PROBE_TIMEOUT, cmd.output())
            .await
            .map_err(|_| SeparationError::Timeout {
                elapsed_secs: PROBE_TIMEOUT.as_secs(),
            })?
            .map_err(SeparationError::Spawn)?;

        if !output.status.success() {
            return Err(SeparationError::Failed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // Python 2 printed its version on stderr; accept either stream.
        let text = if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        Ok(String::from_utf8_lossy(text).trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
