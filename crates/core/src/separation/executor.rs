//! Unified separator interface and shared types.
//!
//! Defines [`StemSeparator`], the seam between the job runner and whatever
//! actually splits the audio, along with [`SeparationRequest`] and
//! [`SeparationError`].

use std::path::PathBuf;

use async_trait::async_trait;

use super::model::SeparationParams;
use super::output::StemFile;

/// Receives separation progress as a fraction in `[0, 1]`.
pub type ProgressCallback = Box<dyn Fn(f32) + Send + Sync>;

/// Everything a separator needs for one run.
#[derive(Debug, Clone)]
pub struct SeparationRequest {
    /// Uploaded audio file.
    pub input: PathBuf,
    /// Scratch directory the separator writes into. Owned by the caller.
    pub output_dir: PathBuf,
    pub params: SeparationParams,
}

/// Errors that can occur while separating a track.
#[derive(Debug, thiserror::Error)]
pub enum SeparationError {
    #[error("input file not found: {0}")]
    InputNotFound(String),

    #[error("failed to start separator: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("separator timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    #[error("separator failed (exit code {exit_code:?}): {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("separator output missing in {dir}: {}", .missing.join(", "))]
    MissingOutput { dir: String, missing: Vec<String> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Implemented by every backend able to split a track into stems.
#[async_trait]
pub trait StemSeparator: Send + Sync {
    /// Separate `request.input` into stems inside `request.output_dir`,
    /// reporting progress through `progress`.
    async fn separate(
        &self,
        request: &SeparationRequest,
        progress: ProgressCallback,
    ) -> Result<Vec<StemFile>, SeparationError>;

    /// Check that the backend can run at all. Returns a version string.
    async fn probe(&self) -> Result<String, SeparationError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
