//! Locating the stem files Demucs writes.
//!
//! Demucs lays its output out as `<output_dir>/<model>/<track>/<name>.mp3`,
//! where `<track>` is the input file name without its extension.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::executor::SeparationError;
use super::model::{SeparationParams, Stem};

/// Extension of every exported stem.
pub const STEM_EXTENSION: &str = "mp3";

/// One stem produced by a separation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StemFile {
    /// Stem name as written by Demucs (`vocals`, `no_vocals`, ...).
    pub name: String,
    pub path: PathBuf,
}

/// Stem names a run with `params` is expected to produce.
pub fn expected_stems(params: &SeparationParams) -> Vec<String> {
    match params.two_stems {
        Some(stem) => vec![stem.as_str().to_string(), format!("no_{}", stem.as_str())],
        None => Stem::ALL.iter().map(|s| s.as_str().to_string()).collect(),
    }
}

/// Directory Demucs writes the stems of `input` into.
pub fn track_dir(output_dir: &Path, params: &SeparationParams, input: &Path) -> PathBuf {
    let track = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(params.model.as_str()).join(track)
}

/// Resolve every expected stem file, failing if any is missing.
pub fn locate_stems(
    output_dir: &Path,
    params: &SeparationParams,
    input: &Path,
) -> Result<Vec<StemFile>, SeparationError> {
    let dir = track_dir(output_dir, params, input);

    let mut stems = Vec::new();
    let mut missing = Vec::new();
    for name in expected_stems(params) {
        let path = dir.join(format!("{name}.{STEM_EXTENSION}"));
        if path.is_file() {
            stems.push(StemFile { name, path });
        } else {
            missing.push(name);
        }
    }

    if !missing.is_empty() {
        return Err(SeparationError::MissingOutput {
            dir: dir.to_string_lossy().into_owned(),
            missing,
        });
    }
    Ok(stems)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
