//! Demucs command-line construction and progress parsing.

use std::path::Path;

use super::model::SeparationParams;

/// MP3 bitrate (kbps) for every exported stem.
pub const MP3_BITRATE: u32 = 320;

/// Build the Demucs CLI arguments for one run.
///
/// Order matters to Demucs only for the trailing input path, but the
/// layout is kept fixed so logged command lines are comparable.
pub fn build_args(params: &SeparationParams, input: &Path, output_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--mp3".to_string(),
        "--mp3-bitrate".to_string(),
        MP3_BITRATE.to_string(),
        "-n".to_string(),
        params.model.as_str().to_string(),
    ];

    if let Some(stem) = params.two_stems {
        args.push("--two-stems".to_string());
        args.push(stem.as_str().to_string());
    }

    if params.shifts > 1 {
        args.push("--shifts".to_string());
        args.push(params.shifts.to_string());
    }

    args.push("-o".to_string());
    args.push(output_dir.to_string_lossy().into_owned());
    args.push(input.to_string_lossy().into_owned());
    args
}

/// Parse a tqdm progress line such as ` 45%|████▌     | 9/20 [00:03<00:04]`.
///
/// Returns the percentage before the first `%` as a fraction in `[0, 1]`.
pub fn parse_progress(line: &str) -> Option<f32> {
    let pos = line.find('%')?;
    let head = &line[..pos];
    let start = head
        .char_indices()
        .rev()
        .find(|&(_, c)| !(c.is_ascii_digit() || c == '.'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let percent: f32 = head[start..].parse().ok()?;
    if !percent.is_finite() {
        return None;
    }
    Some((percent / 100.0).clamp(0.0, 1.0))
}

/// Folds the per-sub-model progress bars of a bagged model into one
/// fraction for the whole run.
///
/// A bar that restarts below the previous value is taken as the next
/// sub-model. The result never decreases.
#[derive(Debug, Clone)]
pub struct BagProgress {
    bag_size: usize,
    bar: usize,
    last: f32,
    overall: f32,
}

impl BagProgress {
    pub fn new(bag_size: usize) -> Self {
        Self {
            bag_size: bag_size.max(1),
            bar: 0,
            last: 0.0,
            overall: 0.0,
        }
    }

    /// Record one bar reading and return overall progress in `[0, 1]`.
    pub fn update(&mut self, fraction: f32) -> f32 {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction < self.last && self.bar + 1 < self.bag_size {
            self.bar += 1;
        }
        self.last = fraction;
        let overall = (self.bar as f32 + fraction) / self.bag_size as f32;
        self.overall = self.overall.max(overall.min(1.0));
        self.overall
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
