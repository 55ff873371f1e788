//! Separation models, stems, and validated job parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Upper bound on Demucs random shifts. Each shift is a full extra pass.
pub const MAX_SHIFTS: u32 = 20;

/// Pretrained Demucs models a job may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparationModel {
    #[default]
    Htdemucs,
    HtdemucsFt,
    MdxExtra,
    MdxQ,
}

impl SeparationModel {
    /// All models in the order they are advertised by `GET /models`.
    pub const ALL: [SeparationModel; 4] = [
        SeparationModel::Htdemucs,
        SeparationModel::HtdemucsFt,
        SeparationModel::MdxExtra,
        SeparationModel::MdxQ,
    ];

    /// Name passed to Demucs via `-n`, also used as its output sub-directory.
    pub fn as_str(self) -> &'static str {
        match self {
            SeparationModel::Htdemucs => "htdemucs",
            SeparationModel::HtdemucsFt => "htdemucs_ft",
            SeparationModel::MdxExtra => "mdx_extra",
            SeparationModel::MdxQ => "mdx_q",
        }
    }

    /// Number of sub-models Demucs runs in sequence. Each one draws its
    /// own progress bar.
    pub fn bag_size(self) -> usize {
        match self {
            SeparationModel::Htdemucs => 1,
            SeparationModel::HtdemucsFt | SeparationModel::MdxExtra | SeparationModel::MdxQ => 4,
        }
    }
}

impl fmt::Display for SeparationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeparationModel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid model. Choose one of: {}",
                    available_models().join(", ")
                ))
            })
    }
}

/// Names of every selectable model.
pub fn available_models() -> Vec<&'static str> {
    SeparationModel::ALL.iter().map(|m| m.as_str()).collect()
}

/// A single source isolated from the mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl Stem {
    pub const ALL: [Stem; 4] = [Stem::Vocals, Stem::Drums, Stem::Bass, Stem::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
        }
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stem {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| {
            CoreError::Validation(
                "two_stems must be 'vocals', 'drums', 'bass' or 'other'".to_string(),
            )
        })
    }
}

/// Validated options for one separation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparationParams {
    pub model: SeparationModel,
    /// When set, Demucs isolates only this stem plus its complement.
    pub two_stems: Option<Stem>,
    /// Random shift passes; `1` disables the augmentation.
    pub shifts: u32,
}

impl Default for SeparationParams {
    fn default() -> Self {
        Self {
            model: SeparationModel::default(),
            two_stems: None,
            shifts: 1,
        }
    }
}

impl SeparationParams {
    /// Build parameters from raw form values, applying defaults for
    /// missing fields. An empty `two_stems` value means four-stem mode.
    pub fn from_form(
        model: Option<&str>,
        two_stems: Option<&str>,
        shifts: Option<&str>,
    ) -> Result<Self, CoreError> {
        let model = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(name) => name.parse()?,
            None => SeparationModel::default(),
        };

        let two_stems = match two_stems.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => Some(name.parse()?),
            None => None,
        };

        let shifts = match shifts.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                CoreError::Validation(format!("shifts must be an integer, got '{raw}'"))
            })?,
            None => 1,
        };

        let params = Self {
            model,
            two_stems,
            shifts,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=MAX_SHIFTS).contains(&self.shifts) {
            return Err(CoreError::Validation(format!(
                "shifts must be between 1 and {MAX_SHIFTS}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
