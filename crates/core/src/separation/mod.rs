//! Audio stem separation.
//!
//! Parameters are validated in [`model`], turned into a Demucs command line
//! by [`command`], and executed by a [`executor::StemSeparator`]
//! implementation. [`demucs::DemucsSeparator`] is the production backend.

pub mod command;
pub mod demucs;
pub mod executor;
pub mod model;
pub mod output;
pub mod subprocess;

pub use demucs::{DemucsConfig, DemucsSeparator};
pub use executor::{ProgressCallback, SeparationError, SeparationRequest, StemSeparator};
pub use model::{available_models, SeparationModel, SeparationParams, Stem};
pub use output::StemFile;
