//! Domain logic for the stem separation service.
//!
//! Everything here is free of HTTP concerns: model and parameter
//! validation, the Demucs command line, the subprocess runner, the
//! in-memory job registry, and stem publishing.

pub mod error;
pub mod jobs;
pub mod separation;
pub mod storage;
pub mod types;
