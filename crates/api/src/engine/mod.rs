//! Job execution engine.
//!
//! Owns the background tasks that turn queued uploads into published stems.

pub mod runner;

pub use runner::JobRunner;
