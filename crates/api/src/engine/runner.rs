//! Background execution of separation jobs.
//!
//! [`JobRunner::submit`] spawns one task per job. A semaphore caps how many
//! separations run at once; jobs waiting for a permit stay `queued`.
//! Progress is reported in fixed bands:
//!
//! ```text
//! 0.1        picked up
//! 0.2..0.8   separator running (its own progress scaled into this band)
//! 0.8        publishing stems
//! 1.0        completed
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use stemsplit_core::error::CoreError;
use stemsplit_core::jobs::{Job, JobRegistry, SeparationResult};
use stemsplit_core::separation::{
    ProgressCallback, SeparationError, SeparationRequest, StemSeparator,
};
use stemsplit_core::storage::StemStore;
use stemsplit_core::types::JobId;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;

/// Progress when the separator is launched.
pub const PROGRESS_SEPARATING: f32 = 0.2;

/// Progress when stems are being published.
pub const PROGRESS_PUBLISHING: f32 = 0.8;

/// Map separator progress (`0..=1`) into the separating band.
pub fn scale_separator_progress(fraction: f32) -> f32 {
    PROGRESS_SEPARATING + fraction.clamp(0.0, 1.0) * (PROGRESS_PUBLISHING - PROGRESS_SEPARATING)
}

/// Errors that fail a job.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Separation(#[from] SeparationError),

    #[error(transparent)]
    Storage(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Separation task panicked")]
    Panicked,
}

/// Runs queued jobs against a [`StemSeparator`].
///
/// Cheaply cloneable; every clone shares the same permits and task tracker.
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    separator: Arc<dyn StemSeparator>,
    store: Arc<StemStore>,
    work_dir: PathBuf,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        separator: Arc<dyn StemSeparator>,
        store: Arc<StemStore>,
        work_dir: PathBuf,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            registry,
            separator,
            store,
            work_dir,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Start processing `job_id` in the background.
    pub fn submit(&self, job_id: JobId) {
        let runner = self.clone();
        self.tracker.spawn(async move { runner.run(job_id).await });
    }

    /// Stop accepting work and wait up to `timeout` for running jobs.
    /// Returns `false` if jobs were still running when the timeout expired.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        self.permits.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
    }

    async fn run(&self, job_id: JobId) {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            self.registry
                .fail(job_id, "Server is shutting down")
                .await;
            self.discard_input(job_id).await;
            return;
        };

        let Some(job) = self.registry.get(job_id).await else {
            tracing::warn!(%job_id, "Job vanished before it could start");
            return;
        };

        if !self.registry.mark_processing(job_id).await {
            tracing::warn!(%job_id, status = ?job.status, "Job not queued, skipping");
            return;
        }

        tracing::info!(
            %job_id,
            model = %job.params.model,
            two_stems = ?job.params.two_stems,
            shifts = job.params.shifts,
            "Separation started"
        );

        let scratch = self.work_dir.join(job_id.to_string());

        // Run in its own task so a panic still ends in `failed` and cleanup.
        let runner = self.clone();
        let task_job = job.clone();
        let task_scratch = scratch.clone();
        let outcome = match tokio::spawn(async move {
            runner.execute(&task_job, &task_scratch).await
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Separation task aborted");
                Err(RunError::Panicked)
            }
        };

        match outcome {
            Ok(result) => {
                self.registry.complete(job_id, result).await;
                tracing::info!(%job_id, model = %job.params.model, "Separation completed");
            }
            Err(e) => {
                self.registry.fail(job_id, e.to_string()).await;
                tracing::error!(%job_id, model = %job.params.model, error = %e, "Separation failed");
                if let Err(e) = self.store.remove(job_id).await {
                    tracing::warn!(%job_id, error = %e, "Failed to remove partial stems");
                }
            }
        }

        remove_path(&job.input_path, false).await;
        remove_path(&scratch, true).await;
    }

    async fn execute(&self, job: &Job, scratch: &Path) -> Result<SeparationResult, RunError> {
        let job_id = job.id;
        tokio::fs::create_dir_all(scratch).await?;
        self.registry
            .set_progress(job_id, PROGRESS_SEPARATING)
            .await;

        // Progress callbacks are synchronous; forward them to the registry
        // through a channel drained by a dedicated task.
        let (tx, mut rx) = mpsc::unbounded_channel::<f32>();
        let registry = Arc::clone(&self.registry);
        let forwarder = tokio::spawn(async move {
            while let Some(fraction) = rx.recv().await {
                registry
                    .set_progress(job_id, scale_separator_progress(fraction))
                    .await;
            }
        });
        let progress: ProgressCallback = Box::new(move |fraction| {
            let _ = tx.send(fraction);
        });

        let request = SeparationRequest {
            input: job.input_path.clone(),
            output_dir: scratch.to_path_buf(),
            params: job.params.clone(),
        };
        let separated = self.separator.separate(&request, progress).await;
        // The callback (and its sender) is gone once `separate` returns.
        let _ = forwarder.await;
        let stems = separated?;

        self.registry
            .set_progress(job_id, PROGRESS_PUBLISHING)
            .await;
        let result = self.store.publish(job_id, &stems).await?;
        Ok(result)
    }

    async fn discard_input(&self, job_id: JobId) {
        if let Some(job) = self.registry.get(job_id).await {
            remove_path(&job.input_path, false).await;
        }
    }
}

/// Best-effort removal of a file or directory; a missing path is fine.
async fn remove_path(path: &Path, is_dir: bool) {
    let result = if is_dir {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    if let Err(e) = result {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to clean up");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
