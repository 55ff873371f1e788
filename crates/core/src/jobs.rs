//! Separation jobs and the in-memory registry that tracks them.
//!
//! A job moves `queued -> processing -> completed | failed`. Terminal
//! states are final: later transitions are ignored, so a late progress
//! report can never resurrect a finished job.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::separation::SeparationParams;
use crate::types::{JobId, Timestamp};

/// Progress recorded when a worker picks a job up.
pub const PROGRESS_STARTED: f32 = 0.1;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Public URLs of a finished job's stems.
///
/// Serializes flat: one key per stem plus `"id"`, e.g.
/// `{"vocals": "...", "drums": "...", "bass": "...", "other": "...", "id": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeparationResult {
    #[serde(flatten)]
    pub stems: BTreeMap<String, String>,
    pub id: JobId,
}

/// One submitted separation.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Fraction complete, `0.0..=1.0`.
    pub progress: f32,
    pub params: SeparationParams,
    /// Uploaded audio awaiting (or undergoing) separation.
    pub input_path: PathBuf,
    pub result: Option<SeparationResult>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// A freshly queued job.
    pub fn new(id: JobId, params: SeparationParams, input_path: PathBuf) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0.0,
            params,
            input_path,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// What `GET /status/{id}` reports for this job.
    pub fn status_view(&self) -> StatusView {
        StatusView {
            status: self.status,
            progress: self.progress,
            result: match self.status {
                JobStatus::Completed => self.result.clone(),
                _ => None,
            },
            error: match self.status {
                JobStatus::Failed => self.error.clone(),
                _ => None,
            },
        }
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// Client-facing job status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub status: JobStatus,
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SeparationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Tracks every known job.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared between handlers and the job runner.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    /// Snapshot of a job.
    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Snapshot of every job, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Move a queued job to `processing`. Returns `false` if the job is
    /// unknown or no longer queued.
    pub async fn mark_processing(&self, id: JobId) -> bool {
        self.update(id, |job| {
            if job.status != JobStatus::Queued {
                return false;
            }
            job.status = JobStatus::Processing;
            job.progress = job.progress.max(PROGRESS_STARTED);
            true
        })
        .await
    }

    /// Raise the progress of a processing job. Values are clamped to
    /// `[0, 1]` and never move progress backwards.
    pub async fn set_progress(&self, id: JobId, progress: f32) -> bool {
        if !progress.is_finite() {
            return false;
        }
        self.update(id, |job| {
            if job.status != JobStatus::Processing {
                return false;
            }
            let clamped = progress.clamp(0.0, 1.0);
            if clamped <= job.progress {
                return false;
            }
            job.progress = clamped;
            true
        })
        .await
    }

    pub async fn complete(&self, id: JobId, result: SeparationResult) -> bool {
        self.update(id, |job| {
            if job.status.is_terminal() {
                return false;
            }
            job.status = JobStatus::Completed;
            job.progress = 1.0;
            job.result = Some(result);
            true
        })
        .await
    }

    pub async fn fail(&self, id: JobId, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(id, |job| {
            if job.status.is_terminal() {
                return false;
            }
            job.status = JobStatus::Failed;
            job.error = Some(message);
            true
        })
        .await
    }

    pub async fn counts(&self) -> JobCounts {
        let jobs = self.jobs.read().await;
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Remove terminal jobs last updated before `cutoff`, returning their ids.
    pub async fn purge_finished_before(&self, cutoff: Timestamp) -> Vec<JobId> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.status.is_terminal() && job.updated_at < cutoff)
            .map(|job| job.id)
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        expired
    }

    async fn update<F>(&self, id: JobId, apply: F) -> bool
    where
        F: FnOnce(&mut Job) -> bool,
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) => {
                let changed = apply(job);
                if changed {
                    job.touch();
                }
                changed
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
