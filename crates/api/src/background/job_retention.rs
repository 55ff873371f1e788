//! Periodic purge of finished jobs.
//!
//! Completed and failed jobs are kept so clients can read their result;
//! once older than the retention period they are dropped from the registry
//! and their published stems deleted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stemsplit_core::jobs::JobRegistry;
use stemsplit_core::storage::StemStore;
use tokio_util::sync::CancellationToken;

/// Run one purge pass, returning how many jobs were removed.
pub async fn purge_once(registry: &JobRegistry, store: &StemStore, retention: Duration) -> usize {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(retention)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let purged = registry.purge_finished_before(cutoff).await;
    for job_id in &purged {
        if let Err(e) = store.remove(*job_id).await {
            tracing::error!(%job_id, error = %e, "Job retention: failed to delete stems");
        }
    }
    purged.len()
}

/// Run the job retention loop until `cancel` is triggered.
pub async fn run(
    registry: Arc<JobRegistry>,
    store: Arc<StemStore>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Job retention task started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = ticker.tick() => {
                let deleted = purge_once(&registry, &store, retention).await;
                if deleted > 0 {
                    tracing::info!(deleted, "Job retention: purged finished jobs");
                } else {
                    tracing::debug!("Job retention: nothing to purge");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use stemsplit_core::jobs::Job;
    use stemsplit_core::separation::SeparationParams;

    use super::*;

    #[tokio::test]
    async fn purge_removes_finished_jobs_and_their_stems() {
        let root = tempfile::tempdir().unwrap();
        let store = StemStore::new(root.path(), "http://x");
        let registry = JobRegistry::new();

        let job = Job::new(
            uuid::Uuid::new_v4(),
            SeparationParams::default(),
            PathBuf::from("/nonexistent"),
        );
        let id = job.id;
        registry.insert(job).await;
        registry.mark_processing(id).await;
        registry.fail(id, "boom").await;
        std::fs::create_dir_all(store.job_dir(id)).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let deleted = purge_once(&registry, &store, Duration::ZERO).await;

        assert_eq!(deleted, 1);
        assert!(registry.get(id).await.is_none());
        assert!(!store.job_dir(id).exists());
    }

    #[tokio::test]
    async fn purge_keeps_recent_jobs() {
        let root = tempfile::tempdir().unwrap();
        let store = StemStore::new(root.path(), "http://x");
        let registry = JobRegistry::new();

        let job = Job::new(
            uuid::Uuid::new_v4(),
            SeparationParams::default(),
            PathBuf::from("/nonexistent"),
        );
        let id = job.id;
        registry.insert(job).await;
        registry.mark_processing(id).await;
        registry.fail(id, "boom").await;

        let deleted = purge_once(&registry, &store, Duration::from_secs(3600)).await;

        assert_eq!(deleted, 0);
        assert!(registry.get(id).await.is_some());
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let root = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::new(JobRegistry::new()),
            Arc::new(StemStore::new(root.path(), "http://x")),
            Duration::from_secs(60),
            Duration::from_millis(10),
            cancel.clone(),
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("retention loop should stop")
            .unwrap();
    }
}
