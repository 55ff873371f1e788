use std::sync::Arc;

use stemsplit_core::jobs::JobRegistry;
use stemsplit_core::separation::StemSeparator;
use stemsplit_core::storage::StemStore;

use crate::config::ServerConfig;
use crate::engine::JobRunner;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Every job submitted since startup (minus those purged by retention).
    pub jobs: Arc<JobRegistry>,
    /// Background executor for queued jobs.
    pub runner: JobRunner,
    /// Separation backend, probed by the health check.
    pub separator: Arc<dyn StemSeparator>,
    /// Published stem storage.
    pub store: Arc<StemStore>,
}

impl AppState {
    /// Wire the registry, store and runner around `separator`.
    pub fn new(config: ServerConfig, separator: Arc<dyn StemSeparator>) -> Self {
        let jobs = Arc::new(JobRegistry::new());
        let store = Arc::new(StemStore::new(
            config.storage_dir.clone(),
            config.storage_base_url.clone(),
        ));
        let runner = JobRunner::new(
            Arc::clone(&jobs),
            Arc::clone(&separator),
            Arc::clone(&store),
            config.work_dir.clone(),
            config.max_concurrent_jobs,
        );

        Self {
            config: Arc::new(config),
            jobs,
            runner,
            separator,
            store,
        }
    }
}
