//! Publishing finished stems.
//!
//! Stems are copied out of the separator's scratch directory into
//! `<root>/<job_id>/<name>.mp3` and exposed as `<base_url>/<job_id>/<name>.mp3`.
//! The HTTP server serves `root` under `/files`, so the default base URL
//! points straight back at it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::jobs::SeparationResult;
use crate::separation::output::STEM_EXTENSION;
use crate::separation::StemFile;
use crate::types::JobId;

/// Local directory of published stems plus the public URL prefix for it.
#[derive(Debug, Clone)]
pub struct StemStore {
    root: PathBuf,
    base_url: String,
}

impl StemStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Public URL for stem `name` of `job_id`.
    pub fn url_for(&self, job_id: JobId, name: &str) -> String {
        format!("{}/{job_id}/{name}.{STEM_EXTENSION}", self.base_url)
    }

    /// Copy `stems` into the job's directory and build the result.
    pub async fn publish(
        &self,
        job_id: JobId,
        stems: &[StemFile],
    ) -> Result<SeparationResult, CoreError> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoreError::Internal(format!("create {}: {e}", dir.display())))?;

        let mut urls = BTreeMap::new();
        for stem in stems {
            let target = dir.join(format!("{}.{STEM_EXTENSION}", stem.name));
            tokio::fs::copy(&stem.path, &target).await.map_err(|e| {
                CoreError::Internal(format!("copy {}: {e}", stem.path.display()))
            })?;
            urls.insert(stem.name.clone(), self.url_for(job_id, &stem.name));
        }

        Ok(SeparationResult {
            stems: urls,
            id: job_id,
        })
    }

    /// Delete everything published for `job_id`. A missing directory is fine.
    pub async fn remove(&self, job_id: JobId) -> Result<(), CoreError> {
        let dir = self.job_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Internal(format!(
                "remove {}: {e}",
                dir.display()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
