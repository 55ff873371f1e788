//! Handlers for stem separation: upload, status polling, and model listing.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use stemsplit_core::error::CoreError;
use stemsplit_core::jobs::{Job, JobStatus, StatusView};
use stemsplit_core::separation::{available_models, SeparationParams};
use stemsplit_core::types::JobId;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Longest file extension carried over from the uploaded file name.
const MAX_EXTENSION_LEN: usize = 8;

/// Response to a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: JobId,
    pub status: JobStatus,
}

/// Raw multipart fields, collected before validation.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<PathBuf>,
    model: Option<String>,
    two_stems: Option<String>,
    shifts: Option<String>,
}

impl UploadForm {
    /// Remove the stored upload, if any.
    async fn discard(&self) {
        if let Some(path) = &self.file {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /separate
///
/// Multipart form: `file` (required), `model`, `two_stems`, `shifts`.
/// Stores the upload, queues a job, and returns its id.
pub async fn separate_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<SubmitResponse>> {
    let job_id = uuid::Uuid::new_v4();
    let mut form = UploadForm::default();

    if let Err(e) = read_form(&mut multipart, &state.config.upload_dir, job_id, &mut form).await {
        form.discard().await;
        return Err(e);
    }

    let Some(input_path) = form.file.clone() else {
        return Err(AppError::BadRequest("Missing required 'file' field".into()));
    };

    let params = match SeparationParams::from_form(
        form.model.as_deref(),
        form.two_stems.as_deref(),
        form.shifts.as_deref(),
    ) {
        Ok(params) => params,
        Err(e) => {
            form.discard().await;
            return Err(e.into());
        }
    };

    tracing::info!(
        %job_id,
        model = %params.model,
        two_stems = ?params.two_stems,
        shifts = params.shifts,
        "Separation job queued"
    );

    state
        .jobs
        .insert(Job::new(job_id, params, input_path))
        .await;
    state.runner.submit(job_id);

    Ok(Json(SubmitResponse {
        id: job_id,
        status: JobStatus::Queued,
    }))
}

/// Drain the multipart stream into `form`, streaming the audio to disk.
async fn read_form(
    multipart: &mut Multipart,
    upload_dir: &FsPath,
    job_id: JobId,
    form: &mut UploadForm,
) -> AppResult<()> {
    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                if form.file.is_some() {
                    return Err(AppError::BadRequest("Only one 'file' field is allowed".into()));
                }
                // Options sent ahead of the file are checked before any bytes hit disk.
                SeparationParams::from_form(
                    form.model.as_deref(),
                    form.two_stems.as_deref(),
                    form.shifts.as_deref(),
                )?;
                let filename = field.file_name().unwrap_or("").to_string();
                tokio::fs::create_dir_all(upload_dir)
                    .await
                    .map_err(|e| AppError::InternalError(format!("create upload dir: {e}")))?;

                let path = upload_dir.join(upload_file_name(job_id, &filename));
                form.file = Some(path.clone());

                let mut out = tokio::fs::File::create(&path)
                    .await
                    .map_err(|e| AppError::InternalError(format!("create upload: {e}")))?;
                let mut written: u64 = 0;
                while let Some(chunk) = field.chunk().await? {
                    written += chunk.len() as u64;
                    out.write_all(&chunk)
                        .await
                        .map_err(|e| AppError::InternalError(format!("write upload: {e}")))?;
                }
                out.flush()
                    .await
                    .map_err(|e| AppError::InternalError(format!("flush upload: {e}")))?;

                if written == 0 {
                    return Err(AppError::BadRequest("Uploaded file is empty".into()));
                }
                tracing::debug!(%job_id, filename = %filename, bytes = written, "Upload stored");
            }
            "model" => form.model = Some(field.text().await?),
            "two_stems" => form.two_stems = Some(field.text().await?),
            "shifts" => form.shifts = Some(field.text().await?),
            _ => {} // ignore unknown fields
        }
    }
    Ok(())
}

/// `<job_id>.<ext>`, keeping the client's extension only if it is short
/// and alphanumeric.
fn upload_file_name(job_id: JobId, client_name: &str) -> String {
    let ext = FsPath::new(client_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= MAX_EXTENSION_LEN && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase);

    match ext {
        Some(ext) if !ext.is_empty() => format!("{job_id}.{ext}"),
        _ => job_id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /status/{job_id}
///
/// Returns status and progress, plus `result` once completed or `error`
/// once failed. Unknown ids (including malformed ones) are 404.
pub async fn job_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<StatusView>> {
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: raw_id.clone(),
        })
    };

    let job_id: JobId = raw_id.parse().map_err(|_| not_found())?;
    let job = state.jobs.get(job_id).await.ok_or_else(not_found)?;

    Ok(Json(job.status_view()))
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// GET /models
pub async fn list_models() -> Json<Vec<&'static str>> {
    Json(available_models())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
