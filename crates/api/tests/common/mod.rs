#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use stemsplit_core::separation::output::{expected_stems, track_dir};
use stemsplit_core::separation::{
    ProgressCallback, SeparationError, SeparationRequest, StemFile, StemSeparator,
};
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

use stemsplit_api::config::ServerConfig;
use stemsplit_api::router::build_app_router;
use stemsplit_api::state::AppState;

pub const BOUNDARY: &str = "stemsplit-test-boundary";

/// What [`FakeSeparator::separate`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Write every expected stem and succeed.
    Succeed,
    /// Exit like a crashed Demucs run.
    Fail,
    /// Panic halfway through.
    Panic,
    /// Report halfway progress, then wait on [`FakeSeparator::gate`]
    /// before succeeding.
    Block,
}

/// In-process stand-in for Demucs.
///
/// Writes small placeholder files in the same layout Demucs uses and
/// reports progress halfway and at the end.
pub struct FakeSeparator {
    behavior: FakeBehavior,
    available: bool,
    pub calls: AtomicUsize,
    /// Releases one blocked run per `notify_one`.
    pub gate: Notify,
}

impl FakeSeparator {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            available: true,
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        }
    }

    /// A separator whose probe fails, as when Demucs is not installed.
    pub fn unavailable() -> Self {
        Self {
            behavior: FakeBehavior::Fail,
            available: false,
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        }
    }
}

#[async_trait]
impl StemSeparator for FakeSeparator {
    async fn separate(
        &self,
        request: &SeparationRequest,
        progress: ProgressCallback,
    ) -> Result<Vec<StemFile>, SeparationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !request.input.is_file() {
            return Err(SeparationError::InputNotFound(
                request.input.display().to_string(),
            ));
        }

        progress(0.5);
        match self.behavior {
            FakeBehavior::Succeed => {}
            FakeBehavior::Fail => {
                return Err(SeparationError::Failed {
                    exit_code: Some(1),
                    stderr: "RuntimeError: CUDA out of memory".to_string(),
                });
            }
            FakeBehavior::Panic => panic!("separator crashed mid-run"),
            FakeBehavior::Block => self.gate.notified().await,
        }

        let dir = track_dir(&request.output_dir, &request.params, &request.input);
        tokio::fs::create_dir_all(&dir).await?;
        let mut stems = Vec::new();
        for name in expected_stems(&request.params) {
            let path = dir.join(format!("{name}.mp3"));
            tokio::fs::write(&path, format!("fake {name}")).await?;
            stems.push(StemFile { name, path });
        }
        progress(1.0);
        Ok(stems)
    }

    async fn probe(&self) -> Result<String, SeparationError> {
        if self.available {
            Ok("fake 1.0".to_string())
        } else {
            Err(SeparationError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "python3 not found",
            )))
        }
    }
}

/// A running test app together with the directories it writes into.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub separator: Arc<FakeSeparator>,
    _dir: TempDir,
}

/// Build a test `ServerConfig` rooted in `dir`.
///
/// Uses the wildcard CORS origin (the container default) and a
/// 30-second request timeout.
pub fn test_config(dir: &TempDir) -> ServerConfig {
    let mut config =
        ServerConfig::from_lookup(|_| None).expect("default configuration is valid");
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.request_timeout_secs = 30;
    config.upload_dir = dir.path().join("uploads");
    config.work_dir = dir.path().join("work");
    config.storage_dir = dir.path().join("stems");
    config.storage_base_url = "http://testserver/files".to_string();
    config
}

/// Build the full application router around `separator`.
///
/// Goes through [`build_app_router`] so integration tests exercise the
/// same middleware stack production uses.
pub fn build_test_app_with(separator: FakeSeparator) -> TestApp {
    build_test_app_configured(separator, |_| {})
}

/// Like [`build_test_app_with`], letting the caller adjust the config first.
pub fn build_test_app_configured<F>(separator: FakeSeparator, adjust: F) -> TestApp
where
    F: FnOnce(&mut ServerConfig),
{
    let dir = tempfile::tempdir().expect("create temp dir");
    let mut config = test_config(&dir);
    adjust(&mut config);
    std::fs::create_dir_all(&config.storage_dir).expect("create storage dir");

    let separator = Arc::new(separator);
    let state = AppState::new(config, separator.clone());
    TestApp {
        router: build_app_router(state.clone()),
        state,
        separator,
        _dir: dir,
    }
}

/// Build a test app whose separator always succeeds.
pub fn build_test_app() -> TestApp {
    build_test_app_with(FakeSeparator::new(FakeBehavior::Succeed))
}

/// Send a GET request.
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// Send any request through a clone of the router.
pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Collect a response body.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Builds a `multipart/form-data` body by hand.
#[derive(Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, contents: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: audio/mpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(contents);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Finish the body and wrap it in a `POST` request to `uri`.
    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

/// POST a form to `/separate`.
pub async fn submit(app: &Router, form: MultipartBuilder) -> Response<Body> {
    send(app, form.into_request("/separate")).await
}

/// Fetch the status view of job `id`.
pub async fn status(app: &Router, id: &str) -> serde_json::Value {
    let response = get(app, &format!("/status/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

/// Poll `/status/{id}` until `done` accepts the status view.
pub async fn wait_for<F>(app: &Router, id: &str, done: F) -> serde_json::Value
where
    F: Fn(&serde_json::Value) -> bool,
{
    for _ in 0..200 {
        let json = status(app, id).await;
        if done(&json) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach the expected state in time");
}

/// Poll `/status/{id}` until the job reaches a terminal state.
pub async fn wait_for_terminal(app: &Router, id: &str) -> serde_json::Value {
    wait_for(app, id, |json| {
        json["status"] == "completed" || json["status"] == "failed"
    })
    .await
}
