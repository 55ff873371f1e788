use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use stemsplit_core::separation::{DemucsSeparator, StemSeparator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stemsplit_api::background::job_retention;
use stemsplit_api::config::ServerConfig;
use stemsplit_api::router::build_app_router;
use stemsplit_api::state::AppState;

/// How long shutdown waits for in-flight separations.
const JOB_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        host = %config.host,
        port = %config.port,
        demucs = %config.demucs.program,
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Loaded server configuration"
    );

    for dir in [&config.upload_dir, &config.work_dir, &config.storage_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    // --- Separator ---
    let separator: Arc<dyn StemSeparator> = Arc::new(DemucsSeparator::new(config.demucs.clone()));
    match separator.probe().await {
        Ok(version) => tracing::info!(%version, "Separator available"),
        Err(e) => tracing::warn!(error = %e, "Separator probe failed; jobs will fail until it is installed"),
    }

    // --- App state ---
    let state = AppState::new(config.clone(), separator);

    // --- Job retention ---
    let retention_cancel = tokio_util::sync::CancellationToken::new();
    let retention_handle = tokio::spawn(job_retention::run(
        Arc::clone(&state.jobs),
        Arc::clone(&state.store),
        Duration::from_secs(config.job_retention_secs),
        Duration::from_secs(config.retention_interval_secs),
        retention_cancel.clone(),
    ));

    // --- Router ---
    let runner = state.runner.clone();
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Job retention task stopped");

    if runner.shutdown(JOB_DRAIN_TIMEOUT).await {
        tracing::info!("All running jobs finished");
    } else {
        tracing::warn!("Jobs still running at shutdown; their separators will be killed");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stemsplit_api=debug,stemsplit_core=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a container
/// runtime.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
