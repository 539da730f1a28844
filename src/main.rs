use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use vidstream::core::config::AppConfig;
use vidstream::core::shutdown::{ShutdownCoordinator, HTTP_DRAIN_TIMEOUT_SECS};
use vidstream::delivery::handlers;
use vidstream::delivery::router::{self, AppState};
use vidstream::observability::metrics as obs_metrics;
use vidstream::storage::local::LocalVideoStore;

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration (layered: defaults → default.toml → {env}.toml → env vars)
    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(version = env!("CARGO_PKG_VERSION"), "vidstream starting");

    // The recorder must be installed before any metric is recorded.
    let metrics_handle = if config.observability.metrics_enabled {
        match obs_metrics::install_prometheus_recorder() {
            Ok(handle) => {
                obs_metrics::describe_all_metrics();
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let store = Arc::new(
        LocalVideoStore::new(config.storage.video_dir.clone())
            .with_overwrite(config.upload.allow_overwrite),
    );
    if let Err(e) = store.ensure_root().await {
        error!(dir = %config.storage.video_dir.display(), error = %e, "cannot prepare video directory");
        return ExitCode::FAILURE;
    }

    let shutdown = ShutdownCoordinator::new();
    let app_state = AppState::new(config.clone(), store, metrics_handle);
    handlers::log_storage_summary(&app_state).await;

    let uptime_cancel = shutdown.token();
    let start_time = app_state.start_time;
    tokio::spawn(async move {
        obs_metrics::run_uptime_task(start_time, uptime_cancel).await;
    });

    let app = router::build_router(app_state);

    let http_addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            error!(
                host = %config.server.host,
                port = config.server.port,
                error = %e,
                "invalid HTTP bind address"
            );
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(http_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%http_addr, error = %e, "failed to bind HTTP listener");
            return ExitCode::FAILURE;
        }
    };

    info!(
        %http_addr,
        video_dir = %config.storage.video_dir.display(),
        max_upload_size_bytes = config.upload.max_upload_size_bytes,
        "HTTP server listening"
    );

    let shutdown_token = shutdown.token();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
    });

    shutdown.wait_for_signal_and_shutdown().await;

    info!("draining in-flight requests ({}s timeout)", HTTP_DRAIN_TIMEOUT_SECS);
    match tokio::time::timeout(
        std::time::Duration::from_secs(HTTP_DRAIN_TIMEOUT_SECS),
        server,
    )
    .await
    {
        Ok(Ok(Ok(()))) => {
            info!("graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "HTTP server error");
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server task failed");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!(
                "shutdown timed out after {}s, forcing exit",
                HTTP_DRAIN_TIMEOUT_SECS
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
