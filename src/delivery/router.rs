use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::core::config::{AppConfig, DeliveryConfig};
use crate::storage::local::LocalVideoStore;

use super::handlers;
use super::middleware::RequestIdLayer;

// ---------------------------------------------------------------------------
// HTTP router
// ---------------------------------------------------------------------------

/// Application state shared across all handlers.
///
/// Nothing in here is mutated by requests: the store only carries its root
/// path, and the config is a read-only snapshot taken at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LocalVideoStore>,
    pub config: AppConfig,
    pub start_time: std::time::Instant,
    /// Prometheus handle for `/metrics`; `None` when metrics are disabled.
    pub metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<LocalVideoStore>,
        metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
    ) -> Self {
        Self {
            store,
            config,
            start_time: std::time::Instant::now(),
            metrics_handle,
        }
    }
}

/// Build the Axum router with all routes.
///
/// Route table:
/// - `POST /upload`             — multipart upload (field `video`)
/// - `GET  /videos`             — list stored videos
/// - `GET  /stream/{filename}`  — full or byte-range streaming
/// - `GET  /healthz`            — liveness probe
/// - `GET  /metrics`            — Prometheus metrics
///
/// Any other method on these paths gets 405 from the method router.
pub fn build_router(state: AppState) -> Router {
    let max_body = usize::try_from(state.config.upload.max_upload_size_bytes).unwrap_or(usize::MAX);
    let cors = cors_layer(&state.config.delivery);

    Router::new()
        .route(
            "/upload",
            post(handlers::upload_video).layer(DefaultBodyLimit::max(max_body)),
        )
        .route("/videos", get(handlers::list_videos))
        .route("/stream/{filename}", get(handlers::stream_video))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .layer(RequestIdLayer)
        .with_state(state)
}

/// CORS for browser players: `Range` must be an allowed request header and
/// the range response headers must be exposed to scripts.
fn cors_layer(config: &DeliveryConfig) -> CorsLayer {
    let origins = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let list: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            http::Method::GET,
            http::Method::HEAD,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::RANGE, http::header::CONTENT_TYPE])
        .expose_headers([
            http::header::CONTENT_LENGTH,
            http::header::CONTENT_RANGE,
            http::header::ACCEPT_RANGES,
        ])
        .max_age(std::time::Duration::from_secs(86400))
}
