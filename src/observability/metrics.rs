use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Register all metric descriptors at startup.
///
/// This must be called once before any metrics are recorded.
/// Descriptors provide human-readable descriptions for Prometheus.
pub fn describe_all_metrics() {
    // -- Upload --
    describe_counter!("vidstream_uploads_total", "Upload attempts by result");
    describe_histogram!("vidstream_upload_duration_seconds", "Upload duration");
    describe_histogram!("vidstream_upload_size_bytes", "Stored upload size");

    // -- Listing --
    describe_counter!(
        "vidstream_list_requests_total",
        "Directory listing requests by result"
    );

    // -- Delivery --
    describe_counter!(
        "vidstream_delivery_requests_total",
        "Stream requests by status class and kind (full, range)"
    );
    describe_counter!(
        "vidstream_delivery_bytes_total",
        "Body bytes scheduled for delivery"
    );
    describe_histogram!(
        "vidstream_delivery_setup_duration_seconds",
        "Time to open the file and build response headers"
    );

    // -- System --
    describe_gauge!("vidstream_uptime_seconds", "Process uptime");
}

// ---------------------------------------------------------------------------
// Metric recording helpers
// ---------------------------------------------------------------------------

// -- Upload --

pub fn inc_upload(result: &str) {
    counter!("vidstream_uploads_total", "result" => result.to_string()).increment(1);
}

pub fn record_upload_duration(seconds: f64) {
    histogram!("vidstream_upload_duration_seconds").record(seconds);
}

pub fn record_upload_size(bytes: f64) {
    histogram!("vidstream_upload_size_bytes").record(bytes);
}

// -- Listing --

pub fn inc_list_request(result: &str) {
    counter!("vidstream_list_requests_total", "result" => result.to_string()).increment(1);
}

// -- Delivery --

pub fn inc_delivery_request(status: u16, kind: &str) {
    counter!(
        "vidstream_delivery_requests_total",
        "status" => status_class(status),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn add_delivery_bytes(bytes: u64) {
    counter!("vidstream_delivery_bytes_total").increment(bytes);
}

pub fn record_delivery_setup_duration(seconds: f64) {
    histogram!("vidstream_delivery_setup_duration_seconds").record(seconds);
}

// -- System --

pub fn set_uptime_seconds(seconds: f64) {
    gauge!("vidstream_uptime_seconds").set(seconds);
}

/// Bucket an HTTP status code into its class label (`2xx`, `4xx`, ...).
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

// ---------------------------------------------------------------------------
// Uptime tracking task
// ---------------------------------------------------------------------------

/// Update the uptime gauge every second until cancelled.
pub async fn run_uptime_task(start_time: Instant, cancel: tokio_util::sync::CancellationToken) {
    let interval = std::time::Duration::from_secs(1);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                set_uptime_seconds(start_time.elapsed().as_secs_f64());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prometheus recorder installation
// ---------------------------------------------------------------------------

/// Install the global Prometheus recorder and return its render handle.
pub fn install_prometheus_recorder(
) -> anyhow::Result<metrics_exporter_prometheus::PrometheusHandle> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus metrics recorder: {}", e))
}
