//! Prometheus metrics export
//!
//! Relay session counters and the scrape endpoint

use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::relay::SessionReport;
use crate::AppState;

/// Prometheus metrics recorder
static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init_metrics() -> Result<()> {
    METRICS_HANDLE.get_or_try_init(|| -> Result<PrometheusHandle> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("dockweb_relay_session_duration_seconds".to_string()),
                &[1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0, 14400.0],
            )?
            .install_recorder()?;
        Ok(handle)
    })?;
    Ok(())
}

/// Record a relay session entering the registry
pub fn record_relay_started() {
    counter!("dockweb_relay_sessions_total").increment(1);
    gauge!("dockweb_relay_active_sessions").increment(1.0);
}

/// Record one forwarded frame
pub fn record_relay_frame(bytes: u64) {
    counter!("dockweb_relay_frames_total").increment(1);
    counter!("dockweb_relay_bytes_total").increment(bytes);
}

/// Record a finished relay session
pub fn record_relay_closed(report: &SessionReport) {
    counter!("dockweb_relay_sessions_closed_total", "reason" => report.reason.label()).increment(1);
    gauge!("dockweb_relay_active_sessions").decrement(1.0);
    histogram!("dockweb_relay_session_duration_seconds").record(report.duration.as_secs_f64());
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    gauge!("dockweb_relay_active_sessions").set(state.relays.active_count().await as f64);

    let Some(handle) = METRICS_HANDLE.get() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [("Content-Type", "text/plain; version=0.0.4")],
            String::from("# metrics recorder not installed\n"),
        );
    };

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        handle.render(),
    )
}
