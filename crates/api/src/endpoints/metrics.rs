//! Metrics endpoint.

use axum::{Json, Router, routing::get};
use fastvote_common::{get_metrics, metrics::MetricsSnapshot};

use crate::middleware::AppState;

/// Snapshot of the process counters.
async fn metrics_snapshot() -> Json<MetricsSnapshot> {
    Json(get_metrics().snapshot())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(metrics_snapshot))
}
