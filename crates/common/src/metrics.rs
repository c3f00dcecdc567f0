//! Metrics collection for fastvote-rs.
//!
//! Process-local counters for monitoring request volume, vote activity,
//! and the health of the live-update fanout.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new()))
}

/// Application metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    // === Request Metrics ===
    /// Total HTTP requests received
    pub http_requests_total: AtomicU64,

    // === Content Metrics ===
    /// Polls created
    pub polls_created: AtomicU64,
    /// Polls deleted
    pub polls_deleted: AtomicU64,
    /// Votes accepted by the ledger
    pub votes_cast: AtomicU64,
    /// Vote attempts rejected as duplicates
    pub votes_rejected_duplicate: AtomicU64,

    // === Real-time Metrics ===
    /// Active WebSocket connections
    pub websocket_connections_active: AtomicU64,
    /// Tally updates delivered to subscribers
    pub broadcast_deliveries: AtomicU64,
    /// Deliveries that failed and evicted their connection
    pub broadcast_failures: AtomicU64,
}

/// Point-in-time snapshot of all counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub http_requests_total: u64,
    pub polls_created: u64,
    pub polls_deleted: u64,
    pub votes_cast: u64,
    pub votes_rejected_duplicate: u64,
    pub websocket_connections_active: u64,
    pub broadcast_deliveries: u64,
    pub broadcast_failures: u64,
}

impl Metrics {
    /// Create a new metrics collector with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one.
    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add an amount to a counter.
    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    /// Decrement a counter by one, saturating at zero.
    pub fn decrement(counter: &AtomicU64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(1))
        });
    }

    /// Capture a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            http_requests_total: self.http_requests_total.load(Ordering::Relaxed),
            polls_created: self.polls_created.load(Ordering::Relaxed),
            polls_deleted: self.polls_deleted.load(Ordering::Relaxed),
            votes_cast: self.votes_cast.load(Ordering::Relaxed),
            votes_rejected_duplicate: self.votes_rejected_duplicate.load(Ordering::Relaxed),
            websocket_connections_active: self
                .websocket_connections_active
                .load(Ordering::Relaxed),
            broadcast_deliveries: self.broadcast_deliveries.load(Ordering::Relaxed),
            broadcast_failures: self.broadcast_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn counters_round_trip_through_snapshot() {
        let metrics = Metrics::new();
        Metrics::increment(&metrics.votes_cast);
        Metrics::increment(&metrics.votes_cast);
        Metrics::increment(&metrics.websocket_connections_active);
        Metrics::decrement(&metrics.websocket_connections_active);

        let snap = metrics.snapshot();
        assert_eq!(snap.votes_cast, 2);
        assert_eq!(snap.websocket_connections_active, 0);
    }

    #[test]
    fn decrement_saturates_at_zero() {
        let metrics = Metrics::new();
        Metrics::decrement(&metrics.websocket_connections_active);
        assert_eq!(metrics.snapshot().websocket_connections_active, 0);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let metrics = Metrics::new();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"votesCast\":0"));
        assert!(json.contains("\"broadcastFailures\":0"));
    }
}
