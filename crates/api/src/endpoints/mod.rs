//! API endpoints.

mod metrics;
mod poll;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/poll", poll::router())
        .nest("/metrics", metrics::router())
}
