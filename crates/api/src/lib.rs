//! HTTP API layer for fastvote-rs.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: poll creation, listing, voting, deletion
//! - **Extractors**: session identification
//! - **Middleware**: session-cookie issuance, request counting
//! - **Streaming**: per-poll WebSocket subscriptions with live tally fanout
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod streaming;

pub use endpoints::router;
pub use streaming::{StreamEvent, StreamingState, TallyPayload, poll_stream_handler};
