//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use fastvote_common::{IdGenerator, Metrics, get_metrics};
use fastvote_core::{PollService, VoteService};

use crate::streaming::StreamingState;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub poll_service: PollService,
    pub vote_service: VoteService,
    pub streaming: StreamingState,
    /// Name of the session cookie issued to browsers.
    pub session_cookie: String,
}

/// Session identifier attached to the request by [`session_middleware`].
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Session middleware.
///
/// Reads the session cookie, minting a fresh identifier when the request
/// carries none, and stashes it in request extensions so handlers never
/// re-parse cookies. A newly minted identifier is set on the response as an
/// `HttpOnly` cookie.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let existing = jar
        .get(&state.session_cookie)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let (session_id, newly_issued) = match existing {
        Some(value) => (value, false),
        None => (IdGenerator::new().generate_session_id(), true),
    };

    req.extensions_mut().insert(SessionId(session_id.clone()));

    let response = next.run(req).await;

    if newly_issued {
        let cookie = Cookie::build((state.session_cookie.clone(), session_id))
            .path("/")
            .http_only(true)
            .build();
        return (jar.add(cookie), response).into_response();
    }

    response
}

/// Request-counting middleware.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    Metrics::increment(&get_metrics().http_requests_total);
    next.run(req).await
}
