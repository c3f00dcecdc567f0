//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use fastvote_common::AppError;

use crate::middleware::SessionId;

/// Session extractor.
///
/// Pulls the session identifier stashed by the session middleware; a request
/// that somehow reached a handler without one is rejected rather than
/// treated as an anonymous caller.
#[derive(Debug, Clone)]
pub struct Session(pub String);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionId>()
            .map(|sid| Self(sid.0.clone()))
            .ok_or(AppError::SessionMissing)
    }
}

/// Optional session extractor.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts.extensions.get::<SessionId>().map(|sid| sid.0.clone()),
        ))
    }
}
