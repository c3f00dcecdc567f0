//! Poll endpoints.

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use fastvote_common::AppResult;
use fastvote_core::{CreatePollInput, PollWithTally};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    extractors::{MaybeSession, Session},
    middleware::AppState,
    response::{ApiResponse, ok},
    streaming::{OptionTallyView, StreamEvent, TallyPayload},
};

/// Session response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
}

/// Return the caller's session id (the cookie is issued by the middleware).
async fn assign_session(Session(session_id): Session) -> AppResult<ApiResponse<SessionResponse>> {
    Ok(ApiResponse::ok(SessionResponse { session_id }))
}

/// Create poll request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollRequest {
    #[validate(length(min = 1, max = 255))]
    pub text: String,
    #[validate(length(min = 2, max = 5))]
    pub options: Vec<String>,
}

/// Create poll response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollResponse {
    pub poll_id: String,
}

/// Create a poll with its options.
async fn create_poll(
    Session(session_id): Session,
    State(state): State<AppState>,
    Json(req): Json<CreatePollRequest>,
) -> AppResult<ApiResponse<CreatePollResponse>> {
    req.validate()?;

    let poll = state
        .poll_service
        .create_poll(
            &session_id,
            CreatePollInput {
                text: req.text,
                options: req.options,
            },
        )
        .await?;

    Ok(ApiResponse::ok(CreatePollResponse { poll_id: poll.id }))
}

/// Show poll request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowPollRequest {
    pub poll_id: String,
}

/// Poll response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub id: String,
    pub text: String,
    pub created_at: String,
    pub options: Vec<OptionTallyView>,
    pub has_voted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_option_id: Option<String>,
}

impl From<PollWithTally> for PollResponse {
    fn from(p: PollWithTally) -> Self {
        Self {
            id: p.poll.id,
            text: p.poll.text,
            created_at: p.poll.created_at.to_rfc3339(),
            options: p.options.iter().map(OptionTallyView::from).collect(),
            has_voted: p.voted_option_id.is_some(),
            voted_option_id: p.voted_option_id,
        }
    }
}

/// Get a poll with its current tally and the caller's vote status.
async fn show_poll(
    MaybeSession(maybe_session): MaybeSession,
    State(state): State<AppState>,
    Json(req): Json<ShowPollRequest>,
) -> AppResult<ApiResponse<PollResponse>> {
    let poll = state
        .poll_service
        .show_poll(&req.poll_id, maybe_session.as_deref())
        .await?;

    Ok(ApiResponse::ok(poll.into()))
}

/// List the caller's polls, newest first.
async fn list_polls(
    Session(session_id): Session,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<PollResponse>>> {
    let polls = state.poll_service.list_polls(&session_id).await?;

    Ok(ApiResponse::ok(
        polls.into_iter().map(PollResponse::from).collect(),
    ))
}

/// Vote request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub option_id: String,
}

/// Cast a vote, then fan the fresh tally out to the poll's subscribers.
async fn vote(
    Session(session_id): Session,
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<TallyPayload>> {
    let tally = state
        .vote_service
        .cast_vote(&session_id, &req.option_id)
        .await?;

    let payload = TallyPayload::from_tally(&tally);

    // Delivery failures are contained in the dispatcher; the voter's
    // request succeeds regardless.
    state
        .streaming
        .broadcast(&tally.poll_id, &StreamEvent::VoteUpdate(payload.clone()))
        .await;

    Ok(ApiResponse::ok(payload))
}

/// Delete poll request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePollRequest {
    pub poll_id: String,
}

/// Delete a poll owned by the caller.
async fn delete_poll(
    Session(session_id): Session,
    State(state): State<AppState>,
    Json(req): Json<DeletePollRequest>,
) -> AppResult<impl IntoResponse> {
    state
        .poll_service
        .delete_poll(&session_id, &req.poll_id)
        .await?;

    Ok(ok())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", get(assign_session))
        .route("/create", post(create_poll))
        .route("/show", post(show_poll))
        .route("/list", post(list_polls))
        .route("/vote", post(vote))
        .route("/delete", post(delete_poll))
}
