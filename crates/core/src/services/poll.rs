//! Poll service.

use chrono::Utc;
use fastvote_common::{AppError, AppResult, IdGenerator, Metrics, get_metrics};
use fastvote_db::{
    entities::{poll, poll_option},
    repositories::{OptionTally, PollRepository, VoteRepository},
};
use sea_orm::Set;
use tracing::info;

/// Minimum number of options a poll must have.
const MIN_OPTIONS: usize = 2;
/// Maximum number of options a poll may have.
const MAX_OPTIONS: usize = 5;
/// Maximum length of poll and option texts.
const MAX_TEXT_LEN: usize = 255;

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    poll_repo: PollRepository,
    vote_repo: VoteRepository,
    id_gen: IdGenerator,
}

/// Input for creating a poll.
pub struct CreatePollInput {
    pub text: String,
    pub options: Vec<String>,
}

/// A poll with its current tally and the caller's vote, if any.
#[derive(Debug)]
pub struct PollWithTally {
    pub poll: poll::Model,
    pub options: Vec<OptionTally>,
    pub voted_option_id: Option<String>,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub const fn new(poll_repo: PollRepository, vote_repo: VoteRepository) -> Self {
        Self {
            poll_repo,
            vote_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a poll with its options.
    pub async fn create_poll(
        &self,
        session_id: &str,
        input: CreatePollInput,
    ) -> AppResult<poll::Model> {
        if input.text.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Poll text cannot be empty".to_string(),
            ));
        }
        if input.text.len() > MAX_TEXT_LEN {
            return Err(AppError::BadRequest(format!(
                "Poll text is too long (max {MAX_TEXT_LEN} chars)"
            )));
        }
        if input.options.len() < MIN_OPTIONS {
            return Err(AppError::BadRequest(format!(
                "Poll must have at least {MIN_OPTIONS} options"
            )));
        }
        if input.options.len() > MAX_OPTIONS {
            return Err(AppError::BadRequest(format!(
                "Poll cannot have more than {MAX_OPTIONS} options"
            )));
        }
        for text in &input.options {
            if text.trim().is_empty() {
                return Err(AppError::BadRequest(
                    "Poll options cannot be empty".to_string(),
                ));
            }
            if text.len() > MAX_TEXT_LEN {
                return Err(AppError::BadRequest(format!(
                    "Poll option is too long (max {MAX_TEXT_LEN} chars)"
                )));
            }
        }

        let poll_id = self.id_gen.generate();
        let model = poll::ActiveModel {
            id: Set(poll_id.clone()),
            text: Set(input.text),
            session_id: Set(session_id.to_string()),
            created_at: Set(Utc::now().into()),
        };
        let options = input
            .options
            .into_iter()
            .map(|text| poll_option::ActiveModel {
                id: Set(self.id_gen.generate()),
                poll_id: Set(poll_id.clone()),
                text: Set(text),
            })
            .collect();

        let created = self.poll_repo.create_with_options(model, options).await?;

        Metrics::increment(&get_metrics().polls_created);
        info!(poll_id = %created.id, "Poll created");

        Ok(created)
    }

    /// Whether a poll exists.
    pub async fn poll_exists(&self, poll_id: &str) -> AppResult<bool> {
        Ok(self.poll_repo.find_by_id(poll_id).await?.is_some())
    }

    /// Get a poll with its tally and the calling session's vote status.
    pub async fn show_poll(
        &self,
        poll_id: &str,
        session_id: Option<&str>,
    ) -> AppResult<PollWithTally> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let options = self.vote_repo.option_tallies(poll_id).await?;

        let voted_option_id = if let Some(sid) = session_id {
            self.vote_repo
                .find_session_vote_in_poll(sid, poll_id)
                .await?
                .map(|v| v.option_id)
        } else {
            None
        };

        Ok(PollWithTally {
            poll,
            options,
            voted_option_id,
        })
    }

    /// List the polls created by a session, newest first.
    pub async fn list_polls(&self, session_id: &str) -> AppResult<Vec<PollWithTally>> {
        let polls = self.poll_repo.find_by_session(session_id).await?;

        let mut out = Vec::with_capacity(polls.len());
        for poll in polls {
            let options = self.vote_repo.option_tallies(&poll.id).await?;
            let voted_option_id = self
                .vote_repo
                .find_session_vote_in_poll(session_id, &poll.id)
                .await?
                .map(|v| v.option_id);
            out.push(PollWithTally {
                poll,
                options,
                voted_option_id,
            });
        }
        Ok(out)
    }

    /// Delete a poll owned by the calling session.
    ///
    /// Options and votes cascade at the schema level.
    pub async fn delete_poll(&self, session_id: &str, poll_id: &str) -> AppResult<()> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        if poll.session_id != session_id {
            return Err(AppError::Forbidden(
                "Only the poll's creator can delete it".to_string(),
            ));
        }

        self.poll_repo.delete(poll_id).await?;

        Metrics::increment(&get_metrics().polls_deleted);
        info!(poll_id, "Poll deleted");
        Ok(())
    }
}
