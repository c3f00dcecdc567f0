//! Vote repository.

use std::sync::Arc;

use crate::entities::{Vote, poll_option, vote};
use fastvote_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
};

/// One row of a poll's tally: an option and its current vote count.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct OptionTally {
    /// Option ID.
    pub option_id: String,
    /// Option label.
    pub text: String,
    /// Number of votes for the option.
    pub vote_count: i64,
}

/// Vote repository for database operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a vote by session and option.
    pub async fn find_by_session_and_option(
        &self,
        session_id: &str,
        option_id: &str,
    ) -> AppResult<Option<vote::Model>> {
        Self::find_by_session_and_option_in(self.db.as_ref(), session_id, option_id).await
    }

    /// Find a vote by session and option on an arbitrary connection.
    ///
    /// The vote ledger calls this inside its transaction so the duplicate
    /// check and the insert observe the same state.
    pub async fn find_by_session_and_option_in<C: ConnectionTrait>(
        conn: &C,
        session_id: &str,
        option_id: &str,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find()
            .filter(vote::Column::SessionId.eq(session_id))
            .filter(vote::Column::OptionId.eq(option_id))
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a vote on an arbitrary connection.
    ///
    /// Returns the raw [`sea_orm::DbErr`] so the caller can distinguish a
    /// unique-constraint conflict from other storage failures.
    pub async fn insert_in<C: ConnectionTrait>(
        conn: &C,
        model: vote::ActiveModel,
    ) -> Result<vote::Model, sea_orm::DbErr> {
        model.insert(conn).await
    }

    /// Per-option vote counts for a poll, in stable (option id) order.
    ///
    /// Options with no votes are included with a count of zero.
    pub async fn option_tallies(&self, poll_id: &str) -> AppResult<Vec<OptionTally>> {
        Self::option_tallies_in(self.db.as_ref(), poll_id).await
    }

    /// Per-option vote counts on an arbitrary connection.
    pub async fn option_tallies_in<C: ConnectionTrait>(
        conn: &C,
        poll_id: &str,
    ) -> AppResult<Vec<OptionTally>> {
        poll_option::Entity::find()
            .filter(poll_option::Column::PollId.eq(poll_id))
            .join(JoinType::LeftJoin, poll_option::Relation::Vote.def())
            .select_only()
            .column_as(poll_option::Column::Id, "option_id")
            .column(poll_option::Column::Text)
            .column_as(vote::Column::Id.count(), "vote_count")
            .group_by(poll_option::Column::Id)
            .group_by(poll_option::Column::Text)
            .order_by_asc(poll_option::Column::Id)
            .into_model::<OptionTally>()
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the calling session's vote within a poll, if any.
    pub async fn find_session_vote_in_poll(
        &self,
        session_id: &str,
        poll_id: &str,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find()
            .filter(vote::Column::SessionId.eq(session_id))
            .join(JoinType::InnerJoin, vote::Relation::PollOption.def())
            .filter(poll_option::Column::PollId.eq(poll_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
