//! Vote ledger and tally projection.
//!
//! The ledger owns the one-vote-per-session-per-option invariant. The
//! duplicate check and the insert run inside a single transaction, and the
//! schema's unique `(session_id, option_id)` index turns a concurrent
//! duplicate insert into a conflict that is reported as [`AppError::DuplicateVote`].
//! Two simultaneous identical requests therefore cannot both commit.

use std::sync::Arc;

use chrono::Utc;
use fastvote_common::{AppError, AppResult, IdGenerator, Metrics, get_metrics};
use fastvote_db::{
    entities::vote,
    repositories::{OptionTally, PollRepository, VoteRepository},
};
use sea_orm::{DatabaseConnection, Set, SqlErr, TransactionTrait};
use tracing::{debug, info};

/// Per-option vote counts for one poll, freshly projected from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    /// Poll the counts belong to.
    pub poll_id: String,
    /// Options with their counts, in stable (option id) order.
    pub options: Vec<OptionTally>,
}

/// Vote service: accepts votes and projects tallies.
#[derive(Clone)]
pub struct VoteService {
    db: Arc<DatabaseConnection>,
    vote_repo: VoteRepository,
    id_gen: IdGenerator,
}

impl VoteService {
    /// Create a new vote service.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>, vote_repo: VoteRepository) -> Self {
        Self {
            db,
            vote_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Cast a vote for an option on behalf of a session.
    ///
    /// Runs the check-then-insert as one atomic unit of work and, on
    /// success, returns the reprojected tally for the option's poll. The
    /// caller is responsible for fanning the tally out to subscribers.
    pub async fn cast_vote(&self, session_id: &str, option_id: &str) -> AppResult<Tally> {
        if session_id.is_empty() {
            return Err(AppError::SessionMissing);
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let option = PollRepository::find_option_by_id_in(&txn, option_id)
            .await?
            .ok_or_else(|| AppError::OptionNotFound(option_id.to_string()))?;

        if VoteRepository::find_by_session_and_option_in(&txn, session_id, option_id)
            .await?
            .is_some()
        {
            Metrics::increment(&get_metrics().votes_rejected_duplicate);
            debug!(option_id, "Duplicate vote rejected");
            return Err(AppError::DuplicateVote);
        }

        let model = vote::ActiveModel {
            id: Set(self.id_gen.generate()),
            session_id: Set(session_id.to_string()),
            option_id: Set(option_id.to_string()),
            created_at: Set(Utc::now().into()),
        };

        match VoteRepository::insert_in(&txn, model).await {
            Ok(_) => {}
            // A concurrent request won the race between our check and our
            // insert; the unique index makes the loss deterministic.
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Metrics::increment(&get_metrics().votes_rejected_duplicate);
                debug!(option_id, "Duplicate vote rejected on conflict");
                return Err(AppError::DuplicateVote);
            }
            Err(e) => return Err(AppError::Database(e.to_string())),
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Metrics::increment(&get_metrics().votes_cast);
        info!(poll_id = %option.poll_id, option_id, "Vote accepted");

        // Project after commit so the tally reflects the new vote.
        self.project(&option.poll_id).await
    }

    /// Project the current tally for a poll.
    ///
    /// Pure read, recomputed on every call; never cached.
    pub async fn project(&self, poll_id: &str) -> AppResult<Tally> {
        let options = self.vote_repo.option_tallies(poll_id).await?;
        Ok(Tally {
            poll_id: poll_id.to_string(),
            options,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fastvote_db::entities::poll_option;
    use maplit::btreemap;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn option_row(id: &str, poll_id: &str, text: &str) -> poll_option::Model {
        poll_option::Model {
            id: id.to_string(),
            poll_id: poll_id.to_string(),
            text: text.to_string(),
        }
    }

    fn vote_row(id: &str, session_id: &str, option_id: &str) -> vote::Model {
        vote::Model {
            id: id.to_string(),
            session_id: session_id.to_string(),
            option_id: option_id.to_string(),
            created_at: Utc::now().into(),
        }
    }

    fn service(db: DatabaseConnection) -> VoteService {
        let db = Arc::new(db);
        let vote_repo = VoteRepository::new(Arc::clone(&db));
        VoteService::new(db, vote_repo)
    }

    #[tokio::test]
    async fn empty_session_is_rejected_before_touching_storage() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let svc = service(db);

        let err = svc.cast_vote("", "o1").await.unwrap_err();
        assert!(matches!(err, AppError::SessionMissing));
    }

    #[tokio::test]
    async fn unknown_option_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<poll_option::Model>::new()])
            .into_connection();
        let svc = service(db);

        let err = svc.cast_vote("s1", "missing").await.unwrap_err();
        assert!(matches!(err, AppError::OptionNotFound(_)));
    }

    #[tokio::test]
    async fn existing_vote_is_rejected_without_insert() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![option_row("o1", "p1", "Rust")]])
            .append_query_results([vec![vote_row("v1", "s1", "o1")]])
            .into_connection();
        let svc = service(db);

        let err = svc.cast_vote("s1", "o1").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateVote));
    }

    #[tokio::test]
    async fn accepted_vote_returns_fresh_tally() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // option lookup
            .append_query_results([vec![option_row("o1", "p1", "Rust")]])
            // duplicate check: no prior vote
            .append_query_results([Vec::<vote::Model>::new()])
            // insert returning
            .append_query_results([vec![vote_row("v1", "s1", "o1")]])
            // tally projection
            .append_query_results([vec![
                btreemap! {
                    "option_id" => sea_orm::Value::from("o1"),
                    "text" => sea_orm::Value::from("Rust"),
                    "vote_count" => sea_orm::Value::from(1i64),
                },
                btreemap! {
                    "option_id" => sea_orm::Value::from("o2"),
                    "text" => sea_orm::Value::from("Python"),
                    "vote_count" => sea_orm::Value::from(0i64),
                },
            ]])
            .into_connection();
        let svc = service(db);

        let tally = svc.cast_vote("s1", "o1").await.unwrap();
        assert_eq!(tally.poll_id, "p1");
        assert_eq!(tally.options.len(), 2);
        assert_eq!(tally.options[0].vote_count, 1);
        assert_eq!(tally.options[1].vote_count, 0);
    }

    #[tokio::test]
    async fn projection_preserves_option_order() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                btreemap! {
                    "option_id" => sea_orm::Value::from("o1"),
                    "text" => sea_orm::Value::from("Tabs"),
                    "vote_count" => sea_orm::Value::from(2i64),
                },
                btreemap! {
                    "option_id" => sea_orm::Value::from("o2"),
                    "text" => sea_orm::Value::from("Spaces"),
                    "vote_count" => sea_orm::Value::from(3i64),
                },
            ]])
            .into_connection();
        let svc = service(db);

        let tally = svc.project("p1").await.unwrap();
        let ids: Vec<&str> = tally.options.iter().map(|t| t.option_id.as_str()).collect();
        assert_eq!(ids, ["o1", "o2"]);
        assert_eq!(
            tally.options.iter().map(|t| t.vote_count).sum::<i64>(),
            5
        );
    }
}
