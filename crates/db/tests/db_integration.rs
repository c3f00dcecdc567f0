//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `fastvote_test`)
//!   `TEST_DB_PASSWORD` (default: `fastvote_test`)
//!   `TEST_DB_NAME` (default: `fastvote_test`)

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Utc;
use fastvote_common::IdGenerator;
use fastvote_db::entities::{poll, poll_option, vote};
use fastvote_db::repositories::{PollRepository, VoteRepository};
use fastvote_db::test_utils::{TestDatabase, TestDbConfig};
use sea_orm::Set;

fn poll_model(id_gen: &IdGenerator, session_id: &str, text: &str) -> poll::ActiveModel {
    poll::ActiveModel {
        id: Set(id_gen.generate()),
        text: Set(text.to_string()),
        session_id: Set(session_id.to_string()),
        created_at: Set(Utc::now().into()),
    }
}

fn option_model(id_gen: &IdGenerator, poll_id: &str, text: &str) -> poll_option::ActiveModel {
    poll_option::ActiveModel {
        id: Set(id_gen.generate()),
        poll_id: Set(poll_id.to_string()),
        text: Set(text.to_string()),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_connection() {
    let config = TestDbConfig::default();
    let result = TestDatabase::with_config(config).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn create_poll_with_options_and_project_tally() {
    let db = TestDatabase::create_unique().await.unwrap();
    let conn = Arc::new(db.conn.clone());
    let polls = PollRepository::new(conn.clone());
    let votes = VoteRepository::new(conn);
    let id_gen = IdGenerator::new();

    let model = poll_model(&id_gen, "session-a", "Favorite language?");
    let poll_id = match &model.id {
        sea_orm::ActiveValue::Set(id) => id.clone(),
        _ => unreachable!(),
    };
    let options = vec![
        option_model(&id_gen, &poll_id, "Rust"),
        option_model(&id_gen, &poll_id, "Python"),
    ];
    polls.create_with_options(model, options).await.unwrap();

    let tallies = votes.option_tallies(&poll_id).await.unwrap();
    assert_eq!(tallies.len(), 2);
    assert!(tallies.iter().all(|t| t.vote_count == 0));

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn duplicate_vote_rejected_by_unique_index() {
    let db = TestDatabase::create_unique().await.unwrap();
    let conn = Arc::new(db.conn.clone());
    let polls = PollRepository::new(conn.clone());
    let id_gen = IdGenerator::new();

    let model = poll_model(&id_gen, "session-a", "Tabs or spaces?");
    let poll_id = match &model.id {
        sea_orm::ActiveValue::Set(id) => id.clone(),
        _ => unreachable!(),
    };
    let options = vec![
        option_model(&id_gen, &poll_id, "Tabs"),
        option_model(&id_gen, &poll_id, "Spaces"),
    ];
    let created = polls.create_with_options(model, options).await.unwrap();
    let option_id = polls.list_options(&created.id).await.unwrap()[0].id.clone();

    let first = vote::ActiveModel {
        id: Set(id_gen.generate()),
        session_id: Set("voter-1".to_string()),
        option_id: Set(option_id.clone()),
        created_at: Set(Utc::now().into()),
    };
    VoteRepository::insert_in(db.connection(), first)
        .await
        .unwrap();

    let second = vote::ActiveModel {
        id: Set(id_gen.generate()),
        session_id: Set("voter-1".to_string()),
        option_id: Set(option_id),
        created_at: Set(Utc::now().into()),
    };
    let err = VoteRepository::insert_in(db.connection(), second)
        .await
        .unwrap_err();
    assert!(matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    ));

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn deleting_poll_cascades_to_options_and_votes() {
    let db = TestDatabase::create_unique().await.unwrap();
    let conn = Arc::new(db.conn.clone());
    let polls = PollRepository::new(conn.clone());
    let votes = VoteRepository::new(conn);
    let id_gen = IdGenerator::new();

    let model = poll_model(&id_gen, "session-a", "Keep or delete?");
    let poll_id = match &model.id {
        sea_orm::ActiveValue::Set(id) => id.clone(),
        _ => unreachable!(),
    };
    let options = vec![
        option_model(&id_gen, &poll_id, "Keep"),
        option_model(&id_gen, &poll_id, "Delete"),
    ];
    let created = polls.create_with_options(model, options).await.unwrap();
    let option_id = polls.list_options(&created.id).await.unwrap()[0].id.clone();

    let ballot = vote::ActiveModel {
        id: Set(id_gen.generate()),
        session_id: Set("voter-1".to_string()),
        option_id: Set(option_id.clone()),
        created_at: Set(Utc::now().into()),
    };
    VoteRepository::insert_in(db.connection(), ballot)
        .await
        .unwrap();

    polls.delete(&created.id).await.unwrap();

    assert!(polls.find_by_id(&created.id).await.unwrap().is_none());
    assert!(polls.list_options(&created.id).await.unwrap().is_empty());
    assert!(
        votes
            .find_by_session_and_option("voter-1", &option_id)
            .await
            .unwrap()
            .is_none()
    );

    db.drop_database().await.unwrap();
}

#[test]
fn test_config_from_env() {
    // Test that default config is valid
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(!config.username.is_empty());
    assert!(!config.database.is_empty());
}

#[test]
fn test_database_url_format() {
    let config = TestDbConfig {
        host: "testhost".to_string(),
        port: 5432,
        username: "testuser".to_string(),
        password: "testpass".to_string(),
        database: "testdb".to_string(),
    };

    let url = config.database_url();
    assert!(url.starts_with("postgres://"));
    assert!(url.contains("testhost"));
    assert!(url.contains("5432"));
    assert!(url.contains("testuser"));
    assert!(url.contains("testdb"));
}
