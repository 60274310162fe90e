//! Durable store boundary
//!
//! The hub treats persistence as an external collaborator. `Store` is the
//! contract it relies on; `SqliteStore` is the adapter the binary ships with.
//!
//! Contract invariants every implementation must uphold:
//! - at most one vote row per (question, voter); a repeated vote replaces it
//! - `upsert_vote` recomputes the tally from vote rows in the same transaction
//! - deleting a session removes its questions, votes and annotations

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use noor_common::groups::SessionId;
use noor_common::models::{
    Annotation, AnnotationId, NewSession, Question, QuestionId, Session, SessionStatus,
};
use thiserror::Error;

pub use sqlite::SqliteStore;

/// Store failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Concurrent writer held the row or database; safe to retry
    #[error("Store conflict: {0}")]
    Conflict(String),

    /// A unique key (such as a session token) is already taken
    #[error("Store duplicate: {0}")]
    Duplicate(String),

    /// Any other persistence failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable storage for sessions, questions, votes and annotations
#[async_trait]
pub trait Store: Send + Sync {
    // ----- Sessions -----
    async fn create_session(&self, new: NewSession) -> StoreResult<Session>;

    async fn get_session(&self, session_id: SessionId) -> StoreResult<Option<Session>>;

    /// Conditional status change: Created → Active, or anything not yet Ended → Ended.
    /// Stamps `started_at`/`ended_at`; false when no row made the transition.
    async fn transition_session(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Hard delete with cascade; false if the session did not exist
    async fn delete_session(&self, session_id: SessionId) -> StoreResult<bool>;

    // ----- Questions -----
    async fn insert_question(
        &self,
        session_id: SessionId,
        author_id: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Question>;

    /// Question with its tally computed from vote rows (includes deleted)
    async fn get_question(&self, question_id: QuestionId) -> StoreResult<Option<Question>>;

    /// Non-deleted questions of a session
    async fn list_questions(&self, session_id: SessionId) -> StoreResult<Vec<Question>>;

    /// Insert or replace the (question, voter) vote and return the new tally
    async fn upsert_vote(
        &self,
        question_id: QuestionId,
        voter_id: &str,
        value: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<i64>;

    /// Number of vote rows recorded for a question
    async fn count_vote_records(&self, question_id: QuestionId) -> StoreResult<i64>;

    /// Queued → Answered; false if the question was not Queued
    async fn mark_answered(&self, question_id: QuestionId, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Soft delete: status Deleted, vote rows removed; false if already deleted
    async fn delete_question(&self, question_id: QuestionId) -> StoreResult<bool>;

    // ----- Annotations -----
    async fn insert_annotation(
        &self,
        session_id: SessionId,
        created_by: &str,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<Annotation>;

    async fn get_annotation(&self, annotation_id: AnnotationId) -> StoreResult<Option<Annotation>>;

    async fn update_annotation(
        &self,
        annotation_id: AnnotationId,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Annotation>>;

    async fn delete_annotation(&self, annotation_id: AnnotationId) -> StoreResult<bool>;

    /// Remove every annotation `created_by` authored in a session
    async fn delete_annotations_by_author(
        &self,
        session_id: SessionId,
        created_by: &str,
    ) -> StoreResult<u64>;

    /// Annotations of a session, oldest first
    async fn list_annotations(&self, session_id: SessionId) -> StoreResult<Vec<Annotation>>;
}
