//! Store wrapper that injects conflicts and backend failures

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use noor_common::groups::SessionId;
use noor_common::models::{
    Annotation, AnnotationId, NewSession, Question, QuestionId, Session, SessionStatus,
};
use noor_hub::store::{Store, StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub struct FlakyStore {
    inner: Arc<dyn Store>,
    /// Conflicts still to report from `upsert_vote`
    vote_conflicts: AtomicU32,
    /// Make writes fail with a backend error
    fail_writes: AtomicBool,
    pub vote_attempts: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            vote_conflicts: AtomicU32::new(0),
            fail_writes: AtomicBool::new(false),
            vote_attempts: AtomicU32::new(0),
        }
    }

    pub fn conflict_next_votes(&self, count: u32) {
        self.vote_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Backend("injected disk I/O error".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn create_session(&self, new: NewSession) -> StoreResult<Session> {
        self.inner.create_session(new).await
    }

    async fn get_session(&self, session_id: SessionId) -> StoreResult<Option<Session>> {
        self.inner.get_session(session_id).await
    }

    async fn transition_session(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.check_write()?;
        self.inner.transition_session(session_id, status, at).await
    }

    async fn delete_session(&self, session_id: SessionId) -> StoreResult<bool> {
        self.inner.delete_session(session_id).await
    }

    async fn insert_question(
        &self,
        session_id: SessionId,
        author_id: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Question> {
        self.check_write()?;
        self.inner.insert_question(session_id, author_id, text, at).await
    }

    async fn get_question(&self, question_id: QuestionId) -> StoreResult<Option<Question>> {
        self.inner.get_question(question_id).await
    }

    async fn list_questions(&self, session_id: SessionId) -> StoreResult<Vec<Question>> {
        self.inner.list_questions(session_id).await
    }

    async fn upsert_vote(
        &self,
        question_id: QuestionId,
        voter_id: &str,
        value: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        self.vote_attempts.fetch_add(1, Ordering::SeqCst);
        let pending = self.vote_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.vote_conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Conflict("database is locked".to_string()));
        }
        self.check_write()?;
        self.inner.upsert_vote(question_id, voter_id, value, at).await
    }

    async fn count_vote_records(&self, question_id: QuestionId) -> StoreResult<i64> {
        self.inner.count_vote_records(question_id).await
    }

    async fn mark_answered(&self, question_id: QuestionId, at: DateTime<Utc>) -> StoreResult<bool> {
        self.check_write()?;
        self.inner.mark_answered(question_id, at).await
    }

    async fn delete_question(&self, question_id: QuestionId) -> StoreResult<bool> {
        self.check_write()?;
        self.inner.delete_question(question_id).await
    }

    async fn insert_annotation(
        &self,
        session_id: SessionId,
        created_by: &str,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<Annotation> {
        self.check_write()?;
        self.inner.insert_annotation(session_id, created_by, payload, at).await
    }

    async fn get_annotation(&self, annotation_id: AnnotationId) -> StoreResult<Option<Annotation>> {
        self.inner.get_annotation(annotation_id).await
    }

    async fn update_annotation(
        &self,
        annotation_id: AnnotationId,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Annotation>> {
        self.check_write()?;
        self.inner.update_annotation(annotation_id, payload, at).await
    }

    async fn delete_annotation(&self, annotation_id: AnnotationId) -> StoreResult<bool> {
        self.check_write()?;
        self.inner.delete_annotation(annotation_id).await
    }

    async fn delete_annotations_by_author(
        &self,
        session_id: SessionId,
        created_by: &str,
    ) -> StoreResult<u64> {
        self.check_write()?;
        self.inner.delete_annotations_by_author(session_id, created_by).await
    }

    async fn list_annotations(&self, session_id: SessionId) -> StoreResult<Vec<Annotation>> {
        self.inner.list_annotations(session_id).await
    }
}
