//! SQLite store adapter
//!
//! Vote tallies are always computed from `question_votes` rows. The upsert
//! and the recount share one transaction so the returned tally is the one
//! the commit produced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use noor_common::groups::SessionId;
use noor_common::models::{
    Annotation, AnnotationId, NewSession, Question, QuestionId, QuestionStatus, Session,
    SessionStatus,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{Store, StoreError, StoreResult};

/// SQL fragment computing a question's tally, floored at zero
const VOTE_TALLY: &str = "MAX(COALESCE((SELECT SUM(v.vote_value) FROM question_votes v \
                          WHERE v.question_id = q.question_id), 0), 0)";

/// Store backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap a pool whose schema has been created by `noor_common::db`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn question_select() -> String {
        format!(
            "SELECT q.question_id, q.session_id, q.author_id, q.question_text, q.queued_at, \
             q.status, q.answered_at, {} AS vote_count FROM questions q",
            VOTE_TALLY
        )
    }
}

/// Translate sqlx errors, separating lock contention from hard failures
fn map_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            // SQLITE_BUSY, SQLITE_LOCKED and their extended variants
            let contended = matches!(db.code().as_deref(), Some("5" | "6" | "262" | "517"));
            if contended {
                StoreError::Conflict(db.message().to_string())
            } else if db.is_unique_violation() {
                StoreError::Duplicate(db.message().to_string())
            } else {
                StoreError::Backend(err.to_string())
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Conflict("connection pool timed out".to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

fn row_to_session(row: &SqliteRow) -> StoreResult<Session> {
    let status: String = row.try_get("status").map_err(map_err)?;
    Ok(Session {
        session_id: row.try_get("session_id").map_err(map_err)?,
        host_token: row.try_get("host_token").map_err(map_err)?,
        user_token: row.try_get("user_token").map_err(map_err)?,
        title: row.try_get("title").map_err(map_err)?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| StoreError::Backend(format!("unknown session status '{}'", status)))?,
        created_at: row.try_get("created_at").map_err(map_err)?,
        started_at: row.try_get("started_at").map_err(map_err)?,
        ended_at: row.try_get("ended_at").map_err(map_err)?,
        expires_at: row.try_get("expires_at").map_err(map_err)?,
    })
}

fn row_to_question(row: &SqliteRow) -> StoreResult<Question> {
    let status: String = row.try_get("status").map_err(map_err)?;
    Ok(Question {
        question_id: row.try_get("question_id").map_err(map_err)?,
        session_id: row.try_get("session_id").map_err(map_err)?,
        author_id: row.try_get("author_id").map_err(map_err)?,
        text: row.try_get("question_text").map_err(map_err)?,
        queued_at: row.try_get("queued_at").map_err(map_err)?,
        vote_count: row.try_get("vote_count").map_err(map_err)?,
        status: QuestionStatus::parse(&status)
            .ok_or_else(|| StoreError::Backend(format!("unknown question status '{}'", status)))?,
        answered_at: row.try_get("answered_at").map_err(map_err)?,
    })
}

fn row_to_annotation(row: &SqliteRow) -> StoreResult<Annotation> {
    let data: String = row.try_get("annotation_data").map_err(map_err)?;
    let payload = serde_json::from_str(&data)
        .map_err(|e| StoreError::Backend(format!("corrupt annotation payload: {}", e)))?;
    Ok(Annotation {
        annotation_id: row.try_get("annotation_id").map_err(map_err)?,
        session_id: row.try_get("session_id").map_err(map_err)?,
        created_by: row.try_get("created_by").map_err(map_err)?,
        payload,
        created_at: row.try_get("created_at").map_err(map_err)?,
        updated_at: row.try_get("updated_at").map_err(map_err)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_session(&self, new: NewSession) -> StoreResult<Session> {
        let result = sqlx::query(
            "INSERT INTO sessions (host_token, user_token, title, status, created_at, expires_at) \
             VALUES (?, ?, ?, 'Created', ?, ?)",
        )
        .bind(&new.host_token)
        .bind(&new.user_token)
        .bind(&new.title)
        .bind(noor_common::time::now())
        .bind(new.expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        let session_id = result.last_insert_rowid();
        debug!(session_id, "Created session");
        self.get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::Backend("session vanished after insert".to_string()))
    }

    async fn get_session(&self, session_id: SessionId) -> StoreResult<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn transition_session(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let sql = match status {
            SessionStatus::Active => {
                "UPDATE sessions SET status = 'Active', started_at = COALESCE(started_at, ?2) \
                 WHERE session_id = ?1 AND status = 'Created'"
            }
            SessionStatus::Ended => {
                "UPDATE sessions SET status = 'Ended', ended_at = COALESCE(ended_at, ?2) \
                 WHERE session_id = ?1 AND status != 'Ended'"
            }
            SessionStatus::Created | SessionStatus::Expired => {
                return Err(StoreError::Backend(format!(
                    "cannot transition a session to {}",
                    status.as_str()
                )))
            }
        };

        let result = sqlx::query(sql)
            .bind(session_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, session_id: SessionId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_question(
        &self,
        session_id: SessionId,
        author_id: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Question> {
        let result = sqlx::query(
            "INSERT INTO questions (session_id, author_id, question_text, queued_at, status) \
             VALUES (?, ?, ?, ?, 'Queued')",
        )
        .bind(session_id)
        .bind(author_id)
        .bind(text)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        let question_id = result.last_insert_rowid();
        self.get_question(question_id)
            .await?
            .ok_or_else(|| StoreError::Backend("question vanished after insert".to_string()))
    }

    async fn get_question(&self, question_id: QuestionId) -> StoreResult<Option<Question>> {
        let sql = format!("{} WHERE q.question_id = ?", Self::question_select());
        let row = sqlx::query(&sql)
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.as_ref().map(row_to_question).transpose()
    }

    async fn list_questions(&self, session_id: SessionId) -> StoreResult<Vec<Question>> {
        let sql = format!(
            "{} WHERE q.session_id = ? AND q.status != 'Deleted' \
             ORDER BY vote_count DESC, q.queued_at ASC, q.question_id ASC",
            Self::question_select()
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        rows.iter().map(row_to_question).collect()
    }

    async fn upsert_vote(
        &self,
        question_id: QuestionId,
        voter_id: &str,
        value: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        sqlx::query(
            "INSERT INTO question_votes (question_id, voter_id, vote_value, voted_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (question_id, voter_id) \
             DO UPDATE SET vote_value = excluded.vote_value, voted_at = excluded.voted_at",
        )
        .bind(question_id)
        .bind(voter_id)
        .bind(value)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        let tally: i64 = sqlx::query_scalar(
            "SELECT MAX(COALESCE(SUM(vote_value), 0), 0) FROM question_votes WHERE question_id = ?",
        )
        .bind(question_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;
        Ok(tally)
    }

    async fn count_vote_records(&self, question_id: QuestionId) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM question_votes WHERE question_id = ?")
            .bind(question_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn mark_answered(&self, question_id: QuestionId, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE questions SET status = 'Answered', answered_at = ? \
             WHERE question_id = ? AND status = 'Queued'",
        )
        .bind(at)
        .bind(question_id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_question(&self, question_id: QuestionId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let result = sqlx::query(
            "UPDATE questions SET status = 'Deleted' WHERE question_id = ? AND status != 'Deleted'",
        )
        .bind(question_id)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(map_err)?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM question_votes WHERE question_id = ?")
            .bind(question_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;
        Ok(true)
    }

    async fn insert_annotation(
        &self,
        session_id: SessionId,
        created_by: &str,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<Annotation> {
        let result = sqlx::query(
            "INSERT INTO annotations (session_id, created_by, annotation_data, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(created_by)
        .bind(payload.to_string())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        let annotation_id = result.last_insert_rowid();
        self.get_annotation(annotation_id)
            .await?
            .ok_or_else(|| StoreError::Backend("annotation vanished after insert".to_string()))
    }

    async fn get_annotation(&self, annotation_id: AnnotationId) -> StoreResult<Option<Annotation>> {
        let row = sqlx::query("SELECT * FROM annotations WHERE annotation_id = ?")
            .bind(annotation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.as_ref().map(row_to_annotation).transpose()
    }

    async fn update_annotation(
        &self,
        annotation_id: AnnotationId,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Annotation>> {
        let result = sqlx::query(
            "UPDATE annotations SET annotation_data = ?, updated_at = ? WHERE annotation_id = ?",
        )
        .bind(payload.to_string())
        .bind(at)
        .bind(annotation_id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_annotation(annotation_id).await
    }

    async fn delete_annotation(&self, annotation_id: AnnotationId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM annotations WHERE annotation_id = ?")
            .bind(annotation_id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_annotations_by_author(
        &self,
        session_id: SessionId,
        created_by: &str,
    ) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM annotations WHERE session_id = ? AND created_by = ?")
            .bind(session_id)
            .bind(created_by)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }

    async fn list_annotations(&self, session_id: SessionId) -> StoreResult<Vec<Annotation>> {
        let rows = sqlx::query(
            "SELECT * FROM annotations WHERE session_id = ? ORDER BY created_at ASC, annotation_id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        rows.iter().map(row_to_annotation).collect()
    }
}
