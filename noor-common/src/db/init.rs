//! Database initialization
//!
//! Creates the database file and schema on first run. Every statement is
//! idempotent, so opening an existing database re-runs them safely.
//!
//! Ownership is enforced here: questions and annotations cascade with their
//! session, votes cascade with their question, and a voter holds at most one
//! vote row per question.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open (creating if needed) the database file and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        // WAL allows concurrent readers alongside the single writer
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database with the full schema
///
/// Limited to a single connection: each SQLite in-memory connection is its
/// own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all hub tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_sessions_table(pool).await?;
    create_questions_table(pool).await?;
    create_question_votes_table(pool).await?;
    create_annotations_table(pool).await?;
    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id INTEGER PRIMARY KEY AUTOINCREMENT,
            host_token TEXT NOT NULL UNIQUE,
            user_token TEXT NOT NULL UNIQUE,
            title TEXT,
            status TEXT NOT NULL DEFAULT 'Created'
                CHECK (status IN ('Created', 'Active', 'Ended')),
            created_at TEXT NOT NULL,
            started_at TEXT,
            ended_at TEXT,
            expires_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_questions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            question_id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL
                REFERENCES sessions(session_id) ON DELETE CASCADE,
            author_id TEXT NOT NULL,
            question_text TEXT NOT NULL,
            queued_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'Queued'
                CHECK (status IN ('Queued', 'Answered', 'Deleted')),
            answered_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_questions_session ON questions(session_id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_question_votes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS question_votes (
            vote_id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_id INTEGER NOT NULL
                REFERENCES questions(question_id) ON DELETE CASCADE,
            voter_id TEXT NOT NULL,
            vote_value INTEGER NOT NULL,
            voted_at TEXT NOT NULL,
            UNIQUE (question_id, voter_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_annotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotations (
            annotation_id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL
                REFERENCES sessions(session_id) ON DELETE CASCADE,
            created_by TEXT NOT NULL,
            annotation_data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_annotations_session_author ON annotations(session_id, created_by)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_database_has_schema() {
        let pool = init_memory_database().await.unwrap();
        for table in ["sessions", "questions", "question_votes", "annotations"] {
            assert!(table_exists(&pool, table).await, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_vote_rejected_by_constraint() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query(
            "INSERT INTO sessions (host_token, user_token, created_at) VALUES ('H', 'U', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO questions (session_id, author_id, question_text, queued_at) VALUES (1, 'a', 'q', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let insert = "INSERT INTO question_votes (question_id, voter_id, vote_value, voted_at) VALUES (1, 'v', 1, '2026-01-01T00:00:00Z')";
        sqlx::query(insert).execute(&pool).await.unwrap();
        assert!(sqlx::query(insert).execute(&pool).await.is_err());
    }

    #[tokio::test]
    async fn test_session_delete_cascades() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query(
            "INSERT INTO sessions (host_token, user_token, created_at) VALUES ('H', 'U', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO questions (session_id, author_id, question_text, queued_at) VALUES (1, 'a', 'q', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO annotations (session_id, created_by, annotation_data, created_at) VALUES (1, 'a', '{}', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query("DELETE FROM sessions WHERE session_id = 1")
            .execute(&pool)
            .await
            .unwrap();

        let questions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
            .fetch_one(&pool)
            .await
            .unwrap();
        let annotations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM annotations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(questions, 0);
        assert_eq!(annotations, 0);
    }
}
