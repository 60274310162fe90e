//! Domain models shared by the hub and its store
//!
//! Sessions own questions and annotations; questions own votes. Deleting a
//! parent cascades to its children at the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::groups::SessionId;
use crate::time;

/// Question identifier (never reused)
pub type QuestionId = i64;

/// Annotation identifier
pub type AnnotationId = i64;

/// Opaque identifier for one live transport connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate a fresh random connection id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role a connection joins a session with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    #[default]
    Participant,
}

/// Session lifecycle status
///
/// `Expired` is never stored; it is derived from `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Created,
    Active,
    Ended,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "Created",
            SessionStatus::Active => "Active",
            SessionStatus::Ended => "Ended",
            SessionStatus::Expired => "Expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Created" => Some(SessionStatus::Created),
            "Active" => Some(SessionStatus::Active),
            "Ended" => Some(SessionStatus::Ended),
            "Expired" => Some(SessionStatus::Expired),
            _ => None,
        }
    }
}

/// A hosted session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub host_token: String,
    pub user_token: String,
    pub title: Option<String>,
    /// Stored status (never `Expired`)
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Status as observed at `at`, with expiry applied
    ///
    /// An ended session stays `Ended` even after its deadline.
    pub fn status_at(&self, at: DateTime<Utc>) -> SessionStatus {
        if self.status != SessionStatus::Ended && time::is_past(self.expires_at, at) {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    /// Current status, with expiry applied
    pub fn effective_status(&self) -> SessionStatus {
        self.status_at(time::now())
    }

    /// Whether the session still accepts questions and lifecycle changes
    pub fn is_open(&self) -> bool {
        matches!(
            self.effective_status(),
            SessionStatus::Created | SessionStatus::Active
        )
    }
}

/// Session creation request (tokens are issued elsewhere)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub host_token: String,
    pub user_token: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Question lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionStatus {
    Queued,
    Answered,
    Deleted,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Queued => "Queued",
            QuestionStatus::Answered => "Answered",
            QuestionStatus::Deleted => "Deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Queued" => Some(QuestionStatus::Queued),
            "Answered" => Some(QuestionStatus::Answered),
            "Deleted" => Some(QuestionStatus::Deleted),
            _ => None,
        }
    }
}

/// A question in a session's Q&A queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_id: QuestionId,
    pub session_id: SessionId,
    pub author_id: String,
    pub text: String,
    pub queued_at: DateTime<Utc>,
    /// Derived from the vote rows, never cached
    pub vote_count: i64,
    pub status: QuestionStatus,
    pub answered_at: Option<DateTime<Utc>>,
}

/// A shared annotation or asset record
///
/// The payload is an uninterpreted JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub annotation_id: AnnotationId,
    pub session_id: SessionId,
    pub created_by: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Canonical vote-value domain
///
/// `Flag` records "has voted" (1) or "withdrawn" (0); `Signed` records an
/// up (+1) or down (-1) vote. The tally is the sum of stored values,
/// floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VotePolicy {
    #[default]
    Flag,
    Signed,
}

impl VotePolicy {
    /// Whether `value` belongs to this policy's value set
    pub fn allows(&self, value: i64) -> bool {
        match self {
            VotePolicy::Flag => value == 0 || value == 1,
            VotePolicy::Signed => value == -1 || value == 1,
        }
    }

    /// Human-readable description of the allowed set
    pub fn describe(&self) -> &'static str {
        match self {
            VotePolicy::Flag => "0 or 1",
            VotePolicy::Signed => "-1 or 1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(status: SessionStatus, expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            session_id: 1,
            host_token: "HOST0001".into(),
            user_token: "USER0001".into(),
            title: None,
            status,
            created_at: time::now(),
            started_at: None,
            ended_at: None,
            expires_at,
        }
    }

    #[test]
    fn test_expiry_is_derived() {
        let past = Some(time::now() - Duration::minutes(5));
        assert_eq!(session(SessionStatus::Active, past).effective_status(), SessionStatus::Expired);
        assert_eq!(session(SessionStatus::Active, None).effective_status(), SessionStatus::Active);
        assert!(!session(SessionStatus::Created, past).is_open());
    }

    #[test]
    fn test_ended_wins_over_expiry() {
        let past = Some(time::now() - Duration::minutes(5));
        assert_eq!(session(SessionStatus::Ended, past).effective_status(), SessionStatus::Ended);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for s in [QuestionStatus::Queued, QuestionStatus::Answered, QuestionStatus::Deleted] {
            assert_eq!(QuestionStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(SessionStatus::parse("bogus"), None);
    }

    #[test]
    fn test_vote_policy_sets() {
        assert!(VotePolicy::Flag.allows(0));
        assert!(VotePolicy::Flag.allows(1));
        assert!(!VotePolicy::Flag.allows(-1));
        assert!(VotePolicy::Signed.allows(-1));
        assert!(!VotePolicy::Signed.allows(0));
        assert!(!VotePolicy::Signed.allows(2));
    }
}
