//! Event types delivered to hub connections
//!
//! Every frame a connection receives is a `HubEvent`. Group broadcasts and
//! sender-only confirmations share the enum; the variant name doubles as the
//! SSE event name so clients can subscribe per type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::groups::SessionId;
use crate::models::{
    Annotation, AnnotationId, ConnectionId, Question, QuestionId, Role,
};

/// Stable error code reported to the initiating connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Unauthorized,
    ConflictRetryable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::ConflictRetryable => "conflict_retryable",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

/// Result status carried by an annotation confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmStatus {
    Created,
    Updated,
    Deleted,
}

/// Hub event types
///
/// Serialized with an internal `type` tag and camelCase fields, e.g.
/// `{"type":"QuestionVoteUpdated","questionId":7,"voteCount":3,...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum HubEvent {
    /// First frame on a new connection
    Connected {
        connection_id: ConnectionId,
        timestamp: DateTime<Utc>,
    },

    /// Keep-alive reply, sent to the caller only
    Pong { timestamp: DateTime<Utc> },

    // ----- Session group membership -----
    /// A connection joined the session group (sent to the rest of the group)
    MemberJoined {
        session_id: SessionId,
        connection_id: ConnectionId,
        role: Role,
        timestamp: DateTime<Utc>,
    },

    /// A connection left the session group, explicitly or by disconnecting
    MemberLeft {
        session_id: SessionId,
        connection_id: ConnectionId,
        timestamp: DateTime<Utc>,
    },

    // ----- Session lifecycle -----
    SessionBegan {
        session_id: SessionId,
        started_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    SessionEnded {
        session_id: SessionId,
        reason: String,
        ended_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Host shared a content fragment with the session
    AssetShared {
        session_id: SessionId,
        asset: serde_json::Value,
        shared_by: ConnectionId,
        timestamp: DateTime<Utc>,
    },

    /// Session-level failure reported to the initiating connection
    SessionError { code: ErrorCode, message: String },

    // ----- Q&A -----
    QuestionQueued {
        #[serde(flatten)]
        question: Question,
    },

    /// Copy of a queued question for the host group
    HostQuestionAlert {
        #[serde(flatten)]
        question: Question,
    },

    /// Sender-only confirmation of a submitted question
    QuestionSubmitted {
        success: bool,
        question_id: QuestionId,
    },

    QuestionVoteUpdated {
        question_id: QuestionId,
        session_id: SessionId,
        vote_count: i64,
        timestamp: DateTime<Utc>,
    },

    /// Sender-only confirmation of a recorded vote
    VoteSubmitted {
        success: bool,
        question_id: QuestionId,
        vote_count: i64,
    },

    QuestionAnswered {
        question_id: QuestionId,
        session_id: SessionId,
        answered_at: DateTime<Utc>,
    },

    QuestionDeleted {
        question_id: QuestionId,
        session_id: SessionId,
        deleted_by: String,
        timestamp: DateTime<Utc>,
    },

    QuestionError { code: ErrorCode, message: String },

    VoteError { code: ErrorCode, message: String },

    /// Full Q&A snapshot for a (re)connecting client
    LoadQuestions {
        session_id: SessionId,
        questions: Vec<Question>,
    },

    // ----- Annotations -----
    AnnotationCreated {
        #[serde(flatten)]
        annotation: Annotation,
    },

    AnnotationUpdated {
        annotation_id: AnnotationId,
        session_id: SessionId,
        payload: serde_json::Value,
        updated_by: String,
        updated_at: DateTime<Utc>,
    },

    AnnotationDeleted {
        annotation_id: AnnotationId,
        session_id: SessionId,
        deleted_by: String,
        deleted_at: DateTime<Utc>,
    },

    AnnotationsCleared {
        session_id: SessionId,
        cleared_by: String,
        removed: u64,
        cleared_at: DateTime<Utc>,
    },

    /// Sender-only confirmation of a create/update/delete
    AnnotationConfirmed {
        annotation_id: AnnotationId,
        status: ConfirmStatus,
    },

    /// Sender-only confirmation of a clear
    AnnotationsClearConfirmed { session_id: SessionId, removed: u64 },

    AnnotationError { code: ErrorCode, message: String },

    /// Full annotation snapshot for a (re)connecting client
    LoadAnnotations {
        session_id: SessionId,
        annotations: Vec<Annotation>,
    },
}

impl HubEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            HubEvent::Connected { .. } => "Connected",
            HubEvent::Pong { .. } => "Pong",
            HubEvent::MemberJoined { .. } => "MemberJoined",
            HubEvent::MemberLeft { .. } => "MemberLeft",
            HubEvent::SessionBegan { .. } => "SessionBegan",
            HubEvent::SessionEnded { .. } => "SessionEnded",
            HubEvent::AssetShared { .. } => "AssetShared",
            HubEvent::SessionError { .. } => "SessionError",
            HubEvent::QuestionQueued { .. } => "QuestionQueued",
            HubEvent::HostQuestionAlert { .. } => "HostQuestionAlert",
            HubEvent::QuestionSubmitted { .. } => "QuestionSubmitted",
            HubEvent::QuestionVoteUpdated { .. } => "QuestionVoteUpdated",
            HubEvent::VoteSubmitted { .. } => "VoteSubmitted",
            HubEvent::QuestionAnswered { .. } => "QuestionAnswered",
            HubEvent::QuestionDeleted { .. } => "QuestionDeleted",
            HubEvent::QuestionError { .. } => "QuestionError",
            HubEvent::VoteError { .. } => "VoteError",
            HubEvent::LoadQuestions { .. } => "LoadQuestions",
            HubEvent::AnnotationCreated { .. } => "AnnotationCreated",
            HubEvent::AnnotationUpdated { .. } => "AnnotationUpdated",
            HubEvent::AnnotationDeleted { .. } => "AnnotationDeleted",
            HubEvent::AnnotationsCleared { .. } => "AnnotationsCleared",
            HubEvent::AnnotationConfirmed { .. } => "AnnotationConfirmed",
            HubEvent::AnnotationsClearConfirmed { .. } => "AnnotationsClearConfirmed",
            HubEvent::AnnotationError { .. } => "AnnotationError",
            HubEvent::LoadAnnotations { .. } => "LoadAnnotations",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionStatus;
    use crate::time;

    #[test]
    fn test_question_queued_wire_shape() {
        let event = HubEvent::QuestionQueued {
            question: Question {
                question_id: 1,
                session_id: 42,
                author_id: "U1".into(),
                text: "What is patience?".into(),
                queued_at: time::now(),
                vote_count: 0,
                status: QuestionStatus::Queued,
                answered_at: None,
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "QuestionQueued");
        assert_eq!(json["text"], "What is patience?");
        assert_eq!(json["voteCount"], 0);
        assert_eq!(json["status"], "Queued");
        assert_eq!(json["sessionId"], 42);

        let back: HubEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_error_code_wire_shape() {
        let event = HubEvent::VoteError {
            code: ErrorCode::ValidationError,
            message: "Vote value must be 0 or 1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["code"], ErrorCode::ValidationError.as_str());
        assert_eq!(event.event_type(), "VoteError");
    }

    #[test]
    fn test_event_type_matches_tag() {
        let event = HubEvent::AnnotationsClearConfirmed { session_id: 3, removed: 2 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
    }
}
