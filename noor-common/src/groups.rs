//! Typed broadcast group names
//!
//! Every broadcast scope is one of three partitions. The string forms
//! (`session_42`, `qa_session_42`, `host_<token>`) are only produced for
//! logging and for clients that display the scope; membership is always
//! keyed by the typed value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric session identifier
pub type SessionId = i64;

/// A named broadcast scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum GroupKind {
    /// Every participant and host connected to a session (`session_{id}`)
    Session(SessionId),
    /// Connections following the Q&A queue of a session (`qa_session_{id}`)
    Qa(SessionId),
    /// Host connections, keyed by the session's host token (`host_{token}`)
    Host(String),
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Session(id) => write!(f, "session_{}", id),
            GroupKind::Qa(id) => write!(f, "qa_session_{}", id),
            GroupKind::Host(token) => write!(f, "host_{}", token),
        }
    }
}
