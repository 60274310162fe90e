//! Authorization collaborator
//!
//! The hub asks an `Authorizer` for a verdict and trusts the answer. Policy
//! lives behind the trait; `SessionRoleAuthorizer` is the default adapter
//! and derives privileges from the session record.

use async_trait::async_trait;
use noor_common::groups::SessionId;
use noor_common::models::{QuestionId, QuestionStatus};
use std::sync::Arc;

use crate::error::{HubError, Result};
use crate::store::Store;

/// Who is asking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Stable actor identity (user id or connection id)
    pub id: String,
    /// Host token presented with the request, if any
    pub host_token: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host_token: None,
        }
    }

    pub fn with_host_token(mut self, token: Option<String>) -> Self {
        self.host_token = token;
        self
    }
}

/// What is being acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Session(SessionId),
    Question(QuestionId),
}

/// Privileged operations the hub asks about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Act as the session's host (join as host, start/end, share assets)
    HostSession,
    /// Remove a question from the queue
    DeleteQuestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Decide whether `actor` may perform `operation` on `resource`
    ///
    /// A missing resource is reported as `HubError::NotFound`, not a denial.
    async fn authorize(&self, actor: &Actor, resource: Resource, operation: Operation) -> Result<Verdict>;
}

/// Grants host rights to whoever presents the session's host token and
/// question deletion to the author or the host
pub struct SessionRoleAuthorizer {
    store: Arc<dyn Store>,
}

impl SessionRoleAuthorizer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn is_host(&self, actor: &Actor, session_id: SessionId) -> Result<bool> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Session {} not found", session_id)))?;
        Ok(actor.host_token.as_deref() == Some(session.host_token.as_str()))
    }
}

#[async_trait]
impl Authorizer for SessionRoleAuthorizer {
    async fn authorize(&self, actor: &Actor, resource: Resource, operation: Operation) -> Result<Verdict> {
        let allowed = match (resource, operation) {
            (Resource::Session(session_id), Operation::HostSession) => {
                self.is_host(actor, session_id).await?
            }
            (Resource::Question(question_id), Operation::DeleteQuestion) => {
                let question = self
                    .store
                    .get_question(question_id)
                    .await?
                    .filter(|q| q.status != QuestionStatus::Deleted)
                    .ok_or_else(|| HubError::NotFound(format!("Question {} not found", question_id)))?;
                question.author_id == actor.id || self.is_host(actor, question.session_id).await?
            }
            _ => false,
        };

        Ok(if allowed { Verdict::Allow } else { Verdict::Deny })
    }
}
