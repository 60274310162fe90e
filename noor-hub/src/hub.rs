//! Hub facade
//!
//! Stateless entry point for every inbound operation. Handlers hold no
//! per-connection fields; everything is keyed by the caller's
//! `ConnectionId` and lives in the injected registry and store.
//!
//! Failed operations are reported to the caller as the matching typed error
//! event (`SessionError`, `QuestionError`, `VoteError`, `AnnotationError`)
//! and returned. Nothing is broadcast for them.

use noor_common::config::HubSettings;
use noor_common::events::ErrorCode;
use noor_common::groups::SessionId;
use noor_common::models::{
    Annotation, AnnotationId, ConnectionId, NewSession, Question, QuestionId, Role, Session,
};
use noor_common::{time, HubEvent};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::auth::{Actor, Authorizer, SessionRoleAuthorizer};
use crate::coordinator::SessionGroupCoordinator;
use crate::dispatcher::BroadcastDispatcher;
use crate::engine::{AnnotationEngine, QaEngine, SessionLifecycle};
use crate::error::{HubError, Result};
use crate::registry::ConnectionRegistry;
use crate::store::{SqliteStore, Store};

/// Receiving half of a connection's outbound queue
pub type EventReceiver = mpsc::Receiver<Arc<HubEvent>>;

/// Which error event family an operation reports through
#[derive(Debug, Clone, Copy)]
enum ErrorFamily {
    Session,
    Question,
    Vote,
    Annotation,
}

impl ErrorFamily {
    fn event(self, code: ErrorCode, message: String) -> HubEvent {
        match self {
            ErrorFamily::Session => HubEvent::SessionError { code, message },
            ErrorFamily::Question => HubEvent::QuestionError { code, message },
            ErrorFamily::Vote => HubEvent::VoteError { code, message },
            ErrorFamily::Annotation => HubEvent::AnnotationError { code, message },
        }
    }
}

/// Hub counters for the health endpoint
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub groups: usize,
    pub events_delivered: u64,
    pub delivery_failures: u64,
}

pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<BroadcastDispatcher>,
    store: Arc<dyn Store>,
    coordinator: SessionGroupCoordinator,
    qa: QaEngine,
    annotations: AnnotationEngine,
    lifecycle: SessionLifecycle,
    settings: HubSettings,
}

impl Hub {
    pub fn new(store: Arc<dyn Store>, authorizer: Arc<dyn Authorizer>, settings: HubSettings) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(BroadcastDispatcher::new(Arc::clone(&registry)));

        let coordinator = SessionGroupCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            Arc::clone(&store),
            Arc::clone(&authorizer),
        );
        let qa = QaEngine::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            Arc::clone(&authorizer),
            &settings,
        );
        let annotations = AnnotationEngine::new(Arc::clone(&store), Arc::clone(&dispatcher));
        let lifecycle = SessionLifecycle::new(Arc::clone(&store), Arc::clone(&dispatcher), authorizer);

        Self {
            registry,
            dispatcher,
            store,
            coordinator,
            qa,
            annotations,
            lifecycle,
            settings,
        }
    }

    /// Hub over a SQLite pool with the session-role authorizer
    pub fn with_sqlite(pool: SqlitePool, settings: HubSettings) -> Self {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let authorizer = Arc::new(SessionRoleAuthorizer::new(Arc::clone(&store)));
        Self::new(store, authorizer, settings)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.connection_count().await,
            groups: self.registry.group_count().await,
            events_delivered: self.dispatcher.delivered_total(),
            delivery_failures: self.dispatcher.failed_total(),
        }
    }

    // ----- Connections -----

    /// Register a new connection; its first queued event is `Connected`
    pub async fn connect(&self) -> (ConnectionId, EventReceiver) {
        let (tx, rx) = mpsc::channel(self.settings.connection_buffer);
        let connection_id = loop {
            let candidate = ConnectionId::generate();
            if self.registry.register(candidate.clone(), tx.clone()).await {
                break candidate;
            }
        };

        info!(%connection_id, "Connection opened");
        self.dispatcher
            .send_to_connection(
                &connection_id,
                HubEvent::Connected {
                    connection_id: connection_id.clone(),
                    timestamp: time::now(),
                },
            )
            .await;

        (connection_id, rx)
    }

    /// Unregister a connection; duplicate calls are harmless
    pub async fn disconnect(&self, connection_id: &ConnectionId) {
        let groups = self.coordinator.disconnect(connection_id).await;
        info!(%connection_id, groups = groups.len(), "Connection closed");
    }

    // ----- Session groups -----

    pub async fn join_session_group(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        role: Role,
        host_token: Option<&str>,
    ) -> Result<bool> {
        let result = self.coordinator.join(caller, session_id, role, host_token).await;
        self.report(caller, ErrorFamily::Session, result).await
    }

    pub async fn leave_session_group(&self, caller: &ConnectionId, session_id: SessionId) -> bool {
        self.coordinator.leave(caller, session_id).await
    }

    pub async fn join_qa_session(&self, caller: &ConnectionId, session_id: SessionId) -> Result<bool> {
        let result = self.coordinator.join_qa(caller, session_id).await;
        self.report(caller, ErrorFamily::Question, result).await
    }

    pub async fn leave_qa_session(&self, caller: &ConnectionId, session_id: SessionId) -> bool {
        self.coordinator.leave_qa(caller, session_id).await
    }

    // ----- Session lifecycle -----

    /// Persist a new session; tokens are issued by the caller
    pub async fn create_session(&self, new: NewSession) -> Result<Session> {
        if new.host_token.trim().is_empty() || new.user_token.trim().is_empty() {
            return Err(HubError::Validation("Host and user tokens are required".into()));
        }
        if new.host_token == new.user_token {
            return Err(HubError::Validation("Host and user tokens must differ".into()));
        }
        let session = self.store.create_session(new).await?;
        info!(session_id = session.session_id, "Session created");
        Ok(session)
    }

    /// Delete a session with its questions, votes and annotations
    pub async fn delete_session(&self, session_id: SessionId) -> Result<()> {
        if !self.store.delete_session(session_id).await? {
            return Err(HubError::NotFound(format!("Session {} not found", session_id)));
        }
        info!(session_id, "Session deleted");
        Ok(())
    }

    pub async fn get_session(&self, session_id: SessionId) -> Result<Session> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Session {} not found", session_id)))
    }

    pub async fn start_session(&self, caller: &ConnectionId, session_id: SessionId, host_token: &str) -> Result<Session> {
        let actor = host_actor(caller, host_token);
        let result = self.lifecycle.start_session(&actor, session_id).await;
        self.report(caller, ErrorFamily::Session, result).await
    }

    pub async fn end_session(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        host_token: &str,
        reason: Option<String>,
    ) -> Result<Session> {
        let actor = host_actor(caller, host_token);
        let result = self.lifecycle.end_session(&actor, session_id, reason).await;
        self.report(caller, ErrorFamily::Session, result).await
    }

    pub async fn share_asset(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        host_token: &str,
        asset: Value,
    ) -> Result<()> {
        let actor = host_actor(caller, host_token);
        let result = self.lifecycle.share_asset(caller, &actor, session_id, asset).await;
        self.report(caller, ErrorFamily::Session, result).await
    }

    pub async fn ping(&self, caller: &ConnectionId) -> bool {
        self.lifecycle.ping(caller).await
    }

    // ----- Q&A -----

    pub async fn submit_question(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        author_id: &str,
        text: &str,
    ) -> Result<Question> {
        let result = self.qa.submit(caller, session_id, author_id, text).await;
        self.report(caller, ErrorFamily::Question, result).await
    }

    pub async fn vote_on_question(
        &self,
        caller: &ConnectionId,
        question_id: QuestionId,
        voter_id: &str,
        value: i64,
    ) -> Result<i64> {
        let result = self.qa.vote(caller, question_id, voter_id, value).await;
        self.report(caller, ErrorFamily::Vote, result).await
    }

    pub async fn answer_question(&self, caller: &ConnectionId, question_id: QuestionId) -> Result<bool> {
        let result = self.qa.answer(question_id).await;
        self.report(caller, ErrorFamily::Question, result).await
    }

    pub async fn delete_question(
        &self,
        caller: &ConnectionId,
        question_id: QuestionId,
        requester_id: &str,
        host_token: Option<&str>,
    ) -> Result<bool> {
        let actor = Actor::new(requester_id).with_host_token(host_token.map(str::to_string));
        let result = self.qa.delete(question_id, &actor).await;
        self.report(caller, ErrorFamily::Question, result).await
    }

    pub async fn load_questions(&self, caller: &ConnectionId, session_id: SessionId) -> Result<Vec<Question>> {
        let result = self.qa.load_questions(caller, session_id).await;
        self.report(caller, ErrorFamily::Question, result).await
    }

    // ----- Annotations -----

    pub async fn create_annotation(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        author_id: &str,
        payload: Value,
    ) -> Result<Annotation> {
        let result = self.annotations.create(caller, session_id, author_id, payload).await;
        self.report(caller, ErrorFamily::Annotation, result).await
    }

    pub async fn update_annotation(
        &self,
        caller: &ConnectionId,
        annotation_id: AnnotationId,
        author_id: &str,
        payload: Value,
    ) -> Result<Annotation> {
        let result = self.annotations.update(caller, annotation_id, author_id, payload).await;
        self.report(caller, ErrorFamily::Annotation, result).await
    }

    pub async fn delete_annotation(
        &self,
        caller: &ConnectionId,
        annotation_id: AnnotationId,
        author_id: &str,
    ) -> Result<()> {
        let result = self.annotations.delete(caller, annotation_id, author_id).await;
        self.report(caller, ErrorFamily::Annotation, result).await
    }

    pub async fn clear_my_annotations(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        author_id: &str,
    ) -> Result<u64> {
        let result = self.annotations.clear_mine(caller, session_id, author_id).await;
        self.report(caller, ErrorFamily::Annotation, result).await
    }

    pub async fn load_annotations(&self, caller: &ConnectionId, session_id: SessionId) -> Result<Vec<Annotation>> {
        let result = self.annotations.load_annotations(caller, session_id).await;
        self.report(caller, ErrorFamily::Annotation, result).await
    }

    /// Send a failed operation's error event to the caller, then pass the result on
    async fn report<T>(&self, caller: &ConnectionId, family: ErrorFamily, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            match err {
                HubError::Store(detail) => warn!(%caller, %detail, "Operation failed in store"),
                other => info!(%caller, code = other.code().as_str(), "Operation rejected: {}", other),
            }
            self.dispatcher
                .send_to_connection(caller, family.event(err.code(), err.client_message()))
                .await;
        }
        result
    }
}

fn host_actor(caller: &ConnectionId, host_token: &str) -> Actor {
    Actor::new(caller.as_str()).with_host_token(Some(host_token.to_string()))
}
