//! Session lifecycle
//!
//! Host-only start/end transitions and asset sharing, broadcast to the whole
//! session group. `Expired` is never stored; it is derived from the deadline.

use noor_common::groups::SessionId;
use noor_common::models::{ConnectionId, Session, SessionStatus};
use noor_common::{time, GroupKind, HubEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{Actor, Authorizer, Operation, Resource};
use crate::dispatcher::BroadcastDispatcher;
use crate::error::{HubError, Result};
use crate::store::Store;

pub struct SessionLifecycle {
    store: Arc<dyn Store>,
    dispatcher: Arc<BroadcastDispatcher>,
    authorizer: Arc<dyn Authorizer>,
}

impl SessionLifecycle {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<BroadcastDispatcher>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            store,
            dispatcher,
            authorizer,
        }
    }

    /// Created → Active; a session that is already active is left alone
    pub async fn start_session(&self, actor: &Actor, session_id: SessionId) -> Result<Session> {
        let session = self.hosted(actor, session_id).await?;
        let now = time::now();

        match session.status_at(now) {
            SessionStatus::Active => return Ok(session),
            SessionStatus::Ended | SessionStatus::Expired => {
                return Err(HubError::Validation(format!(
                    "Session {} is {} and cannot be started",
                    session_id,
                    session.status_at(now).as_str()
                )));
            }
            SessionStatus::Created => {}
        }

        let changed = self
            .store
            .transition_session(session_id, SessionStatus::Active, now)
            .await?;
        let started = self.reload(session_id).await?;
        if !changed {
            // a concurrent start won the transition and owns the broadcast
            debug!(session_id, status = started.status.as_str(), "Session start was a no-op");
            return Ok(started);
        }

        info!(session_id, "Session started");
        self.dispatcher
            .send_to_group(
                &GroupKind::Session(session_id),
                HubEvent::SessionBegan {
                    session_id,
                    started_at: started.started_at.unwrap_or(now),
                    timestamp: now,
                },
                None,
            )
            .await;

        Ok(started)
    }

    /// Created | Active → Ended; ending twice is a no-op
    pub async fn end_session(&self, actor: &Actor, session_id: SessionId, reason: Option<String>) -> Result<Session> {
        let session = self.hosted(actor, session_id).await?;
        if session.status == SessionStatus::Ended {
            return Ok(session);
        }

        let now = time::now();
        let changed = self
            .store
            .transition_session(session_id, SessionStatus::Ended, now)
            .await?;
        let ended = self.reload(session_id).await?;
        if !changed {
            debug!(session_id, "Session already ended");
            return Ok(ended);
        }
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Session ended by host".to_string());

        info!(session_id, %reason, "Session ended");
        self.dispatcher
            .send_to_group(
                &GroupKind::Session(session_id),
                HubEvent::SessionEnded {
                    session_id,
                    reason,
                    ended_at: ended.ended_at.unwrap_or(now),
                    timestamp: now,
                },
                None,
            )
            .await;

        Ok(ended)
    }

    /// Broadcast an opaque asset to everyone in the session, sender included
    pub async fn share_asset(&self, caller: &ConnectionId, actor: &Actor, session_id: SessionId, asset: Value) -> Result<()> {
        if asset.is_null() {
            return Err(HubError::Validation("Asset payload is required".into()));
        }
        let session = self.hosted(actor, session_id).await?;
        if !session.is_open() {
            return Err(HubError::Validation(format!(
                "Session {} is {}",
                session_id,
                session.effective_status().as_str()
            )));
        }

        let report = self
            .dispatcher
            .send_to_group(
                &GroupKind::Session(session_id),
                HubEvent::AssetShared {
                    session_id,
                    asset,
                    shared_by: caller.clone(),
                    timestamp: time::now(),
                },
                None,
            )
            .await;
        info!(session_id, recipients = report.recipients, "Asset shared");

        Ok(())
    }

    /// Reply `Pong` to the caller
    pub async fn ping(&self, caller: &ConnectionId) -> bool {
        self.dispatcher
            .send_to_connection(caller, HubEvent::Pong { timestamp: time::now() })
            .await
    }

    async fn hosted(&self, actor: &Actor, session_id: SessionId) -> Result<Session> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| session_not_found(session_id))?;
        let verdict = self
            .authorizer
            .authorize(actor, Resource::Session(session_id), Operation::HostSession)
            .await?;
        if !verdict.is_allowed() {
            return Err(HubError::Unauthorized(format!(
                "Host token required for session {}",
                session_id
            )));
        }
        Ok(session)
    }

    async fn reload(&self, session_id: SessionId) -> Result<Session> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| session_not_found(session_id))
    }
}

fn session_not_found(session_id: SessionId) -> HubError {
    HubError::NotFound(format!("Session {} not found", session_id))
}
