//! Session group coordinator
//!
//! Maps sessions onto broadcast groups. Membership notifications fire once
//! per actual transition, so repeated joins and duplicate disconnects are
//! silent.

use noor_common::groups::SessionId;
use noor_common::models::{ConnectionId, Role, Session};
use noor_common::{time, GroupKind, HubEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::{Actor, Authorizer, Operation, Resource};
use crate::dispatcher::BroadcastDispatcher;
use crate::error::{HubError, Result};
use crate::registry::{ConnectionRegistry, GroupChange};
use crate::store::Store;

pub struct SessionGroupCoordinator {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<BroadcastDispatcher>,
    store: Arc<dyn Store>,
    authorizer: Arc<dyn Authorizer>,
    /// Host group each connection joined, per session
    host_groups: RwLock<HashMap<(ConnectionId, SessionId), GroupKind>>,
}

impl SessionGroupCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<BroadcastDispatcher>,
        store: Arc<dyn Store>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            store,
            authorizer,
            host_groups: RwLock::new(HashMap::new()),
        }
    }

    /// Add `caller` to the session group (and the host group for hosts)
    ///
    /// Returns true when the connection was not yet a member. Only then do
    /// the other members receive `MemberJoined`.
    pub async fn join(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        role: Role,
        host_token: Option<&str>,
    ) -> Result<bool> {
        self.require_registered(caller).await?;
        let session = self.session(session_id).await?;

        if role == Role::Host {
            let actor = Actor::new(caller.as_str()).with_host_token(host_token.map(str::to_string));
            let verdict = self
                .authorizer
                .authorize(&actor, Resource::Session(session_id), Operation::HostSession)
                .await?;
            if !verdict.is_allowed() {
                return Err(HubError::Unauthorized(format!(
                    "Host token required to join session {} as host",
                    session_id
                )));
            }
            let host_group = GroupKind::Host(session.host_token.clone());
            if self.registry.add_to_group(caller, host_group.clone()).await == GroupChange::Added {
                self.host_groups
                    .write()
                    .await
                    .insert((caller.clone(), session_id), host_group);
            }
        }

        let group = GroupKind::Session(session_id);
        match self.registry.add_to_group(caller, group.clone()).await {
            GroupChange::Added => {
                info!(%caller, session_id, ?role, "Connection joined session");
                self.dispatcher
                    .send_to_group(
                        &group,
                        HubEvent::MemberJoined {
                            session_id,
                            connection_id: caller.clone(),
                            role,
                            timestamp: time::now(),
                        },
                        Some(caller),
                    )
                    .await;
                Ok(true)
            }
            GroupChange::AlreadyMember => {
                debug!(%caller, session_id, "Connection already in session");
                Ok(false)
            }
            GroupChange::UnknownConnection => Err(unknown_connection(caller)),
        }
    }

    /// Remove `caller` from every group of the session
    ///
    /// Returns true when the connection was in the session group. Does not
    /// consult the store, so it also works after the session was deleted.
    pub async fn leave(&self, caller: &ConnectionId, session_id: SessionId) -> bool {
        let was_member = self
            .registry
            .remove_from_group(caller, &GroupKind::Session(session_id))
            .await;
        self.registry.remove_from_group(caller, &GroupKind::Qa(session_id)).await;

        let host_group = self
            .host_groups
            .write()
            .await
            .remove(&(caller.clone(), session_id));
        if let Some(group) = host_group {
            self.registry.remove_from_group(caller, &group).await;
        }

        if !was_member {
            return false;
        }

        info!(%caller, session_id, "Connection left session");
        self.member_left(caller, session_id).await;
        true
    }

    /// Follow the session's Q&A queue
    pub async fn join_qa(&self, caller: &ConnectionId, session_id: SessionId) -> Result<bool> {
        self.require_registered(caller).await?;
        self.session(session_id).await?;

        match self.registry.add_to_group(caller, GroupKind::Qa(session_id)).await {
            GroupChange::Added => {
                debug!(%caller, session_id, "Connection joined Q&A group");
                Ok(true)
            }
            GroupChange::AlreadyMember => Ok(false),
            GroupChange::UnknownConnection => Err(unknown_connection(caller)),
        }
    }

    pub async fn leave_qa(&self, caller: &ConnectionId, session_id: SessionId) -> bool {
        self.registry.remove_from_group(caller, &GroupKind::Qa(session_id)).await
    }

    /// Drop a connection and tell each session it was in
    ///
    /// Safe to call for unknown or already-removed connections.
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> Vec<GroupKind> {
        let groups = self.registry.unregister(connection_id).await;
        self.host_groups
            .write()
            .await
            .retain(|(id, _), _| id != connection_id);
        for group in &groups {
            if let GroupKind::Session(session_id) = group {
                self.member_left(connection_id, *session_id).await;
            }
        }
        if !groups.is_empty() {
            debug!(%connection_id, groups = groups.len(), "Connection removed from groups");
        }
        groups
    }

    async fn member_left(&self, connection_id: &ConnectionId, session_id: SessionId) {
        self.dispatcher
            .send_to_group(
                &GroupKind::Session(session_id),
                HubEvent::MemberLeft {
                    session_id,
                    connection_id: connection_id.clone(),
                    timestamp: time::now(),
                },
                Some(connection_id),
            )
            .await;
    }

    async fn require_registered(&self, caller: &ConnectionId) -> Result<()> {
        if self.registry.is_registered(caller).await {
            Ok(())
        } else {
            Err(unknown_connection(caller))
        }
    }

    async fn session(&self, session_id: SessionId) -> Result<Session> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Session {} not found", session_id)))
    }
}

fn unknown_connection(connection_id: &ConnectionId) -> HubError {
    HubError::NotFound(format!("Connection {} is not registered", connection_id))
}
