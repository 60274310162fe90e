//! Connection registry
//!
//! Tracks live transport connections, the outbound queue of each, and their
//! membership in broadcast groups. Pure bookkeeping: no business rules.
//!
//! All membership changes happen under one write lock, so add/remove on a
//! group is serialized and a group's member set is never observed half
//! updated. Empty groups are pruned.

use noor_common::models::ConnectionId;
use noor_common::{GroupKind, HubEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Outbound queue feeding one connection's transport
pub type EventSender = mpsc::Sender<Arc<HubEvent>>;

/// Result of adding a connection to a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupChange {
    /// Connection was not a member before
    Added,
    /// Connection was already a member; nothing changed
    AlreadyMember,
    /// Connection id is not registered (e.g. already disconnected)
    UnknownConnection,
}

struct ConnectionEntry {
    sender: EventSender,
    groups: HashSet<GroupKind>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    groups: HashMap<GroupKind, HashSet<ConnectionId>>,
}

/// Live connections and their group memberships
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with its outbound queue
    ///
    /// Returns false (and keeps the existing queue) if the id is already
    /// registered.
    pub async fn register(&self, connection_id: ConnectionId, sender: EventSender) -> bool {
        let mut inner = self.inner.write().await;
        if inner.connections.contains_key(&connection_id) {
            return false;
        }
        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                sender,
                groups: HashSet::new(),
            },
        );
        true
    }

    /// Remove a connection and every group membership it held
    ///
    /// Returns the groups the connection was removed from. Unknown ids are a
    /// no-op returning an empty list, so duplicate disconnects are safe.
    pub async fn unregister(&self, connection_id: &ConnectionId) -> Vec<GroupKind> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.connections.remove(connection_id) else {
            return Vec::new();
        };

        let groups: Vec<GroupKind> = entry.groups.into_iter().collect();
        for group in &groups {
            remove_member(&mut inner.groups, group, connection_id);
        }
        debug!(%connection_id, groups = groups.len(), "Unregistered connection");
        groups
    }

    /// Groups a connection currently belongs to (empty if unknown)
    pub async fn groups_of(&self, connection_id: &ConnectionId) -> HashSet<GroupKind> {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(connection_id)
            .map(|entry| entry.groups.clone())
            .unwrap_or_default()
    }

    /// Add a connection to a group
    pub async fn add_to_group(&self, connection_id: &ConnectionId, group: GroupKind) -> GroupChange {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.connections.get_mut(connection_id) else {
            return GroupChange::UnknownConnection;
        };
        if !entry.groups.insert(group.clone()) {
            return GroupChange::AlreadyMember;
        }
        inner
            .groups
            .entry(group)
            .or_default()
            .insert(connection_id.clone());
        GroupChange::Added
    }

    /// Remove a connection from a group; true if it was a member
    pub async fn remove_from_group(&self, connection_id: &ConnectionId, group: &GroupKind) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.connections.get_mut(connection_id) else {
            return false;
        };
        if !entry.groups.remove(group) {
            return false;
        }
        remove_member(&mut inner.groups, group, connection_id);
        true
    }

    /// Snapshot of a group's members and their queues
    pub async fn members(&self, group: &GroupKind) -> Vec<(ConnectionId, EventSender)> {
        let inner = self.inner.read().await;
        let Some(ids) = inner.groups.get(group) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| {
                inner
                    .connections
                    .get(id)
                    .map(|entry| (id.clone(), entry.sender.clone()))
            })
            .collect()
    }

    /// Outbound queue of a single connection
    pub async fn sender(&self, connection_id: &ConnectionId) -> Option<EventSender> {
        let inner = self.inner.read().await;
        inner.connections.get(connection_id).map(|e| e.sender.clone())
    }

    pub async fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.inner.read().await.connections.contains_key(connection_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Number of members in a group (0 for pruned/unknown groups)
    pub async fn group_size(&self, group: &GroupKind) -> usize {
        self.inner
            .read()
            .await
            .groups
            .get(group)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub async fn group_count(&self) -> usize {
        self.inner.read().await.groups.len()
    }
}

fn remove_member(
    groups: &mut HashMap<GroupKind, HashSet<ConnectionId>>,
    group: &GroupKind,
    connection_id: &ConnectionId,
) {
    if let Some(members) = groups.get_mut(group) {
        members.remove(connection_id);
        if members.is_empty() {
            groups.remove(group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> (EventSender, mpsc::Receiver<Arc<HubEvent>>) {
        mpsc::channel(8)
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = queue();
        let id = ConnectionId::from("c1");

        assert!(registry.register(id.clone(), tx.clone()).await);
        assert!(!registry.register(id.clone(), tx).await);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_add_to_group_transitions() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = queue();
        let id = ConnectionId::from("c1");
        registry.register(id.clone(), tx).await;

        let group = GroupKind::Session(42);
        assert_eq!(registry.add_to_group(&id, group.clone()).await, GroupChange::Added);
        assert_eq!(registry.add_to_group(&id, group.clone()).await, GroupChange::AlreadyMember);
        assert_eq!(registry.group_size(&group).await, 1);

        let unknown = ConnectionId::from("ghost");
        assert_eq!(
            registry.add_to_group(&unknown, group.clone()).await,
            GroupChange::UnknownConnection
        );
    }

    #[tokio::test]
    async fn test_unregister_removes_all_memberships() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = queue();
        let id = ConnectionId::from("c1");
        registry.register(id.clone(), tx).await;
        registry.add_to_group(&id, GroupKind::Session(1)).await;
        registry.add_to_group(&id, GroupKind::Qa(1)).await;

        let mut left = registry.unregister(&id).await;
        left.sort_by_key(|g| g.to_string());
        assert_eq!(left, vec![GroupKind::Qa(1), GroupKind::Session(1)]);

        assert!(registry.members(&GroupKind::Session(1)).await.is_empty());
        assert_eq!(registry.group_count().await, 0);
        assert!(registry.groups_of(&id).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_connection_operations_are_noops() {
        let registry = ConnectionRegistry::new();
        let ghost = ConnectionId::from("ghost");

        assert!(registry.unregister(&ghost).await.is_empty());
        assert!(registry.unregister(&ghost).await.is_empty());
        assert!(!registry.remove_from_group(&ghost, &GroupKind::Qa(3)).await);
        assert!(registry.groups_of(&ghost).await.is_empty());
        assert!(registry.sender(&ghost).await.is_none());
    }

    #[tokio::test]
    async fn test_members_snapshot() {
        let registry = ConnectionRegistry::new();
        let group = GroupKind::Host("HOSTTOKEN".into());
        for name in ["a", "b", "c"] {
            let (tx, _rx) = queue();
            let id = ConnectionId::from(name);
            registry.register(id.clone(), tx).await;
            registry.add_to_group(&id, group.clone()).await;
        }
        registry.remove_from_group(&ConnectionId::from("b"), &group).await;

        let mut ids: Vec<String> = registry
            .members(&group)
            .await
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
