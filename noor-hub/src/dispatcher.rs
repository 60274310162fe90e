//! Broadcast dispatcher
//!
//! Fans one event out to every current member of a group. Delivery is
//! fire-and-forget per recipient: each member has its own bounded queue, a
//! push never waits, and a full or closed queue only affects that member.
//!
//! Ordering: a push lands in a FIFO queue before `send_to_group` returns, so
//! two events dispatched in sequence by one task reach every member in that
//! order. Nothing is ever resent; reconnecting clients ask for a snapshot.

use noor_common::models::ConnectionId;
use noor_common::{GroupKind, HubEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::registry::{ConnectionRegistry, EventSender};

/// Per-call delivery outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Members targeted (after exclusion)
    pub recipients: usize,
    /// Queued successfully
    pub delivered: usize,
    /// Dropped because the recipient's queue was full or closed
    pub failed: usize,
}

/// Group fan-out over the connection registry
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
    delivered_total: AtomicU64,
    failed_total: AtomicU64,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            delivered_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
        }
    }

    /// Deliver `event` to every member of `group` except `exclude`
    pub async fn send_to_group(
        &self,
        group: &GroupKind,
        event: HubEvent,
        exclude: Option<&ConnectionId>,
    ) -> DeliveryReport {
        let event = Arc::new(event);
        let mut report = DeliveryReport::default();

        for (connection_id, sender) in self.registry.members(group).await {
            if exclude == Some(&connection_id) {
                continue;
            }
            report.recipients += 1;
            if self.push(&connection_id, &sender, &event) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        debug!(
            %group,
            event_type = event.event_type(),
            recipients = report.recipients,
            failed = report.failed,
            "Broadcast event"
        );
        report
    }

    /// Deliver `event` to a single connection; false if it could not be queued
    pub async fn send_to_connection(&self, connection_id: &ConnectionId, event: HubEvent) -> bool {
        let Some(sender) = self.registry.sender(connection_id).await else {
            debug!(%connection_id, event_type = event.event_type(), "Target connection is gone");
            return false;
        };
        self.push(connection_id, &sender, &Arc::new(event))
    }

    /// Total events queued since startup
    pub fn delivered_total(&self) -> u64 {
        self.delivered_total.load(Ordering::Relaxed)
    }

    /// Total per-recipient delivery failures since startup
    pub fn failed_total(&self) -> u64 {
        self.failed_total.load(Ordering::Relaxed)
    }

    fn push(&self, connection_id: &ConnectionId, sender: &EventSender, event: &Arc<HubEvent>) -> bool {
        match sender.try_send(Arc::clone(event)) {
            Ok(()) => {
                self.delivered_total.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.failed_total.fetch_add(1, Ordering::Relaxed);
                warn!(
                    %connection_id,
                    event_type = event.event_type(),
                    "Transient delivery failure: outbound queue full, event dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.failed_total.fetch_add(1, Ordering::Relaxed);
                warn!(
                    %connection_id,
                    event_type = event.event_type(),
                    "Transient delivery failure: connection closed"
                );
                false
            }
        }
    }
}
