//! Annotation and asset broadcast engine
//!
//! Records either exist or are gone. Only the author may update or delete a
//! record. Every mutation is broadcast to the session group without the
//! acting connection, which instead receives a confirmation carrying the
//! resulting id and status.

use noor_common::events::ConfirmStatus;
use noor_common::groups::SessionId;
use noor_common::models::{Annotation, AnnotationId, ConnectionId, Session};
use noor_common::{time, GroupKind, HubEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::locks::KeyedLocks;
use crate::dispatcher::BroadcastDispatcher;
use crate::error::{HubError, Result};
use crate::store::Store;

pub struct AnnotationEngine {
    store: Arc<dyn Store>,
    dispatcher: Arc<BroadcastDispatcher>,
    locks: KeyedLocks<AnnotationId>,
}

impl AnnotationEngine {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<BroadcastDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn create(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        author_id: &str,
        payload: Value,
    ) -> Result<Annotation> {
        require_author(author_id)?;
        require_payload(&payload)?;

        self.open_session(session_id).await?;

        let annotation = self
            .store
            .insert_annotation(session_id, author_id, &payload, time::now())
            .await?;
        debug!(session_id, annotation_id = annotation.annotation_id, author_id, "Annotation created");

        let annotation_id = annotation.annotation_id;
        self.broadcast_then_confirm(
            caller,
            session_id,
            HubEvent::AnnotationCreated { annotation: annotation.clone() },
            HubEvent::AnnotationConfirmed {
                annotation_id,
                status: ConfirmStatus::Created,
            },
        )
        .await;

        Ok(annotation)
    }

    pub async fn update(
        &self,
        caller: &ConnectionId,
        annotation_id: AnnotationId,
        author_id: &str,
        payload: Value,
    ) -> Result<Annotation> {
        require_author(author_id)?;
        require_payload(&payload)?;

        let _guard = self.locks.lock(annotation_id).await;
        let current = self.owned(annotation_id, author_id).await?;
        self.open_session(current.session_id).await?;

        let updated = self
            .store
            .update_annotation(annotation_id, &payload, time::now())
            .await?
            .ok_or_else(|| annotation_not_found(annotation_id))?;
        let updated_at = updated.updated_at.unwrap_or(updated.created_at);

        self.broadcast_then_confirm(
            caller,
            updated.session_id,
            HubEvent::AnnotationUpdated {
                annotation_id,
                session_id: updated.session_id,
                payload: updated.payload.clone(),
                updated_by: author_id.to_string(),
                updated_at,
            },
            HubEvent::AnnotationConfirmed {
                annotation_id,
                status: ConfirmStatus::Updated,
            },
        )
        .await;

        Ok(updated)
    }

    pub async fn delete(&self, caller: &ConnectionId, annotation_id: AnnotationId, author_id: &str) -> Result<()> {
        require_author(author_id)?;

        let _guard = self.locks.lock(annotation_id).await;
        let annotation = self.owned(annotation_id, author_id).await?;
        self.open_session(annotation.session_id).await?;

        if !self.store.delete_annotation(annotation_id).await? {
            return Err(annotation_not_found(annotation_id));
        }
        debug!(annotation_id, author_id, "Annotation deleted");

        self.broadcast_then_confirm(
            caller,
            annotation.session_id,
            HubEvent::AnnotationDeleted {
                annotation_id,
                session_id: annotation.session_id,
                deleted_by: author_id.to_string(),
                deleted_at: time::now(),
            },
            HubEvent::AnnotationConfirmed {
                annotation_id,
                status: ConfirmStatus::Deleted,
            },
        )
        .await;

        Ok(())
    }

    /// Remove every record `author_id` made in the session
    ///
    /// Others are only told when something was removed; the caller is always
    /// confirmed, even for zero.
    pub async fn clear_mine(&self, caller: &ConnectionId, session_id: SessionId, author_id: &str) -> Result<u64> {
        require_author(author_id)?;
        self.open_session(session_id).await?;

        let removed = self.store.delete_annotations_by_author(session_id, author_id).await?;
        info!(session_id, author_id, removed, "Annotations cleared");

        let confirm = HubEvent::AnnotationsClearConfirmed { session_id, removed };
        if removed > 0 {
            self.broadcast_then_confirm(
                caller,
                session_id,
                HubEvent::AnnotationsCleared {
                    session_id,
                    cleared_by: author_id.to_string(),
                    removed,
                    cleared_at: time::now(),
                },
                confirm,
            )
            .await;
        } else {
            self.dispatcher.send_to_connection(caller, confirm).await;
        }

        Ok(removed)
    }

    /// Send the session's annotations to `caller` only
    pub async fn load_annotations(&self, caller: &ConnectionId, session_id: SessionId) -> Result<Vec<Annotation>> {
        self.session(session_id).await?;
        let annotations = self.store.list_annotations(session_id).await?;

        self.dispatcher
            .send_to_connection(
                caller,
                HubEvent::LoadAnnotations {
                    session_id,
                    annotations: annotations.clone(),
                },
            )
            .await;

        Ok(annotations)
    }

    async fn broadcast_then_confirm(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        broadcast: HubEvent,
        confirm: HubEvent,
    ) {
        self.dispatcher
            .send_to_group(&GroupKind::Session(session_id), broadcast, Some(caller))
            .await;
        self.dispatcher.send_to_connection(caller, confirm).await;
    }

    async fn session(&self, session_id: SessionId) -> Result<Session> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Session {} not found", session_id)))
    }

    /// Annotations are frozen once the session has ended or expired
    async fn open_session(&self, session_id: SessionId) -> Result<Session> {
        let session = self.session(session_id).await?;
        if !session.is_open() {
            return Err(HubError::Validation(format!(
                "Session {} is {}",
                session_id,
                session.effective_status().as_str()
            )));
        }
        Ok(session)
    }

    async fn owned(&self, annotation_id: AnnotationId, author_id: &str) -> Result<Annotation> {
        let annotation = self
            .store
            .get_annotation(annotation_id)
            .await?
            .ok_or_else(|| annotation_not_found(annotation_id))?;
        if annotation.created_by != author_id {
            return Err(HubError::Unauthorized(format!(
                "Annotation {} belongs to another author",
                annotation_id
            )));
        }
        Ok(annotation)
    }
}

fn require_author(author_id: &str) -> Result<()> {
    if author_id.trim().is_empty() {
        return Err(HubError::Validation("Author id is required".into()));
    }
    Ok(())
}

fn require_payload(payload: &Value) -> Result<()> {
    if payload.is_null() {
        return Err(HubError::Validation("Annotation payload is required".into()));
    }
    Ok(())
}

fn annotation_not_found(annotation_id: AnnotationId) -> HubError {
    HubError::NotFound(format!("Annotation {} not found", annotation_id))
}
