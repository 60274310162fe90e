//! Annotation engine integration tests

mod helpers;

use helpers::test_hub::HOST_TOKEN;
use helpers::{drain, TestHub};
use noor_common::events::{ConfirmStatus, ErrorCode};
use noor_common::HubEvent;
use noor_hub::store::Store;
use noor_hub::HubError;
use serde_json::json;

#[tokio::test]
async fn test_create_broadcasts_to_others_and_confirms_sender() {
    let t = TestHub::new().await;
    let session = t.session().await;
    let (u3, mut rx3) = t.participant(session.session_id).await;
    let (_u4, mut rx4) = t.participant(session.session_id).await;
    drain(&mut rx3);

    let payload = json!({"tool": "highlighter", "points": [[1, 2], [3, 4]]});
    let annotation = t
        .hub
        .create_annotation(&u3, session.session_id, "U3", payload.clone())
        .await
        .unwrap();

    assert_eq!(
        drain(&mut rx3),
        vec![HubEvent::AnnotationConfirmed {
            annotation_id: annotation.annotation_id,
            status: ConfirmStatus::Created,
        }]
    );
    match drain(&mut rx4).as_slice() {
        [HubEvent::AnnotationCreated { annotation: seen }] => {
            assert_eq!(seen.payload, payload);
            assert_eq!(seen.created_by, "U3");
        }
        other => panic!("unexpected events {:?}", other),
    }
}

#[tokio::test]
async fn test_delete_by_other_author_is_rejected() {
    let t = TestHub::new().await;
    let session = t.session().await;
    let (u3, mut rx3) = t.participant(session.session_id).await;
    let (u4, mut rx4) = t.participant(session.session_id).await;
    drain(&mut rx3);

    let annotation = t
        .hub
        .create_annotation(&u3, session.session_id, "U3", json!({"shape": "circle"}))
        .await
        .unwrap();
    drain(&mut rx3);
    drain(&mut rx4);

    let result = t.hub.delete_annotation(&u4, annotation.annotation_id, "U4").await;
    assert!(matches!(result, Err(HubError::Unauthorized(_))));

    assert!(matches!(
        drain(&mut rx4).as_slice(),
        [HubEvent::AnnotationError { code: ErrorCode::Unauthorized, .. }]
    ));
    assert!(drain(&mut rx3).is_empty());
    assert!(t.store.get_annotation(annotation.annotation_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_update_and_delete_by_author() {
    let t = TestHub::new().await;
    let session = t.session().await;
    let (u3, mut rx3) = t.participant(session.session_id).await;
    let (_u4, mut rx4) = t.participant(session.session_id).await;
    drain(&mut rx3);

    let annotation = t
        .hub
        .create_annotation(&u3, session.session_id, "U3", json!({"color": "red"}))
        .await
        .unwrap();
    drain(&mut rx3);
    drain(&mut rx4);

    let updated = t
        .hub
        .update_annotation(&u3, annotation.annotation_id, "U3", json!({"color": "blue"}))
        .await
        .unwrap();
    assert_eq!(updated.payload, json!({"color": "blue"}));
    assert!(updated.updated_at.is_some());

    assert!(matches!(
        drain(&mut rx3).as_slice(),
        [HubEvent::AnnotationConfirmed { status: ConfirmStatus::Updated, .. }]
    ));
    assert!(matches!(
        drain(&mut rx4).as_slice(),
        [HubEvent::AnnotationUpdated { updated_by, .. }] if updated_by == "U3"
    ));

    t.hub
        .delete_annotation(&u3, annotation.annotation_id, "U3")
        .await
        .unwrap();
    assert!(matches!(
        drain(&mut rx3).as_slice(),
        [HubEvent::AnnotationConfirmed { status: ConfirmStatus::Deleted, .. }]
    ));
    assert!(matches!(drain(&mut rx4).as_slice(), [HubEvent::AnnotationDeleted { .. }]));

    assert!(matches!(
        t.hub.delete_annotation(&u3, annotation.annotation_id, "U3").await,
        Err(HubError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_update_by_other_author_is_rejected() {
    let t = TestHub::new().await;
    let session = t.session().await;
    let (u3, _rx3) = t.participant(session.session_id).await;
    let (u4, _rx4) = t.participant(session.session_id).await;

    let annotation = t
        .hub
        .create_annotation(&u3, session.session_id, "U3", json!({"n": 1}))
        .await
        .unwrap();

    assert!(matches!(
        t.hub
            .update_annotation(&u4, annotation.annotation_id, "U4", json!({"n": 2}))
            .await,
        Err(HubError::Unauthorized(_))
    ));
    let stored = t.store.get_annotation(annotation.annotation_id).await.unwrap().unwrap();
    assert_eq!(stored.payload, json!({"n": 1}));
}

#[tokio::test]
async fn test_clear_mine_only_touches_own_records() {
    let t = TestHub::new().await;
    let session = t.session().await;
    let (u3, mut rx3) = t.participant(session.session_id).await;
    let (u4, mut rx4) = t.participant(session.session_id).await;

    for n in 0..3 {
        t.hub
            .create_annotation(&u3, session.session_id, "U3", json!({"n": n}))
            .await
            .unwrap();
    }
    t.hub
        .create_annotation(&u4, session.session_id, "U4", json!({"n": 9}))
        .await
        .unwrap();
    drain(&mut rx3);
    drain(&mut rx4);

    assert_eq!(t.hub.clear_my_annotations(&u3, session.session_id, "U3").await.unwrap(), 3);
    assert_eq!(
        drain(&mut rx3),
        vec![HubEvent::AnnotationsClearConfirmed {
            session_id: session.session_id,
            removed: 3
        }]
    );
    assert!(matches!(
        drain(&mut rx4).as_slice(),
        [HubEvent::AnnotationsCleared { removed: 3, cleared_by, .. }] if cleared_by == "U3"
    ));

    let remaining = t.store.list_annotations(session.session_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].created_by, "U4");

    // Nothing left to clear: caller is confirmed, others hear nothing
    assert_eq!(t.hub.clear_my_annotations(&u3, session.session_id, "U3").await.unwrap(), 0);
    assert_eq!(drain(&mut rx3).len(), 1);
    assert!(drain(&mut rx4).is_empty());
}

#[tokio::test]
async fn test_load_annotations_snapshot() {
    let t = TestHub::new().await;
    let session = t.session().await;
    let (u3, _rx3) = t.participant(session.session_id).await;
    let (late, mut late_rx) = t.connect().await;

    let first = t
        .hub
        .create_annotation(&u3, session.session_id, "U3", json!({"n": 1}))
        .await
        .unwrap();
    let second = t
        .hub
        .create_annotation(&u3, session.session_id, "U3", json!({"n": 2}))
        .await
        .unwrap();

    let annotations = t.hub.load_annotations(&late, session.session_id).await.unwrap();
    let ids: Vec<_> = annotations.iter().map(|a| a.annotation_id).collect();
    assert_eq!(ids, vec![first.annotation_id, second.annotation_id]);
    assert!(matches!(
        drain(&mut late_rx).as_slice(),
        [HubEvent::LoadAnnotations { annotations, .. }] if annotations.len() == 2
    ));
}

#[tokio::test]
async fn test_invalid_annotation_requests() {
    let t = TestHub::new().await;
    let session = t.session().await;
    let (u3, mut rx3) = t.participant(session.session_id).await;

    assert!(matches!(
        t.hub
            .create_annotation(&u3, session.session_id, "U3", serde_json::Value::Null)
            .await,
        Err(HubError::Validation(_))
    ));
    assert!(matches!(
        t.hub.create_annotation(&u3, 999, "U3", json!({})).await,
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(
        t.hub.update_annotation(&u3, 999, "U3", json!({})).await,
        Err(HubError::NotFound(_))
    ));

    let events = drain(&mut rx3);
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| matches!(e, HubEvent::AnnotationError { .. })));
}

#[tokio::test]
async fn test_session_delete_cascades_annotations() {
    let t = TestHub::new().await;
    let session = t.session().await;
    let (u3, _rx3) = t.participant(session.session_id).await;
    let annotation = t
        .hub
        .create_annotation(&u3, session.session_id, "U3", json!({"n": 1}))
        .await
        .unwrap();

    t.hub.delete_session(session.session_id).await.unwrap();
    assert!(t.store.get_annotation(annotation.annotation_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_annotations_frozen_after_session_ends() {
    let t = TestHub::new().await;
    let session = t.session().await;
    let (u3, mut rx3) = t.participant(session.session_id).await;
    let (u4, mut rx4) = t.participant(session.session_id).await;
    let annotation = t
        .hub
        .create_annotation(&u3, session.session_id, "U3", json!({"n": 1}))
        .await
        .unwrap();

    t.hub
        .end_session(&u4, session.session_id, HOST_TOKEN, None)
        .await
        .unwrap();
    drain(&mut rx3);
    drain(&mut rx4);

    assert!(matches!(
        t.hub
            .update_annotation(&u3, annotation.annotation_id, "U3", json!({"n": 2}))
            .await,
        Err(HubError::Validation(_))
    ));
    assert!(matches!(
        t.hub.delete_annotation(&u3, annotation.annotation_id, "U3").await,
        Err(HubError::Validation(_))
    ));
    assert!(matches!(
        t.hub.clear_my_annotations(&u3, session.session_id, "U3").await,
        Err(HubError::Validation(_))
    ));

    assert!(drain(&mut rx4).is_empty());
    let kept = t.store.get_annotation(annotation.annotation_id).await.unwrap().unwrap();
    assert_eq!(kept.payload, json!({"n": 1}));
}
