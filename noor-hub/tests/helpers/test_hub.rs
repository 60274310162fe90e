//! Hub fixtures

use noor_common::config::HubSettings;
use noor_common::db::{init_database, init_memory_database};
use noor_common::models::{ConnectionId, NewSession, Session};
use noor_common::HubEvent;
use noor_hub::auth::SessionRoleAuthorizer;
use noor_hub::hub::EventReceiver;
use noor_hub::store::{SqliteStore, Store};
use noor_hub::Hub;
use std::path::Path;
use std::sync::Arc;

pub const HOST_TOKEN: &str = "HOST4242";
pub const USER_TOKEN: &str = "USER4242";

pub struct TestHub {
    pub hub: Arc<Hub>,
    pub store: Arc<dyn Store>,
}

impl TestHub {
    /// Hub over a fresh in-memory database
    pub async fn new() -> Self {
        Self::with_settings(HubSettings::default()).await
    }

    pub async fn with_settings(settings: HubSettings) -> Self {
        let pool = init_memory_database().await.expect("memory database");
        Self::with_store(Arc::new(SqliteStore::new(pool)), settings)
    }

    /// Hub over a database file (multi-connection pool)
    pub async fn file_backed(path: &Path) -> Self {
        let pool = init_database(path).await.expect("file database");
        Self::with_store(Arc::new(SqliteStore::new(pool)), HubSettings::default())
    }

    pub fn with_store(store: Arc<dyn Store>, settings: HubSettings) -> Self {
        let authorizer = Arc::new(SessionRoleAuthorizer::new(Arc::clone(&store)));
        let hub = Arc::new(Hub::new(Arc::clone(&store), authorizer, settings));
        Self { hub, store }
    }

    pub async fn session(&self) -> Session {
        self.session_with_tokens(HOST_TOKEN, USER_TOKEN).await
    }

    pub async fn session_with_tokens(&self, host: &str, user: &str) -> Session {
        self.hub
            .create_session(NewSession {
                host_token: host.to_string(),
                user_token: user.to_string(),
                title: Some("Test session".to_string()),
                expires_at: None,
            })
            .await
            .expect("create session")
    }

    /// Open a connection and discard its `Connected` event
    pub async fn connect(&self) -> (ConnectionId, EventReceiver) {
        let (id, mut rx) = self.hub.connect().await;
        let first = drain(&mut rx);
        assert!(matches!(first.as_slice(), [HubEvent::Connected { .. }]));
        (id, rx)
    }

    /// Connection that has joined the session group and the Q&A group
    pub async fn participant(&self, session_id: i64) -> (ConnectionId, EventReceiver) {
        let (id, mut rx) = self.connect().await;
        self.hub
            .join_session_group(&id, session_id, Default::default(), None)
            .await
            .expect("join session");
        self.hub.join_qa_session(&id, session_id).await.expect("join qa");
        drain(&mut rx);
        (id, rx)
    }
}

/// Everything currently queued for a connection
pub fn drain(rx: &mut EventReceiver) -> Vec<HubEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.as_ref().clone());
    }
    events
}
