//! Server-Sent Events stream
//!
//! One stream per hub connection. The connection is registered when the
//! stream opens and unregistered when axum drops it.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use noor_common::models::ConnectionId;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::server::AppContext;
use crate::hub::Hub;

/// Unregisters the connection when the stream is dropped
struct DisconnectGuard {
    hub: Arc<Hub>,
    connection_id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let connection_id = self.connection_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    hub.disconnect(&connection_id).await;
                });
            }
            Err(_) => warn!(%connection_id, "No runtime to unregister dropped connection"),
        }
    }
}

/// GET /api/v1/hub/connect
pub async fn connect(State(ctx): State<AppContext>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (connection_id, mut rx) = ctx.hub.connect().await;
    debug!(%connection_id, "SSE client connected");

    let guard = DisconnectGuard {
        hub: Arc::clone(&ctx.hub),
        connection_id,
    };
    let keep_alive = Duration::from_secs(ctx.hub.settings().keep_alive_secs);

    let stream = async_stream::stream! {
        let guard = guard;
        while let Some(event) = rx.recv().await {
            match Event::default().event(event.event_type()).json_data(event.as_ref()) {
                Ok(frame) => yield Ok::<Event, Infallible>(frame),
                Err(e) => warn!(connection_id = %guard.connection_id, "Failed to serialize event: {}", e),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive).text("keep-alive"))
}
