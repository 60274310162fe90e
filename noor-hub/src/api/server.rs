//! HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::hub::Hub;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub hub: Arc<Hub>,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            started_at: Instant::now(),
        }
    }
}

/// Build the router with every route
pub fn create_router(ctx: AppContext) -> Router {
    use super::handlers as h;

    Router::new()
        .route("/health", get(h::health))

        // Session records
        .route("/api/v1/sessions", post(h::create_session))
        .route("/api/v1/sessions/:session_id", get(h::get_session).delete(h::delete_session))

        // Event stream
        .route("/api/v1/hub/connect", get(super::sse::connect))

        // Session groups and lifecycle
        .route("/api/v1/hub/joinSessionGroup", post(h::join_session_group))
        .route("/api/v1/hub/leaveSessionGroup", post(h::leave_session_group))
        .route("/api/v1/hub/joinQaSession", post(h::join_qa_session))
        .route("/api/v1/hub/leaveQaSession", post(h::leave_qa_session))
        .route("/api/v1/hub/startSession", post(h::start_session))
        .route("/api/v1/hub/endSession", post(h::end_session))
        .route("/api/v1/hub/shareAsset", post(h::share_asset))
        .route("/api/v1/hub/ping", post(h::ping))

        // Q&A
        .route("/api/v1/hub/submitQuestion", post(h::submit_question))
        .route("/api/v1/hub/voteOnQuestion", post(h::vote_on_question))
        .route("/api/v1/hub/answerQuestion", post(h::answer_question))
        .route("/api/v1/hub/deleteQuestion", post(h::delete_question))
        .route("/api/v1/hub/loadQuestions", post(h::load_questions))

        // Annotations
        .route("/api/v1/hub/createAnnotation", post(h::create_annotation))
        .route("/api/v1/hub/updateAnnotation", post(h::update_annotation))
        .route("/api/v1/hub/deleteAnnotation", post(h::delete_annotation))
        .route("/api/v1/hub/clearMyAnnotations", post(h::clear_my_annotations))
        .route("/api/v1/hub/loadAnnotations", post(h::load_annotations))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the hub until `shutdown` resolves
pub async fn run(
    addr: SocketAddr,
    hub: Arc<Hub>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = create_router(AppContext::new(hub));

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
