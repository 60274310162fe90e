//! HTTP request handlers
//!
//! Each `/api/v1/hub/*` handler resolves the caller from the
//! `X-Connection-Id` header, invokes the hub, and returns the result as
//! JSON. Events produced by the operation arrive on the caller's SSE stream.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use noor_common::groups::SessionId;
use noor_common::models::{
    Annotation, AnnotationId, ConnectionId, NewSession, Question, QuestionId, Role, Session,
    SessionStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiResult;
use super::server::AppContext;
use super::CONNECTION_HEADER;
use crate::error::HubError;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    uptime_secs: u64,
    connections: usize,
    groups: usize,
    events_delivered: u64,
    delivery_failures: u64,
}

/// Public view of a session; tokens are only returned on creation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    session_id: SessionId,
    title: Option<String>,
    status: SessionStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            status: session.effective_status(),
            session_id: session.session_id,
            title: session.title,
            created_at: session.created_at,
            started_at: session.started_at,
            ended_at: session.ended_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedResponse {
    changed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    question_id: QuestionId,
    vote_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedResponse {
    session_id: SessionId,
    removed: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    session_id: SessionId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    session_id: SessionId,
    #[serde(default)]
    role: Role,
    #[serde(default)]
    host_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSessionRequest {
    session_id: SessionId,
    host_token: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareAssetRequest {
    session_id: SessionId,
    host_token: String,
    asset: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuestionRequest {
    session_id: SessionId,
    author_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    question_id: QuestionId,
    voter_id: String,
    value: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    question_id: QuestionId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuestionRequest {
    question_id: QuestionId,
    requester_id: String,
    #[serde(default)]
    host_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnotationRequest {
    session_id: SessionId,
    author_id: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnnotationRequest {
    annotation_id: AnnotationId,
    author_id: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAnnotationRequest {
    annotation_id: AnnotationId,
    author_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearAnnotationsRequest {
    session_id: SessionId,
    author_id: String,
}

/// Resolve the calling connection from the request headers
async fn caller(ctx: &AppContext, headers: &HeaderMap) -> ApiResult<ConnectionId> {
    let value = headers
        .get(CONNECTION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HubError::Validation("X-Connection-Id header is required".into()))?;

    let connection_id = ConnectionId::from(value);
    if !ctx.hub.registry().is_registered(&connection_id).await {
        return Err(HubError::NotFound(format!("Connection {} is not registered", connection_id)).into());
    }
    Ok(connection_id)
}

// ============================================================================
// Health and session records
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let stats = ctx.hub.stats().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "noor-hub".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        connections: stats.connections,
        groups: stats.groups,
        events_delivered: stats.events_delivered,
        delivery_failures: stats.delivery_failures,
    })
}

/// POST /api/v1/sessions
pub async fn create_session(
    State(ctx): State<AppContext>,
    Json(req): Json<NewSession>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let session = ctx.hub.create_session(req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/sessions/:session_id
pub async fn get_session(
    State(ctx): State<AppContext>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<SessionSummary>> {
    let session = ctx.hub.get_session(session_id).await?;
    Ok(Json(session.into()))
}

/// DELETE /api/v1/sessions/:session_id
pub async fn delete_session(
    State(ctx): State<AppContext>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<StatusCode> {
    ctx.hub.delete_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Session groups and lifecycle
// ============================================================================

pub async fn join_session_group(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<JoinSessionRequest>,
) -> ApiResult<Json<ChangedResponse>> {
    let caller = caller(&ctx, &headers).await?;
    let changed = ctx
        .hub
        .join_session_group(&caller, req.session_id, req.role, req.host_token.as_deref())
        .await?;
    Ok(Json(ChangedResponse { changed }))
}

pub async fn leave_session_group(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> ApiResult<Json<ChangedResponse>> {
    let caller = caller(&ctx, &headers).await?;
    let changed = ctx.hub.leave_session_group(&caller, req.session_id).await;
    Ok(Json(ChangedResponse { changed }))
}

pub async fn join_qa_session(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> ApiResult<Json<ChangedResponse>> {
    let caller = caller(&ctx, &headers).await?;
    let changed = ctx.hub.join_qa_session(&caller, req.session_id).await?;
    Ok(Json(ChangedResponse { changed }))
}

pub async fn leave_qa_session(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> ApiResult<Json<ChangedResponse>> {
    let caller = caller(&ctx, &headers).await?;
    let changed = ctx.hub.leave_qa_session(&caller, req.session_id).await;
    Ok(Json(ChangedResponse { changed }))
}

pub async fn start_session(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<HostSessionRequest>,
) -> ApiResult<Json<Session>> {
    let caller = caller(&ctx, &headers).await?;
    Ok(Json(ctx.hub.start_session(&caller, req.session_id, &req.host_token).await?))
}

pub async fn end_session(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<HostSessionRequest>,
) -> ApiResult<Json<Session>> {
    let caller = caller(&ctx, &headers).await?;
    let session = ctx
        .hub
        .end_session(&caller, req.session_id, &req.host_token, req.reason)
        .await?;
    Ok(Json(session))
}

pub async fn share_asset(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<ShareAssetRequest>,
) -> ApiResult<StatusCode> {
    let caller = caller(&ctx, &headers).await?;
    ctx.hub
        .share_asset(&caller, req.session_id, &req.host_token, req.asset)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn ping(State(ctx): State<AppContext>, headers: HeaderMap) -> ApiResult<StatusCode> {
    let caller = caller(&ctx, &headers).await?;
    ctx.hub.ping(&caller).await;
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Q&A
// ============================================================================

pub async fn submit_question(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SubmitQuestionRequest>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let caller = caller(&ctx, &headers).await?;
    let question = ctx
        .hub
        .submit_question(&caller, req.session_id, &req.author_id, &req.text)
        .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn vote_on_question(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    let caller = caller(&ctx, &headers).await?;
    let vote_count = ctx
        .hub
        .vote_on_question(&caller, req.question_id, &req.voter_id, req.value)
        .await?;
    Ok(Json(VoteResponse {
        question_id: req.question_id,
        vote_count,
    }))
}

pub async fn answer_question(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<QuestionRequest>,
) -> ApiResult<Json<ChangedResponse>> {
    let caller = caller(&ctx, &headers).await?;
    let changed = ctx.hub.answer_question(&caller, req.question_id).await?;
    Ok(Json(ChangedResponse { changed }))
}

pub async fn delete_question(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<DeleteQuestionRequest>,
) -> ApiResult<Json<ChangedResponse>> {
    let caller = caller(&ctx, &headers).await?;
    let changed = ctx
        .hub
        .delete_question(&caller, req.question_id, &req.requester_id, req.host_token.as_deref())
        .await?;
    Ok(Json(ChangedResponse { changed }))
}

pub async fn load_questions(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> ApiResult<Json<Vec<Question>>> {
    let caller = caller(&ctx, &headers).await?;
    Ok(Json(ctx.hub.load_questions(&caller, req.session_id).await?))
}

// ============================================================================
// Annotations
// ============================================================================

pub async fn create_annotation(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<CreateAnnotationRequest>,
) -> ApiResult<(StatusCode, Json<Annotation>)> {
    let caller = caller(&ctx, &headers).await?;
    let annotation = ctx
        .hub
        .create_annotation(&caller, req.session_id, &req.author_id, req.payload)
        .await?;
    Ok((StatusCode::CREATED, Json(annotation)))
}

pub async fn update_annotation(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<UpdateAnnotationRequest>,
) -> ApiResult<Json<Annotation>> {
    let caller = caller(&ctx, &headers).await?;
    let annotation = ctx
        .hub
        .update_annotation(&caller, req.annotation_id, &req.author_id, req.payload)
        .await?;
    Ok(Json(annotation))
}

pub async fn delete_annotation(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<DeleteAnnotationRequest>,
) -> ApiResult<StatusCode> {
    let caller = caller(&ctx, &headers).await?;
    ctx.hub
        .delete_annotation(&caller, req.annotation_id, &req.author_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_my_annotations(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<ClearAnnotationsRequest>,
) -> ApiResult<Json<ClearedResponse>> {
    let caller = caller(&ctx, &headers).await?;
    let removed = ctx
        .hub
        .clear_my_annotations(&caller, req.session_id, &req.author_id)
        .await?;
    Ok(Json(ClearedResponse {
        session_id: req.session_id,
        removed,
    }))
}

pub async fn load_annotations(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> ApiResult<Json<Vec<Annotation>>> {
    let caller = caller(&ctx, &headers).await?;
    Ok(Json(ctx.hub.load_annotations(&caller, req.session_id).await?))
}
