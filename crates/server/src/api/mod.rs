// REST surface of the messaging subsystem.
//
// The rest of the marketplace (listings, payments, moderation) lives in
// its own services; only the chat endpoints are served here. Every
// route requires a bearer token. Persistence failure on send is the
// only fatal error surfaced to the sender — fanout and everything
// downstream is best-effort.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use roomline_common::types::{validate_body, Message};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::auth::jwt::AccessTokenService;
use crate::auth::middleware::{require_bearer_auth, AuthenticatedUser};
use crate::conversations::conversations_for;
use crate::error::{ApiError, ErrorCode};
use crate::fanout::FanoutDispatcher;
use crate::registry::ConnectionRegistry;
use crate::store::{MarkReadOutcome, MessageStore, UserDirectory};

#[derive(Clone)]
pub struct ApiState {
    pub store: MessageStore,
    pub directory: UserDirectory,
    pub registry: Arc<ConnectionRegistry>,
    pub fanout: Arc<FanoutDispatcher>,
}

pub fn router(token_service: Arc<AccessTokenService>, state: ApiState) -> Router {
    Router::new()
        .route("/v1/messages", post(create_message).get(get_messages))
        .route("/v1/messages/{id}/read", post(mark_message_read))
        .route("/v1/messages/read-all", post(mark_all_messages_read))
        .route("/v1/conversations", get(get_conversations))
        .layer(middleware::from_fn_with_state(token_service, require_bearer_auth))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMessageRequest {
    receiver_id: Uuid,
    body: String,
}

async fn create_message(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<ApiState>,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_body(&payload.body)
        .map_err(|error| ApiError::new(ErrorCode::ValidationFailed, error.to_string()))?;
    if payload.receiver_id == user.user_id {
        return Err(ApiError::new(ErrorCode::ValidationFailed, "cannot message yourself"));
    }
    if state.directory.profile(payload.receiver_id).await.map_err(internal)?.is_none() {
        return Err(ApiError::new(ErrorCode::NotFound, "receiver not found"));
    }

    let message = Message {
        id: Uuid::new_v4(),
        sender_id: user.user_id,
        receiver_id: payload.receiver_id,
        body: payload.body,
        is_read: false,
        created_at: Utc::now(),
    };

    // The write is the contract; fanout after it can only drop events.
    state.store.insert(&message).await.map_err(internal)?;
    let report = state.fanout.dispatch(&message).await;
    debug!(
        message_id = %message.id,
        room = report.room,
        direct = report.direct,
        conversation = report.conversation,
        "message dispatched"
    );

    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    counterpart_id: Uuid,
}

/// Fetch the two-way history with one counterpart. Side effect: every
/// unread message from that counterpart is marked read, and a read
/// receipt goes out to their live connections.
async fn get_messages(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let updated = state
        .store
        .mark_all_read(user.user_id, query.counterpart_id)
        .await
        .map_err(internal)?;
    if updated > 0 {
        state.fanout.dispatch_read_receipt(query.counterpart_id, user.user_id, updated).await;
    }

    let history =
        state.store.conversation(user.user_id, query.counterpart_id).await.map_err(internal)?;
    Ok(Json(history))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadResponse {
    updated: bool,
}

async fn mark_message_read(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<ApiState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    match state.store.mark_read(message_id, user.user_id).await.map_err(internal)? {
        MarkReadOutcome::Updated => Ok(Json(MarkReadResponse { updated: true })),
        MarkReadOutcome::NotFound => Err(ApiError::from_code(ErrorCode::NotFound)),
        MarkReadOutcome::NotReceiver => Err(ApiError::from_code(ErrorCode::ReadNotAllowed)),
        MarkReadOutcome::AlreadyRead => Err(ApiError::from_code(ErrorCode::AlreadyRead)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkAllReadRequest {
    sender_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkAllReadResponse {
    updated_count: u64,
}

async fn mark_all_messages_read(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<ApiState>,
    Json(payload): Json<MarkAllReadRequest>,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated =
        state.store.mark_all_read(user.user_id, payload.sender_id).await.map_err(internal)?;
    if updated > 0 {
        state.fanout.dispatch_read_receipt(payload.sender_id, user.user_id, updated).await;
    }
    Ok(Json(MarkAllReadResponse { updated_count: updated }))
}

async fn get_conversations(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let summaries =
        conversations_for(user.user_id, &state.store, &state.directory, &state.registry)
            .await
            .map_err(internal)?;
    Ok(Json(summaries))
}

fn internal(error: anyhow::Error) -> ApiError {
    error!(error = ?error, "chat api request failed");
    ApiError::from_code(ErrorCode::InternalError)
}
