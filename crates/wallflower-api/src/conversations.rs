use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use wallflower_match::Sender;
use wallflower_types::api::{
    ConversationResponse, MessageListResponse, OpenConversationRequest, SendMessageRequest,
    UpdateStatusRequest,
};
use wallflower_types::error::CoreError;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Claims;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: only messages after this store position are returned.
    pub after: Option<i64>,
}

fn default_limit() -> u32 {
    50
}

/// Create-or-get the conversation with a matched counterpart. Requires a
/// standing reciprocal pair; racing calls from both participants converge
/// on one conversation.
pub async fn open_conversation(
    State(state): State<AppState>,
    Path(wall_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let member_id = claims.sub;
    let response = tokio::task::spawn_blocking(move || {
        let matched = engine
            .check_mutual(wall_id, member_id)?
            .into_iter()
            .any(|pair| pair.involves(req.member_id));
        if !matched {
            return Err(CoreError::NotFound);
        }

        let (conversation, _created) =
            engine
                .conversations()
                .get_or_create(wall_id, member_id, req.member_id)?;
        let status = engine.conversations().status(conversation.id)?;
        Ok(ConversationResponse {
            conversation,
            status,
        })
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(response))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let member_id = claims.sub;
    let response = tokio::task::spawn_blocking(move || {
        let conversation = engine.conversations().get(conversation_id)?;
        if !conversation.has_participant(member_id) {
            return Err(CoreError::NotAParticipant);
        }
        let status = engine.conversations().status(conversation_id)?;
        Ok(ConversationResponse {
            conversation,
            status,
        })
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(response))
}

/// Fallback send path. Persists through the same store as the push channel,
/// so the returned message is shaped identically to one delivered live; the
/// client reconciles its optimistic placeholder against it.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .router
        .send_chat(conversation_id, Sender::Member(claims.sub), req.body)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let member_id = claims.sub;
    let limit = query.limit.min(200);
    let after = query.after;

    let messages = tokio::task::spawn_blocking(move || {
        let conversation = engine.conversations().get(conversation_id)?;
        if !conversation.has_participant(member_id) {
            return Err(CoreError::NotAParticipant);
        }
        engine
            .conversations()
            .fetch_messages(conversation_id, limit, after)
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(MessageListResponse { messages }))
}

/// Update the relationship stage; the audit system message is pushed to
/// both participants' live connections.
pub async fn update_status(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let member_id = claims.sub;
    let (conversation, status, audit) = tokio::task::spawn_blocking(move || {
        let conversation = engine.conversations().get(conversation_id)?;
        let (status, audit) =
            engine
                .conversations()
                .update_status(conversation_id, member_id, req.stage)?;
        Ok::<_, CoreError>((conversation, status, audit))
    })
    .await
    .map_err(ApiError::join)??;

    state.router.push_message(&conversation, &audit).await;

    Ok(Json(status))
}
