use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use wallflower_types::api::{AdmirersResponse, MatchSummary, SetCrushRequest, SetCrushResponse};
use wallflower_types::error::CoreError;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Claims;

/// Fallback path for setting a crush. Persists the edge, reruns match
/// detection, then notifies live counterparties — so a match formed here
/// still reaches a member who is connected over the push channel.
pub async fn set_crush(
    State(state): State<AppState>,
    Path(wall_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetCrushRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let source_id = claims.sub;
    let outcome =
        tokio::task::spawn_blocking(move || engine.set_crush(wall_id, source_id, req.target_id))
            .await
            .map_err(ApiError::join)??;

    state.router.publish_crush_set(claims.sub, &outcome).await;

    let matched = outcome.new_match.as_ref().map(|m| MatchSummary {
        match_key: m.id.canonical(),
        conversation_id: m.conversation.id,
        other_member_id: m.id.other(claims.sub),
    });

    Ok(Json(SetCrushResponse {
        set_at: outcome.edge.set_at,
        matched,
    }))
}

pub async fn remove_crush(
    State(state): State<AppState>,
    Path(wall_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let source_id = claims.sub;
    let outcome = tokio::task::spawn_blocking(move || engine.remove_crush(wall_id, source_id))
        .await
        .map_err(ApiError::join)??;

    state
        .router
        .publish_crush_removed(wall_id, claims.sub, &outcome)
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// How many members currently target the caller. Identities are never
/// included.
pub async fn admirers(
    State(state): State<AppState>,
    Path(wall_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let member_id = claims.sub;
    let count = tokio::task::spawn_blocking(move || {
        if !engine.is_wall_member(wall_id, member_id)? {
            return Err(CoreError::NotAMember(member_id));
        }
        engine.admirer_count(wall_id, member_id)
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(AdmirersResponse { count }))
}
