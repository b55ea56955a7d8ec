use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use wallflower_types::api::{PostConfessionRequest, WallMemberView};
use wallflower_types::error::CoreError;
use wallflower_types::models::Confession;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Claims;

#[derive(Debug, Deserialize)]
pub struct ConfessionQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(wall_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let member_id = claims.sub;
    let members = tokio::task::spawn_blocking(move || {
        if !engine.is_wall_member(wall_id, member_id)? {
            return Err(CoreError::NotAMember(member_id));
        }

        let rows = engine.db().wall_member_rows(&wall_id.to_string())?;
        rows.into_iter()
            .map(|row| {
                Ok(WallMemberView {
                    id: parse_uuid(&row.id)?,
                    username: row.username,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(members))
}

/// Anonymous confessions, newest first. The author never appears in the
/// response.
pub async fn list_confessions(
    State(state): State<AppState>,
    Path(wall_id): Path<Uuid>,
    Query(query): Query<ConfessionQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let member_id = claims.sub;
    let limit = query.limit.min(200);

    let confessions = tokio::task::spawn_blocking(move || {
        if !engine.is_wall_member(wall_id, member_id)? {
            return Err(CoreError::NotAMember(member_id));
        }

        let rows = engine.db().confessions_for_wall(&wall_id.to_string(), limit)?;
        rows.into_iter()
            .map(|row| {
                Ok(Confession {
                    id: parse_uuid(&row.id)?,
                    wall_id: parse_uuid(&row.wall_id)?,
                    body: row.body,
                    created_at: parse_ts(&row.created_at)?,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(confessions))
}

pub async fn post_confession(
    State(state): State<AppState>,
    Path(wall_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostConfessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let member_id = claims.sub;

    let confession = tokio::task::spawn_blocking(move || {
        if !engine.is_wall_member(wall_id, member_id)? {
            return Err(CoreError::NotAMember(member_id));
        }

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        engine.db().insert_confession(
            &id.to_string(),
            &wall_id.to_string(),
            &member_id.to_string(),
            &req.body,
            &created_at.to_rfc3339(),
        )?;

        Ok::<_, CoreError>(Confession {
            id,
            wall_id,
            body: req.body,
            created_at,
        })
    })
    .await
    .map_err(ApiError::join)??;

    Ok((StatusCode::CREATED, Json(confession)))
}

fn parse_uuid(s: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(s).map_err(|e| CoreError::Storage(anyhow::anyhow!("corrupt uuid '{}': {}", s, e)))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::Storage(anyhow::anyhow!("corrupt timestamp '{}': {}", s, e)))
}
