//! Row-to-model conversions. Rows carry strings straight out of SQLite;
//! anything that fails to parse here is corrupt storage, not caller error.

use anyhow::{Context, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use wallflower_db::models::{ConversationRow, CrushRow, MessageRow, StatusRow};
use wallflower_types::error::CoreError;
use wallflower_types::models::{
    ChatMessage, Conversation, CrushEdge, RelationshipStage, RelationshipStatus,
};

/// Fixed-width UTC timestamp so stored strings sort lexicographically.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_uuid(s: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(s)
        .map_err(|e| CoreError::Storage(anyhow!("corrupt uuid '{}': {}", s, e)))
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::Storage(anyhow!("corrupt timestamp '{}': {}", s, e)))
}

pub fn edge_from_row(row: &CrushRow) -> Result<CrushEdge, CoreError> {
    Ok(CrushEdge {
        wall_id: parse_uuid(&row.wall_id)?,
        source_id: parse_uuid(&row.source_id)?,
        target_id: parse_uuid(&row.target_id)?,
        set_at: parse_ts(&row.set_at)?,
    })
}

pub fn conversation_from_row(row: &ConversationRow) -> Result<Conversation, CoreError> {
    Ok(Conversation {
        id: parse_uuid(&row.id)?,
        wall_id: parse_uuid(&row.wall_id)?,
        member_a: parse_uuid(&row.member_a)?,
        member_b: parse_uuid(&row.member_b)?,
        created_at: parse_ts(&row.created_at)?,
    })
}

pub fn message_from_row(row: &MessageRow) -> Result<ChatMessage, CoreError> {
    Ok(ChatMessage {
        id: parse_uuid(&row.id)?,
        conversation_id: parse_uuid(&row.conversation_id)?,
        sender_id: row.sender_id.as_deref().map(parse_uuid).transpose()?,
        body: row.body.clone(),
        is_system: row.is_system,
        created_at: parse_ts(&row.created_at)?,
        seq: row.seq,
    })
}

pub fn status_from_row(row: &StatusRow) -> Result<RelationshipStatus, CoreError> {
    let stage = RelationshipStage::parse(&row.stage)
        .with_context(|| format!("unknown relationship stage '{}'", row.stage))
        .map_err(CoreError::Storage)?;

    Ok(RelationshipStatus {
        conversation_id: parse_uuid(&row.conversation_id)?,
        stage,
        updated_at: parse_ts(&row.updated_at)?,
    })
}
