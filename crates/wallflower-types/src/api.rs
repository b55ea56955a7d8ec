use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, Conversation, RelationshipStage, RelationshipStatus};

// -- JWT Claims --

/// JWT claims shared across wallflower-api (REST middleware) and
/// wallflower-gateway (WebSocket upgrade). Canonical definition lives here
/// in wallflower-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Crushes --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetCrushRequest {
    pub target_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetCrushResponse {
    pub set_at: chrono::DateTime<chrono::Utc>,
    /// Present when the call completed a reciprocal pair.
    pub matched: Option<MatchSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_key: String,
    pub conversation_id: Uuid,
    pub other_member_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdmirersResponse {
    pub count: i64,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenConversationRequest {
    pub member_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
    pub status: RelationshipStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub stage: RelationshipStage,
}

// -- Walls --

#[derive(Debug, Serialize, Deserialize)]
pub struct WallMemberView {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostConfessionRequest {
    pub body: String,
}
