use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

/// Events sent over the WebSocket gateway.
/// Wire shape is `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms the connection is registered.
    Ready { member_id: Uuid, wall_id: Uuid },

    /// A chat message was persisted to a conversation.
    ChatMessage { message: ChatMessage },

    /// A participant is typing. Never persisted; may be dropped under load.
    TypingIndicator {
        conversation_id: Uuid,
        member_id: Uuid,
    },

    /// The receiving member's admirer count changed. The source of the
    /// change is never included.
    CrushUpdate { wall_id: Uuid, admirer_count: i64 },

    /// Two members now have crushes on each other.
    MutualMatch {
        wall_id: Uuid,
        match_key: String,
        conversation_id: Uuid,
        other_member_id: Uuid,
    },

    /// A system message was appended to a conversation (status changes etc).
    SystemMessage { message: ChatMessage },

    /// A match was broken by a crush removal or retarget. Transient chat
    /// state should be cleared; durable history remains fetchable.
    ConversationClosed {
        wall_id: Uuid,
        conversation_id: Uuid,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Send a chat message to a conversation the member participates in.
    SendChatMessage { conversation_id: Uuid, body: String },

    /// Indicate typing in a conversation.
    Typing { conversation_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_uses_type_and_payload() {
        let event = GatewayEvent::CrushUpdate {
            wall_id: Uuid::new_v4(),
            admirer_count: 3,
        };

        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "crush_update");
        assert_eq!(json["payload"]["admirer_count"], 3);
    }

    #[test]
    fn command_roundtrip() {
        let cmd = GatewayCommand::Typing {
            conversation_id: Uuid::new_v4(),
        };
        let text = serde_json::to_string(&cmd).unwrap();
        assert!(text.contains("\"typing\""));

        let back: GatewayCommand = serde_json::from_str(&text).unwrap();
        match back {
            GatewayCommand::Typing { .. } => {}
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
