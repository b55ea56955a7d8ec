use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use wallflower_db::Database;
use wallflower_types::error::CoreError;
use wallflower_types::models::{
    ChatMessage, Conversation, MatchId, RelationshipStage, RelationshipStatus,
};

use crate::convert;

/// Seed system message for a freshly created conversation.
pub const MATCH_GREETING: &str = "You both have crushes on each other!";

/// Who is appending a message.
#[derive(Debug, Clone, Copy)]
pub enum Sender {
    Member(Uuid),
    System,
}

/// Durable store of conversations, their messages and relationship status.
pub struct ConversationStore {
    db: Arc<Database>,
}

impl ConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get(&self, conversation_id: Uuid) -> Result<Conversation, CoreError> {
        let row = self
            .db
            .get_conversation(&conversation_id.to_string())?
            .ok_or(CoreError::NotFound)?;
        convert::conversation_from_row(&row)
    }

    pub fn for_pair(
        &self,
        wall_id: Uuid,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, CoreError> {
        let row = self
            .db
            .conversation_for_pair(&wall_id.to_string(), &a.to_string(), &b.to_string())?;
        row.map(|r| convert::conversation_from_row(&r)).transpose()
    }

    /// Create the conversation for a matched pair, or return the existing
    /// one. The winning call of a creation race seeds exactly one greeting
    /// system message and the default status record.
    pub fn get_or_create(
        &self,
        wall_id: Uuid,
        a: Uuid,
        b: Uuid,
    ) -> Result<(Conversation, bool), CoreError> {
        let now = convert::fmt_ts(Utc::now());
        let (row, created) = self.db.create_conversation_if_absent(
            &Uuid::new_v4().to_string(),
            &wall_id.to_string(),
            &a.to_string(),
            &b.to_string(),
            &now,
            &Uuid::new_v4().to_string(),
            MATCH_GREETING,
            RelationshipStage::JustMatched.as_str(),
        )?;

        let conversation = convert::conversation_from_row(&row)?;
        if created {
            info!(
                match_key = %MatchId::new(wall_id, a, b).canonical(),
                conversation_id = %conversation.id,
                "conversation created"
            );
        }
        Ok((conversation, created))
    }

    /// Append a message. Member senders must be a participant; system
    /// messages are exempt.
    pub fn append_message(
        &self,
        conversation_id: Uuid,
        sender: Sender,
        body: &str,
    ) -> Result<ChatMessage, CoreError> {
        let conversation = self.get(conversation_id)?;

        let sender_id = match sender {
            Sender::Member(id) => {
                if !conversation.has_participant(id) {
                    return Err(CoreError::NotAParticipant);
                }
                Some(id)
            }
            Sender::System => None,
        };

        let row = self.db.insert_chat_message(
            &Uuid::new_v4().to_string(),
            &conversation_id.to_string(),
            sender_id.map(|id| id.to_string()).as_deref(),
            body,
            matches!(sender, Sender::System),
            &convert::fmt_ts(Utc::now()),
        )?;

        convert::message_from_row(&row)
    }

    /// Messages in persisted order; `after_seq` resumes from a known point.
    pub fn fetch_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
        after_seq: Option<i64>,
    ) -> Result<Vec<ChatMessage>, CoreError> {
        let rows =
            self.db
                .messages_for_conversation(&conversation_id.to_string(), limit, after_seq)?;
        rows.iter().map(convert::message_from_row).collect()
    }

    pub fn status(&self, conversation_id: Uuid) -> Result<RelationshipStatus, CoreError> {
        let row = self
            .db
            .relationship_status(&conversation_id.to_string())?
            .ok_or(CoreError::NotFound)?;
        convert::status_from_row(&row)
    }

    /// Update the relationship stage and append the audit system message.
    pub fn update_status(
        &self,
        conversation_id: Uuid,
        member_id: Uuid,
        stage: RelationshipStage,
    ) -> Result<(RelationshipStatus, ChatMessage), CoreError> {
        let conversation = self.get(conversation_id)?;
        if !conversation.has_participant(member_id) {
            return Err(CoreError::NotAParticipant);
        }

        let (status_row, message_row) = self.db.set_relationship_stage(
            &conversation_id.to_string(),
            stage.as_str(),
            &convert::fmt_ts(Utc::now()),
            &Uuid::new_v4().to_string(),
            &format!("Relationship status changed to {}", stage),
        )?;

        Ok((
            convert::status_from_row(&status_row)?,
            convert::message_from_row(&message_row)?,
        ))
    }
}
