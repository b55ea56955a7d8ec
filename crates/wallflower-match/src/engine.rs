use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use wallflower_db::Database;
use wallflower_types::error::CoreError;
use wallflower_types::models::{Conversation, CrushEdge, MatchId};

use crate::conversations::ConversationStore;
use crate::detector;
use crate::ledger::{CrushLedger, LedgerConfig, PreviousTarget};

/// A reciprocal pair completed by a crush mutation.
pub struct NewMatch {
    pub id: MatchId,
    pub conversation: Conversation,
    /// False when the pair re-formed and its old conversation was reused.
    pub conversation_created: bool,
}

/// A previously reciprocal pair dissolved by a crush mutation.
pub struct BrokenMatch {
    pub other_member_id: Uuid,
    pub conversation_id: Option<Uuid>,
}

pub struct CrushSetOutcome {
    pub edge: CrushEdge,
    pub target_admirers: i64,
    pub previous: Option<PreviousTarget>,
    pub new_match: Option<NewMatch>,
    pub broken_match: Option<BrokenMatch>,
    pub unchanged: bool,
}

pub struct CrushRemoveOutcome {
    pub target_id: Uuid,
    pub target_admirers: i64,
    pub broken_match: Option<BrokenMatch>,
}

/// Ties the crush ledger, match detector and conversation store together.
/// Every mutation runs the detector for the affected pair before returning,
/// so callers never need to poll for match state.
pub struct MatchEngine {
    db: Arc<Database>,
    ledger: CrushLedger,
    conversations: ConversationStore,
}

impl MatchEngine {
    pub fn new(db: Arc<Database>, config: LedgerConfig) -> Self {
        Self {
            ledger: CrushLedger::new(db.clone(), config),
            conversations: ConversationStore::new(db.clone()),
            db,
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn is_wall_member(&self, wall_id: Uuid, member_id: Uuid) -> Result<bool, CoreError> {
        Ok(self
            .db
            .is_wall_member(&wall_id.to_string(), &member_id.to_string())?)
    }

    pub fn admirer_count(&self, wall_id: Uuid, member_id: Uuid) -> Result<i64, CoreError> {
        Ok(self
            .db
            .admirer_count(&wall_id.to_string(), &member_id.to_string())?)
    }

    pub fn check_mutual(&self, wall_id: Uuid, member_id: Uuid) -> Result<Vec<MatchId>, CoreError> {
        detector::check_mutual(&self.db, wall_id, member_id)
    }

    /// Set or replace a crush, then detect what the write changed: a pair
    /// completed with the new target, a pair dissolved with the old one, or
    /// both at once.
    pub fn set_crush(
        &self,
        wall_id: Uuid,
        source_id: Uuid,
        target_id: Uuid,
    ) -> Result<CrushSetOutcome, CoreError> {
        let set = self.ledger.set_crush(wall_id, source_id, target_id)?;

        let broken_match = match &set.previous {
            Some(prev) => self.broken_with(wall_id, source_id, prev.member_id)?,
            None => None,
        };

        let new_match = self
            .check_mutual(wall_id, source_id)?
            .into_iter()
            .find(|pair| pair.involves(target_id))
            .map(|pair| {
                let (conversation, conversation_created) =
                    self.conversations
                        .get_or_create(wall_id, pair.first, pair.second)?;
                Ok::<_, CoreError>(NewMatch {
                    id: pair,
                    conversation,
                    conversation_created,
                })
            })
            .transpose()?;

        if let Some(m) = &new_match {
            if !set.unchanged {
                info!(%wall_id, match_key = %m.id.canonical(), "mutual match formed");
            }
        }

        Ok(CrushSetOutcome {
            edge: set.edge,
            target_admirers: set.target_admirers,
            previous: set.previous,
            new_match,
            broken_match,
            unchanged: set.unchanged,
        })
    }

    /// Remove a crush (subject to the withdrawal lock) and report whether
    /// the removal dissolved a match.
    pub fn remove_crush(
        &self,
        wall_id: Uuid,
        source_id: Uuid,
    ) -> Result<CrushRemoveOutcome, CoreError> {
        let removed = self.ledger.remove_crush(wall_id, source_id)?;
        let broken_match = self.broken_with(wall_id, source_id, removed.target_id)?;

        if broken_match.is_some() {
            info!(%wall_id, %source_id, "match dissolved by crush removal");
        }

        Ok(CrushRemoveOutcome {
            target_id: removed.target_id,
            target_admirers: removed.target_admirers,
            broken_match,
        })
    }

    /// After source's edge to `former_target` went away, the pair had been
    /// a match iff the former target's own edge still points back.
    fn broken_with(
        &self,
        wall_id: Uuid,
        source_id: Uuid,
        former_target: Uuid,
    ) -> Result<Option<BrokenMatch>, CoreError> {
        let back = self
            .db
            .get_crush(&wall_id.to_string(), &former_target.to_string())?;

        let was_mutual = back
            .map(|edge| edge.target_id == source_id.to_string())
            .unwrap_or(false);
        if !was_mutual {
            return Ok(None);
        }

        let conversation_id = self
            .conversations
            .for_pair(wall_id, source_id, former_target)?
            .map(|c| c.id);

        Ok(Some(BrokenMatch {
            other_member_id: former_target,
            conversation_id,
        }))
    }
}
