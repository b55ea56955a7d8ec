use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wall {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A directed, single-valued interest edge within a wall.
/// At most one edge exists per (wall, source); retargeting resets `set_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrushEdge {
    pub wall_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub set_at: DateTime<Utc>,
}

/// Canonical identifier for a reciprocal pair of crush edges.
/// Both directions of the pair compute the same identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId {
    pub wall_id: Uuid,
    pub first: Uuid,
    pub second: Uuid,
}

impl MatchId {
    pub fn new(wall_id: Uuid, a: Uuid, b: Uuid) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            wall_id,
            first,
            second,
        }
    }

    pub fn canonical(&self) -> String {
        format!("match-{}-{}", self.first, self.second)
    }

    pub fn involves(&self, member_id: Uuid) -> bool {
        self.first == member_id || self.second == member_id
    }

    /// The counterpart of `member_id` in this pair.
    pub fn other(&self, member_id: Uuid) -> Uuid {
        if self.first == member_id {
            self.second
        } else {
            self.first
        }
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// A private chat thread, created once a mutual match is detected.
/// `member_a` < `member_b` so both participants key the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub wall_id: Uuid,
    pub member_a: Uuid,
    pub member_b: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn match_id(&self) -> MatchId {
        MatchId::new(self.wall_id, self.member_a, self.member_b)
    }

    pub fn has_participant(&self, member_id: Uuid) -> bool {
        self.member_a == member_id || self.member_b == member_id
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.member_a, self.member_b]
    }
}

/// An immutable chat message. `sender_id` is `None` for system messages.
/// `seq` is the store-assigned position used to break creation-time ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub body: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub seq: i64,
}

/// Relationship stages, in timeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStage {
    JustMatched,
    Talking,
    Dating,
    Official,
    Complicated,
}

impl RelationshipStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JustMatched => "just matched",
            Self::Talking => "talking",
            Self::Dating => "dating",
            Self::Official => "official",
            Self::Complicated => "complicated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "just matched" => Some(Self::JustMatched),
            "talking" => Some(Self::Talking),
            "dating" => Some(Self::Dating),
            "official" => Some(Self::Official),
            "complicated" => Some(Self::Complicated),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutable status record per conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipStatus {
    pub conversation_id: Uuid,
    pub stage: RelationshipStage,
    pub updated_at: DateTime<Utc>,
}

/// An anonymous confession. Read models never carry the author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confession {
    pub id: Uuid,
    pub wall_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_id_is_order_independent() {
        let wall = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let ab = MatchId::new(wall, a, b);
        let ba = MatchId::new(wall, b, a);

        assert_eq!(ab, ba);
        assert_eq!(ab.canonical(), ba.canonical());
    }

    #[test]
    fn match_id_canonical_orders_min_first() {
        let wall = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let id = MatchId::new(wall, a, b);
        assert_eq!(id.canonical(), format!("match-{}-{}", lo, hi));
        assert_eq!(id.other(lo), hi);
        assert_eq!(id.other(hi), lo);
    }

    #[test]
    fn relationship_stage_roundtrips_labels() {
        for stage in [
            RelationshipStage::JustMatched,
            RelationshipStage::Talking,
            RelationshipStage::Dating,
            RelationshipStage::Official,
            RelationshipStage::Complicated,
        ] {
            assert_eq!(RelationshipStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(RelationshipStage::parse("engaged"), None);
    }

    #[test]
    fn relationship_stages_are_ordered() {
        assert!(RelationshipStage::JustMatched < RelationshipStage::Talking);
        assert!(RelationshipStage::Talking < RelationshipStage::Dating);
        assert!(RelationshipStage::Dating < RelationshipStage::Official);
    }
}
