use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use wallflower_match::{CrushRemoveOutcome, CrushSetOutcome, MatchEngine, Sender};
use wallflower_types::error::CoreError;
use wallflower_types::events::GatewayEvent;
use wallflower_types::models::{ChatMessage, Conversation};

use crate::registry::Registry;

/// Persists what must be persisted and fans events out to the live
/// connections that should see them. Pushes are fire-and-forget: a member
/// with no live connection reconciles from the durable store later.
#[derive(Clone)]
pub struct EventRouter {
    registry: Registry,
    engine: Arc<MatchEngine>,
}

impl EventRouter {
    pub fn new(registry: Registry, engine: Arc<MatchEngine>) -> Self {
        Self { registry, engine }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Persist a chat message, then push it to every participant. The
    /// sender's own connections are skipped for non-system messages.
    pub async fn send_chat(
        &self,
        conversation_id: Uuid,
        sender: Sender,
        body: String,
    ) -> Result<ChatMessage, CoreError> {
        let engine = self.engine.clone();
        let (conversation, message) = tokio::task::spawn_blocking(move || {
            let conversation = engine.conversations().get(conversation_id)?;
            let message = engine
                .conversations()
                .append_message(conversation_id, sender, &body)?;
            Ok::<_, CoreError>((conversation, message))
        })
        .await
        .map_err(|e| CoreError::Storage(anyhow::anyhow!("task join: {}", e)))??;

        self.push_message(&conversation, &message).await;
        Ok(message)
    }

    /// Push an already-persisted message (used by the REST fallback path,
    /// which shares persistence with `send_chat` via the store).
    pub async fn push_message(&self, conversation: &Conversation, message: &ChatMessage) {
        let event = if message.is_system {
            GatewayEvent::SystemMessage {
                message: message.clone(),
            }
        } else {
            GatewayEvent::ChatMessage {
                message: message.clone(),
            }
        };

        for participant in conversation.participants() {
            if !message.is_system && message.sender_id == Some(participant) {
                continue;
            }
            self.registry
                .send_to_member(conversation.wall_id, participant, event.clone())
                .await;
        }
        debug!(conversation_id = %conversation.id, "message routed");
    }

    /// Typing signals are push-only: never persisted, never echoed back,
    /// free to vanish when the member is offline or a queue is full.
    pub async fn typing(&self, conversation_id: Uuid, member_id: Uuid) {
        let engine = self.engine.clone();
        let conversation =
            match tokio::task::spawn_blocking(move || engine.conversations().get(conversation_id))
                .await
            {
                Ok(Ok(conversation)) => conversation,
                Ok(Err(CoreError::NotFound)) => return,
                Ok(Err(e)) => {
                    warn!(%conversation_id, "typing lookup failed: {}", e);
                    return;
                }
                Err(e) => {
                    warn!("task join: {}", e);
                    return;
                }
            };

        if !conversation.has_participant(member_id) {
            return;
        }

        for participant in conversation.participants() {
            if participant == member_id {
                continue;
            }
            self.registry
                .send_to_member(
                    conversation.wall_id,
                    participant,
                    GatewayEvent::TypingIndicator {
                        conversation_id,
                        member_id,
                    },
                )
                .await;
        }
    }

    /// Fan out everything a set-crush write changed: the target's admirer
    /// count (the source is never named), the former target's count on a
    /// retarget, match formation to both members, and teardown when the
    /// retarget dissolved an existing match.
    pub async fn publish_crush_set(&self, source_id: Uuid, outcome: &CrushSetOutcome) {
        let wall_id = outcome.edge.wall_id;

        if !outcome.unchanged {
            self.registry
                .send_to_member(
                    wall_id,
                    outcome.edge.target_id,
                    GatewayEvent::CrushUpdate {
                        wall_id,
                        admirer_count: outcome.target_admirers,
                    },
                )
                .await;

            if let Some(previous) = &outcome.previous {
                self.registry
                    .send_to_member(
                        wall_id,
                        previous.member_id,
                        GatewayEvent::CrushUpdate {
                            wall_id,
                            admirer_count: previous.admirer_count,
                        },
                    )
                    .await;
            }
        }

        if let Some(broken) = &outcome.broken_match {
            self.push_teardown(wall_id, source_id, broken.other_member_id, broken.conversation_id)
                .await;
        }

        if let Some(matched) = &outcome.new_match {
            if !outcome.unchanged {
                for member in [matched.id.first, matched.id.second] {
                    self.registry
                        .send_to_member(
                            wall_id,
                            member,
                            GatewayEvent::MutualMatch {
                                wall_id,
                                match_key: matched.id.canonical(),
                                conversation_id: matched.conversation.id,
                                other_member_id: matched.id.other(member),
                            },
                        )
                        .await;
                }
            }
        }
    }

    pub async fn publish_crush_removed(
        &self,
        wall_id: Uuid,
        source_id: Uuid,
        outcome: &CrushRemoveOutcome,
    ) {
        self.registry
            .send_to_member(
                wall_id,
                outcome.target_id,
                GatewayEvent::CrushUpdate {
                    wall_id,
                    admirer_count: outcome.target_admirers,
                },
            )
            .await;

        if let Some(broken) = &outcome.broken_match {
            self.push_teardown(wall_id, source_id, broken.other_member_id, broken.conversation_id)
                .await;
        }
    }

    async fn push_teardown(
        &self,
        wall_id: Uuid,
        source_id: Uuid,
        other_member_id: Uuid,
        conversation_id: Option<Uuid>,
    ) {
        let Some(conversation_id) = conversation_id else {
            return;
        };
        for member in [source_id, other_member_id] {
            self.registry
                .send_to_member(
                    wall_id,
                    member,
                    GatewayEvent::ConversationClosed {
                        wall_id,
                        conversation_id,
                    },
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use wallflower_db::Database;
    use wallflower_match::LedgerConfig;

    fn seeded_engine() -> (Arc<MatchEngine>, Uuid, Vec<Uuid>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = Utc::now().to_rfc3339();
        let wall = Uuid::new_v4();
        db.insert_wall(&wall.to_string(), "quad", &now).unwrap();

        let mut members = Vec::new();
        for name in ["ana", "ben", "cleo"] {
            let id = Uuid::new_v4();
            db.insert_member(&id.to_string(), name, &now).unwrap();
            db.add_member_to_wall(&wall.to_string(), &id.to_string(), &now)
                .unwrap();
            members.push(id);
        }

        let engine = Arc::new(MatchEngine::new(
            db,
            LedgerConfig {
                bypass_lock: true,
                ..LedgerConfig::default()
            },
        ));
        (engine, wall, members)
    }

    fn matched_pair(engine: &MatchEngine, wall: Uuid, a: Uuid, b: Uuid) -> Uuid {
        let first = engine.set_crush(wall, a, b).unwrap();
        assert!(first.new_match.is_none());
        engine
            .set_crush(wall, b, a)
            .unwrap()
            .new_match
            .unwrap()
            .conversation
            .id
    }

    fn drain(rx: &mut mpsc::Receiver<GatewayEvent>) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn chat_is_pushed_to_the_counterpart_but_not_echoed() {
        let (engine, wall, m) = seeded_engine();
        let registry = Registry::new();
        let router = EventRouter::new(registry.clone(), engine.clone());
        let conversation_id = matched_pair(&engine, wall, m[0], m[1]);

        let (_ca, mut rx_a) = registry.register(m[0], wall).await;
        let (_cb, mut rx_b) = registry.register(m[1], wall).await;

        let stored = router
            .send_chat(conversation_id, Sender::Member(m[0]), "hi ben".into())
            .await
            .unwrap();
        assert_eq!(stored.sender_id, Some(m[0]));

        let to_ben = drain(&mut rx_b);
        assert!(matches!(
            &to_ben[..],
            [GatewayEvent::ChatMessage { message }] if message.id == stored.id
        ));
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn chat_from_outsiders_is_rejected_and_routed_nowhere() {
        let (engine, wall, m) = seeded_engine();
        let registry = Registry::new();
        let router = EventRouter::new(registry.clone(), engine.clone());
        let conversation_id = matched_pair(&engine, wall, m[0], m[1]);

        let (_cb, mut rx_b) = registry.register(m[1], wall).await;

        let err = router
            .send_chat(conversation_id, Sender::Member(m[2]), "hello".into())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAParticipant));
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn typing_reaches_only_the_counterpart() {
        let (engine, wall, m) = seeded_engine();
        let registry = Registry::new();
        let router = EventRouter::new(registry.clone(), engine.clone());
        let conversation_id = matched_pair(&engine, wall, m[0], m[1]);

        let (_ca, mut rx_a) = registry.register(m[0], wall).await;
        let (_cb, mut rx_b) = registry.register(m[1], wall).await;

        router.typing(conversation_id, m[0]).await;

        assert!(matches!(
            &drain(&mut rx_b)[..],
            [GatewayEvent::TypingIndicator { member_id, .. }] if *member_id == m[0]
        ));
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn match_formation_notifies_both_members_without_naming_admirers() {
        let (engine, wall, m) = seeded_engine();
        let registry = Registry::new();
        let router = EventRouter::new(registry.clone(), engine.clone());

        let (_ca, mut rx_a) = registry.register(m[0], wall).await;
        let (_cb, mut rx_b) = registry.register(m[1], wall).await;

        // Ana flags Ben: Ben sees only an anonymous admirer-count bump.
        let outcome = engine.set_crush(wall, m[0], m[1]).unwrap();
        router.publish_crush_set(m[0], &outcome).await;

        let to_ben = drain(&mut rx_b);
        assert!(matches!(
            &to_ben[..],
            [GatewayEvent::CrushUpdate { admirer_count: 1, .. }]
        ));
        assert!(drain(&mut rx_a).is_empty());

        // Ben flags back: both get the mutual-match event with one key.
        let outcome = engine.set_crush(wall, m[1], m[0]).unwrap();
        router.publish_crush_set(m[1], &outcome).await;

        let key_a = drain(&mut rx_a)
            .into_iter()
            .find_map(|e| match e {
                GatewayEvent::MutualMatch { match_key, other_member_id, .. } => {
                    assert_eq!(other_member_id, m[1]);
                    Some(match_key)
                }
                _ => None,
            })
            .expect("ana notified");
        let key_b = drain(&mut rx_b)
            .into_iter()
            .find_map(|e| match e {
                GatewayEvent::MutualMatch { match_key, other_member_id, .. } => {
                    assert_eq!(other_member_id, m[0]);
                    Some(match_key)
                }
                _ => None,
            })
            .expect("ben notified");
        assert_eq!(key_a, key_b);
    }

    #[tokio::test]
    async fn removal_tears_down_the_conversation_for_both() {
        let (engine, wall, m) = seeded_engine();
        let registry = Registry::new();
        let router = EventRouter::new(registry.clone(), engine.clone());
        let conversation_id = matched_pair(&engine, wall, m[0], m[1]);

        let (_ca, mut rx_a) = registry.register(m[0], wall).await;
        let (_cb, mut rx_b) = registry.register(m[1], wall).await;

        let outcome = engine.remove_crush(wall, m[0]).unwrap();
        router.publish_crush_removed(wall, m[0], &outcome).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let closed = drain(rx).into_iter().any(|e| {
                matches!(
                    e,
                    GatewayEvent::ConversationClosed { conversation_id: c, .. } if c == conversation_id
                )
            });
            assert!(closed);
        }
    }
}
