//! End-to-end flow across the ledger, detector and conversation store.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use wallflower_db::Database;
use wallflower_match::{LedgerConfig, MATCH_GREETING, MatchEngine, Sender};
use wallflower_types::models::RelationshipStage;

fn seeded_engine() -> (MatchEngine, Uuid, Uuid, Uuid) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let now = Utc::now().to_rfc3339();

    let wall = Uuid::new_v4();
    db.insert_wall(&wall.to_string(), "the quad", &now).unwrap();

    let ana = Uuid::new_v4();
    let ben = Uuid::new_v4();
    for (id, name) in [(ana, "ana"), (ben, "ben")] {
        db.insert_member(&id.to_string(), name, &now).unwrap();
        db.add_member_to_wall(&wall.to_string(), &id.to_string(), &now)
            .unwrap();
    }

    let engine = MatchEngine::new(
        db,
        LedgerConfig {
            bypass_lock: true,
            ..LedgerConfig::default()
        },
    );
    (engine, wall, ana, ben)
}

#[test]
fn crush_to_match_to_chat() {
    let (engine, wall, ana, ben) = seeded_engine();

    // Ana flags Ben. No match yet, from either side.
    let outcome = engine.set_crush(wall, ana, ben).unwrap();
    assert!(outcome.new_match.is_none());
    assert_eq!(outcome.target_admirers, 1);
    assert!(engine.check_mutual(wall, ana).unwrap().is_empty());
    assert!(engine.check_mutual(wall, ben).unwrap().is_empty());

    // Ben flags Ana back: both sides now report one pair with the same
    // canonical identifier.
    let outcome = engine.set_crush(wall, ben, ana).unwrap();
    let matched = outcome.new_match.expect("reciprocal pair");

    let (lo, hi) = if ana <= ben { (ana, ben) } else { (ben, ana) };
    assert_eq!(matched.id.canonical(), format!("match-{}-{}", lo, hi));

    let from_ana = engine.check_mutual(wall, ana).unwrap();
    let from_ben = engine.check_mutual(wall, ben).unwrap();
    assert_eq!(from_ana, from_ben);
    assert_eq!(from_ana[0].canonical(), matched.id.canonical());

    // The conversation exists with exactly one greeting system message.
    let conversation = matched.conversation;
    let messages = engine
        .conversations()
        .fetch_messages(conversation.id, 50, None)
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_system);
    assert_eq!(messages[0].body, MATCH_GREETING);

    // Chat flows in append order regardless of which side wrote what.
    engine
        .conversations()
        .append_message(conversation.id, Sender::Member(ana), "hi ben")
        .unwrap();
    engine
        .conversations()
        .append_message(conversation.id, Sender::Member(ben), "hi ana")
        .unwrap();

    let bodies: Vec<String> = engine
        .conversations()
        .fetch_messages(conversation.id, 50, None)
        .unwrap()
        .into_iter()
        .map(|m| m.body)
        .collect();
    assert_eq!(bodies, vec![MATCH_GREETING.to_string(), "hi ben".into(), "hi ana".into()]);

    // Status timeline moves forward and is audited in the thread.
    let (status, _) = engine
        .conversations()
        .update_status(conversation.id, ben, RelationshipStage::Talking)
        .unwrap();
    assert_eq!(status.stage, RelationshipStage::Talking);

    let messages = engine
        .conversations()
        .fetch_messages(conversation.id, 50, None)
        .unwrap();
    assert_eq!(messages.len(), 4);
    assert!(messages[3].is_system);
}

#[test]
fn breakup_and_rematch_keep_one_thread() {
    let (engine, wall, ana, ben) = seeded_engine();

    engine.set_crush(wall, ana, ben).unwrap();
    let conversation_id = engine
        .set_crush(wall, ben, ana)
        .unwrap()
        .new_match
        .unwrap()
        .conversation
        .id;

    // Ana withdraws: match gone, thread retained.
    let removed = engine.remove_crush(wall, ana).unwrap();
    assert_eq!(removed.target_admirers, 0);
    assert_eq!(
        removed.broken_match.unwrap().conversation_id,
        Some(conversation_id)
    );

    // They find each other again: same thread, no second greeting.
    let rematch = engine.set_crush(wall, ana, ben).unwrap().new_match.unwrap();
    assert_eq!(rematch.conversation.id, conversation_id);

    let system_count = engine
        .conversations()
        .fetch_messages(conversation_id, 50, None)
        .unwrap()
        .iter()
        .filter(|m| m.is_system)
        .count();
    assert_eq!(system_count, 1);
}
