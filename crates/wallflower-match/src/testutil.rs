use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use wallflower_db::Database;

use crate::convert;

pub fn wall_db() -> Arc<Database> {
    Arc::new(Database::open_in_memory().unwrap())
}

/// Create a wall with `n` members and return (wall, members).
pub fn seed_wall(db: &Arc<Database>, n: usize) -> (Uuid, Vec<Uuid>) {
    let wall = Uuid::new_v4();
    let now = convert::fmt_ts(Utc::now());
    db.insert_wall(&wall.to_string(), &format!("wall-{}", wall), &now)
        .unwrap();

    let mut members = Vec::with_capacity(n);
    for i in 0..n {
        let id = Uuid::new_v4();
        db.insert_member(&id.to_string(), &format!("member-{}-{}", i, id), &now)
            .unwrap();
        db.add_member_to_wall(&wall.to_string(), &id.to_string(), &now)
            .unwrap();
        members.push(id);
    }

    (wall, members)
}
