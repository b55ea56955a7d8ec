use crate::Database;
use crate::models::{
    ConfessionRow, ConversationRow, CrushRow, MemberRow, MessageRow, StatusRow,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

/// Outcome of a set-crush write.
pub enum CrushWrite {
    Created {
        target_admirers: i64,
    },
    Retargeted {
        previous_target: String,
        previous_target_admirers: i64,
        target_admirers: i64,
    },
    /// Same target as before; the existing set_at is untouched.
    Unchanged {
        set_at: String,
        target_admirers: i64,
    },
}

/// Outcome of a remove-crush write.
pub enum CrushDelete {
    Removed {
        target_id: String,
        target_admirers: i64,
        set_at: String,
    },
    Missing,
    Locked {
        remaining_secs: i64,
    },
}

impl Database {
    // -- Walls & members --

    pub fn insert_wall(&self, id: &str, name: &str, created_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO walls (id, name, created_at) VALUES (?1, ?2, ?3)",
                (id, name, created_at),
            )?;
            Ok(())
        })
    }

    pub fn insert_member(&self, id: &str, username: &str, created_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO members (id, username, created_at) VALUES (?1, ?2, ?3)",
                (id, username, created_at),
            )?;
            Ok(())
        })
    }

    pub fn add_member_to_wall(&self, wall_id: &str, member_id: &str, joined_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO wall_members (wall_id, member_id, joined_at) VALUES (?1, ?2, ?3)",
                (wall_id, member_id, joined_at),
            )?;
            Ok(())
        })
    }

    pub fn is_wall_member(&self, wall_id: &str, member_id: &str) -> Result<bool> {
        self.with_conn(|conn| query_is_wall_member(conn, wall_id, member_id))
    }

    pub fn wall_member_rows(&self, wall_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.username, m.created_at
                 FROM wall_members wm
                 JOIN members m ON m.id = wm.member_id
                 WHERE wm.wall_id = ?1
                 ORDER BY m.username",
            )?;

            let rows = stmt
                .query_map([wall_id], |row| {
                    Ok(MemberRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Crush edges --

    pub fn get_crush(&self, wall_id: &str, source_id: &str) -> Result<Option<CrushRow>> {
        self.with_conn(|conn| query_crush(conn, wall_id, source_id))
    }

    pub fn crush_edges_for_wall(&self, wall_id: &str) -> Result<Vec<CrushRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT wall_id, source_id, target_id, set_at
                 FROM crush_edges WHERE wall_id = ?1",
            )?;

            let rows = stmt
                .query_map([wall_id], map_crush_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn admirer_count(&self, wall_id: &str, member_id: &str) -> Result<i64> {
        self.with_conn(|conn| query_admirer_count(conn, wall_id, member_id))
    }

    /// Set or replace the (wall, source) crush edge. The whole
    /// check-then-mutate sequence runs under the connection lock, so admirer
    /// counts read here can never observe a half-applied retarget.
    pub fn set_crush_edge(
        &self,
        wall_id: &str,
        source_id: &str,
        target_id: &str,
        set_at: &str,
    ) -> Result<CrushWrite> {
        self.with_conn(|conn| {
            let existing = query_crush(conn, wall_id, source_id)?;

            if let Some(edge) = &existing {
                if edge.target_id == target_id {
                    let target_admirers = query_admirer_count(conn, wall_id, target_id)?;
                    return Ok(CrushWrite::Unchanged {
                        set_at: edge.set_at.clone(),
                        target_admirers,
                    });
                }
            }

            conn.execute(
                "INSERT INTO crush_edges (wall_id, source_id, target_id, set_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (wall_id, source_id)
                 DO UPDATE SET target_id = excluded.target_id, set_at = excluded.set_at",
                (wall_id, source_id, target_id, set_at),
            )?;

            let target_admirers = query_admirer_count(conn, wall_id, target_id)?;

            match existing {
                Some(previous) => {
                    let previous_target_admirers =
                        query_admirer_count(conn, wall_id, &previous.target_id)?;
                    Ok(CrushWrite::Retargeted {
                        previous_target: previous.target_id,
                        previous_target_admirers,
                        target_admirers,
                    })
                }
                None => Ok(CrushWrite::Created { target_admirers }),
            }
        })
    }

    /// Delete the (wall, source) crush edge, refusing while the edge is
    /// younger than `min_age`. `min_age = None` bypasses the age check.
    pub fn remove_crush_edge(
        &self,
        wall_id: &str,
        source_id: &str,
        now: DateTime<Utc>,
        min_age: Option<Duration>,
    ) -> Result<CrushDelete> {
        self.with_conn(|conn| {
            let Some(edge) = query_crush(conn, wall_id, source_id)? else {
                return Ok(CrushDelete::Missing);
            };

            if let Some(min_age) = min_age {
                let set_at = DateTime::parse_from_rfc3339(&edge.set_at)
                    .with_context(|| format!("corrupt set_at '{}'", edge.set_at))?
                    .with_timezone(&Utc);
                let unlocks_at = set_at + min_age;
                if now < unlocks_at {
                    return Ok(CrushDelete::Locked {
                        remaining_secs: (unlocks_at - now).num_seconds(),
                    });
                }
            }

            conn.execute(
                "DELETE FROM crush_edges WHERE wall_id = ?1 AND source_id = ?2",
                (wall_id, source_id),
            )?;

            let target_admirers = query_admirer_count(conn, wall_id, &edge.target_id)?;

            Ok(CrushDelete::Removed {
                target_id: edge.target_id,
                target_admirers,
                set_at: edge.set_at,
            })
        })
    }

    // -- Conversations --

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, wall_id, member_a, member_b, created_at
                 FROM conversations WHERE id = ?1",
            )?;

            stmt.query_row([id], map_conversation_row).optional()
        })
    }

    pub fn conversation_for_pair(
        &self,
        wall_id: &str,
        a: &str,
        b: &str,
    ) -> Result<Option<ConversationRow>> {
        let (lo, hi) = canonical_pair(a, b);
        self.with_conn(|conn| query_conversation_for_pair(conn, wall_id, lo, hi))
    }

    /// Idempotent conversation creation. Exactly one row, one seed system
    /// message and one default status record exist afterwards, no matter how
    /// many callers race here.
    pub fn create_conversation_if_absent(
        &self,
        id: &str,
        wall_id: &str,
        a: &str,
        b: &str,
        created_at: &str,
        seed_message_id: &str,
        seed_body: &str,
        default_stage: &str,
    ) -> Result<(ConversationRow, bool)> {
        let (lo, hi) = canonical_pair(a, b);
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO conversations (id, wall_id, member_a, member_b, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, wall_id, lo, hi, created_at),
            )?;
            let created = inserted > 0;

            if created {
                tx.execute(
                    "INSERT INTO conversation_messages (id, conversation_id, sender_id, body, is_system, created_at)
                     VALUES (?1, ?2, NULL, ?3, 1, ?4)",
                    (seed_message_id, id, seed_body, created_at),
                )?;
                tx.execute(
                    "INSERT INTO relationship_status (conversation_id, stage, updated_at)
                     VALUES (?1, ?2, ?3)",
                    (id, default_stage, created_at),
                )?;
            }

            let row = {
                let mut stmt = tx.prepare(
                    "SELECT id, wall_id, member_a, member_b, created_at
                     FROM conversations WHERE wall_id = ?1 AND member_a = ?2 AND member_b = ?3",
                )?;
                stmt.query_row((wall_id, lo, hi), map_conversation_row)?
            };

            tx.commit()?;
            Ok((row, created))
        })
    }

    // -- Messages --

    pub fn insert_chat_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: Option<&str>,
        body: &str,
        is_system: bool,
        created_at: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversation_messages (id, conversation_id, sender_id, body, is_system, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, conversation_id, sender_id, body, is_system, created_at],
            )?;

            let seq = conn.last_insert_rowid();

            Ok(MessageRow {
                id: id.to_string(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.map(str::to_string),
                body: body.to_string(),
                is_system,
                created_at: created_at.to_string(),
                seq,
            })
        })
    }

    /// Messages in persisted order (creation time, rowid tiebreak).
    /// `after_seq` fetches only messages newer than a previously seen one.
    pub fn messages_for_conversation(
        &self,
        conversation_id: &str,
        limit: u32,
        after_seq: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, body, is_system, created_at, rowid
                 FROM conversation_messages
                 WHERE conversation_id = ?1 AND rowid > ?2
                 ORDER BY created_at, rowid
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(
                    rusqlite::params![conversation_id, after_seq.unwrap_or(0), limit],
                    map_message_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Relationship status --

    pub fn relationship_status(&self, conversation_id: &str) -> Result<Option<StatusRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, stage, updated_at
                 FROM relationship_status WHERE conversation_id = ?1",
            )?;

            stmt.query_row([conversation_id], map_status_row).optional()
        })
    }

    /// Update the status record and append the audit system message in one
    /// transaction.
    pub fn set_relationship_stage(
        &self,
        conversation_id: &str,
        stage: &str,
        updated_at: &str,
        message_id: &str,
        system_body: &str,
    ) -> Result<(StatusRow, MessageRow)> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "UPDATE relationship_status SET stage = ?2, updated_at = ?3
                 WHERE conversation_id = ?1",
                (conversation_id, stage, updated_at),
            )?;

            tx.execute(
                "INSERT INTO conversation_messages (id, conversation_id, sender_id, body, is_system, created_at)
                 VALUES (?1, ?2, NULL, ?3, 1, ?4)",
                (message_id, conversation_id, system_body, updated_at),
            )?;
            let seq = tx.last_insert_rowid();

            tx.commit()?;

            Ok((
                StatusRow {
                    conversation_id: conversation_id.to_string(),
                    stage: stage.to_string(),
                    updated_at: updated_at.to_string(),
                },
                MessageRow {
                    id: message_id.to_string(),
                    conversation_id: conversation_id.to_string(),
                    sender_id: None,
                    body: system_body.to_string(),
                    is_system: true,
                    created_at: updated_at.to_string(),
                    seq,
                },
            ))
        })
    }

    // -- Confessions --

    pub fn insert_confession(
        &self,
        id: &str,
        wall_id: &str,
        author_id: &str,
        body: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO confessions (id, wall_id, author_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, wall_id, author_id, body, created_at),
            )?;
            Ok(())
        })
    }

    /// Newest first. The author column is deliberately not selected.
    pub fn confessions_for_wall(&self, wall_id: &str, limit: u32) -> Result<Vec<ConfessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, wall_id, body, created_at
                 FROM confessions WHERE wall_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![wall_id, limit], |row| {
                    Ok(ConfessionRow {
                        id: row.get(0)?,
                        wall_id: row.get(1)?,
                        body: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

fn query_is_wall_member(conn: &Connection, wall_id: &str, member_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM wall_members WHERE wall_id = ?1 AND member_id = ?2",
        (wall_id, member_id),
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn query_crush(conn: &Connection, wall_id: &str, source_id: &str) -> Result<Option<CrushRow>> {
    let mut stmt = conn.prepare(
        "SELECT wall_id, source_id, target_id, set_at
         FROM crush_edges WHERE wall_id = ?1 AND source_id = ?2",
    )?;

    stmt.query_row((wall_id, source_id), map_crush_row).optional()
}

fn query_admirer_count(conn: &Connection, wall_id: &str, member_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM crush_edges WHERE wall_id = ?1 AND target_id = ?2",
        (wall_id, member_id),
        |row| row.get(0),
    )?;
    Ok(count)
}

fn query_conversation_for_pair(
    conn: &Connection,
    wall_id: &str,
    lo: &str,
    hi: &str,
) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, wall_id, member_a, member_b, created_at
         FROM conversations WHERE wall_id = ?1 AND member_a = ?2 AND member_b = ?3",
    )?;

    stmt.query_row((wall_id, lo, hi), map_conversation_row).optional()
}

fn map_crush_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CrushRow> {
    Ok(CrushRow {
        wall_id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        set_at: row.get(3)?,
    })
}

fn map_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        wall_id: row.get(1)?,
        member_a: row.get(2)?,
        member_b: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_status_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusRow> {
    Ok(StatusRow {
        conversation_id: row.get(0)?,
        stage: row.get(1)?,
        updated_at: row.get(2)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        is_system: row.get(4)?,
        created_at: row.get(5)?,
        seq: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
