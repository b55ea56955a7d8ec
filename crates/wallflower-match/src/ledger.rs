use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use wallflower_db::{CrushDelete, CrushWrite, Database};
use wallflower_types::error::CoreError;
use wallflower_types::models::CrushEdge;

use crate::convert;

/// Withdrawal-lock policy for the crush ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How long a crush must stand before it can be fully removed.
    /// Retargeting is never locked; it resets the clock instead.
    pub withdraw_lock: Duration,
    /// Skips the lock entirely. Configuration, not a product feature.
    pub bypass_lock: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            withdraw_lock: Duration::hours(4),
            bypass_lock: false,
        }
    }
}

/// Result of a successful set-crush call.
#[derive(Debug)]
pub struct CrushSet {
    pub edge: CrushEdge,
    /// The target's admirer count after this write.
    pub target_admirers: i64,
    /// Present when the call replaced an edge to a different member.
    pub previous: Option<PreviousTarget>,
    /// True when the source already targeted this member; set_at untouched.
    pub unchanged: bool,
}

#[derive(Debug)]
pub struct PreviousTarget {
    pub member_id: Uuid,
    pub admirer_count: i64,
}

#[derive(Debug)]
pub struct CrushRemoved {
    pub target_id: Uuid,
    pub target_admirers: i64,
}

/// Durable store of directed crush edges, one per (wall, source).
pub struct CrushLedger {
    db: Arc<Database>,
    config: LedgerConfig,
}

impl CrushLedger {
    pub fn new(db: Arc<Database>, config: LedgerConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Set or replace the caller's crush within a wall. A repeat of the
    /// current target is a no-op that reports the original set_at.
    pub fn set_crush(
        &self,
        wall_id: Uuid,
        source_id: Uuid,
        target_id: Uuid,
    ) -> Result<CrushSet, CoreError> {
        if source_id == target_id {
            return Err(CoreError::NotAMember(target_id));
        }
        if !self
            .db
            .is_wall_member(&wall_id.to_string(), &target_id.to_string())?
        {
            return Err(CoreError::NotAMember(target_id));
        }

        let now = Utc::now();
        let write = self.db.set_crush_edge(
            &wall_id.to_string(),
            &source_id.to_string(),
            &target_id.to_string(),
            &convert::fmt_ts(now),
        )?;

        let (set_at, target_admirers, previous, unchanged) = match write {
            CrushWrite::Created { target_admirers } => (now, target_admirers, None, false),
            CrushWrite::Retargeted {
                previous_target,
                previous_target_admirers,
                target_admirers,
            } => (
                now,
                target_admirers,
                Some(PreviousTarget {
                    member_id: convert::parse_uuid(&previous_target)?,
                    admirer_count: previous_target_admirers,
                }),
                false,
            ),
            CrushWrite::Unchanged {
                set_at,
                target_admirers,
            } => (convert::parse_ts(&set_at)?, target_admirers, None, true),
        };

        debug!(%wall_id, %source_id, unchanged, "crush edge written");

        Ok(CrushSet {
            edge: CrushEdge {
                wall_id,
                source_id,
                target_id,
                set_at,
            },
            target_admirers,
            previous,
            unchanged,
        })
    }

    /// Remove the caller's crush. Refused with the remaining wait while the
    /// withdrawal lock is active, unless the bypass flag is configured.
    pub fn remove_crush(&self, wall_id: Uuid, source_id: Uuid) -> Result<CrushRemoved, CoreError> {
        let min_age = if self.config.bypass_lock {
            None
        } else {
            Some(self.config.withdraw_lock)
        };

        match self.db.remove_crush_edge(
            &wall_id.to_string(),
            &source_id.to_string(),
            Utc::now(),
            min_age,
        )? {
            CrushDelete::Removed {
                target_id,
                target_admirers,
                ..
            } => {
                debug!(%wall_id, %source_id, "crush edge removed");
                Ok(CrushRemoved {
                    target_id: convert::parse_uuid(&target_id)?,
                    target_admirers,
                })
            }
            CrushDelete::Missing => Err(CoreError::NotFound),
            CrushDelete::Locked { remaining_secs } => {
                Err(CoreError::too_soon(Duration::seconds(remaining_secs)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_wall, wall_db};

    #[test]
    fn set_crush_rejects_non_member_target() {
        let db = wall_db();
        let (wall, members) = seed_wall(&db, 2);
        let outsider = Uuid::new_v4();

        let err = CrushLedger::new(db, LedgerConfig::default())
            .set_crush(wall, members[0], outsider)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAMember(m) if m == outsider));
    }

    #[test]
    fn set_crush_rejects_self_target() {
        let db = wall_db();
        let (wall, members) = seed_wall(&db, 1);

        let err = CrushLedger::new(db, LedgerConfig::default())
            .set_crush(wall, members[0], members[0])
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAMember(_)));
    }

    #[test]
    fn repeat_set_is_noop_preserving_set_at() {
        let db = wall_db();
        let (wall, members) = seed_wall(&db, 2);
        let ledger = CrushLedger::new(db, LedgerConfig::default());

        let first = ledger.set_crush(wall, members[0], members[1]).unwrap();
        assert!(!first.unchanged);
        assert_eq!(first.target_admirers, 1);

        let repeat = ledger.set_crush(wall, members[0], members[1]).unwrap();
        assert!(repeat.unchanged);
        assert_eq!(repeat.edge.set_at, first.edge.set_at);
        assert_eq!(repeat.target_admirers, 1);
    }

    #[test]
    fn retarget_moves_admirer_counts() {
        let db = wall_db();
        let (wall, members) = seed_wall(&db, 3);
        let ledger = CrushLedger::new(db, LedgerConfig::default());

        ledger.set_crush(wall, members[0], members[1]).unwrap();
        let moved = ledger.set_crush(wall, members[0], members[2]).unwrap();

        assert_eq!(moved.target_admirers, 1);
        let prev = moved.previous.expect("previous target");
        assert_eq!(prev.member_id, members[1]);
        assert_eq!(prev.admirer_count, 0);
    }

    #[test]
    fn remove_inside_lock_window_reports_remaining_wait() {
        let db = wall_db();
        let (wall, members) = seed_wall(&db, 2);
        let ledger = CrushLedger::new(db.clone(), LedgerConfig::default());

        ledger.set_crush(wall, members[0], members[1]).unwrap();

        let err = ledger.remove_crush(wall, members[0]).unwrap_err();
        match err {
            CoreError::TooSoon { remaining } => {
                assert!(remaining <= Duration::hours(4));
                assert!(remaining > Duration::hours(3));
            }
            other => panic!("expected TooSoon, got {:?}", other),
        }

        // The edge is still there.
        assert!(
            db.get_crush(&wall.to_string(), &members[0].to_string())
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn bypass_flag_skips_the_lock() {
        let db = wall_db();
        let (wall, members) = seed_wall(&db, 2);
        let ledger = CrushLedger::new(
            db,
            LedgerConfig {
                bypass_lock: true,
                ..LedgerConfig::default()
            },
        );

        ledger.set_crush(wall, members[0], members[1]).unwrap();
        let removed = ledger.remove_crush(wall, members[0]).unwrap();
        assert_eq!(removed.target_id, members[1]);
        assert_eq!(removed.target_admirers, 0);
    }

    #[test]
    fn remove_without_edge_is_not_found() {
        let db = wall_db();
        let (wall, members) = seed_wall(&db, 1);
        let ledger = CrushLedger::new(db, LedgerConfig::default());

        let err = ledger.remove_crush(wall, members[0]).unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }
}
