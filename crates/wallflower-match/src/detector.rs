use tracing::debug;
use uuid::Uuid;

use wallflower_db::Database;
use wallflower_types::error::CoreError;
use wallflower_types::models::MatchId;

use crate::convert;

/// Find the reciprocal pairs involving `member_id` within a wall.
///
/// Reads the wall's edges in one query, so a call racing a concurrent edge
/// change may miss a pair — but a later call after the change is durably
/// recorded will see it. Callers re-invoke after every write rather than
/// relying on a single read. With the single-target invariant the result
/// holds at most one pair.
pub fn check_mutual(
    db: &Database,
    wall_id: Uuid,
    member_id: Uuid,
) -> Result<Vec<MatchId>, CoreError> {
    let edges = db.crush_edges_for_wall(&wall_id.to_string())?;
    let member = member_id.to_string();

    let Some(own) = edges.iter().find(|e| e.source_id == member) else {
        return Ok(vec![]);
    };
    if own.target_id == member {
        // A self-edge can never form a pair.
        return Ok(vec![]);
    }

    let reciprocal = edges
        .iter()
        .any(|e| e.source_id == own.target_id && e.target_id == member);
    if !reciprocal {
        return Ok(vec![]);
    }

    let pair = MatchId::new(wall_id, member_id, convert::parse_uuid(&own.target_id)?);
    debug!(%wall_id, match_key = %pair.canonical(), "reciprocal pair detected");
    Ok(vec![pair])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::fmt_ts;
    use crate::testutil::{seed_wall, wall_db};
    use chrono::Utc;

    fn set_edge(db: &Database, wall: Uuid, source: Uuid, target: Uuid) {
        db.set_crush_edge(
            &wall.to_string(),
            &source.to_string(),
            &target.to_string(),
            &fmt_ts(Utc::now()),
        )
        .unwrap();
    }

    #[test]
    fn one_sided_crush_is_not_a_match() {
        let db = wall_db();
        let (wall, m) = seed_wall(&db, 2);
        set_edge(&db, wall, m[0], m[1]);

        assert!(check_mutual(&db, wall, m[0]).unwrap().is_empty());
        assert!(check_mutual(&db, wall, m[1]).unwrap().is_empty());
    }

    #[test]
    fn reciprocal_edges_match_from_both_sides() {
        let db = wall_db();
        let (wall, m) = seed_wall(&db, 2);
        set_edge(&db, wall, m[0], m[1]);
        set_edge(&db, wall, m[1], m[0]);

        let from_a = check_mutual(&db, wall, m[0]).unwrap();
        let from_b = check_mutual(&db, wall, m[1]).unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_b.len(), 1);
        // Both directions compute the identical canonical identifier.
        assert_eq!(from_a[0], from_b[0]);
        assert_eq!(from_a[0].canonical(), from_b[0].canonical());
    }

    #[test]
    fn retarget_dissolves_the_match() {
        let db = wall_db();
        let (wall, m) = seed_wall(&db, 3);
        set_edge(&db, wall, m[0], m[1]);
        set_edge(&db, wall, m[1], m[0]);
        assert_eq!(check_mutual(&db, wall, m[0]).unwrap().len(), 1);

        set_edge(&db, wall, m[0], m[2]);
        assert!(check_mutual(&db, wall, m[0]).unwrap().is_empty());
        assert!(check_mutual(&db, wall, m[1]).unwrap().is_empty());
    }

    #[test]
    fn matches_are_scoped_to_a_wall() {
        let db = wall_db();
        let (wall_one, m) = seed_wall(&db, 2);
        let (wall_two, _) = seed_wall(&db, 0);
        let now = fmt_ts(Utc::now());
        for id in &m {
            db.add_member_to_wall(&wall_two.to_string(), &id.to_string(), &now)
                .unwrap();
        }

        // Reciprocal on wall one, one-sided on wall two.
        set_edge(&db, wall_one, m[0], m[1]);
        set_edge(&db, wall_one, m[1], m[0]);
        set_edge(&db, wall_two, m[0], m[1]);

        assert_eq!(check_mutual(&db, wall_one, m[0]).unwrap().len(), 1);
        assert!(check_mutual(&db, wall_two, m[0]).unwrap().is_empty());
    }
}
