use chrono::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the crush ledger, match detector and conversation
/// store. Authorization-shaped variants assume the caller is already
/// authenticated; they are consistency checks, not security boundaries.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,

    #[error("{0} is not a member of this wall")]
    NotAMember(Uuid),

    #[error("sender is not a participant in this conversation")]
    NotAParticipant,

    #[error(
        "crush can be withdrawn in {}h{:02}m",
        .remaining.num_hours(),
        .remaining.num_minutes().max(1) % 60
    )]
    TooSoon { remaining: Duration },

    #[error("push channel unavailable")]
    TransportUnavailable,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl CoreError {
    pub fn too_soon(remaining: Duration) -> Self {
        Self::TooSoon { remaining }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_soon_reports_remaining_wait() {
        let err = CoreError::too_soon(Duration::minutes(3 * 60 + 59));
        assert_eq!(err.to_string(), "crush can be withdrawn in 3h59m");
    }

    #[test]
    fn too_soon_never_reports_zero_wait() {
        // Sub-minute remainders still show a concrete wait.
        let err = CoreError::too_soon(Duration::seconds(30));
        assert_eq!(err.to_string(), "crush can be withdrawn in 0h01m");
    }
}
