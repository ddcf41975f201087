//! Session-level error taxonomy.
//!
//! Per-member failures are not errors at this level; they are recorded on
//! the individual [`MemberResponse`](crate::collector::MemberResponse) and
//! the member is excluded from later stages. Everything here ends the
//! session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::member::MemberId;
use crate::session::SessionPhase;

/// Result type alias for council operations.
pub type CouncilResult<T> = Result<T, CouncilError>;

/// Which member failed and why, carried inside stage-level errors so the
/// caller has enough detail for its own retry or fallback decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub member: MemberId,
    pub reason: String,
}

/// Errors that abort a council session.
#[derive(Debug, Error)]
pub enum CouncilError {
    /// Invalid configuration, rejected before Stage 1 starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Too few members answered in Stage 1 to continue.
    #[error("insufficient quorum: {got} responses, {need} required")]
    InsufficientQuorum {
        got: usize,
        need: usize,
        failures: Vec<FailureDetail>,
    },

    /// Stage 2 produced no usable ballot while rankings were required.
    #[error("no valid peer reviews ({attempted} reviewers attempted)")]
    NoValidReviews { attempted: usize },

    /// The global session deadline expired with quorum unmet.
    #[error("global deadline exceeded during {stage}")]
    DeadlineExceeded { stage: SessionPhase },

    /// The chairman call failed or timed out. There is no implicit
    /// fallback; see [`FallbackPolicy`](crate::config::FallbackPolicy).
    #[error("chairman unavailable: {reason}")]
    ChairmanUnavailable { reason: String },

    /// The caller cancelled the session.
    #[error("session cancelled during {stage}")]
    Cancelled { stage: SessionPhase },
}

impl CouncilError {
    /// Whether a fresh session for the same query could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientQuorum { .. }
                | Self::DeadlineExceeded { .. }
                | Self::ChairmanUnavailable { .. }
        )
    }
}
