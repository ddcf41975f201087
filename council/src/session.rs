//! Council session lifecycle: phases, transitions, history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of a council session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Session created but not started.
    Created,
    /// Stage 1: fanning the query out to every member.
    CollectingResponses,
    /// Stage 2: anonymizing answers and collecting peer reviews.
    Reviewing,
    /// Folding review ballots into the consensus ranking.
    Aggregating,
    /// Stage 3: chairman synthesis.
    Synthesizing,
    /// Synthesis delivered.
    Completed,
    /// Unrecoverable error at some stage.
    Failed,
}

impl SessionPhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this phase.
    ///
    /// `Created → Synthesizing` is the single-model path used when the
    /// council feature flag is off.
    pub fn valid_transitions(self) -> &'static [SessionPhase] {
        match self {
            Self::Created => &[Self::CollectingResponses, Self::Synthesizing, Self::Failed],
            Self::CollectingResponses => &[Self::Reviewing, Self::Failed],
            Self::Reviewing => &[Self::Aggregating, Self::Failed],
            Self::Aggregating => &[Self::Synthesizing, Self::Failed],
            Self::Synthesizing => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::CollectingResponses => write!(f, "collecting_responses"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Aggregating => write!(f, "aggregating"),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// One council session: the only mutable state in the engine, owned
/// exclusively by the task driving the pipeline. Created fresh per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilSession {
    /// Unique session identifier.
    pub id: String,
    /// The query under deliberation.
    pub query: String,
    /// Current phase.
    pub phase: SessionPhase,
    /// Transition history.
    pub transitions: Vec<PhaseTransition>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl CouncilSession {
    pub fn new(query: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.to_string(),
            phase: SessionPhase::Created,
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: SessionPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Whether the session has ended.
    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }
}
