//! Session audit events and fire-and-forget sinks.
//!
//! The engine emits one event per stage barrier plus terminal outcome.
//! Sinks must not block the pipeline; delivery failures are the sink's
//! problem, which is why [`AuditSink::record`] returns nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::aggregator::ConsensusRanking;
use crate::collector::MemberResponse;
use crate::member::MemberId;
use crate::reviewer::ReviewResult;
use crate::session::SessionPhase;
use crate::synthesizer::SynthesisProvenance;

/// Broadcast channel capacity for [`BroadcastAuditSink`].
const CHANNEL_CAPACITY: usize = 256;

/// Intermediate and terminal artifacts of a council session. Each stage
/// barrier ships its full output so a sink can reconstruct the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    SessionStarted {
        session_id: String,
        query: String,
        members: Vec<MemberId>,
        timestamp: DateTime<Utc>,
    },
    ResponsesCollected {
        session_id: String,
        responses: Vec<MemberResponse>,
        timestamp: DateTime<Utc>,
    },
    ReviewsCollected {
        session_id: String,
        attempted: usize,
        reviews: Vec<ReviewResult>,
        timestamp: DateTime<Utc>,
    },
    RankingComputed {
        session_id: String,
        ranking: ConsensusRanking,
        timestamp: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: String,
        final_response: String,
        provenance: SynthesisProvenance,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    SessionFailed {
        session_id: String,
        phase: SessionPhase,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::ResponsesCollected { session_id, .. }
            | Self::ReviewsCollected { session_id, .. }
            | Self::RankingComputed { session_id, .. }
            | Self::SessionCompleted { session_id, .. }
            | Self::SessionFailed { session_id, .. } => session_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::ResponsesCollected { .. } => "responses_collected",
            Self::ReviewsCollected { .. } => "reviews_collected",
            Self::RankingComputed { .. } => "ranking_computed",
            Self::SessionCompleted { .. } => "session_completed",
            Self::SessionFailed { .. } => "session_failed",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SessionStarted { timestamp, .. }
            | Self::ResponsesCollected { timestamp, .. }
            | Self::ReviewsCollected { timestamp, .. }
            | Self::RankingComputed { timestamp, .. }
            | Self::SessionCompleted { timestamp, .. }
            | Self::SessionFailed { timestamp, .. } => *timestamp,
        }
    }
}

/// Fire-and-forget write interface for session artifacts.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Mirrors events into the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            session = event.session_id(),
            event = event.event_type(),
            "audit"
        );
    }
}

/// Fans events out to broadcast subscribers. Absent or lagging receivers
/// are ignored, which is exactly the fire-and-forget contract.
pub struct BroadcastAuditSink {
    sender: broadcast::Sender<AuditEvent>,
}

impl BroadcastAuditSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to receive events from subsequent sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for BroadcastAuditSink {
    fn record(&self, event: AuditEvent) {
        let _ = self.sender.send(event);
    }
}
