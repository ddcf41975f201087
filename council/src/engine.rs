//! The council pipeline driver.
//!
//! ```text
//! query -> collect -> anonymize -> review -> aggregate -> synthesize
//! ```
//!
//! Each stage is a join barrier: the next stage never starts before the
//! previous fan-out has fully settled, because Stage 2 depends on the
//! complete anonymized response set from Stage 1. The session struct is the
//! only mutable state and is owned exclusively by the task driving this
//! pipeline; per-member results are merged at the barrier, so nothing is
//! written concurrently.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregator::{aggregate, ConsensusRanking};
use crate::anonymizer::anonymize;
use crate::audit::{AuditEvent, AuditSink, NullAuditSink};
use crate::collector::{MemberResponse, ResponseCollector};
use crate::config::{CouncilConfig, FallbackPolicy};
use crate::error::{CouncilError, CouncilResult};
use crate::member::MemberInvoker;
use crate::reviewer::{PeerReviewer, ReviewResult};
use crate::session::{CouncilSession, SessionPhase};
use crate::synthesizer::{ChairmanSynthesizer, SynthesisProvenance, SynthesisResult};

/// Payload handed back to the caller after a completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilVerdict {
    pub query: String,
    pub final_response: String,
    pub synthesis_reasoning: String,
    pub confidence: f64,
    pub provenance: SynthesisProvenance,
    pub consensus_ranking: ConsensusRanking,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_member_responses: Option<Vec<MemberResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_member_reviews: Option<Vec<ReviewResult>>,
}

/// The three-stage council engine. Stateless across sessions; every call
/// to [`run`](Self::run) deliberates from scratch.
pub struct CouncilEngine {
    config: CouncilConfig,
    invoker: Arc<dyn MemberInvoker>,
    sink: Arc<dyn AuditSink>,
}

impl CouncilEngine {
    /// Build an engine over a validated configuration.
    pub fn new(config: CouncilConfig, invoker: Arc<dyn MemberInvoker>) -> CouncilResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            invoker,
            sink: Arc::new(NullAuditSink),
        })
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    /// Run one council session to completion.
    pub async fn run(&self, query: &str) -> CouncilResult<CouncilVerdict> {
        self.run_with_cancel(query, CancellationToken::new()).await
    }

    /// Run one council session under a caller-owned cancellation token.
    ///
    /// Cancelling the token aborts in-flight member calls in the current
    /// stage; a cancelled session never starts a subsequent stage.
    pub async fn run_with_cancel(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> CouncilResult<CouncilVerdict> {
        let mut session = CouncilSession::new(query);
        let deadline = Instant::now() + self.config.global_deadline();

        info!(
            session = %session.id,
            members = self.config.members.len(),
            chairman = %self.config.chairman,
            enabled = self.config.enabled,
            "council session starting"
        );
        self.sink.record(AuditEvent::SessionStarted {
            session_id: session.id.clone(),
            query: query.to_string(),
            members: self.config.members.clone(),
            timestamp: Utc::now(),
        });

        match self.drive(query, &mut session, &cancel, deadline).await {
            Ok(verdict) => {
                advance(&mut session, SessionPhase::Completed, "synthesis delivered");
                self.sink.record(AuditEvent::SessionCompleted {
                    session_id: session.id.clone(),
                    final_response: verdict.final_response.clone(),
                    provenance: verdict.provenance,
                    confidence: verdict.confidence,
                    timestamp: Utc::now(),
                });
                info!(
                    session = %session.id,
                    confidence = verdict.confidence,
                    "council session completed"
                );
                Ok(verdict)
            }
            Err(err) => {
                let failed_during = session.phase;
                advance(&mut session, SessionPhase::Failed, &err.to_string());
                self.sink.record(AuditEvent::SessionFailed {
                    session_id: session.id.clone(),
                    phase: failed_during,
                    reason: err.to_string(),
                    timestamp: Utc::now(),
                });
                warn!(
                    session = %session.id,
                    phase = %failed_during,
                    error = %err,
                    "council session failed"
                );
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        query: &str,
        session: &mut CouncilSession,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> CouncilResult<CouncilVerdict> {
        if !self.config.enabled {
            return self.direct_response(query, session, cancel, deadline).await;
        }

        // Stage 1: collect.
        ensure_live(cancel, session.phase)?;
        advance(session, SessionPhase::CollectingResponses, "stage one fan-out");
        let collector = ResponseCollector::new(
            Arc::clone(&self.invoker),
            self.config.per_member_timeout(),
            self.config.min_council_size,
        );
        let responses = collector
            .collect(query, &self.config.members, cancel, deadline)
            .await?;
        self.sink.record(AuditEvent::ResponsesCollected {
            session_id: session.id.clone(),
            responses: responses.clone(),
            timestamp: Utc::now(),
        });

        // Stage 2: anonymize and cross-review.
        ensure_live(cancel, session.phase)?;
        advance(session, SessionPhase::Reviewing, "anonymizing and cross-reviewing");
        let (anonymized, labels) = anonymize(&responses, self.config.anonymize_responses);
        let reviewer = PeerReviewer::new(
            Arc::clone(&self.invoker),
            self.config.per_member_timeout(),
        );
        let reviews = reviewer
            .review(
                query,
                &anonymized,
                &labels,
                cancel,
                deadline,
                self.config.require_rankings,
            )
            .await?;
        self.sink.record(AuditEvent::ReviewsCollected {
            session_id: session.id.clone(),
            attempted: anonymized.len(),
            reviews: reviews.clone(),
            timestamp: Utc::now(),
        });

        // Fold ballots. Pure computation, no member calls.
        ensure_live(cancel, session.phase)?;
        advance(session, SessionPhase::Aggregating, "folding ballots");
        let ranking = aggregate(&reviews, &labels);
        self.sink.record(AuditEvent::RankingComputed {
            session_id: session.id.clone(),
            ranking: ranking.clone(),
            timestamp: Utc::now(),
        });

        // Stage 3: synthesize.
        ensure_live(cancel, session.phase)?;
        advance(session, SessionPhase::Synthesizing, "chairman synthesis");
        let synthesizer =
            ChairmanSynthesizer::new(Arc::clone(&self.invoker), self.config.chairman.clone());
        let outcome = synthesizer
            .synthesize(
                query,
                &responses,
                &ranking,
                &reviews,
                self.config.include_all_opinions,
                self.config.include_peer_reviews,
                cancel,
                deadline,
            )
            .await;

        let (synthesis, provenance) = match outcome {
            Ok(result) => (result, SynthesisProvenance::Synthesis),
            Err(err @ CouncilError::ChairmanUnavailable { .. }) => {
                match self.config.chairman_fallback {
                    FallbackPolicy::Fail => return Err(err),
                    FallbackPolicy::TopRanked => {
                        let fallback =
                            top_ranked_fallback(&ranking, &responses).ok_or(err)?;
                        warn!("chairman unavailable, applying top-ranked fallback");
                        (fallback, SynthesisProvenance::TopRankedFallback)
                    }
                }
            }
            Err(other) => return Err(other),
        };

        Ok(self.verdict(query, synthesis, provenance, ranking, responses, reviews))
    }

    /// Single-model path behind the feature flag: no fan-out, no review,
    /// provenance makes the degradation visible to the caller.
    async fn direct_response(
        &self,
        query: &str,
        session: &mut CouncilSession,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> CouncilResult<CouncilVerdict> {
        info!(chairman = %self.config.chairman, "council disabled, single-model path");
        ensure_live(cancel, session.phase)?;
        advance(session, SessionPhase::Synthesizing, "single-model path");

        let synthesizer =
            ChairmanSynthesizer::new(Arc::clone(&self.invoker), self.config.chairman.clone());
        let synthesis = synthesizer.respond(query, cancel, deadline).await?;

        Ok(self.verdict(
            query,
            synthesis,
            SynthesisProvenance::DirectResponse,
            ConsensusRanking::default(),
            Vec::new(),
            Vec::new(),
        ))
    }

    fn verdict(
        &self,
        query: &str,
        synthesis: SynthesisResult,
        provenance: SynthesisProvenance,
        ranking: ConsensusRanking,
        responses: Vec<MemberResponse>,
        reviews: Vec<ReviewResult>,
    ) -> CouncilVerdict {
        CouncilVerdict {
            query: query.to_string(),
            final_response: synthesis.response,
            synthesis_reasoning: synthesis.reasoning,
            confidence: synthesis.confidence,
            provenance,
            consensus_ranking: ranking,
            per_member_responses: self.config.include_all_opinions.then_some(responses),
            per_member_reviews: self.config.include_peer_reviews.then_some(reviews),
        }
    }
}

/// Promote the top-ranked stage-one answer verbatim. The provenance marker
/// keeps the caller from mistaking this for a real synthesis.
fn top_ranked_fallback(
    ranking: &ConsensusRanking,
    responses: &[MemberResponse],
) -> Option<SynthesisResult> {
    let top = ranking.top()?;
    let response = responses
        .iter()
        .find(|r| r.member == top.member && r.succeeded)?;
    Some(SynthesisResult {
        response: response.answer.clone(),
        reasoning: format!(
            "chairman unavailable; top-ranked response from {} returned verbatim",
            top.member
        ),
        confidence: top.average_confidence,
    })
}

fn ensure_live(cancel: &CancellationToken, stage: SessionPhase) -> CouncilResult<()> {
    if cancel.is_cancelled() {
        return Err(CouncilError::Cancelled { stage });
    }
    Ok(())
}

/// Phase bookkeeping. The pipeline only requests transitions the table
/// allows, so a rejection here is a bug worth a loud log line, not a
/// session failure.
fn advance(session: &mut CouncilSession, to: SessionPhase, reason: &str) {
    if let Err(e) = session.transition(to, reason) {
        warn!(session = %session.id, error = %e, "session transition rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RankedMember;
    use crate::member::MemberId;

    fn ranking(entries: Vec<RankedMember>) -> ConsensusRanking {
        ConsensusRanking { entries }
    }

    #[test]
    fn fallback_uses_top_ranked_answer_verbatim() {
        let responses = vec![
            MemberResponse::success(MemberId::new("alpha"), "alpha answer"),
            MemberResponse::success(MemberId::new("bravo"), "bravo answer"),
        ];
        let ranking = ranking(vec![
            RankedMember {
                member: MemberId::new("bravo"),
                score: 2.0,
                average_confidence: 0.9,
                review_count: 2,
            },
            RankedMember {
                member: MemberId::new("alpha"),
                score: 1.0,
                average_confidence: 0.8,
                review_count: 2,
            },
        ]);

        let fallback = top_ranked_fallback(&ranking, &responses).unwrap();
        assert_eq!(fallback.response, "bravo answer");
        assert!(fallback.reasoning.contains("bravo"));
        assert!((fallback.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn fallback_requires_a_ranking_entry() {
        let responses = vec![MemberResponse::success(MemberId::new("alpha"), "a")];
        assert!(top_ranked_fallback(&ranking(Vec::new()), &responses).is_none());
    }

    #[test]
    fn fallback_skips_members_without_a_surviving_answer() {
        // Ranking names a member whose response is missing from the set.
        let ranking = ranking(vec![RankedMember {
            member: MemberId::new("ghost"),
            score: 1.0,
            average_confidence: 0.5,
            review_count: 1,
        }]);
        assert!(top_ranked_fallback(&ranking, &[]).is_none());
    }
}
