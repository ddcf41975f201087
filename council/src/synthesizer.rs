//! Stage 3: chairman synthesis of the final answer.
//!
//! One call to the chairman with the de-anonymized council record, bounded
//! by whatever is left of the global deadline. A failed chairman surfaces
//! `ChairmanUnavailable`; the fallback decision belongs to the engine and
//! its configured policy, never to this module.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::aggregator::ConsensusRanking;
use crate::collector::{invoke_bounded, MemberResponse};
use crate::error::{CouncilError, CouncilResult};
use crate::member::{MemberId, MemberInvoker};
use crate::prompts;
use crate::reviewer::ReviewResult;
use crate::session::SessionPhase;

/// Confidence assumed when the chairman omits one.
const DEFAULT_SYNTHESIS_CONFIDENCE: f64 = 0.5;

/// How the final response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisProvenance {
    /// Chairman synthesis over the full council record.
    Synthesis,
    /// Chairman was unavailable; the top-ranked member answer was returned
    /// verbatim under the caller's fallback policy.
    TopRankedFallback,
    /// Council disabled; single chairman call with no peer review.
    DirectResponse,
}

/// Terminal artifact of a council session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub response: String,
    pub reasoning: String,
    pub confidence: f64,
}

/// Stage-3 driver around the chairman member.
pub struct ChairmanSynthesizer {
    invoker: Arc<dyn MemberInvoker>,
    chairman: MemberId,
}

impl ChairmanSynthesizer {
    pub fn new(invoker: Arc<dyn MemberInvoker>, chairman: MemberId) -> Self {
        Self { invoker, chairman }
    }

    /// Issue the synthesis call over the assembled council record.
    #[allow(clippy::too_many_arguments)]
    pub async fn synthesize(
        &self,
        query: &str,
        responses: &[MemberResponse],
        ranking: &ConsensusRanking,
        reviews: &[ReviewResult],
        include_all_opinions: bool,
        include_peer_reviews: bool,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> CouncilResult<SynthesisResult> {
        let prompt = prompts::synthesis_prompt(
            query,
            responses,
            ranking,
            reviews,
            include_all_opinions,
            include_peer_reviews,
        );
        self.call_chairman(&prompt, cancel, deadline)
            .await
            .map(|raw| parse_synthesis(&raw))
    }

    /// Single-model path used when the council feature flag is off: one
    /// plain call, no council context, whole answer taken verbatim.
    pub async fn respond(
        &self,
        query: &str,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> CouncilResult<SynthesisResult> {
        let prompt = prompts::response_prompt(query);
        let raw = self.call_chairman(&prompt, cancel, deadline).await?;
        Ok(SynthesisResult {
            response: raw.trim().to_string(),
            reasoning: String::new(),
            confidence: DEFAULT_SYNTHESIS_CONFIDENCE,
        })
    }

    async fn call_chairman(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> CouncilResult<String> {
        let budget = deadline.saturating_duration_since(Instant::now());
        if budget.is_zero() {
            return Err(CouncilError::ChairmanUnavailable {
                reason: "no time remaining for synthesis".to_string(),
            });
        }

        let outcome =
            invoke_bounded(self.invoker.as_ref(), &self.chairman, prompt, budget, cancel).await;

        if cancel.is_cancelled() {
            return Err(CouncilError::Cancelled {
                stage: SessionPhase::Synthesizing,
            });
        }
        if !outcome.succeeded {
            return Err(CouncilError::ChairmanUnavailable {
                reason: outcome
                    .error
                    .unwrap_or_else(|| "unknown failure".to_string()),
            });
        }

        info!(chairman = %self.chairman, "chairman responded");
        Ok(outcome.answer)
    }
}

/// Parse SYNTHESIS / REASONING / CONFIDENCE sections from chairman output.
/// A chairman that ignores the format still yields a usable result: the
/// whole text becomes the synthesis.
fn parse_synthesis(raw: &str) -> SynthesisResult {
    enum Section {
        None,
        Synthesis,
        Reasoning,
    }

    let mut response = String::new();
    let mut reasoning = String::new();
    let mut confidence = None;
    let mut section = Section::None;

    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("SYNTHESIS:") {
            section = Section::Synthesis;
            push_line(&mut response, rest);
        } else if let Some(rest) = line.strip_prefix("REASONING:") {
            section = Section::Reasoning;
            push_line(&mut reasoning, rest);
        } else if let Some(rest) = line.strip_prefix("CONFIDENCE:") {
            section = Section::None;
            confidence = rest.trim().parse::<f64>().ok();
        } else {
            match section {
                Section::Synthesis => push_line(&mut response, line),
                Section::Reasoning => push_line(&mut reasoning, line),
                Section::None => {}
            }
        }
    }

    if response.trim().is_empty() {
        response = raw.to_string();
    }

    SynthesisResult {
        response: response.trim().to_string(),
        reasoning: reasoning.trim().to_string(),
        confidence: confidence
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_SYNTHESIS_CONFIDENCE)
            .clamp(0.0, 1.0),
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() || !line.trim().is_empty() {
        buffer.push_str(line.trim_start());
        buffer.push('\n');
    }
}
