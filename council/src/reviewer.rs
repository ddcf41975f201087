//! Stage 2: anonymous cross-review with ranked ballots.
//!
//! Every surviving member reviews the others' anonymized answers and
//! returns a ballot ranking them best to worst. A reviewer that fails,
//! times out, or returns a malformed ballot is dropped without failing the
//! session; only an empty ballot set under `require_rankings` is fatal.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::anonymizer::{AnonymizedResponse, LabelMap};
use crate::collector::{invoke_bounded, stage_call_budget};
use crate::error::{CouncilError, CouncilResult};
use crate::member::{MemberId, MemberInvoker};
use crate::prompts;
use crate::session::SessionPhase;

/// Confidence assumed when a ballot omits one.
const DEFAULT_REVIEW_CONFIDENCE: f64 = 0.5;

/// One valid reviewer ballot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub reviewer: MemberId,
    /// Labels ordered best to worst. Never contains the reviewer's own
    /// label; always a permutation of the peer label set.
    pub ranking: Vec<String>,
    pub reasoning: String,
    /// Reviewer self-assessed confidence, clamped to [0, 1] at ingestion.
    pub confidence: f64,
}

/// Stage-2 fan-out across the surviving members.
pub struct PeerReviewer {
    invoker: Arc<dyn MemberInvoker>,
    per_member_timeout: Duration,
}

impl PeerReviewer {
    pub fn new(invoker: Arc<dyn MemberInvoker>, per_member_timeout: Duration) -> Self {
        Self {
            invoker,
            per_member_timeout,
        }
    }

    /// Collect ballots from every member that survived Stage 1.
    ///
    /// Each reviewer sees all anonymized responses except its own; the
    /// exclusion happens here, against the label map, regardless of what
    /// the model later claims to rank.
    pub async fn review(
        &self,
        query: &str,
        anonymized: &[AnonymizedResponse],
        labels: &LabelMap,
        cancel: &CancellationToken,
        deadline: Instant,
        require_rankings: bool,
    ) -> CouncilResult<Vec<ReviewResult>> {
        let mut jobs = Vec::new();
        for own in anonymized {
            let Some(reviewer) = labels.member_for(&own.label) else {
                // The map is built from the same set; a miss would be a bug.
                warn!(label = %own.label, "label missing from map, skipping reviewer");
                continue;
            };
            let peers: Vec<AnonymizedResponse> = anonymized
                .iter()
                .filter(|r| r.label != own.label)
                .cloned()
                .collect();
            if peers.is_empty() {
                debug!(reviewer = %reviewer, "no peers to review");
                continue;
            }
            let expected: Vec<String> = peers.iter().map(|p| p.label.clone()).collect();
            let prompt = prompts::review_prompt(query, &peers);
            jobs.push((reviewer.clone(), own.label.clone(), expected, prompt));
        }

        let attempted = jobs.len();
        let per_member = self.per_member_timeout;

        let calls = jobs.into_iter().map(|(reviewer, own_label, expected, prompt)| {
            let invoker = Arc::clone(&self.invoker);
            let cancel = cancel.clone();
            async move {
                let budget = stage_call_budget(per_member, deadline);
                let response =
                    invoke_bounded(invoker.as_ref(), &reviewer, &prompt, budget, &cancel).await;
                if !response.succeeded {
                    return None;
                }
                match parse_review(&reviewer, &response.answer, &expected, &own_label) {
                    Ok(review) => Some(review),
                    Err(reason) => {
                        warn!(reviewer = %reviewer, reason = %reason, "discarding malformed ballot");
                        None
                    }
                }
            }
        });

        let reviews: Vec<ReviewResult> = join_all(calls).await.into_iter().flatten().collect();

        if cancel.is_cancelled() {
            return Err(CouncilError::Cancelled {
                stage: SessionPhase::Reviewing,
            });
        }

        info!(valid = reviews.len(), attempted, "stage two settled");

        if reviews.is_empty() && require_rankings {
            return Err(CouncilError::NoValidReviews { attempted });
        }

        Ok(reviews)
    }
}

/// Parse one reviewer ballot from raw model output.
///
/// The ballot must rank exactly the expected label set. Anything else
/// (own label present, labels missing, duplicated, or invented) makes the
/// review invalid, not fatal.
fn parse_review(
    reviewer: &MemberId,
    raw: &str,
    expected: &[String],
    own_label: &str,
) -> Result<ReviewResult, String> {
    let json = extract_json_object(raw).ok_or("no JSON object in reviewer output")?;
    let value: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| format!("ballot is not valid JSON: {e}"))?;

    let ranking = value
        .get("ranking")
        .and_then(|v| v.as_array())
        .ok_or("missing ranking array")?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| "ranking entries must be strings".to_string())
        })
        .collect::<Result<Vec<String>, String>>()?;

    if ranking.iter().any(|label| label == own_label) {
        return Err(format!("ranking contains reviewer's own label {own_label}"));
    }
    if !is_permutation(&ranking, expected) {
        return Err(format!(
            "ranking {ranking:?} is not a permutation of {expected:?}"
        ));
    }

    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let confidence = clamp_confidence(
        reviewer,
        value
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_REVIEW_CONFIDENCE),
    );

    Ok(ReviewResult {
        reviewer: reviewer.clone(),
        ranking,
        reasoning,
        confidence,
    })
}

/// Out-of-range confidence is untrusted model output: clamp it and leave a
/// data-quality trail rather than guessing intent.
fn clamp_confidence(reviewer: &MemberId, raw: f64) -> f64 {
    if !raw.is_finite() {
        warn!(reviewer = %reviewer, raw, "non-finite reviewer confidence, using default");
        return DEFAULT_REVIEW_CONFIDENCE;
    }
    if !(0.0..=1.0).contains(&raw) {
        warn!(reviewer = %reviewer, raw, "reviewer confidence outside [0, 1], clamping");
    }
    raw.clamp(0.0, 1.0)
}

fn is_permutation(ranking: &[String], expected: &[String]) -> bool {
    if ranking.len() != expected.len() {
        return false;
    }
    let mut left: Vec<&str> = ranking.iter().map(String::as_str).collect();
    let mut right: Vec<&str> = expected.iter().map(String::as_str).collect();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

/// Pull the first JSON object out of raw model output, tolerating markdown
/// fences and surrounding prose.
fn extract_json_object(raw: &str) -> Option<String> {
    let stripped = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    (start <= end).then(|| stripped[start..=end].to_string())
}
