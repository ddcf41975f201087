//! Stage 1: fan the query out to every member and join the results.
//!
//! One bounded task per member, joined before anything downstream runs.
//! A member that errors or times out is recorded as failed and excluded
//! from later stages; only a missed quorum ends the session.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{CouncilError, CouncilResult, FailureDetail};
use crate::member::{MemberId, MemberInvoker};
use crate::prompts;
use crate::session::SessionPhase;

/// Outcome of one member's stage-one invocation. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResponse {
    pub member: MemberId,
    pub answer: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MemberResponse {
    pub fn success(member: MemberId, answer: impl Into<String>) -> Self {
        Self {
            member,
            answer: answer.into(),
            succeeded: true,
            error: None,
        }
    }

    pub fn failure(member: MemberId, reason: impl Into<String>) -> Self {
        Self {
            member,
            answer: String::new(),
            succeeded: false,
            error: Some(reason.into()),
        }
    }
}

/// Stage-1 fan-out over the configured membership.
pub struct ResponseCollector {
    invoker: Arc<dyn MemberInvoker>,
    per_member_timeout: Duration,
    min_quorum: usize,
}

impl ResponseCollector {
    pub fn new(
        invoker: Arc<dyn MemberInvoker>,
        per_member_timeout: Duration,
        min_quorum: usize,
    ) -> Self {
        Self {
            invoker,
            per_member_timeout,
            min_quorum,
        }
    }

    /// Query all members concurrently, join, then enforce quorum.
    ///
    /// Responses come back in member order. When quorum is missed the error
    /// distinguishes an expired global deadline from plain member failures.
    pub async fn collect(
        &self,
        query: &str,
        members: &[MemberId],
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> CouncilResult<Vec<MemberResponse>> {
        let prompt = prompts::response_prompt(query);
        let per_member = self.per_member_timeout;

        let calls = members.iter().map(|member| {
            let invoker = Arc::clone(&self.invoker);
            let prompt = prompt.clone();
            let cancel = cancel.clone();
            let member = member.clone();
            async move {
                let budget = stage_call_budget(per_member, deadline);
                invoke_bounded(invoker.as_ref(), &member, &prompt, budget, &cancel).await
            }
        });

        let responses = join_all(calls).await;

        if cancel.is_cancelled() {
            return Err(CouncilError::Cancelled {
                stage: SessionPhase::CollectingResponses,
            });
        }

        let succeeded = responses.iter().filter(|r| r.succeeded).count();
        info!(
            total = responses.len(),
            succeeded,
            failed = responses.len() - succeeded,
            "stage one settled"
        );

        if succeeded < self.min_quorum {
            if Instant::now() >= deadline {
                return Err(CouncilError::DeadlineExceeded {
                    stage: SessionPhase::CollectingResponses,
                });
            }
            let failures = responses
                .iter()
                .filter(|r| !r.succeeded)
                .map(|r| FailureDetail {
                    member: r.member.clone(),
                    reason: r
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown failure".to_string()),
                })
                .collect();
            return Err(CouncilError::InsufficientQuorum {
                got: succeeded,
                need: self.min_quorum,
                failures,
            });
        }

        Ok(responses)
    }
}

/// One member call bounded by the stage budget and the session token.
///
/// Never returns an error: every failure mode collapses into a failed
/// `MemberResponse` so the join barrier always settles with one entry per
/// member.
pub(crate) async fn invoke_bounded(
    invoker: &dyn MemberInvoker,
    member: &MemberId,
    prompt: &str,
    budget: Duration,
    cancel: &CancellationToken,
) -> MemberResponse {
    if budget.is_zero() {
        return MemberResponse::failure(member.clone(), "global deadline exhausted");
    }

    tokio::select! {
        _ = cancel.cancelled() => MemberResponse::failure(member.clone(), "cancelled"),
        outcome = timeout(budget, invoker.invoke(member, prompt)) => match outcome {
            Ok(Ok(answer)) => MemberResponse::success(member.clone(), answer),
            Ok(Err(e)) => {
                warn!(member = %member, error = %e, "member call failed");
                MemberResponse::failure(member.clone(), e.to_string())
            }
            Err(_) => {
                warn!(member = %member, budget_ms = budget.as_millis() as u64, "member call timed out");
                MemberResponse::failure(
                    member.clone(),
                    format!("timed out after {}ms", budget.as_millis()),
                )
            }
        }
    }
}

/// Budget for a single call: the per-member bound, shrunk to whatever is
/// left of the global deadline.
pub(crate) fn stage_call_budget(per_member: Duration, deadline: Instant) -> Duration {
    per_member.min(deadline.saturating_duration_since(Instant::now()))
}
