//! Council consensus engine.
//!
//! A three-stage protocol over independently invocable model members:
//!
//! ```text
//! Stage 1: Collect    one query, fanned out to every member in parallel
//! Stage 2: Review     each survivor ranks the others' anonymized answers
//! Stage 3: Synthesize the chairman folds answers and reviews into one reply
//! ```
//!
//! Stages are join barriers: Stage 2 only ever sees the complete settled
//! response set from Stage 1, never a partial one. Individual member
//! failures are recorded and excluded; quorum, deadline, and chairman
//! failures end the session with a typed [`CouncilError`].
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use council::{CouncilConfig, CouncilEngine, HttpInvoker};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CouncilConfig::new(
//!     ["openai/gpt-5.1", "google/gemini-3-pro", "anthropic/claude-opus-4.5"],
//!     "google/gemini-3-pro",
//! );
//! let engine = CouncilEngine::new(config, Arc::new(HttpInvoker::from_env()?))?;
//! let verdict = engine.run("What is the best way to learn Rust?").await?;
//! println!("{}", verdict.final_response);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod anonymizer;
pub mod audit;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod member;
pub mod prompts;
pub mod reviewer;
pub mod session;
pub mod synthesizer;

pub use aggregator::{aggregate, ConsensusRanking, RankedMember};
pub use anonymizer::{anonymize, AnonymizedResponse, LabelMap};
pub use audit::{AuditEvent, AuditSink, BroadcastAuditSink, NullAuditSink, TracingAuditSink};
pub use collector::{MemberResponse, ResponseCollector};
pub use config::{CouncilConfig, FallbackPolicy};
pub use engine::{CouncilEngine, CouncilVerdict};
pub use error::{CouncilError, CouncilResult, FailureDetail};
pub use http::{HttpInvoker, HttpInvokerConfig};
pub use member::{InvokeError, MemberId, MemberInvoker};
pub use reviewer::{PeerReviewer, ReviewResult};
pub use session::{CouncilSession, PhaseTransition, SessionPhase};
pub use synthesizer::{ChairmanSynthesizer, SynthesisProvenance, SynthesisResult};
