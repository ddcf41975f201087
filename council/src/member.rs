//! Council member identity and the invoker seam.
//!
//! The engine never talks to a model backend directly. Everything goes
//! through [`MemberInvoker`], which a host wires to whatever transport it
//! owns (HTTP, local inference, a test script).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a council member, usually a model name.
///
/// Lexicographic ordering on the underlying string is load-bearing: it is
/// the final tie-break rule in the ranking aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Transport-level errors produced by invoker implementations.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("member unavailable: {0}")]
    Unavailable(String),

    #[error("credentials not configured for {0}")]
    MissingCredentials(String),
}

/// Seam to whatever backs a council member.
///
/// The engine bounds every call with its own timeout and cancellation, so
/// implementations only need to be drop-safe; they are never asked to
/// enforce the session deadline themselves.
#[async_trait]
pub trait MemberInvoker: Send + Sync {
    /// Send one prompt to one member and return its raw text answer.
    async fn invoke(&self, member: &MemberId, prompt: &str) -> Result<String, InvokeError>;
}
