//! Council configuration, validated at construction rather than first use.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{CouncilError, CouncilResult};
use crate::member::MemberId;

/// What the engine does when the chairman call fails after a completed
/// consensus ranking.
///
/// Relabelling a peer answer as a synthesis would misrepresent its
/// provenance, so falling back is an explicit caller choice and the
/// resulting verdict is marked accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Surface `ChairmanUnavailable` to the caller.
    #[default]
    Fail,
    /// Return the top-ranked response verbatim, labelled as a fallback.
    TopRanked,
}

/// Immutable per-session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    /// Feature flag: a disabled council degrades to one chairman call.
    pub enabled: bool,
    /// Ordered council membership.
    #[serde(alias = "council_models")]
    pub members: Vec<MemberId>,
    /// Member that performs final synthesis. Need not sit on the council,
    /// though it usually does.
    #[serde(alias = "chairman_model")]
    pub chairman: MemberId,
    /// Global deadline for the whole three-stage session.
    #[serde(alias = "timeout_seconds")]
    pub timeout_secs: u64,
    /// Bound on each individual member call within a stage.
    #[serde(alias = "per_member_timeout_seconds")]
    pub per_member_timeout_secs: u64,
    /// Minimum successful Stage-1 responses required to continue.
    pub min_council_size: usize,
    /// Maximum configured members.
    pub max_council_size: usize,
    /// Present peer answers under opaque labels during review.
    pub anonymize_responses: bool,
    /// Fail the session when Stage 2 yields zero valid ballots.
    pub require_rankings: bool,
    /// Hand every Stage-1 answer to the chairman, not just the top-ranked.
    pub include_all_opinions: bool,
    /// Hand Stage-2 review reasoning to the chairman.
    pub include_peer_reviews: bool,
    /// Chairman failure policy.
    pub chairman_fallback: FallbackPolicy,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            members: Vec::new(),
            chairman: MemberId::new(""),
            timeout_secs: 300,
            per_member_timeout_secs: 60,
            min_council_size: 2,
            max_council_size: 8,
            anonymize_responses: true,
            require_rankings: false,
            include_all_opinions: true,
            include_peer_reviews: true,
            chairman_fallback: FallbackPolicy::Fail,
        }
    }
}

impl CouncilConfig {
    /// Build a configuration for the given membership and chairman,
    /// defaults everywhere else.
    pub fn new<I, M>(members: I, chairman: impl Into<MemberId>) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MemberId>,
    {
        Self {
            members: members.into_iter().map(Into::into).collect(),
            chairman: chairman.into(),
            ..Self::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_per_member_timeout_secs(mut self, secs: u64) -> Self {
        self.per_member_timeout_secs = secs;
        self
    }

    pub fn with_size_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_council_size = min;
        self.max_council_size = max;
        self
    }

    pub fn with_anonymize_responses(mut self, anonymize: bool) -> Self {
        self.anonymize_responses = anonymize;
        self
    }

    pub fn with_require_rankings(mut self, require: bool) -> Self {
        self.require_rankings = require;
        self
    }

    pub fn with_include_all_opinions(mut self, include: bool) -> Self {
        self.include_all_opinions = include;
        self
    }

    pub fn with_include_peer_reviews(mut self, include: bool) -> Self {
        self.include_peer_reviews = include;
        self
    }

    pub fn with_chairman_fallback(mut self, policy: FallbackPolicy) -> Self {
        self.chairman_fallback = policy;
        self
    }

    pub fn global_deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn per_member_timeout(&self) -> Duration {
        Duration::from_secs(self.per_member_timeout_secs)
    }

    /// Enforce the construction-time invariants. The engine refuses to run
    /// a session over a configuration that fails here.
    pub fn validate(&self) -> CouncilResult<()> {
        if self.chairman.is_empty() {
            return Err(CouncilError::Configuration(
                "chairman id must not be empty".to_string(),
            ));
        }
        if self.min_council_size == 0 {
            return Err(CouncilError::Configuration(
                "min_council_size must be at least 1".to_string(),
            ));
        }
        if self.min_council_size > self.max_council_size {
            return Err(CouncilError::Configuration(format!(
                "min_council_size {} exceeds max_council_size {}",
                self.min_council_size, self.max_council_size
            )));
        }
        if self.members.len() < self.min_council_size
            || self.members.len() > self.max_council_size
        {
            return Err(CouncilError::Configuration(format!(
                "council size {} outside bounds {}..={}",
                self.members.len(),
                self.min_council_size,
                self.max_council_size
            )));
        }
        let mut seen = HashSet::new();
        for member in &self.members {
            if member.is_empty() {
                return Err(CouncilError::Configuration(
                    "member id must not be empty".to_string(),
                ));
            }
            if !seen.insert(member) {
                return Err(CouncilError::Configuration(format!(
                    "duplicate council member {member}"
                )));
            }
        }
        if self.timeout_secs == 0 || self.per_member_timeout_secs == 0 {
            return Err(CouncilError::Configuration(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a configuration from a YAML or TOML file, chosen by extension.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading council config {}", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&raw).context("parsing YAML council config")?
            }
            Some("toml") => toml::from_str(&raw).context("parsing TOML council config")?,
            other => anyhow::bail!("unsupported config extension {other:?} (want yaml or toml)"),
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn valid_config() -> CouncilConfig {
        CouncilConfig::new(["alpha", "bravo", "charlie"], "alpha")
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_chairman_fails_fast() {
        let config = CouncilConfig::new(["alpha", "bravo"], "");
        assert!(matches!(
            config.validate(),
            Err(CouncilError::Configuration(_))
        ));
    }

    #[test]
    fn council_below_min_size_is_rejected() {
        let config = CouncilConfig::new(["alpha"], "alpha");
        assert!(config.validate().is_err());
    }

    #[test]
    fn council_above_max_size_is_rejected() {
        let members: Vec<String> = (0..9).map(|i| format!("member-{i}")).collect();
        let config = CouncilConfig::new(members, "member-0");
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_members_are_rejected() {
        let config = CouncilConfig::new(["alpha", "alpha"], "alpha");
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_size_bounds_are_rejected() {
        let config = valid_config().with_size_bounds(5, 3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = valid_config().with_timeout_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_yaml_with_source_aliases() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "council_models: [alpha, bravo]\nchairman_model: alpha\ntimeout_seconds: 120"
        )
        .unwrap();

        let config = CouncilConfig::from_path(file.path()).unwrap();
        assert_eq!(config.members.len(), 2);
        assert_eq!(config.chairman, MemberId::new("alpha"));
        assert_eq!(config.timeout_secs, 120);
        assert!(config.anonymize_responses);
    }

    #[test]
    fn loads_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "members = [\"alpha\", \"bravo\"]\nchairman = \"bravo\"\nrequire_rankings = true"
        )
        .unwrap();

        let config = CouncilConfig::from_path(file.path()).unwrap();
        assert!(config.require_rankings);
        assert_eq!(config.chairman, MemberId::new("bravo"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(CouncilConfig::from_path(file.path()).is_err());
    }
}
