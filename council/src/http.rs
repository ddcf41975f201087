//! OpenAI-compatible HTTP invoker.
//!
//! Treats the member id as the model name on a chat-completions endpoint,
//! which covers OpenRouter, llama.cpp server, vLLM, and most gateways.
//! Wire-protocol details stay here; the engine only sees [`MemberInvoker`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::member::{InvokeError, MemberId, MemberInvoker};

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpInvokerConfig {
    /// Base URL up to but excluding `/chat/completions`.
    pub base_url: String,
    /// Bearer token; `None` is accepted at build time and rejected per call.
    pub api_key: Option<String>,
    /// Transport-level timeout. The engine applies its own per-member and
    /// global bounds on top of this.
    pub request_timeout: Duration,
}

impl Default for HttpInvokerConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("COUNCIL_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".into()),
            api_key: std::env::var("COUNCIL_API_KEY").ok(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// [`MemberInvoker`] over an OpenAI-compatible HTTP API.
pub struct HttpInvoker {
    config: HttpInvokerConfig,
    client: reqwest::Client,
}

impl HttpInvoker {
    pub fn new(config: HttpInvokerConfig) -> Result<Self, InvokeError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| InvokeError::Unavailable(format!("http client build failed: {e}")))?;
        Ok(Self { config, client })
    }

    /// Build from `COUNCIL_BASE_URL` / `COUNCIL_API_KEY`.
    pub fn from_env() -> Result<Self, InvokeError> {
        Self::new(HttpInvokerConfig::default())
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl MemberInvoker for HttpInvoker {
    async fn invoke(&self, member: &MemberId, prompt: &str) -> Result<String, InvokeError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| InvokeError::MissingCredentials(member.to_string()))?;

        let request_body = serde_json::json!({
            "model": member.as_str(),
            "messages": [{"role": "user", "content": prompt}],
        });

        let url = self.completions_url();
        debug!(member = %member, url = %url, "dispatching member call");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| InvokeError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InvokeError::RequestFailed(format!(
                "{url} returned {status}: {body}"
            )));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InvokeError::MalformedResponse(e.to_string()))?;

        resp_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                InvokeError::MalformedResponse("no message content in completion".to_string())
            })
    }
}
