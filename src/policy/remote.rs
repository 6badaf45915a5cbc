//! Remote decision advisor behind the [`DecisionPolicy`] trait.
//!
//! The advisor POSTs the observation to an OpenAI-style chat endpoint and
//! expects one action token back. Every failure mode (transport, timeout,
//! HTTP status, unparseable body) surfaces as an `Err`; the agent treats
//! that as Explore and raises an alarm, so a dead advisor degrades the
//! swarm but never stops it.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::{DecisionPolicy, PolicyAction, PolicyObservation};
use crate::config::AdvisorConfig;

/// Transport seam so tests can stand in for the HTTP round trip.
#[async_trait]
pub trait AdvisorTransport: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    config: AdvisorConfig,
}

impl HttpTransport {
    pub fn new(config: AdvisorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("building advisor http client")?;
        Ok(HttpTransport { client, config })
    }
}

#[async_trait]
impl AdvisorTransport for HttpTransport {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You direct a drug-delivery agent inside a tumor. \
                                Reply with exactly one token: target, follow_trail, \
                                explore, or return."
                },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": 8,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("advisor request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("advisor returned status {}", response.status()));
        }
        let parsed: serde_json::Value =
            response.json().await.context("advisor response not json")?;
        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("advisor response missing content"))
    }
}

/// Bridges the synchronous step loop to the async transport. Owns its own
/// runtime; one blocking call per decision, bounded by the configured
/// timeout.
pub struct RemoteAdvisor<T: AdvisorTransport = HttpTransport> {
    runtime: tokio::runtime::Runtime,
    transport: T,
    timeout: Duration,
}

impl RemoteAdvisor<HttpTransport> {
    pub fn new(config: AdvisorConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let transport = HttpTransport::new(config)?;
        RemoteAdvisor::with_transport(transport, timeout)
    }
}

impl<T: AdvisorTransport> RemoteAdvisor<T> {
    pub fn with_transport(transport: T, timeout: Duration) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building advisor runtime")?;
        Ok(RemoteAdvisor {
            runtime,
            transport,
            timeout,
        })
    }
}

impl<T: AdvisorTransport> DecisionPolicy for RemoteAdvisor<T> {
    fn decide(&self, observation: &PolicyObservation) -> anyhow::Result<PolicyAction> {
        let prompt =
            serde_json::to_string(observation).context("serializing observation")?;
        let reply = self.runtime.block_on(async {
            tokio::time::timeout(self.timeout, self.transport.complete(&prompt))
                .await
                .map_err(|_| anyhow!("advisor timed out after {:?}", self.timeout))?
        });
        match reply {
            Ok(token) => {
                debug!(token = %token, "advisor replied");
                Ok(PolicyAction::from_token(&token))
            }
            Err(e) => {
                warn!(error = %e, "advisor call failed");
                Err(e)
            }
        }
    }
}
