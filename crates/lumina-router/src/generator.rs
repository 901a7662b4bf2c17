// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply generation: the HTTP client for the external reply engine and the
//! guard that bounds every call with a timeout.
//!
//! The guard never fails. A slow, failing, or missing generator degrades to
//! the configured fallback reply with zero confidence, which the decision
//! engine then turns into a low-confidence escalation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lumina_config::model::GeneratorConfig;
use lumina_core::{
    AdapterType, EscalationReason, GeneratedReply, HealthStatus, LuminaError, PluginAdapter,
    ReplyContext, ReplyGenerator, SenderRole,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A generator result plus whether it came from the fallback path.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub reply: GeneratedReply,
    pub degraded: bool,
}

/// Timeout-bounded wrapper around an optional [`ReplyGenerator`].
#[derive(Clone)]
pub struct GuardedGenerator {
    inner: Option<Arc<dyn ReplyGenerator>>,
    timeout: Duration,
    fallback: String,
}

impl GuardedGenerator {
    pub fn new(inner: Option<Arc<dyn ReplyGenerator>>, config: &GeneratorConfig) -> Self {
        Self {
            inner,
            timeout: config.timeout(),
            fallback: config.fallback_reply.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn generate(&self, message: &str, context: &ReplyContext) -> Generation {
        let Some(inner) = &self.inner else {
            lumina_prometheus::record_generator_fallback("unconfigured");
            return self.fallback();
        };

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, inner.generate(message, context)).await;
        lumina_prometheus::record_generator_latency(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(mut reply)) if !reply.text.trim().is_empty() => {
                reply.confidence = if reply.confidence.is_nan() {
                    0.0
                } else {
                    reply.confidence.clamp(0.0, 1.0)
                };
                debug!(
                    conversation_id = %context.conversation_id,
                    confidence = reply.confidence,
                    "reply generated"
                );
                Generation {
                    reply,
                    degraded: false,
                }
            }
            Ok(Ok(_)) => {
                warn!(conversation_id = %context.conversation_id, "generator returned an empty reply");
                lumina_prometheus::record_generator_fallback("empty");
                self.fallback()
            }
            Ok(Err(e)) => {
                warn!(conversation_id = %context.conversation_id, error = %e, "generator failed");
                lumina_prometheus::record_generator_fallback("error");
                self.fallback()
            }
            Err(_) => {
                warn!(
                    conversation_id = %context.conversation_id,
                    timeout = ?self.timeout,
                    "generator timed out"
                );
                lumina_prometheus::record_generator_fallback("timeout");
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> Generation {
        Generation {
            reply: GeneratedReply {
                text: self.fallback.clone(),
                confidence: 0.0,
                escalate: None,
            },
            degraded: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    conversation_id: &'a str,
    channel: String,
    message: &'a str,
    history: Vec<HistoryEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry<'a> {
    role: SenderRole,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
    confidence: f32,
    #[serde(default)]
    escalate: Option<EscalationReason>,
}

/// JSON-over-HTTP client for the external reply engine.
///
/// `POST {endpoint}` with `{conversation_id, channel, message, history}`;
/// expects `{text, confidence, escalate?}` back.
#[derive(Debug, Clone)]
pub struct HttpReplyGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReplyGenerator {
    pub fn new(endpoint: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, LuminaError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| LuminaError::Config(format!("invalid generator api_key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| LuminaError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Build from config. `None` when no endpoint is configured.
    pub fn from_config(config: &GeneratorConfig) -> Result<Option<Self>, LuminaError> {
        config
            .endpoint
            .as_deref()
            .map(|endpoint| Self::new(endpoint, config.api_key.as_deref(), config.timeout()))
            .transpose()
    }
}

fn degraded(message: String, source: Option<reqwest::Error>) -> LuminaError {
    LuminaError::UpstreamDegraded {
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

#[async_trait]
impl PluginAdapter for HttpReplyGenerator {
    fn name(&self) -> &str {
        "http-generator"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generator
    }

    async fn health_check(&self) -> Result<HealthStatus, LuminaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LuminaError> {
        Ok(())
    }
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    async fn generate(
        &self,
        message: &str,
        context: &ReplyContext,
    ) -> Result<GeneratedReply, LuminaError> {
        let body = GenerateRequest {
            conversation_id: &context.conversation_id,
            channel: context.channel.to_string(),
            message,
            history: context
                .history
                .iter()
                .map(|m| HistoryEntry {
                    role: m.sender,
                    content: &m.content,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| degraded(format!("generator request failed: {e}"), Some(e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(degraded(format!("generator returned {status}: {text}"), None));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| degraded(format!("malformed generator response: {e}"), Some(e)))?;
        Ok(GeneratedReply {
            text: parsed.text,
            confidence: parsed.confidence,
            escalate: parsed.escalate,
        })
    }
}
