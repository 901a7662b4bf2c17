// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery through the WhatsApp Cloud API.

use std::time::Duration;

use async_trait::async_trait;
use lumina_config::model::WhatsAppConfig;
use lumina_core::{
    AdapterType, Channel, HealthStatus, LuminaError, OutboundMessage, OutboundTransport,
    PluginAdapter,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::debug;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextPayload<'a>,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    preview_url: bool,
    body: &'a str,
}

/// Sends text messages to `{api_base_url}/{phone_number_id}/messages`.
#[derive(Debug, Clone)]
pub struct WhatsAppTransport {
    client: reqwest::Client,
    url: String,
}

impl WhatsAppTransport {
    pub fn new(api_base_url: &str, phone_number_id: &str, access_token: &str) -> Result<Self, LuminaError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|e| LuminaError::Config(format!("invalid whatsapp access_token: {e}")))?;
        headers.insert(AUTHORIZATION, value);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| LuminaError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!(
                "{}/{}/messages",
                api_base_url.trim_end_matches('/'),
                phone_number_id
            ),
        })
    }

    /// Build from config. `None` when the channel is disabled.
    pub fn from_config(config: &WhatsAppConfig) -> Result<Option<Self>, LuminaError> {
        if !config.enabled {
            return Ok(None);
        }
        let phone = config
            .phone_number_id
            .as_deref()
            .ok_or_else(|| LuminaError::Config("whatsapp.phone_number_id is required".into()))?;
        let token = config
            .access_token
            .as_deref()
            .ok_or_else(|| LuminaError::Config("whatsapp.access_token is required".into()))?;
        Self::new(&config.api_base_url, phone, token).map(Some)
    }
}

fn channel_error(message: String, source: Option<reqwest::Error>) -> LuminaError {
    LuminaError::Channel {
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

#[async_trait]
impl PluginAdapter for WhatsAppTransport {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, LuminaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LuminaError> {
        Ok(())
    }
}

#[async_trait]
impl OutboundTransport for WhatsAppTransport {
    fn supports(&self, channel: Channel) -> bool {
        channel == Channel::Whatsapp
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), LuminaError> {
        let body = SendRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: &message.client_ref,
            kind: "text",
            text: TextPayload {
                preview_url: false,
                body: &message.content,
            },
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| channel_error(format!("whatsapp send failed: {e}"), Some(e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(channel_error(
                format!("whatsapp send returned {status}: {detail}"),
                None,
            ));
        }
        debug!(
            conversation_id = %message.conversation_id,
            to = %message.client_ref,
            "whatsapp message sent"
        );
        Ok(())
    }
}
