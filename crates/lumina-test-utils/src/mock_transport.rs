// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock outbound transport that captures deliveries for assertions.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use lumina_core::{
    AdapterType, Channel, HealthStatus, LuminaError, OutboundMessage, OutboundTransport,
    PluginAdapter,
};

/// Accepts every channel and records what it was asked to deliver.
pub struct MockTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
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
impl OutboundTransport for MockTransport {
    fn supports(&self, _channel: Channel) -> bool {
        true
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), LuminaError> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
