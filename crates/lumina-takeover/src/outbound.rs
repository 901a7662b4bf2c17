// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-log delivery to client channels.

use std::sync::Arc;

use lumina_core::{OutboundMessage, OutboundTransport};
use tracing::{debug, warn};

/// The set of registered outbound transports. Delivery failures are logged,
/// never propagated: the message is already appended to the conversation.
#[derive(Clone, Default)]
pub struct Outbound {
    transports: Vec<Arc<dyn OutboundTransport>>,
}

impl Outbound {
    pub fn new(transports: Vec<Arc<dyn OutboundTransport>>) -> Self {
        Self { transports }
    }

    pub fn register(&mut self, transport: Arc<dyn OutboundTransport>) {
        self.transports.push(transport);
    }

    /// Returns true when a transport accepted the message.
    pub async fn deliver(&self, message: &OutboundMessage) -> bool {
        let Some(transport) = self.transports.iter().find(|t| t.supports(message.channel)) else {
            // Web chat replies travel back in the HTTP response.
            debug!(
                conversation_id = %message.conversation_id,
                channel = %message.channel,
                "no push transport for channel"
            );
            return false;
        };
        match transport.deliver(message).await {
            Ok(()) => {
                debug!(
                    conversation_id = %message.conversation_id,
                    transport = transport.name(),
                    "message delivered"
                );
                true
            }
            Err(e) => {
                warn!(
                    conversation_id = %message.conversation_id,
                    transport = transport.name(),
                    error = %e,
                    "outbound delivery failed"
                );
                false
            }
        }
    }
}
