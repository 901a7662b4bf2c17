// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound transport trait (WhatsApp delivery, web push).

use async_trait::async_trait;

use crate::error::LuminaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Channel, OutboundMessage};

/// Pushes a message to the client. Fire-and-log: delivery failures never
/// change control state.
#[async_trait]
pub trait OutboundTransport: PluginAdapter {
    /// Whether this transport delivers on the given channel.
    fn supports(&self, channel: Channel) -> bool;

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), LuminaError>;
}
