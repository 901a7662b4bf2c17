// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply generator trait for the automated response engine.

use async_trait::async_trait;

use crate::error::LuminaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{GeneratedReply, ReplyContext};

/// Produces a candidate reply plus a confidence signal for a client message.
///
/// Callers bound every call with a timeout and replace failures with a
/// low-confidence fallback; implementations may simply return errors.
#[async_trait]
pub trait ReplyGenerator: PluginAdapter {
    async fn generate(
        &self,
        message: &str,
        context: &ReplyContext,
    ) -> Result<GeneratedReply, LuminaError>;
}
