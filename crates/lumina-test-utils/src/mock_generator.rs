// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock reply generator for deterministic testing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use lumina_core::{
    AdapterType, EscalationReason, GeneratedReply, HealthStatus, LuminaError, PluginAdapter,
    ReplyContext, ReplyGenerator,
};

/// Default reply when the queue is empty.
pub const DEFAULT_REPLY: &str = "Con gusto te ayudo.";

enum Step {
    Reply(GeneratedReply),
    Fail,
}

/// A generator that pops scripted replies from a FIFO queue.
///
/// When the queue is empty a confident [`DEFAULT_REPLY`] is returned.
pub struct MockGenerator {
    steps: Arc<Mutex<VecDeque<Step>>>,
    calls: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            steps: Arc::new(Mutex::new(VecDeque::new())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_replies(replies: Vec<GeneratedReply>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(replies.into_iter().map(Step::Reply).collect())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Shorthand for a reply without an escalation hint.
    pub fn reply(text: &str, confidence: f32) -> GeneratedReply {
        GeneratedReply {
            text: text.to_string(),
            confidence,
            escalate: None,
        }
    }

    /// Shorthand for a reply that asks for escalation.
    pub fn hinted(text: &str, confidence: f32, reason: EscalationReason) -> GeneratedReply {
        GeneratedReply {
            text: text.to_string(),
            confidence,
            escalate: Some(reason),
        }
    }

    pub async fn push(&self, reply: GeneratedReply) {
        self.steps.lock().await.push_back(Step::Reply(reply));
    }

    /// Make the next queued call fail with `UpstreamDegraded`.
    pub async fn push_failure(&self) {
        self.steps.lock().await.push_back(Step::Fail);
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
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
impl ReplyGenerator for MockGenerator {
    async fn generate(
        &self,
        _message: &str,
        _context: &ReplyContext,
    ) -> Result<GeneratedReply, LuminaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.steps.lock().await.pop_front() {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail) => Err(LuminaError::UpstreamDegraded {
                message: "mock generator failure".into(),
                source: None,
            }),
            None => Ok(Self::reply(DEFAULT_REPLY, 0.95)),
        }
    }
}
