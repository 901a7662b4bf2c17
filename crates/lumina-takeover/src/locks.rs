// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation mutual exclusion.
//!
//! Every mutation of a conversation's control state (inbound routing and
//! operator transitions) runs while holding that conversation's lock, so
//! transitions are linearizable per conversation. Different conversations
//! never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared registry of per-conversation async mutexes. Cheap to clone.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and acquire the lock for `conversation_id`.
    pub async fn lock(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .inner
            .entry(conversation_id.to_string())
            .or_default()
            .clone();
        mutex.lock_owned().await
    }

    /// Drop entries nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.inner.len();
        // The map holds one reference; any other means a holder or waiter.
        self.inner.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.inner.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
