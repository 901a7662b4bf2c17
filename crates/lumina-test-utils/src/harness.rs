// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete control core (store, ledger,
//! takeover manager, router, reaper) over a temp SQLite database with mock
//! generator and transport. `send()` drives the full inbound path.

use std::sync::Arc;

use lumina_config::model::{LuminaConfig, StorageConfig};
use lumina_core::{
    Channel, ConversationStore, InboundMessage, LuminaError, Message, OutboundTransport,
    ReplyGenerator,
};
use lumina_escalation::EscalationLedger;
use lumina_router::{GuardedGenerator, MessageRouter, RouteOutcome};
use lumina_storage::{Database, SqliteConversationStore};
use lumina_takeover::{Outbound, SessionReaper, TakeoverManager};

use crate::mock_generator::MockGenerator;
use crate::mock_transport::MockTransport;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: LuminaConfig,
    generator: MockGenerator,
    with_generator: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: LuminaConfig::default(),
            generator: MockGenerator::new(),
            with_generator: true,
        }
    }

    /// Use this configuration; the storage section is replaced by the temp DB.
    pub fn with_config(mut self, config: LuminaConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_generator(mut self, generator: MockGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Run with no generator configured, so every reply takes the fallback path.
    pub fn without_generator(mut self) -> Self {
        self.with_generator = false;
        self
    }

    pub async fn build(self) -> Result<TestHarness, LuminaError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| LuminaError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db").to_string_lossy().to_string();

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.clone(),
            wal_mode: true,
        };

        let db = Database::open(&db_path).await?;
        let store = Arc::new(SqliteConversationStore::new(db.clone()));
        let ledger = EscalationLedger::new(db.clone());

        let transport = Arc::new(MockTransport::new());
        let outbound = Outbound::new(vec![transport.clone() as Arc<dyn OutboundTransport>]);
        let manager = TakeoverManager::new(db.clone(), &config.takeover).with_outbound(outbound);

        let generator = Arc::new(self.generator);
        let inner = self
            .with_generator
            .then(|| generator.clone() as Arc<dyn ReplyGenerator>);
        let guarded = GuardedGenerator::new(inner, &config.generator);

        let router = Arc::new(MessageRouter::new(
            store.clone() as Arc<dyn ConversationStore>,
            manager.clone(),
            ledger.clone(),
            guarded,
            &config.escalation,
            &config.generator,
        ));

        Ok(TestHarness {
            generator,
            transport,
            db,
            store,
            ledger,
            manager,
            router,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete control core over temp storage.
pub struct TestHarness {
    pub generator: Arc<MockGenerator>,
    /// Captures every outbound delivery, on any channel.
    pub transport: Arc<MockTransport>,
    pub db: Database,
    pub store: Arc<SqliteConversationStore>,
    pub ledger: EscalationLedger,
    pub manager: TakeoverManager,
    pub router: Arc<MessageRouter>,
    pub config: LuminaConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Route a client message arriving on `channel`.
    pub async fn send(
        &self,
        channel: Channel,
        client_ref: &str,
        text: &str,
    ) -> Result<RouteOutcome, LuminaError> {
        self.router
            .route(InboundMessage {
                channel,
                client_ref: client_ref.to_string(),
                content: text.to_string(),
                media_ref: None,
                external_id: None,
                received_at: chrono::Utc::now(),
            })
            .await
    }

    /// Route a web chat message.
    pub async fn send_web(&self, client_ref: &str, text: &str) -> Result<RouteOutcome, LuminaError> {
        self.send(Channel::Web, client_ref, text).await
    }

    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, LuminaError> {
        self.store.list_messages(conversation_id, None).await
    }

    /// A reaper using the harness configuration's thresholds.
    pub fn reaper(&self) -> SessionReaper {
        SessionReaper::new(
            self.manager.clone(),
            self.ledger.clone(),
            self.config.reaper.clone(),
        )
    }
}
