// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the ConversationStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use lumina_config::model::StorageConfig;
use lumina_core::{
    AdapterType, Channel, Conversation, ConversationStatus, ConversationStore, HealthStatus,
    LuminaError, Message, NewMessage, PluginAdapter,
};

use crate::database::Database;
use crate::error::SqlResultExt;
use crate::models::now;
use crate::queries::{conversations, messages};

/// SQLite-backed conversation store.
///
/// Shares its [`Database`] handle with the ledger and takeover manager so all
/// of them go through the same writer thread.
#[derive(Clone)]
pub struct SqliteConversationStore {
    db: Database,
}

impl SqliteConversationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the database described by `config` and wrap it.
    pub async fn open(config: &StorageConfig) -> Result<Self, LuminaError> {
        let db = Database::open_with(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite conversation store initialized");
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl PluginAdapter for SqliteConversationStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, LuminaError> {
        self.db
            .read(|conn| conn.execute_batch("SELECT 1;").sql())
            .await?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LuminaError> {
        self.db
            .read(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);").sql())
            .await?;
        debug!("shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn open_conversation(
        &self,
        client_ref: &str,
        channel: Channel,
    ) -> Result<Conversation, LuminaError> {
        let client_ref = client_ref.to_string();
        self.db
            .write(move |tx| conversations::open_or_create(tx, &client_ref, channel, now()))
            .await
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation, LuminaError> {
        let id = id.to_string();
        self.db.read(move |conn| conversations::get(conn, &id)).await
    }

    async fn set_status(&self, id: &str, status: ConversationStatus) -> Result<(), LuminaError> {
        let id = id.to_string();
        self.db
            .write(move |tx| conversations::set_status(tx, &id, status))
            .await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> Result<Message, LuminaError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .write(move |tx| messages::append(tx, &conversation_id, &message, now()))
            .await
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, LuminaError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .read(move |conn| messages::list(conn, &conversation_id, limit))
            .await
    }

    async fn recent_confidences(
        &self,
        conversation_id: &str,
        count: usize,
    ) -> Result<Vec<f32>, LuminaError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .read(move |conn| messages::recent_automated_confidences(conn, &conversation_id, count))
            .await
    }

    async fn touch(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<(), LuminaError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .write(move |tx| conversations::touch(tx, &conversation_id, at))
            .await
    }
}
