// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All access is serialized through tokio-rusqlite's single background thread,
//! so a closure passed to [`Database::write`] sees no interleaved writers.
//! Do NOT create additional Connection instances for writes.

use lumina_core::LuminaError;
use rusqlite::TransactionBehavior;
use tracing::{debug, info};

use crate::error::{SqlResultExt, map_tr_err, storage_err, tr_err};

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Handle to the SQLite database. Cheap to clone; clones share the writer thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database file, apply PRAGMAs, and run migrations.
    pub async fn open(path: &str) -> Result<Self, LuminaError> {
        Self::open_with(path, true).await
    }

    /// Like [`Database::open`] with explicit control over WAL mode.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, LuminaError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(tr_err)?;
        let db = Self { conn };
        db.init(wal_mode).await?;
        info!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// In-memory database for tests and one-shot tooling.
    pub async fn open_in_memory() -> Result<Self, LuminaError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(tr_err)?;
        let db = Self { conn };
        db.init(false).await?;
        Ok(db)
    }

    async fn init(&self, wal_mode: bool) -> Result<(), LuminaError> {
        self.conn
            .call(move |conn| -> Result<(), LuminaError> {
                if wal_mode {
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                        row.get::<_, String>(0)
                    })
                    .sql()?;
                    conn.pragma_update(None, "synchronous", "NORMAL").sql()?;
                }
                conn.pragma_update(None, "foreign_keys", "ON").sql()?;
                conn.busy_timeout(BUSY_TIMEOUT).sql()?;
                crate::migrations::run_migrations(conn)
            })
            .await
            .map_err(map_tr_err)
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Run a read-only closure on the writer thread.
    pub async fn read<F, R>(&self, f: F) -> Result<R, LuminaError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<R, LuminaError> + Send + 'static,
        R: Send + 'static,
    {
        self.conn
            .call(move |conn| f(conn))
            .await
            .map_err(map_tr_err)
    }

    /// Run a closure inside one IMMEDIATE transaction.
    ///
    /// Commits when the closure returns `Ok`; any `Err` rolls back every
    /// statement the closure executed.
    pub async fn write<F, R>(&self, f: F) -> Result<R, LuminaError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<R, LuminaError> + Send + 'static,
        R: Send + 'static,
    {
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .sql()?;
                let out = f(&tx)?;
                tx.commit().sql()?;
                Ok(out)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), LuminaError> {
        self.conn
            .call(|conn| -> Result<(), LuminaError> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);").sql()
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(tr_err)?;
        debug!("database closed");
        Ok(())
    }
}
