// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Lumina conversation control core.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and query modules for
//! conversations, messages, escalations, and takeover sessions that compose
//! inside one transaction.

pub mod adapter;
pub mod database;
pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteConversationStore;
pub use database::Database;
pub use error::SqlResultExt;
pub use models::{fmt_ts, now};
