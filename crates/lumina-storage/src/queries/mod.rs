// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table.
//!
//! Every function takes a borrowed `rusqlite::Connection` so callers can
//! compose several of them inside one [`crate::Database::write`] transaction.

pub mod conversations;
pub mod escalations;
pub mod messages;
pub mod takeovers;
