// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message routing for the Lumina conversation control core.
//!
//! - [`MessageRouter`]: decides per message whether the automated agent or
//!   the human holding the conversation answers.
//! - [`GuardedGenerator`]: timeout-bounded reply generation with fallback.
//! - [`HttpReplyGenerator`]: JSON-over-HTTP client for the external reply engine.

pub mod generator;
pub mod router;

pub use generator::{Generation, GuardedGenerator, HttpReplyGenerator};
pub use router::{MessageRouter, RouteOutcome};
