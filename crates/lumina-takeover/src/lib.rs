// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Takeover session manager and session reaper.
//!
//! [`TakeoverManager`] owns the per-conversation control state machine and
//! shares its [`ConversationLocks`] with the message router so inbound routing
//! and operator transitions are linearizable per conversation.
//! [`SessionReaper`] reclaims abandoned sessions and stale escalations.

pub mod events;
pub mod locks;
pub mod manager;
pub mod outbound;
pub mod reaper;

pub use events::{EventFeed, OperatorEvent};
pub use locks::ConversationLocks;
pub use manager::{TakeoverManager, read_control_state};
pub use outbound::Outbound;
pub use reaper::{REAPED_NOTE, SessionReaper, SweepReport};
