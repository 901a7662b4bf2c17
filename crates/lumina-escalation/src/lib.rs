// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Escalation decision engine and escalation ledger.
//!
//! The [`DecisionEngine`] is pure: it classifies one exchange and returns an
//! [`EscalationRequest`](lumina_core::EscalationRequest) or nothing. The
//! [`EscalationLedger`] materializes requests and owns the escalation status
//! lifecycle.

pub mod decision;
pub mod ledger;

pub use decision::{ConversationSignals, Decision, DecisionConfig, DecisionEngine, Signal};
pub use ledger::{ABANDONED_NOTE, EscalationLedger, STALE_NOTE};
