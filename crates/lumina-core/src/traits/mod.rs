// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the collaborators the control core consumes.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod generator;
pub mod store;
pub mod transport;

pub use adapter::PluginAdapter;
pub use generator::ReplyGenerator;
pub use store::ConversationStore;
pub use transport::OutboundTransport;
