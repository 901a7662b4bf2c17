// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API channel: webhook verification and parsing on the way
//! in, Graph API delivery on the way out.

pub mod transport;
pub mod webhook;

pub use transport::WhatsAppTransport;
pub use webhook::{SIGNATURE_HEADER, parse_webhook, sign, verify_signature, verify_subscription};
