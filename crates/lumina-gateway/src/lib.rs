// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Lumina conversation control core.
//!
//! Serves the web chat entry point, the WhatsApp Cloud API webhook, and the
//! operator API for takeover sessions and the escalation ledger. Operator and
//! chat routes sit behind bearer auth; health, metrics, and the webhook (which
//! carries its own HMAC signature) are public.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod operator;
pub mod server;
pub mod webhook;

pub use error::ApiError;
pub use server::{GatewayState, HealthState, ServerConfig, WhatsAppWebhook, app, start_server};
pub use webhook::InboundQueue;
