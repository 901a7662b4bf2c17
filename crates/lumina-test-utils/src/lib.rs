// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Lumina integration tests.
//!
//! Provides mock adapters and a harness that wires the full control core
//! over a temp SQLite database, for fast deterministic tests without
//! external services.
//!
//! # Components
//!
//! - [`MockGenerator`] - Reply generator with a scripted reply queue
//! - [`MockTransport`] - Outbound transport that captures deliveries
//! - [`TestHarness`] - Router, ledger, takeover manager, and reaper on one database

pub mod harness;
pub mod mock_generator;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_generator::MockGenerator;
pub use mock_transport::MockTransport;
