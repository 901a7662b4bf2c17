// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot maintenance commands: `sweep`, `cleanup`, `stats`.

use lumina_config::model::LuminaConfig;
use lumina_core::LuminaError;
use lumina_takeover::SessionReaper;
use serde_json::json;
use tracing::info;

use crate::serve::build_core;

fn print_json(value: &serde_json::Value) -> Result<(), LuminaError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| LuminaError::Internal(format!("failed to render output: {e}")))?;
    println!("{text}");
    Ok(())
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, LuminaError> {
    serde_json::to_value(value)
        .map_err(|e| LuminaError::Internal(format!("failed to render output: {e}")))
}

/// Runs one reaper sweep with the configured thresholds.
pub async fn run_sweep(config: &LuminaConfig) -> Result<(), LuminaError> {
    let core = build_core(config).await?;
    let reaper = SessionReaper::new(core.manager, core.ledger, config.reaper.clone());
    let report = reaper.sweep().await?;
    info!(empty = report.is_empty(), "manual sweep finished");
    print_json(&to_value(&report)?)?;
    core.db.close().await
}

/// Resolves open escalations older than `hours`.
pub async fn run_cleanup(config: &LuminaConfig, hours: u64) -> Result<(), LuminaError> {
    let core = build_core(config).await?;
    let expired = core.ledger.expire_stale(hours).await?;
    print_json(&json!({ "expired": expired, "hours_threshold": hours }))?;
    core.db.close().await
}

/// Prints ledger statistics.
pub async fn run_stats(config: &LuminaConfig) -> Result<(), LuminaError> {
    let core = build_core(config).await?;
    let stats = core.ledger.stats().await?;
    print_json(&to_value(&stats)?)?;
    core.db.close().await
}
