// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! All failures are collected; validation does not stop at the first one.

use crate::diagnostic::ConfigError;
use crate::model::LuminaConfig;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &LuminaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path", "must not be empty"));
    }

    let esc = &config.escalation;
    for (key, value) in [
        ("escalation.confidence_threshold", esc.confidence_threshold),
        ("escalation.high_priority_below", esc.high_priority_below),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            errors.push(ConfigError::invalid(
                key,
                format!("must be in (0, 1], got {value}"),
            ));
        }
    }
    if esc.high_priority_below > esc.confidence_threshold {
        errors.push(ConfigError::invalid(
            "escalation.high_priority_below",
            format!(
                "must not exceed confidence_threshold ({}), got {}",
                esc.confidence_threshold, esc.high_priority_below
            ),
        ));
    }
    if esc.repeated_failure_limit == 0 {
        errors.push(ConfigError::invalid(
            "escalation.repeated_failure_limit",
            "must be at least 1",
        ));
    }
    if esc.handoff_message.trim().is_empty() {
        errors.push(ConfigError::invalid("escalation.handoff_message", "must not be empty"));
    }

    if config.generator.timeout_secs == 0 {
        errors.push(ConfigError::invalid("generator.timeout_secs", "must be at least 1"));
    }
    if config.generator.fallback_reply.trim().is_empty() {
        errors.push(ConfigError::invalid("generator.fallback_reply", "must not be empty"));
    }
    if let Some(endpoint) = &config.generator.endpoint
        && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
    {
        errors.push(ConfigError::invalid(
            "generator.endpoint",
            format!("`{endpoint}` is not an http(s) URL"),
        ));
    }

    if config.takeover.event_buffer == 0 {
        errors.push(ConfigError::invalid("takeover.event_buffer", "must be at least 1"));
    }

    let reaper = &config.reaper;
    for (key, value) in [
        ("reaper.interval_secs", reaper.interval_secs),
        ("reaper.session_inactivity_mins", reaper.session_inactivity_mins),
        (
            "reaper.pending_escalation_max_age_hours",
            reaper.pending_escalation_max_age_hours,
        ),
        (
            "reaper.conversation_idle_close_hours",
            reaper.conversation_idle_close_hours,
        ),
    ] {
        if value == 0 {
            errors.push(ConfigError::invalid(key, "must be at least 1"));
        }
    }
    if reaper.pending_escalation_max_age_hours.saturating_mul(60) < reaper.session_inactivity_mins {
        errors.push(ConfigError::invalid(
            "reaper.pending_escalation_max_age_hours",
            "must cover at least session_inactivity_mins",
        ));
    }
    if reaper.retention_days == Some(0) {
        errors.push(ConfigError::invalid(
            "reaper.retention_days",
            "must be at least 1 when set",
        ));
    }

    let wa = &config.whatsapp;
    if wa.enabled {
        for (key, value) in [
            ("whatsapp.app_secret", &wa.app_secret),
            ("whatsapp.verify_token", &wa.verify_token),
            ("whatsapp.access_token", &wa.access_token),
            ("whatsapp.phone_number_id", &wa.phone_number_id),
        ] {
            if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                errors.push(ConfigError::invalid(key, "required when whatsapp is enabled"));
            }
        }
    }

    let gw = &config.gateway;
    if gw.enabled {
        if gw.bearer_token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            errors.push(ConfigError::invalid(
                "gateway.bearer_token",
                "required when the gateway is enabled",
            ));
        }
        if gw.host.trim().is_empty() {
            errors.push(ConfigError::invalid("gateway.host", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
