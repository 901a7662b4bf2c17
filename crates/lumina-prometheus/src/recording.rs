// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade, so without an installed recorder every helper
//! is a no-op. Core crates call these directly.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Lumina metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "lumina_messages_routed_total",
        "Inbound messages routed, by channel and handling path"
    );
    describe_counter!(
        "lumina_escalations_total",
        "Escalations opened, by reason and priority"
    );
    describe_counter!(
        "lumina_takeover_transitions_total",
        "Takeover session transitions, by kind"
    );
    describe_counter!(
        "lumina_reaper_actions_total",
        "Forced actions taken by the session reaper, by kind"
    );
    describe_counter!(
        "lumina_generator_fallbacks_total",
        "Generator calls that degraded to the fallback reply"
    );
    describe_counter!(
        "lumina_webhook_rejections_total",
        "Inbound webhooks rejected for a bad signature"
    );
    describe_gauge!(
        "lumina_takeover_sessions",
        "Takeover sessions currently held (active or paused)"
    );
    describe_histogram!(
        "lumina_generator_latency_seconds",
        "Reply generator latency in seconds"
    );
}

pub fn record_routed(channel: &str, handled_by: &str) {
    metrics::counter!(
        "lumina_messages_routed_total",
        "channel" => channel.to_string(),
        "handled_by" => handled_by.to_string()
    )
    .increment(1);
}

pub fn record_escalation(reason: &str, priority: &str) {
    metrics::counter!(
        "lumina_escalations_total",
        "reason" => reason.to_string(),
        "priority" => priority.to_string()
    )
    .increment(1);
}

/// `transition` is one of start, pause, resume, transfer, end, reaped.
pub fn record_takeover(transition: &'static str) {
    metrics::counter!("lumina_takeover_transitions_total", "transition" => transition)
        .increment(1);
}

pub fn record_reaper_action(action: &'static str, count: u64) {
    if count > 0 {
        metrics::counter!("lumina_reaper_actions_total", "action" => action).increment(count);
    }
}

pub fn record_generator_latency(seconds: f64) {
    metrics::histogram!("lumina_generator_latency_seconds").record(seconds);
}

pub fn record_generator_fallback(cause: &'static str) {
    metrics::counter!("lumina_generator_fallbacks_total", "cause" => cause).increment(1);
}

pub fn record_webhook_rejected(channel: &'static str) {
    metrics::counter!("lumina_webhook_rejections_total", "channel" => channel).increment(1);
}

pub fn set_takeover_sessions(count: u64) {
    metrics::gauge!("lumina_takeover_sessions").set(count as f64);
}
