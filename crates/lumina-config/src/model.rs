// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Lumina configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LuminaConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Escalation decision thresholds and client-facing handoff text.
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Reply generator endpoint and timeout envelope.
    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub takeover: TakeoverConfig,

    /// Session reaper schedule and thresholds.
    #[serde(default)]
    pub reaper: ReaperConfig,

    /// WhatsApp Cloud API integration.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// HTTP gateway for web chat, webhooks, and operator controls.
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Process identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs and the health endpoint.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "lumina".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("lumina").join("lumina.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("lumina.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Escalation decision engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationConfig {
    /// Generator confidence below this escalates.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Low-confidence escalations below this get `high` priority instead of `medium`.
    #[serde(default = "default_high_priority_below")]
    pub high_priority_below: f32,

    /// Consecutive low-confidence automated replies that count as repeated
    /// failed understanding.
    #[serde(default = "default_repeated_failure_limit")]
    pub repeated_failure_limit: usize,

    /// Sent to the client when a new escalation is opened.
    #[serde(default = "default_handoff_message")]
    pub handoff_message: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            high_priority_below: default_high_priority_below(),
            repeated_failure_limit: default_repeated_failure_limit(),
            handoff_message: default_handoff_message(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_high_priority_below() -> f32 {
    0.3
}

fn default_repeated_failure_limit() -> usize {
    3
}

fn default_handoff_message() -> String {
    "Gracias por tu paciencia. Una persona de nuestro equipo continuará la conversación en breve."
        .to_string()
}

/// Reply generator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// HTTP endpoint of the reply engine. `None` runs with the fallback reply only.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Upper bound for one generation call.
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,

    /// Sent when the generator fails or times out.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// How many recent messages are passed as context.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_generator_timeout_secs(),
            fallback_reply: default_fallback_reply(),
            context_messages: default_context_messages(),
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_generator_timeout_secs() -> u64 {
    20
}

fn default_fallback_reply() -> String {
    "En este momento no puedo responder. Un miembro de nuestro equipo te atenderá pronto."
        .to_string()
}

fn default_context_messages() -> usize {
    10
}

/// Takeover session manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TakeoverConfig {
    /// Capacity of the operator event broadcast buffer.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for TakeoverConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_event_buffer() -> usize {
    256
}

/// Session reaper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReaperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,

    /// Takeover sessions idle this long are ended.
    #[serde(default = "default_session_inactivity_mins")]
    pub session_inactivity_mins: u64,

    /// Pending escalations older than this are resolved as abandoned.
    #[serde(default = "default_pending_escalation_max_age_hours")]
    pub pending_escalation_max_age_hours: u64,

    /// Conversations idle this long, with nothing open, are closed.
    #[serde(default = "default_conversation_idle_close_hours")]
    pub conversation_idle_close_hours: u64,

    /// Resolved escalations older than this many days are scrubbed. Disabled when unset.
    #[serde(default)]
    pub retention_days: Option<u64>,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reaper_interval_secs(),
            session_inactivity_mins: default_session_inactivity_mins(),
            pending_escalation_max_age_hours: default_pending_escalation_max_age_hours(),
            conversation_idle_close_hours: default_conversation_idle_close_hours(),
            retention_days: None,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_reaper_interval_secs() -> u64 {
    900
}

fn default_session_inactivity_mins() -> u64 {
    60
}

fn default_pending_escalation_max_age_hours() -> u64 {
    48
}

fn default_conversation_idle_close_hours() -> u64 {
    24
}

/// WhatsApp Cloud API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Meta app secret used to verify `X-Hub-Signature-256`. Required when enabled.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Token echoed back during the webhook verification handshake.
    #[serde(default)]
    pub verify_token: Option<String>,

    /// Graph API access token for outbound messages.
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub phone_number_id: Option<String>,

    #[serde(default = "default_whatsapp_api_base_url")]
    pub api_base_url: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_secret: None,
            verify_token: None,
            access_token: None,
            phone_number_id: None,
            api_base_url: default_whatsapp_api_base_url(),
        }
    }
}

fn default_whatsapp_api_base_url() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Off by default; enabling it requires `bearer_token`.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for operator and web-chat endpoints. Required when enabled.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3100
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enabled: bool,
}
