// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./lumina.toml` > `~/.config/lumina/lumina.toml` > `/etc/lumina/lumina.toml`
//! with environment variable overrides via `LUMINA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::LuminaConfig;

/// Top-level config sections addressable from the environment.
const SECTIONS: &[&str] = &[
    "escalation",
    "prometheus",
    "generator",
    "whatsapp",
    "takeover",
    "gateway",
    "storage",
    "reaper",
    "agent",
];

/// `~/.config/lumina/lumina.toml`, when a config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lumina").join("lumina.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/lumina/lumina.toml`
/// 3. `~/.config/lumina/lumina.toml`
/// 4. `./lumina.toml`
/// 5. `LUMINA_*` environment variables
pub fn load_config() -> Result<LuminaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<LuminaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LuminaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LuminaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LuminaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LuminaConfig::default()))
        .merge(Toml::file(crate::SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(crate::LOCAL_CONFIG))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env key to its dotted config path.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `reaper_session_inactivity_mins` maps to `reaper.session_inactivity_mins`.
/// Keys outside any known section are passed through unchanged and rejected
/// later by `deny_unknown_fields`.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
            .filter(|r| !r.is_empty())
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("LUMINA_").map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(
            map_env_key("reaper_session_inactivity_mins"),
            "reaper.session_inactivity_mins"
        );
        assert_eq!(map_env_key("whatsapp_app_secret"), "whatsapp.app_secret");
        assert_eq!(
            map_env_key("escalation_confidence_threshold"),
            "escalation.confidence_threshold"
        );
        assert_eq!(map_env_key("gateway_bearer_token"), "gateway.bearer_token");
    }

    #[test]
    fn uppercase_env_vars_override_sections() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LUMINA_REAPER_INTERVAL_SECS", "120");
            jail.set_env("LUMINA_WHATSAPP_APP_SECRET", "shh");
            let config: LuminaConfig = Figment::new()
                .merge(Serialized::defaults(LuminaConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.reaper.interval_secs, 120);
            assert_eq!(config.whatsapp.app_secret.as_deref(), Some("shh"));
            Ok(())
        });
    }

    #[test]
    fn unknown_env_keys_pass_through() {
        assert_eq!(map_env_key("bogus_key"), "bogus_key");
        assert_eq!(map_env_key("agent"), "agent");
    }
}
