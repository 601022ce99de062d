// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/railsnipe/railsnipe.toml`
//! 3. `$XDG_CONFIG_HOME/railsnipe/railsnipe.toml`
//! 4. `./railsnipe.toml`
//! 5. `RAILSNIPE_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RailsnipeConfig;

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/railsnipe/railsnipe.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "railsnipe.toml";

/// Top-level sections, used to turn `RAILSNIPE_RETRY_FLOOR_SECS` into `retry.floor_secs`.
const SECTIONS: &[&str] = &[
    "service", "storage", "vault", "session", "retry", "upstream", "gateway", "telegram", "tasks",
];

/// Variables sharing the prefix that are read elsewhere, never as config keys.
const NON_CONFIG_VARS: &[&str] = &["vault_key", "login_password"];

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("railsnipe/railsnipe.toml"))
        .unwrap_or_default()
}

/// Builds the full layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RailsnipeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<RailsnipeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no environment).
pub fn load_config_from_str(toml_content: &str) -> Result<RailsnipeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RailsnipeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RailsnipeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RailsnipeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Maps `RAILSNIPE_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Only the section prefix is split, so keys that contain underscores
/// (`bot_streak_threshold`) survive intact.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("RAILSNIPE_")
        .ignore(NON_CONFIG_VARS)
        .map(|key| {
            let key = key.as_str();
            SECTIONS
                .iter()
                .find_map(|section| {
                    key.strip_prefix(section)
                        .and_then(|rest| rest.strip_prefix('_'))
                        .map(|rest| format!("{section}.{rest}"))
                })
                .unwrap_or_else(|| key.to_string())
                .into()
        })
}
