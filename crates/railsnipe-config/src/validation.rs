// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::RailsnipeConfig;

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &RailsnipeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    if config.vault.kdf_memory_cost < 32768 {
        errors.push(ConfigError::validation(format!(
            "vault.kdf_memory_cost must be at least 32768 (32 MiB), got {}",
            config.vault.kdf_memory_cost
        )));
    }
    if config.vault.kdf_iterations < 2 {
        errors.push(ConfigError::validation(format!(
            "vault.kdf_iterations must be at least 2, got {}",
            config.vault.kdf_iterations
        )));
    }
    if config.vault.kdf_parallelism < 1 {
        errors.push(ConfigError::validation(format!(
            "vault.kdf_parallelism must be at least 1, got {}",
            config.vault.kdf_parallelism
        )));
    }

    let session = &config.session;
    if session.lifetime_secs == 0 {
        errors.push(ConfigError::validation("session.lifetime_secs must be positive"));
    }
    if session.login_timeout_secs == 0 {
        errors.push(ConfigError::validation("session.login_timeout_secs must be positive"));
    }
    if session.claim_lease_secs < session.login_timeout_secs {
        errors.push(ConfigError::validation(format!(
            "session.claim_lease_secs ({}) must cover session.login_timeout_secs ({})",
            session.claim_lease_secs, session.login_timeout_secs
        )));
    }
    if session.claim_poll_ms == 0 {
        errors.push(ConfigError::validation("session.claim_poll_ms must be positive"));
    }

    let retry = &config.retry;
    for (name, value) in [
        ("retry.gamma_shape", retry.gamma_shape),
        ("retry.gamma_scale", retry.gamma_scale),
        ("retry.floor_secs", retry.floor_secs),
    ] {
        if !(value.is_finite() && value > 0.0) {
            errors.push(ConfigError::validation(format!(
                "{name} must be a positive number, got {value}"
            )));
        }
    }
    if !(retry.bot_backoff_multiplier.is_finite() && retry.bot_backoff_multiplier >= 1.0) {
        errors.push(ConfigError::validation(format!(
            "retry.bot_backoff_multiplier must be at least 1.0, got {}",
            retry.bot_backoff_multiplier
        )));
    }
    if retry.bot_streak_threshold == 0 {
        errors.push(ConfigError::validation("retry.bot_streak_threshold must be at least 1"));
    }
    if !(1..=120).contains(&retry.call_timeout_secs) {
        errors.push(ConfigError::validation(format!(
            "retry.call_timeout_secs must be between 1 and 120, got {}",
            retry.call_timeout_secs
        )));
    }

    let base_url = config.upstream.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::validation(format!(
            "upstream.base_url `{base_url}` must be an http(s) URL"
        )));
    }

    let gateway = &config.gateway;
    if gateway.enabled {
        if gateway.port == 0 {
            errors.push(ConfigError::validation("gateway.port must not be 0"));
        }
        if gateway.host.parse::<std::net::IpAddr>().is_err() && gateway.host != "localhost" {
            errors.push(ConfigError::validation(format!(
                "gateway.host `{}` is not a valid IP address",
                gateway.host
            )));
        }
        if gateway
            .bearer_token
            .as_deref()
            .is_none_or(|t| t.trim().is_empty())
        {
            errors.push(ConfigError::validation(
                "gateway.bearer_token is required when the gateway is enabled",
            ));
        }
        if gateway.heartbeat_secs == 0 {
            errors.push(ConfigError::validation("gateway.heartbeat_secs must be positive"));
        }
    }

    if config.telegram.enabled
        && config
            .telegram
            .bot_token
            .as_deref()
            .is_none_or(|t| t.trim().is_empty())
    {
        errors.push(ConfigError::validation(
            "telegram.bot_token is required when telegram is enabled",
        ));
    }

    if config.tasks.event_buffer == 0 {
        errors.push(ConfigError::validation("tasks.event_buffer must be at least 1"));
    }
    if config.tasks.janitor_interval_secs == 0 {
        errors.push(ConfigError::validation("tasks.janitor_interval_secs must be positive"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&RailsnipeConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = RailsnipeConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn zero_floor_fails_validation() {
        let mut config = RailsnipeConfig::default();
        config.retry.floor_secs = 0.0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "retry.floor_secs"));
    }

    #[test]
    fn nan_gamma_scale_fails_validation() {
        let mut config = RailsnipeConfig::default();
        config.retry.gamma_scale = f64::NAN;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "retry.gamma_scale"));
    }

    #[test]
    fn bot_multiplier_below_one_fails_validation() {
        let mut config = RailsnipeConfig::default();
        config.retry.bot_backoff_multiplier = 0.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "bot_backoff_multiplier"));
    }

    #[test]
    fn zero_bot_streak_threshold_fails_validation() {
        let mut config = RailsnipeConfig::default();
        config.retry.bot_streak_threshold = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "bot_streak_threshold"));
    }

    #[test]
    fn call_timeout_out_of_range_fails_validation() {
        let mut config = RailsnipeConfig::default();
        config.retry.call_timeout_secs = 600;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "call_timeout_secs"));
    }

    #[test]
    fn enabled_gateway_requires_bearer_token() {
        let mut config = RailsnipeConfig::default();
        config.gateway.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "bearer_token"));

        config.gateway.bearer_token = Some("s3cret".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn enabled_telegram_requires_token() {
        let mut config = RailsnipeConfig::default();
        config.telegram.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "telegram.bot_token"));
    }

    #[test]
    fn claim_lease_must_cover_login_timeout() {
        let mut config = RailsnipeConfig::default();
        config.session.claim_lease_secs = 5;
        config.session.login_timeout_secs = 20;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "claim_lease_secs"));
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = RailsnipeConfig::default();
        config.retry.floor_secs = -1.0;
        config.tasks.event_buffer = 0;
        config.upstream.base_url = "ftp://bridge".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
