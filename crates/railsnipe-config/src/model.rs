// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of silently falling back to a default.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level railsnipe configuration.
///
/// Every section is optional and defaults to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RailsnipeConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// SQLite database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Key ring and credential vault settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Session lifetime and single-flight authentication settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Retry pacing and escalation thresholds.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Provider bridge endpoint.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// HTTP/WebSocket gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Telegram notification settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Task supervisor settings.
    #[serde(default)]
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Stable identity of this worker in session claims. Random per process when unset.
    #[serde(default)]
    pub worker_id: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            worker_id: None,
        }
    }
}

fn default_service_name() -> String {
    "railsnipe".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

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
        .map(|p| p.join("railsnipe").join("railsnipe.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("railsnipe.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Argon2id parameters used to wrap the master key.
///
/// The secret itself never lives in config; it comes from `RAILSNIPE_VAULT_KEY`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

fn default_kdf_memory_cost() -> u32 {
    65536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Provider session lifetime assumed when login does not report one.
    #[serde(default = "default_session_lifetime_secs")]
    pub lifetime_secs: u64,

    /// Handles are renewed this long before they expire. Stored entries
    /// outlive their session by the same margin.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,

    /// Upper bound on one login, including waiting for another worker's login.
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,

    /// How long a cross-process authentication claim stays valid.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,

    /// Poll interval while another worker holds the claim.
    #[serde(default = "default_claim_poll_ms")]
    pub claim_poll_ms: u64,
}

impl SessionConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    pub fn claim_poll(&self) -> Duration {
        Duration::from_millis(self.claim_poll_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: default_session_lifetime_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
            login_timeout_secs: default_login_timeout_secs(),
            claim_lease_secs: default_claim_lease_secs(),
            claim_poll_ms: default_claim_poll_ms(),
        }
    }
}

fn default_session_lifetime_secs() -> u64 {
    1800
}

fn default_refresh_margin_secs() -> u64 {
    300
}

fn default_login_timeout_secs() -> u64 {
    20
}

fn default_claim_lease_secs() -> u64 {
    30
}

fn default_claim_poll_ms() -> u64 {
    200
}

/// Pacing of the search-attempt-wait loop.
///
/// A wait is `gamma(shape, scale) + floor` seconds; after bot detection the
/// sampled interval is multiplied by `bot_backoff_multiplier`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_gamma_shape")]
    pub gamma_shape: f64,

    #[serde(default = "default_gamma_scale")]
    pub gamma_scale: f64,

    #[serde(default = "default_floor_secs")]
    pub floor_secs: f64,

    #[serde(default = "default_bot_backoff_multiplier")]
    pub bot_backoff_multiplier: f64,

    /// Consecutive transient failures retried on the same attempt before re-searching.
    #[serde(default = "default_transient_retry_budget")]
    pub transient_retry_budget: u32,

    /// Consecutive bot detections tolerated before the task fails.
    #[serde(default = "default_bot_streak_threshold")]
    pub bot_streak_threshold: u32,

    /// Timeout of a single upstream call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl RetryConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            gamma_shape: default_gamma_shape(),
            gamma_scale: default_gamma_scale(),
            floor_secs: default_floor_secs(),
            bot_backoff_multiplier: default_bot_backoff_multiplier(),
            transient_retry_budget: default_transient_retry_budget(),
            bot_streak_threshold: default_bot_streak_threshold(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_gamma_shape() -> f64 {
    4.0
}

fn default_gamma_scale() -> f64 {
    0.25
}

fn default_floor_secs() -> f64 {
    0.25
}

fn default_bot_backoff_multiplier() -> f64 {
    4.0
}

fn default_transient_retry_budget() -> u32 {
    3
}

fn default_bot_streak_threshold() -> u32 {
    10
}

fn default_call_timeout_secs() -> u64 {
    15
}

/// Provider bridge the HTTP upstream client talks to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,

    /// Bearer token presented to the bridge, if it requires one.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_upstream_base_url() -> String {
    "http://127.0.0.1:8700".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Required when the gateway is enabled.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Interval between server pings on live channels.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_heartbeat_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// User ref -> Telegram chat id.
    #[serde(default)]
    pub chats: BTreeMap<String, String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            api_base: default_telegram_api_base(),
            chats: BTreeMap::new(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TasksConfig {
    /// Per-task live event buffer; slower subscribers receive a fresh snapshot instead.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// How long finished tasks stay in memory.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// How long shutdown waits for tasks to observe cancellation.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Interval of the eviction and session purge janitor.
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            retention_secs: default_retention_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            janitor_interval_secs: default_janitor_interval_secs(),
        }
    }
}

fn default_event_buffer() -> usize {
    256
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_janitor_interval_secs() -> u64 {
    60
}
