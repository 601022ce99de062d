// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `railsnipe serve` command implementation.
//!
//! Wires storage, the key ring, the provider bridge client, the session
//! manager and the task supervisor together, then serves the gateway until
//! a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use railsnipe_config::RailsnipeConfig;
use railsnipe_core::{HealthStatus, Notifier, PluginAdapter, RailsnipeError};
use railsnipe_engine::{
    BookingDesk, LogNotifier, RetryPolicy, TaskDeps, TaskSupervisor, install_signal_handler,
    janitor,
};
use railsnipe_gateway::GatewayState;
use railsnipe_session::{SessionManager, default_worker_id};
use railsnipe_telegram::TelegramNotifier;
use railsnipe_upstream::HttpUpstream;
use railsnipe_vault::CredentialVault;
use tracing::{error, info, warn};

use crate::vault::open_vault;

pub async fn run_serve(config: RailsnipeConfig) -> Result<(), RailsnipeError> {
    info!("starting railsnipe serve");

    let (store, keyring) = open_vault(&config).await?;
    let store = Arc::new(store);
    let credentials = Arc::new(CredentialVault::new(
        keyring.clone(),
        store.database().connection().clone(),
    ));

    let call_timeout = config.retry.call_timeout();
    let upstream = Arc::new(HttpUpstream::new(&config.upstream, call_timeout)?);
    match upstream.health_check().await {
        Ok(HealthStatus::Healthy) => info!(url = %config.upstream.base_url, "provider bridge reachable"),
        Ok(status) => warn!(url = %config.upstream.base_url, ?status, "provider bridge not healthy"),
        Err(e) => warn!(error = %e, "provider bridge health check failed"),
    }

    let worker_id = config
        .service
        .worker_id
        .clone()
        .unwrap_or_else(default_worker_id);
    info!(worker_id = %worker_id, "worker identity");
    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        upstream.clone(),
        credentials.clone(),
        keyring,
        config.session.clone(),
        worker_id,
    ));

    let notifier: Arc<dyn Notifier> = if config.telegram.enabled {
        info!(chats = config.telegram.chats.len(), "telegram notifications enabled");
        Arc::new(TelegramNotifier::new(&config.telegram)?)
    } else {
        info!("telegram disabled -- notifications are logged only");
        Arc::new(LogNotifier)
    };

    let deps = Arc::new(TaskDeps {
        upstream: upstream.clone(),
        sessions: sessions.clone(),
        payments: credentials.clone(),
        policy: RetryPolicy::from_config(&config.retry)?,
        call_timeout,
    });
    let supervisor = Arc::new(TaskSupervisor::new(
        deps,
        store.clone(),
        notifier,
        config.tasks.clone(),
    ));
    supervisor.recover_interrupted().await?;

    let desk = Arc::new(BookingDesk::new(
        upstream,
        sessions,
        credentials,
        call_timeout,
    ));

    let cancel = install_signal_handler();

    let janitor_handle = janitor::spawn(
        store.clone(),
        supervisor.clone(),
        Duration::from_secs(config.tasks.janitor_interval_secs),
        cancel.clone(),
    );

    let gateway_handle = if config.gateway.enabled {
        let state = GatewayState::new(&config.gateway, supervisor.clone(), desk, cancel.clone());
        let gateway_config = config.gateway.clone();
        let server_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = railsnipe_gateway::start_server(&gateway_config, state).await {
                error!(error = %e, "gateway failed");
                server_cancel.cancel();
            }
        }))
    } else {
        warn!("gateway disabled -- no way to submit tasks; running housekeeping only");
        None
    };

    cancel.cancelled().await;

    let grace = Duration::from_secs(config.tasks.shutdown_grace_secs);
    if !supervisor.shutdown(grace).await {
        warn!("some tasks were still running when the grace period ended");
    }
    if let Some(handle) = gateway_handle
        && let Err(e) = handle.await
    {
        warn!(error = %e, "gateway task ended abnormally");
    }
    if let Err(e) = janitor_handle.await {
        warn!(error = %e, "janitor task ended abnormally");
    }
    if let Err(e) = store.database().checkpoint().await {
        warn!(error = %e, "final WAL checkpoint failed");
    }

    info!("railsnipe serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("railsnipe={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
