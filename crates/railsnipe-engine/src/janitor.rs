// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic housekeeping: expired sessions, lapsed claims and finished tasks.

use std::sync::Arc;
use std::time::Duration;

use railsnipe_core::SessionStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::supervisor::TaskSupervisor;

/// Runs one housekeeping pass. Returns (purged session entries, evicted tasks).
pub async fn sweep(store: &dyn SessionStore, supervisor: &TaskSupervisor) -> (u64, usize) {
    let purged = match store.purge_expired().await {
        Ok(purged) => purged,
        Err(e) => {
            warn!(error = %e, "session purge failed (non-fatal)");
            0
        }
    };
    let evicted = supervisor.evict_finished();
    if purged > 0 || evicted > 0 {
        info!(purged, evicted, "janitor sweep");
    } else {
        debug!("janitor sweep found nothing to remove");
    }
    (purged, evicted)
}

/// Spawns the janitor loop. It sweeps every `every` until `cancel` fires.
pub fn spawn(
    store: Arc<dyn SessionStore>,
    supervisor: Arc<TaskSupervisor>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sweep(store.as_ref(), &supervisor).await;
                }
                _ = cancel.cancelled() => {
                    debug!("janitor shutting down");
                    break;
                }
            }
        }
    })
}
