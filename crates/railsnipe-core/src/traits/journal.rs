// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence of task snapshots.

use async_trait::async_trait;

use crate::error::RailsnipeError;
use crate::types::{TaskId, TaskState};

/// Records every task state change so status survives eviction and restarts.
#[async_trait]
pub trait TaskJournal: Send + Sync {
    async fn record(&self, state: &TaskState) -> Result<(), RailsnipeError>;

    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskState>, RailsnipeError>;

    /// Fails every task left PENDING or RUNNING by a previous process.
    async fn mark_interrupted(&self) -> Result<u64, RailsnipeError>;
}
