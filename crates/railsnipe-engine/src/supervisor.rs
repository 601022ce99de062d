// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task supervisor: owns the in-flight reservation tasks.
//!
//! Each accepted request becomes a [`ReservationTask`] spawned on a
//! [`TaskTracker`], with a cancellation token that is a child of the
//! supervisor's root token. Finished tasks stay queryable in memory for the
//! retention period and through the journal afterwards.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use railsnipe_config::model::TasksConfig;
use railsnipe_core::{
    Notifier, RailsnipeError, ReservationRequest, TaskId, TaskJournal, TaskState,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::broadcast::{self, ProgressFeed, Subscription};
use crate::task::{ReservationTask, TaskDeps};

struct TaskEntry {
    feed: ProgressFeed,
    cancel: CancellationToken,
}

pub struct TaskSupervisor {
    deps: Arc<TaskDeps>,
    journal: Arc<dyn TaskJournal>,
    notifier: Arc<dyn Notifier>,
    config: TasksConfig,
    tasks: DashMap<TaskId, TaskEntry>,
    tracker: TaskTracker,
    root: CancellationToken,
}

impl TaskSupervisor {
    pub fn new(
        deps: Arc<TaskDeps>,
        journal: Arc<dyn TaskJournal>,
        notifier: Arc<dyn Notifier>,
        config: TasksConfig,
    ) -> Self {
        Self {
            deps,
            journal,
            notifier,
            config,
            tasks: DashMap::new(),
            tracker: TaskTracker::new(),
            root: CancellationToken::new(),
        }
    }

    /// Fails the tasks a previous process left unfinished.
    pub async fn recover_interrupted(&self) -> Result<u64, RailsnipeError> {
        let count = self.journal.mark_interrupted().await?;
        if count > 0 {
            warn!(count, "marked tasks interrupted by restart as failed");
        }
        Ok(count)
    }

    /// Accepts a request and starts its task. The task is PENDING or RUNNING
    /// when this returns; malformed requests fail inside the task.
    pub async fn start(&self, request: ReservationRequest) -> Result<TaskId, RailsnipeError> {
        if self.root.is_cancelled() {
            return Err(RailsnipeError::Internal(
                "supervisor is shutting down".to_string(),
            ));
        }
        let task_id = TaskId::generate();
        let initial = TaskState::pending(task_id.clone(), &request);
        let (publisher, feed) = broadcast::channel(
            initial,
            self.config.event_buffer,
            self.journal.clone(),
            self.notifier.clone(),
            self.tracker.clone(),
        );
        publisher.persist().await;

        let cancel = self.root.child_token();
        self.tasks.insert(
            task_id.clone(),
            TaskEntry {
                feed,
                cancel: cancel.clone(),
            },
        );

        info!(
            task_id = %task_id,
            user = %request.user,
            provider = %request.provider,
            candidates = ?request.candidates,
            "starting reservation task"
        );
        let task = ReservationTask::new(request, self.deps.clone(), publisher, cancel);
        self.tracker.spawn(async move {
            let state = task.run().await;
            debug!(
                task_id = %state.task_id,
                status = %state.status,
                attempts = state.attempt_count,
                "task finished"
            );
        });
        Ok(task_id)
    }

    /// Requests cancellation. Finished tasks accept this as a no-op.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<(), RailsnipeError> {
        let token = self.tasks.get(task_id).map(|entry| entry.cancel.clone());
        match token {
            Some(token) => {
                token.cancel();
                info!(task_id = %task_id, "cancellation requested");
                Ok(())
            }
            None => match self.journal.load(task_id).await? {
                Some(_) => Ok(()),
                None => Err(RailsnipeError::TaskNotFound(task_id.to_string())),
            },
        }
    }

    /// The latest state, from memory or, for evicted tasks, the journal.
    pub async fn status(&self, task_id: &TaskId) -> Result<TaskState, RailsnipeError> {
        let live = self.tasks.get(task_id).map(|entry| entry.feed.snapshot());
        if let Some(state) = live {
            return Ok(state);
        }
        self.journal
            .load(task_id)
            .await?
            .ok_or_else(|| RailsnipeError::TaskNotFound(task_id.to_string()))
    }

    /// A live subscription: the current snapshot, then events until the end.
    pub async fn subscribe(&self, task_id: &TaskId) -> Result<Subscription, RailsnipeError> {
        let live = self.tasks.get(task_id).map(|entry| entry.feed.subscribe());
        if let Some(subscription) = live {
            return Ok(subscription);
        }
        self.status(task_id).await.map(Subscription::closed)
    }

    /// Number of tasks not yet in a terminal state.
    pub fn active(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| !entry.feed.snapshot().status.is_terminal())
            .count()
    }

    /// Drops finished tasks older than the retention period from memory.
    pub fn evict_finished(&self) -> usize {
        let retention = i64::try_from(self.config.retention_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let now = Utc::now();
        let before = self.tasks.len();
        self.tasks.retain(|_, entry| {
            let state = entry.feed.snapshot();
            match state.finished_at {
                Some(finished) if state.status.is_terminal() => finished
                    .checked_add_signed(retention)
                    .is_none_or(|until| until > now),
                _ => true,
            }
        });
        let evicted = before.saturating_sub(self.tasks.len());
        if evicted > 0 {
            debug!(evicted, "evicted finished tasks");
        }
        evicted
    }

    /// Cancels every task and waits up to `grace` for them to finish.
    ///
    /// Returns false when the grace period ran out first.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let active = self.active();
        info!(active, "shutting down task supervisor");
        self.root.cancel();
        self.tracker.close();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("all tasks stopped");
                true
            }
            Err(_) => {
                warn!(remaining = self.tracker.len(), "shutdown grace period expired");
                false
            }
        }
    }
}
