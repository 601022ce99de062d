// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Progress broadcaster.
//!
//! The task owns a [`ProgressPublisher`] and is the only writer of its state.
//! Every change bumps the sequence number, replaces the snapshot in a
//! `watch` channel, fans the event out on a `broadcast` channel and is
//! written to the journal. Observers hold a [`ProgressFeed`] and open
//! [`Subscription`]s from it: a snapshot first, then live events. A
//! subscriber that falls behind gets a fresh snapshot instead of the events
//! it missed.

use std::sync::Arc;

use chrono::Utc;
use railsnipe_core::{
    BookingResult, NotificationKind, Notifier, ProgressEvent, ProgressKind, TaskError,
    TaskJournal, TaskState, TaskStatus,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::notify;

/// Creates the publisher and feed of one task.
pub fn channel(
    initial: TaskState,
    capacity: usize,
    journal: Arc<dyn TaskJournal>,
    notifier: Arc<dyn Notifier>,
    notices: TaskTracker,
) -> (ProgressPublisher, ProgressFeed) {
    let (snapshot_tx, snapshot_rx) = watch::channel(initial.clone());
    let (events_tx, _) = broadcast::channel(capacity.max(1));
    let publisher = ProgressPublisher {
        state: initial,
        snapshot: snapshot_tx,
        events: events_tx.clone(),
        journal,
        notifier,
        notices,
        notified: false,
    };
    let feed = ProgressFeed {
        snapshot: snapshot_rx,
        events: events_tx,
    };
    (publisher, feed)
}

/// Write side of a task's progress.
pub struct ProgressPublisher {
    state: TaskState,
    snapshot: watch::Sender<TaskState>,
    events: broadcast::Sender<ProgressEvent>,
    journal: Arc<dyn TaskJournal>,
    notifier: Arc<dyn Notifier>,
    notices: TaskTracker,
    notified: bool,
}

impl ProgressPublisher {
    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn into_state(self) -> TaskState {
        self.state
    }

    /// Writes the current state to the journal without emitting an event.
    pub async fn persist(&self) {
        if let Err(e) = self.journal.record(&self.state).await {
            warn!(task_id = %self.state.task_id, error = %e, "failed to journal task state");
        }
    }

    /// Counts one more attempt and returns the new count.
    ///
    /// The change reaches observers with the next published event.
    pub fn bump_attempt(&mut self) -> u64 {
        self.state.attempt_count += 1;
        self.state.attempt_count
    }

    pub fn set_result(&mut self, result: BookingResult) {
        self.state.result = Some(result);
    }

    /// Moves the task to `status` and emits the accompanying event.
    ///
    /// Returns false, changing nothing, for an edge the lifecycle forbids.
    pub async fn transition(
        &mut self,
        status: TaskStatus,
        kind: ProgressKind,
        message: impl Into<String>,
        error: Option<TaskError>,
    ) -> bool {
        if !self.state.status.can_transition_to(status) {
            warn!(
                task_id = %self.state.task_id,
                from = %self.state.status,
                to = %status,
                "ignoring illegal task transition"
            );
            return false;
        }
        let now = Utc::now();
        self.state.status = status;
        if status == TaskStatus::Running {
            self.state.started_at = Some(now);
        }
        if status.is_terminal() {
            self.state.finished_at = Some(now);
        }
        if status == TaskStatus::Cancelled {
            self.state.last_error = None;
        }
        self.publish(kind, message, error).await;
        true
    }

    /// Emits one event and folds it into the snapshot.
    pub async fn publish(
        &mut self,
        kind: ProgressKind,
        message: impl Into<String>,
        error: Option<TaskError>,
    ) {
        let message = message.into();
        self.state.last_sequence += 1;
        self.state.last_progress_message = Some(message.clone());
        if let Some(error) = &error {
            self.state.last_error = Some(error.clone());
        }
        let event = ProgressEvent {
            task_id: self.state.task_id.clone(),
            sequence: self.state.last_sequence,
            kind,
            attempt_count: self.state.attempt_count,
            message,
            error,
            emitted_at: Utc::now(),
        };

        // Snapshot before event: a subscriber that sees the event can rely
        // on the snapshot already reflecting it.
        self.snapshot.send_replace(self.state.clone());
        // No receivers is fine; the journal is the record.
        let _ = self.events.send(event);
        self.persist().await;

        if kind.is_terminal_notice() {
            self.notify_terminal(kind);
        }
    }

    /// Hands the terminal outcome to the notifier, once per task.
    fn notify_terminal(&mut self, kind: ProgressKind) {
        if self.notified {
            return;
        }
        let (notification, message) = match (kind, &self.state.result, &self.state.last_error) {
            (ProgressKind::Success, Some(result), _) => {
                (NotificationKind::Success, notify::success_message(result))
            }
            (ProgressKind::Failed, _, Some(error)) => {
                (NotificationKind::Failure, notify::failure_message(error))
            }
            _ => return,
        };
        self.notified = true;

        let notifier = self.notifier.clone();
        let user = self.state.user.clone();
        let task_id = self.state.task_id.clone();
        self.notices.spawn(async move {
            match notifier.notify(&user, notification, &message).await {
                Ok(()) => debug!(task_id = %task_id, "terminal notification delivered"),
                Err(e) => {
                    metrics::counter!("railsnipe_notification_failures_total").increment(1);
                    warn!(task_id = %task_id, error = %e, "terminal notification failed");
                }
            }
        });
    }
}

/// Read side of a task's progress, cheap to clone.
#[derive(Clone)]
pub struct ProgressFeed {
    snapshot: watch::Receiver<TaskState>,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressFeed {
    pub fn snapshot(&self) -> TaskState {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> Subscription {
        // Subscribe before reading the snapshot so nothing falls in between.
        let events = self.events.subscribe();
        let initial = self.snapshot();
        Subscription {
            initial: Some(initial),
            snapshot: self.snapshot.clone(),
            events: Some(events),
            seen: 0,
            finished: false,
        }
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveUpdate {
    /// Authoritative state; replaces whatever the subscriber knew.
    Snapshot(TaskState),
    Event(ProgressEvent),
}

/// A snapshot followed by live events, ending after the terminal state.
pub struct Subscription {
    initial: Option<TaskState>,
    snapshot: watch::Receiver<TaskState>,
    events: Option<broadcast::Receiver<ProgressEvent>>,
    /// Highest sequence number already delivered.
    seen: u64,
    finished: bool,
}

impl Subscription {
    /// A subscription to a task that already finished: its state and nothing else.
    pub fn closed(state: TaskState) -> Self {
        let (_, snapshot) = watch::channel(state.clone());
        Self {
            initial: Some(state),
            snapshot,
            events: None,
            seen: 0,
            finished: true,
        }
    }

    /// The next update, or `None` once the task's final state was delivered.
    pub async fn next(&mut self) -> Option<LiveUpdate> {
        if let Some(state) = self.initial.take() {
            self.seen = state.last_sequence;
            self.finished |= state.status.is_terminal();
            return Some(LiveUpdate::Snapshot(state));
        }
        if self.finished {
            return None;
        }
        let events = self.events.as_mut()?;
        loop {
            match events.recv().await {
                Ok(event) => {
                    if event.sequence <= self.seen {
                        continue;
                    }
                    self.seen = event.sequence;
                    self.finished = {
                        let latest = self.snapshot.borrow();
                        latest.status.is_terminal() && self.seen >= latest.last_sequence
                    };
                    return Some(LiveUpdate::Event(event));
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged; sending a fresh snapshot");
                    // Restart at the tail; anything older is covered by the snapshot.
                    *events = events.resubscribe();
                    let state = self.snapshot.borrow().clone();
                    self.seen = state.last_sequence;
                    self.finished = state.status.is_terminal();
                    return Some(LiveUpdate::Snapshot(state));
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}
