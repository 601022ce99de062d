// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for engine integration tests.
//!
//! `EngineHarness` assembles a supervisor and a booking desk over scripted
//! and in-memory collaborators, with retry pacing shortened to milliseconds
//! so whole reservation runs finish in real time.

use std::sync::Arc;
use std::time::Duration;

use railsnipe_config::model::{RetryConfig, SessionConfig, TasksConfig};
use railsnipe_core::{Provider, TaskId, TaskState, TrainOption};
use railsnipe_engine::{BookingDesk, RetryPolicy, TaskDeps, TaskSupervisor};
use railsnipe_session::SessionManager;
use railsnipe_vault::KeyRing;

use crate::collaborators::{RecordingNotifier, SentNotification, StaticCredentials};
use crate::stores::{MemoryJournal, MemorySessionStore};
use crate::upstream::{ScriptedAuthenticator, ScriptedUpstream};

/// Upper bound on any single wait in the harness helpers.
const PATIENCE: Duration = Duration::from_secs(10);

/// Retry pacing in the low milliseconds.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        gamma_shape: 2.0,
        gamma_scale: 0.001,
        floor_secs: 0.005,
        bot_backoff_multiplier: 2.0,
        transient_retry_budget: 3,
        bot_streak_threshold: 3,
        call_timeout_secs: 2,
    }
}

/// Builder for creating engine test environments.
pub struct EngineHarnessBuilder {
    listing: Vec<TrainOption>,
    retry: RetryConfig,
    tasks: TasksConfig,
    notifier: RecordingNotifier,
    upstream: Option<ScriptedUpstream>,
    auth: ScriptedAuthenticator,
    card: bool,
}

impl EngineHarnessBuilder {
    fn new() -> Self {
        Self {
            listing: Vec::new(),
            retry: fast_retry(),
            tasks: TasksConfig::default(),
            notifier: RecordingNotifier::new(),
            upstream: None,
            auth: ScriptedAuthenticator::new(),
            card: true,
        }
    }

    /// The listing every search returns unless a result is scripted.
    pub fn with_listing(mut self, trains: Vec<TrainOption>) -> Self {
        self.listing = trains;
        self
    }

    pub fn with_upstream(mut self, upstream: ScriptedUpstream) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn with_authenticator(mut self, auth: ScriptedAuthenticator) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_tasks(mut self, tasks: TasksConfig) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_failing_notifier(mut self) -> Self {
        self.notifier = RecordingNotifier::failing();
        self
    }

    /// Leaves the users without a stored payment card.
    pub fn without_card(mut self) -> Self {
        self.card = false;
        self
    }

    pub fn build(self) -> EngineHarness {
        let upstream = self.upstream.unwrap_or_default();
        if !self.listing.is_empty() {
            upstream.set_listing(self.listing);
        }
        let upstream = Arc::new(upstream);
        let auth = Arc::new(self.auth);
        let store = Arc::new(MemorySessionStore::new());
        let journal = Arc::new(MemoryJournal::new());
        let notifier = Arc::new(self.notifier);

        let mut credentials = StaticCredentials::new();
        for user in ["alice", "bob"] {
            for provider in [Provider::Srt, Provider::Ktx] {
                credentials =
                    credentials.with_login(user, provider, &format!("{user}@example.com"), "pw");
                if self.card {
                    credentials = credentials.with_card(user, provider);
                }
            }
        }
        let credentials = Arc::new(credentials);

        let keyring = Arc::new(KeyRing::ephemeral().expect("ephemeral key ring"));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            auth.clone(),
            credentials.clone(),
            keyring,
            SessionConfig {
                claim_poll_ms: 10,
                ..SessionConfig::default()
            },
            "test-worker",
        ));

        let call_timeout = self.retry.call_timeout();
        let deps = Arc::new(TaskDeps {
            upstream: upstream.clone(),
            sessions: sessions.clone(),
            payments: credentials.clone(),
            policy: RetryPolicy::from_config(&self.retry).expect("valid retry config"),
            call_timeout,
        });
        let supervisor = Arc::new(TaskSupervisor::new(
            deps,
            journal.clone(),
            notifier.clone(),
            self.tasks,
        ));
        let desk = Arc::new(BookingDesk::new(
            upstream.clone(),
            sessions.clone(),
            credentials.clone(),
            call_timeout,
        ));

        EngineHarness {
            upstream,
            auth,
            store,
            journal,
            notifier,
            credentials,
            sessions,
            supervisor,
            desk,
        }
    }
}

/// A complete engine stack over test collaborators.
pub struct EngineHarness {
    pub upstream: Arc<ScriptedUpstream>,
    pub auth: Arc<ScriptedAuthenticator>,
    pub store: Arc<MemorySessionStore>,
    pub journal: Arc<MemoryJournal>,
    pub notifier: Arc<RecordingNotifier>,
    pub credentials: Arc<StaticCredentials>,
    pub sessions: Arc<SessionManager>,
    pub supervisor: Arc<TaskSupervisor>,
    pub desk: Arc<BookingDesk>,
}

impl EngineHarness {
    pub fn builder() -> EngineHarnessBuilder {
        EngineHarnessBuilder::new()
    }

    /// Follows the task's live feed until it ends and returns the final state.
    pub async fn finish(&self, task_id: &TaskId) -> TaskState {
        let mut subscription = self
            .supervisor
            .subscribe(task_id)
            .await
            .expect("task is known");
        let drain = async { while subscription.next().await.is_some() {} };
        tokio::time::timeout(PATIENCE, drain)
            .await
            .expect("task reached a terminal state in time");
        self.supervisor
            .status(task_id)
            .await
            .expect("task is known")
    }

    /// Polls the task until `done` holds for its state.
    pub async fn wait_until(
        &self,
        task_id: &TaskId,
        done: impl Fn(&TaskState) -> bool,
    ) -> TaskState {
        let poll = async {
            loop {
                let state = self
                    .supervisor
                    .status(task_id)
                    .await
                    .expect("task is known");
                if done(&state) {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(PATIENCE, poll)
            .await
            .expect("condition reached in time")
    }

    /// Waits until at least `count` notifications went out.
    pub async fn notifications(&self, count: usize) -> Vec<SentNotification> {
        let poll = async {
            loop {
                let sent = self.notifier.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(PATIENCE, poll)
            .await
            .expect("notifications delivered in time")
    }
}
