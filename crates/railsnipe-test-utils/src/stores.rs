// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory session store and task journal.
//!
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can advance it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use railsnipe_core::{
    EncryptedBlob, RailsnipeError, SessionStore, TaskError, TaskId, TaskJournal, TaskState,
    TaskStatus,
};
use tokio::time::Instant;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, (EncryptedBlob, Instant)>>,
    claims: Mutex<HashMap<String, (String, Instant)>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Raw access for tests that tamper with stored blobs.
    pub fn raw(&self, key: &str) -> Option<EncryptedBlob> {
        lock(&self.entries).get(key).map(|(blob, _)| blob.clone())
    }

    pub fn insert_raw(&self, key: &str, blob: EncryptedBlob, ttl: Duration) {
        lock(&self.entries).insert(key.to_string(), (blob, Instant::now() + ttl));
    }

    /// Who currently holds the claim on `key`, if the lease is live.
    pub fn claim_owner(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        lock(&self.claims)
            .get(key)
            .filter(|(_, until)| *until > now)
            .map(|(owner, _)| owner.clone())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<EncryptedBlob>, RailsnipeError> {
        let now = Instant::now();
        Ok(lock(&self.entries)
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(blob, _)| blob.clone()))
    }

    async fn put(
        &self,
        key: &str,
        blob: EncryptedBlob,
        ttl: Duration,
    ) -> Result<(), RailsnipeError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.insert_raw(key, blob, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RailsnipeError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        lock(&self.entries).remove(key);
        Ok(())
    }

    async fn try_claim(
        &self,
        key: &str,
        owner: &str,
        lease: Duration,
    ) -> Result<bool, RailsnipeError> {
        let now = Instant::now();
        let mut claims = lock(&self.claims);
        let free = match claims.get(key) {
            None => true,
            Some((holder, until)) => *until <= now || holder == owner,
        };
        if free {
            claims.insert(key.to_string(), (owner.to_string(), now + lease));
        }
        Ok(free)
    }

    async fn release_claim(&self, key: &str, owner: &str) -> Result<(), RailsnipeError> {
        let mut claims = lock(&self.claims);
        if claims.get(key).is_some_and(|(holder, _)| holder == owner) {
            claims.remove(key);
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, RailsnipeError> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        lock(&self.claims).retain(|_, (_, until)| *until > now);
        Ok((before - entries.len()) as u64)
    }
}

/// Journal that keeps every snapshot it is handed.
#[derive(Default)]
pub struct MemoryJournal {
    states: Mutex<HashMap<TaskId, TaskState>>,
    history: Mutex<Vec<TaskState>>,
    failing: AtomicBool,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `record` call fail, to check journal errors are not fatal.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every snapshot recorded for `task_id`, oldest first.
    pub fn history(&self, task_id: &TaskId) -> Vec<TaskState> {
        lock(&self.history)
            .iter()
            .filter(|s| &s.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn insert(&self, state: TaskState) {
        lock(&self.states).insert(state.task_id.clone(), state);
    }
}

#[async_trait]
impl TaskJournal for MemoryJournal {
    async fn record(&self, state: &TaskState) -> Result<(), RailsnipeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RailsnipeError::Storage {
                source: "journal unavailable".into(),
            });
        }
        lock(&self.history).push(state.clone());
        self.insert(state.clone());
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskState>, RailsnipeError> {
        Ok(lock(&self.states).get(task_id).cloned())
    }

    async fn mark_interrupted(&self) -> Result<u64, RailsnipeError> {
        let mut states = lock(&self.states);
        let mut changed = 0;
        for state in states.values_mut() {
            if !state.status.is_terminal() {
                state.status = TaskStatus::Failed;
                state.last_error = Some(TaskError::internal("interrupted by restart"));
                state.finished_at = Some(chrono::Utc::now());
                changed += 1;
            }
        }
        Ok(changed)
    }
}
