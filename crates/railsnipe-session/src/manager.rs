// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session manager.
//!
//! Handles are sealed with the shared key ring and kept in the session store,
//! so every worker sees one handle per (user, provider). Authentication is
//! single-flight at two levels: a per-key async mutex inside the process and a
//! leased claim in the store across processes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use railsnipe_config::model::SessionConfig;
use railsnipe_core::{
    Authenticator, CredentialSource, SessionHandle, SessionKey, SessionMaterial, SessionStore,
    UpstreamError,
};
use railsnipe_vault::KeyRing;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::error::AuthError;

/// A decrypted handle together with the nonce of the blob it came from.
///
/// Each write seals with a fresh nonce, so an unchanged nonce means the
/// stored handle is the one already cached.
struct Cached {
    nonce: [u8; 12],
    handle: Arc<SessionHandle>,
}

/// Hands out validated session handles and re-authenticates on demand.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    authenticator: Arc<dyn Authenticator>,
    credentials: Arc<dyn CredentialSource>,
    keyring: Arc<KeyRing>,
    config: SessionConfig,
    worker_id: String,
    cache: DashMap<SessionKey, Cached>,
    gates: DashMap<SessionKey, Arc<Mutex<()>>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        authenticator: Arc<dyn Authenticator>,
        credentials: Arc<dyn CredentialSource>,
        keyring: Arc<KeyRing>,
        config: SessionConfig,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            authenticator,
            credentials,
            keyring,
            config,
            worker_id: worker_id.into(),
            cache: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Returns a usable handle for `key`, authenticating if none is stored.
    ///
    /// Concurrent callers for the same key wait for a single authentication.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn acquire(&self, key: &SessionKey) -> Result<Arc<SessionHandle>, AuthError> {
        if let Some(handle) = self.lookup(key).await? {
            return Ok(handle);
        }

        let gate = self.gate(key);
        let result: Result<Arc<SessionHandle>, AuthError> = async {
            let _guard = gate.lock().await;
            // Whoever held the gate before us may have just stored a handle.
            match self.lookup(key).await? {
                Some(handle) => Ok(handle),
                None => self.authenticate(key).await,
            }
        }
        .await;
        self.release_gate(key, gate);
        result
    }

    /// Forgets the handle for `key` here and in the store.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn invalidate(&self, key: &SessionKey) -> Result<(), AuthError> {
        self.cache.remove(key);
        self.store.delete(&key.storage_key()).await?;
        debug!("session invalidated");
        Ok(())
    }

    /// Invalidates only if `stale` is still the current handle.
    ///
    /// Several tasks that hit the same expired handle all call this; only the
    /// first deletes, so a handle another task already refreshed survives.
    pub async fn invalidate_handle(&self, stale: &SessionHandle) -> Result<(), AuthError> {
        let key = &stale.key;
        let gate = self.gate(key);
        let result: Result<(), AuthError> = async {
            let _guard = gate.lock().await;
            match self.lookup(key).await? {
                Some(current) if *current != *stale => {
                    debug!(key = %key, "handle already refreshed; keeping it");
                    Ok(())
                }
                _ => self.invalidate(key).await,
            }
        }
        .await;
        self.release_gate(key, gate);
        result
    }

    /// Number of keys that currently have an authentication gate.
    pub fn open_gates(&self) -> usize {
        self.gates.len()
    }

    fn gate(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        self.gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the gate for `key` once no other caller holds or waits on it.
    ///
    /// `gate()` clones under the same shard lock `remove_if` takes, so a
    /// count of two (the map and `ours`) cannot race with a new waiter.
    fn release_gate(&self, key: &SessionKey, ours: Arc<Mutex<()>>) {
        self.gates
            .remove_if(key, |_, gate| Arc::ptr_eq(gate, &ours) && Arc::strong_count(gate) == 2);
    }

    fn usable(&self, handle: &SessionHandle, now: DateTime<Utc>) -> bool {
        let margin = TimeDelta::from_std(self.config.refresh_margin()).unwrap_or(TimeDelta::zero());
        !handle.is_expired_at(now + margin)
    }

    /// Reads the store and returns its handle if it is present and usable.
    ///
    /// The store is consulted on every call so a deletion by another worker
    /// is observed by the next acquire.
    async fn lookup(&self, key: &SessionKey) -> Result<Option<Arc<SessionHandle>>, AuthError> {
        let storage_key = key.storage_key();
        let Some(blob) = self.store.get(&storage_key).await? else {
            self.cache.remove(key);
            return Ok(None);
        };
        let now = Utc::now();

        if let Some(cached) = self.cache.get(key)
            && cached.nonce == blob.nonce
        {
            if self.usable(&cached.handle, now) {
                return Ok(Some(cached.handle.clone()));
            }
            return Ok(None);
        }

        let plaintext = match self.keyring.open(&blob, &storage_key) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                // Sealed under another key or copied from another entry.
                warn!(key = %key, error = %e, "stored session does not decrypt; treating as absent");
                return Ok(None);
            }
        };
        let handle: SessionHandle = match serde_json::from_slice(&plaintext) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(key = %key, error = %e, "stored session is malformed; treating as absent");
                return Ok(None);
            }
        };
        if handle.key != *key || !self.usable(&handle, now) {
            return Ok(None);
        }

        let handle = Arc::new(handle);
        self.cache.insert(
            key.clone(),
            Cached {
                nonce: blob.nonce,
                handle: handle.clone(),
            },
        );
        Ok(Some(handle))
    }

    /// Takes the cross-process claim and logs in, or waits for the holder.
    async fn authenticate(&self, key: &SessionKey) -> Result<Arc<SessionHandle>, AuthError> {
        let storage_key = key.storage_key();
        let lease = self.config.claim_lease();
        let deadline = Instant::now() + lease;

        loop {
            if self.store.try_claim(&storage_key, &self.worker_id, lease).await? {
                let result = match self.lookup(key).await {
                    Ok(Some(handle)) => Ok(handle),
                    Ok(None) => self.login(key).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = self.store.release_claim(&storage_key, &self.worker_id).await {
                    warn!(key = %key, error = %e, "failed to release auth claim");
                }
                return result;
            }

            if Instant::now() >= deadline {
                return Err(AuthError::Upstream(UpstreamError::transient(
                    "timed out waiting for another worker to authenticate",
                )));
            }
            debug!(key = %key, "another worker is authenticating; waiting");
            tokio::time::sleep(self.config.claim_poll()).await;
            if let Some(handle) = self.lookup(key).await? {
                return Ok(handle);
            }
        }
    }

    async fn login(&self, key: &SessionKey) -> Result<Arc<SessionHandle>, AuthError> {
        let credentials = self
            .credentials
            .credentials(key)
            .await?
            .ok_or_else(|| AuthError::MissingCredentials(key.clone()))?;

        let timeout = self.config.login_timeout();
        let material = tokio::time::timeout(timeout, self.authenticator.login(key, &credentials))
            .await
            .map_err(|_| {
                UpstreamError::transient(format!("login timed out after {}s", timeout.as_secs()))
            })??;

        let handle = self.stamp(key, material)?;
        let storage_key = key.storage_key();
        let plaintext = Zeroizing::new(
            serde_json::to_vec(&handle)
                .map_err(|e| AuthError::Internal(format!("failed to encode session: {e}")))?,
        );
        let blob = self.keyring.seal(&plaintext, &storage_key)?;
        let nonce = blob.nonce;
        let ttl = self.config.lifetime() + self.config.refresh_margin();
        self.store.put(&storage_key, blob, ttl).await?;

        let handle = Arc::new(handle);
        self.cache.insert(
            key.clone(),
            Cached {
                nonce,
                handle: handle.clone(),
            },
        );
        metrics::counter!("railsnipe_session_logins_total", "provider" => key.provider.to_string())
            .increment(1);
        info!(key = %key, "authenticated");
        Ok(handle)
    }

    fn stamp(&self, key: &SessionKey, material: SessionMaterial) -> Result<SessionHandle, AuthError> {
        let lifetime = material
            .expires_in_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.lifetime());
        let lifetime = TimeDelta::from_std(lifetime)
            .map_err(|_| AuthError::Internal("session lifetime out of range".to_string()))?;
        let issued_at = Utc::now();
        Ok(SessionHandle {
            key: key.clone(),
            cookies: material.cookies,
            token: material.token,
            issued_at,
            expires_at: issued_at + lifetime,
            refreshable: material.refreshable,
        })
    }
}

/// A worker id unique to this process, used when none is configured.
pub fn default_worker_id() -> String {
    format!("worker-{}", uuid::Uuid::new_v4())
}
