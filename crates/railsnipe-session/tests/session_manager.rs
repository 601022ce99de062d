// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session manager behaviour against in-memory and SQLite stores.

use std::sync::Arc;
use std::time::Duration;

use railsnipe_config::model::SessionConfig;
use railsnipe_core::{
    ErrorClass, Provider, SessionKey, SessionMaterial, SessionStore, UpstreamError,
};
use railsnipe_session::{AuthError, SessionManager};
use railsnipe_test_utils::{MemorySessionStore, ScriptedAuthenticator, StaticCredentials};
use railsnipe_vault::KeyRing;

fn config() -> SessionConfig {
    SessionConfig {
        claim_poll_ms: 10,
        ..SessionConfig::default()
    }
}

fn credentials() -> Arc<StaticCredentials> {
    Arc::new(
        StaticCredentials::new()
            .with_login("alice", Provider::Srt, "010-1111-2222", "pw")
            .with_login("bob", Provider::Srt, "010-3333-4444", "pw"),
    )
}

struct Fixture {
    store: Arc<MemorySessionStore>,
    auth: Arc<ScriptedAuthenticator>,
    keyring: Arc<KeyRing>,
}

impl Fixture {
    fn new(auth: ScriptedAuthenticator) -> Self {
        Self {
            store: Arc::new(MemorySessionStore::new()),
            auth: Arc::new(auth),
            keyring: Arc::new(KeyRing::ephemeral().unwrap()),
        }
    }

    fn manager(&self, worker: &str) -> SessionManager {
        SessionManager::new(
            self.store.clone(),
            self.auth.clone(),
            credentials(),
            self.keyring.clone(),
            config(),
            worker,
        )
    }
}

fn alice() -> SessionKey {
    SessionKey::new("alice", Provider::Srt)
}

#[tokio::test]
async fn first_acquire_authenticates_then_caches() {
    let fx = Fixture::new(ScriptedAuthenticator::new());
    let manager = fx.manager("w1");

    let first = manager.acquire(&alice()).await.unwrap();
    assert_eq!(first.token, "token-1");
    assert_eq!(fx.auth.logins(), 1);
    assert_eq!(fx.store.puts(), 1);

    let second = manager.acquire(&alice()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fx.auth.logins(), 1);
}

#[tokio::test]
async fn concurrent_acquires_share_one_login() {
    let fx = Fixture::new(ScriptedAuthenticator::new().with_delay(Duration::from_millis(50)));
    let manager = Arc::new(fx.manager("w1"));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.acquire(&alice()).await }));
    }
    let mut tokens = Vec::new();
    for h in handles {
        tokens.push(h.await.unwrap().unwrap().token.clone());
    }

    assert_eq!(fx.auth.logins(), 1);
    assert!(tokens.iter().all(|t| t == "token-1"), "{tokens:?}");
}

#[tokio::test]
async fn different_keys_authenticate_independently() {
    let fx = Fixture::new(ScriptedAuthenticator::new());
    let manager = fx.manager("w1");

    manager.acquire(&alice()).await.unwrap();
    manager
        .acquire(&SessionKey::new("bob", Provider::Srt))
        .await
        .unwrap();
    assert_eq!(fx.auth.logins(), 2);
}

#[tokio::test]
async fn invalidate_forces_reauthentication() {
    let fx = Fixture::new(ScriptedAuthenticator::new());
    let manager = fx.manager("w1");

    manager.acquire(&alice()).await.unwrap();
    manager.invalidate(&alice()).await.unwrap();
    assert!(fx.store.raw(&alice().storage_key()).is_none());

    let renewed = manager.acquire(&alice()).await.unwrap();
    assert_eq!(renewed.token, "token-2");
    assert_eq!(fx.auth.logins(), 2);
}

#[tokio::test]
async fn invalidating_a_stale_handle_keeps_the_refreshed_one() {
    let fx = Fixture::new(ScriptedAuthenticator::new());
    let manager = fx.manager("w1");

    let stale = manager.acquire(&alice()).await.unwrap();
    manager.invalidate_handle(&stale).await.unwrap();
    let fresh = manager.acquire(&alice()).await.unwrap();
    assert_eq!(fresh.token, "token-2");

    // A second task that also saw the old handle fail must not drop the new one.
    manager.invalidate_handle(&stale).await.unwrap();
    let still = manager.acquire(&alice()).await.unwrap();
    assert_eq!(still.token, "token-2");
    assert_eq!(fx.auth.logins(), 2);
}

#[tokio::test]
async fn idle_gates_are_dropped() {
    let fx = Fixture::new(ScriptedAuthenticator::new().with_delay(Duration::from_millis(20)));
    let manager = Arc::new(fx.manager("w1"));

    let mut handles = Vec::new();
    for i in 0..20 {
        let manager = manager.clone();
        let key = if i % 2 == 0 {
            alice()
        } else {
            SessionKey::new("bob", Provider::Srt)
        };
        handles.push(tokio::spawn(async move { manager.acquire(&key).await }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(fx.auth.logins(), 2);
    assert_eq!(manager.open_gates(), 0);

    let stale = manager.acquire(&alice()).await.unwrap();
    manager.invalidate_handle(&stale).await.unwrap();
    assert_eq!(manager.open_gates(), 0);
}

#[tokio::test]
async fn workers_share_handles_through_the_store() {
    let fx = Fixture::new(ScriptedAuthenticator::new());
    let a = fx.manager("worker-a");
    let b = fx.manager("worker-b");

    let from_a = a.acquire(&alice()).await.unwrap();
    let from_b = b.acquire(&alice()).await.unwrap();
    assert_eq!(*from_a, *from_b);
    assert_eq!(fx.auth.logins(), 1);

    // A deletion by one worker is seen by the other on its next acquire.
    a.invalidate(&alice()).await.unwrap();
    let renewed = b.acquire(&alice()).await.unwrap();
    assert_eq!(renewed.token, "token-2");
}

#[tokio::test]
async fn racing_workers_make_one_login() {
    let fx = Fixture::new(ScriptedAuthenticator::new().with_delay(Duration::from_millis(100)));
    let a = Arc::new(fx.manager("worker-a"));
    let b = Arc::new(fx.manager("worker-b"));

    let ta = tokio::spawn({
        let a = a.clone();
        async move { a.acquire(&alice()).await }
    });
    let tb = tokio::spawn({
        let b = b.clone();
        async move { b.acquire(&alice()).await }
    });
    let ha = ta.await.unwrap().unwrap();
    let hb = tb.await.unwrap().unwrap();

    assert_eq!(ha.token, hb.token);
    assert_eq!(fx.auth.logins(), 1);
    // The claim is released once the winner stores its handle.
    assert!(fx.store.claim_owner(&alice().storage_key()).is_none());
}

#[tokio::test]
async fn missing_login_is_reported() {
    let fx = Fixture::new(ScriptedAuthenticator::new());
    let manager = fx.manager("w1");

    let err = manager
        .acquire(&SessionKey::new("carol", Provider::Ktx))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingCredentials(_)));
    assert_eq!(err.class(), ErrorClass::InvalidCredentials);
    assert_eq!(fx.auth.logins(), 0);
}

#[tokio::test]
async fn rejected_login_stores_nothing_and_releases_claim() {
    let auth = ScriptedAuthenticator::new();
    auth.push(Err(UpstreamError::from_message(
        "로그인 정보를 다시 확인하세요",
    )));
    let fx = Fixture::new(auth);
    let manager = fx.manager("w1");

    let err = manager.acquire(&alice()).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::InvalidCredentials);
    assert_eq!(fx.store.puts(), 0);
    assert!(fx.store.claim_owner(&alice().storage_key()).is_none());

    // The next attempt logs in again.
    assert_eq!(manager.acquire(&alice()).await.unwrap().token, "token-2");
}

#[tokio::test]
async fn handle_inside_refresh_margin_is_renewed() {
    let auth = ScriptedAuthenticator::new();
    auth.push(Ok(SessionMaterial {
        token: "short-lived".to_string(),
        // Shorter than the 300s refresh margin.
        expires_in_secs: Some(60),
        ..SessionMaterial::default()
    }));
    let fx = Fixture::new(auth);
    let manager = fx.manager("w1");

    assert_eq!(manager.acquire(&alice()).await.unwrap().token, "short-lived");
    assert_eq!(manager.acquire(&alice()).await.unwrap().token, "token-2");
}

#[tokio::test]
async fn blob_copied_under_another_key_is_treated_as_absent() {
    let fx = Fixture::new(ScriptedAuthenticator::new());
    let manager = fx.manager("w1");
    manager.acquire(&alice()).await.unwrap();

    let bob = SessionKey::new("bob", Provider::Srt);
    let stolen = fx.store.raw(&alice().storage_key()).unwrap();
    fx.store
        .insert_raw(&bob.storage_key(), stolen, Duration::from_secs(600));

    let handle = manager.acquire(&bob).await.unwrap();
    assert_eq!(handle.key, bob);
    assert_eq!(fx.auth.logins(), 2);
}

#[tokio::test]
async fn handles_survive_across_key_rings_sharing_a_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = railsnipe_storage::Database::open(dir.path().join("s.db").to_str().unwrap())
        .await
        .unwrap();
    let params = railsnipe_vault::KdfParams {
        memory_cost: 32768,
        iterations: 2,
        parallelism: 1,
    };
    let secret = secrecy_secret("deploy-secret");
    let ring_a = KeyRing::open_or_create(db.connection(), &secret, params)
        .await
        .unwrap();
    let ring_b = KeyRing::open_or_create(db.connection(), &secret, params)
        .await
        .unwrap();

    let store: Arc<dyn SessionStore> = Arc::new(railsnipe_storage::SqliteStore::new(db.clone()));
    let auth = Arc::new(ScriptedAuthenticator::new());
    let make = |ring: KeyRing, worker: &str| {
        SessionManager::new(
            store.clone(),
            auth.clone(),
            credentials(),
            Arc::new(ring),
            config(),
            worker,
        )
    };
    let a = make(ring_a, "worker-a");
    let b = make(ring_b, "worker-b");

    let ha = a.acquire(&alice()).await.unwrap();
    let hb = b.acquire(&alice()).await.unwrap();
    assert_eq!(*ha, *hb);
    assert_eq!(auth.logins(), 1);
}

fn secrecy_secret(s: &str) -> secrecy::SecretString {
    secrecy::SecretString::from(s.to_string())
}
