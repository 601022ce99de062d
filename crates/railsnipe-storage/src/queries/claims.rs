// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leased authentication claims.
//!
//! A claim is taken with a single conditional upsert, so two workers racing
//! for the same key cannot both win.

use railsnipe_core::RailsnipeError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Take the claim on `key` for `owner` until `lease_until`.
///
/// Wins when no claim exists, the current lease lapsed at `now`, or `owner`
/// already holds it (which extends the lease).
pub async fn try_claim(
    db: &Database,
    key: &str,
    owner: &str,
    now: i64,
    lease_until: i64,
) -> Result<bool, RailsnipeError> {
    let key = key.to_string();
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "INSERT INTO session_claims (key, owner, lease_until) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    owner = excluded.owner,
                    lease_until = excluded.lease_until
                 WHERE session_claims.lease_until <= ?4
                    OR session_claims.owner = excluded.owner",
                params![key, owner, lease_until, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Release `owner`'s claim on `key`. A claim held by someone else is left alone.
pub async fn release_claim(db: &Database, key: &str, owner: &str) -> Result<(), RailsnipeError> {
    let key = key.to_string();
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "DELETE FROM session_claims WHERE key = ?1 AND owner = ?2",
                params![key, owner],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Drop claims whose lease lapsed at `now`.
pub async fn purge_lapsed(db: &Database, now: i64) -> Result<u64, RailsnipeError> {
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM session_claims WHERE lease_until <= ?1",
                params![now],
            )
        })
        .await
        .map_err(map_tr_err)
        .map(|n| n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn only_one_owner_holds_a_live_claim() {
        let (db, _dir) = setup_db().await;
        assert!(try_claim(&db, "k", "worker-a", 0, 1_000).await.unwrap());
        assert!(!try_claim(&db, "k", "worker-b", 500, 1_500).await.unwrap());
        // The holder may extend.
        assert!(try_claim(&db, "k", "worker-a", 500, 2_000).await.unwrap());
        assert!(!try_claim(&db, "k", "worker-b", 1_500, 2_500).await.unwrap());
    }

    #[tokio::test]
    async fn lapsed_claim_can_be_taken_over() {
        let (db, _dir) = setup_db().await;
        assert!(try_claim(&db, "k", "worker-a", 0, 1_000).await.unwrap());
        assert!(try_claim(&db, "k", "worker-b", 1_000, 2_000).await.unwrap());
        // worker-a's release no longer touches worker-b's claim.
        release_claim(&db, "k", "worker-a").await.unwrap();
        assert!(!try_claim(&db, "k", "worker-c", 1_500, 2_500).await.unwrap());
    }

    #[tokio::test]
    async fn release_frees_the_key() {
        let (db, _dir) = setup_db().await;
        assert!(try_claim(&db, "k", "worker-a", 0, 1_000).await.unwrap());
        release_claim(&db, "k", "worker-a").await.unwrap();
        assert!(try_claim(&db, "k", "worker-b", 10, 1_010).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let (db, _dir) = setup_db().await;
        let mut handles = Vec::new();
        for i in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                try_claim(&db, "k", &format!("worker-{i}"), 0, 1_000)
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn purge_drops_only_lapsed_claims() {
        let (db, _dir) = setup_db().await;
        try_claim(&db, "a", "w", 0, 100).await.unwrap();
        try_claim(&db, "b", "w", 0, 1_000).await.unwrap();
        assert_eq!(purge_lapsed(&db, 500).await.unwrap(), 1);
    }
}
