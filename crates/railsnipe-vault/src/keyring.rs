// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The shared master key.
//!
//! A random master key encrypts every session handle and vault entry. It is
//! stored in `vault_meta` wrapped by a key derived from the deployment secret
//! (Argon2id), so every worker that knows the secret unwraps the same master
//! key. Rotating the secret only re-wraps the master key.

use std::collections::HashMap;

use railsnipe_core::{EncryptedBlob, RailsnipeError};
use rusqlite::{params, TransactionBehavior};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto;
use crate::kdf::{generate_salt, KdfParams};

const WRAPPED_KEY: &str = "wrapped_master_key";
const WRAP_NONCE: &str = "master_key_nonce";
const KDF_SALT: &str = "kdf_salt";
const KDF_PARAMS: &str = "kdf_params";

/// Associated data of the wrapped master key itself.
const WRAP_AAD: &[u8] = b"railsnipe:master-key";

/// The unwrapped master key, held only in memory.
pub struct KeyRing {
    master_key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

/// Material written to `vault_meta` when the key ring is first created.
struct WrappedKey {
    wrapped: Vec<u8>,
    nonce: [u8; 12],
    salt: [u8; 16],
    params: Vec<u8>,
}

impl WrappedKey {
    fn wrap(
        master_key: &[u8; 32],
        secret: &SecretString,
        params: KdfParams,
    ) -> Result<Self, RailsnipeError> {
        let salt = generate_salt()?;
        let wrapping_key = params.derive_key(secret.expose_secret().as_bytes(), &salt)?;
        let blob = crypto::seal(&wrapping_key, master_key, WRAP_AAD)?;
        let params = serde_json::to_vec(&params)
            .map_err(|e| RailsnipeError::Vault(format!("failed to encode KDF params: {e}")))?;
        Ok(Self {
            wrapped: blob.ciphertext,
            nonce: blob.nonce,
            salt,
            params,
        })
    }
}

impl KeyRing {
    /// A key ring with a random key that is never persisted (tests, single-process runs).
    pub fn ephemeral() -> Result<Self, RailsnipeError> {
        Ok(Self {
            master_key: Zeroizing::new(crypto::generate_random_key()?),
        })
    }

    /// True once some process has created the key ring in this database.
    pub async fn exists(conn: &tokio_rusqlite::Connection) -> Result<bool, RailsnipeError> {
        conn.call(|conn| -> Result<bool, rusqlite::Error> {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM vault_meta WHERE key = ?1)",
                params![WRAPPED_KEY],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
    }

    /// Unlocks the existing key ring, creating it first if this is the first worker.
    ///
    /// Two workers racing to create it both end up with the winner's key.
    pub async fn open_or_create(
        conn: &tokio_rusqlite::Connection,
        secret: &SecretString,
        params: KdfParams,
    ) -> Result<Self, RailsnipeError> {
        if Self::exists(conn).await? {
            return Self::unlock(conn, secret).await;
        }
        match Self::create(conn, secret, params).await? {
            Some(ring) => Ok(ring),
            None => Self::unlock(conn, secret).await,
        }
    }

    /// Creates a new key ring. Returns `None` if one already exists.
    pub async fn create(
        conn: &tokio_rusqlite::Connection,
        secret: &SecretString,
        params: KdfParams,
    ) -> Result<Option<Self>, RailsnipeError> {
        let master_key = Zeroizing::new(crypto::generate_random_key()?);
        let wrapped = WrappedKey::wrap(&master_key, secret, params)?;

        let created = conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM vault_meta WHERE key = ?1)",
                    params![WRAPPED_KEY],
                    |row| row.get(0),
                )?;
                if exists {
                    return Ok(false);
                }
                write_meta(&tx, &wrapped)?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(map_tr_err)?;

        if created {
            info!("key ring created");
            Ok(Some(Self { master_key }))
        } else {
            debug!("key ring already created by another worker");
            Ok(None)
        }
    }

    /// Unwraps the stored master key with `secret`.
    pub async fn unlock(
        conn: &tokio_rusqlite::Connection,
        secret: &SecretString,
    ) -> Result<Self, RailsnipeError> {
        let meta = conn
            .call(|conn| -> Result<HashMap<String, Vec<u8>>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT key, value FROM vault_meta")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)?;

        let field = |name: &str| {
            meta.get(name)
                .ok_or_else(|| RailsnipeError::Vault(format!("key ring is missing `{name}`")))
        };

        let params: KdfParams = serde_json::from_slice(field(KDF_PARAMS)?)
            .map_err(|e| RailsnipeError::Vault(format!("corrupted KDF params: {e}")))?;
        let salt: [u8; 16] = field(KDF_SALT)?
            .as_slice()
            .try_into()
            .map_err(|_| RailsnipeError::Vault("corrupted salt (expected 16 bytes)".to_string()))?;
        let nonce: [u8; 12] = field(WRAP_NONCE)?
            .as_slice()
            .try_into()
            .map_err(|_| RailsnipeError::Vault("corrupted nonce (expected 12 bytes)".to_string()))?;
        let blob = EncryptedBlob {
            nonce,
            ciphertext: field(WRAPPED_KEY)?.clone(),
        };

        let wrapping_key = params.derive_key(secret.expose_secret().as_bytes(), &salt)?;
        let unwrapped = crypto::open(&wrapping_key, &blob, WRAP_AAD).map_err(|_| {
            RailsnipeError::Vault("invalid vault secret or corrupted key ring".to_string())
        })?;
        let master_key: [u8; 32] = unwrapped.as_slice().try_into().map_err(|_| {
            RailsnipeError::Vault("corrupted master key (expected 32 bytes)".to_string())
        })?;

        debug!("key ring unlocked");
        Ok(Self {
            master_key: Zeroizing::new(master_key),
        })
    }

    /// Re-wraps the master key under `new_secret`. Stored data is not re-encrypted.
    pub async fn rotate_secret(
        &self,
        conn: &tokio_rusqlite::Connection,
        new_secret: &SecretString,
        params: KdfParams,
    ) -> Result<(), RailsnipeError> {
        let wrapped = WrappedKey::wrap(&self.master_key, new_secret, params)?;
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            write_meta(&tx, &wrapped)?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)?;
        info!("vault secret rotated");
        Ok(())
    }

    /// Encrypts `plaintext` bound to `name`.
    pub fn seal(&self, plaintext: &[u8], name: &str) -> Result<EncryptedBlob, RailsnipeError> {
        crypto::seal(&self.master_key, plaintext, name.as_bytes())
    }

    /// Decrypts a blob sealed under the same `name`.
    pub fn open(&self, blob: &EncryptedBlob, name: &str) -> Result<Zeroizing<Vec<u8>>, RailsnipeError> {
        crypto::open(&self.master_key, blob, name.as_bytes())
    }
}

fn write_meta(tx: &rusqlite::Transaction<'_>, wrapped: &WrappedKey) -> Result<(), rusqlite::Error> {
    let rows: [(&str, &[u8]); 4] = [
        (WRAPPED_KEY, &wrapped.wrapped),
        (WRAP_NONCE, &wrapped.nonce),
        (KDF_SALT, &wrapped.salt),
        (KDF_PARAMS, &wrapped.params),
    ];
    for (key, value) in rows {
        tx.execute(
            "INSERT OR REPLACE INTO vault_meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }
    Ok(())
}

/// Convert tokio-rusqlite errors to `RailsnipeError::Vault`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> RailsnipeError {
    RailsnipeError::Vault(format!("vault database error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) const FAST: KdfParams = KdfParams {
        memory_cost: 32768,
        iterations: 2,
        parallelism: 1,
    };

    async fn open_test_db() -> (railsnipe_storage::Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = railsnipe_storage::Database::open(dir.path().join("vault.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn create_then_unlock_yields_same_key() {
        let (db, _dir) = open_test_db().await;
        let conn = db.connection();
        let secret = SecretString::from("deploy-secret");

        assert!(!KeyRing::exists(conn).await.unwrap());
        let ring = KeyRing::open_or_create(conn, &secret, FAST).await.unwrap();
        assert!(KeyRing::exists(conn).await.unwrap());

        let blob = ring.seal(b"payload", "session:SRT:alice").unwrap();
        drop(ring);

        // Another worker with the same secret opens what the first one sealed.
        let other = KeyRing::open_or_create(conn, &secret, FAST).await.unwrap();
        let plain = other.open(&blob, "session:SRT:alice").unwrap();
        assert_eq!(plain.as_slice(), b"payload");
    }

    #[tokio::test]
    async fn second_create_defers_to_existing_ring() {
        let (db, _dir) = open_test_db().await;
        let conn = db.connection();
        let secret = SecretString::from("deploy-secret");

        let first = KeyRing::create(conn, &secret, FAST).await.unwrap();
        assert!(first.is_some());
        assert!(KeyRing::create(conn, &secret, FAST).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_secret_fails_clearly() {
        let (db, _dir) = open_test_db().await;
        let conn = db.connection();
        KeyRing::open_or_create(conn, &SecretString::from("right"), FAST)
            .await
            .unwrap();

        let err = KeyRing::unlock(conn, &SecretString::from("wrong"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid vault secret"), "{err}");
    }

    #[tokio::test]
    async fn rotation_keeps_data_readable() {
        let (db, _dir) = open_test_db().await;
        let conn = db.connection();
        let old = SecretString::from("old-secret");
        let new = SecretString::from("new-secret");

        let ring = KeyRing::open_or_create(conn, &old, FAST).await.unwrap();
        let blob = ring.seal(b"card", "card:KTX:bob").unwrap();
        ring.rotate_secret(conn, &new, FAST).await.unwrap();
        drop(ring);

        assert!(KeyRing::unlock(conn, &old).await.is_err());
        let ring = KeyRing::unlock(conn, &new).await.unwrap();
        assert_eq!(ring.open(&blob, "card:KTX:bob").unwrap().as_slice(), b"card");
    }

    #[test]
    fn ephemeral_rings_do_not_share_keys() {
        let a = KeyRing::ephemeral().unwrap();
        let b = KeyRing::ephemeral().unwrap();
        let blob = a.seal(b"x", "n").unwrap();
        assert!(b.open(&blob, "n").is_err());
        assert!(format!("{a:?}").contains("REDACTED"));
    }
}
