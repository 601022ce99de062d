// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted session handle entries.

use railsnipe_core::{EncryptedBlob, RailsnipeError};
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Fetch the blob under `key` unless it expired at or before `now`.
pub async fn get_entry(
    db: &Database,
    key: &str,
    now: i64,
) -> Result<Option<EncryptedBlob>, RailsnipeError> {
    let key = key.to_string();
    let row = db
        .connection()
        .call(move |conn| -> Result<Option<(Vec<u8>, Vec<u8>)>, rusqlite::Error> {
            let result = conn.query_row(
                "SELECT nonce, ciphertext FROM session_entries
                 WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            );
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    let Some((nonce, ciphertext)) = row else {
        return Ok(None);
    };
    let nonce: [u8; 12] = nonce.as_slice().try_into().map_err(|_| RailsnipeError::Storage {
        source: "session entry has a malformed nonce".into(),
    })?;
    Ok(Some(EncryptedBlob { nonce, ciphertext }))
}

/// Insert or replace the blob under `key`.
pub async fn put_entry(
    db: &Database,
    key: &str,
    blob: EncryptedBlob,
    expires_at: i64,
) -> Result<(), RailsnipeError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO session_entries (key, nonce, ciphertext, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    nonce = excluded.nonce,
                    ciphertext = excluded.ciphertext,
                    expires_at = excluded.expires_at,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![key, blob.nonce.as_slice(), blob.ciphertext, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_entry(db: &Database, key: &str) -> Result<(), RailsnipeError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM session_entries WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete entries expired at `now`. Returns the number removed.
pub async fn purge_expired(db: &Database, now: i64) -> Result<u64, RailsnipeError> {
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM session_entries WHERE expires_at <= ?1",
                params![now],
            )
        })
        .await
        .map_err(map_tr_err)
        .map(|n| n as u64)
}
