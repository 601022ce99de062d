// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable, cross-process storage of encrypted session handles.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RailsnipeError;
use crate::types::EncryptedBlob;

/// Keyed, TTL'd store of encrypted session blobs shared by every worker.
///
/// Only the session manager writes through this trait.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the blob stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<EncryptedBlob>, RailsnipeError>;

    /// Stores `blob` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, blob: EncryptedBlob, ttl: Duration)
    -> Result<(), RailsnipeError>;

    /// Removes the entry under `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), RailsnipeError>;

    /// Attempts to take the authentication claim for `key` on behalf of `owner`.
    ///
    /// Succeeds when no claim exists, the existing claim's lease has lapsed,
    /// or `owner` already holds it.
    async fn try_claim(&self, key: &str, owner: &str, lease: Duration)
    -> Result<bool, RailsnipeError>;

    /// Releases a claim held by `owner`. Claims held by others are untouched.
    async fn release_claim(&self, key: &str, owner: &str) -> Result<(), RailsnipeError>;

    /// Deletes expired entries and lapsed claims, returning how many entries went.
    async fn purge_expired(&self) -> Result<u64, RailsnipeError>;
}
