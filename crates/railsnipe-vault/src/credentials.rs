// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted provider logins and payment cards.
//!
//! Entries live in `vault_entries` keyed by `login:{provider}:{user}` or
//! `card:{provider}:{user}`. The entry name is the AEAD associated data, so a
//! ciphertext copied onto another row fails to decrypt.

use std::sync::Arc;

use async_trait::async_trait;
use railsnipe_core::{
    CardInfo, CredentialSource, Credentials, EncryptedBlob, PaymentMethods, Provider,
    RailsnipeError, SessionKey, UserRef,
};
use rusqlite::params;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::keyring::{map_tr_err, KeyRing};

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredLogin {
    login_id: String,
    password: String,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredCard {
    number: String,
    password: String,
    birthday: String,
    expire: String,
}

/// What kind of material an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Login,
    Card,
}

impl EntryKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Card => "card",
        }
    }

    fn entry_name(self, user: &UserRef, provider: Provider) -> String {
        format!("{}:{provider}:{user}", self.prefix())
    }
}

/// Credential vault backed by the shared database.
pub struct CredentialVault {
    keyring: Arc<KeyRing>,
    conn: tokio_rusqlite::Connection,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    pub fn new(keyring: Arc<KeyRing>, conn: tokio_rusqlite::Connection) -> Self {
        Self { keyring, conn }
    }

    /// Store (or replace) the provider login for `user`.
    pub async fn store_login(
        &self,
        user: &UserRef,
        provider: Provider,
        login_id: &str,
        password: &SecretString,
    ) -> Result<(), RailsnipeError> {
        let stored = StoredLogin {
            login_id: login_id.to_string(),
            password: password.expose_secret().to_string(),
        };
        self.put(EntryKind::Login.entry_name(user, provider), &stored)
            .await
    }

    /// Store (or replace) the payment card for `user`.
    pub async fn store_card(
        &self,
        user: &UserRef,
        provider: Provider,
        card: &CardInfo,
    ) -> Result<(), RailsnipeError> {
        let stored = StoredCard {
            number: card.number.expose_secret().to_string(),
            password: card.password.expose_secret().to_string(),
            birthday: card.birthday.expose_secret().to_string(),
            expire: card.expire.expose_secret().to_string(),
        };
        self.put(EntryKind::Card.entry_name(user, provider), &stored)
            .await
    }

    /// Remove an entry. Removing a missing entry is not an error.
    pub async fn delete(
        &self,
        kind: EntryKind,
        user: &UserRef,
        provider: Provider,
    ) -> Result<bool, RailsnipeError> {
        let name = kind.entry_name(user, provider);
        let removed = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM vault_entries WHERE name = ?1", params![name])
            })
            .await
            .map_err(map_tr_err)?;
        Ok(removed > 0)
    }

    /// Every entry with a masked preview, ordered by name.
    pub async fn list(&self) -> Result<Vec<(String, String)>, RailsnipeError> {
        let names = self
            .conn
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT name FROM vault_entries ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)?;

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let preview = if name.starts_with("card:") {
                match self.get::<StoredCard>(&name).await? {
                    Some(card) => mask_card_number(&card.number),
                    None => continue,
                }
            } else {
                match self.get::<StoredLogin>(&name).await? {
                    Some(login) => mask_secret(&login.login_id),
                    None => continue,
                }
            };
            entries.push((name, preview));
        }
        Ok(entries)
    }

    async fn put<T: Serialize>(&self, name: String, value: &T) -> Result<(), RailsnipeError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(value)
                .map_err(|e| RailsnipeError::Vault(format!("failed to encode entry: {e}")))?,
        );
        let blob = self.keyring.seal(&plaintext, &name)?;
        debug!(entry = %name, "storing vault entry");
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO vault_entries (name, ciphertext, nonce) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name) DO UPDATE SET
                        ciphertext = excluded.ciphertext,
                        nonce = excluded.nonce,
                        updated_at = datetime('now')",
                    params![name, blob.ciphertext, blob.nonce.as_slice()],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        name: &str,
    ) -> Result<Option<T>, RailsnipeError> {
        let lookup = name.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(Vec<u8>, Vec<u8>)>, rusqlite::Error> {
                let mut stmt =
                    conn.prepare("SELECT ciphertext, nonce FROM vault_entries WHERE name = ?1")?;
                let mut rows = stmt.query_map(params![lookup], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.next().transpose()
            })
            .await
            .map_err(map_tr_err)?;

        let Some((ciphertext, nonce)) = row else {
            return Ok(None);
        };
        let nonce: [u8; 12] = nonce.as_slice().try_into().map_err(|_| {
            RailsnipeError::Vault(format!("corrupted nonce for vault entry '{name}'"))
        })?;
        let plaintext = self
            .keyring
            .open(&EncryptedBlob { nonce, ciphertext }, name)?;
        let value = serde_json::from_slice(&plaintext)
            .map_err(|e| RailsnipeError::Vault(format!("corrupted vault entry '{name}': {e}")))?;
        Ok(Some(value))
    }
}

#[async_trait]
impl CredentialSource for CredentialVault {
    async fn credentials(&self, key: &SessionKey) -> Result<Option<Credentials>, RailsnipeError> {
        let name = EntryKind::Login.entry_name(&key.user, key.provider);
        Ok(self.get::<StoredLogin>(&name).await?.map(|login| Credentials {
            login_id: login.login_id.clone(),
            password: SecretString::from(login.password.clone()),
        }))
    }
}

#[async_trait]
impl PaymentMethods for CredentialVault {
    async fn card_for(
        &self,
        user: &UserRef,
        provider: Provider,
    ) -> Result<Option<CardInfo>, RailsnipeError> {
        let name = EntryKind::Card.entry_name(user, provider);
        Ok(self.get::<StoredCard>(&name).await?.map(|card| CardInfo {
            number: SecretString::from(card.number.clone()),
            password: SecretString::from(card.password.clone()),
            birthday: SecretString::from(card.birthday.clone()),
            expire: SecretString::from(card.expire.clone()),
        }))
    }
}

/// Mask a value for display: first 4 and last 4 characters, `****` when short.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}...{suffix}")
}

fn mask_card_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().collect();
    let visible = digits.len().saturating_sub(4);
    let suffix: String = digits[visible..].iter().collect();
    format!("{}{suffix}", "*".repeat(visible))
}
