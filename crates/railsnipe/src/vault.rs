// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `railsnipe vault` command implementation.
//!
//! Secrets are read from environment variables when set, otherwise from a
//! hidden terminal prompt. They are never taken from the command line.

use std::sync::Arc;

use railsnipe_config::RailsnipeConfig;
use railsnipe_core::{CardInfo, RailsnipeError, UserRef};
use railsnipe_storage::SqliteStore;
use railsnipe_vault::{
    CredentialVault, EntryKind, KdfParams, KeyRing, LOGIN_PASSWORD_ENV_VAR, read_hidden,
    resolve_vault_secret,
};

use crate::VaultCommand;

const CARD_NUMBER_ENV_VAR: &str = "RAILSNIPE_CARD_NUMBER";
const CARD_PASSWORD_ENV_VAR: &str = "RAILSNIPE_CARD_PASSWORD";
const CARD_BIRTHDAY_ENV_VAR: &str = "RAILSNIPE_CARD_BIRTHDAY";
const CARD_EXPIRE_ENV_VAR: &str = "RAILSNIPE_CARD_EXPIRE";

/// Opens the shared database and unlocks (or creates) the key ring.
pub async fn open_vault(config: &RailsnipeConfig) -> Result<(SqliteStore, Arc<KeyRing>), RailsnipeError> {
    let store = SqliteStore::open(&config.storage).await?;
    let secret = resolve_vault_secret()?;
    let keyring = KeyRing::open_or_create(
        store.database().connection(),
        &secret,
        KdfParams::from(&config.vault),
    )
    .await?;
    Ok((store, Arc::new(keyring)))
}

pub async fn run(config: &RailsnipeConfig, action: VaultCommand) -> Result<(), RailsnipeError> {
    let (store, keyring) = open_vault(config).await?;
    let vault = CredentialVault::new(keyring, store.database().connection().clone());

    match action {
        VaultCommand::SetLogin {
            user,
            provider,
            login_id,
        } => {
            let password = read_hidden("Password: ", LOGIN_PASSWORD_ENV_VAR)?;
            vault
                .store_login(&UserRef(user.clone()), provider, &login_id, &password)
                .await?;
            println!("stored {provider} login for {user}");
        }
        VaultCommand::SetCard { user, provider } => {
            let card = CardInfo {
                number: read_hidden("Card number: ", CARD_NUMBER_ENV_VAR)?,
                password: read_hidden("First two PIN digits: ", CARD_PASSWORD_ENV_VAR)?,
                birthday: read_hidden(
                    "Birth date (YYMMDD) or business number: ",
                    CARD_BIRTHDAY_ENV_VAR,
                )?,
                expire: read_hidden("Expiry (YYMM): ", CARD_EXPIRE_ENV_VAR)?,
            };
            vault.store_card(&UserRef(user.clone()), provider, &card).await?;
            println!(
                "stored {provider} card {} for {user}",
                card.masked_number()
            );
        }
        VaultCommand::Remove {
            user,
            provider,
            card,
        } => {
            let kind = if card { EntryKind::Card } else { EntryKind::Login };
            let removed = vault.delete(kind, &UserRef(user.clone()), provider).await?;
            if removed {
                println!("removed {kind:?} for {user} at {provider}");
            } else {
                println!("nothing stored for {user} at {provider}");
            }
        }
        VaultCommand::List => {
            let entries = vault.list().await?;
            if entries.is_empty() {
                println!("vault is empty");
            }
            for (name, preview) in entries {
                println!("{name}\t{preview}");
            }
        }
    }
    Ok(())
}
