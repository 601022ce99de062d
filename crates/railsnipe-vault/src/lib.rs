// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encryption at rest for railsnipe.
//!
//! A single master key (the [`KeyRing`]) seals session handles and the
//! credential vault with AES-256-GCM. The master key is wrapped by an
//! Argon2id-derived key from the deployment secret and shared by every worker
//! through the database.

pub mod credentials;
pub mod crypto;
pub mod kdf;
pub mod keyring;
pub mod secret;

pub use credentials::{mask_secret, CredentialVault, EntryKind};
pub use kdf::KdfParams;
pub use keyring::KeyRing;
pub use secret::{read_hidden, resolve_vault_secret, LOGIN_PASSWORD_ENV_VAR, VAULT_KEY_ENV_VAR};
