// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM seal/open with associated data.
//!
//! Every [`seal`] draws a fresh random 96-bit nonce from the system CSPRNG.
//! The associated data binds a ciphertext to the name it is stored under, so
//! a blob copied to another key fails to open.

use railsnipe_core::{EncryptedBlob, RailsnipeError};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

fn aead_key(key: &[u8; 32]) -> Result<LessSafeKey, RailsnipeError> {
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| RailsnipeError::Vault("failed to create AES-256-GCM key".to_string()))
}

/// Encrypt `plaintext` under `key`, authenticating `aad` alongside it.
pub fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<EncryptedBlob, RailsnipeError> {
    let key = aead_key(key)?;

    let mut nonce = [0u8; 12];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| RailsnipeError::Vault("failed to generate random nonce".to_string()))?;

    let mut ciphertext = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        Aad::from(aad),
        &mut ciphertext,
    )
    .map_err(|_| RailsnipeError::Vault("AES-256-GCM encryption failed".to_string()))?;

    Ok(EncryptedBlob { nonce, ciphertext })
}

/// Decrypt `blob`. Fails on a wrong key, a wrong `aad`, or tampered bytes.
pub fn open(
    key: &[u8; 32],
    blob: &EncryptedBlob,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, RailsnipeError> {
    let key = aead_key(key)?;

    let mut in_out = Zeroizing::new(blob.ciphertext.clone());
    let len = key
        .open_in_place(
            Nonce::assume_unique_for_key(blob.nonce),
            Aad::from(aad),
            in_out.as_mut_slice(),
        )
        .map_err(|_| {
            RailsnipeError::Vault(
                "AES-256-GCM decryption failed -- wrong key, wrong binding or corrupted data"
                    .to_string(),
            )
        })?
        .len();
    in_out.truncate(len);
    Ok(in_out)
}

/// Generate a random 32-byte key suitable for AES-256-GCM.
pub fn generate_random_key() -> Result<[u8; 32], RailsnipeError> {
    let mut key = [0u8; 32];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| RailsnipeError::Vault("failed to generate random key".to_string()))?;
    Ok(key)
}
