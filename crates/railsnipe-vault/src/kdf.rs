// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argon2id derivation of the key that wraps the master key.

use railsnipe_config::model::VaultConfig;
use railsnipe_core::RailsnipeError;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Argon2id cost parameters, persisted next to the wrapped key so a later
/// config change cannot lock existing data out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl From<&VaultConfig> for KdfParams {
    fn from(config: &VaultConfig) -> Self {
        Self {
            memory_cost: config.kdf_memory_cost,
            iterations: config.kdf_iterations,
            parallelism: config.kdf_parallelism,
        }
    }
}

impl KdfParams {
    /// Derive a 32-byte key from `secret` (Argon2id, v0x13), zeroed on drop.
    pub fn derive_key(
        &self,
        secret: &[u8],
        salt: &[u8; 16],
    ) -> Result<Zeroizing<[u8; 32]>, RailsnipeError> {
        let params =
            argon2::Params::new(self.memory_cost, self.iterations, self.parallelism, Some(32))
                .map_err(|e| RailsnipeError::Vault(format!("invalid Argon2id parameters: {e}")))?;
        let argon2 =
            argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut output = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(secret, salt, output.as_mut())
            .map_err(|e| RailsnipeError::Vault(format!("Argon2id key derivation failed: {e}")))?;
        Ok(output)
    }
}

/// Generate a random 16-byte salt.
pub fn generate_salt() -> Result<[u8; 16], RailsnipeError> {
    let mut salt = [0u8; 16];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| RailsnipeError::Vault("failed to generate random salt".to_string()))?;
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: KdfParams = KdfParams {
        memory_cost: 32768,
        iterations: 2,
        parallelism: 1,
    };

    #[test]
    fn derivation_is_deterministic() {
        let salt = [1u8; 16];
        let a = FAST.derive_key(b"vault secret", &salt).unwrap();
        let b = FAST.derive_key(b"vault secret", &salt).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn secret_and_salt_both_matter() {
        let base = FAST.derive_key(b"one", &[1u8; 16]).unwrap();
        assert_ne!(*base, *FAST.derive_key(b"two", &[1u8; 16]).unwrap());
        assert_ne!(*base, *FAST.derive_key(b"one", &[2u8; 16]).unwrap());
    }

    #[test]
    fn params_follow_config() {
        let params = KdfParams::from(&VaultConfig::default());
        assert_eq!(params.memory_cost, 65536);
        assert_eq!(params.iterations, 3);
        assert_eq!(params.parallelism, 4);
    }

    #[test]
    fn zero_memory_cost_is_rejected() {
        let bad = KdfParams {
            memory_cost: 0,
            ..FAST
        };
        assert!(bad.derive_key(b"x", &[0u8; 16]).is_err());
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(generate_salt().unwrap(), generate_salt().unwrap());
    }
}
