// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret acquisition: the deployment secret from `RAILSNIPE_VAULT_KEY` or a
//! TTY prompt, and hidden input for logins and cards.

use std::io::IsTerminal;

use railsnipe_core::RailsnipeError;
use secrecy::SecretString;

/// The environment variable holding the deployment secret.
pub const VAULT_KEY_ENV_VAR: &str = "RAILSNIPE_VAULT_KEY";

/// Environment variable consulted by `vault set-login` before prompting.
pub const LOGIN_PASSWORD_ENV_VAR: &str = "RAILSNIPE_LOGIN_PASSWORD";

/// Resolve the deployment secret.
///
/// The environment variable wins so workers can run headless; otherwise the
/// operator is prompted when stdin is a terminal.
pub fn resolve_vault_secret() -> Result<SecretString, RailsnipeError> {
    if let Some(secret) = non_empty_env(VAULT_KEY_ENV_VAR) {
        return Ok(secret);
    }
    if std::io::stdin().is_terminal() {
        return prompt_hidden("Vault secret: ");
    }
    Err(RailsnipeError::Vault(format!(
        "no vault secret provided. Set {VAULT_KEY_ENV_VAR} or run interactively"
    )))
}

/// Read a hidden value, preferring `env_var` when it is set.
pub fn read_hidden(prompt: &str, env_var: &str) -> Result<SecretString, RailsnipeError> {
    if let Some(value) = non_empty_env(env_var) {
        return Ok(value);
    }
    if std::io::stdin().is_terminal() {
        return prompt_hidden(prompt);
    }
    Err(RailsnipeError::Vault(format!(
        "stdin is not a terminal and {env_var} is not set"
    )))
}

fn prompt_hidden(prompt: &str) -> Result<SecretString, RailsnipeError> {
    eprint!("{prompt}");
    let value = rpassword::read_password()
        .map_err(|e| RailsnipeError::Vault(format!("failed to read input: {e}")))?;
    if value.is_empty() {
        return Err(RailsnipeError::Vault("empty input not allowed".to_string()));
    }
    Ok(SecretString::from(value))
}

fn non_empty_env(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn secret_comes_from_env_var() {
        // SAFETY: env mutation is serialized across tests.
        unsafe { std::env::set_var(VAULT_KEY_ENV_VAR, "deploy-secret") };
        let result = resolve_vault_secret();
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };

        assert_eq!(result.unwrap().expose_secret(), "deploy-secret");
    }

    #[test]
    #[serial]
    fn empty_env_var_is_ignored() {
        unsafe { std::env::set_var(VAULT_KEY_ENV_VAR, "") };
        // stdin is not a terminal under the test harness.
        let result = resolve_vault_secret();
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn read_hidden_uses_named_env_var() {
        unsafe { std::env::set_var(LOGIN_PASSWORD_ENV_VAR, "hunter2") };
        let result = read_hidden("Password: ", LOGIN_PASSWORD_ENV_VAR);
        unsafe { std::env::remove_var(LOGIN_PASSWORD_ENV_VAR) };

        assert_eq!(result.unwrap().expose_secret(), "hunter2");
    }
}
