// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Passphrase acquisition via TTY prompt or `ENGRAM_PASSPHRASE`.

use engram_core::EngramError;
use secrecy::SecretString;

/// The environment variable name for providing the store passphrase.
pub const PASSPHRASE_ENV_VAR: &str = "ENGRAM_PASSPHRASE";

/// Get the store passphrase from environment variable or interactive prompt.
///
/// Priority:
/// 1. `ENGRAM_PASSPHRASE` environment variable (headless/scripted use)
/// 2. Interactive TTY prompt via `rpassword`
///
/// Returns `None` when neither source is available; the caller falls back
/// to key-file or random-key resolution.
pub fn get_passphrase() -> Result<Option<SecretString>, EngramError> {
    if let Ok(pass) = std::env::var(PASSPHRASE_ENV_VAR)
        && !pass.is_empty()
    {
        return Ok(Some(SecretString::from(pass)));
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        eprint!("Passphrase (empty for random key): ");
        let passphrase = rpassword::read_password()
            .map_err(|e| EngramError::KeyLoad(format!("failed to read passphrase: {e}")))?;
        if passphrase.is_empty() {
            return Ok(None);
        }
        return Ok(Some(SecretString::from(passphrase)));
    }

    Ok(None)
}
