// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic validation of loaded configuration values.
//!
//! Figment/serde catch structural errors (types, unknown keys); this module
//! catches values that parse but make no sense.

use engram_core::EngramError;

use crate::model::EngramConfig;

/// Minimum PBKDF2 iteration count accepted for passphrase derivation.
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// Validate a loaded configuration, returning the first problem found.
pub fn validate(config: &EngramConfig) -> Result<(), EngramError> {
    if config.crypto.kdf_iterations < MIN_KDF_ITERATIONS {
        return Err(EngramError::Config(format!(
            "crypto.kdf_iterations must be at least {MIN_KDF_ITERATIONS}, got {}",
            config.crypto.kdf_iterations
        )));
    }

    if config.memory.embedding_dim == 0 {
        return Err(EngramError::Config(
            "memory.embedding_dim must be greater than zero".to_string(),
        ));
    }

    let threshold = config.memory.similarity_threshold;
    if !(-1.0..=1.0).contains(&threshold) {
        return Err(EngramError::Config(format!(
            "memory.similarity_threshold must be within [-1.0, 1.0], got {threshold}"
        )));
    }

    if config.storage.database_path.is_empty() {
        return Err(EngramError::Config(
            "storage.database_path must not be empty".to_string(),
        ));
    }

    Ok(())
}
