// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Engram memory store.

use thiserror::Error;

/// The primary error type used across all Engram crates.
#[derive(Debug, Error)]
pub enum EngramError {
    /// Key file exists but could not be decoded into key material.
    ///
    /// Fatal at store construction time: the store never falls back to a
    /// different key when the configured one cannot be loaded.
    #[error("key load error: {0}")]
    KeyLoad(String),

    /// A memory referenced a context that does not exist.
    #[error("context not found: {id}")]
    ContextNotFound { id: String },

    /// The requested memory record does not exist.
    #[error("memory not found: {id}")]
    NotFound { id: i64 },

    /// AEAD authentication failed: wrong key, truncated or corrupted data.
    ///
    /// Covers the "wrong passphrase opens an existing store" case, which
    /// surfaces on the first decrypt rather than producing garbage.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// A batch store failed and was rolled back; no partial batch remains.
    #[error("batch store failed: {source}")]
    BatchStore {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Cryptographic primitive errors outside the decrypt path (RNG, KDF,
    /// key construction).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Storage backend errors (connection, query failure, migrations).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding collaborator errors (model failure, dimension mismatch).
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl EngramError {
    /// Wrap an arbitrary error as a storage error.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EngramError::Storage {
            source: Box::new(source),
        }
    }
}
