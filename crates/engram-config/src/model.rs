// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Engram memory store.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Engram configuration.
///
/// Loaded from TOML files with environment variable overrides. All sections
/// are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngramConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Key derivation and key file settings.
    #[serde(default)]
    pub crypto: CryptoConfig,

    /// Embedding and semantic search settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("engram/engram.db").to_string_lossy().into_owned())
        .unwrap_or_else(|| "engram.db".to_string())
}

/// Key derivation configuration.
///
/// Controls the PBKDF2-HMAC-SHA256 parameters used when deriving the store
/// key from a passphrase, and the optional key file location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CryptoConfig {
    /// PBKDF2 iteration count (default: 100_000; validation rejects less).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Optional key file path. When set, the key is loaded from (or created
    /// at) this path instead of being derived per process.
    #[serde(default)]
    pub key_file: Option<String>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: default_kdf_iterations(),
            key_file: None,
        }
    }
}

fn default_kdf_iterations() -> u32 {
    100_000
}

/// Embedding and semantic search configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Embedding vector dimensions.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Default minimum cosine similarity for semantic search results.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Default maximum number of semantic search results.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
        }
    }
}

fn default_embedding_dim() -> usize {
    384
}

fn default_similarity_threshold() -> f32 {
    0.5
}

fn default_max_results() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = EngramConfig::default();
        assert_eq!(config.crypto.kdf_iterations, 100_000);
        assert!(config.crypto.key_file.is_none());
        assert_eq!(config.memory.embedding_dim, 384);
        assert_eq!(config.memory.max_results, 10);
        assert!((config.memory.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert!(config.storage.database_path.ends_with(".db"));
    }
}
