// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Engram memory store.
//!
//! Layered TOML loading (defaults, system, XDG, local, env vars) with
//! semantic validation of crypto and search parameters.

#![allow(clippy::result_large_err)]

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{CryptoConfig, EngramConfig, MemoryConfig, StorageConfig};
pub use validation::{validate, MIN_KDF_ITERATIONS};

use engram_core::EngramError;

/// Load configuration from the standard hierarchy and validate it.
pub fn load_and_validate() -> Result<EngramConfig, EngramError> {
    let config = load_config().map_err(|e| EngramError::Config(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}
