// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key lifecycle: load, derive, or generate the 256-bit store key.
//!
//! Resolution order: existing key file > fresh key persisted to the given
//! path > passphrase derivation via PBKDF2-HMAC-SHA256 > fully random key.
//! A malformed key file is fatal; the store never silently falls back to a
//! different key.

use std::num::NonZeroU32;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use engram_core::EngramError;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

/// Symmetric key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// KDF salt length in bytes.
pub const SALT_LEN: usize = 16;

/// The 256-bit symmetric key owned by a store instance for its process
/// lifetime.
///
/// Debug output intentionally omits the key bytes. The backing buffer is
/// zeroed on drop.
pub struct MemoryKey {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for MemoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl MemoryKey {
    /// Resolve the store key from the available sources.
    ///
    /// 1. `key_file` exists: load and decode `base64(key || salt)` from it.
    /// 2. `key_file` given but absent: generate a fresh random key, persist
    ///    its encoded form there (creating parent directories), use it.
    /// 3. `passphrase` given: derive deterministically via PBKDF2-HMAC-SHA256
    ///    with a fresh random salt. The salt is not retained; callers needing
    ///    reproducible derivation must use the key-file flow.
    /// 4. Otherwise: fully random key.
    pub fn resolve(
        passphrase: Option<&SecretString>,
        key_file: Option<&Path>,
        kdf_iterations: u32,
    ) -> Result<Self, EngramError> {
        match (key_file, passphrase) {
            (Some(path), _) if path.exists() => Self::load_key_file(path),
            (Some(path), _) => {
                let key = Self::generate()?;
                let salt = generate_salt()?;
                key.persist(path, &salt)?;
                tracing::info!(path = %path.display(), "generated new key file");
                Ok(key)
            }
            (None, Some(passphrase)) => {
                let salt = generate_salt()?;
                Ok(Self::derive(passphrase, &salt, kdf_iterations))
            }
            (None, None) => Self::generate(),
        }
    }

    /// Derive a key from a passphrase and salt via PBKDF2-HMAC-SHA256.
    ///
    /// Deterministic: same passphrase, salt, and iteration count always
    /// yield the same key.
    pub fn derive(passphrase: &SecretString, salt: &[u8; SALT_LEN], iterations: u32) -> Self {
        // NonZeroU32 invariant: config validation enforces a 100k floor, but
        // derive() is also reachable directly, so clamp here.
        let iterations = NonZeroU32::new(iterations.max(1)).unwrap();
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt,
            passphrase.expose_secret().as_bytes(),
            bytes.as_mut(),
        );
        Self { bytes }
    }

    /// Generate a fully random key from the system CSPRNG.
    pub fn generate() -> Result<Self, EngramError> {
        let rng = SystemRandom::new();
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill(bytes.as_mut())
            .map_err(|_| EngramError::Crypto("failed to generate random key".to_string()))?;
        Ok(Self { bytes })
    }

    /// Load key material from an on-disk key file.
    ///
    /// The file is UTF-8 text holding `base64(key(32) || salt(16))`. Any
    /// decoding failure is a [`EngramError::KeyLoad`], fatal at construction.
    pub fn load_key_file(path: &Path) -> Result<Self, EngramError> {
        let encoded = std::fs::read_to_string(path).map_err(|e| {
            EngramError::KeyLoad(format!("cannot read key file {}: {e}", path.display()))
        })?;
        let (key, _salt) = decode_key_material(encoded.trim())?;
        Ok(key)
    }

    /// Persist this key (with the given salt) to a key file as
    /// `base64(key || salt)`, creating parent directories as needed.
    pub fn persist(&self, path: &Path, salt: &[u8; SALT_LEN]) -> Result<(), EngramError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngramError::KeyLoad(format!(
                    "cannot create key file directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let encoded = encode_key_material(&self.bytes, salt);
        std::fs::write(path, encoded).map_err(|e| {
            EngramError::KeyLoad(format!("cannot write key file {}: {e}", path.display()))
        })?;
        Ok(())
    }

    /// Raw key bytes, for use by the cipher codec within this crate.
    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

/// Generate a random 16-byte KDF salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN], EngramError> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| EngramError::Crypto("failed to generate random salt".to_string()))?;
    Ok(salt)
}

/// Encode key and salt for on-disk storage: `base64(key || salt)`.
fn encode_key_material(key: &[u8; KEY_LEN], salt: &[u8; SALT_LEN]) -> String {
    let mut combined = Zeroizing::new(Vec::with_capacity(KEY_LEN + SALT_LEN));
    combined.extend_from_slice(key);
    combined.extend_from_slice(salt);
    BASE64.encode(combined.as_slice())
}

/// Decode `base64(key || salt)` back into key material.
fn decode_key_material(encoded: &str) -> Result<(MemoryKey, [u8; SALT_LEN]), EngramError> {
    let combined = Zeroizing::new(
        BASE64
            .decode(encoded)
            .map_err(|e| EngramError::KeyLoad(format!("key file is not valid base64: {e}")))?,
    );
    if combined.len() != KEY_LEN + SALT_LEN {
        return Err(EngramError::KeyLoad(format!(
            "key file holds {} bytes, expected {}",
            combined.len(),
            KEY_LEN + SALT_LEN
        )));
    }
    let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
    bytes.copy_from_slice(&combined[..KEY_LEN]);
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&combined[KEY_LEN..]);
    Ok((MemoryKey { bytes }, salt))
}
