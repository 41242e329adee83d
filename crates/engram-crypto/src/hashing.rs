// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argon2id password hashing for store access control.
//!
//! New hashes use the `argon2` crate's native PHC string format.
//! Verification also accepts the legacy custom format
//! `base64(hash(32) || ':' || salt)` that older stores wrote, falling back
//! to it only when the input does not parse as a PHC string.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use engram_core::EngramError;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

/// Raw hash output length in bytes.
const HASH_LEN: usize = 32;

/// Argon2id memory cost in KiB (64 MiB).
const MEMORY_COST: u32 = 65536;

/// Argon2id iteration count.
const TIME_COST: u32 = 3;

/// Argon2id parallelism lanes.
const PARALLELISM: u32 = 4;

fn argon2() -> Result<Argon2<'static>, EngramError> {
    let params = Params::new(MEMORY_COST, TIME_COST, PARALLELISM, Some(HASH_LEN))
        .map_err(|e| EngramError::Crypto(format!("invalid Argon2id parameters: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into the Argon2id PHC string format.
///
/// The salt comes from the system CSPRNG, the same source the key module
/// uses.
pub fn hash_password(password: &str) -> Result<String, EngramError> {
    let rng = SystemRandom::new();
    let mut salt_bytes = [0u8; 16];
    rng.fill(&mut salt_bytes)
        .map_err(|_| EngramError::Crypto("failed to generate hashing salt".to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| EngramError::Crypto(format!("salt encoding failed: {e}")))?;
    let hash = argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| EngramError::Crypto(format!("Argon2id hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash string.
///
/// Tries the native PHC format first; if the string does not parse as PHC,
/// falls back to the legacy `base64(hash || ':' || salt)` format.
/// Returns `false` for any mismatch or unparseable input.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(stored) {
        return Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
    }
    verify_legacy(password, stored)
}

/// Produce a hash string in the legacy custom format.
///
/// Exists for compatibility tests and migration tooling; new code should
/// store [`hash_password`]'s PHC output instead.
pub fn legacy_hash_string(password: &str, salt: &[u8]) -> Result<String, EngramError> {
    let hash = derive_raw(password, salt)?;
    let mut combined = Vec::with_capacity(HASH_LEN + 1 + salt.len());
    combined.extend_from_slice(hash.as_slice());
    combined.push(b':');
    combined.extend_from_slice(salt);
    Ok(BASE64.encode(combined))
}

/// Verify against the legacy `base64(hash(32) || ':' || salt)` format.
fn verify_legacy(password: &str, stored: &str) -> bool {
    let Ok(combined) = BASE64.decode(stored.trim()) else {
        return false;
    };
    // Fixed-width hash, one separator byte, then the salt.
    if combined.len() <= HASH_LEN + 1 || combined[HASH_LEN] != b':' {
        return false;
    }
    let stored_hash = &combined[..HASH_LEN];
    let salt = &combined[HASH_LEN + 1..];

    let Ok(computed) = derive_raw(password, salt) else {
        return false;
    };
    ring::constant_time::verify_slices_are_equal(computed.as_slice(), stored_hash).is_ok()
}

/// SHA-256 hex digest of memory content, stored alongside the ciphertext as
/// a content-equality handle that does not leak plaintext.
pub fn content_hash(content: &str) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, content.as_bytes());
    hex::encode(digest.as_ref())
}

/// Derive the raw 32-byte Argon2id hash for the legacy format.
fn derive_raw(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; HASH_LEN]>, EngramError> {
    let mut out = Zeroizing::new([0u8; HASH_LEN]);
    argon2()?
        .hash_password_into(password.as_bytes(), salt, out.as_mut())
        .map_err(|e| EngramError::Crypto(format!("Argon2id derivation failed: {e}")))?;
    Ok(out)
}
