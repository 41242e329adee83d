// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nonce-prefixed AES-256-GCM framing for stored memory content.
//!
//! Every call to [`seal`] generates a fresh random 96-bit nonce via the
//! system CSPRNG and prepends it to the ciphertext:
//! `sealed = nonce(12) || ciphertext_with_tag(16)`. Nonce reuse would be
//! catastrophic for GCM security.

use engram_core::EngramError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::keys::MemoryKey;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypt plaintext under the store key with a random nonce.
///
/// Returns `nonce || ciphertext_with_tag`; the caller stores the whole blob.
pub fn seal(key: &MemoryKey, plaintext: &str) -> Result<Vec<u8>, EngramError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key.bytes())
        .map_err(|_| EngramError::Crypto("failed to create AES-256-GCM key".to_string()))?;
    let less_safe = LessSafeKey::new(unbound);

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| EngramError::Crypto("failed to generate random nonce".to_string()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    // Seal in place: the plaintext buffer is extended with the tag.
    let mut in_out = plaintext.as_bytes().to_vec();
    less_safe
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| EngramError::Crypto("AES-256-GCM encryption failed".to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&in_out);
    Ok(sealed)
}

/// Decrypt a `nonce || ciphertext_with_tag` blob back to plaintext.
///
/// Fails with [`EngramError::Decryption`] on truncated input, authentication
/// failure (wrong key or tampered data), or non-UTF-8 plaintext. Never
/// degrades to empty content.
pub fn open(key: &MemoryKey, sealed: &[u8]) -> Result<String, EngramError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(EngramError::Decryption(format!(
            "sealed blob of {} bytes is shorter than nonce plus tag",
            sealed.len()
        )));
    }

    let unbound = UnboundKey::new(&AES_256_GCM, key.bytes())
        .map_err(|_| EngramError::Crypto("failed to create AES-256-GCM key".to_string()))?;
    let less_safe = LessSafeKey::new(unbound);

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| EngramError::Decryption("invalid nonce".to_string()))?;

    let mut in_out = ciphertext.to_vec();
    let plaintext = less_safe
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| {
            EngramError::Decryption("authentication failed: wrong key or corrupted data".to_string())
        })?;

    String::from_utf8(plaintext.to_vec())
        .map_err(|e| EngramError::Decryption(format!("plaintext is not valid UTF-8: {e}")))
}
