// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic layer for the Engram memory store.
//!
//! Three concerns, kept deliberately small:
//! - **keys**: resolve the 256-bit store key from a key file, a passphrase
//!   (PBKDF2-HMAC-SHA256), or the system CSPRNG.
//! - **codec**: nonce-prefixed AES-256-GCM framing for all stored content.
//! - **hashing**: Argon2id password hashing with legacy-format fallback.

pub mod codec;
pub mod hashing;
pub mod keys;

pub use codec::{open, seal, NONCE_LEN, TAG_LEN};
pub use hashing::{content_hash, hash_password, legacy_hash_string, verify_password};
pub use keys::{generate_salt, MemoryKey, KEY_LEN, SALT_LEN};

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn passphrase_derived_keys_interoperate_with_codec() {
        let passphrase = SecretString::from("shared secret".to_string());
        let salt = [3u8; SALT_LEN];

        let k1 = MemoryKey::derive(&passphrase, &salt, 1_000);
        let k2 = MemoryKey::derive(&passphrase, &salt, 1_000);

        // Same derivation inputs yield a key that opens the other's output.
        let sealed = seal(&k1, "cross-instance content").unwrap();
        assert_eq!(open(&k2, &sealed).unwrap(), "cross-instance content");
    }

    #[test]
    fn different_iteration_counts_yield_incompatible_keys() {
        let passphrase = SecretString::from("shared secret".to_string());
        let salt = [3u8; SALT_LEN];

        let k1 = MemoryKey::derive(&passphrase, &salt, 1_000);
        let k2 = MemoryKey::derive(&passphrase, &salt, 2_000);

        let sealed = seal(&k1, "content").unwrap();
        assert!(open(&k2, &sealed).is_err());
    }
}
