// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding collaborator contract plus a deterministic local fallback.
//!
//! Real model backends (ONNX, remote APIs) live behind the [`Embedder`]
//! trait; [`HashEmbedder`] is a dependency-free feature-hashing
//! implementation used by the CLI default and the test suite.

use async_trait::async_trait;
use engram_core::EngramError;

/// An opaque text-to-vector function.
///
/// Implementations must be deterministic per model version: re-embedding
/// identical text yields an identical vector, and every vector has exactly
/// `dim()` components.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed output dimensionality.
    fn dim(&self) -> usize;

    /// Embed a single text into a `dim()`-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngramError>;
}

/// Deterministic feature-hashing embedder.
///
/// Tokenizes on non-alphanumeric boundaries (lowercased), hashes unigrams
/// and adjacent bigrams into `dim` signed buckets, and L2-normalizes the
/// result. Text with no tokens embeds to the all-zero vector, which scores
/// similarity 0.0 against everything.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "embedding dimension must be non-zero");
        Self { dim }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut vector = vec![0.0_f32; self.dim];
        let mut bump = |feature: &str| {
            let h = fnv1a(feature.as_bytes());
            let idx = (h % self.dim as u64) as usize;
            // One hash bit decides the sign so buckets stay zero-mean.
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        };

        for token in &tokens {
            bump(token);
        }
        for pair in tokens.windows(2) {
            bump(&format!("{} {}", pair[0], pair[1]));
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngramError> {
        Ok(self.embed_sync(text))
    }
}

/// FNV-1a, 64-bit. Stable across platforms and releases, unlike
/// `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
