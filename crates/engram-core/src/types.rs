// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared domain types for the Engram memory store.

use serde::{Deserialize, Serialize};

/// A named partition grouping related memories (e.g. one per conversation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Opaque unique identifier (UUIDv4).
    pub id: String,
    /// Display name. Not unique.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// A decrypted memory record as returned to callers.
///
/// The ciphertext never leaves the store unsealed except through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Row identifier (autoincrement).
    pub id: i64,
    /// Owning context.
    pub context_id: String,
    /// Decrypted content.
    pub content: String,
    /// Importance score, 1-10 by contract (default 5, not clamped here).
    pub importance: i64,
    /// Tag set. Order is not guaranteed; duplicates are removed.
    pub tags: Vec<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// A memory record with its cosine-similarity score from semantic search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    /// The decrypted record.
    #[serde(flatten)]
    pub record: MemoryRecord,
    /// Cosine similarity against the query vector, in [-1, 1].
    pub similarity: f32,
}

/// Input item for a batch store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMemory {
    /// Plaintext content to encrypt and store.
    pub content: String,
    /// Importance score; defaults to 5 when absent.
    pub importance: Option<i64>,
    /// Tags to attach.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewMemory {
    /// Convenience constructor with default importance and no tags.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            importance: None,
            tags: Vec::new(),
        }
    }
}

/// What to do when a single row fails to decrypt during best-effort search.
///
/// `Skip` logs the row and continues (the one place partial failure is
/// tolerated); `Abort` fails the whole search on the first bad row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowErrorPolicy {
    /// Log and skip undecryptable rows.
    #[default]
    Skip,
    /// Fail the whole operation on the first undecryptable row.
    Abort,
}

/// Convert an f32 vector to bytes for SQLite BLOB storage (little-endian).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Compute cosine similarity between two vectors: dot(a,b) / (|a| * |b|).
///
/// Vectors are not assumed normalized. Undefined inputs score 0.0
/// deterministically: a zero-norm vector, or vectors of different lengths
/// (persisted embeddings from a different dimension than the current one).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_to_blob_roundtrip() {
        let original = vec![0.1_f32, 0.2, 0.3, -0.5, 1.0];
        let blob = vec_to_blob(&original);
        assert_eq!(blob.len(), original.len() * 4);
        let recovered = blob_to_vec(&blob);
        assert_eq!(original.len(), recovered.len());
        for (a, b) in original.iter().zip(recovered.iter()) {
            assert!((a - b).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn cosine_similarity_identical() {
        let v = vec![0.3_f32, -0.4, 0.5];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-5, "self-similarity should be ~1.0, got {sim}");
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_opposite() {
        let a = vec![2.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < f32::EPSILON, "opposite vectors should score -1, got {sim}");
    }

    #[test]
    fn cosine_similarity_unnormalized_inputs() {
        // Magnitudes must not affect the score.
        let a = vec![1.0, 1.0];
        let b = vec![10.0, 10.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_zero_norm_falls_back_to_zero() {
        let zero = vec![0.0_f32; 4];
        let v = vec![0.5_f32; 4];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_score_zero() {
        let short = vec![1.0_f32; 64];
        let long = vec![1.0_f32; 128];
        assert_eq!(cosine_similarity(&short, &long), 0.0);
        assert_eq!(cosine_similarity(&long, &short), 0.0);
    }

    #[test]
    fn row_error_policy_defaults_to_skip() {
        assert_eq!(RowErrorPolicy::default(), RowErrorPolicy::Skip);
    }
}
