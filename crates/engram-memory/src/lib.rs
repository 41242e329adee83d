// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted, context-scoped memory for conversational agents.
//!
//! [`MemoryStore`] owns the record layer (contexts, memories, tags, text
//! search); [`EmbeddingIndex`] composes over it to add semantic retrieval.
//! Construct the store from an opened [`engram_storage::Database`] and a
//! resolved [`engram_crypto::MemoryKey`].

pub mod embedder;
pub mod index;
pub mod store;

pub use embedder::{Embedder, HashEmbedder};
pub use index::EmbeddingIndex;
pub use store::{MemoryStore, DEFAULT_IMPORTANCE};
