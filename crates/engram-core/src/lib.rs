// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Engram encrypted memory store.
//!
//! This crate provides the error taxonomy and the shared domain types used
//! throughout the Engram workspace: contexts, memory records, scored search
//! results, and the vector helpers shared by storage and retrieval.

pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::EngramError;
pub use types::{
    blob_to_vec, cosine_similarity, vec_to_blob, Context, MemoryRecord, NewMemory,
    RowErrorPolicy, ScoredRecord,
};
