// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Engram memory store.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and database-level
//! foreign-key enforcement between contexts, memories, tags, and embeddings.

pub mod database;
pub mod migrations;

pub use database::{map_tr_err, Database};
