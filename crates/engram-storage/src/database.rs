// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread; the handle is explicit and owner-controlled, never a process-wide
//! singleton. Foreign keys are enforced on every connection so a memory can
//! never reference a deleted context.

use std::path::Path;

use engram_core::EngramError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// Encryption scheme this build can read and write.
const SUPPORTED_ENCRYPTION: &str = "aes-256-gcm";

/// Hashing scheme this build can verify.
const SUPPORTED_HASHING: &str = "argon2id";

/// Handle to the Engram SQLite database.
///
/// Cloning is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, run
    /// migrations, and check schema compatibility.
    ///
    /// An existing store written with an unsupported encryption or hashing
    /// scheme is refused rather than misread.
    pub async fn open(path: &str) -> Result<Self, EngramError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(EngramError::storage)?;
        }

        let conn = Connection::open(path.to_owned())
            .await
            .map_err(EngramError::storage)?;
        let db = Self::init(conn).await?;
        debug!(path, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database (test fixtures).
    pub async fn open_in_memory() -> Result<Self, EngramError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(EngramError::storage)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, EngramError> {
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        // Migration failures carry their own error type; surface them from
        // inside the closure without losing the cause.
        conn.call(|conn| -> Result<Result<(), EngramError>, rusqlite::Error> {
            Ok(migrations::run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        let db = Self { conn };
        db.check_compatibility().await?;
        Ok(db)
    }

    /// Verify the persisted scheme versions match what this build supports.
    async fn check_compatibility(&self) -> Result<(), EngramError> {
        let (encryption, hashing) = self
            .conn
            .call(|conn| -> Result<(String, String), rusqlite::Error> {
                let read = |key: &str| -> rusqlite::Result<String> {
                    conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                        row.get(0)
                    })
                };
                Ok((read("encryption_version")?, read("hashing_version")?))
            })
            .await
            .map_err(map_tr_err)?;

        if encryption != SUPPORTED_ENCRYPTION {
            return Err(EngramError::Storage {
                source: format!(
                    "store uses encryption scheme '{encryption}', this build supports '{SUPPORTED_ENCRYPTION}'"
                )
                .into(),
            });
        }
        if hashing != SUPPORTED_HASHING {
            return Err(EngramError::Storage {
                source: format!(
                    "store uses hashing scheme '{hashing}', this build supports '{SUPPORTED_HASHING}'"
                )
                .into(),
            });
        }
        Ok(())
    }

    /// Returns the underlying connection handle.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL; call before dropping the last handle on shutdown.
    pub async fn close(&self) -> Result<(), EngramError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Convert tokio-rusqlite errors into [`EngramError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> EngramError {
    EngramError::Storage {
        source: format!("database error: {e}").into(),
    }
}
