// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transactional record layer: contexts, memories, and tags.
//!
//! All content is sealed through the cipher codec before it reaches SQLite
//! and unsealed on the way out; a plaintext memory never touches disk.
//! Tags live in a `memory_tags` join table with set semantics.

use std::collections::BTreeSet;

use engram_core::{Context, EngramError, MemoryRecord, RowErrorPolicy};
use engram_crypto::{codec, content_hash, MemoryKey};
use engram_storage::{map_tr_err, Database};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default importance score for new memories.
pub const DEFAULT_IMPORTANCE: i64 = 5;

/// `(context_id, ciphertext, importance, created_at, tags)` for one memory,
/// or `None` when the id does not exist.
type RetrievedRow = Option<(String, Vec<u8>, i64, String, Vec<String>)>;

/// Encrypted, context-scoped memory store.
///
/// Owns the encryption key for its process lifetime; the key is never
/// exposed, logged, or persisted by this type.
pub struct MemoryStore {
    db: Database,
    key: MemoryKey,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create a store over an opened database with a resolved key.
    pub fn new(db: Database, key: MemoryKey) -> Self {
        Self { db, key }
    }

    /// The underlying database handle (shared with the embedding index).
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) fn seal(&self, content: &str) -> Result<Vec<u8>, EngramError> {
        codec::seal(&self.key, content)
    }

    pub(crate) fn unseal(&self, sealed: &[u8]) -> Result<String, EngramError> {
        codec::open(&self.key, sealed)
    }

    /// Create a new conversation context and return its identifier.
    ///
    /// Names are not unique; the identifier is.
    pub async fn create_context(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<String, EngramError> {
        let id = Uuid::new_v4().to_string();
        let id_out = id.clone();
        let name = name.to_string();
        let description = description.map(|d| d.to_string());

        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO contexts (id, name, description) VALUES (?1, ?2, ?3)",
                    params![id, name, description],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(context_id = %id_out, "context created");
        Ok(id_out)
    }

    /// Encrypt and store a memory, returning the new row id.
    ///
    /// Fails with [`EngramError::ContextNotFound`] when the context does not
    /// exist. The lookup-then-insert is additionally backed by the
    /// database-level foreign key, so a concurrent context deletion cannot
    /// leave an orphan row.
    pub async fn store(
        &self,
        content: &str,
        context_id: &str,
        importance: i64,
        tags: &[String],
    ) -> Result<i64, EngramError> {
        let ciphertext = self.seal(content)?;
        let hash = content_hash(content);
        let tags = dedup_tags(tags);
        let ctx = context_id.to_string();
        let ctx_err = context_id.to_string();
        let importance_field = importance;

        let id = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
                let tx = conn.transaction()?;
                if !context_exists(&tx, &ctx)? {
                    return Ok(None);
                }
                let id = insert_memory_row(&tx, &ctx, &ciphertext, &hash, importance_field, &tags)?;
                tx.commit()?;
                Ok(Some(id))
            })
            .await
            .map_err(map_tr_err)?
            .ok_or(EngramError::ContextNotFound { id: ctx_err })?;

        debug!(memory_id = id, context_id, importance, "memory stored");
        Ok(id)
    }

    /// Retrieve and decrypt a memory by id.
    pub async fn retrieve(&self, memory_id: i64) -> Result<MemoryRecord, EngramError> {
        let row = self
            .db
            .connection()
            .call(move |conn| -> Result<RetrievedRow, rusqlite::Error> {
                let row = conn
                    .query_row(
                        "SELECT context_id, content, importance, created_at
                         FROM memories WHERE id = ?1",
                        params![memory_id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, Vec<u8>>(1)?,
                                row.get::<_, i64>(2)?,
                                row.get::<_, String>(3)?,
                            ))
                        },
                    )
                    .optional()?;
                match row {
                    Some((context_id, ciphertext, importance, created_at)) => {
                        let tags = load_tags(conn, memory_id)?;
                        Ok(Some((context_id, ciphertext, importance, created_at, tags)))
                    }
                    None => Ok(None),
                }
            })
            .await
            .map_err(map_tr_err)?;

        let (context_id, ciphertext, importance, created_at, tags) =
            row.ok_or(EngramError::NotFound { id: memory_id })?;
        let content = self.unseal(&ciphertext)?;

        Ok(MemoryRecord {
            id: memory_id,
            context_id,
            content,
            importance,
            tags,
            created_at,
        })
    }

    /// Case-insensitive substring search over decrypted content.
    ///
    /// Candidates are pre-filtered by context and by tags (AND semantics:
    /// every requested tag must be present). `policy` controls what happens
    /// when a single row fails to decrypt: skip-and-log, or abort the whole
    /// search.
    pub async fn search(
        &self,
        query: &str,
        context_id: Option<&str>,
        tags: &[String],
        policy: RowErrorPolicy,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        let rows = self.fetch_candidates(context_id, tags).await?;
        let needle = query.to_lowercase();

        let mut results = Vec::new();
        for row in rows {
            let content = match self.unseal(&row.ciphertext) {
                Ok(content) => content,
                Err(e) => match policy {
                    RowErrorPolicy::Skip => {
                        warn!(memory_id = row.id, error = %e, "skipping undecryptable row");
                        continue;
                    }
                    RowErrorPolicy::Abort => return Err(e),
                },
            };
            if content.to_lowercase().contains(&needle) {
                results.push(MemoryRecord {
                    id: row.id,
                    context_id: row.context_id,
                    content,
                    importance: row.importance,
                    tags: row.tags,
                    created_at: row.created_at,
                });
            }
        }
        Ok(results)
    }

    /// Overwrite a memory's importance score.
    ///
    /// Updating a non-existent id affects zero rows and is treated as a
    /// success-no-op.
    pub async fn update_importance(
        &self,
        memory_id: i64,
        importance: i64,
    ) -> Result<(), EngramError> {
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE memories SET importance = ?1 WHERE id = ?2",
                    params![importance, memory_id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Union new tags into a memory's tag set.
    ///
    /// Unlike [`update_importance`](Self::update_importance), this path
    /// reads before writing and fails with [`EngramError::NotFound`] when
    /// the memory does not exist.
    pub async fn add_tags(&self, memory_id: i64, new_tags: &[String]) -> Result<(), EngramError> {
        let new_tags = dedup_tags(new_tags);
        let found = self
            .db
            .connection()
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let tx = conn.transaction()?;
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM memories WHERE id = ?1",
                        params![memory_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Ok(false);
                }
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)",
                    )?;
                    for tag in &new_tags {
                        stmt.execute(params![memory_id, tag])?;
                    }
                }
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(map_tr_err)?;

        if found {
            Ok(())
        } else {
            Err(EngramError::NotFound { id: memory_id })
        }
    }

    /// Delete a memory row. Idempotent: deleting an absent id is not an
    /// error. Tag and embedding rows follow via `ON DELETE CASCADE`.
    pub async fn delete_memory(&self, memory_id: i64) -> Result<(), EngramError> {
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Delete every memory in a context, then the context row itself.
    ///
    /// Returns the number of memories deleted. Runs as a single
    /// transaction: a failure partway leaves the context untouched.
    pub async fn clear_context(&self, context_id: &str) -> Result<usize, EngramError> {
        let ctx = context_id.to_string();
        let count = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                let count = tx.execute(
                    "DELETE FROM memories WHERE context_id = ?1",
                    params![ctx],
                )?;
                tx.execute("DELETE FROM contexts WHERE id = ?1", params![ctx])?;
                tx.commit()?;
                Ok(count)
            })
            .await
            .map_err(map_tr_err)?;

        debug!(context_id, count, "context cleared");
        Ok(count)
    }

    /// List all contexts.
    pub async fn get_contexts(&self) -> Result<Vec<Context>, EngramError> {
        self.db
            .connection()
            .call(|conn| -> Result<Vec<Context>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, created_at
                     FROM contexts ORDER BY created_at, id",
                )?;
                let contexts = stmt
                    .query_map([], |row| {
                        Ok(Context {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            description: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(contexts)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fetch candidate rows for search, pre-filtered by context and tags.
    async fn fetch_candidates(
        &self,
        context_id: Option<&str>,
        tags: &[String],
    ) -> Result<Vec<RawRow>, EngramError> {
        let context_id = context_id.map(|c| c.to_string());
        let tags = dedup_tags(tags);

        self.db
            .connection()
            .call(move |conn| -> Result<Vec<RawRow>, rusqlite::Error> {
                let mut sql = String::from(
                    "SELECT id, context_id, content, importance, created_at FROM memories",
                );
                let mut clauses: Vec<String> = Vec::new();
                let mut values: Vec<rusqlite::types::Value> = Vec::new();

                if let Some(ctx) = &context_id {
                    clauses.push("context_id = ?".to_string());
                    values.push(ctx.clone().into());
                }
                if !tags.is_empty() {
                    let placeholders = vec!["?"; tags.len()].join(", ");
                    clauses.push(format!(
                        "id IN (SELECT memory_id FROM memory_tags WHERE tag IN ({placeholders})
                         GROUP BY memory_id HAVING COUNT(DISTINCT tag) = ?)"
                    ));
                    for tag in &tags {
                        values.push(tag.clone().into());
                    }
                    values.push((tags.len() as i64).into());
                }
                if !clauses.is_empty() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&clauses.join(" AND "));
                }
                sql.push_str(" ORDER BY id");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values), |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut out = Vec::with_capacity(rows.len());
                for (id, context_id, ciphertext, importance, created_at) in rows {
                    let tags = load_tags(conn, id)?;
                    out.push(RawRow {
                        id,
                        context_id,
                        ciphertext,
                        importance,
                        created_at,
                        tags,
                    });
                }
                Ok(out)
            })
            .await
            .map_err(map_tr_err)
    }
}

/// An undecrypted candidate row.
pub(crate) struct RawRow {
    pub id: i64,
    pub context_id: String,
    pub ciphertext: Vec<u8>,
    pub importance: i64,
    pub created_at: String,
    pub tags: Vec<String>,
}

/// Deduplicate tags preserving set semantics (sorted for determinism).
pub(crate) fn dedup_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn context_exists(
    conn: &rusqlite::Connection,
    context_id: &str,
) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM contexts WHERE id = ?1",
            params![context_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert a memory plus its tag rows inside the caller's transaction.
pub(crate) fn insert_memory_row(
    conn: &rusqlite::Connection,
    context_id: &str,
    ciphertext: &[u8],
    hash: &str,
    importance: i64,
    tags: &[String],
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO memories (context_id, content, content_hash, importance)
         VALUES (?1, ?2, ?3, ?4)",
        params![context_id, ciphertext, hash, importance],
    )?;
    let id = conn.last_insert_rowid();
    let mut stmt = conn
        .prepare_cached("INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(params![id, tag])?;
    }
    Ok(id)
}

pub(crate) fn load_tags(conn: &rusqlite::Connection, memory_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT tag FROM memory_tags WHERE memory_id = ?1 ORDER BY tag")?;
    let tags = stmt
        .query_map(params![memory_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_storage::Database;

    async fn setup_store() -> MemoryStore {
        let db = Database::open_in_memory().await.unwrap();
        MemoryStore::new(db, MemoryKey::generate().unwrap())
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn store_and_retrieve_roundtrip() {
        let store = setup_store().await;
        let ctx = store.create_context("Test Context", None).await.unwrap();

        let id = store
            .store(
                "This is a test memory",
                &ctx,
                8,
                &tags(&["test", "memory"]),
            )
            .await
            .unwrap();

        let record = store.retrieve(id).await.unwrap();
        assert_eq!(record.content, "This is a test memory");
        assert_eq!(record.importance, 8);
        assert_eq!(record.context_id, ctx);
        assert_eq!(record.tags, tags(&["memory", "test"]));
        assert!(!record.created_at.is_empty());
    }

    #[tokio::test]
    async fn ciphertext_on_disk_is_not_plaintext() {
        let store = setup_store().await;
        let ctx = store.create_context("ctx", None).await.unwrap();
        let id = store.store("visible words", &ctx, 5, &[]).await.unwrap();

        let blob: Vec<u8> = store
            .database()
            .connection()
            .call(move |conn| -> Result<Vec<u8>, rusqlite::Error> {
                conn.query_row(
                    "SELECT content FROM memories WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();

        let window = b"visible words";
        assert!(
            !blob.windows(window.len()).any(|w| w == window),
            "plaintext leaked into stored blob"
        );
    }

    #[tokio::test]
    async fn store_into_missing_context_fails() {
        let store = setup_store().await;
        let err = store.store("content", "no-such-context", 5, &[]).await.unwrap_err();
        assert!(matches!(err, EngramError::ContextNotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn retrieve_missing_memory_fails() {
        let store = setup_store().await;
        let err = store.retrieve(404).await.unwrap_err();
        assert!(matches!(err, EngramError::NotFound { id: 404 }), "got {err:?}");
    }

    #[tokio::test]
    async fn search_matches_substring_case_insensitively() {
        let store = setup_store().await;
        let ctx = store.create_context("ctx", None).await.unwrap();
        store.store("The User's Message", &ctx, 5, &[]).await.unwrap();
        store.store("unrelated note", &ctx, 5, &[]).await.unwrap();

        let hits = store
            .search("user's message", Some(&ctx), &[], RowErrorPolicy::Skip)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "The User's Message");
    }

    #[tokio::test]
    async fn search_is_scoped_to_context() {
        let store = setup_store().await;
        let ctx_a = store.create_context("A", None).await.unwrap();
        let ctx_b = store.create_context("B", None).await.unwrap();
        store.store("shared phrase", &ctx_a, 5, &[]).await.unwrap();

        let hits = store
            .search("shared phrase", Some(&ctx_b), &[], RowErrorPolicy::Skip)
            .await
            .unwrap();
        assert!(hits.is_empty(), "context B must not see context A's memories");

        let hits = store
            .search("shared phrase", None, &[], RowErrorPolicy::Skip)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1, "unscoped search sees all contexts");
    }

    #[tokio::test]
    async fn tag_filter_requires_every_tag() {
        let store = setup_store().await;
        let ctx = store.create_context("ctx", None).await.unwrap();
        store.store("only a", &ctx, 5, &tags(&["a"])).await.unwrap();
        store.store("only b", &ctx, 5, &tags(&["b"])).await.unwrap();
        let both = store
            .store("both tags", &ctx, 5, &tags(&["a", "b"]))
            .await
            .unwrap();

        let hits = store
            .search("", Some(&ctx), &tags(&["a", "b"]), RowErrorPolicy::Skip)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, both);
    }

    #[tokio::test]
    async fn search_policy_controls_undecryptable_rows() {
        let store = setup_store().await;
        let ctx = store.create_context("ctx", None).await.unwrap();
        store.store("healthy row", &ctx, 5, &[]).await.unwrap();
        let bad = store.store("doomed row", &ctx, 5, &[]).await.unwrap();

        // Corrupt one row's ciphertext out from under the store.
        store
            .database()
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE memories SET content = x'00' WHERE id = ?1",
                    params![bad],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let hits = store
            .search("row", Some(&ctx), &[], RowErrorPolicy::Skip)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "healthy row");

        let err = store
            .search("row", Some(&ctx), &[], RowErrorPolicy::Abort)
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::Decryption(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn update_importance_is_noop_for_missing_id() {
        let store = setup_store().await;
        store.update_importance(999, 9).await.unwrap();
    }

    #[tokio::test]
    async fn update_importance_overwrites() {
        let store = setup_store().await;
        let ctx = store.create_context("ctx", None).await.unwrap();
        let id = store.store("memo", &ctx, 5, &[]).await.unwrap();

        store.update_importance(id, 10).await.unwrap();
        assert_eq!(store.retrieve(id).await.unwrap().importance, 10);
    }

    #[tokio::test]
    async fn add_tags_unions_and_dedups() {
        let store = setup_store().await;
        let ctx = store.create_context("ctx", None).await.unwrap();
        let id = store.store("memo", &ctx, 5, &tags(&["old"])).await.unwrap();

        store
            .add_tags(id, &tags(&["new", "old", "new"]))
            .await
            .unwrap();
        let record = store.retrieve(id).await.unwrap();
        assert_eq!(record.tags, tags(&["new", "old"]));
    }

    #[tokio::test]
    async fn add_tags_requires_existing_memory() {
        let store = setup_store().await;
        let err = store.add_tags(777, &tags(&["x"])).await.unwrap_err();
        assert!(matches!(err, EngramError::NotFound { id: 777 }), "got {err:?}");
    }

    #[tokio::test]
    async fn delete_memory_is_idempotent() {
        let store = setup_store().await;
        let ctx = store.create_context("ctx", None).await.unwrap();
        let id = store.store("memo", &ctx, 5, &tags(&["t"])).await.unwrap();

        store.delete_memory(id).await.unwrap();
        store.delete_memory(id).await.unwrap();
        assert!(store.retrieve(id).await.is_err());

        // Tag rows followed the memory.
        let orphan_tags: i64 = store
            .database()
            .connection()
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM memory_tags WHERE memory_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(orphan_tags, 0);
    }

    #[tokio::test]
    async fn clear_context_removes_memories_and_context() {
        let store = setup_store().await;
        let ctx = store.create_context("to-clear", None).await.unwrap();
        let keep = store.create_context("to-keep", None).await.unwrap();
        store.store("one", &ctx, 5, &[]).await.unwrap();
        store.store("two", &ctx, 5, &[]).await.unwrap();
        store.store("other", &keep, 5, &[]).await.unwrap();

        let deleted = store.clear_context(&ctx).await.unwrap();
        assert_eq!(deleted, 2);

        let contexts = store.get_contexts().await.unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].id, keep);

        // Storing into the cleared context now fails.
        let err = store.store("late", &ctx, 5, &[]).await.unwrap_err();
        assert!(matches!(err, EngramError::ContextNotFound { .. }));
    }

    #[tokio::test]
    async fn get_contexts_lists_metadata() {
        let store = setup_store().await;
        store
            .create_context("General", Some("General chat context"))
            .await
            .unwrap();

        let contexts = store.get_contexts().await.unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].name, "General");
        assert_eq!(contexts[0].description.as_deref(), Some("General chat context"));
    }

    #[tokio::test]
    async fn wrong_key_fails_closed_on_first_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engram.db");
        let path = path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        let store = MemoryStore::new(db, MemoryKey::generate().unwrap());
        let ctx = store.create_context("ctx", None).await.unwrap();
        let id = store.store("private", &ctx, 5, &[]).await.unwrap();
        store.database().close().await.unwrap();
        drop(store);

        // Reopen the same database under a different key.
        let db = Database::open(path).await.unwrap();
        let imposter = MemoryStore::new(db, MemoryKey::generate().unwrap());
        let err = imposter.retrieve(id).await.unwrap_err();
        assert!(matches!(err, EngramError::Decryption(_)), "got {err:?}");
    }
}
