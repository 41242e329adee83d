// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding index layered over the record store by composition.
//!
//! Every memory written through this type gets an embedding row in the same
//! transaction, so the index and the store cannot drift apart. Similarity
//! math runs in-process over decoded vectors; SQLite only stores the blobs.

use std::sync::Arc;

use engram_core::{
    blob_to_vec, cosine_similarity, vec_to_blob, EngramError, MemoryRecord, NewMemory,
    RowErrorPolicy, ScoredRecord,
};
use engram_crypto::content_hash;
use engram_storage::map_tr_err;
use rusqlite::params;
use tracing::{debug, info, warn};

use crate::embedder::Embedder;
use crate::store::{context_exists, dedup_tags, insert_memory_row, load_tags, MemoryStore};

/// `(id, context_id, ciphertext, importance, created_at, vector, tags)` for
/// one semantic-search candidate.
type CandidateRow = (i64, String, Vec<u8>, i64, String, Vec<u8>, Vec<String>);

/// Semantic retrieval layer over a [`MemoryStore`].
pub struct EmbeddingIndex {
    store: MemoryStore,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingIndex {
    pub fn new(store: MemoryStore, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// The wrapped record store, for plain CRUD and text search.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Store a memory and its embedding in one transaction.
    pub async fn store_memory(
        &self,
        content: &str,
        context_id: &str,
        importance: i64,
        tags: &[String],
    ) -> Result<i64, EngramError> {
        let vector = self.embedder.embed(content).await?;
        let ciphertext = self.store.seal(content)?;
        let hash = content_hash(content);
        let tags = dedup_tags(tags);
        let blob = vec_to_blob(&vector);
        let ctx = context_id.to_string();
        let ctx_err = context_id.to_string();

        let id = self
            .store
            .database()
            .connection()
            .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
                let tx = conn.transaction()?;
                if !context_exists(&tx, &ctx)? {
                    return Ok(None);
                }
                let id = insert_memory_row(&tx, &ctx, &ciphertext, &hash, importance, &tags)?;
                tx.execute(
                    "INSERT INTO embeddings (memory_id, vector) VALUES (?1, ?2)",
                    params![id, blob],
                )?;
                tx.commit()?;
                Ok(Some(id))
            })
            .await
            .map_err(map_tr_err)?
            .ok_or(EngramError::ContextNotFound { id: ctx_err })?;

        debug!(memory_id = id, context_id, "memory indexed");
        Ok(id)
    }

    /// Store a batch of memories atomically.
    ///
    /// Embedding and sealing happen up front; the database sees a single
    /// transaction that either commits every row or none. Any failure is
    /// reported as [`EngramError::BatchStore`] and leaves the store
    /// unchanged.
    pub async fn batch_store(
        &self,
        context_id: &str,
        memories: &[NewMemory],
    ) -> Result<Vec<i64>, EngramError> {
        let batch_err = |e: EngramError| EngramError::BatchStore {
            source: Box::new(e),
        };

        let mut prepared = Vec::with_capacity(memories.len());
        for memory in memories {
            let vector = self.embedder.embed(&memory.content).await.map_err(batch_err)?;
            let ciphertext = self.store.seal(&memory.content).map_err(batch_err)?;
            prepared.push((
                ciphertext,
                content_hash(&memory.content),
                memory.importance.unwrap_or(crate::store::DEFAULT_IMPORTANCE),
                dedup_tags(&memory.tags),
                vec_to_blob(&vector),
            ));
        }

        let ctx = context_id.to_string();
        let ctx_err = context_id.to_string();
        let ids = self
            .store
            .database()
            .connection()
            .call(move |conn| -> Result<Option<Vec<i64>>, rusqlite::Error> {
                let tx = conn.transaction()?;
                if !context_exists(&tx, &ctx)? {
                    return Ok(None);
                }
                let mut ids = Vec::with_capacity(prepared.len());
                for (ciphertext, hash, importance, tags, blob) in &prepared {
                    let id =
                        insert_memory_row(&tx, &ctx, ciphertext, hash, *importance, tags)?;
                    tx.execute(
                        "INSERT INTO embeddings (memory_id, vector) VALUES (?1, ?2)",
                        params![id, blob],
                    )?;
                    ids.push(id);
                }
                tx.commit()?;
                Ok(Some(ids))
            })
            .await
            .map_err(|e| batch_err(map_tr_err(e)))?
            .ok_or_else(|| batch_err(EngramError::ContextNotFound { id: ctx_err }))?;

        info!(context_id, count = ids.len(), "batch stored");
        Ok(ids)
    }

    /// Rank stored memories by cosine similarity against `query`.
    ///
    /// Results at or above `threshold` come back sorted by similarity, then
    /// importance, both descending, truncated to `limit`. Rows that fail to
    /// decrypt are skipped with a warning; a search should degrade, not die,
    /// on one bad row.
    pub async fn semantic_search(
        &self,
        query: &str,
        context_id: Option<&str>,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, EngramError> {
        let query_vec = self.embedder.embed(query).await?;
        let context_id = context_id.map(|c| c.to_string());

        let rows = self
            .store
            .database()
            .connection()
            .call(move |conn| -> Result<Vec<CandidateRow>, rusqlite::Error> {
                let mut sql = String::from(
                    "SELECT m.id, m.context_id, m.content, m.importance, m.created_at, e.vector
                     FROM memories m JOIN embeddings e ON e.memory_id = m.id",
                );
                let mut values: Vec<rusqlite::types::Value> = Vec::new();
                if let Some(ctx) = &context_id {
                    sql.push_str(" WHERE m.context_id = ?");
                    values.push(ctx.clone().into());
                }

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values), |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, Vec<u8>>(5)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut out = Vec::with_capacity(rows.len());
                for (id, context_id, ciphertext, importance, created_at, vector) in rows {
                    let tags = load_tags(conn, id)?;
                    out.push((id, context_id, ciphertext, importance, created_at, vector, tags));
                }
                Ok(out)
            })
            .await
            .map_err(map_tr_err)?;

        let mut scored = Vec::new();
        for (id, ctx, ciphertext, importance, created_at, vector, tags) in rows {
            let similarity = cosine_similarity(&query_vec, &blob_to_vec(&vector));
            if similarity < threshold {
                continue;
            }
            let content = match self.store.unseal(&ciphertext) {
                Ok(content) => content,
                Err(e) => {
                    warn!(memory_id = id, error = %e, "skipping undecryptable row");
                    continue;
                }
            };
            scored.push(ScoredRecord {
                record: MemoryRecord {
                    id,
                    context_id: ctx,
                    content,
                    importance,
                    tags,
                    created_at,
                },
                similarity,
            });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.record.importance.cmp(&a.record.importance))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// Delete a memory and its embedding.
    ///
    /// The embedding row is removed first so the index never outlives the
    /// record, even if the second statement fails.
    pub async fn delete_memory(&self, memory_id: i64) -> Result<(), EngramError> {
        self.store
            .database()
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM embeddings WHERE memory_id = ?1",
                    params![memory_id],
                )?;
                tx.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Re-embed stored memories with the current embedder, optionally
    /// restricted to one context.
    ///
    /// Useful after swapping embedders or changing dimensions. All rows are
    /// decrypted first; a single undecryptable row aborts the recompute so
    /// a partial reindex is never committed. Returns the number of memories
    /// re-embedded.
    pub async fn recompute_embeddings(
        &self,
        context_id: Option<&str>,
    ) -> Result<usize, EngramError> {
        let context_id = context_id.map(|c| c.to_string());
        let rows = self
            .store
            .database()
            .connection()
            .call(move |conn| -> Result<Vec<(i64, Vec<u8>)>, rusqlite::Error> {
                let mut sql = String::from("SELECT id, content FROM memories");
                let mut values: Vec<rusqlite::types::Value> = Vec::new();
                if let Some(ctx) = &context_id {
                    sql.push_str(" WHERE context_id = ?");
                    values.push(ctx.clone().into());
                }
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values), |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        let mut reindexed = Vec::with_capacity(rows.len());
        for (id, ciphertext) in rows {
            let content = self.store.unseal(&ciphertext)?;
            let vector = self.embedder.embed(&content).await?;
            reindexed.push((id, vec_to_blob(&vector)));
        }

        let count = reindexed.len();
        self.store
            .database()
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT OR REPLACE INTO embeddings (memory_id, vector) VALUES (?1, ?2)",
                    )?;
                    for (id, blob) in &reindexed {
                        stmt.execute(params![id, blob])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        info!(count, "embeddings recomputed");
        Ok(count)
    }

    /// Remove orphaned embedding rows and compact the database file.
    ///
    /// Returns the number of orphans removed. VACUUM cannot run inside a
    /// transaction, so the orphan sweep commits first and compaction runs
    /// as its own statement.
    pub async fn optimize_embeddings(&self) -> Result<usize, EngramError> {
        let removed = self
            .store
            .database()
            .connection()
            .call(|conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                let removed = tx.execute(
                    "DELETE FROM embeddings
                     WHERE memory_id NOT IN (SELECT id FROM memories)",
                    [],
                )?;
                tx.commit()?;
                conn.execute("VACUUM", [])?;
                Ok(removed)
            })
            .await
            .map_err(map_tr_err)?;

        info!(removed, "embedding index optimized");
        Ok(removed)
    }

    /// Text search, delegated to the record store.
    pub async fn search(
        &self,
        query: &str,
        context_id: Option<&str>,
        tags: &[String],
        policy: RowErrorPolicy,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        self.store.search(query, context_id, tags, policy).await
    }
}
