//! SQLite-backed feed store.
//!
//! ## Behavior
//!
//! - Every mutation is a single transaction: callers never observe a
//!   partially-written entry or a mixed old/new chunk batch.
//! - Chunk replacement is staged fully off to the side (chunk texts and
//!   embeddings are computed before any row is touched), then committed in
//!   one transaction and swapped into the vector index in one critical
//!   section.
//! - Mutations targeting the same entry id are serialized through a
//!   per-entry async lock; reads take no locks at all.
//! - Embedding failures escalate: the write fails with
//!   `EmbeddingUnavailable` and the store is left exactly as before.
//!
//! ## Schema
//!
//! - `feed_entries(id, title, content, source, entry_type, tags, metadata,
//!   status, created_at, updated_at)` — tags and metadata are JSON text.
//! - `feed_chunks(id, entry_id, sequence_index, chunk_text, embedding,
//!   created_at)` — embedding is a JSON float array, NULL until computed.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_rusqlite::{Connection, OptionalExtension, Transaction, params_from_iter};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    EntryDraft, EntryPage, EntryStatus, EntryUpdate, FeedChunk, FeedEntry, StatusFilter,
    normalize_tags,
};
use crate::chunking;
use crate::config::FeedConfig;
use crate::embeddings::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::types::FeedError;

/// Entry type recorded when a draft does not classify itself.
const DEFAULT_ENTRY_TYPE: &str = "note";

/// Raw tuple shape of one `feed_entries` row plus its chunk count.
type EntryRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
);

/// Raw tuple shape of one `feed_chunks` row.
type ChunkRow = (String, String, i64, String, Option<String>, String);

const ENTRY_COLUMNS: &str = "e.id, e.title, e.content, e.source, e.entry_type, e.tags, \
     e.metadata, e.status, e.created_at, e.updated_at, \
     (SELECT COUNT(*) FROM feed_chunks c WHERE c.entry_id = e.id)";

const CHUNK_COLUMNS: &str =
    "id, entry_id, sequence_index, chunk_text, embedding, created_at";

/// Durable feed store owning the SQLite connection, the derived vector
/// index, and the embedding provider used to materialize chunk vectors.
pub struct SqliteFeedStore {
    conn: Connection,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_size: usize,
    chunk_overlap: usize,
    locks: EntryLocks,
}

/// Registry of per-entry async locks serializing mutations per id.
#[derive(Default)]
struct EntryLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EntryLocks {
    fn for_entry(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.inner.lock();
        // A handle held only by the registry belongs to no in-flight
        // mutation; evict it so the map tracks live writers, not history.
        guard.retain(|_, lock| Arc::strong_count(lock) > 1);
        guard.entry(id.to_string()).or_default().clone()
    }
}

impl SqliteFeedStore {
    /// Open (or create) the store at `config.db_path`, apply the schema, and
    /// rebuild the vector index from persisted chunk rows of active entries.
    pub async fn open(
        config: &FeedConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, FeedError> {
        config.validate()?;
        let conn = Connection::open(&config.db_path)
            .await
            .map_err(|err| FeedError::Storage(err.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE IF NOT EXISTS feed_entries (
                     id TEXT PRIMARY KEY,
                     title TEXT NOT NULL,
                     content TEXT NOT NULL,
                     source TEXT,
                     entry_type TEXT NOT NULL,
                     tags TEXT NOT NULL,
                     metadata TEXT NOT NULL,
                     status TEXT NOT NULL DEFAULT 'active',
                     created_at TEXT NOT NULL,
                     updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS feed_chunks (
                     id TEXT PRIMARY KEY,
                     entry_id TEXT NOT NULL,
                     sequence_index INTEGER NOT NULL,
                     chunk_text TEXT NOT NULL,
                     embedding TEXT,
                     created_at TEXT NOT NULL,
                     FOREIGN KEY (entry_id) REFERENCES feed_entries (id) ON DELETE CASCADE
                 );
                 CREATE INDEX IF NOT EXISTS idx_feed_entries_status ON feed_entries(status);
                 CREATE INDEX IF NOT EXISTS idx_feed_entries_type ON feed_entries(entry_type);
                 CREATE INDEX IF NOT EXISTS idx_feed_chunks_entry_id ON feed_chunks(entry_id);",
            )
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await?;

        let store = Self {
            conn,
            index: Arc::new(VectorIndex::new(embedder.dimensions())),
            embedder,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            locks: EntryLocks::default(),
        };
        store.rebuild_index().await?;
        Ok(store)
    }

    /// The derived vector index; handed to the search engine.
    pub fn index(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.index)
    }

    /// The embedding provider this store was opened with.
    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    /// Reload every persisted embedding of active entries into the index.
    ///
    /// The index is a cache: chunk rows always win.
    pub async fn rebuild_index(&self) -> Result<(), FeedError> {
        let rows: Vec<(String, Option<String>)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT c.id, c.embedding FROM feed_chunks c \
                         JOIN feed_entries e ON e.id = c.entry_id \
                         WHERE e.status = 'active' AND c.embedding IS NOT NULL",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(out)
            })
            .await?;

        let mut loaded = 0usize;
        for (chunk_id, raw) in rows {
            let Some(raw) = raw else { continue };
            match serde_json::from_str::<Vec<f32>>(&raw) {
                Ok(vector) => {
                    self.index.upsert(chunk_id, vector)?;
                    loaded += 1;
                }
                Err(err) => {
                    warn!(%chunk_id, %err, "skipping unparseable persisted embedding");
                }
            }
        }
        info!(vectors = loaded, "vector index rebuilt from chunk rows");
        Ok(())
    }

    /// Create an entry: chunk the content, embed every chunk, then persist
    /// entry and chunk batch in one transaction and publish the vectors.
    ///
    /// All-or-nothing: any failure leaves the store as if the call never
    /// happened.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create(&self, draft: EntryDraft) -> Result<FeedEntry, FeedError> {
        let texts = chunking::chunk(&draft.content, self.chunk_size, self.chunk_overlap)?;
        if texts.is_empty() {
            return Err(FeedError::validation("content produced no chunks"));
        }
        let embeddings = self.embed_all(&texts).await?;

        let now = Utc::now();
        let entry = FeedEntry {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            content: draft.content,
            source: draft.source,
            entry_type: draft
                .entry_type
                .unwrap_or_else(|| DEFAULT_ENTRY_TYPE.to_string()),
            tags: normalize_tags(&draft.tags),
            metadata: draft.metadata,
            status: EntryStatus::Active,
            created_at: now,
            updated_at: now,
            chunks_count: texts.len(),
        };
        let staged = stage_chunks(&entry.id, texts, embeddings, now);

        let row_entry = entry.clone();
        let row_chunks = staged.clone();
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                insert_entry(&tx, &row_entry)?;
                insert_chunks(&tx, &row_chunks)?;
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await?;

        self.index.replace_entry(&[], vectors_of(&staged))?;
        debug!(entry_id = %entry.id, chunks = entry.chunks_count, "entry created");
        Ok(entry)
    }

    /// Fetch an entry by id regardless of status.
    pub async fn get(&self, id: &str) -> Result<FeedEntry, FeedError> {
        let lookup = id.to_string();
        let row: Option<EntryRow> = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM feed_entries e WHERE e.id = ?"),
                    [&lookup],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                            row.get(9)?,
                            row.get(10)?,
                        ))
                    },
                )
                .optional()
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await?;
        row.map(entry_from_parts).ok_or_else(|| FeedError::not_found(id))
    }

    /// Fetch an entry's chunk batch ordered by sequence index.
    pub async fn get_chunks(&self, entry_id: &str) -> Result<Vec<FeedChunk>, FeedError> {
        // Existence check first so unknown ids fail with NotFound rather
        // than an empty batch.
        self.get(entry_id).await?;
        let lookup = entry_id.to_string();
        let rows: Vec<ChunkRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {CHUNK_COLUMNS} FROM feed_chunks \
                         WHERE entry_id = ? ORDER BY sequence_index"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&lookup], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(out)
            })
            .await?;
        Ok(rows.into_iter().map(chunk_from_parts).collect())
    }

    /// Apply a partial update. A provided `content` rebuilds the chunk set
    /// atomically: the old batch stays visible until the new one commits,
    /// and the vector index swaps in the same motion.
    ///
    /// Soft-deleted entries are not updatable and report `NotFound`, as the
    /// listing/search surfaces treat them as gone.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: &str, update: EntryUpdate) -> Result<FeedEntry, FeedError> {
        let lock = self.locks.for_entry(id);
        let _guard = lock.lock().await;

        let current = self.get(id).await?;
        if current.status == EntryStatus::Deleted {
            return Err(FeedError::not_found(id));
        }

        let reindex = update.content.is_some();
        let mut next = current.clone();
        if let Some(title) = update.title {
            next.title = title;
        }
        if let Some(content) = update.content {
            next.content = content;
        }
        if let Some(source) = update.source {
            next.source = Some(source);
        }
        if let Some(entry_type) = update.entry_type {
            next.entry_type = entry_type;
        }
        if let Some(tags) = update.tags {
            next.tags = normalize_tags(&tags);
        }
        if let Some(metadata) = update.metadata {
            next.metadata = metadata;
        }
        next.updated_at = Utc::now().max(current.updated_at);

        if reindex {
            let texts = chunking::chunk(&next.content, self.chunk_size, self.chunk_overlap)?;
            if texts.is_empty() {
                return Err(FeedError::validation("content produced no chunks"));
            }
            // Slowest step first, before any row is touched.
            let embeddings = self.embed_all(&texts).await?;
            let staged = stage_chunks(&next.id, texts, embeddings, next.updated_at);
            next.chunks_count = staged.len();

            let stale_ids = self.chunk_ids(id).await?;
            let row_entry = next.clone();
            let row_chunks = staged.clone();
            self.conn
                .call(move |conn| {
                    let tx = conn
                        .transaction()
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    update_entry(&tx, &row_entry)?;
                    tx.execute("DELETE FROM feed_chunks WHERE entry_id = ?", [&row_entry.id])
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    insert_chunks(&tx, &row_chunks)?;
                    tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                    Ok(())
                })
                .await?;
            self.index.replace_entry(&stale_ids, vectors_of(&staged))?;
            debug!(entry_id = %id, chunks = next.chunks_count, "entry re-chunked");
        } else {
            let row_entry = next.clone();
            self.conn
                .call(move |conn| {
                    let tx = conn
                        .transaction()
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    update_entry(&tx, &row_entry)?;
                    tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                    Ok(())
                })
                .await?;
        }
        Ok(next)
    }

    /// Mark an entry deleted, drop its vectors from the index, keep its
    /// chunk rows for inspection or restore. Deleting an already-deleted
    /// entry is a no-op success.
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: &str) -> Result<(), FeedError> {
        let lock = self.locks.for_entry(id);
        let _guard = lock.lock().await;

        let current = self.get(id).await?;
        if current.status == EntryStatus::Deleted {
            return Ok(());
        }

        let updated_at = Utc::now().max(current.updated_at).to_rfc3339();
        let lookup = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feed_entries SET status = 'deleted', updated_at = ? WHERE id = ?",
                    (&updated_at, &lookup),
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await?;

        for chunk_id in self.chunk_ids(id).await? {
            self.index.remove(&chunk_id);
        }
        debug!(entry_id = %id, "entry soft-deleted");
        Ok(())
    }

    /// Permanently remove an entry with its chunks and vectors.
    ///
    /// Hard-deleting an id that does not exist reports `NotFound`, matching
    /// the lookup semantics of [`Self::get`].
    #[instrument(skip(self))]
    pub async fn hard_delete(&self, id: &str) -> Result<(), FeedError> {
        let lock = self.locks.for_entry(id);
        let _guard = lock.lock().await;

        let stale_ids = self.chunk_ids(id).await?;
        let lookup = id.to_string();
        let removed: usize = self
            .conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute("DELETE FROM feed_chunks WHERE entry_id = ?", [&lookup])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let removed = tx
                    .execute("DELETE FROM feed_entries WHERE id = ?", [&lookup])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(removed)
            })
            .await?;
        if removed == 0 {
            return Err(FeedError::not_found(id));
        }

        for chunk_id in stale_ids {
            self.index.remove(&chunk_id);
        }
        debug!(entry_id = %id, "entry hard-deleted");
        Ok(())
    }

    /// List entries newest-first with pagination metadata.
    pub async fn list(
        &self,
        page: usize,
        page_size: usize,
        filter: StatusFilter,
    ) -> Result<EntryPage, FeedError> {
        let where_clause = match filter {
            StatusFilter::Active => "WHERE e.status = 'active'",
            StatusFilter::Deleted => "WHERE e.status = 'deleted'",
            StatusFilter::All => "",
        };
        let offset = page.saturating_sub(1) * page_size;
        let count_sql = format!("SELECT COUNT(*) FROM feed_entries e {where_clause}");
        let page_sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM feed_entries e {where_clause} \
             ORDER BY e.created_at DESC, e.id ASC LIMIT ? OFFSET ?"
        );

        let (total, rows): (i64, Vec<EntryRow>) = self
            .conn
            .call(move |conn| {
                let total: i64 = conn
                    .query_row(&count_sql, [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut stmt = conn
                    .prepare(&page_sql)
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map((page_size as i64, offset as i64), |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                            row.get(9)?,
                            row.get(10)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok((total, out))
            })
            .await?;

        Ok(EntryPage {
            items: rows.into_iter().map(entry_from_parts).collect(),
            page,
            page_size,
            total: total as usize,
        })
    }

    /// Counts backing the stats summary: (total, active, deleted, chunks).
    pub async fn counts(&self) -> Result<(usize, usize, usize, usize), FeedError> {
        self.conn
            .call(|conn| {
                let total: i64 = conn
                    .query_row("SELECT COUNT(*) FROM feed_entries", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let active: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM feed_entries WHERE status = 'active'",
                        [],
                        |row| row.get(0),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let chunks: i64 = conn
                    .query_row("SELECT COUNT(*) FROM feed_chunks", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok((
                    total as usize,
                    active as usize,
                    (total - active) as usize,
                    chunks as usize,
                ))
            })
            .await
            .map_err(FeedError::from)
    }

    /// Active entries whose title or content contains any of `terms`,
    /// case-insensitively. Candidate pre-filter for lexical scoring.
    ///
    /// Case folding uses SQLite's `lower()`, which is ASCII-only: non-ASCII
    /// uppercase text only matches a query in the same case.
    pub(crate) async fn active_entries_matching(
        &self,
        terms: &[String],
    ) -> Result<Vec<FeedEntry>, FeedError> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut conditions = Vec::with_capacity(terms.len());
        let mut params = Vec::with_capacity(terms.len() * 2);
        for term in terms {
            let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
            conditions.push(
                "(lower(e.title) LIKE ? ESCAPE '\\' OR lower(e.content) LIKE ? ESCAPE '\\')",
            );
            params.push(pattern.clone());
            params.push(pattern);
        }
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM feed_entries e \
             WHERE e.status = 'active' AND ({}) \
             ORDER BY e.id",
            conditions.join(" OR ")
        );
        self.query_entries(sql, params).await
    }

    /// Chunk rows for the given chunk ids, in no particular order.
    pub(crate) async fn chunks_by_ids(&self, ids: &[String]) -> Result<Vec<FeedChunk>, FeedError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM feed_chunks WHERE id IN ({placeholders})"
        );
        let owned: Vec<String> = ids.to_vec();
        let rows: Vec<ChunkRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map(params_from_iter(owned.iter()), |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(out)
            })
            .await?;
        Ok(rows.into_iter().map(chunk_from_parts).collect())
    }

    /// Active entries for the given entry ids.
    pub(crate) async fn active_entries_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<FeedEntry>, FeedError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM feed_entries e \
             WHERE e.status = 'active' AND e.id IN ({placeholders})"
        );
        self.query_entries(sql, ids.to_vec()).await
    }

    async fn query_entries(
        &self,
        sql: String,
        params: Vec<String>,
    ) -> Result<Vec<FeedEntry>, FeedError> {
        let rows: Vec<EntryRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map(params_from_iter(params.iter()), |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                            row.get(9)?,
                            row.get(10)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(out)
            })
            .await?;
        Ok(rows.into_iter().map(entry_from_parts).collect())
    }

    async fn chunk_ids(&self, entry_id: &str) -> Result<Vec<String>, FeedError> {
        let lookup = entry_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT id FROM feed_chunks WHERE entry_id = ?")
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&lookup], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(out)
            })
            .await
            .map_err(FeedError::from)
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, FeedError> {
        let embeddings = self.embedder.embed_batch(texts).await?;
        if embeddings.len() != texts.len() {
            return Err(FeedError::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }
}

fn stage_chunks(
    entry_id: &str,
    texts: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    created_at: DateTime<Utc>,
) -> Vec<FeedChunk> {
    texts
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(sequence_index, (text, embedding))| FeedChunk {
            id: Uuid::new_v4().to_string(),
            entry_id: entry_id.to_string(),
            sequence_index,
            text,
            embedding: Some(embedding),
            created_at,
        })
        .collect()
}

fn vectors_of(chunks: &[FeedChunk]) -> Vec<(String, Vec<f32>)> {
    chunks
        .iter()
        .filter_map(|chunk| {
            chunk
                .embedding
                .as_ref()
                .map(|vector| (chunk.id.clone(), vector.clone()))
        })
        .collect()
}

fn insert_entry(tx: &Transaction<'_>, entry: &FeedEntry) -> tokio_rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO feed_entries \
         (id, title, content, source, entry_type, tags, metadata, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &entry.id,
            &entry.title,
            &entry.content,
            &entry.source,
            &entry.entry_type,
            serde_json::to_string(&entry.tags).unwrap_or_else(|_| "[]".to_string()),
            entry.metadata.to_string(),
            entry.status.as_str(),
            entry.created_at.to_rfc3339(),
            entry.updated_at.to_rfc3339(),
        ),
    )
    .map_err(tokio_rusqlite::Error::Rusqlite)?;
    Ok(())
}

fn update_entry(tx: &Transaction<'_>, entry: &FeedEntry) -> tokio_rusqlite::Result<()> {
    tx.execute(
        "UPDATE feed_entries SET title = ?, content = ?, source = ?, entry_type = ?, \
         tags = ?, metadata = ?, updated_at = ? WHERE id = ?",
        (
            &entry.title,
            &entry.content,
            &entry.source,
            &entry.entry_type,
            serde_json::to_string(&entry.tags).unwrap_or_else(|_| "[]".to_string()),
            entry.metadata.to_string(),
            entry.updated_at.to_rfc3339(),
            &entry.id,
        ),
    )
    .map_err(tokio_rusqlite::Error::Rusqlite)?;
    Ok(())
}

fn insert_chunks(tx: &Transaction<'_>, chunks: &[FeedChunk]) -> tokio_rusqlite::Result<()> {
    for chunk in chunks {
        let embedding = chunk
            .embedding
            .as_ref()
            .and_then(|vector| serde_json::to_string(vector).ok());
        tx.execute(
            "INSERT INTO feed_chunks \
             (id, entry_id, sequence_index, chunk_text, embedding, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                &chunk.id,
                &chunk.entry_id,
                chunk.sequence_index as i64,
                &chunk.text,
                embedding,
                chunk.created_at.to_rfc3339(),
            ),
        )
        .map_err(tokio_rusqlite::Error::Rusqlite)?;
    }
    Ok(())
}

fn entry_from_parts(row: EntryRow) -> FeedEntry {
    let (
        id,
        title,
        content,
        source,
        entry_type,
        tags,
        metadata,
        status,
        created_at,
        updated_at,
        chunks_count,
    ) = row;
    FeedEntry {
        id,
        title,
        content,
        source,
        entry_type,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        status: EntryStatus::parse(&status),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        chunks_count: chunks_count.max(0) as usize,
    }
}

fn chunk_from_parts(row: ChunkRow) -> FeedChunk {
    let (id, entry_id, sequence_index, text, embedding, created_at) = row;
    FeedChunk {
        id,
        entry_id,
        sequence_index: sequence_index.max(0) as usize,
        text,
        embedding: embedding.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: parse_timestamp(&created_at),
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
