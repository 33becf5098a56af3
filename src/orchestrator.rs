//! Facade coordinating validation, the store, and the search engine.
//!
//! All boundary validation happens here, before anything reaches the store:
//! the store can assume well-formed input, and validation failures never
//! touch SQLite or the embedding provider.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::FeedConfig;
use crate::embeddings::EmbeddingProvider;
use crate::search::{SearchEngine, SearchRequest, SearchResult};
use crate::store::{
    EntryDraft, EntryPage, EntryUpdate, FeedChunk, FeedEntry, SqliteFeedStore, StatusFilter,
};
use crate::types::FeedError;

/// Largest accepted page size for listings.
const MAX_PAGE_SIZE: usize = 100;

/// Aggregate counts over the whole store.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FeedStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub deleted_entries: usize,
    pub total_chunks: usize,
}

/// Entry point for everything the feed subsystem offers.
///
/// Cheap to share: wrap it in an `Arc` and clone handles across tasks.
pub struct FeedOrchestrator {
    store: Arc<SqliteFeedStore>,
    search: SearchEngine,
    config: FeedConfig,
}

impl FeedOrchestrator {
    /// Open the backing store and wire up the search engine.
    pub async fn open(
        config: FeedConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, FeedError> {
        config.validate()?;
        let store = Arc::new(SqliteFeedStore::open(&config, embedder).await?);
        let search = SearchEngine::new(Arc::clone(&store), config.search.clone());
        info!(db_path = %config.db_path, "feed orchestrator ready");
        Ok(Self {
            store,
            search,
            config,
        })
    }

    /// Validate and ingest one draft.
    #[instrument(skip(self, draft))]
    pub async fn create_entry(&self, draft: EntryDraft) -> Result<FeedEntry, FeedError> {
        self.validate_draft(&draft)?;
        self.store.create(draft).await
    }

    /// Fetch one entry by id, regardless of status.
    pub async fn get_entry(&self, id: &str) -> Result<FeedEntry, FeedError> {
        self.store.get(id).await
    }

    /// Fetch an entry's chunks ordered by sequence index.
    pub async fn get_chunks(&self, entry_id: &str) -> Result<Vec<FeedChunk>, FeedError> {
        self.store.get_chunks(entry_id).await
    }

    /// Apply a partial update; providing `content` re-chunks and re-embeds.
    #[instrument(skip(self, update))]
    pub async fn update_entry(
        &self,
        id: &str,
        update: EntryUpdate,
    ) -> Result<FeedEntry, FeedError> {
        if update.is_empty() {
            return Err(FeedError::validation("update contains no fields"));
        }
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(FeedError::validation("title must not be empty"));
            }
        }
        if let Some(content) = &update.content {
            self.validate_content(content)?;
        }
        self.store.update(id, update).await
    }

    /// Delete an entry: soft (default) keeps rows for restore, hard removes
    /// everything permanently.
    #[instrument(skip(self))]
    pub async fn delete_entry(&self, id: &str, hard: bool) -> Result<(), FeedError> {
        if hard {
            self.store.hard_delete(id).await
        } else {
            self.store.soft_delete(id).await
        }
    }

    /// List entries newest-first.
    pub async fn list_entries(
        &self,
        page: usize,
        page_size: usize,
        filter: StatusFilter,
    ) -> Result<EntryPage, FeedError> {
        if page == 0 {
            return Err(FeedError::validation("page must be at least 1"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(FeedError::validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        self.store.list(page, page_size, filter).await
    }

    /// Hybrid search over active entries.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, FeedError> {
        if request.query.trim().is_empty() {
            return Err(FeedError::validation("search query must not be empty"));
        }
        if request.limit == 0 {
            return Err(FeedError::validation("limit must be at least 1"));
        }
        self.search.search(request).await
    }

    /// Ingest a batch of drafts, isolating per-draft failures.
    ///
    /// The output preserves input order: position `i` holds the outcome for
    /// draft `i`. One invalid or failing draft never affects its neighbors.
    #[instrument(skip(self, drafts), fields(count = drafts.len()))]
    pub async fn batch_create(
        &self,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<Result<FeedEntry, FeedError>>, FeedError> {
        if drafts.is_empty() {
            return Err(FeedError::validation("batch must contain at least one draft"));
        }
        if drafts.len() > self.config.max_batch_size {
            return Err(FeedError::validation(format!(
                "batch size {} exceeds maximum {}",
                drafts.len(),
                self.config.max_batch_size
            )));
        }
        let mut outcomes = Vec::with_capacity(drafts.len());
        for draft in drafts {
            outcomes.push(self.create_entry(draft).await);
        }
        Ok(outcomes)
    }

    /// Aggregate counts by status plus the total chunk count.
    pub async fn stats(&self) -> Result<FeedStats, FeedError> {
        let (total_entries, active_entries, deleted_entries, total_chunks) =
            self.store.counts().await?;
        Ok(FeedStats {
            total_entries,
            active_entries,
            deleted_entries,
            total_chunks,
        })
    }

    fn validate_draft(&self, draft: &EntryDraft) -> Result<(), FeedError> {
        if draft.title.trim().is_empty() {
            return Err(FeedError::validation("title must not be empty"));
        }
        self.validate_content(&draft.content)
    }

    fn validate_content(&self, content: &str) -> Result<(), FeedError> {
        if content.trim().is_empty() {
            return Err(FeedError::validation("content must not be empty"));
        }
        let len = content.chars().count();
        if len > self.config.max_content_len {
            return Err(FeedError::validation(format!(
                "content length {len} exceeds maximum {}",
                self.config.max_content_len
            )));
        }
        Ok(())
    }
}
