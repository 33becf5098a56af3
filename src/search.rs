//! Hybrid lexical + semantic search over active feed entries.
//!
//! Two signals are computed independently and merged as a convex
//! combination:
//!
//! - **Lexical**: case-insensitive phrase and keyword matching against entry
//!   title and content, title weighted above body. Candidates come from an
//!   escaped SQL `LIKE` pre-filter. Case folding is ASCII-only (SQLite's
//!   `lower()`, same behavior as the LIKE-based search this replaces):
//!   "RUST" matches "rust", but "ÉCOLE" does not match "école".
//! - **Semantic**: the query is embedded and the vector index queried for
//!   the top-k nearest chunks; each entry scores its best chunk's cosine
//!   similarity, normalised from [-1, 1] to [0, 1].
//!
//! An entry found by only one signal keeps the other term at zero but is
//! never excluded. If the embedding provider is unreachable the search
//! degrades to lexical-only with a warning; reads never fail on provider
//! outage. Ranking is fully deterministic: combined score descending,
//! then `updated_at` descending, then id ascending.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::SearchConfig;
use crate::embeddings::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::store::{FeedEntry, SqliteFeedStore, normalize_tags};
use crate::types::FeedError;

/// Phrase match in the title is a full-confidence lexical hit.
const PHRASE_TITLE_SCORE: f32 = 1.0;
/// Phrase match in the content scores below a title hit.
const PHRASE_CONTENT_SCORE: f32 = 0.7;
/// Weight of keyword coverage in the title.
const KEYWORD_TITLE_WEIGHT: f32 = 0.5;
/// Weight of keyword coverage in the content.
const KEYWORD_CONTENT_WEIGHT: f32 = 0.3;

/// Search parameters accepted at the boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_limit() -> usize {
    10
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: default_limit(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A chunk that contributed to an entry's semantic score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchedChunk {
    pub chunk_id: String,
    pub sequence_index: usize,
    pub text: String,
    pub similarity: f32,
}

/// One ranked search hit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub entry: FeedEntry,
    pub score: f32,
    pub lexical_score: f32,
    pub semantic_score: f32,
    pub matched_chunks: Vec<MatchedChunk>,
}

#[derive(Default)]
struct Candidate {
    entry: Option<FeedEntry>,
    lexical: f32,
    semantic: f32,
    chunks: Vec<MatchedChunk>,
}

/// Ranks active entries against a query using both signals.
pub struct SearchEngine {
    store: Arc<SqliteFeedStore>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(store: Arc<SqliteFeedStore>, config: SearchConfig) -> Self {
        let index = store.index();
        let embedder = store.embedder();
        Self {
            store,
            index,
            embedder,
            config,
        }
    }

    /// Run a hybrid search. The query is expected non-empty; the
    /// orchestrator validates before calling.
    #[instrument(skip(self, request), fields(query = %request.query, limit = request.limit))]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, FeedError> {
        let phrase = request.query.trim().to_lowercase();
        let keywords: Vec<String> = phrase.split_whitespace().map(str::to_string).collect();
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: HashMap<String, Candidate> = HashMap::new();

        for entry in self.store.active_entries_matching(&keywords).await? {
            let lexical = lexical_score(&entry, &phrase, &keywords);
            let slot = candidates.entry(entry.id.clone()).or_default();
            slot.lexical = lexical;
            slot.entry = Some(entry);
        }

        self.apply_semantic_signal(&phrase, &mut candidates).await?;

        let tags = normalize_tags(&request.tags);
        let weight_sum = self.config.lexical_weight + self.config.semantic_weight;
        let mut results: Vec<SearchResult> = candidates
            .into_values()
            .filter_map(|candidate| {
                let entry = candidate.entry?;
                if !tags.is_empty() && !entry.has_any_tag(&tags) {
                    return None;
                }
                let score = (self.config.lexical_weight * candidate.lexical
                    + self.config.semantic_weight * candidate.semantic)
                    / weight_sum;
                let mut chunks = candidate.chunks;
                chunks.sort_by(|a, b| {
                    b.similarity
                        .total_cmp(&a.similarity)
                        .then_with(|| a.sequence_index.cmp(&b.sequence_index))
                });
                chunks.truncate(self.config.max_chunk_matches);
                Some(SearchResult {
                    score,
                    lexical_score: candidate.lexical,
                    semantic_score: candidate.semantic,
                    matched_chunks: chunks,
                    entry,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.entry.updated_at.cmp(&a.entry.updated_at))
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        results.truncate(request.limit);
        debug!(results = results.len(), "search completed");
        Ok(results)
    }

    /// Fold the semantic signal into `candidates`. A query-embedding failure
    /// degrades the search to lexical-only instead of failing the read.
    async fn apply_semantic_signal(
        &self,
        phrase: &str,
        candidates: &mut HashMap<String, Candidate>,
    ) -> Result<(), FeedError> {
        let query_vector = match self.embedder.embed(phrase).await {
            Ok(vector) => vector,
            Err(err) => {
                warn!(%err, "embedding provider unavailable, lexical-only search");
                return Ok(());
            }
        };

        let hits = self.index.query(&query_vector, self.config.semantic_top_k)?;
        if hits.is_empty() {
            return Ok(());
        }

        let chunk_ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let similarity_of: HashMap<&str, f32> =
            hits.iter().map(|(id, score)| (id.as_str(), *score)).collect();

        let chunks = self.store.chunks_by_ids(&chunk_ids).await?;
        let mut entry_ids: Vec<String> = Vec::new();
        for chunk in &chunks {
            if !candidates.contains_key(&chunk.entry_id) && !entry_ids.contains(&chunk.entry_id) {
                entry_ids.push(chunk.entry_id.clone());
            }
        }
        // Re-resolving through SQL keeps soft-deleted entries out even if an
        // index removal raced or was lost.
        for entry in self.store.active_entries_by_ids(&entry_ids).await? {
            let slot = candidates.entry(entry.id.clone()).or_default();
            slot.entry = Some(entry);
        }

        for chunk in chunks {
            let Some(raw) = similarity_of.get(chunk.id.as_str()) else {
                continue;
            };
            let similarity = (raw + 1.0) / 2.0;
            // Chunks of entries that did not resolve as active have no slot
            // and fall through here.
            let Some(slot) = candidates.get_mut(&chunk.entry_id) else {
                continue;
            };
            slot.semantic = slot.semantic.max(similarity);
            slot.chunks.push(MatchedChunk {
                chunk_id: chunk.id,
                sequence_index: chunk.sequence_index,
                text: chunk.text,
                similarity,
            });
        }
        Ok(())
    }
}

/// Lexical relevance of one entry in [0, 1].
///
/// The phrase component scores a verbatim phrase hit (title above content);
/// the keyword component scores coverage of individual query words. The
/// final score is the max of the two.
fn lexical_score(entry: &FeedEntry, phrase: &str, keywords: &[String]) -> f32 {
    let title = entry.title.to_lowercase();
    let content = entry.content.to_lowercase();

    let phrase_component = if title.contains(phrase) {
        PHRASE_TITLE_SCORE
    } else if content.contains(phrase) {
        PHRASE_CONTENT_SCORE
    } else {
        0.0
    };

    let coverage = |haystack: &str| -> f32 {
        let hits = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
        hits as f32 / keywords.len() as f32
    };
    let keyword_component =
        KEYWORD_TITLE_WEIGHT * coverage(&title) + KEYWORD_CONTENT_WEIGHT * coverage(&content);

    phrase_component.max(keyword_component).clamp(0.0, 1.0)
}
