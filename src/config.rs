//! Runtime configuration for the feed subsystem.
//!
//! Defaults can be overridden through the environment (loaded via `dotenvy`)
//! or programmatically with the `with_*` builders. [`FeedConfig::validate`]
//! gates chunking parameters and search weights before any component is
//! constructed.

use crate::types::FeedError;

/// Environment variable naming the SQLite database file.
const ENV_DB_PATH: &str = "FEEDSMITH_DB_PATH";
/// Environment variable overriding the chunk window size (characters).
const ENV_CHUNK_SIZE: &str = "FEEDSMITH_CHUNK_SIZE";
/// Environment variable overriding the chunk overlap (characters).
const ENV_CHUNK_OVERLAP: &str = "FEEDSMITH_CHUNK_OVERLAP";

/// Top-level configuration for stores, chunking, and search.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Chunk window size in characters (Unicode scalar values).
    pub chunk_size: usize,
    /// Overlap between neighboring chunks in characters.
    pub chunk_overlap: usize,
    /// Maximum number of drafts accepted by a single batch-create call.
    pub max_batch_size: usize,
    /// Maximum accepted content length in characters.
    pub max_content_len: usize,
    /// Search ranking parameters.
    pub search: SearchConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            db_path: Self::resolve_db_path(None),
            chunk_size: resolve_env_usize(ENV_CHUNK_SIZE, 512),
            chunk_overlap: resolve_env_usize(ENV_CHUNK_OVERLAP, 50),
            max_batch_size: 50,
            max_content_len: 1_000_000,
            search: SearchConfig::default(),
        }
    }
}

impl FeedConfig {
    fn resolve_db_path(provided: Option<String>) -> String {
        if let Some(path) = provided {
            return path;
        }
        dotenvy::dotenv().ok();
        std::env::var(ENV_DB_PATH).unwrap_or_else(|_| "feedsmith.db".to_string())
    }

    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<String>) -> Self {
        self.db_path = path.into();
        self
    }

    #[must_use]
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    #[must_use]
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    #[must_use]
    pub fn with_max_content_len(mut self, max: usize) -> Self {
        self.max_content_len = max;
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Check parameter bounds before wiring up components.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.chunk_size == 0 {
            return Err(FeedError::InvalidConfiguration(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(FeedError::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_batch_size == 0 {
            return Err(FeedError::InvalidConfiguration(
                "max_batch_size must be greater than zero".into(),
            ));
        }
        self.search.validate()
    }
}

/// Weights and limits for the hybrid ranking pass.
///
/// The combined score is the convex combination
/// `lexical_weight * lexical + semantic_weight * semantic`, with both
/// signals normalised to [0, 1] before merging.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Weight applied to the lexical signal.
    pub lexical_weight: f32,
    /// Weight applied to the semantic signal.
    pub semantic_weight: f32,
    /// Number of chunk candidates pulled from the vector index per query.
    pub semantic_top_k: usize,
    /// Maximum matched chunks attached to a single search result.
    pub max_chunk_matches: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.4,
            semantic_weight: 0.6,
            semantic_top_k: 50,
            max_chunk_matches: 3,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.lexical_weight < 0.0 || self.semantic_weight < 0.0 {
            return Err(FeedError::InvalidConfiguration(
                "search weights must be non-negative".into(),
            ));
        }
        if self.lexical_weight + self.semantic_weight <= 0.0 {
            return Err(FeedError::InvalidConfiguration(
                "at least one search weight must be positive".into(),
            ));
        }
        if self.semantic_top_k == 0 {
            return Err(FeedError::InvalidConfiguration(
                "semantic_top_k must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_env_usize(key: &str, default: usize) -> usize {
    dotenvy::dotenv().ok();
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
