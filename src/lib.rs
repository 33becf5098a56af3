//! ```text
//! EntryDraft ──► orchestrator::FeedOrchestrator ──► chunking::chunk
//!                                │                        │
//!                                │                        ▼
//!                                │              embeddings::EmbeddingProvider
//!                                │                        │
//!                                ▼                        ▼
//!                     store::SqliteFeedStore ──► index::VectorIndex
//!                                │                        │
//!                                ▼                        ▼
//! SearchRequest ──► search::SearchEngine ──► lexical + semantic ranking
//! ```
//!
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod orchestrator;
pub mod search;
pub mod store;
pub mod types;

pub use config::{FeedConfig, SearchConfig};
pub use embeddings::{EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
pub use index::VectorIndex;
pub use orchestrator::{FeedOrchestrator, FeedStats};
pub use search::{MatchedChunk, SearchEngine, SearchRequest, SearchResult};
pub use store::{
    EntryDraft, EntryPage, EntryStatus, EntryUpdate, FeedChunk, FeedEntry, SqliteFeedStore,
    StatusFilter,
};
pub use types::FeedError;
