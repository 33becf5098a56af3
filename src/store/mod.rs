//! Durable storage of feed entries and their derived chunk batches.
//!
//! The store is the single source of truth: the vector index is a derived
//! cache keyed by chunk id and is rebuilt from the chunk rows here whenever
//! a store is opened. All writes that must keep chunk sets and vectors
//! synchronized with entry content go through [`SqliteFeedStore`].

pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use sqlite::SqliteFeedStore;

/// Lifecycle status of a feed entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Active,
    Deleted,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Active => "active",
            EntryStatus::Deleted => "deleted",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "deleted" => EntryStatus::Deleted,
            _ => EntryStatus::Active,
        }
    }
}

/// A top-level unit of ingested content.
///
/// `id` and `created_at` are immutable after creation; `updated_at` is
/// bumped on every mutation including soft delete and never moves backwards.
/// `chunks_count` is derived by counting chunk rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source: Option<String>,
    pub entry_type: String,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunks_count: usize,
}

impl FeedEntry {
    /// True when the entry carries at least one of the requested tags.
    pub fn has_any_tag(&self, requested: &[String]) -> bool {
        requested.iter().any(|tag| self.tags.iter().any(|t| t == tag))
    }
}

/// A contiguous, possibly-overlapping window of an entry's content.
///
/// `sequence_index` values for one entry are contiguous starting at zero.
/// `embedding` stays `None` until the provider produced a vector for the
/// chunk text.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedChunk {
    pub id: String,
    pub entry_id: String,
    pub sequence_index: usize,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// Inbound draft for creating an entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntryDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl EntryDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            source: None,
            entry_type: None,
            tags: Vec::new(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_entry_type(mut self, entry_type: impl Into<String>) -> Self {
        self.entry_type = Some(entry_type.into());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Partial update; only provided fields are applied. A provided `content`
/// invalidates and rebuilds the entry's whole chunk set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntryUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.source.is_none()
            && self.entry_type.is_none()
            && self.tags.is_none()
            && self.metadata.is_none()
    }
}

/// Status filter for listing entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    Active,
    Deleted,
    All,
}

/// One page of listed entries plus pagination metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntryPage {
    pub items: Vec<FeedEntry>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

/// Collapse duplicates and fix an order so tag sets compare stably.
pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
