//! Lifecycle tests for the feed orchestrator with mock embeddings.
//!
//! Everything here runs against a scratch SQLite file and the deterministic
//! mock provider, so outcomes are fully reproducible.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use feedsmith::chunking::expected_chunk_count;
use feedsmith::{
    EmbeddingProvider, EntryDraft, EntryStatus, EntryUpdate, FeedConfig, FeedError,
    FeedOrchestrator, MockEmbeddingProvider, StatusFilter,
};
use tempfile::TempDir;

const CHUNK_SIZE: usize = 64;
const CHUNK_OVERLAP: usize = 16;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn make_orchestrator(dir: &TempDir) -> FeedOrchestrator {
    init_tracing();
    let config = FeedConfig::default()
        .with_db_path(dir.path().join("feed.db").display().to_string())
        .with_chunking(CHUNK_SIZE, CHUNK_OVERLAP);
    FeedOrchestrator::open(config, Arc::new(MockEmbeddingProvider::with_dimensions(32)))
        .await
        .expect("orchestrator opens")
}

/// Deterministic provider with a switchable outage.
struct OutageProvider {
    inner: MockEmbeddingProvider,
    failing: Arc<AtomicBool>,
}

impl OutageProvider {
    fn new(failing: Arc<AtomicBool>) -> Self {
        Self {
            inner: MockEmbeddingProvider::with_dimensions(32),
            failing,
        }
    }

    fn check(&self) -> Result<(), FeedError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(FeedError::EmbeddingUnavailable("provider offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OutageProvider {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, FeedError> {
        self.check()?;
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, FeedError> {
        self.check()?;
        self.inner.embed_batch(texts).await
    }
}

fn long_content(chars: usize) -> String {
    "the quick brown fox jumps over the lazy dog "
        .chars()
        .cycle()
        .take(chars)
        .collect()
}

#[tokio::test]
async fn create_round_trips_entry_and_chunks() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    let content = long_content(200);
    let draft = EntryDraft::new("First entry", content.clone())
        .with_tags(["alpha", "beta"])
        .with_metadata(serde_json::json!({"origin": "test"}));
    let created = feed.create_entry(draft).await.unwrap();

    assert_eq!(created.status, EntryStatus::Active);
    assert_eq!(created.entry_type, "note", "entry type defaults to note");
    assert_eq!(created.tags, vec!["alpha", "beta"]);
    assert_eq!(
        created.chunks_count,
        expected_chunk_count(200, CHUNK_SIZE, CHUNK_OVERLAP)
    );

    let fetched = feed.get_entry(&created.id).await.unwrap();
    assert_eq!(fetched.title, "First entry");
    assert_eq!(fetched.content, content);
    assert_eq!(fetched.metadata["origin"], "test");

    let chunks = feed.get_chunks(&created.id).await.unwrap();
    assert_eq!(chunks.len(), created.chunks_count);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence_index, i);
        assert!(chunk.embedding.is_some(), "chunk {i} carries an embedding");
    }

    // Dropping the overlap from each follow-up chunk reconstructs the content.
    let mut rebuilt = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            rebuilt.push_str(&chunk.text);
        } else {
            rebuilt.extend(chunk.text.chars().skip(CHUNK_OVERLAP));
        }
    }
    assert_eq!(rebuilt, content);
}

#[tokio::test]
async fn create_rejects_blank_title_and_content() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    let blank_title = feed
        .create_entry(EntryDraft::new("   ", "some content"))
        .await;
    assert!(matches!(blank_title, Err(FeedError::Validation(_))));

    let blank_content = feed.create_entry(EntryDraft::new("title", "  \n ")).await;
    assert!(matches!(blank_content, Err(FeedError::Validation(_))));

    let stats = feed.stats().await.unwrap();
    assert_eq!(stats.total_entries, 0, "rejected drafts leave no rows");
}

#[tokio::test]
async fn update_rechunks_content_atomically() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    let created = feed
        .create_entry(EntryDraft::new("Updatable", long_content(200)))
        .await
        .unwrap();
    let old_chunk_ids: Vec<String> = feed
        .get_chunks(&created.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();

    let update = EntryUpdate {
        content: Some(long_content(400)),
        ..Default::default()
    };
    let updated = feed.update_entry(&created.id, update).await.unwrap();

    assert_eq!(updated.title, "Updatable", "unspecified fields survive");
    assert_eq!(
        updated.chunks_count,
        expected_chunk_count(400, CHUNK_SIZE, CHUNK_OVERLAP)
    );
    assert!(updated.updated_at >= created.updated_at);
    assert_eq!(updated.created_at, created.created_at);

    let new_chunks = feed.get_chunks(&created.id).await.unwrap();
    assert_eq!(new_chunks.len(), updated.chunks_count);
    for chunk in &new_chunks {
        assert!(
            !old_chunk_ids.contains(&chunk.id),
            "old chunk ids are fully replaced"
        );
    }
}

#[tokio::test]
async fn metadata_only_update_keeps_chunk_set() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    let created = feed
        .create_entry(EntryDraft::new("Stable chunks", long_content(150)))
        .await
        .unwrap();
    let before: Vec<String> = feed
        .get_chunks(&created.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();

    let update = EntryUpdate {
        title: Some("Renamed".into()),
        tags: Some(vec!["fresh".into()]),
        ..Default::default()
    };
    let updated = feed.update_entry(&created.id, update).await.unwrap();
    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.tags, vec!["fresh"]);

    let after: Vec<String> = feed
        .get_chunks(&created.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(before, after, "no content change, no re-chunk");
}

#[tokio::test]
async fn update_rejects_empty_patch_and_unknown_id() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    let created = feed
        .create_entry(EntryDraft::new("target", "content"))
        .await
        .unwrap();

    let empty = feed.update_entry(&created.id, EntryUpdate::default()).await;
    assert!(matches!(empty, Err(FeedError::Validation(_))));

    let update = EntryUpdate {
        title: Some("x".into()),
        ..Default::default()
    };
    let missing = feed.update_entry("no-such-id", update).await;
    assert!(matches!(missing, Err(FeedError::NotFound { .. })));
}

#[tokio::test]
async fn soft_delete_keeps_rows_and_hides_from_listing() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    let created = feed
        .create_entry(EntryDraft::new("Ephemeral", long_content(150)))
        .await
        .unwrap();
    feed.delete_entry(&created.id, false).await.unwrap();

    let fetched = feed.get_entry(&created.id).await.unwrap();
    assert_eq!(fetched.status, EntryStatus::Deleted);
    assert!(fetched.updated_at >= created.updated_at);

    let chunks = feed.get_chunks(&created.id).await.unwrap();
    assert!(!chunks.is_empty(), "chunk rows survive soft delete");

    let active = feed.list_entries(1, 10, StatusFilter::Active).await.unwrap();
    assert_eq!(active.total, 0);
    let deleted = feed.list_entries(1, 10, StatusFilter::Deleted).await.unwrap();
    assert_eq!(deleted.total, 1);

    // Repeating the soft delete is a no-op success.
    feed.delete_entry(&created.id, false).await.unwrap();

    // Soft-deleted entries are no longer updatable.
    let update = EntryUpdate {
        title: Some("revived?".into()),
        ..Default::default()
    };
    let result = feed.update_entry(&created.id, update).await;
    assert!(matches!(result, Err(FeedError::NotFound { .. })));
}

#[tokio::test]
async fn hard_delete_removes_everything() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    let created = feed
        .create_entry(EntryDraft::new("Doomed", long_content(150)))
        .await
        .unwrap();
    feed.delete_entry(&created.id, true).await.unwrap();

    assert!(matches!(
        feed.get_entry(&created.id).await,
        Err(FeedError::NotFound { .. })
    ));
    assert!(matches!(
        feed.get_chunks(&created.id).await,
        Err(FeedError::NotFound { .. })
    ));
    // A second hard delete reports NotFound.
    assert!(matches!(
        feed.delete_entry(&created.id, true).await,
        Err(FeedError::NotFound { .. })
    ));

    let stats = feed.stats().await.unwrap();
    assert_eq!(stats.total_entries, 0);
    assert_eq!(stats.total_chunks, 0);
}

#[tokio::test]
async fn batch_isolates_the_failing_draft() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    let drafts = vec![
        EntryDraft::new("first", "alpha content"),
        EntryDraft::new("", "invalid: blank title"),
        EntryDraft::new("third", "gamma content"),
    ];
    let outcomes = feed.batch_create(drafts).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].as_ref().unwrap().title, "first");
    assert!(matches!(outcomes[1], Err(FeedError::Validation(_))));
    assert_eq!(outcomes[2].as_ref().unwrap().title, "third");

    let stats = feed.stats().await.unwrap();
    assert_eq!(stats.active_entries, 2);
}

#[tokio::test]
async fn batch_enforces_the_configured_cap() {
    let dir = TempDir::new().unwrap();
    let config = FeedConfig::default()
        .with_db_path(dir.path().join("feed.db").display().to_string())
        .with_chunking(CHUNK_SIZE, CHUNK_OVERLAP)
        .with_max_batch_size(2);
    let feed = FeedOrchestrator::open(
        config,
        Arc::new(MockEmbeddingProvider::with_dimensions(32)),
    )
    .await
    .unwrap();

    let drafts = vec![
        EntryDraft::new("a", "one"),
        EntryDraft::new("b", "two"),
        EntryDraft::new("c", "three"),
    ];
    assert!(matches!(
        feed.batch_create(drafts).await,
        Err(FeedError::Validation(_))
    ));
    assert!(matches!(
        feed.batch_create(Vec::new()).await,
        Err(FeedError::Validation(_))
    ));
}

#[tokio::test]
async fn listing_paginates_newest_first() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    for i in 1..=5 {
        feed.create_entry(EntryDraft::new(format!("entry-{i}"), "content"))
            .await
            .unwrap();
    }

    let page1 = feed.list_entries(1, 2, StatusFilter::Active).await.unwrap();
    assert_eq!(page1.total, 5);
    assert_eq!(page1.items.len(), 2);
    assert_eq!(page1.items[0].title, "entry-5");
    assert_eq!(page1.items[1].title, "entry-4");

    let page3 = feed.list_entries(3, 2, StatusFilter::Active).await.unwrap();
    assert_eq!(page3.items.len(), 1);
    assert_eq!(page3.items[0].title, "entry-1");

    assert!(matches!(
        feed.list_entries(0, 10, StatusFilter::Active).await,
        Err(FeedError::Validation(_))
    ));
    assert!(matches!(
        feed.list_entries(1, 0, StatusFilter::Active).await,
        Err(FeedError::Validation(_))
    ));
}

#[tokio::test]
async fn stats_track_status_transitions() {
    let dir = TempDir::new().unwrap();
    let feed = make_orchestrator(&dir).await;

    let a = feed
        .create_entry(EntryDraft::new("a", long_content(150)))
        .await
        .unwrap();
    feed.create_entry(EntryDraft::new("b", long_content(150)))
        .await
        .unwrap();
    feed.delete_entry(&a.id, false).await.unwrap();

    let stats = feed.stats().await.unwrap();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.active_entries, 1);
    assert_eq!(stats.deleted_entries, 1);
    assert!(stats.total_chunks > 0, "soft delete keeps chunk rows");
}

#[tokio::test]
async fn embedding_outage_fails_create_with_no_partial_rows() {
    let dir = TempDir::new().unwrap();
    let failing = Arc::new(AtomicBool::new(true));
    let config = FeedConfig::default()
        .with_db_path(dir.path().join("feed.db").display().to_string())
        .with_chunking(CHUNK_SIZE, CHUNK_OVERLAP);
    let feed = FeedOrchestrator::open(config, Arc::new(OutageProvider::new(failing)))
        .await
        .unwrap();

    let result = feed
        .create_entry(EntryDraft::new("unreachable", long_content(200)))
        .await;
    assert!(matches!(result, Err(FeedError::EmbeddingUnavailable(_))));

    let stats = feed.stats().await.unwrap();
    assert_eq!(stats.total_entries, 0, "failed create persists nothing");
    assert_eq!(stats.total_chunks, 0);
}

#[tokio::test]
async fn embedding_outage_leaves_updated_entry_untouched() {
    let dir = TempDir::new().unwrap();
    let failing = Arc::new(AtomicBool::new(false));
    let config = FeedConfig::default()
        .with_db_path(dir.path().join("feed.db").display().to_string())
        .with_chunking(CHUNK_SIZE, CHUNK_OVERLAP);
    let feed = FeedOrchestrator::open(config, Arc::new(OutageProvider::new(failing.clone())))
        .await
        .unwrap();

    let content = long_content(200);
    let created = feed
        .create_entry(EntryDraft::new("durable", content.clone()))
        .await
        .unwrap();
    let chunk_ids_before: Vec<String> = feed
        .get_chunks(&created.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();

    failing.store(true, Ordering::SeqCst);
    let update = EntryUpdate {
        content: Some(long_content(400)),
        ..Default::default()
    };
    let result = feed.update_entry(&created.id, update).await;
    assert!(matches!(result, Err(FeedError::EmbeddingUnavailable(_))));

    let fetched = feed.get_entry(&created.id).await.unwrap();
    assert_eq!(fetched.content, content, "old content survives the outage");
    let chunk_ids_after: Vec<String> = feed
        .get_chunks(&created.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(chunk_ids_before, chunk_ids_after, "old chunk batch intact");
}

#[tokio::test]
async fn oversized_content_is_rejected_at_the_boundary() {
    let dir = TempDir::new().unwrap();
    let config = FeedConfig::default()
        .with_db_path(dir.path().join("feed.db").display().to_string())
        .with_chunking(CHUNK_SIZE, CHUNK_OVERLAP)
        .with_max_content_len(100);
    let feed = FeedOrchestrator::open(
        config,
        Arc::new(MockEmbeddingProvider::with_dimensions(32)),
    )
    .await
    .unwrap();

    let create = feed
        .create_entry(EntryDraft::new("too big", long_content(101)))
        .await;
    assert!(matches!(create, Err(FeedError::Validation(_))));

    let created = feed
        .create_entry(EntryDraft::new("fits", long_content(100)))
        .await
        .unwrap();
    let update = EntryUpdate {
        content: Some(long_content(101)),
        ..Default::default()
    };
    let update_result = feed.update_entry(&created.id, update).await;
    assert!(matches!(update_result, Err(FeedError::Validation(_))));
}

#[tokio::test]
async fn reopening_rebuilds_the_vector_index() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("feed.db").display().to_string();
    let config = FeedConfig::default()
        .with_db_path(db_path.clone())
        .with_chunking(CHUNK_SIZE, CHUNK_OVERLAP);
    let embedder = Arc::new(MockEmbeddingProvider::with_dimensions(32));

    let entry_id = {
        let feed = FeedOrchestrator::open(config.clone(), embedder.clone())
            .await
            .unwrap();
        feed.create_entry(EntryDraft::new("Persistent", long_content(200)))
            .await
            .unwrap()
            .id
    };

    let reopened = FeedOrchestrator::open(config, embedder).await.unwrap();
    let request = feedsmith::SearchRequest::new("persistent");
    let results = reopened.search(&request).await.unwrap();
    let hit = results
        .iter()
        .find(|r| r.entry.id == entry_id)
        .expect("entry still searchable after reopen");
    assert!(
        hit.semantic_score > 0.0,
        "semantic signal restored from persisted embeddings"
    );
}
