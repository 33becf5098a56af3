//! In-memory vector index over chunk embeddings.
//!
//! A derived cache keyed by chunk id: the source of truth is always the
//! chunk rows in the feed store, and the index can be rebuilt from them at
//! startup. At the corpus sizes this subsystem targets an exact linear scan
//! with cosine similarity is both simpler and effectively-perfect recall.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::FeedError;

struct IndexedVector {
    values: Vec<f32>,
    norm: f32,
}

/// Exact-scan cosine similarity index, safe to share across tasks.
pub struct VectorIndex {
    dimensions: usize,
    vectors: RwLock<HashMap<String, IndexedVector>>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.read().is_empty()
    }

    fn checked(&self, vector: Vec<f32>) -> Result<IndexedVector, FeedError> {
        if vector.len() != self.dimensions {
            return Err(FeedError::InvalidConfiguration(format!(
                "vector dimensionality {} does not match index dimensionality {}",
                vector.len(),
                self.dimensions
            )));
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        Ok(IndexedVector {
            values: vector,
            norm,
        })
    }

    /// Insert or replace the vector stored for `chunk_id`.
    pub fn upsert(&self, chunk_id: impl Into<String>, vector: Vec<f32>) -> Result<(), FeedError> {
        let indexed = self.checked(vector)?;
        self.vectors.write().insert(chunk_id.into(), indexed);
        Ok(())
    }

    /// Remove a chunk's vector. Removing an unknown id is a no-op.
    pub fn remove(&self, chunk_id: &str) {
        self.vectors.write().remove(chunk_id);
    }

    /// Atomically replace one entry's vectors: remove every id in
    /// `stale_ids`, then insert `fresh`. Readers observe either the old set
    /// or the new set, never a mix.
    pub fn replace_entry(
        &self,
        stale_ids: &[String],
        fresh: Vec<(String, Vec<f32>)>,
    ) -> Result<(), FeedError> {
        let mut checked = Vec::with_capacity(fresh.len());
        for (id, vector) in fresh {
            checked.push((id, self.checked(vector)?));
        }
        let mut guard = self.vectors.write();
        for id in stale_ids {
            guard.remove(id);
        }
        for (id, indexed) in checked {
            guard.insert(id, indexed);
        }
        Ok(())
    }

    /// Top-`k` chunk ids by cosine similarity against `query`, descending,
    /// ties broken by chunk id ascending.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, FeedError> {
        if query.len() != self.dimensions {
            return Err(FeedError::InvalidConfiguration(format!(
                "query dimensionality {} does not match index dimensionality {}",
                query.len(),
                self.dimensions
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = query.iter().map(|v| v * v).sum::<f32>().sqrt();
        let guard = self.vectors.read();
        let mut scored: Vec<(String, f32)> = guard
            .iter()
            .map(|(id, indexed)| {
                let score = cosine_similarity(query, query_norm, &indexed.values, indexed.norm);
                (id.clone(), score)
            })
            .collect();
        drop(guard);

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (dot / (a_norm * b_norm)).clamp(-1.0, 1.0)
}
