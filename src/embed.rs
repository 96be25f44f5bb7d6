//! Embedding contract and caching.
//!
//! The engine never implements an embedding model; it consumes the
//! [`Embedder`] trait. [`CachedEmbedder`] wraps any implementation with a
//! bounded LRU so repeated symbol contents (vendored files, re-indexed
//! branches) skip the model call, and splits large requests into batches.

use crate::error::{EngineError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_CACHE_CAPACITY: usize = 1_000;

/// External embedding model contract.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
    fn model_id(&self) -> &str;
}

/// Bounded LRU keyed by input text. Access moves an entry to the back;
/// eviction drops the least recently used entry.
struct LruCache {
    entries: HashMap<String, (Vec<f32>, u64)>,
    counter: u64,
    capacity: usize,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            counter: 0,
            capacity: capacity.max(1),
        }
    }

    fn get(&mut self, text: &str) -> Option<Vec<f32>> {
        self.counter += 1;
        let counter = self.counter;
        self.entries.get_mut(text).map(|(vector, stamp)| {
            *stamp = counter;
            vector.clone()
        })
    }

    fn insert(&mut self, text: String, vector: Vec<f32>) {
        self.counter += 1;
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&text) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, stamp))| *stamp)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(text, (vector, self.counter));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Caching, batching front-end over an [`Embedder`].
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache>,
    batch_size: usize,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self::with_capacity(inner, batch_size, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: Arc<dyn Embedder>, batch_size: usize, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    pub fn model_id(&self) -> String {
        self.inner.model_id().to_string()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.lock().get(text) {
            return Ok(hit);
        }
        let vector = self
            .inner
            .embed(text)
            .map_err(|e| EngineError::Embedding(e.to_string()))?;
        self.cache.lock().insert(text.to_string(), vector.clone());
        Ok(vector)
    }

    /// Embed many texts, deduplicating against the cache and chunking the
    /// misses into model-sized batches. Output order matches input order.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut missing: Vec<usize> = Vec::new();

        {
            let mut cache = self.cache.lock();
            for (i, text) in texts.iter().enumerate() {
                match cache.get(text) {
                    Some(hit) => results[i] = Some(hit),
                    None => missing.push(i),
                }
            }
        }

        // Duplicate misses within one request are embedded once.
        let mut unique: Vec<String> = Vec::new();
        let mut unique_index: HashMap<&str, usize> = HashMap::new();
        for &i in &missing {
            let text = texts[i].as_str();
            if !unique_index.contains_key(text) {
                unique_index.insert(text, unique.len());
                unique.push(text.to_string());
            }
        }

        let mut fresh: Vec<Vec<f32>> = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(self.batch_size) {
            let mut vectors = self
                .inner
                .embed_batch(chunk)
                .map_err(|e| EngineError::Embedding(e.to_string()))?;
            if vectors.len() != chunk.len() {
                return Err(EngineError::Embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    chunk.len()
                )));
            }
            fresh.append(&mut vectors);
        }

        {
            let mut cache = self.cache.lock();
            for (text, vector) in unique.iter().zip(fresh.iter()) {
                cache.insert(text.clone(), vector.clone());
            }
        }

        for &i in &missing {
            let j = unique_index[texts[i].as_str()];
            results[i] = Some(fresh[j].clone());
        }

        Ok(results.into_iter().map(|v| v.unwrap_or_default()).collect())
    }
}

/// fastembed-backed implementation, compiled only with the `semantic`
/// feature.
#[cfg(feature = "semantic")]
pub mod fastembed_impl {
    use super::Embedder;
    use anyhow::{Context, Result};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use parking_lot::Mutex;

    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
        dimension: usize,
        model_id: String,
    }

    impl FastEmbedder {
        pub fn all_mini_lm() -> Result<Self> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
            )
            .context("failed to initialize embedding model")?;
            Ok(Self {
                model: Mutex::new(model),
                dimension: 384,
                model_id: "all-minilm-l6-v2".to_string(),
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let vectors = self.model.lock().embed(vec![text.to_string()], None)?;
            vectors.into_iter().next().context("no embedding returned")
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.model.lock().embed(texts.to_vec(), None).map_err(Into::into)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_id(&self) -> &str {
            &self.model_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(self.embed_batch(&[text.to_string()])?.remove(0))
        }

        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "counting"
        }
    }

    fn counting() -> (Arc<CountingEmbedder>, CachedEmbedder) {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedEmbedder::with_capacity(inner.clone(), 10, 3);
        (inner, cached)
    }

    #[test]
    fn cache_suppresses_repeat_calls() {
        let (inner, cached) = counting();
        cached.embed("hello").unwrap();
        cached.embed("hello").unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_deduplicates_inputs() {
        let (inner, cached) = counting();
        let texts = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let vectors = cached.embed_batch(&texts).unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let (_, cached) = counting();
        cached.embed("one").unwrap();
        cached.embed("two").unwrap();
        cached.embed("three").unwrap();
        // Touch "one" so "two" is the eviction candidate.
        cached.embed("one").unwrap();
        cached.embed("four").unwrap();
        assert_eq!(cached.cached_len(), 3);

        let mut cache = cached.cache.lock();
        assert!(cache.get("one").is_some());
        assert!(cache.get("two").is_none());
        assert!(cache.get("four").is_some());
    }

    #[test]
    fn batch_order_matches_input() {
        let (_, cached) = counting();
        let texts = vec!["xx".to_string(), "yyyy".to_string()];
        let vectors = cached.embed_batch(&texts).unwrap();
        assert_eq!(vectors[0][0], 2.0);
        assert_eq!(vectors[1][0], 4.0);
    }
}
