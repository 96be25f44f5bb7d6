//! Shared test fixtures: a deterministic embedder and workspace helpers.
#![allow(dead_code)]

use codescope::Embedder;
use std::fs;
use std::path::Path;

pub const MOCK_DIMENSION: usize = 8;

/// Deterministic bag-of-tokens embedder. Tokens hash into a fixed number
/// of buckets, so texts sharing words land near each other — enough
/// signal for ranking tests without a model.
pub struct MockEmbedder;

impl MockEmbedder {
    fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; MOCK_DIMENSION];
        for token in text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let lower = token.to_lowercase();
            let mut hash: u64 = 1469598103934665603;
            for byte in lower.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            vector[(hash % MOCK_DIMENSION as u64) as usize] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(Self::vector_for(text))
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }

    fn model_id(&self) -> &str {
        "mock-bag-of-tokens"
    }
}

/// An embedder that always fails, for error-path tests.
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("model unavailable")
    }

    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model unavailable")
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

pub fn write_file(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}
