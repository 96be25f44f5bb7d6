//! Vector repository.
//!
//! Embeddings are stored as little-endian f32 blobs and searched with an
//! exact cosine scan over the branch partition. The scan keeps the same
//! contract a native vector extension would expose — `(symbol_id,
//! distance, similarity = 1 - distance)` — only latency differs.

use crate::error::{EngineError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub symbol_id: String,
    /// Cosine distance in [0, 2]; zero-norm vectors score 1.0.
    pub distance: f32,
    pub similarity: f32,
}

pub struct VectorRepo {
    conn: Arc<Mutex<Connection>>,
    dimension: usize,
}

impl VectorRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>, dimension: usize) -> Self {
        Self { conn, dimension }
    }

    pub fn upsert(&self, symbol_id: &str, branch: &str, vector: &[f32]) -> Result<()> {
        check_dimension(symbol_id, vector, self.dimension)?;
        let conn = self.conn.lock();
        insert_vector(&conn, symbol_id, branch, vector, crate::types::now_ms())?;
        Ok(())
    }

    /// Top-k nearest symbols by cosine distance within one branch.
    pub fn search(&self, query: &[f32], k: usize, branch: &str) -> Result<Vec<VectorHit>> {
        if query.len() != self.dimension {
            return Err(EngineError::SerializeEmbedding {
                symbol_id: "<query>".into(),
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT symbol_id, embedding FROM vectors WHERE branch = ?1")?;
        let rows = stmt.query_map([branch], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (symbol_id, blob) = row?;
            let stored = decode(&blob);
            if stored.len() != self.dimension {
                tracing::warn!(
                    "vector for {symbol_id} has {} dimensions, expected {}; skipping",
                    stored.len(),
                    self.dimension
                );
                continue;
            }
            let distance = cosine_distance(query, &stored);
            hits.push(VectorHit {
                symbol_id,
                distance,
                similarity: 1.0 - distance,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol_id.cmp(&b.symbol_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    pub fn get(&self, symbol_id: &str, branch: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.conn.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM vectors WHERE symbol_id = ?1 AND branch = ?2",
                params![symbol_id, branch],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(blob.map(|b| decode(&b)))
    }

    pub fn delete(&self, symbol_id: &str, branch: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM vectors WHERE symbol_id = ?1 AND branch = ?2",
            params![symbol_id, branch],
        )?;
        Ok(())
    }

    pub fn delete_by_file(&self, file_path: &str, branch: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM vectors WHERE branch = ?2 AND symbol_id IN
                 (SELECT id FROM symbols WHERE file_path = ?1 AND branch = ?2)",
            params![file_path, branch],
        )?;
        Ok(())
    }

    pub fn count(&self, branch: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM vectors WHERE branch = ?1",
            [branch],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

pub(crate) fn check_dimension(symbol_id: &str, vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(EngineError::SerializeEmbedding {
            symbol_id: symbol_id.to_string(),
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

pub(crate) fn insert_vector(
    conn: &Connection,
    symbol_id: &str,
    branch: &str,
    vector: &[f32],
    updated_at: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO vectors (symbol_id, branch, embedding, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(symbol_id, branch) DO UPDATE SET
             embedding = excluded.embedding,
             updated_at = excluded.updated_at",
        params![symbol_id, branch, encode(vector), updated_at],
    )?;
    Ok(())
}

fn encode(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn decode(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let vector = vec![0.5f32, -1.25, 3.0, 0.0];
        assert_eq!(decode(&encode(&vector)), vector);
    }

    #[test]
    fn cosine_of_identical_vectors_is_zero() {
        let v = vec![0.3f32, 0.4, 0.5];
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_one() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_norm_scores_max_distance() {
        let a = vec![0.0f32, 0.0];
        let b = vec![1.0f32, 0.0];
        assert_eq!(cosine_distance(&a, &b), 1.0);
    }
}
