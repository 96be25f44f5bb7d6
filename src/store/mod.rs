//! Branch-partitioned persistence.
//!
//! A single SQLite file holds symbols, edges, file records, the repo map,
//! an FTS5 trigram index, and embedding vectors. The connection behind a
//! mutex is the engine's one serialization point; each mutating repo
//! method is transactional, and [`Store::apply_file_index`] commits a
//! file's symbols, vectors, FTS rows, and edges atomically so a reader
//! never observes a symbol without its materialized views.

mod edges;
mod files;
mod keyword;
mod symbols;
mod vectors;

pub use edges::EdgeRepo;
pub use files::FileRepo;
pub use keyword::{KeywordHit, KeywordRepo, KeywordSearchOutcome};
pub use symbols::SymbolRepo;
pub use vectors::{VectorHit, VectorRepo};

use crate::error::{EngineError, Result};
use crate::types::{Edge, FileRecord, RepoMapEntry, Symbol};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SCHEMA_VERSION: i64 = 1;

const META_SCHEMA_VERSION: &str = "schema_version";
const META_EMBEDDING_MODEL: &str = "embedding_model_id";
const META_EMBEDDING_DIMENSION: &str = "embedding_dimension";
const META_REVISION_SEQ: &str = "revision_seq";

/// Aggregate store statistics for `index.status()`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StoreStatus {
    pub file_count: u64,
    pub chunk_count: u64,
    pub last_updated: Option<i64>,
    pub db_size_bytes: u64,
}

pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    embedding_dimension: usize,
}

impl Store {
    /// Open (or create) the store, applying pragmas and migrations.
    pub fn open(path: &Path, embedding_dimension: usize, model_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| EngineError::StoreOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::init(conn, path.to_path_buf(), embedding_dimension, model_id)
    }

    /// In-memory store for tests.
    pub fn open_in_memory(embedding_dimension: usize, model_id: &str) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| EngineError::StoreOpen {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        Self::init(conn, PathBuf::from(":memory:"), embedding_dimension, model_id)
    }

    fn init(
        conn: Connection,
        path: PathBuf,
        embedding_dimension: usize,
        model_id: &str,
    ) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            embedding_dimension,
        };
        store.migrate()?;

        // First open records the embedding geometry; later opens keep the
        // stored values so `needs_reembedding` can compare against them.
        if store.metadata(META_EMBEDDING_MODEL)?.is_none() {
            store.set_metadata(META_EMBEDDING_MODEL, model_id)?;
            store.set_metadata(META_EMBEDDING_DIMENSION, &embedding_dimension.to_string())?;
        }
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 = conn
            .query_row(
                "SELECT value FROM schema_metadata WHERE key = ?1",
                [META_SCHEMA_VERSION],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        for version in (current + 1)..=SCHEMA_VERSION {
            let sql = match version {
                1 => SCHEMA_V1,
                _ => continue,
            };
            conn.execute_batch(sql)
                .map_err(|e| EngineError::SchemaMigration { version, source: e })?;
            conn.execute(
                "INSERT INTO schema_metadata (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![META_SCHEMA_VERSION, version.to_string()],
            )?;
            tracing::debug!("migrated store schema to v{version}");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    pub fn symbols(&self) -> SymbolRepo {
        SymbolRepo::new(self.conn.clone())
    }

    pub fn edges(&self) -> EdgeRepo {
        EdgeRepo::new(self.conn.clone())
    }

    pub fn files(&self) -> FileRepo {
        FileRepo::new(self.conn.clone())
    }

    pub fn keywords(&self) -> KeywordRepo {
        KeywordRepo::new(self.conn.clone())
    }

    pub fn vectors(&self) -> VectorRepo {
        VectorRepo::new(self.conn.clone(), self.embedding_dimension)
    }

    pub fn metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM schema_metadata WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO schema_metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// True when the stored embeddings were produced by a different model
    /// and must be regenerated before vector search is meaningful.
    pub fn needs_reembedding(&self, model_id: &str) -> Result<bool> {
        Ok(match self.metadata(META_EMBEDDING_MODEL)? {
            Some(stored) => stored != model_id,
            None => false,
        })
    }

    /// Record the active embedding model after a full re-embed.
    pub fn set_embedding_model(&self, model_id: &str, dimension: usize) -> Result<()> {
        self.set_metadata(META_EMBEDDING_MODEL, model_id)?;
        self.set_metadata(META_EMBEDDING_DIMENSION, &dimension.to_string())
    }

    /// Next value of the store-wide monotonic revision counter.
    pub fn next_revision(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let current: i64 = conn
            .query_row(
                "SELECT value FROM schema_metadata WHERE key = ?1",
                [META_REVISION_SEQ],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let next = current + 1;
        conn.execute(
            "INSERT INTO schema_metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![META_REVISION_SEQ, next.to_string()],
        )?;
        Ok(next)
    }

    pub fn status(&self, branch: &str) -> Result<StoreStatus> {
        let conn = self.conn.lock();
        let file_count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE branch = ?1",
            [branch],
            |row| row.get(0),
        )?;
        let chunk_count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM symbols WHERE branch = ?1 AND is_external = 0",
            [branch],
            |row| row.get(0),
        )?;
        let last_updated: Option<i64> = conn.query_row(
            "SELECT MAX(last_indexed) FROM files WHERE branch = ?1",
            [branch],
            |row| row.get(0),
        )?;
        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(StoreStatus {
            file_count,
            chunk_count,
            last_updated,
            db_size_bytes,
        })
    }

    /// Atomically replace everything the store holds for one file:
    /// symbols, then vectors, then FTS rows, then edges, then the file
    /// record itself.
    pub fn apply_file_index(&self, batch: &FileIndexBatch) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let path = batch.file.file_path.as_str();
        let branch = batch.file.branch.as_str();
        delete_file_rows(&tx, path, branch)?;

        for symbol in &batch.symbols {
            symbols::insert_symbol(&tx, symbol)?;
        }
        for (symbol_id, vector) in &batch.vectors {
            vectors::check_dimension(symbol_id, vector, self.embedding_dimension)?;
            vectors::insert_vector(&tx, symbol_id, branch, vector, batch.file.last_indexed)?;
        }
        for symbol in &batch.symbols {
            // External stubs exist only as edge endpoints; they carry no
            // searchable text.
            if !symbol.is_external {
                keyword::insert_fts(&tx, symbol)?;
            }
        }
        for edge in &batch.edges {
            edges::insert_edge(&tx, edge)?;
        }
        files::insert_file(&tx, &batch.file)?;

        tx.commit()?;
        Ok(())
    }

    /// Drop a file's symbols, edges, FTS entries, and vectors while
    /// keeping its file record. Used when indexing a file fails partway:
    /// a file in `status=error` must not contribute symbols.
    pub fn clear_file_rows(&self, path: &str, branch: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        delete_file_rows(&tx, path, branch)?;
        tx.commit()?;
        Ok(())
    }

    /// Remove a deleted file's symbols, edges, FTS entries, vectors, and
    /// file record in one transaction.
    pub fn delete_file(&self, path: &str, branch: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        delete_file_rows(&tx, path, branch)?;
        tx.execute(
            "DELETE FROM files WHERE file_path = ?1 AND branch = ?2",
            params![path, branch],
        )?;
        tx.execute(
            "DELETE FROM repo_map WHERE file_path = ?1 AND branch = ?2",
            params![path, branch],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Drop every row belonging to a branch. Used by `rebuild()`.
    pub fn truncate_branch(&self, branch: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM fts_symbols WHERE branch = ?1", [branch])?;
        tx.execute("DELETE FROM vectors WHERE branch = ?1", [branch])?;
        tx.execute("DELETE FROM edges WHERE branch = ?1", [branch])?;
        tx.execute("DELETE FROM symbols WHERE branch = ?1", [branch])?;
        tx.execute("DELETE FROM files WHERE branch = ?1", [branch])?;
        tx.execute("DELETE FROM repo_map WHERE branch = ?1", [branch])?;
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_repo_map(&self, entries: &[RepoMapEntry]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for entry in entries {
            tx.execute(
                "INSERT INTO repo_map
                     (file_path, branch, importance_score, in_degree, out_degree, symbol_summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(file_path, branch) DO UPDATE SET
                     importance_score = excluded.importance_score,
                     in_degree = excluded.in_degree,
                     out_degree = excluded.out_degree,
                     symbol_summary = excluded.symbol_summary",
                params![
                    entry.file_path,
                    entry.branch,
                    entry.importance_score,
                    entry.in_degree,
                    entry.out_degree,
                    entry.symbol_summary,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn repo_map(&self, branch: &str, limit: usize) -> Result<Vec<RepoMapEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT file_path, branch, importance_score, in_degree, out_degree, symbol_summary
             FROM repo_map WHERE branch = ?1
             ORDER BY importance_score DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![branch, limit as i64], |row| {
                Ok(RepoMapEntry {
                    file_path: row.get(0)?,
                    branch: row.get(1)?,
                    importance_score: row.get(2)?,
                    in_degree: row.get(3)?,
                    out_degree: row.get(4)?,
                    symbol_summary: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// What one indexed file contributes to the store.
#[derive(Debug, Clone)]
pub struct FileIndexBatch {
    pub file: FileRecord,
    pub symbols: Vec<Symbol>,
    /// `(symbol_id, embedding)` pairs; absent for symbols whose embedding
    /// failed (they stay searchable by keyword).
    pub vectors: Vec<(String, Vec<f32>)>,
    pub edges: Vec<Edge>,
}

fn delete_file_rows(conn: &Connection, path: &str, branch: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM fts_symbols WHERE branch = ?2 AND symbol_id IN
             (SELECT id FROM symbols WHERE file_path = ?1 AND branch = ?2)",
        params![path, branch],
    )?;
    conn.execute(
        "DELETE FROM vectors WHERE branch = ?2 AND symbol_id IN
             (SELECT id FROM symbols WHERE file_path = ?1 AND branch = ?2)",
        params![path, branch],
    )?;
    // Edges die with either endpoint; they are never left orphaned.
    conn.execute(
        "DELETE FROM edges WHERE branch = ?2 AND (
             source_id IN (SELECT id FROM symbols WHERE file_path = ?1 AND branch = ?2)
             OR target_id IN (SELECT id FROM symbols WHERE file_path = ?1 AND branch = ?2))",
        params![path, branch],
    )?;
    conn.execute(
        "DELETE FROM symbols WHERE file_path = ?1 AND branch = ?2",
        params![path, branch],
    )?;
    Ok(())
}

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    id TEXT NOT NULL,
    branch TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    language TEXT NOT NULL,
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    content TEXT NOT NULL,
    signature TEXT,
    docstring TEXT,
    content_hash TEXT NOT NULL,
    is_external INTEGER NOT NULL DEFAULT 0,
    embedding_model_id TEXT,
    updated_at INTEGER NOT NULL,
    revision_id INTEGER NOT NULL,
    PRIMARY KEY (id, branch)
);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(branch, file_path);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(branch, name);
CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(branch, kind);
CREATE INDEX IF NOT EXISTS idx_symbols_qname ON symbols(branch, qualified_name);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT NOT NULL,
    branch TEXT NOT NULL,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    confidence REAL NOT NULL,
    origin TEXT NOT NULL,
    source_line INTEGER,
    target_line INTEGER,
    updated_at INTEGER NOT NULL,
    metadata TEXT,
    PRIMARY KEY (id, branch)
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(branch, kind, source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(branch, kind, target_id);

CREATE TABLE IF NOT EXISTS files (
    file_path TEXT NOT NULL,
    branch TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    mtime_ms INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL,
    last_indexed INTEGER NOT NULL,
    language TEXT,
    status TEXT NOT NULL,
    symbol_count INTEGER NOT NULL DEFAULT 0,
    importance_rank REAL,
    error_message TEXT,
    PRIMARY KEY (file_path, branch)
);
CREATE INDEX IF NOT EXISTS idx_files_status ON files(branch, status);

CREATE TABLE IF NOT EXISTS repo_map (
    file_path TEXT NOT NULL,
    branch TEXT NOT NULL,
    importance_score REAL NOT NULL,
    in_degree INTEGER NOT NULL,
    out_degree INTEGER NOT NULL,
    symbol_summary TEXT,
    PRIMARY KEY (file_path, branch)
);

CREATE TABLE IF NOT EXISTS vectors (
    symbol_id TEXT NOT NULL,
    branch TEXT NOT NULL,
    embedding BLOB NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (symbol_id, branch)
);

CREATE VIRTUAL TABLE IF NOT EXISTS fts_symbols USING fts5(
    name, qualified_name, content, file_path,
    symbol_id UNINDEXED, branch UNINDEXED,
    tokenize = 'trigram'
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_records_schema_version_and_model() {
        let store = Store::open_in_memory(4, "mock-model").unwrap();
        assert_eq!(
            store.metadata(META_SCHEMA_VERSION).unwrap().as_deref(),
            Some("1")
        );
        assert!(!store.needs_reembedding("mock-model").unwrap());
        assert!(store.needs_reembedding("other-model").unwrap());
    }

    #[test]
    fn revision_counter_is_monotonic() {
        let store = Store::open_in_memory(4, "mock-model").unwrap();
        let a = store.next_revision().unwrap();
        let b = store.next_revision().unwrap();
        assert!(b > a);
    }
}
