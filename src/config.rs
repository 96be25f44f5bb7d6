//! Engine configuration.
//!
//! All options carry serde defaults so a partial JSON/TOML fragment
//! deserializes into a working config. Validation happens once at engine
//! construction; a bad glob fails fast instead of surfacing mid-index.

use crate::error::{EngineError, Result};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = ".codescope/index.db";
pub const DEFAULT_CACHE_PATH: &str = ".codescope/merkle-cache.json";

/// Maximum graph expansion depth accepted from a query.
pub const MAX_GRAPH_DEPTH: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Workspace root to index.
    pub root: PathBuf,
    /// Branch partition written by this engine instance.
    pub branch: String,
    /// Store location, relative to `root` unless absolute.
    pub db_path: PathBuf,
    /// Merkle snapshot location, relative to `root` unless absolute.
    pub cache_path: PathBuf,

    /// Expected embedding dimension; recorded in the store at creation.
    pub embedding_dimension: usize,
    /// Fallback chunker: lines per chunk when a file yields no symbols.
    pub max_chunk_lines: u32,
    pub chunk_overlap: u32,

    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_file_size: u64,

    /// Bounded fan-out for concurrent file indexing.
    pub parallelism: usize,
    pub embedding_batch_size: usize,

    pub auto_refresh: bool,
    pub auto_refresh_cooldown_ms: u64,
    /// Auto-refresh skips workspaces larger than this many files.
    pub auto_refresh_max_files: usize,

    pub graph_depth: u32,
    pub max_fan_out: usize,
    pub confidence_threshold: f32,
    pub max_tokens: usize,
    pub rrf_k: f32,
    pub exact_name_boost: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            branch: "main".to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            embedding_dimension: 384,
            max_chunk_lines: 100,
            chunk_overlap: 10,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_file_size: 2 * 1024 * 1024,
            parallelism: 10,
            embedding_batch_size: 100,
            auto_refresh: true,
            auto_refresh_cooldown_ms: 30_000,
            auto_refresh_max_files: 10_000,
            graph_depth: 2,
            max_fan_out: 10,
            confidence_threshold: 0.5,
            max_tokens: 8_000,
            rrf_k: 60.0,
            exact_name_boost: 2.0,
        }
    }
}

impl EngineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    pub fn with_include(mut self, pattern: impl Into<String>) -> Self {
        self.include_patterns.push(pattern.into());
        self
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    pub fn with_embedding_dimension(mut self, dim: usize) -> Self {
        self.embedding_dimension = dim;
        self
    }

    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// Resolved store path.
    pub fn db_file(&self) -> PathBuf {
        if self.db_path.is_absolute() {
            self.db_path.clone()
        } else {
            self.root.join(&self.db_path)
        }
    }

    /// Resolved Merkle snapshot path.
    pub fn cache_file(&self) -> PathBuf {
        if self.cache_path.is_absolute() {
            self.cache_path.clone()
        } else {
            self.root.join(&self.cache_path)
        }
    }

    /// Fail-fast validation of everything that would otherwise blow up
    /// mid-index.
    pub fn validate(&self) -> Result<()> {
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            Glob::new(pattern)
                .map_err(|e| EngineError::Config(format!("bad glob pattern {pattern:?}: {e}")))?;
        }
        if self.embedding_dimension == 0 {
            return Err(EngineError::Config("embedding_dimension must be > 0".into()));
        }
        if self.parallelism == 0 {
            return Err(EngineError::Config("parallelism must be > 0".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(EngineError::Config("embedding_batch_size must be > 0".into()));
        }
        if self.max_chunk_lines == 0 {
            return Err(EngineError::Config("max_chunk_lines must be > 0".into()));
        }
        if self.chunk_overlap >= self.max_chunk_lines {
            return Err(EngineError::Config(
                "chunk_overlap must be smaller than max_chunk_lines".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(EngineError::Config(
                "confidence_threshold must be within [0, 1]".into(),
            ));
        }
        if self.graph_depth > MAX_GRAPH_DEPTH {
            return Err(EngineError::Config(format!(
                "graph_depth must be <= {MAX_GRAPH_DEPTH}"
            )));
        }
        Ok(())
    }
}
