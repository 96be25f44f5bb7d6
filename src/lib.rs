//! codescope — branch-aware semantic code intelligence.
//!
//! The engine ingests a source tree, extracts a symbol graph (functions,
//! classes, interfaces, types and the call/import edges among them),
//! embeds each symbol as a dense vector, and answers natural-language and
//! structural queries by fusing vector similarity, keyword (BM25) search,
//! and depth-limited graph traversal into a single token-budgeted context
//! bundle.
//!
//! # Architecture
//!
//! - **Store**: one SQLite file holding symbols, edges, file records, an
//!   FTS5 trigram index, and embedding vectors, partitioned by branch.
//! - **Merkle cache**: per-file content hashes with a (mtime, size) fast
//!   path; the root hash summarizes the indexed state.
//! - **Extractor**: tree-sitter adapters (Rust, TypeScript, Python) plus
//!   a lexical fallback, behind a small [`extract::LanguageAdapter`]
//!   trait.
//! - **Index manager**: discovery → change detection → extraction →
//!   embedding → persistence, with bounded fan-out and an auto-refresh
//!   hook on every read path.
//! - **Retrieval**: concurrent vector + keyword search fused by rank
//!   (RRF), graph expansion over call edges, token-budget packing.
//! - **Analysis**: impact (transitive callers + risk) and branch diff.
//!
//! # Usage
//!
//! ```ignore
//! use codescope::{Engine, EngineConfig, SearchOptions};
//!
//! let engine = Engine::new(EngineConfig::new("/path/to/repo"), embedder, None)?;
//! engine.update().await?;
//!
//! let result = engine.search_text("logging setup", SearchOptions::default()).await?;
//! println!("{}", result.context);
//! ```

pub mod analysis;
pub mod config;
pub mod discovery;
pub mod embed;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ident;
pub mod index;
pub mod merkle;
pub mod repomap;
pub mod retrieval;
pub mod store;
pub mod types;

pub use analysis::{
    BranchDiffResult, DiffOptions, ImpactAnalysis, ImpactConfidence, ImpactOptions, RiskLevel,
};
pub use config::EngineConfig;
pub use embed::{CachedEmbedder, Embedder};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use extract::{Extractor, LanguageAdapter};
pub use index::{
    IndexPhase, IndexProgress, IndexStatus, ProgressFn, RelationshipSource, UpdateReport,
};
pub use merkle::MerkleCache;
pub use retrieval::{
    QueryConfidence, QueryResult, SearchOptions, SimilarHit, SimilarTarget,
};
pub use store::Store;
pub use types::*;
