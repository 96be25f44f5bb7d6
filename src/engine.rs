//! Engine façade.
//!
//! One `Engine` per workspace owns the three process-wide mutable
//! resources — the store handle, the Merkle cache, and the embedder LRU —
//! and passes them explicitly to indexing, retrieval, and analysis. No
//! singletons. Every read path runs the auto-refresh hook first.

use crate::analysis::{
    BranchDiffResult, DiffOptions, ImpactAnalysis, ImpactOptions, analyze_impact, diff_branches,
};
use crate::config::EngineConfig;
use crate::embed::{CachedEmbedder, Embedder};
use crate::error::Result;
use crate::index::{
    IndexManager, IndexStatus, ProgressFn, RelationshipSource, UpdateReport,
};
use crate::retrieval::{
    QueryResult, Retrieval, SearchOptions, SimilarHit, SimilarTarget,
};
use crate::store::Store;
use crate::types::RepoMapEntry;
use std::sync::Arc;

pub struct Engine {
    config: EngineConfig,
    store: Arc<Store>,
    index: IndexManager,
    retrieval: Retrieval,
    embedder: Arc<CachedEmbedder>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        relationships: Option<Arc<dyn RelationshipSource>>,
    ) -> Result<Self> {
        config.validate()?;

        let cached = Arc::new(CachedEmbedder::new(
            embedder,
            config.embedding_batch_size,
        ));
        if config.embedding_dimension != cached.dimension() {
            tracing::warn!(
                "configured embedding_dimension {} differs from the embedder's {}; using the embedder's",
                config.embedding_dimension,
                cached.dimension()
            );
        }
        let store = Arc::new(Store::open(
            &config.db_file(),
            cached.dimension(),
            &cached.model_id(),
        )?);

        if store.needs_reembedding(&cached.model_id())? {
            tracing::warn!(
                "store was embedded with a different model; the next update will re-embed"
            );
        }

        let index = IndexManager::new(store.clone(), cached.clone(), config.clone(), relationships)?;
        let retrieval = Retrieval::new(store.clone(), cached.clone(), config.clone());

        Ok(Self {
            config,
            store,
            index,
            retrieval,
            embedder: cached,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn set_progress(&self, callback: Option<ProgressFn>) {
        self.index.set_progress(callback);
    }

    /// Incremental index of everything that changed.
    pub async fn update(&self) -> Result<UpdateReport> {
        self.index.update().await
    }

    /// Full rebuild of the branch partition.
    pub async fn rebuild(&self) -> Result<UpdateReport> {
        self.index.rebuild().await
    }

    pub fn status(&self) -> Result<IndexStatus> {
        self.index.status()
    }

    /// Hybrid search. Refreshes the index first (best effort).
    pub async fn search(&self, options: &SearchOptions) -> Result<QueryResult> {
        self.index.ensure_fresh().await;
        self.retrieval.search(options).await
    }

    /// Search from plain text: the query is embedded and also used as the
    /// keyword query, which is the common calling convention.
    pub async fn search_text(&self, text: &str, mut options: SearchOptions) -> Result<QueryResult> {
        if options.embedding.is_none() && !text.trim().is_empty() {
            match self.embedder.embed(text) {
                Ok(vector) => options.embedding = Some(vector),
                Err(e) => tracing::warn!("query embedding failed, keyword-only search: {e}"),
            }
        }
        if options.query_text.is_none() {
            options.query_text = Some(text.to_string());
        }
        self.search(&options).await
    }

    pub async fn find_similar(
        &self,
        target: &SimilarTarget,
        limit: usize,
        branch: Option<&str>,
    ) -> Result<Vec<SimilarHit>> {
        self.index.ensure_fresh().await;
        self.retrieval.find_similar(target, limit, branch).await
    }

    pub async fn impact(
        &self,
        symbol_id: &str,
        options: Option<ImpactOptions>,
    ) -> Result<Option<ImpactAnalysis>> {
        self.index.ensure_fresh().await;
        let options = options.unwrap_or_else(|| ImpactOptions {
            branch: self.config.branch.clone(),
            ..Default::default()
        });
        analyze_impact(&self.store, symbol_id, &options)
    }

    pub async fn diff(
        &self,
        source_branch: &str,
        target_branch: &str,
        options: Option<DiffOptions>,
    ) -> Result<BranchDiffResult> {
        self.index.ensure_fresh().await;
        diff_branches(
            &self.store,
            source_branch,
            target_branch,
            &options.unwrap_or_default(),
        )
    }

    /// Most important files of the branch, per the import graph.
    pub fn repo_map(&self, limit: usize) -> Result<Vec<RepoMapEntry>> {
        self.store.repo_map(&self.config.branch, limit)
    }
}
