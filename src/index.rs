//! Index manager: discovery → change detection → extraction → embedding
//! → persistence, plus the auto-refresh hook.
//!
//! Files are indexed concurrently up to a bounded fan-out; each file is a
//! single atomic unit committed through [`Store::apply_file_index`]. A
//! second `update()`/`rebuild()` while one is running returns
//! `IndexingInProgress`; auto-refresh silently no-ops instead.

use crate::config::EngineConfig;
use crate::discovery::FileDiscovery;
use crate::embed::CachedEmbedder;
use crate::error::{EngineError, Result};
use crate::extract::Extractor;
use crate::ident::{content_hash, edge_id, symbol_id};
use crate::merkle::MerkleCache;
use crate::repomap;
use crate::store::{FileIndexBatch, Store};
use crate::types::{
    Edge, EdgeKind, EdgeOrigin, FileRecord, FileStatus, RawEdge, Symbol, now_ms,
};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Characters of symbol text sent to the embedder.
const EMBED_TEXT_MAX_CHARS: usize = 4_000;

/// Optional producer of high-trust relationship edges (LSP/SCIP).
pub trait RelationshipSource: Send + Sync {
    fn edges_for_file(&self, path: &str, branch: &str) -> anyhow::Result<Vec<Edge>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Scanning,
    Hashing,
    Embedding,
    Storing,
    Complete,
}

#[derive(Debug, Clone)]
pub struct IndexProgress {
    pub phase: IndexPhase,
    pub current: usize,
    pub total: usize,
    pub message: Option<String>,
}

pub type ProgressFn = Arc<dyn Fn(IndexProgress) + Send + Sync>;

/// Summary returned by `update()` / `rebuild()`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct UpdateReport {
    pub files_indexed: usize,
    pub chunks_added: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IndexStatus {
    pub file_count: u64,
    pub chunk_count: u64,
    pub last_updated: Option<i64>,
    pub is_indexing: bool,
    pub db_size_bytes: u64,
}

enum FileOutcome {
    Indexed { symbols: usize },
    Skipped,
    Failed,
}

pub struct IndexManager {
    store: Arc<Store>,
    extractor: Arc<Extractor>,
    embedder: Arc<CachedEmbedder>,
    merkle: Mutex<MerkleCache>,
    discovery: FileDiscovery,
    config: EngineConfig,
    relationships: Option<Arc<dyn RelationshipSource>>,
    indexing: AtomicBool,
    last_refresh: Mutex<Option<Instant>>,
    progress: RwLock<Option<ProgressFn>>,
}

impl IndexManager {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<CachedEmbedder>,
        config: EngineConfig,
        relationships: Option<Arc<dyn RelationshipSource>>,
    ) -> Result<Self> {
        let discovery = FileDiscovery::from_config(&config)?;
        let extractor = Arc::new(Extractor::new(config.max_chunk_lines, config.chunk_overlap));
        let merkle = MerkleCache::load(&config.cache_file());
        Ok(Self {
            store,
            extractor,
            embedder,
            merkle: Mutex::new(merkle),
            discovery,
            config,
            relationships,
            indexing: AtomicBool::new(false),
            last_refresh: Mutex::new(None),
            progress: RwLock::new(None),
        })
    }

    pub fn set_progress(&self, callback: Option<ProgressFn>) {
        *self.progress.write() = callback;
    }

    pub fn is_indexing(&self) -> bool {
        self.indexing.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<CachedEmbedder> {
        &self.embedder
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Index everything that changed since the last update.
    pub async fn update(&self) -> Result<UpdateReport> {
        let _guard = self.begin()?;
        // A different embedding model invalidates every stored vector;
        // the only sane recovery is a full re-embed of the branch.
        let model_id = self.embedder.model_id();
        if self.store.needs_reembedding(&model_id)? {
            tracing::info!("embedding model changed to {model_id}; forcing full re-embed");
            self.store.truncate_branch(&self.config.branch)?;
            self.merkle.lock().clear();
            self.store
                .set_embedding_model(&model_id, self.embedder.dimension())?;
        }
        self.update_inner(None).await
    }

    /// Truncate the branch and the Merkle cache, then index from scratch.
    pub async fn rebuild(&self) -> Result<UpdateReport> {
        let _guard = self.begin()?;
        self.store.truncate_branch(&self.config.branch)?;
        {
            let mut merkle = self.merkle.lock();
            merkle.clear();
        }
        let _ = std::fs::remove_file(self.config.cache_file());
        self.update_inner(None).await
    }

    pub fn status(&self) -> Result<IndexStatus> {
        let store_status = self.store.status(&self.config.branch)?;
        Ok(IndexStatus {
            file_count: store_status.file_count,
            chunk_count: store_status.chunk_count,
            last_updated: store_status.last_updated,
            is_indexing: self.is_indexing(),
            db_size_bytes: store_status.db_size_bytes,
        })
    }

    /// Best-effort freshness check invoked by every read path. Bounded by
    /// a cooldown and a file-count ceiling; every failure is swallowed so
    /// queries proceed on stale data.
    pub async fn ensure_fresh(&self) {
        if !self.config.auto_refresh {
            return;
        }
        if self.is_indexing() {
            return;
        }
        {
            let mut last = self.last_refresh.lock();
            if let Some(stamp) = *last {
                let cooldown = std::time::Duration::from_millis(self.config.auto_refresh_cooldown_ms);
                if stamp.elapsed() < cooldown {
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        let guard = match self.begin() {
            Ok(guard) => guard,
            // Lost the race with an explicit update; nothing to do.
            Err(_) => return,
        };
        if let Err(e) = self.update_inner(Some(self.config.auto_refresh_max_files)).await {
            tracing::warn!("auto-refresh failed, serving stale data: {e}");
        }
        drop(guard);
    }

    fn begin(&self) -> Result<IndexingGuard<'_>> {
        if self
            .indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::IndexingInProgress);
        }
        Ok(IndexingGuard(&self.indexing))
    }

    async fn update_inner(&self, max_files: Option<usize>) -> Result<UpdateReport> {
        let started = Instant::now();
        let branch = self.config.branch.clone();

        self.report(IndexPhase::Scanning, 0, 0, None);
        let files = match self.discovery.discover(&self.config.root) {
            Ok(files) => files,
            Err(e) => {
                // Treated as "no changes", but surfaced so callers can warn.
                self.report(
                    IndexPhase::Scanning,
                    0,
                    0,
                    Some(format!("file enumeration failed: {e}")),
                );
                tracing::warn!("file enumeration failed: {e}");
                return Ok(UpdateReport::default());
            }
        };

        if let Some(ceiling) = max_files {
            if files.len() > ceiling {
                tracing::debug!(
                    "auto-refresh skipped: {} files exceeds ceiling {ceiling}",
                    files.len()
                );
                return Ok(UpdateReport::default());
            }
        }

        self.report(IndexPhase::Hashing, 0, files.len(), None);
        let (changed, deleted) = {
            let mut merkle = self.merkle.lock();
            let deleted = merkle.find_deleted(&files);
            let change_set = merkle.find_changed(&self.config.root, &files);
            let mut changed = change_set.added;
            changed.extend(change_set.modified);
            changed.sort();
            (changed, deleted)
        };

        let mut report = UpdateReport {
            files_deleted: deleted.len(),
            ..Default::default()
        };

        for path in &deleted {
            self.store.delete_file(path, &branch)?;
            self.merkle.lock().remove(path);
            tracing::debug!("removed deleted file {path}");
        }

        if changed.is_empty() && deleted.is_empty() {
            self.report(IndexPhase::Complete, 0, 0, None);
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let workspace: HashSet<String> = files.iter().cloned().collect();
        let total = changed.len();
        let pending: Vec<Pin<Box<dyn Future<Output = Result<FileOutcome>> + Send + '_>>> = changed
            .iter()
            .map(|path| Box::pin(self.index_one(path.clone(), &workspace)) as _)
            .collect();
        let outcomes: Vec<Result<FileOutcome>> = futures::stream::iter(pending)
            .buffer_unordered(self.config.parallelism)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome? {
                FileOutcome::Indexed { symbols } => {
                    report.files_indexed += 1;
                    report.chunks_added += symbols;
                }
                FileOutcome::Skipped => report.files_skipped += 1,
                FileOutcome::Failed => report.files_failed += 1,
            }
        }
        self.report(IndexPhase::Storing, total, total, None);

        // Derived data: failures here never fail the update.
        if let Err(e) = repomap::rebuild(&self.store, &branch) {
            tracing::warn!("repo map rebuild failed: {e}");
        }

        {
            let mut merkle = self.merkle.lock();
            let root = merkle.build_tree();
            if let Err(e) = merkle.save(&self.config.cache_file()) {
                tracing::warn!("failed to persist merkle cache: {e}");
            }
            tracing::debug!("merkle root {root}");
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.report(IndexPhase::Complete, total, total, None);
        tracing::info!(
            "indexed {} files ({} symbols, {} skipped, {} failed, {} deleted) in {}ms",
            report.files_indexed,
            report.chunks_added,
            report.files_skipped,
            report.files_failed,
            report.files_deleted,
            report.duration_ms
        );
        Ok(report)
    }

    async fn index_one(&self, rel: String, workspace: &HashSet<String>) -> Result<FileOutcome> {
        let branch = self.config.branch.clone();
        let abs = self.config.root.join(&rel);

        let text = match tokio::fs::read_to_string(&abs).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("failed to read {rel}: {e}");
                self.mark_error(&rel, &branch, &abs, &e.to_string())?;
                return Ok(FileOutcome::Failed);
            }
        };

        let file_hash = content_hash(&text);
        if let Some(existing) = self.store.files().by_path(&rel, &branch)? {
            if existing.file_hash == file_hash && existing.status == FileStatus::Indexed {
                return Ok(FileOutcome::Skipped);
            }
        }

        let now = now_ms();
        let (mtime_ms, size_bytes) = file_stat(&abs);
        let language = self.extractor.language_for(&rel).map(|l| l.to_string());
        let mut record = FileRecord {
            file_path: rel.clone(),
            branch: branch.clone(),
            file_hash: file_hash.clone(),
            mtime_ms,
            size_bytes,
            last_indexed: now,
            language: language.clone(),
            status: FileStatus::Pending,
            symbol_count: 0,
            importance_rank: None,
            error_message: None,
        };
        self.store.files().upsert(&record)?;
        self.store
            .files()
            .update_status(&rel, &branch, FileStatus::Indexing, None)?;

        let extraction = self.extractor.extract(&text, &rel);
        if let Some(message) = extraction.error {
            tracing::warn!("extraction failed for {rel}: {message}");
            self.store.clear_file_rows(&rel, &branch)?;
            self.store
                .files()
                .update_status(&rel, &branch, FileStatus::Error, Some(&message))?;
            return Ok(FileOutcome::Failed);
        }

        let revision = self.store.next_revision()?;
        let model_id = self.embedder.model_id();
        let mut symbols: Vec<Symbol> = extraction
            .symbols
            .iter()
            .map(|raw| Symbol {
                id: symbol_id(&raw.qualified_name, raw.signature.as_deref(), &extraction.language),
                name: raw.name.clone(),
                qualified_name: raw.qualified_name.clone(),
                kind: raw.kind,
                language: extraction.language.clone(),
                file_path: rel.clone(),
                start_line: raw.start_line,
                end_line: raw.end_line,
                content: raw.content.clone(),
                signature: raw.signature.clone(),
                docstring: raw.docstring.clone(),
                content_hash: content_hash(&raw.content),
                is_external: false,
                branch: branch.clone(),
                embedding_model_id: Some(model_id.clone()),
                updated_at: now,
                revision_id: revision,
            })
            .collect();

        let (mut edges, external_stubs) =
            self.resolve_edges(&rel, &extraction.language, &extraction.edges, &symbols, workspace, now)?;

        if let Some(source) = &self.relationships {
            match source.edges_for_file(&rel, &branch) {
                Ok(mut lsp_edges) => {
                    for edge in &mut lsp_edges {
                        edge.branch = branch.clone();
                        edge.updated_at = now;
                        edge.confidence = edge.confidence.clamp(0.0, 1.0);
                    }
                    edges.extend(lsp_edges);
                }
                Err(e) => tracing::warn!("relationship source failed for {rel}: {e}"),
            }
        }

        self.report(
            IndexPhase::Embedding,
            0,
            symbols.len(),
            Some(rel.clone()),
        );
        let texts: Vec<String> = symbols.iter().map(embed_text).collect();
        let vectors = match self.embedder.embed_batch(&texts) {
            Ok(vectors) => symbols
                .iter()
                .zip(vectors)
                .map(|(s, v)| (s.id.clone(), v))
                .collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!("embedding failed for {rel}: {e}");
                self.store.clear_file_rows(&rel, &branch)?;
                self.store
                    .files()
                    .update_status(&rel, &branch, FileStatus::Error, Some(&e.to_string()))?;
                return Ok(FileOutcome::Failed);
            }
        };

        let indexed_count = symbols.len();
        record.status = FileStatus::Indexed;
        record.symbol_count = indexed_count as u32;
        symbols.extend(external_stubs);

        self.store.apply_file_index(&FileIndexBatch {
            file: record,
            symbols,
            vectors,
            edges,
        })?;

        tracing::debug!("indexed {rel}: {indexed_count} symbols");
        Ok(FileOutcome::Indexed {
            symbols: indexed_count,
        })
    }

    /// Resolve raw (name-based) edges to symbol-id edges. Imports resolve
    /// to the target file's module symbol when the file is in the
    /// workspace, otherwise to an external stub. Calls resolve within the
    /// file first, then against the branch; unresolvable calls are
    /// dropped rather than fabricated.
    fn resolve_edges(
        &self,
        rel: &str,
        language: &str,
        raw_edges: &[RawEdge],
        symbols: &[Symbol],
        workspace: &HashSet<String>,
        now: i64,
    ) -> Result<(Vec<Edge>, Vec<Symbol>)> {
        let branch = &self.config.branch;
        let by_qualified: HashMap<&str, &Symbol> = symbols
            .iter()
            .map(|s| (s.qualified_name.as_str(), s))
            .collect();
        let mut by_name: HashMap<&str, Vec<&Symbol>> = HashMap::new();
        for symbol in symbols {
            by_name.entry(symbol.name.as_str()).or_default().push(symbol);
        }

        let mut edges = Vec::new();
        let mut stubs: Vec<Symbol> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for raw in raw_edges {
            let Some(source) = by_qualified.get(raw.source_name.as_str()) else {
                continue;
            };

            let target_id = match raw.kind {
                EdgeKind::Imports | EdgeKind::Reexports => {
                    match resolve_import(rel, &raw.target_name, workspace) {
                        Some(target_rel) => {
                            let target_language = self
                                .extractor
                                .language_for(&target_rel)
                                .unwrap_or("text");
                            Some(symbol_id(&target_rel, None, target_language))
                        }
                        None => {
                            let stub = external_stub(&raw.target_name, language, branch, now);
                            let id = stub.id.clone();
                            if seen.insert(id.clone()) {
                                stubs.push(stub);
                            }
                            Some(id)
                        }
                    }
                }
                _ => self.resolve_target_symbol(&raw.target_name, &by_name, branch)?,
            };

            let Some(target_id) = target_id else { continue };
            if target_id == source.id {
                continue;
            }

            // AST-inferred call edges never exceed 0.7 trust; lexical
            // import scanning is reliable and keeps its confidence.
            let confidence = if raw.kind == EdgeKind::Calls {
                raw.confidence.clamp(0.0, 0.7)
            } else {
                raw.confidence.clamp(0.0, 1.0)
            };
            let id = edge_id(&source.id, &target_id, raw.kind, EdgeOrigin::AstInference);
            edges.push(Edge {
                id,
                source_id: source.id.clone(),
                target_id,
                kind: raw.kind,
                confidence,
                origin: EdgeOrigin::AstInference,
                branch: branch.clone(),
                source_line: raw.line,
                target_line: None,
                updated_at: now,
                metadata: None,
            });
        }

        // Duplicate call sites collapse onto one edge id.
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges.dedup_by(|a, b| a.id == b.id);
        Ok((edges, stubs))
    }

    fn resolve_target_symbol(
        &self,
        name: &str,
        local: &HashMap<&str, Vec<&Symbol>>,
        branch: &str,
    ) -> Result<Option<String>> {
        if let Some(candidates) = local.get(name) {
            let mut ids: Vec<&str> = candidates.iter().map(|s| s.id.as_str()).collect();
            ids.sort();
            return Ok(ids.first().map(|id| id.to_string()));
        }
        let mut stored = self.store.symbols().by_name(name, branch)?;
        stored.retain(|s| !s.is_external);
        stored.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stored.first().map(|s| s.id.clone()))
    }

    fn mark_error(&self, rel: &str, branch: &str, abs: &Path, message: &str) -> Result<()> {
        self.store.clear_file_rows(rel, branch)?;
        let (mtime_ms, size_bytes) = file_stat(abs);
        self.store.files().upsert(&FileRecord {
            file_path: rel.to_string(),
            branch: branch.to_string(),
            file_hash: String::new(),
            mtime_ms,
            size_bytes,
            last_indexed: now_ms(),
            language: self.extractor.language_for(rel).map(|l| l.to_string()),
            status: FileStatus::Error,
            symbol_count: 0,
            importance_rank: None,
            error_message: Some(message.to_string()),
        })
    }

    fn report(&self, phase: IndexPhase, current: usize, total: usize, message: Option<String>) {
        if let Some(callback) = self.progress.read().as_ref() {
            callback(IndexProgress {
                phase,
                current,
                total,
                message,
            });
        }
    }
}

struct IndexingGuard<'a>(&'a AtomicBool);

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn file_stat(path: &Path) -> (i64, i64) {
    match std::fs::metadata(path) {
        Ok(metadata) => {
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            (mtime, metadata.len() as i64)
        }
        Err(_) => (0, 0),
    }
}

/// Text handed to the embedder: declaration head, docs, then body,
/// truncated to keep model inputs bounded.
fn embed_text(symbol: &Symbol) -> String {
    let mut text = String::new();
    if let Some(signature) = &symbol.signature {
        text.push_str(signature);
        text.push('\n');
    }
    if let Some(docstring) = &symbol.docstring {
        text.push_str(docstring);
        text.push('\n');
    }
    text.push_str(&symbol.content);
    text.chars().take(EMBED_TEXT_MAX_CHARS).collect()
}

fn external_stub(target: &str, language: &str, branch: &str, now: i64) -> Symbol {
    let name = target
        .rsplit(|c| c == '/' || c == '.' || c == ':')
        .find(|part| !part.is_empty())
        .unwrap_or(target)
        .to_string();
    Symbol {
        id: symbol_id(target, None, language),
        name,
        qualified_name: target.to_string(),
        kind: crate::types::SymbolKind::Module,
        language: language.to_string(),
        file_path: "<external>".to_string(),
        start_line: 0,
        end_line: 0,
        content: String::new(),
        signature: None,
        docstring: None,
        content_hash: content_hash(""),
        is_external: true,
        branch: branch.to_string(),
        embedding_model_id: None,
        updated_at: now,
        revision_id: 0,
    }
}

/// Map an import specifier to a workspace-relative path, when possible.
fn resolve_import(importer: &str, specifier: &str, workspace: &HashSet<String>) -> Option<String> {
    const EXTENSIONS: &[&str] = &[
        ".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".py", ".rs", ".go", ".java", ".c", ".cpp",
        ".cs",
    ];

    if specifier.starts_with("./") || specifier.starts_with("../") {
        let dir = Path::new(importer).parent().unwrap_or_else(|| Path::new(""));
        let joined = normalize(&dir.join(specifier));
        if workspace.contains(&joined) {
            return Some(joined);
        }
        for ext in EXTENSIONS {
            let candidate = format!("{joined}{ext}");
            if workspace.contains(&candidate) {
                return Some(candidate);
            }
        }
        for index in ["/index.ts", "/index.tsx", "/index.js", "/__init__.py"] {
            let candidate = format!("{joined}{index}");
            if workspace.contains(&candidate) {
                return Some(candidate);
            }
        }
        return None;
    }

    // Python-style dotted module paths.
    if !specifier.contains('/') && specifier.contains('.') && !specifier.contains("::") {
        let as_path = specifier.replace('.', "/");
        for ext in [".py", ""] {
            let candidate = format!("{as_path}{ext}");
            if workspace.contains(&candidate) {
                return Some(candidate);
            }
        }
    }

    None
}

fn normalize(path: &Path) -> String {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                parts.pop();
            }
            std::path::Component::CurDir => {}
            std::path::Component::Normal(part) => parts.push(part),
            _ => {}
        }
    }
    parts
        .iter()
        .map(|p| p.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
