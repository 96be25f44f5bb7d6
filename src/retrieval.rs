//! Hybrid retrieval: vector + keyword search fused by rank, graph
//! expansion over call edges, and token-budgeted context packing.
//!
//! Rank-based fusion (RRF) makes the two retrieval methods' scoring
//! scales irrelevant; ties break by symbol id so an unchanged store
//! always returns the same ordering.

use crate::config::{EngineConfig, MAX_GRAPH_DEPTH};
use crate::embed::CachedEmbedder;
use crate::error::Result;
use crate::store::Store;
use crate::types::{Edge, Symbol, SymbolKind};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

/// Per-source candidate cap.
pub const RETRIEVAL_LIMIT: usize = 20;
/// Seeds fed into graph expansion.
const EXPANSION_SEEDS: usize = 5;
/// Minimum remaining budget worth truncating a block into.
const MIN_TRUNCATION_TOKENS: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Dense query vector; enables the vector source.
    pub embedding: Option<Vec<f32>>,
    /// Keyword query; enables the FTS source.
    pub query_text: Option<String>,
    pub branch: Option<String>,
    pub max_tokens: Option<usize>,
    pub graph_depth: Option<u32>,
    pub max_fan_out: Option<usize>,
    pub confidence_threshold: Option<f32>,
    pub symbol_kinds: Option<Vec<SymbolKind>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QueryMetadata {
    pub query_time_ms: u64,
    pub vector_hits: usize,
    pub keyword_hits: usize,
    pub graph_expansions: usize,
    pub confidence: QueryConfidence,
    /// Set when the keyword query failed FTS parsing and was ignored.
    pub keyword_syntax_error: bool,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub symbols: Vec<Symbol>,
    pub edges: Vec<Edge>,
    pub context: String,
    pub token_count: usize,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone)]
pub struct SimilarHit {
    pub symbol: Symbol,
    pub similarity: f32,
}

/// What to find similar code for.
#[derive(Debug, Clone)]
pub enum SimilarTarget {
    /// A free-form snippet, embedded on the fly.
    Code(String),
    /// An indexed location; reuses the stored vector of the symbol at
    /// that line.
    Location { file_path: String, line: u32 },
}

pub struct Retrieval {
    store: Arc<Store>,
    embedder: Arc<CachedEmbedder>,
    config: EngineConfig,
}

impl Retrieval {
    pub fn new(store: Arc<Store>, embedder: Arc<CachedEmbedder>, config: EngineConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub async fn search(&self, options: &SearchOptions) -> Result<QueryResult> {
        let started = Instant::now();
        let branch = options
            .branch
            .clone()
            .unwrap_or_else(|| self.config.branch.clone());
        let limit = options.limit.unwrap_or(RETRIEVAL_LIMIT);

        // Step 1: both sources run concurrently; either may be absent.
        let vector_task = {
            let store = self.store.clone();
            let branch = branch.clone();
            let embedding = options.embedding.clone();
            tokio::task::spawn_blocking(move || match embedding {
                Some(embedding) => store.vectors().search(&embedding, limit, &branch),
                None => Ok(Vec::new()),
            })
        };
        let keyword_task = {
            let store = self.store.clone();
            let branch = branch.clone();
            let query_text = options.query_text.clone();
            tokio::task::spawn_blocking(move || match query_text {
                Some(text) => store.keywords().search(&text, &branch, limit),
                None => Ok(Default::default()),
            })
        };

        let (vector_hits, keyword_outcome) = tokio::join!(vector_task, keyword_task);
        let vector_hits = vector_hits.expect("vector search task panicked")?;
        let keyword_outcome = keyword_outcome.expect("keyword search task panicked")?;

        // Hydrate every candidate once; later steps reuse the map.
        let mut candidate_ids: Vec<String> =
            vector_hits.iter().map(|h| h.symbol_id.clone()).collect();
        candidate_ids.extend(keyword_outcome.hits.iter().map(|h| h.symbol_id.clone()));
        let mut hydrated: HashMap<String, Symbol> = HashMap::new();
        for id in &candidate_ids {
            if !hydrated.contains_key(id) {
                if let Some(symbol) = self.store.symbols().by_id(id, &branch)? {
                    hydrated.insert(id.clone(), symbol);
                }
            }
        }

        // Step 3 (before fusion): exact-name matches get their keyword
        // score boosted, which reorders the keyword list only.
        let keyword_ranked = boost_keyword_hits(
            &keyword_outcome.hits,
            options.query_text.as_deref(),
            &hydrated,
            self.config.exact_name_boost,
        );
        let vector_ranked: Vec<String> =
            vector_hits.iter().map(|h| h.symbol_id.clone()).collect();

        // Step 2: reciprocal rank fusion, deterministic tie-break.
        let fused = rrf_fuse(&[vector_ranked, keyword_ranked], self.config.rrf_k);

        // Step 4: resolve fused ids to full symbols, dropping dangling ids.
        let mut symbols: Vec<Symbol> = Vec::new();
        let mut included: HashSet<String> = HashSet::new();
        for (id, _) in &fused {
            if let Some(symbol) = hydrated.get(id) {
                if matches_kind_filter(symbol, options.symbol_kinds.as_deref()) {
                    symbols.push(symbol.clone());
                    included.insert(id.clone());
                }
            }
        }

        // Step 5: expand the call graph around the strongest seeds.
        let depth = options
            .graph_depth
            .unwrap_or(self.config.graph_depth)
            .min(MAX_GRAPH_DEPTH);
        let expansion = self.expand_graph(
            symbols.iter().take(EXPANSION_SEEDS),
            &branch,
            depth,
            options.max_fan_out.unwrap_or(self.config.max_fan_out),
            options
                .confidence_threshold
                .unwrap_or(self.config.confidence_threshold),
            options.symbol_kinds.as_deref(),
        )?;

        let graph_expansions = expansion
            .symbols
            .iter()
            .filter(|s| !included.contains(&s.id))
            .count();
        for symbol in expansion.symbols {
            if included.insert(symbol.id.clone()) {
                symbols.push(symbol);
            }
        }

        // Step 6: pack into the token budget, fused order first.
        let max_tokens = options.max_tokens.unwrap_or(self.config.max_tokens);
        let (context, token_count) = pack_context(&symbols, max_tokens);

        let vector_count = vector_hits.len();
        let keyword_count = keyword_outcome.hits.len();
        Ok(QueryResult {
            symbols,
            edges: expansion.edges,
            context,
            token_count,
            metadata: QueryMetadata {
                query_time_ms: started.elapsed().as_millis() as u64,
                vector_hits: vector_count,
                keyword_hits: keyword_count,
                graph_expansions,
                confidence: grade_confidence(vector_count, keyword_count),
                keyword_syntax_error: keyword_outcome.syntax_error,
            },
        })
    }

    /// Vector-only similarity search around a snippet or a location.
    pub async fn find_similar(
        &self,
        target: &SimilarTarget,
        limit: usize,
        branch: Option<&str>,
    ) -> Result<Vec<SimilarHit>> {
        let branch = branch.unwrap_or(&self.config.branch).to_string();

        let (query_vector, exclude_id) = match target {
            SimilarTarget::Code(code) => (self.embedder.embed(code)?, None),
            SimilarTarget::Location { file_path, line } => {
                let in_file = self.store.symbols().by_file(file_path, &branch)?;
                let Some(symbol) = in_file
                    .iter()
                    .filter(|s| s.start_line <= *line && *line <= s.end_line)
                    // The innermost enclosing declaration wins.
                    .min_by_key(|s| s.end_line - s.start_line)
                else {
                    return Ok(Vec::new());
                };
                match self.store.vectors().get(&symbol.id, &branch)? {
                    Some(vector) => (vector, Some(symbol.id.clone())),
                    None => return Ok(Vec::new()),
                }
            }
        };

        // One extra hit absorbs the excluded seed itself.
        let hits = self
            .store
            .vectors()
            .search(&query_vector, limit + 1, &branch)?;
        let mut results = Vec::new();
        for hit in hits {
            if Some(&hit.symbol_id) == exclude_id.as_ref() {
                continue;
            }
            if let Some(symbol) = self.store.symbols().by_id(&hit.symbol_id, &branch)? {
                results.push(SimilarHit {
                    symbol,
                    similarity: hit.similarity,
                });
            }
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    fn expand_graph<'a>(
        &self,
        seeds: impl Iterator<Item = &'a Symbol>,
        branch: &str,
        depth: u32,
        max_fan_out: usize,
        confidence_threshold: f32,
        kind_filter: Option<&[SymbolKind]>,
    ) -> Result<Expansion> {
        let mut expansion = Expansion::default();
        if depth == 0 {
            return Ok(expansion);
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        for seed in seeds {
            if visited.insert(seed.id.clone()) {
                queue.push_back((seed.id.clone(), 0));
            }
        }

        let mut seen_edges: HashSet<String> = HashSet::new();
        while let Some((id, at_depth)) = queue.pop_front() {
            if at_depth >= depth {
                continue;
            }

            // Callers and callees, filtered, best-confidence first,
            // truncated to the fan-out cap.
            let mut neighbors = self.store.edges().callers(&id, branch)?;
            neighbors.extend(self.store.edges().callees(&id, branch)?);
            neighbors.retain(|e| e.confidence >= confidence_threshold);
            neighbors.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            neighbors.truncate(max_fan_out);

            for edge in neighbors {
                let other = if edge.target_id == id {
                    edge.source_id.clone()
                } else {
                    edge.target_id.clone()
                };

                let Some(symbol) = self.store.symbols().by_id(&other, branch)? else {
                    continue;
                };
                if !matches_kind_filter(&symbol, kind_filter) {
                    continue;
                }

                if seen_edges.insert(edge.id.clone()) {
                    expansion.edges.push(edge);
                }
                if visited.insert(other.clone()) {
                    expansion.symbols.push(symbol);
                    queue.push_back((other, at_depth + 1));
                }
            }
        }

        Ok(expansion)
    }
}

#[derive(Debug, Default)]
struct Expansion {
    symbols: Vec<Symbol>,
    edges: Vec<Edge>,
}

/// Reorder keyword hits after applying the exact-name boost. BM25 ranks
/// are lower-is-better; they become positive scores before boosting.
fn boost_keyword_hits(
    hits: &[crate::store::KeywordHit],
    query_text: Option<&str>,
    hydrated: &HashMap<String, Symbol>,
    exact_name_boost: f32,
) -> Vec<String> {
    let query = query_text.map(str::trim).unwrap_or_default();
    let mut scored: Vec<(String, f64)> = hits
        .iter()
        .map(|hit| {
            let mut score = -hit.rank;
            if !query.is_empty() {
                if let Some(symbol) = hydrated.get(&hit.symbol_id) {
                    if symbol.name == query {
                        score *= exact_name_boost as f64;
                    }
                }
            }
            (hit.symbol_id.clone(), score)
        })
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.into_iter().map(|(id, _)| id).collect()
}

/// Reciprocal rank fusion over any number of ranked id lists.
fn rrf_fuse(lists: &[Vec<String>], k: f32) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (k as f64 + rank as f64 + 1.0);
        }
    }
    let mut fused: Vec<(String, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

fn matches_kind_filter(symbol: &Symbol, filter: Option<&[SymbolKind]>) -> bool {
    match filter {
        Some(kinds) => kinds.contains(&symbol.kind),
        None => true,
    }
}

fn grade_confidence(vector_hits: usize, keyword_hits: usize) -> QueryConfidence {
    if vector_hits >= 1 && keyword_hits >= 1 {
        QueryConfidence::High
    } else if vector_hits + keyword_hits >= 5 {
        QueryConfidence::Medium
    } else {
        QueryConfidence::Low
    }
}

/// Tokens ≈ ⌈chars / 4⌉.
fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

fn format_block(symbol: &Symbol) -> String {
    let mut block = format!(
        "### {} {}\n{}:{}-{}\n",
        symbol.kind.as_str(),
        symbol.qualified_name,
        symbol.file_path,
        symbol.start_line,
        symbol.end_line
    );
    if let Some(signature) = &symbol.signature {
        block.push_str(signature);
        block.push('\n');
    }
    if let Some(docstring) = &symbol.docstring {
        block.push_str(docstring);
        block.push('\n');
    }
    block.push_str(&format!("```{}\n{}\n```\n\n", symbol.language, symbol.content));
    block
}

/// Append symbol blocks until the budget runs out. A block that does not
/// fit is truncated into the remainder when at least
/// `MIN_TRUNCATION_TOKENS` are left; everything after it is skipped.
fn pack_context(symbols: &[Symbol], max_tokens: usize) -> (String, usize) {
    let mut context = String::new();
    let mut used = 0usize;

    for symbol in symbols {
        let block = format_block(symbol);
        let cost = estimate_tokens(&block);

        if used + cost <= max_tokens {
            context.push_str(&block);
            used += cost;
            continue;
        }

        let remaining = max_tokens.saturating_sub(used);
        if remaining >= MIN_TRUNCATION_TOKENS {
            let keep_chars = remaining * 4;
            let truncated: String = block.chars().take(keep_chars).collect();
            context.push_str(&truncated);
            used += estimate_tokens(&truncated);
        }
        break;
    }

    (context, used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_ms;

    fn symbol(id: &str, name: &str) -> Symbol {
        Symbol {
            id: id.to_string(),
            name: name.to_string(),
            qualified_name: format!("a.ts:{name}"),
            kind: SymbolKind::Function,
            language: "typescript".to_string(),
            file_path: "a.ts".to_string(),
            start_line: 1,
            end_line: 3,
            content: format!("function {name}() {{}}"),
            signature: None,
            docstring: None,
            content_hash: "0".repeat(16),
            is_external: false,
            branch: "main".to_string(),
            embedding_model_id: None,
            updated_at: now_ms(),
            revision_id: 1,
        }
    }

    #[test]
    fn rrf_rewards_presence_in_both_lists() {
        let fused = rrf_fuse(
            &[
                vec!["a".into(), "b".into(), "c".into()],
                vec!["b".into(), "d".into()],
            ],
            60.0,
        );
        assert_eq!(fused[0].0, "b");
    }

    #[test]
    fn rrf_ties_break_by_id() {
        let fused = rrf_fuse(&[vec!["z".into()], vec!["a".into()]], 60.0);
        // Equal scores; "a" sorts first.
        assert_eq!(fused[0].0, "a");
        assert_eq!(fused[1].0, "z");
    }

    #[test]
    fn exact_name_boost_reorders_keyword_hits() {
        let hits = vec![
            crate::store::KeywordHit {
                symbol_id: "s1".into(),
                rank: -2.0,
            },
            crate::store::KeywordHit {
                symbol_id: "s2".into(),
                rank: -1.5,
            },
        ];
        let mut hydrated = HashMap::new();
        hydrated.insert("s1".to_string(), symbol("s1", "makeLogger"));
        hydrated.insert("s2".to_string(), symbol("s2", "createLogger"));

        let ranked = boost_keyword_hits(&hits, Some("createLogger"), &hydrated, 2.0);
        assert_eq!(ranked[0], "s2");
    }

    #[test]
    fn confidence_grading_matches_contract() {
        assert_eq!(grade_confidence(1, 1), QueryConfidence::High);
        assert_eq!(grade_confidence(5, 0), QueryConfidence::Medium);
        assert_eq!(grade_confidence(0, 2), QueryConfidence::Low);
        assert_eq!(grade_confidence(0, 0), QueryConfidence::Low);
    }

    #[test]
    fn packing_truncates_when_budget_allows() {
        let mut big = symbol("s1", "bigFunction");
        big.content = "x".repeat(4_000);
        let (context, used) = pack_context(&[big], 200);
        assert!(used <= 200);
        assert!(!context.is_empty());
    }

    #[test]
    fn packing_skips_when_remainder_is_tiny() {
        let first = symbol("s1", "first");
        let mut big = symbol("s2", "second");
        big.content = "y".repeat(4_000);
        let first_cost = estimate_tokens(&format_block(&first));
        // Leave fewer than MIN_TRUNCATION_TOKENS after the first block.
        let budget = first_cost + 10;
        let (context, used) = pack_context(&[first, big], budget);
        assert!(context.contains("first"));
        assert!(!context.contains("yyyy"));
        assert!(used <= budget);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
