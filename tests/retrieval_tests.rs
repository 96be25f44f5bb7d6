//! Retrieval pipeline tests over a hand-seeded store: graph expansion,
//! token budgets, and confidence grading.

mod common;

use codescope::embed::CachedEmbedder;
use codescope::ident::{content_hash, edge_id, symbol_id};
use codescope::retrieval::{Retrieval, SearchOptions};
use codescope::store::Store;
use codescope::types::*;
use codescope::{Embedder, EngineConfig, QueryConfidence};
use common::{MOCK_DIMENSION, MockEmbedder};
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Fixture {
    store: Arc<Store>,
    retrieval: Retrieval,
}

fn fixture() -> Fixture {
    let store = Arc::new(Store::open_in_memory(MOCK_DIMENSION, "mock-bag-of-tokens").unwrap());
    let embedder = Arc::new(CachedEmbedder::new(Arc::new(MockEmbedder), 100));
    let config = EngineConfig::new(".").with_embedding_dimension(MOCK_DIMENSION);
    let retrieval = Retrieval::new(store.clone(), embedder, config);
    Fixture { store, retrieval }
}

fn seed_symbol(store: &Store, name: &str, file: &str) -> Symbol {
    let qualified_name = format!("{file}:{name}");
    let signature = format!("function {name}()");
    let symbol = Symbol {
        id: symbol_id(&qualified_name, Some(&signature), "typescript"),
        name: name.to_string(),
        qualified_name,
        kind: SymbolKind::Function,
        language: "typescript".to_string(),
        file_path: file.to_string(),
        start_line: 1,
        end_line: 4,
        content: format!("function {name}() {{ /* body of {name} */ }}"),
        signature: Some(signature),
        docstring: None,
        content_hash: content_hash(name),
        is_external: false,
        branch: "main".to_string(),
        embedding_model_id: Some("mock-bag-of-tokens".to_string()),
        updated_at: now_ms(),
        revision_id: 1,
    };
    store.symbols().upsert(&symbol).unwrap();
    store.keywords().index(&symbol).unwrap();
    symbol
}

fn seed_call(store: &Store, source: &Symbol, target: &Symbol, confidence: f32) {
    let edge = Edge {
        id: edge_id(&source.id, &target.id, EdgeKind::Calls, EdgeOrigin::Lsp),
        source_id: source.id.clone(),
        target_id: target.id.clone(),
        kind: EdgeKind::Calls,
        confidence,
        origin: EdgeOrigin::Lsp,
        branch: "main".to_string(),
        source_line: Some(2),
        target_line: None,
        updated_at: now_ms(),
        metadata: None,
    };
    store.edges().upsert(&edge).unwrap();
}

#[tokio::test]
async fn graph_expansion_walks_callers_and_callees() {
    let f = fixture();
    let a = seed_symbol(&f.store, "alphaCaller", "g.ts");
    let b = seed_symbol(&f.store, "betaBridge", "g.ts");
    let c = seed_symbol(&f.store, "gammaSeed", "g.ts");
    seed_call(&f.store, &a, &b, 0.9);
    seed_call(&f.store, &b, &c, 0.9);

    let result = f
        .retrieval
        .search(&SearchOptions {
            query_text: Some("gammaSeed".to_string()),
            graph_depth: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: Vec<&str> = result.symbols.iter().map(|s| s.id.as_str()).collect();
    assert!(ids.contains(&c.id.as_str()));
    assert!(ids.contains(&b.id.as_str()));
    assert!(ids.contains(&a.id.as_str()));
    assert_eq!(result.metadata.graph_expansions, 2);
    assert_eq!(result.edges.len(), 2);
}

#[tokio::test]
async fn confidence_threshold_prunes_expansion() {
    let f = fixture();
    let a = seed_symbol(&f.store, "alphaCaller", "g.ts");
    let b = seed_symbol(&f.store, "betaBridge", "g.ts");
    let c = seed_symbol(&f.store, "gammaSeed", "g.ts");
    seed_call(&f.store, &a, &b, 0.9);
    seed_call(&f.store, &b, &c, 0.9);

    let result = f
        .retrieval
        .search(&SearchOptions {
            query_text: Some("gammaSeed".to_string()),
            graph_depth: Some(2),
            confidence_threshold: Some(0.95),
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: Vec<&str> = result.symbols.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec![c.id.as_str()]);
    assert!(result.edges.is_empty());
    assert_eq!(result.metadata.graph_expansions, 0);
}

#[tokio::test]
async fn zero_depth_returns_seed_set_untraversed() {
    let f = fixture();
    let a = seed_symbol(&f.store, "alphaCaller", "g.ts");
    let c = seed_symbol(&f.store, "gammaSeed", "g.ts");
    seed_call(&f.store, &a, &c, 0.9);

    let result = f
        .retrieval
        .search(&SearchOptions {
            query_text: Some("gammaSeed".to_string()),
            graph_depth: Some(0),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.symbols.len(), 1);
    assert!(result.edges.is_empty());
}

#[tokio::test]
async fn fan_out_is_bounded_and_confidence_sorted() {
    let f = fixture();
    let seed = seed_symbol(&f.store, "hubSeed", "h.ts");
    let mut callers = Vec::new();
    for i in 0..15 {
        let caller = seed_symbol(&f.store, &format!("caller{i:02}"), "h.ts");
        // Spread confidences so truncation keeps the strongest.
        seed_call(&f.store, &caller, &seed, 0.5 + (i as f32) * 0.03);
        callers.push(caller);
    }

    let result = f
        .retrieval
        .search(&SearchOptions {
            query_text: Some("hubSeed".to_string()),
            graph_depth: Some(1),
            max_fan_out: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.metadata.graph_expansions, 5);
    // The kept edges are the five most confident ones.
    let min_kept = result
        .edges
        .iter()
        .map(|e| e.confidence)
        .fold(f32::INFINITY, f32::min);
    assert!(min_kept >= 0.5 + 9.0 * 0.03);
}

#[tokio::test]
async fn symbol_kind_filter_prunes_expansion_nodes() {
    let f = fixture();
    let seed = seed_symbol(&f.store, "filterSeed", "k.ts");
    let mut class_symbol = seed_symbol(&f.store, "HelperClass", "k.ts");
    class_symbol.kind = SymbolKind::Class;
    f.store.symbols().upsert(&class_symbol).unwrap();
    seed_call(&f.store, &class_symbol, &seed, 0.9);

    let result = f
        .retrieval
        .search(&SearchOptions {
            query_text: Some("filterSeed".to_string()),
            graph_depth: Some(1),
            symbol_kinds: Some(vec![SymbolKind::Function]),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(result.symbols.iter().all(|s| s.kind == SymbolKind::Function));
    assert_eq!(result.metadata.graph_expansions, 0);
}

#[tokio::test]
async fn tiny_budget_skips_blocks_but_returns_symbols() {
    let f = fixture();
    let mut symbol = seed_symbol(&f.store, "bulkyFunction", "t.ts");
    symbol.content = "x".repeat(5_000);
    f.store.symbols().upsert(&symbol).unwrap();
    f.store.keywords().index(&symbol).unwrap();

    let result = f
        .retrieval
        .search(&SearchOptions {
            query_text: Some("bulkyFunction".to_string()),
            max_tokens: Some(50),
            ..Default::default()
        })
        .await
        .unwrap();

    // Below the minimum truncation remainder nothing is packed.
    assert_eq!(result.token_count, 0);
    assert!(result.context.is_empty());
    assert!(!result.symbols.is_empty());
}

#[tokio::test]
async fn budget_truncation_keeps_within_max_tokens() {
    let f = fixture();
    let mut symbol = seed_symbol(&f.store, "mediumFunction", "t.ts");
    symbol.content = "y".repeat(4_000);
    f.store.symbols().upsert(&symbol).unwrap();
    f.store.keywords().index(&symbol).unwrap();

    let result = f
        .retrieval
        .search(&SearchOptions {
            query_text: Some("mediumFunction".to_string()),
            max_tokens: Some(300),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(result.token_count > 0);
    assert!(result.token_count <= 300);
}

#[tokio::test]
async fn keyword_only_search_downgrades_confidence() {
    let f = fixture();
    seed_symbol(&f.store, "onlyKeyword", "w.ts");

    let result = f
        .retrieval
        .search(&SearchOptions {
            query_text: Some("onlyKeyword".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(result.metadata.keyword_hits >= 1);
    assert_eq!(result.metadata.vector_hits, 0);
    assert_ne!(result.metadata.confidence, QueryConfidence::High);
}

#[tokio::test]
async fn vector_only_search_works_without_query_text() {
    let f = fixture();
    let symbol = seed_symbol(&f.store, "vectorOnly", "v.ts");
    f.store
        .vectors()
        .upsert(&symbol.id, "main", &MockEmbedder.embed("vectorOnly body").unwrap())
        .unwrap();

    let result = f
        .retrieval
        .search(&SearchOptions {
            embedding: Some(MockEmbedder.embed("vectorOnly").unwrap()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(result.metadata.vector_hits >= 1);
    assert_eq!(result.metadata.keyword_hits, 0);
    assert_eq!(result.symbols[0].id, symbol.id);
}
