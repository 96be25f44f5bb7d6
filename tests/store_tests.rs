//! Store-level contract tests: idempotent upserts, branch isolation,
//! FTS behavior, vector search, and the atomic per-file batch.

use codescope::ident::{content_hash, edge_id, symbol_id};
use codescope::store::{FileIndexBatch, Store};
use codescope::types::*;
use pretty_assertions::assert_eq;

fn make_symbol(name: &str, file: &str, branch: &str) -> Symbol {
    let qualified_name = format!("{file}:{name}");
    let signature = format!("function {name}()");
    Symbol {
        id: symbol_id(&qualified_name, Some(&signature), "typescript"),
        name: name.to_string(),
        qualified_name,
        kind: SymbolKind::Function,
        language: "typescript".to_string(),
        file_path: file.to_string(),
        start_line: 1,
        end_line: 5,
        content: format!("function {name}() {{ return 42 }}"),
        signature: Some(signature),
        docstring: None,
        content_hash: content_hash(name),
        is_external: false,
        branch: branch.to_string(),
        embedding_model_id: Some("mock".to_string()),
        updated_at: now_ms(),
        revision_id: 1,
    }
}

fn make_edge(source: &Symbol, target: &Symbol, kind: EdgeKind, confidence: f32) -> Edge {
    Edge {
        id: edge_id(&source.id, &target.id, kind, EdgeOrigin::AstInference),
        source_id: source.id.clone(),
        target_id: target.id.clone(),
        kind,
        confidence,
        origin: EdgeOrigin::AstInference,
        branch: source.branch.clone(),
        source_line: Some(2),
        target_line: None,
        updated_at: now_ms(),
        metadata: None,
    }
}

#[test]
fn upsert_is_idempotent() {
    let store = Store::open_in_memory(8, "mock").unwrap();
    let symbol = make_symbol("alpha", "a.ts", "main");

    store.symbols().upsert(&symbol).unwrap();
    store.symbols().upsert(&symbol).unwrap();

    assert_eq!(store.symbols().count(Some("main")).unwrap(), 1);
    let loaded = store.symbols().by_id(&symbol.id, "main").unwrap().unwrap();
    assert_eq!(loaded, symbol);
}

#[test]
fn branches_are_isolated() {
    let store = Store::open_in_memory(8, "mock").unwrap();
    let main = make_symbol("shared", "a.ts", "main");
    let feature = make_symbol("shared", "a.ts", "feature");

    store.symbols().upsert(&main).unwrap();
    store.symbols().upsert(&feature).unwrap();

    // Identical identity tuple means identical id across branches.
    assert_eq!(main.id, feature.id);
    assert_eq!(store.symbols().by_name("shared", "main").unwrap().len(), 1);
    assert_eq!(store.symbols().count(None).unwrap(), 2);

    store.symbols().delete_by_branch("feature").unwrap();
    assert_eq!(store.symbols().count(Some("main")).unwrap(), 1);
    assert_eq!(store.symbols().count(Some("feature")).unwrap(), 0);
}

#[test]
fn lookups_by_file_name_kind() {
    let store = Store::open_in_memory(8, "mock").unwrap();
    let a = make_symbol("alpha", "a.ts", "main");
    let mut b = make_symbol("beta", "a.ts", "main");
    b.kind = SymbolKind::Class;
    let c = make_symbol("gamma", "b.ts", "main");
    store.symbols().upsert_many(&[a.clone(), b.clone(), c]).unwrap();

    assert_eq!(store.symbols().by_file("a.ts", "main").unwrap().len(), 2);
    assert_eq!(store.symbols().by_name("beta", "main").unwrap()[0].id, b.id);
    assert_eq!(
        store.symbols().by_kind(SymbolKind::Class, "main").unwrap().len(),
        1
    );
    assert_eq!(
        store
            .symbols()
            .by_qualified_name("a.ts:alpha", "main")
            .unwrap()
            .unwrap()
            .id,
        a.id
    );
}

#[test]
fn callers_and_callees_are_indexed_lookups() {
    let store = Store::open_in_memory(8, "mock").unwrap();
    let a = make_symbol("a", "x.ts", "main");
    let b = make_symbol("b", "x.ts", "main");
    let c = make_symbol("c", "x.ts", "main");
    store.symbols().upsert_many(&[a.clone(), b.clone(), c.clone()]).unwrap();
    store
        .edges()
        .upsert_many(&[
            make_edge(&a, &b, EdgeKind::Calls, 0.7),
            make_edge(&b, &c, EdgeKind::Calls, 0.6),
        ])
        .unwrap();

    let callers_of_b = store.edges().callers(&b.id, "main").unwrap();
    assert_eq!(callers_of_b.len(), 1);
    assert_eq!(callers_of_b[0].source_id, a.id);

    let callees_of_b = store.edges().callees(&b.id, "main").unwrap();
    assert_eq!(callees_of_b.len(), 1);
    assert_eq!(callees_of_b[0].target_id, c.id);

    // Branch filters never cross partitions.
    assert!(store.edges().callers(&b.id, "feature").unwrap().is_empty());
}

#[test]
fn fts_search_ranks_and_catches_syntax_errors() {
    let store = Store::open_in_memory(8, "mock").unwrap();
    let logger = make_symbol("createLogger", "log.ts", "main");
    let manager = make_symbol("LogManager", "log.ts", "main");
    store.symbols().upsert(&logger).unwrap();
    store.symbols().upsert(&manager).unwrap();
    store.keywords().index(&logger).unwrap();
    store.keywords().index(&manager).unwrap();

    let outcome = store.keywords().search("Logger", "main", 10).unwrap();
    assert!(!outcome.syntax_error);
    assert!(!outcome.hits.is_empty());
    // Lower rank is a better match, and results arrive sorted.
    for pair in outcome.hits.windows(2) {
        assert!(pair[0].rank <= pair[1].rank);
    }

    let malformed = store.keywords().search("\"unbalanced", "main", 10).unwrap();
    assert!(malformed.syntax_error);
    assert!(malformed.hits.is_empty());

    let empty = store.keywords().search("   ", "main", 10).unwrap();
    assert!(!empty.syntax_error);
    assert!(empty.hits.is_empty());
}

#[test]
fn vector_search_orders_by_cosine_distance() {
    let store = Store::open_in_memory(4, "mock").unwrap();
    let a = make_symbol("a", "v.ts", "main");
    let b = make_symbol("b", "v.ts", "main");
    store.symbols().upsert(&a).unwrap();
    store.symbols().upsert(&b).unwrap();
    store.vectors().upsert(&a.id, "main", &[1.0, 0.0, 0.0, 0.0]).unwrap();
    store.vectors().upsert(&b.id, "main", &[0.0, 1.0, 0.0, 0.0]).unwrap();

    let hits = store.vectors().search(&[0.9, 0.1, 0.0, 0.0], 2, "main").unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].symbol_id, a.id);
    assert!(hits[0].distance < hits[1].distance);
    assert!((hits[0].similarity - (1.0 - hits[0].distance)).abs() < 1e-6);
}

#[test]
fn vector_dimension_mismatch_is_an_error() {
    let store = Store::open_in_memory(4, "mock").unwrap();
    let a = make_symbol("a", "v.ts", "main");
    store.symbols().upsert(&a).unwrap();
    let err = store.vectors().upsert(&a.id, "main", &[1.0, 0.0]).unwrap_err();
    assert!(matches!(
        err,
        codescope::EngineError::SerializeEmbedding { expected: 4, actual: 2, .. }
    ));
}

#[test]
fn apply_file_index_is_atomic_and_replaces_stale_rows() {
    let store = Store::open_in_memory(8, "mock").unwrap();
    let a = make_symbol("first", "f.ts", "main");
    let b = make_symbol("second", "f.ts", "main");
    let now = now_ms();

    let file = FileRecord {
        file_path: "f.ts".to_string(),
        branch: "main".to_string(),
        file_hash: content_hash("v1"),
        mtime_ms: now,
        size_bytes: 100,
        last_indexed: now,
        language: Some("typescript".to_string()),
        status: FileStatus::Indexed,
        symbol_count: 2,
        importance_rank: None,
        error_message: None,
    };
    store
        .apply_file_index(&FileIndexBatch {
            file: file.clone(),
            symbols: vec![a.clone(), b.clone()],
            vectors: vec![
                (a.id.clone(), vec![1.0; 8]),
                (b.id.clone(), vec![0.5; 8]),
            ],
            edges: vec![make_edge(&a, &b, EdgeKind::Calls, 0.7)],
        })
        .unwrap();

    assert_eq!(store.symbols().count(Some("main")).unwrap(), 2);
    assert_eq!(store.vectors().count("main").unwrap(), 2);
    assert_eq!(store.keywords().count().unwrap(), 2);
    assert_eq!(store.edges().count(Some("main")).unwrap(), 1);

    // Re-index with only one surviving symbol: stale rows must vanish and
    // no duplicate vector/FTS rows may appear.
    let mut second = file.clone();
    second.symbol_count = 1;
    store
        .apply_file_index(&FileIndexBatch {
            file: second,
            symbols: vec![a.clone()],
            vectors: vec![(a.id.clone(), vec![1.0; 8])],
            edges: vec![],
        })
        .unwrap();

    assert_eq!(store.symbols().count(Some("main")).unwrap(), 1);
    assert_eq!(store.vectors().count("main").unwrap(), 1);
    assert_eq!(store.keywords().count().unwrap(), 1);
    assert_eq!(store.edges().count(Some("main")).unwrap(), 0);
}

#[test]
fn delete_file_removes_every_materialized_row() {
    let store = Store::open_in_memory(8, "mock").unwrap();
    let a = make_symbol("only", "gone.ts", "main");
    let now = now_ms();
    store
        .apply_file_index(&FileIndexBatch {
            file: FileRecord {
                file_path: "gone.ts".to_string(),
                branch: "main".to_string(),
                file_hash: content_hash("x"),
                mtime_ms: now,
                size_bytes: 10,
                last_indexed: now,
                language: Some("typescript".to_string()),
                status: FileStatus::Indexed,
                symbol_count: 1,
                importance_rank: None,
                error_message: None,
            },
            symbols: vec![a.clone()],
            vectors: vec![(a.id.clone(), vec![1.0; 8])],
            edges: vec![],
        })
        .unwrap();

    store.delete_file("gone.ts", "main").unwrap();
    assert_eq!(store.symbols().count(Some("main")).unwrap(), 0);
    assert_eq!(store.vectors().count("main").unwrap(), 0);
    assert_eq!(store.keywords().count().unwrap(), 0);
    assert!(store.files().by_path("gone.ts", "main").unwrap().is_none());
}

#[test]
fn file_status_transitions_are_persisted() {
    let store = Store::open_in_memory(8, "mock").unwrap();
    let now = now_ms();
    store
        .files()
        .upsert(&FileRecord {
            file_path: "s.ts".to_string(),
            branch: "main".to_string(),
            file_hash: String::new(),
            mtime_ms: now,
            size_bytes: 0,
            last_indexed: now,
            language: None,
            status: FileStatus::Pending,
            symbol_count: 0,
            importance_rank: None,
            error_message: None,
        })
        .unwrap();

    store
        .files()
        .update_status("s.ts", "main", FileStatus::Indexing, None)
        .unwrap();
    store
        .files()
        .update_status("s.ts", "main", FileStatus::Error, Some("boom"))
        .unwrap();

    let record = store.files().by_path("s.ts", "main").unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Error);
    assert_eq!(record.error_message.as_deref(), Some("boom"));
    assert_eq!(
        store.files().by_status(FileStatus::Error, "main").unwrap().len(),
        1
    );
}
