//! Repo map: file-level importance derived from the import graph.
//!
//! After each update the branch's import edges are projected onto a file
//! graph; a PageRank pass scores each file and the result lands in the
//! `repo_map` table. Purely derived data, rebuilt wholesale and never
//! allowed to fail an update.

use crate::error::Result;
use crate::store::Store;
use crate::types::{EdgeKind, RepoMapEntry, SymbolKind};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

const DAMPING: f64 = 0.85;
const ITERATIONS: usize = 20;
const SUMMARY_SYMBOLS: usize = 8;

pub fn rebuild(store: &Arc<Store>, branch: &str) -> Result<()> {
    let files = store.files().by_branch(branch)?;
    if files.is_empty() {
        return Ok(());
    }

    // symbol id -> file, for projecting symbol edges onto files.
    let symbols = store.symbols().by_branch(branch)?;
    let mut symbol_file: HashMap<&str, &str> = HashMap::new();
    for symbol in &symbols {
        if !symbol.is_external {
            symbol_file.insert(symbol.id.as_str(), symbol.file_path.as_str());
        }
    }

    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for file in &files {
        let idx = graph.add_node(file.file_path.as_str());
        nodes.insert(file.file_path.as_str(), idx);
    }

    for edge in store.edges().by_kind(EdgeKind::Imports, branch)? {
        let (Some(source_file), Some(target_file)) = (
            symbol_file.get(edge.source_id.as_str()),
            symbol_file.get(edge.target_id.as_str()),
        ) else {
            continue;
        };
        if source_file == target_file {
            continue;
        }
        if let (Some(&a), Some(&b)) = (nodes.get(source_file), nodes.get(target_file)) {
            graph.update_edge(a, b, ());
        }
    }

    let ranks = pagerank(&graph);

    let mut entries = Vec::with_capacity(files.len());
    for file in &files {
        let idx = nodes[file.file_path.as_str()];
        let summary = symbol_summary(&symbols, &file.file_path);
        entries.push(RepoMapEntry {
            file_path: file.file_path.clone(),
            branch: branch.to_string(),
            importance_score: ranks[idx.index()],
            in_degree: graph.neighbors_directed(idx, petgraph::Incoming).count() as u32,
            out_degree: graph.neighbors_directed(idx, petgraph::Outgoing).count() as u32,
            symbol_summary: summary,
        });
    }

    store.upsert_repo_map(&entries)?;
    tracing::debug!("repo map rebuilt for {branch}: {} files", entries.len());
    Ok(())
}

/// Plain power-iteration PageRank; dangling nodes contribute nothing.
fn pagerank(graph: &DiGraph<&str, ()>) -> Vec<f64> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }
    let base = (1.0 - DAMPING) / n as f64;
    let mut ranks = vec![1.0 / n as f64; n];

    for _ in 0..ITERATIONS {
        let mut next = vec![base; n];
        for node in graph.node_indices() {
            let out_degree = graph.neighbors_directed(node, petgraph::Outgoing).count();
            if out_degree == 0 {
                continue;
            }
            let share = DAMPING * ranks[node.index()] / out_degree as f64;
            for target in graph.neighbors_directed(node, petgraph::Outgoing) {
                next[target.index()] += share;
            }
        }
        ranks = next;
    }
    ranks
}

/// First few declaration names of a file, for at-a-glance context.
fn symbol_summary(symbols: &[crate::types::Symbol], file_path: &str) -> Option<String> {
    let mut in_file: Vec<_> = symbols
        .iter()
        .filter(|s| s.file_path == file_path && s.kind != SymbolKind::Module)
        .collect();
    if in_file.is_empty() {
        return None;
    }
    in_file.sort_by_key(|s| s.start_line);
    Some(
        in_file
            .iter()
            .take(SUMMARY_SYMBOLS)
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}
