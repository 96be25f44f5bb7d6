//! Branch diff over the stored symbol graph.
//!
//! Symbols are compared by qualified name; a shared name with a
//! different content hash is a modification, with flags for what
//! changed. Edges are compared by `(source_id, target_id, kind)`.

use crate::error::Result;
use crate::store::Store;
use crate::types::{Edge, Symbol};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub offset: usize,
    pub limit: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SymbolChanges {
    pub content_changed: bool,
    pub signature_changed: bool,
    pub location_changed: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ModifiedSymbol {
    /// State in the source branch.
    pub source: Symbol,
    /// State in the target branch.
    pub target: Symbol,
    pub changes: SymbolChanges,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
    pub affected_files: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BranchDiffResult {
    pub source_branch: String,
    pub target_branch: String,
    pub summary: DiffSummary,
    /// Paginated lists; `summary` always carries the full counts.
    pub added: Vec<Symbol>,
    pub removed: Vec<Symbol>,
    pub modified: Vec<ModifiedSymbol>,
    pub edges_added: Vec<Edge>,
    pub edges_removed: Vec<Edge>,
    pub affected_files: Vec<String>,
    pub compute_time_ms: u64,
}

/// Diff `source_branch` against `target_branch`: what the source has
/// that the target lacks (added), the reverse (removed), and what both
/// have in different shape (modified).
pub fn diff_branches(
    store: &Arc<Store>,
    source_branch: &str,
    target_branch: &str,
    options: &DiffOptions,
) -> Result<BranchDiffResult> {
    let started = Instant::now();

    let source_symbols = non_external(store.symbols().by_branch(source_branch)?);
    let target_symbols = non_external(store.symbols().by_branch(target_branch)?);

    let source_by_name: HashMap<&str, &Symbol> = source_symbols
        .iter()
        .map(|s| (s.qualified_name.as_str(), s))
        .collect();
    let target_by_name: HashMap<&str, &Symbol> = target_symbols
        .iter()
        .map(|s| (s.qualified_name.as_str(), s))
        .collect();

    let mut added: Vec<Symbol> = Vec::new();
    let mut modified: Vec<ModifiedSymbol> = Vec::new();
    let mut affected: BTreeSet<String> = BTreeSet::new();

    for symbol in &source_symbols {
        match target_by_name.get(symbol.qualified_name.as_str()) {
            None => {
                affected.insert(symbol.file_path.clone());
                added.push(symbol.clone());
            }
            Some(counterpart) if counterpart.content_hash != symbol.content_hash => {
                affected.insert(symbol.file_path.clone());
                modified.push(ModifiedSymbol {
                    changes: SymbolChanges {
                        content_changed: true,
                        signature_changed: symbol.signature != counterpart.signature,
                        location_changed: symbol.start_line != counterpart.start_line
                            || symbol.end_line != counterpart.end_line
                            || symbol.file_path != counterpart.file_path,
                    },
                    source: symbol.clone(),
                    target: (*counterpart).clone(),
                });
            }
            Some(_) => {}
        }
    }

    let mut removed: Vec<Symbol> = Vec::new();
    for symbol in &target_symbols {
        if !source_by_name.contains_key(symbol.qualified_name.as_str()) {
            affected.insert(symbol.file_path.clone());
            removed.push(symbol.clone());
        }
    }

    added.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
    removed.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
    modified.sort_by(|a, b| a.source.qualified_name.cmp(&b.source.qualified_name));

    // Edge diff keyed by endpoints and kind.
    let source_edges = store.edges().by_branch(source_branch)?;
    let target_edges = store.edges().by_branch(target_branch)?;
    let target_keys: BTreeSet<(String, String, &'static str)> =
        target_edges.iter().map(edge_key).collect();
    let source_keys: BTreeSet<(String, String, &'static str)> =
        source_edges.iter().map(edge_key).collect();

    let mut edges_added: Vec<Edge> = source_edges
        .iter()
        .filter(|e| !target_keys.contains(&edge_key(e)))
        .cloned()
        .collect();
    let mut edges_removed: Vec<Edge> = target_edges
        .iter()
        .filter(|e| !source_keys.contains(&edge_key(e)))
        .cloned()
        .collect();
    edges_added.sort_by(|a, b| a.id.cmp(&b.id));
    edges_removed.sort_by(|a, b| a.id.cmp(&b.id));

    let summary = DiffSummary {
        added: added.len(),
        removed: removed.len(),
        modified: modified.len(),
        edges_added: edges_added.len(),
        edges_removed: edges_removed.len(),
        affected_files: affected.len(),
    };

    Ok(BranchDiffResult {
        source_branch: source_branch.to_string(),
        target_branch: target_branch.to_string(),
        summary,
        added: paginate(added, options),
        removed: paginate(removed, options),
        modified: paginate(modified, options),
        edges_added: paginate(edges_added, options),
        edges_removed: paginate(edges_removed, options),
        affected_files: affected.into_iter().collect(),
        compute_time_ms: started.elapsed().as_millis() as u64,
    })
}

fn non_external(symbols: Vec<Symbol>) -> Vec<Symbol> {
    symbols.into_iter().filter(|s| !s.is_external).collect()
}

fn edge_key(edge: &Edge) -> (String, String, &'static str) {
    (
        edge.source_id.clone(),
        edge.target_id.clone(),
        edge.kind.as_str(),
    )
}

fn paginate<T>(items: Vec<T>, options: &DiffOptions) -> Vec<T> {
    items
        .into_iter()
        .skip(options.offset)
        .take(options.limit)
        .collect()
}
