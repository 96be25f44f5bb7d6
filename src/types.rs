//! Core data model shared across the engine.
//!
//! Symbols and edges reference each other only by content-derived ids;
//! every record carries the branch it belongs to, and queries never cross
//! branches.

use serde::{Deserialize, Serialize};

/// Kind of symbol in the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    TypeAlias,
    Enum,
    Variable,
    Module,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::TypeAlias => "type_alias",
            Self::Enum => "enum",
            Self::Variable => "variable",
            Self::Module => "module",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "method" => Some(Self::Method),
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "type_alias" => Some(Self::TypeAlias),
            "enum" => Some(Self::Enum),
            "variable" => Some(Self::Variable),
            "module" => Some(Self::Module),
            _ => None,
        }
    }
}

/// Kind of relationship between two symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Imports,
    Extends,
    Implements,
    Uses,
    Defines,
    Reexports,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::Uses => "uses",
            Self::Defines => "defines",
            Self::Reexports => "reexports",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calls" => Some(Self::Calls),
            "imports" => Some(Self::Imports),
            "extends" => Some(Self::Extends),
            "implements" => Some(Self::Implements),
            "uses" => Some(Self::Uses),
            "defines" => Some(Self::Defines),
            "reexports" => Some(Self::Reexports),
            _ => None,
        }
    }
}

/// Where an edge came from. The origin bounds how much we trust it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeOrigin {
    Lsp,
    Scip,
    AstInference,
}

impl EdgeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lsp => "lsp",
            Self::Scip => "scip",
            Self::AstInference => "ast-inference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lsp" => Some(Self::Lsp),
            "scip" => Some(Self::Scip),
            "ast-inference" => Some(Self::AstInference),
            _ => None,
        }
    }
}

/// Indexing lifecycle of a file within a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Indexing,
    Indexed,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Indexing => "indexing",
            Self::Indexed => "indexed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "indexing" => Some(Self::Indexing),
            "indexed" => Some(Self::Indexed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A named, addressable piece of source.
///
/// The id is derived from `qualified_name ∥ signature ∥ language`, so
/// re-extracting an unchanged declaration always produces the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    /// `file_path:name`, nested scopes joined with `.`.
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub language: String,
    pub file_path: String,
    /// 1-based, inclusive.
    pub start_line: u32,
    pub end_line: u32,
    /// Verbatim source text of the declaration.
    pub content: String,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub content_hash: String,
    /// Declared outside the workspace (import target we could not resolve).
    pub is_external: bool,
    pub branch: String,
    pub embedding_model_id: Option<String>,
    /// Unix milliseconds.
    pub updated_at: i64,
    pub revision_id: i64,
}

/// A directed, typed relationship between two symbols in one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub kind: EdgeKind,
    /// Trust in the relationship, in [0, 1]. AST inference caps at 0.7.
    pub confidence: f32,
    pub origin: EdgeOrigin,
    pub branch: String,
    pub source_line: Option<u32>,
    pub target_line: Option<u32>,
    pub updated_at: i64,
    /// Opaque JSON blob carried through from the producer.
    pub metadata: Option<String>,
}

/// Per-branch file metadata, the unit of the indexing state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_path: String,
    pub branch: String,
    pub file_hash: String,
    pub mtime_ms: i64,
    pub size_bytes: i64,
    pub last_indexed: i64,
    pub language: Option<String>,
    pub status: FileStatus,
    pub symbol_count: u32,
    pub importance_rank: Option<f64>,
    pub error_message: Option<String>,
}

/// Per-file importance record derived from the import graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMapEntry {
    pub file_path: String,
    pub branch: String,
    pub importance_score: f64,
    pub in_degree: u32,
    pub out_degree: u32,
    pub symbol_summary: Option<String>,
}

/// A symbol as an adapter reports it, before identity enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSymbol {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub signature: Option<String>,
    pub docstring: Option<String>,
}

/// An edge as an adapter reports it: endpoints are names, not ids.
///
/// The index manager resolves `source_name`/`target_name` against the
/// extracted symbols (and the branch) before persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEdge {
    /// Qualified name of the source symbol.
    pub source_name: String,
    /// Qualified name for imports; bare callee name for calls.
    pub target_name: String,
    pub kind: EdgeKind,
    pub confidence: f32,
    pub line: Option<u32>,
}

/// Current timestamp in unix milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Class,
            SymbolKind::Interface,
            SymbolKind::TypeAlias,
            SymbolKind::Enum,
            SymbolKind::Variable,
            SymbolKind::Module,
        ] {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse("struct"), None);
    }

    #[test]
    fn edge_kind_round_trips() {
        for kind in [
            EdgeKind::Calls,
            EdgeKind::Imports,
            EdgeKind::Extends,
            EdgeKind::Implements,
            EdgeKind::Uses,
            EdgeKind::Defines,
            EdgeKind::Reexports,
        ] {
            assert_eq!(EdgeKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn origin_round_trips() {
        assert_eq!(
            EdgeOrigin::parse("ast-inference"),
            Some(EdgeOrigin::AstInference)
        );
        assert_eq!(EdgeOrigin::parse("lsp"), Some(EdgeOrigin::Lsp));
        assert_eq!(EdgeOrigin::parse("scip"), Some(EdgeOrigin::Scip));
        assert_eq!(EdgeOrigin::parse("guess"), None);
    }
}
