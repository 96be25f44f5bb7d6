//! Symbol and edge extraction.
//!
//! A registry of per-language adapters sits behind the [`Extractor`]
//! façade. Every file also gets a module symbol (its import preamble)
//! which anchors file-level import edges. Files without an adapter, or
//! whose adapter finds nothing, fall back to fixed-size line chunks so
//! they stay searchable.

mod lexical;
mod python;
mod rust;
mod typescript;

pub use lexical::{BlockStyle, LexicalAdapter};
pub use python::PythonAdapter;
pub use rust::RustAdapter;
pub use typescript::TypeScriptAdapter;

use crate::types::{RawEdge, RawSymbol, SymbolKind};
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Lines of the file kept as the module symbol's content.
const MODULE_PREAMBLE_LINES: usize = 30;

/// What one adapter run produces.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub symbols: Vec<RawSymbol>,
    pub edges: Vec<RawEdge>,
}

/// Per-language extraction capability.
pub trait LanguageAdapter: Send + Sync {
    /// Canonical language name recorded on symbols.
    fn language(&self) -> &'static str;

    /// File extensions this adapter handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Extract declarations and edges from one file. Errors are captured
    /// by the façade; the indexer never aborts on a single file.
    fn extract(&self, source: &str, path: &str) -> Result<Extraction>;
}

/// Result of extracting one file, adapter failures included.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    pub symbols: Vec<RawSymbol>,
    pub edges: Vec<RawEdge>,
    pub language: String,
    /// Captured adapter error; the file is marked `status=error`.
    pub error: Option<String>,
}

pub struct Extractor {
    by_extension: HashMap<&'static str, Arc<dyn LanguageAdapter>>,
    max_chunk_lines: u32,
    chunk_overlap: u32,
}

impl Extractor {
    pub fn new(max_chunk_lines: u32, chunk_overlap: u32) -> Self {
        let adapters: Vec<Arc<dyn LanguageAdapter>> = vec![
            Arc::new(RustAdapter::new()),
            Arc::new(TypeScriptAdapter::typescript()),
            Arc::new(TypeScriptAdapter::tsx()),
            Arc::new(PythonAdapter::new()),
            Arc::new(LexicalAdapter::go()),
            Arc::new(LexicalAdapter::java()),
            Arc::new(LexicalAdapter::c_family()),
            Arc::new(LexicalAdapter::csharp()),
            Arc::new(LexicalAdapter::cython()),
        ];

        let mut by_extension = HashMap::new();
        for adapter in adapters {
            for ext in adapter.extensions() {
                by_extension.insert(*ext, adapter.clone());
            }
        }

        Self {
            by_extension,
            max_chunk_lines,
            chunk_overlap,
        }
    }

    /// Canonical language for a path, when an adapter covers it.
    pub fn language_for(&self, path: &str) -> Option<&'static str> {
        self.adapter_for(path).map(|a| a.language())
    }

    fn adapter_for(&self, path: &str) -> Option<&Arc<dyn LanguageAdapter>> {
        let ext = Path::new(path).extension()?.to_str()?.to_lowercase();
        self.by_extension.get(ext.as_str())
    }

    /// Extract one file. Never fails: adapter errors are captured, and
    /// symbol-less files degrade to line chunks.
    pub fn extract(&self, source: &str, path: &str) -> FileExtraction {
        let (language, outcome) = match self.adapter_for(path) {
            Some(adapter) => (adapter.language(), Some(adapter.extract(source, path))),
            None => ("text", None),
        };

        match outcome {
            Some(Ok(mut extraction)) => {
                let module = module_symbol(source, path);
                if extraction.symbols.is_empty() {
                    let mut symbols =
                        chunk_fallback(source, path, self.max_chunk_lines, self.chunk_overlap);
                    symbols.insert(0, module);
                    FileExtraction {
                        symbols,
                        edges: extraction.edges,
                        language: language.to_string(),
                        error: None,
                    }
                } else {
                    extraction.symbols.insert(0, module);
                    FileExtraction {
                        symbols: extraction.symbols,
                        edges: extraction.edges,
                        language: language.to_string(),
                        error: None,
                    }
                }
            }
            Some(Err(e)) => FileExtraction {
                symbols: Vec::new(),
                edges: Vec::new(),
                language: language.to_string(),
                error: Some(e.to_string()),
            },
            None => {
                let mut symbols =
                    chunk_fallback(source, path, self.max_chunk_lines, self.chunk_overlap);
                symbols.insert(0, module_symbol(source, path));
                FileExtraction {
                    symbols,
                    edges: Vec::new(),
                    language: language.to_string(),
                    error: None,
                }
            }
        }
    }
}

/// The file itself as a symbol. Its qualified name is the bare file path
/// (no `:name` suffix), which keeps it distinct from any declaration and
/// makes import-edge targets computable from a path alone.
pub fn module_symbol(source: &str, path: &str) -> RawSymbol {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string();
    let total_lines = source.lines().count().max(1) as u32;
    let preamble: String = source
        .lines()
        .take(MODULE_PREAMBLE_LINES)
        .collect::<Vec<_>>()
        .join("\n");

    RawSymbol {
        name: stem,
        qualified_name: path.to_string(),
        kind: SymbolKind::Module,
        start_line: 1,
        end_line: total_lines,
        content: preamble,
        signature: None,
        docstring: None,
    }
}

/// Fixed-size line chunks for files that yield no symbols.
pub fn chunk_fallback(
    source: &str,
    path: &str,
    max_chunk_lines: u32,
    chunk_overlap: u32,
) -> Vec<RawSymbol> {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path);
    let step = (max_chunk_lines.saturating_sub(chunk_overlap)).max(1) as usize;
    let size = max_chunk_lines.max(1) as usize;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < lines.len() {
        let end = (start + size).min(lines.len());
        let content = lines[start..end].join("\n");
        let start_line = (start + 1) as u32;
        let end_line = end as u32;
        chunks.push(RawSymbol {
            name: format!("{stem}[{start_line}-{end_line}]"),
            qualified_name: format!("{path}:{start_line}-{end_line}"),
            kind: SymbolKind::Module,
            start_line,
            end_line,
            content,
            signature: None,
            docstring: None,
        });
        if end == lines.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// `file_path:scope.name` qualified-name builder shared by the adapters.
pub(crate) fn qualify(path: &str, scopes: &[String], name: &str) -> String {
    if scopes.is_empty() {
        format!("{path}:{name}")
    } else {
        format!("{path}:{}.{name}", scopes.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunker_respects_overlap() {
        let source = (1..=25).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_fallback(&source, "notes.txt", 10, 2);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 10);
        assert_eq!(chunks[1].start_line, 9);
        assert_eq!(chunks[1].end_line, 18);
        assert_eq!(chunks.last().unwrap().end_line, 25);
    }

    #[test]
    fn unknown_extension_falls_back_to_chunks() {
        let extractor = Extractor::new(100, 10);
        let result = extractor.extract("some plain text\nwith two lines", "readme.txt");
        assert!(result.error.is_none());
        assert_eq!(result.language, "text");
        // Module symbol plus one chunk.
        assert_eq!(result.symbols.len(), 2);
        assert_eq!(result.symbols[0].kind, SymbolKind::Module);
    }

    #[test]
    fn module_symbol_uses_bare_path_as_qualified_name() {
        let module = module_symbol("import x\n", "src/app.ts");
        assert_eq!(module.qualified_name, "src/app.ts");
        assert_eq!(module.name, "app");
        assert_eq!(module.kind, SymbolKind::Module);
    }

    #[test]
    fn qualify_joins_nested_scopes_with_dots() {
        assert_eq!(qualify("a.ts", &[], "f"), "a.ts:f");
        let scopes = vec!["Outer".to_string(), "inner".to_string()];
        assert_eq!(qualify("a.ts", &scopes, "f"), "a.ts:Outer.inner.f");
    }
}
