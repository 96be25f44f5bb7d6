//! Lexical adapter for languages without a bundled grammar.
//!
//! Declarations are found with per-language regexes; the block end is
//! found by balanced `{}`/`()` counting for brace languages and by the
//! last line whose indent strictly exceeds the declaration's indent for
//! indentation languages. Coarser than a real parse, but it keeps Go,
//! Java, and the C family searchable without carrying their grammars.

use super::{Extraction, LanguageAdapter, qualify};
use crate::types::{EdgeKind, RawEdge, RawSymbol, SymbolKind};
use anyhow::Result;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    Braces,
    Indent,
}

struct DeclPattern {
    regex: Regex,
    kind: SymbolKind,
}

pub struct LexicalAdapter {
    name: &'static str,
    extensions: &'static [&'static str],
    style: BlockStyle,
    declarations: Vec<DeclPattern>,
    import: Option<Regex>,
    /// Keywords that look like declarations to the C-family function
    /// heuristic but are control flow.
    keyword_filter: &'static [&'static str],
}

impl LexicalAdapter {
    pub fn go() -> Self {
        Self {
            name: "go",
            extensions: &["go"],
            style: BlockStyle::Braces,
            declarations: vec![
                decl(r"^func\s+\([^)]*\)\s+(?P<name>[A-Za-z_]\w*)\s*\(", SymbolKind::Method),
                decl(r"^func\s+(?P<name>[A-Za-z_]\w*)\s*\(", SymbolKind::Function),
                decl(r"^type\s+(?P<name>[A-Za-z_]\w*)\s+struct\b", SymbolKind::Class),
                decl(r"^type\s+(?P<name>[A-Za-z_]\w*)\s+interface\b", SymbolKind::Interface),
                decl(r"^type\s+(?P<name>[A-Za-z_]\w*)\s+\S", SymbolKind::TypeAlias),
            ],
            import: Some(Regex::new(r#"^\s*(?:import\s+)?"(?P<path>[^"]+)"\s*$"#).unwrap()),
            keyword_filter: &[],
        }
    }

    pub fn java() -> Self {
        Self {
            name: "java",
            extensions: &["java"],
            style: BlockStyle::Braces,
            declarations: vec![
                decl(
                    r"^\s*(?:public|protected|private)?\s*(?:abstract\s+|final\s+|static\s+)*class\s+(?P<name>\w+)",
                    SymbolKind::Class,
                ),
                decl(
                    r"^\s*(?:public|protected|private)?\s*interface\s+(?P<name>\w+)",
                    SymbolKind::Interface,
                ),
                decl(
                    r"^\s*(?:public|protected|private)?\s*enum\s+(?P<name>\w+)",
                    SymbolKind::Enum,
                ),
            ],
            import: Some(Regex::new(r"^import\s+(?:static\s+)?(?P<path>[\w.]+?)(?:\.\*)?;").unwrap()),
            keyword_filter: &[],
        }
    }

    pub fn c_family() -> Self {
        Self {
            name: "c",
            extensions: &["c", "h", "cpp", "cc", "cxx", "hpp", "hh"],
            style: BlockStyle::Braces,
            declarations: vec![
                decl(r"^(?:typedef\s+)?struct\s+(?P<name>\w+)", SymbolKind::Class),
                decl(r"^class\s+(?P<name>\w+)", SymbolKind::Class),
                decl(r"^enum\s+(?:class\s+)?(?P<name>\w+)", SymbolKind::Enum),
                // Function definition heuristic: a top-level line that ends
                // in an argument list rather than a `;` prototype.
                decl(
                    r"^[A-Za-z_][\w\s\*&:<>,]*?\b(?P<name>[A-Za-z_]\w*)\s*\([^;]*$",
                    SymbolKind::Function,
                ),
                decl(
                    r"^[A-Za-z_][\w\s\*&:<>,]*?\b(?P<name>[A-Za-z_]\w*)\s*\([^;{]*\)\s*\{",
                    SymbolKind::Function,
                ),
            ],
            import: Some(Regex::new(r#"^#include\s+[<"](?P<path>[^>"]+)[>"]"#).unwrap()),
            keyword_filter: &["if", "for", "while", "switch", "return", "sizeof", "else"],
        }
    }

    pub fn csharp() -> Self {
        Self {
            name: "csharp",
            extensions: &["cs"],
            style: BlockStyle::Braces,
            declarations: vec![
                decl(
                    r"^\s*(?:public|internal|protected|private)?\s*(?:abstract\s+|sealed\s+|static\s+|partial\s+)*class\s+(?P<name>\w+)",
                    SymbolKind::Class,
                ),
                decl(
                    r"^\s*(?:public|internal|protected|private)?\s*interface\s+(?P<name>\w+)",
                    SymbolKind::Interface,
                ),
                decl(
                    r"^\s*(?:public|internal|protected|private)?\s*enum\s+(?P<name>\w+)",
                    SymbolKind::Enum,
                ),
                decl(
                    r"^\s*(?:public|internal|protected|private)?\s*struct\s+(?P<name>\w+)",
                    SymbolKind::Class,
                ),
            ],
            import: Some(Regex::new(r"^using\s+(?P<path>[\w.]+);").unwrap()),
            keyword_filter: &[],
        }
    }

    pub fn cython() -> Self {
        Self {
            name: "cython",
            extensions: &["pyx", "pxd"],
            style: BlockStyle::Indent,
            declarations: vec![
                decl(r"^(?:async\s+)?def\s+(?P<name>\w+)", SymbolKind::Function),
                decl(r"^cdef\s+class\s+(?P<name>\w+)", SymbolKind::Class),
                decl(r"^class\s+(?P<name>\w+)", SymbolKind::Class),
                decl(r"^cp?def\s+[\w\s\*\[\]]*?\b(?P<name>\w+)\s*\(", SymbolKind::Function),
            ],
            import: Some(
                Regex::new(r"^(?:from\s+(?P<from>[\w.]+)\s+c?import|c?import\s+(?P<path>[\w.]+))")
                    .unwrap(),
            ),
            keyword_filter: &[],
        }
    }
}

fn decl(pattern: &str, kind: SymbolKind) -> DeclPattern {
    DeclPattern {
        regex: Regex::new(pattern).expect("declaration pattern must compile"),
        kind,
    }
}

impl LanguageAdapter for LexicalAdapter {
    fn language(&self) -> &'static str {
        self.name
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    fn extract(&self, source: &str, path: &str) -> Result<Extraction> {
        let lines: Vec<&str> = source.lines().collect();
        let mut out = Extraction::default();
        let mut claimed_until = 0usize;

        for (i, line) in lines.iter().enumerate() {
            if let Some(import) = &self.import {
                if let Some(captures) = import.captures(line) {
                    let target = captures
                        .name("path")
                        .or_else(|| captures.name("from"))
                        .map(|m| m.as_str().to_string());
                    if let Some(target) = target {
                        out.edges.push(RawEdge {
                            source_name: path.to_string(),
                            target_name: target,
                            kind: EdgeKind::Imports,
                            confidence: 1.0,
                            line: Some(i as u32 + 1),
                        });
                        continue;
                    }
                }
            }

            // Declarations inside an already-claimed block belong to it.
            if i < claimed_until {
                continue;
            }

            for pattern in &self.declarations {
                let Some(captures) = pattern.regex.captures(line) else {
                    continue;
                };
                let Some(name) = captures.name("name").map(|m| m.as_str().to_string()) else {
                    continue;
                };
                if self.keyword_filter.contains(&name.as_str()) {
                    continue;
                }

                let end = match self.style {
                    BlockStyle::Braces => brace_block_end(&lines, i),
                    BlockStyle::Indent => indent_block_end(&lines, i),
                };
                let content = lines[i..=end].join("\n");
                out.symbols.push(RawSymbol {
                    name: name.clone(),
                    qualified_name: qualify(path, &[], &name),
                    kind: pattern.kind,
                    start_line: i as u32 + 1,
                    end_line: end as u32 + 1,
                    signature: Some(line.trim_end_matches('{').trim().to_string()),
                    docstring: line_comments_above(&lines, i),
                    content,
                });
                if end > i {
                    claimed_until = end + 1;
                }
                break;
            }
        }

        Ok(out)
    }
}

/// Balanced `{}`/`()` counting from the declaration line. The block ends
/// on the line where the brace depth returns to zero after opening; a
/// declaration that never opens a brace (prototype) ends on its own line.
fn brace_block_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i32;
    let mut opened = false;

    for (offset, line) in lines[start..].iter().enumerate() {
        for c in line.chars() {
            match c {
                '{' | '(' => {
                    depth += 1;
                    opened = true;
                }
                '}' | ')' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return start + offset;
        }
        // A prototype line ends in `;` with all parens closed.
        if !opened && line.trim_end().ends_with(';') {
            return start + offset;
        }
    }
    lines.len() - 1
}

/// Last line whose indent strictly exceeds the declaration's indent.
fn indent_block_end(lines: &[&str], start: usize) -> usize {
    let base = indent_of(lines[start]);
    let mut end = start;
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) > base {
            end = start + 1 + offset;
        } else {
            break;
        }
    }
    end
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Consecutive `//` lines directly above a declaration.
fn line_comments_above(lines: &[&str], decl: usize) -> Option<String> {
    let mut collected = Vec::new();
    let mut i = decl;
    while i > 0 {
        i -= 1;
        let trimmed = lines[i].trim();
        if let Some(text) = trimmed.strip_prefix("//") {
            collected.push(text.trim().to_string());
        } else {
            break;
        }
    }
    if collected.is_empty() {
        None
    } else {
        collected.reverse();
        Some(collected.join("\n"))
    }
}
