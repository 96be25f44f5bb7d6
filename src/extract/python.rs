//! Python adapter.

use super::{Extraction, LanguageAdapter, qualify};
use crate::types::{EdgeKind, RawEdge, RawSymbol, SymbolKind};
use anyhow::{Context, Result};
use tree_sitter::{Node, Parser};

pub struct PythonAdapter;

impl PythonAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn extract(&self, source: &str, path: &str) -> Result<Extraction> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .context("failed to load python grammar")?;
        let tree = parser.parse(source, None).context("parse returned no tree")?;

        let mut walker = Walker {
            source,
            path,
            scopes: Vec::new(),
            fn_stack: Vec::new(),
            class_depth: 0,
            out: Extraction::default(),
        };
        walker.walk(tree.root_node());
        Ok(walker.out)
    }
}

struct Walker<'a> {
    source: &'a str,
    path: &'a str,
    scopes: Vec<String>,
    fn_stack: Vec<String>,
    class_depth: usize,
    out: Extraction,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node: Node) {
        match node.kind() {
            "function_definition" => {
                if let Some(name) = self.name_of(node) {
                    let kind = if self.class_depth > 0 {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    self.push_symbol(&name, kind, node);
                    self.fn_stack.push(qualify(self.path, &self.scopes, &name));
                    self.scopes.push(name);
                    self.walk_children(node);
                    self.scopes.pop();
                    self.fn_stack.pop();
                    return;
                }
            }
            "class_definition" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Class, node);
                    self.base_class_edges(&name, node);
                    self.scopes.push(name);
                    self.class_depth += 1;
                    self.walk_children(node);
                    self.class_depth -= 1;
                    self.scopes.pop();
                    return;
                }
            }
            "import_statement" | "import_from_statement" => {
                self.import_edges(node);
            }
            "call" => {
                self.call_edge(node);
            }
            _ => {}
        }

        self.walk_children(node);
    }

    fn walk_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child);
        }
    }

    fn name_of(&self, node: Node) -> Option<String> {
        node.child_by_field_name("name").and_then(|n| self.text_of(n))
    }

    fn text_of(&self, node: Node) -> Option<String> {
        self.source.get(node.start_byte()..node.end_byte()).map(|s| s.to_string())
    }

    fn push_symbol(&mut self, name: &str, kind: SymbolKind, node: Node) {
        // A decorated definition's span starts at the decorator.
        let anchor = match node.parent() {
            Some(parent) if parent.kind() == "decorated_definition" => parent,
            _ => node,
        };
        let content = self.text_of(anchor).unwrap_or_default();
        self.out.symbols.push(RawSymbol {
            name: name.to_string(),
            qualified_name: qualify(self.path, &self.scopes, name),
            kind,
            start_line: anchor.start_position().row as u32 + 1,
            end_line: anchor.end_position().row as u32 + 1,
            signature: signature_of(self.source, node),
            docstring: docstring_of(self.source, node),
            content,
        });
    }

    fn import_edges(&mut self, node: Node) {
        let line = node.start_position().row as u32 + 1;
        // `from x import y` targets the module `x`; `import a, b` targets
        // each listed module.
        if node.kind() == "import_from_statement" {
            if let Some(module) = node.child_by_field_name("module_name") {
                if let Some(target) = self.text_of(module) {
                    self.push_import(target, line);
                }
            }
            return;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    if let Some(target) = self.text_of(child) {
                        self.push_import(target, line);
                    }
                }
                "aliased_import" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        if let Some(target) = self.text_of(name) {
                            self.push_import(target, line);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn push_import(&mut self, target: String, line: u32) {
        self.out.edges.push(RawEdge {
            source_name: self.path.to_string(),
            target_name: target,
            kind: EdgeKind::Imports,
            confidence: 1.0,
            line: Some(line),
        });
    }

    fn base_class_edges(&mut self, name: &str, node: Node) {
        let Some(superclasses) = node.child_by_field_name("superclasses") else {
            return;
        };
        let source_name = qualify(self.path, &self.scopes, name);
        let mut cursor = superclasses.walk();
        for child in superclasses.children(&mut cursor) {
            if matches!(child.kind(), "identifier" | "attribute") {
                if let Some(base) = self.text_of(child).and_then(|t| last_identifier(&t)) {
                    self.out.edges.push(RawEdge {
                        source_name: source_name.clone(),
                        target_name: base,
                        kind: EdgeKind::Extends,
                        confidence: 0.7,
                        line: Some(child.start_position().row as u32 + 1),
                    });
                }
            }
        }
    }

    fn call_edge(&mut self, node: Node) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let (callee, is_method) = match function.kind() {
            "identifier" => (self.text_of(function), false),
            "attribute" => (
                function
                    .child_by_field_name("attribute")
                    .and_then(|n| self.text_of(n)),
                true,
            ),
            _ => (None, false),
        };
        let Some(callee) = callee else { return };
        let caller = self
            .fn_stack
            .last()
            .cloned()
            .unwrap_or_else(|| self.path.to_string());
        self.out.edges.push(RawEdge {
            source_name: caller,
            target_name: callee,
            kind: EdgeKind::Calls,
            confidence: if is_method { 0.6 } else { 0.7 },
            line: Some(node.start_position().row as u32 + 1),
        });
    }
}

/// `def name(params) -> ret:` head, without the body.
fn signature_of(source: &str, node: Node) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let head = source.get(node.start_byte()..body.start_byte())?;
    let collapsed = head.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches(':').trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// First string expression in the body, PEP 257 style.
fn docstring_of(source: &str, node: Node) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let text = source.get(string.start_byte()..string.end_byte())?;
    let cleaned = text
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

fn last_identifier(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|part| !part.is_empty())
        .last()
        .map(|s| s.to_string())
}
