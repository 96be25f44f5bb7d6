//! Rust adapter.

use super::{Extraction, LanguageAdapter, qualify};
use crate::types::{EdgeKind, RawEdge, RawSymbol, SymbolKind};
use anyhow::{Context, Result};
use tree_sitter::{Node, Parser};

pub struct RustAdapter;

impl RustAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAdapter for RustAdapter {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn extract(&self, source: &str, path: &str) -> Result<Extraction> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .context("failed to load rust grammar")?;
        let tree = parser.parse(source, None).context("parse returned no tree")?;

        let mut walker = Walker {
            source,
            path,
            scopes: Vec::new(),
            fn_stack: Vec::new(),
            in_impl: false,
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
    in_impl: bool,
    out: Extraction,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node: Node) {
        match node.kind() {
            "function_item" => {
                if let Some(name) = self.name_of(node) {
                    let kind = if self.in_impl {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    self.push_symbol(&name, kind, node);
                    let qualified = qualify(self.path, &self.scopes, &name);
                    self.fn_stack.push(qualified);
                    self.scopes.push(name);
                    self.walk_children(node);
                    self.scopes.pop();
                    self.fn_stack.pop();
                    return;
                }
            }
            "struct_item" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Class, node);
                }
            }
            "enum_item" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Enum, node);
                }
            }
            "trait_item" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Interface, node);
                    self.scopes.push(name);
                    self.walk_children(node);
                    self.scopes.pop();
                    return;
                }
            }
            "type_item" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::TypeAlias, node);
                }
            }
            "const_item" | "static_item" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Variable, node);
                }
            }
            "mod_item" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Module, node);
                    self.scopes.push(name);
                    self.walk_children(node);
                    self.scopes.pop();
                    return;
                }
            }
            "impl_item" => {
                let type_name = impl_type_name(self.source, node);
                // `impl Trait for Type` implies an implements edge.
                if let (Some(type_name), Some(trait_name)) =
                    (&type_name, impl_trait_name(self.source, node))
                {
                    self.out.edges.push(RawEdge {
                        source_name: qualify(self.path, &self.scopes, type_name),
                        target_name: trait_name,
                        kind: EdgeKind::Implements,
                        confidence: 0.7,
                        line: Some(node.start_position().row as u32 + 1),
                    });
                }
                if let Some(type_name) = type_name {
                    self.scopes.push(type_name);
                    let was_in_impl = self.in_impl;
                    self.in_impl = true;
                    self.walk_children(node);
                    self.in_impl = was_in_impl;
                    self.scopes.pop();
                    return;
                }
            }
            "use_declaration" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    if let Some(target) = self.text_of(argument) {
                        self.out.edges.push(RawEdge {
                            source_name: self.path.to_string(),
                            target_name: target,
                            kind: EdgeKind::Imports,
                            confidence: 1.0,
                            line: Some(node.start_position().row as u32 + 1),
                        });
                    }
                }
            }
            "call_expression" => {
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
        let content = self.text_of(node).unwrap_or_default();
        self.out.symbols.push(RawSymbol {
            name: name.to_string(),
            qualified_name: qualify(self.path, &self.scopes, name),
            kind,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            signature: signature_of(&content),
            docstring: doc_comment_before(self.source, node),
            content,
        });
    }

    fn call_edge(&mut self, node: Node) {
        let Some(callee_node) = node.child_by_field_name("function") else {
            return;
        };
        let Some(callee) = callee_name(self.source, callee_node) else {
            return;
        };
        let caller = self
            .fn_stack
            .last()
            .cloned()
            .unwrap_or_else(|| self.path.to_string());
        let is_method = callee_node.kind() == "field_expression";
        self.out.edges.push(RawEdge {
            source_name: caller,
            target_name: callee,
            kind: EdgeKind::Calls,
            confidence: if is_method { 0.6 } else { 0.7 },
            line: Some(node.start_position().row as u32 + 1),
        });
    }
}

fn impl_type_name(source: &str, node: Node) -> Option<String> {
    let ty = node.child_by_field_name("type")?;
    let text = source.get(ty.start_byte()..ty.end_byte())?;
    first_identifier(text)
}

fn impl_trait_name(source: &str, node: Node) -> Option<String> {
    let tr = node.child_by_field_name("trait")?;
    let text = source.get(tr.start_byte()..tr.end_byte())?;
    first_identifier(text)
}

fn first_identifier(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .find(|part| !part.is_empty())
        .map(|s| s.to_string())
}

fn callee_name(source: &str, node: Node) -> Option<String> {
    match node.kind() {
        "identifier" => source.get(node.start_byte()..node.end_byte()).map(String::from),
        "field_expression" => {
            let field = node.child_by_field_name("field")?;
            source.get(field.start_byte()..field.end_byte()).map(String::from)
        }
        "scoped_identifier" => {
            let name = node.child_by_field_name("name")?;
            source.get(name.start_byte()..name.end_byte()).map(String::from)
        }
        _ => None,
    }
}

/// Declaration head: everything before the body brace, collapsed to one
/// line.
fn signature_of(content: &str) -> Option<String> {
    let head = content.split('{').next().unwrap_or(content);
    let collapsed = head.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Consecutive `///` lines directly above the declaration.
fn doc_comment_before(source: &str, node: Node) -> Option<String> {
    let mut lines = Vec::new();
    let mut current = node.prev_sibling();
    while let Some(prev) = current {
        if prev.kind() != "line_comment" {
            break;
        }
        let text = source.get(prev.start_byte()..prev.end_byte())?;
        if let Some(doc) = text.strip_prefix("///") {
            lines.push(doc.trim().to_string());
            current = prev.prev_sibling();
        } else {
            break;
        }
    }
    if lines.is_empty() {
        None
    } else {
        lines.reverse();
        Some(lines.join("\n"))
    }
}
