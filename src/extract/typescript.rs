//! TypeScript/TSX adapter (also covers plain JavaScript).

use super::{Extraction, LanguageAdapter, qualify};
use crate::types::{EdgeKind, RawEdge, RawSymbol, SymbolKind};
use anyhow::{Context, Result};
use tree_sitter::{Language, Node, Parser};

pub struct TypeScriptAdapter {
    language: Language,
    name: &'static str,
    extensions: &'static [&'static str],
}

impl TypeScriptAdapter {
    pub fn typescript() -> Self {
        Self {
            language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            name: "typescript",
            extensions: &["ts", "mts", "cts", "js", "mjs", "cjs"],
        }
    }

    pub fn tsx() -> Self {
        Self {
            language: tree_sitter_typescript::LANGUAGE_TSX.into(),
            name: "typescript",
            extensions: &["tsx", "jsx"],
        }
    }
}

impl LanguageAdapter for TypeScriptAdapter {
    fn language(&self) -> &'static str {
        self.name
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    fn extract(&self, source: &str, path: &str) -> Result<Extraction> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .context("failed to load typescript grammar")?;
        let tree = parser.parse(source, None).context("parse returned no tree")?;

        let mut walker = Walker {
            source,
            path,
            scopes: Vec::new(),
            fn_stack: Vec::new(),
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
    /// Qualified names of enclosing functions, for call attribution.
    fn_stack: Vec<String>,
    out: Extraction,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node: Node) {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Function, node);
                    self.in_scope(name, true, node);
                    return;
                }
            }
            "method_definition" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Method, node);
                    self.in_scope(name, true, node);
                    return;
                }
            }
            "class_declaration" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Class, node);
                    self.heritage_edges(&name, node);
                    self.in_scope(name, false, node);
                    return;
                }
            }
            "interface_declaration" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Interface, node);
                    self.heritage_edges(&name, node);
                    self.in_scope(name, false, node);
                    return;
                }
            }
            "type_alias_declaration" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::TypeAlias, node);
                }
            }
            "enum_declaration" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Enum, node);
                }
            }
            "internal_module" => {
                // `namespace Foo { ... }`
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(&name, SymbolKind::Module, node);
                    self.in_scope(name, false, node);
                    return;
                }
            }
            "variable_declarator" => {
                let name = node
                    .child_by_field_name("name")
                    .and_then(|n| self.text_of(n));
                let init = node.child_by_field_name("value");
                if let Some(name) = name {
                    match init.map(|n| n.kind()) {
                        Some("arrow_function") | Some("function_expression") | Some("function") => {
                            self.push_symbol(&name, SymbolKind::Function, node);
                            self.fn_stack.push(qualify(self.path, &self.scopes, &name));
                            self.walk_children(node);
                            self.fn_stack.pop();
                            return;
                        }
                        _ if self.scopes.is_empty() && is_top_level(node) => {
                            self.push_symbol(&name, SymbolKind::Variable, node);
                        }
                        _ => {}
                    }
                }
            }
            "import_statement" => {
                self.import_edge(node, EdgeKind::Imports);
            }
            "export_statement" => {
                // `export ... from "mod"` re-exports another module.
                if node.child_by_field_name("source").is_some() {
                    self.import_edge(node, EdgeKind::Reexports);
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

    fn in_scope(&mut self, name: String, is_fn: bool, node: Node) {
        if is_fn {
            self.fn_stack.push(qualify(self.path, &self.scopes, &name));
        }
        self.scopes.push(name);
        self.walk_children(node);
        self.scopes.pop();
        if is_fn {
            self.fn_stack.pop();
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
            signature: first_line(&content),
            docstring: doc_comment_before(self.source, node),
            content,
        });
    }

    fn import_edge(&mut self, node: Node, kind: EdgeKind) {
        let Some(source_node) = node.child_by_field_name("source") else {
            return;
        };
        let Some(raw) = self.text_of(source_node) else {
            return;
        };
        let target = strip_quotes(&raw);
        if target.is_empty() {
            return;
        }
        self.out.edges.push(RawEdge {
            source_name: self.path.to_string(),
            target_name: target,
            kind,
            confidence: 1.0,
            line: Some(node.start_position().row as u32 + 1),
        });
    }

    /// `extends` / `implements` clauses on classes and interfaces.
    fn heritage_edges(&mut self, name: &str, node: Node) {
        let source_name = qualify(self.path, &self.scopes, name);
        let mut found: Vec<(String, EdgeKind, u32)> = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            let default_kind = match child.kind() {
                "class_heritage" | "extends_clause" | "extends_type_clause" => EdgeKind::Extends,
                "implements_clause" => EdgeKind::Implements,
                _ => continue,
            };
            let line = child.start_position().row as u32 + 1;
            collect_type_identifiers(self.source, child, default_kind, line, &mut found);
        }
        for (target_name, kind, line) in found {
            self.out.edges.push(RawEdge {
                source_name: source_name.clone(),
                target_name,
                kind,
                confidence: 0.7,
                line: Some(line),
            });
        }
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
        let is_method = matches!(
            callee_node.kind(),
            "member_expression" | "subscript_expression"
        );
        self.out.edges.push(RawEdge {
            source_name: caller,
            target_name: callee,
            kind: EdgeKind::Calls,
            // Receiver types are invisible to the AST, so member calls get
            // less trust than direct ones.
            confidence: if is_method { 0.6 } else { 0.7 },
            line: Some(node.start_position().row as u32 + 1),
        });
    }
}

fn is_top_level(node: Node) -> bool {
    // variable_declarator -> lexical_declaration -> (export_statement ->) program
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "program" => return true,
            "lexical_declaration" | "variable_declaration" | "export_statement" => {
                current = parent.parent();
            }
            _ => return false,
        }
    }
    false
}

fn callee_name(source: &str, node: Node) -> Option<String> {
    match node.kind() {
        "identifier" => source.get(node.start_byte()..node.end_byte()).map(String::from),
        "member_expression" => {
            let property = node.child_by_field_name("property")?;
            source
                .get(property.start_byte()..property.end_byte())
                .map(String::from)
        }
        _ => {
            let text = source.get(node.start_byte()..node.end_byte())?;
            last_identifier(text)
        }
    }
}

/// A class_heritage node may contain both clauses; re-tag accordingly.
fn collect_type_identifiers(
    source: &str,
    node: Node,
    default_kind: EdgeKind,
    line: u32,
    found: &mut Vec<(String, EdgeKind, u32)>,
) {
    match node.kind() {
        "extends_clause" | "extends_type_clause" => {
            for name in identifiers_in(source, node) {
                found.push((name, EdgeKind::Extends, line));
            }
            return;
        }
        "implements_clause" => {
            for name in identifiers_in(source, node) {
                found.push((name, EdgeKind::Implements, line));
            }
            return;
        }
        _ => {}
    }
    if node.child_count() == 0 {
        // A bare `extends X` list under class_heritage, with no nested
        // clause nodes, still needs its identifiers collected.
        return;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    let mut saw_clause = false;
    for child in &children {
        if matches!(
            child.kind(),
            "extends_clause" | "extends_type_clause" | "implements_clause"
        ) {
            saw_clause = true;
        }
    }
    if saw_clause {
        for child in children {
            collect_type_identifiers(source, child, default_kind, line, found);
        }
    } else {
        for name in identifiers_in(source, node) {
            found.push((name, default_kind, line));
        }
    }
}

fn identifiers_in(source: &str, node: Node) -> Vec<String> {
    let mut names = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if matches!(current.kind(), "identifier" | "type_identifier") {
            if let Some(text) = source.get(current.start_byte()..current.end_byte()) {
                names.push(text.to_string());
            }
            continue;
        }
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            stack.push(child);
        }
    }
    names.reverse();
    names
}

fn last_identifier(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '$')
        .filter(|part| !part.is_empty())
        .last()
        .map(|s| s.to_string())
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn first_line(content: &str) -> Option<String> {
    content
        .lines()
        .next()
        .map(|line| line.trim_end_matches('{').trim().to_string())
        .filter(|line| !line.is_empty())
}

/// JSDoc block immediately above the declaration.
fn doc_comment_before(source: &str, node: Node) -> Option<String> {
    let prev = node.prev_named_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let text = source.get(prev.start_byte()..prev.end_byte())?;
    if !text.starts_with("/**") {
        return None;
    }
    let cleaned: Vec<String> = text
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> Extraction {
        TypeScriptAdapter::typescript()
            .extract(source, "src/app.ts")
            .unwrap()
    }

    #[test]
    fn extracts_function_with_signature() {
        let out = extract("function calculateTax(amount: number): number { return amount * 0.1 }");
        assert_eq!(out.symbols.len(), 1);
        let sym = &out.symbols[0];
        assert_eq!(sym.name, "calculateTax");
        assert_eq!(sym.kind, SymbolKind::Function);
        assert_eq!(sym.qualified_name, "src/app.ts:calculateTax");
        assert_eq!(
            sym.signature.as_deref(),
            Some("function calculateTax(amount: number): number")
        );
    }

    #[test]
    fn nests_methods_under_class_scope() {
        let out = extract("class Logger {\n  log(msg: string) {}\n}");
        let names: Vec<&str> = out.symbols.iter().map(|s| s.qualified_name.as_str()).collect();
        assert!(names.contains(&"src/app.ts:Logger"));
        assert!(names.contains(&"src/app.ts:Logger.log"));
        assert_eq!(out.symbols[1].kind, SymbolKind::Method);
    }

    #[test]
    fn arrow_function_consts_are_functions() {
        let out = extract("const sum = (a: number, b: number) => a + b;");
        assert_eq!(out.symbols[0].kind, SymbolKind::Function);
        assert_eq!(out.symbols[0].name, "sum");
    }

    #[test]
    fn emits_import_edges_from_module() {
        let out = extract("import { readFile } from './fs-utils';\n");
        assert_eq!(out.edges.len(), 1);
        let edge = &out.edges[0];
        assert_eq!(edge.kind, EdgeKind::Imports);
        assert_eq!(edge.source_name, "src/app.ts");
        assert_eq!(edge.target_name, "./fs-utils");
    }

    #[test]
    fn emits_call_edges_with_capped_confidence() {
        let out = extract("function a() { b(); obj.method(); }\nfunction b() {}");
        let calls: Vec<&RawEdge> = out
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Calls)
            .collect();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|e| e.confidence <= 0.7));
        assert_eq!(calls[0].source_name, "src/app.ts:a");
        assert_eq!(calls[0].target_name, "b");
    }

    #[test]
    fn class_heritage_produces_extends_and_implements() {
        let out = extract("interface Writer {}\nclass FileWriter extends Base implements Writer {}");
        let kinds: Vec<EdgeKind> = out.edges.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EdgeKind::Extends));
        assert!(kinds.contains(&EdgeKind::Implements));
    }

    #[test]
    fn jsdoc_becomes_docstring() {
        let out = extract("/** Adds two numbers. */\nfunction add(a: number, b: number) { return a + b }");
        assert_eq!(out.symbols[0].docstring.as_deref(), Some("Adds two numbers."));
    }
}
