use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::types::ChunkKind;
use tree_sitter::{Node, Parser};

/// A top-level declaration found in the source, by line span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Decl {
    /// Start line (1-indexed)
    pub start_line: usize,
    /// End line (1-indexed, inclusive)
    pub end_line: usize,
    pub kind: ChunkKind,
}

/// Parse the file and list its top-level declaration spans in source order.
///
/// Only declarations that open at the file's top level are reported; bodies
/// are never descended into, so the spans are non-overlapping (a span that
/// would overlap its predecessor is dropped).
pub(crate) fn declarations(content: &str, language: Language) -> Result<Vec<Decl>> {
    let ts_language = language.tree_sitter_language()?;
    let mut parser = Parser::new();
    parser
        .set_language(&ts_language)
        .map_err(|e| ChunkerError::tree_sitter(format!("Failed to set language: {e}")))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| ChunkerError::parse("Failed to parse source code"))?;

    let root = tree.root_node();
    let mut decls = Vec::new();
    let mut cursor = root.walk();

    for child in root.children(&mut cursor) {
        if let Some(kind) = declaration_kind(language, &child) {
            let start_line = child.start_position().row + 1;
            let end_line = child.end_position().row + 1;

            // Drop anything that would overlap the previous span.
            let clear = decls
                .last()
                .map_or(true, |prev: &Decl| start_line > prev.end_line);
            if clear {
                decls.push(Decl {
                    start_line,
                    end_line,
                    kind,
                });
            }
        }
    }

    Ok(decls)
}

/// Map a top-level AST node to the kind of chunk it opens.
fn declaration_kind(language: Language, node: &Node) -> Option<ChunkKind> {
    let kind = node.kind();
    match language {
        Language::Rust => match kind {
            "function_item" => Some(ChunkKind::Function),
            "struct_item" | "enum_item" | "impl_item" | "trait_item" | "mod_item" => {
                Some(ChunkKind::Class)
            }
            _ => None,
        },
        Language::Python => match kind {
            "function_definition" | "decorated_definition" => Some(ChunkKind::Function),
            "class_definition" => Some(ChunkKind::Class),
            _ => None,
        },
        Language::JavaScript | Language::TypeScript => match kind {
            "function_declaration" | "generator_function_declaration" | "method_definition" => {
                Some(ChunkKind::Function)
            }
            "class_declaration" | "interface_declaration" | "enum_declaration" => {
                Some(ChunkKind::Class)
            }
            "export_statement" => exported_declaration_kind(language, node),
            _ => None,
        },
        _ => None,
    }
}

/// `export function f() {}` wraps the declaration in an export_statement;
/// classify by the exported node so exports chunk like their plain forms.
fn exported_declaration_kind(language: Language, node: &Node) -> Option<ChunkKind> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "export" | "default" => continue,
            _ => return declaration_kind(language, &child),
        }
    }
    None
}
