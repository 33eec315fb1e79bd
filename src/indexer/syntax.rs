//! Shared tree-sitter helpers for the Go syntax passes.

use tree_sitter::Node;

pub fn node_text(node: Node<'_>, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// 1-based line of a node's start position.
pub fn line(node: Node<'_>) -> i64 {
    node.start_position().row as i64 + 1
}

pub fn named_children<'tree>(node: Node<'tree>) -> Vec<Node<'tree>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Unquote a Go string literal (interpreted or raw). Returns None for
/// non-literal expressions.
pub fn unquote_go_string(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() < 2 {
        return None;
    }
    if trimmed.starts_with('"') && trimmed.ends_with('"') {
        return Some(trimmed[1..trimmed.len() - 1].to_string());
    }
    if trimmed.starts_with('`') && trimmed.ends_with('`') {
        return Some(trimmed[1..trimmed.len() - 1].to_string());
    }
    None
}

/// Extract a string value from an expression node, or empty when it is not
/// a string literal.
pub fn extract_string_literal(node: Node<'_>, source: &str) -> String {
    if node.kind() == "interpreted_string_literal" || node.kind() == "raw_string_literal" {
        return unquote_go_string(&node_text(node, source)).unwrap_or_default();
    }
    String::new()
}

/// Whether a Go identifier is exported.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Split a selector expression into (operand text, field name).
pub fn split_selector<'tree>(
    node: Node<'tree>,
    source: &str,
) -> Option<(Node<'tree>, String)> {
    if node.kind() != "selector_expression" {
        return None;
    }
    let operand = node.child_by_field_name("operand")?;
    let field = node.child_by_field_name("field")?;
    Some((operand, node_text(field, source)))
}

/// Arguments of a call expression, in order.
pub fn call_arguments<'tree>(node: Node<'tree>) -> Vec<Node<'tree>> {
    let Some(arg_list) = node.child_by_field_name("arguments") else {
        return Vec::new();
    };
    named_children(arg_list)
}

/// Format a method receiver type per the symbol model: identifier, `*`
/// prefix iff pointer receiver, `Name[...]` for generic receivers.
pub fn format_receiver_type(type_node: Node<'_>, source: &str) -> String {
    match type_node.kind() {
        "pointer_type" => {
            let inner = named_children(type_node)
                .into_iter()
                .next()
                .map(|n| format_receiver_type(n, source))
                .unwrap_or_default();
            format!("*{inner}")
        }
        "generic_type" => {
            let base = type_node
                .child_by_field_name("type")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            format!("{base}[...]")
        }
        "type_identifier" => node_text(type_node, source),
        _ => node_text(type_node, source),
    }
}

/// Receiver type of a method declaration, normalized.
pub fn method_receiver_type(method_node: Node<'_>, source: &str) -> Option<String> {
    let receiver = method_node.child_by_field_name("receiver")?;
    for child in named_children(receiver) {
        if child.kind() == "parameter_declaration" {
            if let Some(type_node) = child.child_by_field_name("type") {
                let formatted = format_receiver_type(type_node, source);
                if !formatted.is_empty() {
                    return Some(formatted);
                }
            }
        }
    }
    None
}

/// Receiver variable name of a method declaration, when named.
pub fn method_receiver_name(method_node: Node<'_>, source: &str) -> Option<String> {
    let receiver = method_node.child_by_field_name("receiver")?;
    for child in named_children(receiver) {
        if child.kind() == "parameter_declaration" {
            if let Some(name_node) = child.child_by_field_name("name") {
                let name = node_text(name_node, source);
                if !name.is_empty() && name != "_" {
                    return Some(name);
                }
            }
        }
    }
    None
}

/// Compact `(params) -> results` signature text for a function or method.
pub fn function_signature(node: Node<'_>, source: &str) -> String {
    let params = node
        .child_by_field_name("parameters")
        .map(|n| node_text(n, source))
        .unwrap_or_else(|| "()".to_string());
    match node.child_by_field_name("result") {
        Some(result) => format!("{} {}", params, node_text(result, source)),
        None => params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(source: &str) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn unquotes_interpreted_and_raw_strings() {
        assert_eq!(unquote_go_string("\"/users\""), Some("/users".to_string()));
        assert_eq!(unquote_go_string("`raw`"), Some("raw".to_string()));
        assert_eq!(unquote_go_string("pathVar"), None);
    }

    #[test]
    fn receiver_types_normalize() {
        let source = r#"
package main

func (s *Server) Handle() {}
func (u User) Name() string { return "" }
func (c Cache[K]) Get() {}
"#;
        let tree = parse(source);
        let root = tree.root_node();
        let methods: Vec<_> = named_children(root)
            .into_iter()
            .filter(|n| n.kind() == "method_declaration")
            .collect();
        assert_eq!(
            method_receiver_type(methods[0], source),
            Some("*Server".to_string())
        );
        assert_eq!(
            method_receiver_type(methods[1], source),
            Some("User".to_string())
        );
        assert_eq!(
            method_receiver_type(methods[2], source),
            Some("Cache[...]".to_string())
        );
    }

    #[test]
    fn exported_check() {
        assert!(is_exported("Handle"));
        assert!(!is_exported("handle"));
        assert!(!is_exported(""));
    }
}
