use crate::db::BatchTx;
use crate::indexer::loader::{LoadedFile, LoadedPackage, Loader};
use crate::indexer::syntax::{
    call_arguments, extract_string_literal, is_exported, named_children, node_text, split_selector,
};
use crate::model::{Entrypoint, EntrypointType, SymbolId};
use anyhow::{Context, Result};
use serde::Serialize;
use tree_sitter::Node;

#[derive(Debug, Serialize)]
pub struct HttpMeta {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct GrpcMeta {
    pub service: String,
    pub method: String,
}

#[derive(Debug, Serialize)]
pub struct CliMeta {
    pub command: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub uses_run_e: bool,
}

#[derive(Debug, Default)]
pub struct DetectResult {
    pub http_count: usize,
    pub grpc_count: usize,
    pub cli_count: usize,
    pub main_count: usize,
    pub total_count: usize,
}

/// Scans declaration syntax for known routing and command registration
/// patterns and binds each match to an extracted symbol.
pub struct EntrypointDetector<'a> {
    loader: &'a Loader,
}

impl<'a> EntrypointDetector<'a> {
    pub fn new(loader: &'a Loader) -> Self {
        Self { loader }
    }

    /// Find all entrypoints and persist them through the batch.
    pub fn detect(&self, batch: &BatchTx<'_>) -> Result<DetectResult> {
        let mut result = DetectResult::default();

        for pkg in self.loader.packages() {
            for file in &pkg.files {
                result.http_count += self
                    .detect_http(pkg, file, batch)
                    .with_context(|| format!("detecting HTTP entrypoints in {}", file.rel_path))?;
                result.grpc_count += self
                    .detect_grpc(pkg, file, batch)
                    .with_context(|| format!("detecting gRPC entrypoints in {}", file.rel_path))?;
                result.cli_count += self
                    .detect_cobra(pkg, file, batch)
                    .with_context(|| format!("detecting CLI entrypoints in {}", file.rel_path))?;
                result.main_count += self
                    .detect_main(pkg, file, batch)
                    .with_context(|| format!("detecting main entrypoints in {}", file.rel_path))?;
            }
        }

        result.total_count =
            result.http_count + result.grpc_count + result.cli_count + result.main_count;
        Ok(result)
    }

    /// HTTP route registrations: stdlib HandleFunc/Handle, chi-style verb
    /// methods, gin-style uppercase verbs, Method, and Any.
    fn detect_http(
        &self,
        pkg: &LoadedPackage,
        file: &LoadedFile,
        batch: &BatchTx<'_>,
    ) -> Result<usize> {
        let source = &file.source;
        let mut count = 0;

        let mut calls = Vec::new();
        collect_kind(file.tree.root_node(), "call_expression", &mut calls);

        for call in calls {
            let Some(function) = call.child_by_field_name("function") else {
                continue;
            };
            let Some((_, method_name)) = split_selector(function, source) else {
                continue;
            };
            let args = call_arguments(call);

            let (method, path, handler) = match method_name.as_str() {
                "HandleFunc" | "Handle" if args.len() >= 2 => (
                    "ANY".to_string(),
                    extract_string_literal(args[0], source),
                    Some(args[1]),
                ),
                "Get" | "Post" | "Put" | "Delete" | "Patch" | "Options" | "Head" | "Connect"
                | "Trace"
                    if args.len() >= 2 =>
                {
                    (
                        method_name.to_uppercase(),
                        extract_string_literal(args[0], source),
                        Some(args[1]),
                    )
                }
                "GET" | "POST" | "PUT" | "DELETE" | "PATCH" | "OPTIONS" | "HEAD"
                    if args.len() >= 2 =>
                {
                    (
                        method_name.clone(),
                        extract_string_literal(args[0], source),
                        Some(args[1]),
                    )
                }
                "Method" if args.len() >= 3 => (
                    extract_string_literal(args[0], source),
                    extract_string_literal(args[1], source),
                    Some(args[2]),
                ),
                "Any" if args.len() >= 2 => (
                    "ANY".to_string(),
                    extract_string_literal(args[0], source),
                    Some(args[1]),
                ),
                _ => continue,
            };

            let Some(handler) = handler else { continue };
            if path.is_empty() {
                continue;
            }
            let Some(symbol_id) = self.resolve_handler_symbol(pkg, file, handler, batch)? else {
                continue;
            };

            let meta = HttpMeta {
                method: method.clone(),
                path: path.clone(),
            };
            batch.insert_entrypoint(&Entrypoint {
                id: 0,
                ep_type: EntrypointType::Http,
                label: format!("{method} {path}"),
                symbol_id,
                meta_json: serde_json::to_string(&meta)?,
                discovery_method: "router".to_string(),
            })?;
            count += 1;
        }

        Ok(count)
    }

    /// gRPC service registrations: `Register<Svc>Server(srv, impl)` calls,
    /// then one entrypoint per service-shaped method on the impl type.
    fn detect_grpc(
        &self,
        pkg: &LoadedPackage,
        file: &LoadedFile,
        batch: &BatchTx<'_>,
    ) -> Result<usize> {
        let source = &file.source;
        let mut count = 0;

        let mut calls = Vec::new();
        collect_kind(file.tree.root_node(), "call_expression", &mut calls);

        struct Registration<'t> {
            service: String,
            impl_expr: Node<'t>,
        }
        let mut registrations = Vec::new();

        for call in calls {
            let Some(function) = call.child_by_field_name("function") else {
                continue;
            };
            let func_name = match function.kind() {
                "identifier" => node_text(function, source),
                "selector_expression" => match split_selector(function, source) {
                    Some((_, name)) => name,
                    None => continue,
                },
                _ => continue,
            };
            let Some(service) = func_name
                .strip_prefix("Register")
                .and_then(|rest| rest.strip_suffix("Server"))
            else {
                continue;
            };
            if service.is_empty() {
                continue;
            }
            let args = call_arguments(call);
            if args.len() >= 2 {
                registrations.push(Registration {
                    service: service.to_string(),
                    impl_expr: args[1],
                });
            }
        }

        for reg in registrations {
            let impl_type = resolve_expr_type_name(reg.impl_expr, source);
            if impl_type.is_empty() {
                continue;
            }

            for method_name in self.find_service_methods(pkg, &impl_type) {
                let symbol_id = match batch.get_symbol_id(&pkg.pkg_path, &method_name, &impl_type)? {
                    Some(id) => id,
                    None => match batch.get_symbol_id(
                        &pkg.pkg_path,
                        &method_name,
                        &format!("*{impl_type}"),
                    )? {
                        Some(id) => id,
                        None => continue,
                    },
                };

                let meta = GrpcMeta {
                    service: reg.service.clone(),
                    method: method_name.clone(),
                };
                batch.insert_entrypoint(&Entrypoint {
                    id: 0,
                    ep_type: EntrypointType::Grpc,
                    label: format!("{}/{}", reg.service, method_name),
                    symbol_id,
                    meta_json: serde_json::to_string(&meta)?,
                    discovery_method: "router".to_string(),
                })?;
                count += 1;
            }
        }

        Ok(count)
    }

    /// Methods on a type shaped like gRPC handlers: at least two params and
    /// two results, exported, and not the generated embedding stub.
    fn find_service_methods(&self, pkg: &LoadedPackage, type_name: &str) -> Vec<String> {
        let base = type_name.trim_start_matches('*');
        let Some(methods) = pkg.types.methods.get(base) else {
            return Vec::new();
        };
        methods
            .iter()
            .filter(|m| {
                m.func.params.len() >= 2
                    && m.func.results.len() >= 2
                    && is_exported(&m.func.name)
                    && !m.func.name.starts_with("mustEmbedUnimplemented")
            })
            .map(|m| m.func.name.clone())
            .collect()
    }

    /// Cobra command definitions: `&cobra.Command{Use: ..., Run/RunE: ...}`.
    fn detect_cobra(
        &self,
        pkg: &LoadedPackage,
        file: &LoadedFile,
        batch: &BatchTx<'_>,
    ) -> Result<usize> {
        let source = &file.source;
        let mut count = 0;

        let mut literals = Vec::new();
        collect_kind(file.tree.root_node(), "composite_literal", &mut literals);

        for lit in literals {
            if !is_cobra_command_type(lit, source) {
                continue;
            }
            // Only address-taken literals register commands.
            let addressed = lit
                .parent()
                .is_some_and(|p| p.kind() == "unary_expression" && node_text(p, source).starts_with('&'));
            if !addressed {
                continue;
            }

            let mut use_value = String::new();
            let mut run_handler: Option<Node<'_>> = None;
            let mut run_e_handler: Option<Node<'_>> = None;

            if let Some(body) = lit.child_by_field_name("body") {
                for element in named_children(body) {
                    if element.kind() != "keyed_element" {
                        continue;
                    }
                    let children = named_children(element);
                    if children.len() < 2 {
                        continue;
                    }
                    let key = node_text(children[0], source);
                    // Values sit inside a literal_element wrapper.
                    let mut value = children[children.len() - 1];
                    if value.kind() == "literal_element" {
                        if let Some(inner) = named_children(value).into_iter().next() {
                            value = inner;
                        }
                    }
                    match key.as_str() {
                        "Use" => use_value = extract_string_literal_deep(value, source),
                        "Run" => run_handler = Some(value),
                        "RunE" => run_e_handler = Some(value),
                        _ => {}
                    }
                }
            }

            if use_value.is_empty() || (run_handler.is_none() && run_e_handler.is_none()) {
                continue;
            }

            let (handler, uses_run_e) = match run_e_handler {
                Some(handler) => (handler, true),
                None => (run_handler.unwrap(), false),
            };

            let Some(symbol_id) = self.resolve_handler_symbol(pkg, file, handler, batch)? else {
                continue;
            };

            let command = use_value
                .split_whitespace()
                .next()
                .unwrap_or(&use_value)
                .to_string();
            let meta = CliMeta {
                command: command.clone(),
                uses_run_e,
            };
            batch.insert_entrypoint(&Entrypoint {
                id: 0,
                ep_type: EntrypointType::Cli,
                label: command,
                symbol_id,
                meta_json: serde_json::to_string(&meta)?,
                discovery_method: "router".to_string(),
            })?;
            count += 1;
        }

        Ok(count)
    }

    /// Top-level `func main()` in a `main` package.
    fn detect_main(
        &self,
        pkg: &LoadedPackage,
        file: &LoadedFile,
        batch: &BatchTx<'_>,
    ) -> Result<usize> {
        if pkg.name != "main" {
            return Ok(0);
        }
        let source = &file.source;
        let mut count = 0;

        for decl in named_children(file.tree.root_node()) {
            if decl.kind() != "function_declaration" {
                continue;
            }
            let Some(name_node) = decl.child_by_field_name("name") else {
                continue;
            };
            if node_text(name_node, source) != "main" {
                continue;
            }
            let Some(symbol_id) = batch.get_symbol_id(&pkg.pkg_path, "main", "")? else {
                continue;
            };
            batch.insert_entrypoint(&Entrypoint {
                id: 0,
                ep_type: EntrypointType::Main,
                label: "main".to_string(),
                symbol_id,
                meta_json: String::new(),
                discovery_method: "router".to_string(),
            })?;
            count += 1;
        }

        Ok(count)
    }

    /// Resolve a handler expression to a symbol id: bare identifier, method
    /// value `recv.Method`, or imported `pkg.Func`. Anonymous functions
    /// cannot be attributed.
    fn resolve_handler_symbol(
        &self,
        pkg: &LoadedPackage,
        file: &LoadedFile,
        expr: Node<'_>,
        batch: &BatchTx<'_>,
    ) -> Result<Option<SymbolId>> {
        let source = &file.source;
        match expr.kind() {
            "identifier" => batch.get_symbol_id(&pkg.pkg_path, &node_text(expr, source), ""),
            "selector_expression" => {
                let Some((operand, method)) = split_selector(expr, source) else {
                    return Ok(None);
                };
                if operand.kind() != "identifier" {
                    return Ok(None);
                }
                let recv = node_text(operand, source);

                if let Some(id) = batch.get_symbol_id(&pkg.pkg_path, &method, &recv)? {
                    return Ok(Some(id));
                }
                if let Some(id) =
                    batch.get_symbol_id(&pkg.pkg_path, &method, &format!("*{recv}"))?
                {
                    return Ok(Some(id));
                }
                if let Some(import_path) = file.imports.get(&recv) {
                    if let Some(id) = batch.get_symbol_id(import_path, &method, "")? {
                        return Ok(Some(id));
                    }
                }
                Ok(None)
            }
            "func_literal" => Ok(None),
            "parenthesized_expression" => match named_children(expr).into_iter().next() {
                Some(inner) => self.resolve_handler_symbol(pkg, file, inner, batch),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }
}

/// Collect all descendant nodes of a kind, in document order. Function
/// literal bodies are included; route registrations inside closures are
/// still registrations.
fn collect_kind<'tree>(node: Node<'tree>, kind: &str, out: &mut Vec<Node<'tree>>) {
    if node.kind() == kind {
        out.push(node);
    }
    for child in named_children(node) {
        collect_kind(child, kind, out);
    }
}

fn is_cobra_command_type(lit: Node<'_>, source: &str) -> bool {
    let Some(type_node) = lit.child_by_field_name("type") else {
        return false;
    };
    if type_node.kind() != "qualified_type" {
        return false;
    }
    let package = type_node
        .child_by_field_name("package")
        .map(|n| node_text(n, source))
        .unwrap_or_default();
    let name = type_node
        .child_by_field_name("name")
        .map(|n| node_text(n, source))
        .unwrap_or_default();
    package == "cobra" && name == "Command"
}

/// The bare type name of an expression used as a registration argument:
/// `impl`, `&Impl{}`, `Impl{}`, or `pkg.Impl`.
fn resolve_expr_type_name(expr: Node<'_>, source: &str) -> String {
    match expr.kind() {
        "identifier" | "type_identifier" => node_text(expr, source),
        "unary_expression" => {
            let text = node_text(expr, source);
            if text.starts_with('&') {
                named_children(expr)
                    .into_iter()
                    .next()
                    .map(|inner| resolve_expr_type_name(inner, source))
                    .unwrap_or_default()
            } else {
                String::new()
            }
        }
        "composite_literal" => expr
            .child_by_field_name("type")
            .map(|t| node_text(t, source))
            .unwrap_or_default(),
        "selector_expression" => node_text(expr, source),
        "parenthesized_expression" => named_children(expr)
            .into_iter()
            .next()
            .map(|inner| resolve_expr_type_name(inner, source))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// String literal extraction that sees through one level of nesting, for
/// composite-literal values.
fn extract_string_literal_deep(node: Node<'_>, source: &str) -> String {
    let direct = extract_string_literal(node, source);
    if !direct.is_empty() {
        return direct;
    }
    for child in named_children(node) {
        let nested = extract_string_literal(child, source);
        if !nested.is_empty() {
            return nested;
        }
    }
    String::new()
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
    fn cobra_command_type_detection() {
        let source = r#"
package main

var a = &cobra.Command{Use: "x"}
var b = &other.Command{Use: "x"}
var c = &cobra.Flag{}
"#;
        let tree = parse(source);
        let mut literals = Vec::new();
        collect_kind(tree.root_node(), "composite_literal", &mut literals);
        assert_eq!(literals.len(), 3);
        assert!(is_cobra_command_type(literals[0], source));
        assert!(!is_cobra_command_type(literals[1], source));
        assert!(!is_cobra_command_type(literals[2], source));
    }

    #[test]
    fn registration_argument_type_names() {
        let source = r#"
package main

func main() {
	Register(a, impl)
	Register(a, &Impl{})
	Register(a, Impl{})
}
"#;
        let tree = parse(source);
        let mut calls = Vec::new();
        collect_kind(tree.root_node(), "call_expression", &mut calls);
        let names: Vec<String> = calls
            .iter()
            .map(|call| {
                let args = call_arguments(*call);
                resolve_expr_type_name(args[1], source)
            })
            .collect();
        assert_eq!(names, vec!["impl", "Impl", "Impl"]);
    }
}
