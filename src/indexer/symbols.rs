use crate::config::Config;
use crate::db::{BatchTx, Store};
use crate::indexer::loader::{LoadedFile, LoadedPackage, Loader};
use crate::indexer::syntax::{
    function_signature, line, method_receiver_type, named_children, node_text,
};
use crate::model::{Package, Symbol, SymbolKind};
use anyhow::{Context, Result};
use tree_sitter::Node;

/// Walk declarations of every loaded package and persist one symbol per
/// top-level declaration, along with the package records. Everything goes
/// through a single batched transaction.
pub fn extract_symbols(loader: &Loader, cfg: &Config, store: &Store) -> Result<usize> {
    let batch = store.begin_batch().context("starting symbol batch")?;
    let mut count = 0;

    for pkg in loader.packages() {
        let layer = cfg
            .layer_for_package(&pkg.pkg_path)
            .unwrap_or_default()
            .to_string();
        batch
            .insert_package(&Package {
                pkg_path: pkg.pkg_path.clone(),
                module: pkg.module.clone(),
                dir: pkg.dir.clone(),
                layer,
            })
            .with_context(|| format!("inserting package {}", pkg.pkg_path))?;

        for file in &pkg.files {
            count += extract_file_symbols(&batch, pkg, file)
                .with_context(|| format!("extracting symbols from {}", file.rel_path))?;
        }
    }

    batch.commit().context("committing symbol batch")?;
    Ok(count)
}

fn extract_file_symbols(
    batch: &BatchTx<'_>,
    pkg: &LoadedPackage,
    file: &LoadedFile,
) -> Result<usize> {
    let source = &file.source;
    let root = file.tree.root_node();
    let mut count = 0;

    for decl in named_children(root) {
        match decl.kind() {
            "function_declaration" => {
                let Some(name_node) = decl.child_by_field_name("name") else {
                    continue;
                };
                batch.insert_symbol(&Symbol {
                    id: 0,
                    pkg_path: pkg.pkg_path.clone(),
                    name: node_text(name_node, source),
                    kind: SymbolKind::Func,
                    recv_type: String::new(),
                    file: file.rel_path.clone(),
                    line: line(decl),
                    sig: function_signature(decl, source),
                })?;
                count += 1;
            }
            "method_declaration" => {
                let Some(name_node) = decl.child_by_field_name("name") else {
                    continue;
                };
                let recv_type = method_receiver_type(decl, source).unwrap_or_default();
                batch.insert_symbol(&Symbol {
                    id: 0,
                    pkg_path: pkg.pkg_path.clone(),
                    name: node_text(name_node, source),
                    kind: SymbolKind::Method,
                    recv_type,
                    file: file.rel_path.clone(),
                    line: line(decl),
                    sig: function_signature(decl, source),
                })?;
                count += 1;
            }
            "type_declaration" => {
                for spec in named_children(decl) {
                    if spec.kind() != "type_spec" {
                        continue;
                    }
                    let Some(name_node) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    batch.insert_symbol(&Symbol {
                        id: 0,
                        pkg_path: pkg.pkg_path.clone(),
                        name: node_text(name_node, source),
                        kind: SymbolKind::Type,
                        recv_type: String::new(),
                        file: file.rel_path.clone(),
                        line: line(spec),
                        sig: String::new(),
                    })?;
                    count += 1;
                }
            }
            "var_declaration" => {
                count += extract_value_specs(batch, pkg, file, decl, SymbolKind::Var)?;
            }
            "const_declaration" => {
                count += extract_value_specs(batch, pkg, file, decl, SymbolKind::Const)?;
            }
            _ => {}
        }
    }

    Ok(count)
}

fn extract_value_specs(
    batch: &BatchTx<'_>,
    pkg: &LoadedPackage,
    file: &LoadedFile,
    decl: Node<'_>,
    kind: SymbolKind,
) -> Result<usize> {
    let source = &file.source;
    let mut count = 0;
    for spec in named_children(decl) {
        if spec.kind() != "var_spec" && spec.kind() != "const_spec" {
            continue;
        }
        for idx in 0..spec.child_count() {
            let Some(child) = spec.child(idx) else {
                continue;
            };
            if spec.field_name_for_child(idx as u32) != Some("name") {
                continue;
            }
            let name = node_text(child, source);
            if name.is_empty() || name == "_" {
                continue;
            }
            batch.insert_symbol(&Symbol {
                id: 0,
                pkg_path: pkg.pkg_path.clone(),
                name,
                kind,
                recv_type: String::new(),
                file: file.rel_path.clone(),
                line: line(child),
                sig: String::new(),
            })?;
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn indexed_project(files: &[(&str, &str)]) -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let cfg = Config::default();
        let mut loader = Loader::new(cfg.clone(), dir.path());
        loader.load().unwrap();
        let store = Store::open(dir.path()).unwrap();
        extract_symbols(&loader, &cfg, &store).unwrap();
        (dir, store)
    }

    #[test]
    fn extracts_all_declaration_kinds() {
        let (_dir, store) = indexed_project(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

type Server struct{}

type Handler interface {
    Serve()
}

const MaxConns = 10

var defaultServer = &Server{}

func main() {}

func (s *Server) Serve() {}
"#,
            ),
        ]);

        let lookup = |name: &str, recv: &str| {
            store.get_symbol_id("myapp", name, recv).unwrap()
        };
        assert!(lookup("main", "").is_some());
        assert!(lookup("Serve", "*Server").is_some());
        assert!(lookup("Server", "").is_some());
        assert!(lookup("Handler", "").is_some());
        assert!(lookup("MaxConns", "").is_some());
        assert!(lookup("defaultServer", "").is_some());
        assert!(lookup("Serve", "").is_none());
    }

    #[test]
    fn package_layer_resolved_from_config() {
        let (_dir, store) = indexed_project(&[
            ("go.mod", "module myapp\n"),
            ("main.go", "package main\n\nfunc main() {}\n"),
            (
                "internal/handlers/user.go",
                "package handlers\n\nfunc HandleUser() {}\n",
            ),
        ]);

        let pkg = store
            .get_package_by_path("myapp/internal/handlers")
            .unwrap()
            .unwrap();
        assert_eq!(pkg.layer, "handler");
        let root = store.get_package_by_path("myapp").unwrap().unwrap();
        assert_eq!(root.layer, "");
    }
}
