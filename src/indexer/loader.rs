use crate::config::Config;
use crate::indexer::syntax::{
    self, function_signature, method_receiver_type, named_children, node_text,
};
use anyhow::{Context, Result, bail};
use ignore::WalkBuilder;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser, Tree};

/// A resolved reference to a named type: the package that declares it (when
/// known), the bare type name, and pointer-ness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub pkg_path: Option<String>,
    pub name: String,
    pub pointer: bool,
}

impl TypeRef {
    /// The receiver-type spelling for symbol lookups: `*Name` or `Name`.
    pub fn recv_spelling(&self) -> String {
        if self.pointer {
            format!("*{}", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub type_text: String,
    pub type_ref: Option<TypeRef>,
}

#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub results: Vec<ParamInfo>,
    pub sig: String,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Receiver spelling with `*` for pointer receivers, e.g. `*UserStore`.
    pub recv_type: String,
    pub func: FuncInfo,
}

#[derive(Debug, Clone, Default)]
pub struct StructInfo {
    pub fields: HashMap<String, TypeRef>,
}

#[derive(Debug, Clone, Default)]
pub struct InterfaceInfo {
    pub methods: Vec<String>,
}

/// Syntax-derived type information for one package.
#[derive(Debug, Default)]
pub struct PackageTypes {
    pub structs: HashMap<String, StructInfo>,
    pub interfaces: HashMap<String, InterfaceInfo>,
    pub functions: HashMap<String, FuncInfo>,
    /// Base type name (no `*`) → methods declared on it.
    pub methods: HashMap<String, Vec<MethodInfo>>,
}

impl PackageTypes {
    /// Look up a method on a base type name, ignoring receiver pointer-ness.
    pub fn find_method(&self, base_type: &str, method: &str) -> Option<&MethodInfo> {
        self.methods
            .get(base_type)?
            .iter()
            .find(|m| m.func.name == method)
    }
}

pub struct LoadedFile {
    /// Project-relative path, e.g. `internal/api/user.go`.
    pub rel_path: String,
    pub source: String,
    pub tree: Tree,
    pub package_name: String,
    /// Import alias → import path for this file.
    pub imports: HashMap<String, String>,
}

pub struct LoadedPackage {
    pub pkg_path: String,
    /// Package clause name (`main`, `api`, ...).
    pub name: String,
    /// Absolute directory of the package.
    pub dir: String,
    pub module: String,
    pub files: Vec<LoadedFile>,
    pub types: PackageTypes,
}

/// Loads every Go source unit under a project root with syntax trees and
/// syntax-derived type tables. Parse failures are tolerated per file; a
/// package with no successfully parsed files is skipped.
pub struct Loader {
    cfg: Config,
    project_dir: PathBuf,
    module: String,
    packages: Vec<LoadedPackage>,
    errors: Vec<String>,
}

impl Loader {
    pub fn new(cfg: Config, project_dir: &Path) -> Self {
        Self {
            cfg,
            project_dir: project_dir.to_path_buf(),
            module: String::new(),
            packages: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn packages(&self) -> &[LoadedPackage] {
        &self.packages
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn package_by_path(&self, pkg_path: &str) -> Option<&LoadedPackage> {
        self.packages.iter().find(|p| p.pkg_path == pkg_path)
    }

    pub fn is_project_package(&self, pkg_path: &str) -> bool {
        self.package_by_path(pkg_path).is_some()
    }

    /// Load all Go packages from the project directory.
    pub fn load(&mut self) -> Result<()> {
        self.module = read_module_path(&self.project_dir);

        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .context("loading Go grammar")?;

        // Group files by their package directory, sorted for determinism.
        let mut by_dir: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for entry in WalkBuilder::new(&self.project_dir).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.errors.push(err.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".go") || name.ends_with("_test.go") {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&self.project_dir) else {
                continue;
            };
            let rel_path = rel.to_string_lossy().replace('\\', "/");
            let rel_dir = rel
                .parent()
                .map(|d| d.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            if !rel_dir.is_empty() && self.cfg.is_excluded_dir(&rel_dir) {
                continue;
            }
            if self.cfg.is_excluded_file(&rel_path) {
                continue;
            }
            by_dir.entry(rel_dir).or_default().push(path.to_path_buf());
        }

        if by_dir.is_empty() {
            bail!(
                "no Go source files found under {}",
                self.project_dir.display()
            );
        }

        for (rel_dir, mut paths) in by_dir {
            paths.sort();
            let pkg_path = if rel_dir.is_empty() {
                self.module.clone()
            } else {
                format!("{}/{}", self.module, rel_dir)
            };

            let mut files = Vec::new();
            for path in &paths {
                match self.parse_file(&mut parser, path) {
                    Ok(file) => files.push(file),
                    Err(err) => self.errors.push(format!("{pkg_path}: {err:#}")),
                }
            }
            if files.is_empty() {
                continue;
            }

            let name = files
                .iter()
                .map(|f| f.package_name.clone())
                .find(|n| !n.is_empty())
                .unwrap_or_else(|| "main".to_string());

            let types = collect_package_types(&pkg_path, &files);
            let dir = self
                .project_dir
                .join(&rel_dir)
                .to_string_lossy()
                .to_string();

            self.packages.push(LoadedPackage {
                pkg_path,
                name,
                dir,
                module: self.module.clone(),
                files,
                types,
            });
        }

        Ok(())
    }

    fn parse_file(&self, parser: &mut Parser, path: &Path) -> Result<LoadedFile> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let tree = parser
            .parse(&source, None)
            .with_context(|| format!("parsing {}", path.display()))?;
        let root = tree.root_node();
        if root.has_error() {
            bail!("{} contains syntax errors", path.display());
        }

        let rel_path = path
            .strip_prefix(&self.project_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let package_name = package_clause_name(root, &source);
        let imports = collect_imports(root, &source);

        Ok(LoadedFile {
            rel_path,
            source,
            tree,
            package_name,
            imports,
        })
    }
}

/// The `module` directive from `go.mod`, or the project directory name.
fn read_module_path(project_dir: &Path) -> String {
    if let Ok(gomod) = std::fs::read_to_string(project_dir.join("go.mod")) {
        for line in gomod.lines() {
            if let Some(rest) = line.trim().strip_prefix("module ") {
                let module = rest.trim().trim_matches('"');
                if !module.is_empty() {
                    return module.to_string();
                }
            }
        }
    }
    project_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "main".to_string())
}

fn package_clause_name(root: Node<'_>, source: &str) -> String {
    for child in named_children(root) {
        if child.kind() == "package_clause" {
            for inner in named_children(child) {
                if inner.kind() == "package_identifier" {
                    return node_text(inner, source);
                }
            }
        }
    }
    String::new()
}

fn collect_imports(root: Node<'_>, source: &str) -> HashMap<String, String> {
    let mut imports = HashMap::new();
    for child in named_children(root) {
        if child.kind() == "import_declaration" {
            collect_import_specs(child, source, &mut imports);
        }
    }
    imports
}

fn collect_import_specs(node: Node<'_>, source: &str, imports: &mut HashMap<String, String>) {
    if node.kind() == "import_spec" {
        let Some(path_node) = node.child_by_field_name("path") else {
            return;
        };
        let Some(path) = syntax::unquote_go_string(&node_text(path_node, source)) else {
            return;
        };
        let alias = match node.child_by_field_name("name") {
            Some(name_node) => node_text(name_node, source),
            None => path.rsplit('/').next().unwrap_or(&path).to_string(),
        };
        if alias != "_" && alias != "." {
            imports.insert(alias, path);
        }
        return;
    }
    for child in named_children(node) {
        collect_import_specs(child, source, imports);
    }
}

/// Resolve a type expression to a `TypeRef` in the context of a file's
/// imports and the current package. Composite types (slices, maps, funcs,
/// channels) resolve to their raw text with no package.
pub fn parse_type_ref(
    node: Node<'_>,
    source: &str,
    current_pkg: &str,
    imports: &HashMap<String, String>,
) -> TypeRef {
    match node.kind() {
        "pointer_type" => {
            let inner = named_children(node).into_iter().next();
            match inner {
                Some(inner) => {
                    let mut type_ref = parse_type_ref(inner, source, current_pkg, imports);
                    type_ref.pointer = true;
                    type_ref
                }
                None => TypeRef {
                    pkg_path: None,
                    name: node_text(node, source),
                    pointer: true,
                },
            }
        }
        "type_identifier" => {
            let name = node_text(node, source);
            let pkg_path = if is_builtin_type(&name) {
                None
            } else {
                Some(current_pkg.to_string())
            };
            TypeRef {
                pkg_path,
                name,
                pointer: false,
            }
        }
        "qualified_type" => {
            let package = node
                .child_by_field_name("package")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            TypeRef {
                pkg_path: imports.get(&package).cloned(),
                name,
                pointer: false,
            }
        }
        "generic_type" => {
            let base = node.child_by_field_name("type");
            match base {
                Some(base) => {
                    let mut type_ref = parse_type_ref(base, source, current_pkg, imports);
                    type_ref.name = format!("{}[...]", type_ref.name);
                    type_ref
                }
                None => TypeRef {
                    pkg_path: None,
                    name: node_text(node, source),
                    pointer: false,
                },
            }
        }
        "parenthesized_type" => named_children(node)
            .into_iter()
            .next()
            .map(|inner| parse_type_ref(inner, source, current_pkg, imports))
            .unwrap_or(TypeRef {
                pkg_path: None,
                name: node_text(node, source),
                pointer: false,
            }),
        _ => TypeRef {
            pkg_path: None,
            name: node_text(node, source),
            pointer: false,
        },
    }
}

fn is_builtin_type(name: &str) -> bool {
    matches!(
        name,
        "bool"
            | "string"
            | "int"
            | "int8"
            | "int16"
            | "int32"
            | "int64"
            | "uint"
            | "uint8"
            | "uint16"
            | "uint32"
            | "uint64"
            | "uintptr"
            | "byte"
            | "rune"
            | "float32"
            | "float64"
            | "complex64"
            | "complex128"
            | "error"
            | "any"
    )
}

fn collect_package_types(pkg_path: &str, files: &[LoadedFile]) -> PackageTypes {
    let mut types = PackageTypes::default();

    for file in files {
        let source = &file.source;
        let root = file.tree.root_node();
        for decl in named_children(root) {
            match decl.kind() {
                "type_declaration" => {
                    for spec in named_children(decl) {
                        if spec.kind() == "type_spec" {
                            collect_type_spec(spec, source, pkg_path, file, &mut types);
                        }
                    }
                }
                "function_declaration" => {
                    if let Some(func) = collect_func_info(decl, source, pkg_path, file) {
                        types.functions.insert(func.name.clone(), func);
                    }
                }
                "method_declaration" => {
                    let Some(recv_type) = method_receiver_type(decl, source) else {
                        continue;
                    };
                    let Some(func) = collect_func_info(decl, source, pkg_path, file) else {
                        continue;
                    };
                    let base = recv_type.trim_start_matches('*').to_string();
                    types
                        .methods
                        .entry(base)
                        .or_default()
                        .push(MethodInfo { recv_type, func });
                }
                _ => {}
            }
        }
    }

    types
}

fn collect_type_spec(
    spec: Node<'_>,
    source: &str,
    pkg_path: &str,
    file: &LoadedFile,
    types: &mut PackageTypes,
) {
    let Some(name_node) = spec.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    let Some(type_node) = spec.child_by_field_name("type") else {
        return;
    };

    match type_node.kind() {
        "struct_type" => {
            let mut info = StructInfo::default();
            if let Some(field_list) = find_child(type_node, "field_declaration_list") {
                for field in named_children(field_list) {
                    if field.kind() != "field_declaration" {
                        continue;
                    }
                    let Some(field_type) = field.child_by_field_name("type") else {
                        continue;
                    };
                    let type_ref =
                        parse_type_ref(field_type, source, pkg_path, &file.imports);
                    let mut names = Vec::new();
                    for idx in 0..field.child_count() {
                        if let Some(child) = field.child(idx) {
                            if field.field_name_for_child(idx as u32) == Some("name") {
                                names.push(node_text(child, source));
                            }
                        }
                    }
                    for field_name in names {
                        info.fields.insert(field_name, type_ref.clone());
                    }
                }
            }
            types.structs.insert(name, info);
        }
        "interface_type" => {
            let mut info = InterfaceInfo::default();
            for member in named_children(type_node) {
                // Grammar versions name interface methods differently.
                if member.kind() == "method_elem" || member.kind() == "method_spec" {
                    if let Some(method_name) = member.child_by_field_name("name") {
                        info.methods.push(node_text(method_name, source));
                    }
                }
            }
            types.interfaces.insert(name, info);
        }
        _ => {}
    }
}

fn collect_func_info(
    decl: Node<'_>,
    source: &str,
    pkg_path: &str,
    file: &LoadedFile,
) -> Option<FuncInfo> {
    let name_node = decl.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    if name.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    if let Some(param_list) = decl.child_by_field_name("parameters") {
        collect_params(param_list, source, pkg_path, &file.imports, &mut params);
    }

    let mut results = Vec::new();
    if let Some(result) = decl.child_by_field_name("result") {
        if result.kind() == "parameter_list" {
            collect_params(result, source, pkg_path, &file.imports, &mut results);
        } else {
            let type_ref = parse_type_ref(result, source, pkg_path, &file.imports);
            results.push(ParamInfo {
                name: String::new(),
                type_text: node_text(result, source),
                type_ref: Some(type_ref),
            });
        }
    }

    Some(FuncInfo {
        name,
        params,
        results,
        sig: function_signature(decl, source),
    })
}

fn collect_params(
    param_list: Node<'_>,
    source: &str,
    pkg_path: &str,
    imports: &HashMap<String, String>,
    out: &mut Vec<ParamInfo>,
) {
    for param in named_children(param_list) {
        if param.kind() != "parameter_declaration" && param.kind() != "variadic_parameter_declaration"
        {
            continue;
        }
        let Some(type_node) = param.child_by_field_name("type") else {
            continue;
        };
        let type_text = node_text(type_node, source);
        let type_ref = parse_type_ref(type_node, source, pkg_path, imports);

        let mut names = Vec::new();
        for idx in 0..param.child_count() {
            if let Some(child) = param.child(idx) {
                if param.field_name_for_child(idx as u32) == Some("name") {
                    names.push(node_text(child, source));
                }
            }
        }
        if names.is_empty() {
            // Unnamed parameter, e.g. `func(http.ResponseWriter, *http.Request)`.
            out.push(ParamInfo {
                name: String::new(),
                type_text,
                type_ref: Some(type_ref),
            });
        } else {
            for name in names {
                out.push(ParamInfo {
                    name,
                    type_text: type_text.clone(),
                    type_ref: Some(type_ref.clone()),
                });
            }
        }
    }
}

fn find_child<'tree>(node: Node<'tree>, kind: &str) -> Option<Node<'tree>> {
    named_children(node).into_iter().find(|n| n.kind() == kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    #[test]
    fn loads_packages_with_module_path() {
        let dir = write_project(&[
            ("go.mod", "module example.com/myapp\n\ngo 1.22\n"),
            ("main.go", "package main\n\nfunc main() {}\n"),
            (
                "internal/api/user.go",
                "package api\n\nfunc HandleUsers() {}\n",
            ),
        ]);

        let mut loader = Loader::new(Config::default(), dir.path());
        loader.load().unwrap();

        let paths: Vec<&str> = loader
            .packages()
            .iter()
            .map(|p| p.pkg_path.as_str())
            .collect();
        assert!(paths.contains(&"example.com/myapp"));
        assert!(paths.contains(&"example.com/myapp/internal/api"));
        assert!(loader.errors().is_empty());
    }

    #[test]
    fn skips_test_files_and_excluded_dirs() {
        let dir = write_project(&[
            ("go.mod", "module myapp\n"),
            ("main.go", "package main\n\nfunc main() {}\n"),
            ("main_test.go", "package main\n\nfunc TestMain() {}\n"),
            ("vendor/dep/dep.go", "package dep\n\nfunc Dep() {}\n"),
        ]);

        let mut loader = Loader::new(Config::default(), dir.path());
        loader.load().unwrap();

        assert_eq!(loader.packages().len(), 1);
        assert_eq!(loader.packages()[0].pkg_path, "myapp");
        assert_eq!(loader.packages()[0].files.len(), 1);
    }

    #[test]
    fn tolerates_files_with_syntax_errors() {
        let dir = write_project(&[
            ("go.mod", "module myapp\n"),
            ("ok.go", "package main\n\nfunc Fine() {}\n"),
            ("broken.go", "package main\n\nfunc Broken( {\n"),
        ]);

        let mut loader = Loader::new(Config::default(), dir.path());
        loader.load().unwrap();

        assert_eq!(loader.packages().len(), 1);
        assert_eq!(loader.packages()[0].files.len(), 1);
        assert_eq!(loader.errors().len(), 1);
    }

    #[test]
    fn collects_type_tables() {
        let dir = write_project(&[
            ("go.mod", "module myapp\n"),
            (
                "store.go",
                r#"package main

import "database/sql"

type UserStore struct {
    db *sql.DB
}

type UserFinder interface {
    FindByID(id int) (*User, error)
}

type User struct {
    ID   int
    Name string
}

func NewUserStore(db *sql.DB) *UserStore {
    return &UserStore{db: db}
}

func (s *UserStore) FindByID(id int) (*User, error) {
    return nil, nil
}
"#,
            ),
        ]);

        let mut loader = Loader::new(Config::default(), dir.path());
        loader.load().unwrap();

        let pkg = &loader.packages()[0];
        assert!(pkg.types.structs.contains_key("UserStore"));
        assert_eq!(
            pkg.types.interfaces.get("UserFinder").unwrap().methods,
            vec!["FindByID".to_string()]
        );
        let method = pkg.types.find_method("UserStore", "FindByID").unwrap();
        assert_eq!(method.recv_type, "*UserStore");
        let ctor = pkg.types.functions.get("NewUserStore").unwrap();
        assert_eq!(ctor.results[0].type_ref.as_ref().unwrap().name, "UserStore");
        assert!(ctor.results[0].type_ref.as_ref().unwrap().pointer);

        let db_field = &pkg.types.structs["UserStore"].fields["db"];
        assert_eq!(db_field.pkg_path.as_deref(), Some("database/sql"));
        assert_eq!(db_field.name, "DB");
    }
}
