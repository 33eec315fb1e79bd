use crate::db::Store;
use crate::error::QueryResult;
use crate::model::{CallKind, Symbol, SymbolId, SymbolKind, Tag};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Filters for graph traversal, deserialized from the `filters` query
/// parameter. Plain data consumed by stateless predicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphFilter {
    pub hide_stdlib: bool,
    pub hide_vendors: bool,
    pub stop_at_io: bool,
    pub stop_at_package_prefix: Vec<String>,
    pub max_depth: usize,
    pub noise_packages: Vec<String>,
    pub collapse_wiring: bool,
    pub hide_cmd_main: bool,
}

impl Default for GraphFilter {
    fn default() -> Self {
        Self {
            hide_stdlib: false,
            hide_vendors: false,
            stop_at_io: false,
            stop_at_package_prefix: Vec::new(),
            max_depth: 6,
            noise_packages: Vec::new(),
            collapse_wiring: false,
            hide_cmd_main: false,
        }
    }
}

impl GraphFilter {
    /// Whether a symbol is excluded from results entirely.
    pub fn filters_out(&self, sym: &Symbol) -> bool {
        if self.hide_stdlib && is_stdlib(&sym.pkg_path) {
            return true;
        }
        if self.hide_vendors && is_vendor(&sym.pkg_path) {
            return true;
        }
        self.noise_packages
            .iter()
            .any(|noise| match_package_pattern(noise, &sym.pkg_path))
    }
}

/// True when the first path segment contains no dot, the stdlib convention.
pub fn is_stdlib(pkg_path: &str) -> bool {
    if pkg_path.is_empty() {
        return false;
    }
    let first_segment = pkg_path.split('/').next().unwrap_or(pkg_path);
    !first_segment.contains('.')
}

pub fn is_vendor(pkg_path: &str) -> bool {
    pkg_path.contains("/vendor/") || pkg_path.starts_with("vendor/")
}

pub fn is_cmd_package(pkg_path: &str) -> bool {
    pkg_path.contains("/cmd/") || pkg_path.starts_with("cmd/")
}

/// Match a package path against a pattern: exact, trailing `*` prefix
/// match, or trailing `/*` matching children and the bare prefix itself.
pub fn match_package_pattern(pattern: &str, pkg_path: &str) -> bool {
    if pattern == pkg_path {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return pkg_path.starts_with(&format!("{prefix}/")) || pkg_path == prefix;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return pkg_path.starts_with(prefix);
    }
    false
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: SymbolId,
    pub name: String,
    pub pkg_path: String,
    pub file: String,
    pub line: i64,
    pub kind: SymbolKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub recv_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sig: String,
    pub tags: Vec<String>,
    pub expanded: bool,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub source_id: SymbolId,
    pub target_id: SymbolId,
    pub call_kind: CallKind,
    pub callsite_count: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub caller_file: String,
    pub caller_line: i64,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub root_id: SymbolId,
    pub max_depth: usize,
    pub filtered_count: usize,
}

/// Builds filtered spanning subgraphs by bounded BFS over stored call
/// edges.
pub struct GraphBuilder<'a> {
    store: &'a Store,
    filter: GraphFilter,
    nodes: HashMap<SymbolId, GraphNode>,
    edges: Vec<GraphEdge>,
    visited: HashSet<SymbolId>,
    filtered: usize,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(store: &'a Store, filter: GraphFilter) -> Self {
        Self {
            store,
            filter,
            nodes: HashMap::new(),
            edges: Vec::new(),
            visited: HashSet::new(),
            filtered: 0,
        }
    }

    /// Spanning subgraph from a root symbol. The requested depth is clamped
    /// to the filter's `max_depth` when set.
    pub fn build_from_root(
        mut self,
        root_id: SymbolId,
        depth: usize,
    ) -> QueryResult<GraphResponse> {
        let depth = depth.min(self.filter.max_depth);

        self.add_node(root_id, 0, true)?;
        self.expand_from(root_id, depth, 0)?;
        Ok(self.into_response(root_id, depth))
    }

    /// Expand a single node by the given depth; a missing seed node is
    /// inserted before expansion.
    pub fn expand(mut self, symbol_id: SymbolId, depth: usize) -> QueryResult<GraphResponse> {
        let depth = depth.min(self.filter.max_depth);
        if !self.nodes.contains_key(&symbol_id) {
            self.add_node(symbol_id, 0, true)?;
        }
        self.expand_from(symbol_id, depth, 0)?;
        Ok(self.into_response(symbol_id, depth))
    }

    fn add_node(&mut self, id: SymbolId, depth: usize, expanded: bool) -> QueryResult<()> {
        if self.nodes.contains_key(&id) {
            return Ok(());
        }
        let Some(sym) = self.store.get_symbol_by_id(id)? else {
            return Ok(());
        };
        if self.filter.filters_out(&sym) {
            self.filtered += 1;
            return Ok(());
        }

        let tags = self.store.get_symbol_tags(id).unwrap_or_default();
        self.nodes.insert(
            id,
            GraphNode {
                id: sym.id,
                name: sym.name,
                pkg_path: sym.pkg_path,
                file: sym.file,
                line: sym.line,
                kind: sym.kind,
                recv_type: sym.recv_type,
                sig: sym.sig,
                tags: tags.into_iter().map(|t| t.tag).collect(),
                expanded,
                depth,
            },
        );
        Ok(())
    }

    /// Whether expansion should stop past this node, based on its own
    /// symbol and tags.
    fn stops_expansion(&self, sym: &Symbol, tags: &[Tag]) -> bool {
        if self.filter.stop_at_io && tags.iter().any(|t| t.tag.starts_with("io:")) {
            return true;
        }
        self.filter
            .stop_at_package_prefix
            .iter()
            .any(|prefix| sym.pkg_path.starts_with(prefix.as_str()))
    }

    fn expand_from(
        &mut self,
        symbol_id: SymbolId,
        max_depth: usize,
        current_depth: usize,
    ) -> QueryResult<()> {
        if current_depth >= max_depth {
            return Ok(());
        }
        if !self.visited.insert(symbol_id) {
            return Ok(());
        }

        let Some(sym) = self.store.get_symbol_by_id(symbol_id)? else {
            return Ok(());
        };
        let tags = self.store.get_symbol_tags(symbol_id).unwrap_or_default();
        if self.stops_expansion(&sym, &tags) {
            return Ok(());
        }

        let callees = self.store.get_callees(symbol_id)?;

        // Aggregate duplicate (source, target) pairs: counts sum, the first
        // encountered kind and position stick.
        let mut callee_edges: HashMap<SymbolId, GraphEdge> = HashMap::new();
        let mut order: Vec<SymbolId> = Vec::new();
        for callee in callees {
            if self.filter.filters_out(&callee.symbol) {
                self.filtered += 1;
                continue;
            }
            match callee_edges.get_mut(&callee.symbol.id) {
                Some(edge) => edge.callsite_count += callee.count,
                None => {
                    order.push(callee.symbol.id);
                    callee_edges.insert(
                        callee.symbol.id,
                        GraphEdge {
                            source_id: symbol_id,
                            target_id: callee.symbol.id,
                            call_kind: callee.call_kind,
                            callsite_count: callee.count,
                            caller_file: callee.caller_file,
                            caller_line: callee.caller_line,
                        },
                    );
                }
            }
        }

        for callee_id in order {
            let Some(edge) = callee_edges.remove(&callee_id) else {
                continue;
            };
            self.edges.push(edge);
            self.add_node(callee_id, current_depth + 1, false)?;
            self.expand_from(callee_id, max_depth, current_depth + 1)?;
        }

        if let Some(node) = self.nodes.get_mut(&symbol_id) {
            node.expanded = true;
        }
        Ok(())
    }

    fn into_response(self, root_id: SymbolId, max_depth: usize) -> GraphResponse {
        let mut nodes: Vec<GraphNode> = self.nodes.into_values().collect();
        nodes.sort_by_key(|n| n.id);
        GraphResponse {
            nodes,
            edges: self.edges,
            root_id,
            max_depth,
            filtered_count: self.filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdlib_classification() {
        assert!(is_stdlib("fmt"));
        assert!(is_stdlib("net/http"));
        assert!(is_stdlib("encoding/json"));
        assert!(!is_stdlib("github.com/spf13/cobra"));
        assert!(!is_stdlib("example.com/myapp/internal/api"));
        assert!(!is_stdlib(""));
    }

    #[test]
    fn vendor_classification() {
        assert!(is_vendor("vendor/github.com/lib/pq"));
        assert!(is_vendor("myapp/vendor/github.com/lib/pq"));
        assert!(!is_vendor("myapp/internal/vendorlist"));
    }

    #[test]
    fn cmd_classification() {
        assert!(is_cmd_package("cmd/server"));
        assert!(is_cmd_package("myapp/cmd/server"));
        assert!(!is_cmd_package("myapp/internal/command"));
    }

    #[test]
    fn package_pattern_matching() {
        assert!(match_package_pattern("myapp/util", "myapp/util"));
        assert!(match_package_pattern("myapp/*", "myapp/util"));
        assert!(match_package_pattern("myapp/util/*", "myapp/util"));
        assert!(match_package_pattern("myapp/util/*", "myapp/util/strings"));
        assert!(match_package_pattern("myapp*", "myapplication"));
        assert!(!match_package_pattern("myapp/util", "myapp/utilities"));
        assert!(!match_package_pattern("myapp/*", "other/util"));
    }

    #[test]
    fn default_filter_values() {
        let filter = GraphFilter::default();
        assert_eq!(filter.max_depth, 6);
        assert!(!filter.hide_stdlib);
        assert!(!filter.stop_at_io);
    }

    #[test]
    fn filter_deserializes_camel_case() {
        let filter: GraphFilter =
            serde_json::from_str(r#"{"hideStdlib":true,"maxDepth":3,"noisePackages":["log"]}"#)
                .unwrap();
        assert!(filter.hide_stdlib);
        assert_eq!(filter.max_depth, 3);
        assert_eq!(filter.noise_packages, vec!["log".to_string()]);
        assert!(!filter.hide_vendors);
    }
}
