use crate::db::Store;
use crate::error::QueryResult;
use crate::graph::{GraphFilter, is_cmd_package, is_stdlib, is_vendor, match_package_pattern};
use crate::model::{CallKind, CalleeInfo, Symbol, SymbolId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Serialize)]
pub struct SpineNode {
    pub id: SymbolId,
    pub name: String,
    pub pkg_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub recv_type: String,
    pub file: String,
    pub line: i64,
    pub tags: Vec<String>,
    pub depth: usize,
    pub is_main_path: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_badge: Option<BranchBadge>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub layer: String,
}

/// Summarizes the collapsed side branches of a spine node.
#[derive(Debug, Serialize)]
pub struct BranchBadge {
    pub call_count: usize,
    pub collapsed_ids: Vec<SymbolId>,
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SpineResponse {
    pub nodes: Vec<SpineNode>,
    pub main_path: Vec<SymbolId>,
    pub total_nodes: usize,
    pub collapsed_count: usize,
}

struct ScoredCallee {
    id: SymbolId,
    score: i64,
}

/// Builds a call spine: a single heuristically chosen main path through the
/// call graph, with other callees rolled up into branch badges.
pub struct SpineBuilder<'a> {
    store: &'a Store,
    filter: GraphFilter,
}

impl<'a> SpineBuilder<'a> {
    pub fn new(store: &'a Store, filter: GraphFilter) -> Self {
        Self { store, filter }
    }

    pub fn build_spine(&self, root_id: SymbolId, max_depth: usize) -> QueryResult<SpineResponse> {
        let max_depth = if max_depth == 0 { 10 } else { max_depth };

        let mut all_callees: HashMap<SymbolId, Vec<CalleeInfo>> = HashMap::new();
        let mut visited = HashSet::new();
        self.load_callees_recursive(root_id, max_depth, 0, &mut all_callees, &mut visited)?;

        let main_path = self.determine_main_path(root_id, &all_callees, max_depth)?;
        let main_path_set: HashSet<SymbolId> = main_path.iter().copied().collect();

        let mut nodes = Vec::new();
        let mut total_nodes = 0;
        let mut collapsed_count = 0;

        for (depth, id) in main_path.iter().enumerate() {
            let Some(sym) = self.store.get_symbol_by_id(*id)? else {
                continue;
            };
            let tags: Vec<String> = self
                .store
                .get_symbol_tags(*id)
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.tag)
                .collect();

            let mut collapsed_ids = Vec::new();
            let mut labels = Vec::new();
            if let Some(callees) = all_callees.get(id) {
                for callee in callees {
                    if !main_path_set.contains(&callee.symbol.id) {
                        collapsed_ids.push(callee.symbol.id);
                        labels.push(branch_label(&callee.symbol));
                        collapsed_count += 1;
                    }
                    total_nodes += 1;
                }
            }

            let branch_badge = if collapsed_ids.is_empty() {
                None
            } else {
                Some(BranchBadge {
                    call_count: collapsed_ids.len(),
                    collapsed_ids,
                    labels,
                })
            };

            nodes.push(SpineNode {
                id: *id,
                name: sym.name,
                pkg_path: sym.pkg_path,
                recv_type: sym.recv_type,
                file: sym.file,
                line: sym.line,
                layer: extract_layer(&tags),
                tags,
                depth,
                is_main_path: true,
                branch_badge,
            });
        }

        let total_nodes = total_nodes + main_path.len();
        Ok(SpineResponse {
            nodes,
            main_path,
            total_nodes,
            collapsed_count,
        })
    }

    fn load_callees_recursive(
        &self,
        symbol_id: SymbolId,
        max_depth: usize,
        current_depth: usize,
        all_callees: &mut HashMap<SymbolId, Vec<CalleeInfo>>,
        visited: &mut HashSet<SymbolId>,
    ) -> QueryResult<()> {
        if current_depth >= max_depth {
            return Ok(());
        }
        if !visited.insert(symbol_id) {
            return Ok(());
        }

        let callees = match self.store.get_callees(symbol_id) {
            Ok(callees) => callees,
            Err(_) => return Ok(()),
        };
        let filtered: Vec<CalleeInfo> = callees
            .into_iter()
            .filter(|c| !self.filters_out(&c.symbol))
            .collect();

        for callee in &filtered {
            self.load_callees_recursive(
                callee.symbol.id,
                max_depth,
                current_depth + 1,
                all_callees,
                visited,
            )?;
        }
        all_callees.insert(symbol_id, filtered);
        Ok(())
    }

    fn filters_out(&self, sym: &Symbol) -> bool {
        if self.filter.hide_stdlib && is_stdlib(&sym.pkg_path) {
            return true;
        }
        if self.filter.hide_vendors && is_vendor(&sym.pkg_path) {
            return true;
        }
        if self.filter.hide_cmd_main && is_cmd_package(&sym.pkg_path) {
            return true;
        }
        self.filter
            .noise_packages
            .iter()
            .any(|noise| match_package_pattern(noise, &sym.pkg_path))
    }

    /// Greedy main-path selection: at each step take the highest-scoring
    /// unvisited callee.
    fn determine_main_path(
        &self,
        root_id: SymbolId,
        all_callees: &HashMap<SymbolId, Vec<CalleeInfo>>,
        max_depth: usize,
    ) -> QueryResult<Vec<SymbolId>> {
        let Some(root_sym) = self.store.get_symbol_by_id(root_id)? else {
            return Ok(vec![root_id]);
        };
        let root_pkg = root_sym.pkg_path;

        let mut path = vec![root_id];
        let mut current = root_id;
        let mut visited = HashSet::from([root_id]);

        while path.len() < max_depth {
            let Some(callees) = all_callees.get(&current) else {
                break;
            };
            if callees.is_empty() {
                break;
            }

            let mut scored = self.score_callees(callees, &root_pkg, &visited);
            if scored.is_empty() {
                break;
            }
            scored.sort_by(|a, b| b.score.cmp(&a.score));

            let best = scored[0].id;
            visited.insert(best);
            path.push(best);
            current = best;
        }

        Ok(path)
    }

    fn score_callees(
        &self,
        callees: &[CalleeInfo],
        root_pkg: &str,
        visited: &HashSet<SymbolId>,
    ) -> Vec<ScoredCallee> {
        let root_top = root_pkg.split('/').next().unwrap_or(root_pkg);
        let mut scored = Vec::new();

        for callee in callees {
            if visited.contains(&callee.symbol.id) {
                continue;
            }
            let sym = &callee.symbol;
            let mut score = 0i64;

            // Business logic usually stays near the root's package.
            if sym.pkg_path == root_pkg {
                score += 10;
            } else if sym.pkg_path.starts_with(root_top) {
                score += 5;
            }

            let tags = self
                .store
                .get_symbol_tags(sym.id)
                .unwrap_or_default();
            for tag in &tags {
                match tag.tag.as_str() {
                    "layer:service" => score += 8,
                    "layer:domain" => score += 7,
                    "layer:store" => score += 6,
                    "layer:handler" => score += 5,
                    _ => {}
                }
            }

            if is_logging_package(&sym.pkg_path) {
                score -= 15;
            }
            if self.filter.collapse_wiring && is_wiring_function(&sym.name) {
                score -= 10;
            }
            if is_error_construction(&sym.name, &sym.pkg_path) {
                score -= 20;
            }
            if !sym.recv_type.is_empty() {
                score += 3;
            }
            if callee.call_kind == CallKind::Interface {
                score += 2;
            }

            scored.push(ScoredCallee { id: sym.id, score });
        }

        scored
    }
}

fn branch_label(sym: &Symbol) -> String {
    if sym.recv_type.is_empty() {
        sym.name.clone()
    } else {
        format!("({}).{}", sym.recv_type, sym.name)
    }
}

fn extract_layer(tags: &[String]) -> String {
    tags.iter()
        .find_map(|t| t.strip_prefix("layer:"))
        .unwrap_or_default()
        .to_string()
}

fn is_logging_package(pkg_path: &str) -> bool {
    const LOGGING_PATTERNS: &[&str] = &[
        "log",
        "slog",
        "zap",
        "logrus",
        "zerolog",
        "telemetry",
        "metrics",
        "tracing",
        "opentelemetry",
        "prometheus",
    ];
    let lower = pkg_path.to_lowercase();
    LOGGING_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Constructors and providers are wiring, not flow.
fn is_wiring_function(name: &str) -> bool {
    name.starts_with("New") || name.starts_with("Provide") || name.starts_with("Init")
}

fn is_error_construction(name: &str, pkg_path: &str) -> bool {
    if pkg_path == "errors" && matches!(name, "New" | "Wrap" | "Wrapf") {
        return true;
    }
    if pkg_path == "fmt" && matches!(name, "Errorf" | "Sprintf") {
        return true;
    }
    let lower = name.to_lowercase();
    lower.starts_with("error") || lower.ends_with("error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_packages_detected() {
        assert!(is_logging_package("log"));
        assert!(is_logging_package("go.uber.org/zap"));
        assert!(is_logging_package("go.opentelemetry.io/otel"));
        assert!(!is_logging_package("myapp/internal/service"));
    }

    #[test]
    fn error_construction_detected() {
        assert!(is_error_construction("New", "errors"));
        assert!(is_error_construction("Errorf", "fmt"));
        assert!(is_error_construction("WrapError", "myapp/util"));
        assert!(is_error_construction("errorResponse", "myapp/api"));
        assert!(!is_error_construction("GetUser", "myapp/service"));
    }

    #[test]
    fn wiring_names_detected() {
        assert!(is_wiring_function("NewServer"));
        assert!(is_wiring_function("ProvideConfig"));
        assert!(!is_wiring_function("HandleRequest"));
    }

    #[test]
    fn layer_extracted_from_tags() {
        let tags = vec!["io:db".to_string(), "layer:store".to_string()];
        assert_eq!(extract_layer(&tags), "store");
        assert_eq!(extract_layer(&[]), "");
    }
}
