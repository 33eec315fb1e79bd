use crate::config::Config;
use crate::db::Store;
use crate::model::{SymbolCallee, SymbolForTagging, SymbolId, Tag};
use anyhow::{Context, Result};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct TagResult {
    pub io_tags: usize,
    pub layer_tags: usize,
    pub purity_tags: usize,
    pub total_tags: usize,
}

/// Applies I/O-boundary, layer, and purity tags. Two passes under separate
/// transactions so the purity pass sees the committed I/O tags.
pub struct Tagger<'a> {
    cfg: &'a Config,
    store: &'a Store,
}

impl<'a> Tagger<'a> {
    pub fn new(cfg: &'a Config, store: &'a Store) -> Self {
        Self { cfg, store }
    }

    pub fn tag(&self) -> Result<TagResult> {
        let mut result = TagResult::default();

        let symbols = self
            .store
            .get_all_symbols_for_tagging()
            .context("getting symbols")?;
        let pkg_imports = self
            .store
            .get_package_imports()
            .context("getting package imports")?;
        let pkg_io_categories = self.build_package_io_categories(&pkg_imports);

        // Pass 1: I/O boundary and layer tags.
        let batch = self.store.begin_batch().context("starting tag batch")?;
        for sym in &symbols {
            for tag in self.io_tags(sym, &pkg_io_categories) {
                batch.insert_tag(&tag).context("inserting IO tag")?;
                result.io_tags += 1;
            }
            if let Some(tag) = self.layer_tag(sym) {
                batch.insert_tag(&tag).context("inserting layer tag")?;
                result.layer_tags += 1;
            }
        }
        batch.commit().context("committing tag batch")?;

        // Pass 2: purity, over the now-visible I/O tags.
        let callee_map = self
            .store
            .get_symbol_callees_with_tags()
            .context("getting callees with tags")?;

        let batch = self.store.begin_batch().context("starting purity batch")?;
        for sym in &symbols {
            if !sym.kind.is_callable() {
                continue;
            }
            if let Some(tag) = purity_tag(sym, &callee_map) {
                batch.insert_tag(&tag).context("inserting purity tag")?;
                result.purity_tags += 1;
            }
        }
        batch.commit().context("committing purity batch")?;

        result.total_tags = result.io_tags + result.layer_tags + result.purity_tags;
        Ok(result)
    }

    /// Package path → (I/O category → first imported package that caused it).
    fn build_package_io_categories(
        &self,
        pkg_imports: &HashMap<String, Vec<String>>,
    ) -> HashMap<String, Vec<(String, String)>> {
        let mut result: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for (pkg_path, imports) in pkg_imports {
            for imported in imports {
                let Some(category) = self.cfg.io_category(imported) else {
                    continue;
                };
                let categories = result.entry(pkg_path.clone()).or_default();
                if !categories.iter().any(|(c, _)| c == category) {
                    categories.push((category.to_string(), imported.clone()));
                }
            }
        }
        for categories in result.values_mut() {
            categories.sort();
        }
        result
    }

    fn io_tags(
        &self,
        sym: &SymbolForTagging,
        pkg_io_categories: &HashMap<String, Vec<(String, String)>>,
    ) -> Vec<Tag> {
        if !sym.kind.is_callable() {
            return Vec::new();
        }

        let mut tags = Vec::new();
        if let Some(categories) = pkg_io_categories.get(&sym.pkg_path) {
            for (category, imported_pkg) in categories {
                tags.push(Tag {
                    symbol_id: sym.id,
                    tag: format!("io:{category}"),
                    reason: format!("Package imports {imported_pkg}"),
                });
            }
        }

        if !sym.recv_type.is_empty() {
            if let Some(io_tag) = io_tag_from_receiver_type(&sym.recv_type) {
                if !tags.iter().any(|t| t.tag == io_tag) {
                    tags.push(Tag {
                        symbol_id: sym.id,
                        tag: io_tag,
                        reason: format!("Method on {} type", sym.recv_type),
                    });
                }
            }
        }

        tags
    }

    fn layer_tag(&self, sym: &SymbolForTagging) -> Option<Tag> {
        if !sym.kind.is_callable() {
            return None;
        }
        let layer = self.cfg.layer_for_package(&sym.pkg_path)?;
        Some(Tag {
            symbol_id: sym.id,
            tag: format!("layer:{layer}"),
            reason: format!("Package path matches {layer} layer pattern"),
        })
    }
}

/// I/O tag inferred from a receiver type name: store/repo/repository
/// suffixes mean a database boundary, client means a network boundary.
fn io_tag_from_receiver_type(recv_type: &str) -> Option<String> {
    let type_name = recv_type.trim_start_matches('*');
    let type_name = type_name.rsplit('.').next().unwrap_or(type_name);
    let lower = type_name.to_lowercase();

    if lower.ends_with("store") || lower.ends_with("repo") || lower.ends_with("repository") {
        return Some("io:db".to_string());
    }
    if lower.ends_with("client") {
        return Some("io:net".to_string());
    }
    None
}

/// Purity is a local property of depth-1 callees: no outgoing calls, or no
/// callee carrying an `io:*` tag.
fn purity_tag(
    sym: &SymbolForTagging,
    callee_map: &HashMap<SymbolId, Vec<SymbolCallee>>,
) -> Option<Tag> {
    let callees = callee_map.get(&sym.id);
    let callees = match callees {
        None => {
            return Some(Tag {
                symbol_id: sym.id,
                tag: "pure-ish".to_string(),
                reason: "No outgoing function calls".to_string(),
            });
        }
        Some(callees) if callees.is_empty() => {
            return Some(Tag {
                symbol_id: sym.id,
                tag: "pure-ish".to_string(),
                reason: "No outgoing function calls".to_string(),
            });
        }
        Some(callees) => callees,
    };

    for callee in callees {
        if callee.tags.iter().any(|t| t.starts_with("io:")) {
            return None;
        }
    }

    Some(Tag {
        symbol_id: sym.id,
        tag: "pure-ish".to_string(),
        reason: "No calls to I/O functions".to_string(),
    })
}
