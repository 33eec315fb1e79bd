use crate::db::{BatchTx, Store};
use crate::indexer::loader::Loader;
use crate::indexer::ssa::{CallTarget, InstrKind, SsaProgram, StaticTarget};
use crate::model::{CallEdge, CallKind, SymbolId};
use anyhow::{Context, Result};
use std::collections::HashMap;

/// An interface invocation awaiting resolution to a concrete method.
#[derive(Debug, Clone)]
pub struct InterfaceCall<'a> {
    pub iface_pkg: &'a str,
    pub iface: &'a str,
    pub method: &'a str,
}

/// Resolves interface invocations to concrete method symbols. Pluggable so
/// the single-candidate heuristic can later be replaced (e.g. by Rapid Type
/// Analysis) without touching the extractor.
pub trait CalleeResolver {
    fn resolve(
        &self,
        call: &InterfaceCall<'_>,
        batch: &BatchTx<'_>,
    ) -> Result<Option<SymbolId>>;
}

/// Default resolution strategy: gather concrete methods in project packages
/// with a matching name, ignore mock/fake packages when real candidates
/// exist, and take the single (or first) remaining candidate.
pub struct SingleCandidateResolver<'a> {
    loader: &'a Loader,
}

impl<'a> SingleCandidateResolver<'a> {
    pub fn new(loader: &'a Loader) -> Self {
        Self { loader }
    }
}

impl CalleeResolver for SingleCandidateResolver<'_> {
    fn resolve(
        &self,
        call: &InterfaceCall<'_>,
        batch: &BatchTx<'_>,
    ) -> Result<Option<SymbolId>> {
        let mut candidates = Vec::new();
        let mut mock_candidates = Vec::new();

        for pkg in self.loader.packages() {
            let is_mock = is_mock_package(&pkg.pkg_path);
            let mut bases: Vec<&String> = pkg.types.methods.keys().collect();
            bases.sort();
            for base in bases {
                // Methods are only declared on concrete types, but guard
                // against a same-named interface shadowing the base name.
                if pkg.types.interfaces.contains_key(base) {
                    continue;
                }
                for method in &pkg.types.methods[base] {
                    if method.func.name != call.method {
                        continue;
                    }
                    let Some(id) =
                        batch.get_symbol_id(&pkg.pkg_path, call.method, &method.recv_type)?
                    else {
                        continue;
                    };
                    if is_mock {
                        mock_candidates.push(id);
                    } else {
                        candidates.push(id);
                    }
                }
            }
        }

        if candidates.is_empty() {
            candidates = mock_candidates;
        }
        Ok(candidates.into_iter().next())
    }
}

fn is_mock_package(pkg_path: &str) -> bool {
    pkg_path.contains("/mock")
        || pkg_path.contains("_mock")
        || pkg_path.contains("/fake")
        || pkg_path.ends_with("mocks")
}

#[derive(Debug, Default)]
pub struct CallGraphResult {
    pub edge_count: usize,
    pub static_calls: usize,
    pub interface_calls: usize,
    pub funcval_calls: usize,
    pub defer_calls: usize,
    pub go_calls: usize,
}

/// Iterates SSA call sites and persists call edges between project symbols.
pub struct CallGraphBuilder<'a> {
    program: &'a SsaProgram,
    resolver: Box<dyn CalleeResolver + 'a>,
    symbol_cache: HashMap<(String, String, String), Option<SymbolId>>,
    on_progress: Option<Box<dyn FnMut(usize, usize) + 'a>>,
}

impl<'a> CallGraphBuilder<'a> {
    pub fn new(loader: &'a Loader, program: &'a SsaProgram) -> Self {
        Self {
            program,
            resolver: Box::new(SingleCandidateResolver::new(loader)),
            symbol_cache: HashMap::new(),
            on_progress: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn CalleeResolver + 'a>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn set_progress_callback(&mut self, cb: impl FnMut(usize, usize) + 'a) {
        self.on_progress = Some(Box::new(cb));
    }

    /// Extract all call edges and persist them under one batch transaction.
    pub fn extract_call_edges(&mut self, store: &Store) -> Result<CallGraphResult> {
        let batch = store.begin_batch().context("starting call-edge batch")?;
        let mut result = CallGraphResult::default();
        let program = self.program;
        let total = program.functions.len();

        for (i, function) in program.functions.iter().enumerate() {
            if i % 100 == 0 {
                if let Some(cb) = self.on_progress.as_mut() {
                    cb(i, total);
                }
            }

            let Some(caller_id) = self.lookup_symbol(
                &batch,
                &function.pkg_path,
                &function.name,
                &function.recv_type,
            )?
            else {
                continue;
            };

            for block in &function.blocks {
                for instr in &block.instrs {
                    let (site, base_kind) = match &instr.kind {
                        InstrKind::Call(site) => (site, CallKind::Static),
                        InstrKind::Defer(site) => (site, CallKind::Defer),
                        InstrKind::Go(site) => (site, CallKind::Go),
                        _ => continue,
                    };
                    if site.line <= 0 {
                        continue;
                    }

                    let (callee_id, call_kind) = match &site.target {
                        CallTarget::Static(target) => {
                            match self.lookup_static(&batch, target)? {
                                Some(id) => (id, base_kind),
                                None => continue,
                            }
                        }
                        CallTarget::Interface {
                            pkg_path,
                            iface,
                            method,
                        } => {
                            let call = InterfaceCall {
                                iface_pkg: pkg_path,
                                iface,
                                method,
                            };
                            match self.resolver.resolve(&call, &batch)? {
                                Some(id) => (id, CallKind::Interface),
                                None => continue,
                            }
                        }
                        CallTarget::FuncValue(Some(target)) => {
                            match self.lookup_static(&batch, target)? {
                                Some(id) => (id, CallKind::Funcval),
                                None => continue,
                            }
                        }
                        CallTarget::FuncValue(None) | CallTarget::Unresolved => continue,
                    };

                    batch
                        .insert_call_edge(&CallEdge {
                            caller_id,
                            callee_id,
                            caller_file: function.file.clone(),
                            caller_line: site.line,
                            call_kind,
                            count: 1,
                        })
                        .context("inserting call edge")?;

                    result.edge_count += 1;
                    match call_kind {
                        CallKind::Static => result.static_calls += 1,
                        CallKind::Interface => result.interface_calls += 1,
                        CallKind::Funcval => result.funcval_calls += 1,
                        CallKind::Defer => result.defer_calls += 1,
                        CallKind::Go => result.go_calls += 1,
                        CallKind::Unknown => {}
                    }
                }
            }
        }

        if let Some(cb) = self.on_progress.as_mut() {
            cb(total, total);
        }

        batch.commit().context("committing call-edge batch")?;
        Ok(result)
    }

    fn lookup_static(
        &mut self,
        batch: &BatchTx<'_>,
        target: &StaticTarget,
    ) -> Result<Option<SymbolId>> {
        self.lookup_symbol(batch, &target.pkg_path, &target.name, &target.recv_type)
    }

    fn lookup_symbol(
        &mut self,
        batch: &BatchTx<'_>,
        pkg_path: &str,
        name: &str,
        recv_type: &str,
    ) -> Result<Option<SymbolId>> {
        let key = (
            pkg_path.to_string(),
            name.to_string(),
            recv_type.to_string(),
        );
        if let Some(cached) = self.symbol_cache.get(&key) {
            return Ok(*cached);
        }
        let id = batch.get_symbol_id(pkg_path, name, recv_type)?;
        self.symbol_cache.insert(key, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_package_detection() {
        assert!(is_mock_package("myapp/internal/mocks"));
        assert!(is_mock_package("myapp/internal/mock/user"));
        assert!(is_mock_package("myapp/user_mock"));
        assert!(is_mock_package("myapp/internal/fake/store"));
        assert!(!is_mock_package("myapp/internal/store"));
    }
}
