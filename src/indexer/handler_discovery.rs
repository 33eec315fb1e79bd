use crate::db::BatchTx;
use crate::indexer::entrypoints::HttpMeta;
use crate::indexer::loader::{FuncInfo, LoadedPackage, Loader, ParamInfo, TypeRef};
use crate::indexer::ssa::SsaProgram;
use crate::indexer::syntax::is_exported;
use crate::model::{Entrypoint, EntrypointType, SymbolId};
use anyhow::{Context, Result};
use std::collections::HashSet;

/// Finds HTTP handlers by function signature. Complements the AST-based
/// router detection by catching handlers that match known handler shapes
/// but aren't registered through a parsed router call.
pub struct HandlerDiscovery<'a> {
    loader: &'a Loader,
    program: &'a SsaProgram,
}

#[derive(Debug, Default)]
pub struct DiscoverResult {
    pub stdlib_count: usize,
    pub gin_count: usize,
    pub echo_count: usize,
    pub total_count: usize,
}

impl<'a> HandlerDiscovery<'a> {
    pub fn new(loader: &'a Loader, program: &'a SsaProgram) -> Self {
        Self { loader, program }
    }

    /// Register signature-matched handlers not already present as HTTP
    /// entrypoints, with `discovery_method = "signature"`.
    pub fn discover(&self, batch: &BatchTx<'_>) -> Result<DiscoverResult> {
        let mut result = DiscoverResult::default();

        let existing: HashSet<SymbolId> = batch
            .get_http_entrypoint_symbol_ids()
            .context("getting existing HTTP entrypoints")?
            .into_iter()
            .collect();

        for function in &self.program.functions {
            if function.name == "init" || !is_exported(&function.name) {
                continue;
            }
            let Some(pkg) = self.loader.package_by_path(&function.pkg_path) else {
                continue;
            };
            let Some(info) = lookup_func_info(pkg, &function.name, &function.recv_type) else {
                continue;
            };

            let Some(sig_type) = self.match_handler_signature(info) else {
                continue;
            };

            let Some(symbol_id) =
                batch.get_symbol_id(&function.pkg_path, &function.name, &function.recv_type)?
            else {
                continue;
            };
            if existing.contains(&symbol_id) {
                continue;
            }

            let label = if function.recv_type.is_empty() {
                function.name.clone()
            } else {
                format!("({}).{}", function.recv_type, function.name)
            };
            let meta = HttpMeta {
                method: "ANY".to_string(),
                path: String::new(),
            };
            batch.insert_entrypoint(&Entrypoint {
                id: 0,
                ep_type: EntrypointType::Http,
                label,
                symbol_id,
                meta_json: serde_json::to_string(&meta)?,
                discovery_method: "signature".to_string(),
            })?;

            match sig_type {
                SignatureType::Stdlib => result.stdlib_count += 1,
                SignatureType::Gin => result.gin_count += 1,
                SignatureType::Echo => result.echo_count += 1,
            }
            result.total_count += 1;
        }

        Ok(result)
    }

    fn match_handler_signature(&self, info: &FuncInfo) -> Option<SignatureType> {
        let params = &info.params;

        // stdlib: (http.ResponseWriter, *http.Request), optionally preceded
        // by context.Context.
        if params.len() == 2 || params.len() == 3 {
            let w = &params[params.len() - 2];
            let r = &params[params.len() - 1];
            if self.is_response_writer(w) && is_http_request(r) {
                if params.len() == 3 && !is_context(&params[0]) {
                    return None;
                }
                return Some(SignatureType::Stdlib);
            }
        }

        // gin: (*gin.Context).
        if params.len() == 1 && is_gin_context(&params[0]) {
            return Some(SignatureType::Gin);
        }

        // echo: (echo.Context) error.
        if params.len() == 1 && info.results.len() == 1 && is_echo_context(&params[0]) {
            return Some(SignatureType::Echo);
        }

        None
    }

    /// `http.ResponseWriter` by package and name, or a project interface
    /// whose method set carries the ResponseWriter shape.
    fn is_response_writer(&self, param: &ParamInfo) -> bool {
        let Some(type_ref) = &param.type_ref else {
            return false;
        };
        if type_ref.pointer {
            return false;
        }
        if type_ref.pkg_path.as_deref() == Some("net/http") && type_ref.name == "ResponseWriter" {
            return true;
        }
        if let Some(pkg_path) = type_ref.pkg_path.as_deref() {
            if let Some(pkg) = self.loader.package_by_path(pkg_path) {
                if let Some(iface) = pkg.types.interfaces.get(&type_ref.name) {
                    let set: HashSet<&str> = iface.methods.iter().map(|m| m.as_str()).collect();
                    return set.contains("Header")
                        && set.contains("Write")
                        && set.contains("WriteHeader");
                }
            }
        }
        false
    }
}

enum SignatureType {
    Stdlib,
    Gin,
    Echo,
}

fn lookup_func_info<'a>(
    pkg: &'a LoadedPackage,
    name: &str,
    recv_type: &str,
) -> Option<&'a FuncInfo> {
    if recv_type.is_empty() {
        pkg.types.functions.get(name)
    } else {
        pkg.types
            .find_method(recv_type.trim_start_matches('*'), name)
            .map(|m| &m.func)
    }
}

fn type_is(type_ref: &Option<TypeRef>, pkg_suffix: &str, name: &str, pointer: bool) -> bool {
    let Some(type_ref) = type_ref else {
        return false;
    };
    type_ref.pointer == pointer
        && type_ref.name == name
        && type_ref
            .pkg_path
            .as_deref()
            .is_some_and(|p| p.ends_with(pkg_suffix))
}

fn type_is_exact(type_ref: &Option<TypeRef>, pkg: &str, name: &str, pointer: bool) -> bool {
    let Some(type_ref) = type_ref else {
        return false;
    };
    type_ref.pointer == pointer
        && type_ref.name == name
        && type_ref.pkg_path.as_deref() == Some(pkg)
}

fn is_http_request(param: &ParamInfo) -> bool {
    type_is_exact(&param.type_ref, "net/http", "Request", true)
}

fn is_context(param: &ParamInfo) -> bool {
    type_is_exact(&param.type_ref, "context", "Context", false)
}

fn is_gin_context(param: &ParamInfo) -> bool {
    type_is(&param.type_ref, "github.com/gin-gonic/gin", "Context", true)
}

fn is_echo_context(param: &ParamInfo) -> bool {
    type_is(
        &param.type_ref,
        "github.com/labstack/echo",
        "Context",
        false,
    )
}
