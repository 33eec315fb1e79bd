use crate::config::Config;
use crate::db::Store;
use crate::error::{QueryError, QueryResult};
use crate::indexer::loader::Loader;
use crate::indexer::ssa::{self, CallTarget, InstrKind, SsaFunction};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct InstructionInfo {
    pub index: usize,
    pub op: String,
    pub text: String,
    pub callee_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BasicBlockInfo {
    pub index: usize,
    pub instructions: Vec<InstructionInfo>,
    pub successors: Vec<usize>,
    pub predecessors: Vec<usize>,
    pub is_entry: bool,
    pub is_exit: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub branch_cond: String,
}

#[derive(Debug, Serialize)]
pub struct CfgInfo {
    pub symbol_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub signature: String,
    pub blocks: Vec<BasicBlockInfo>,
    pub entry_block: usize,
    pub exit_blocks: Vec<usize>,
}

/// Builds the per-function control-flow graph on demand by reloading the
/// symbol's project and re-lowering its package. The rebuilt program is
/// per-request and dropped when the response is built.
pub struct CfgBuilder<'a> {
    store: &'a Store,
}

impl<'a> CfgBuilder<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn build_cfg(&self, symbol_id: i64) -> QueryResult<CfgInfo> {
        let sym = self
            .store
            .get_symbol_by_id(symbol_id)?
            .ok_or_else(|| QueryError::NotFound(format!("symbol {symbol_id}")))?;

        let project_dir = self
            .store
            .get_metadata("project_dir")?
            .ok_or_else(|| QueryError::Analysis("project directory not recorded".to_string()))?;

        let cfg = Config::load_from_dir(project_dir.as_ref())
            .map_err(|err| QueryError::Analysis(format!("loading config: {err:#}")))?;
        let mut loader = Loader::new(cfg, project_dir.as_ref());
        loader
            .load()
            .map_err(|err| QueryError::Analysis(format!("loading packages: {err:#}")))?;

        let pkg = loader.package_by_path(&sym.pkg_path).ok_or_else(|| {
            QueryError::Analysis(format!("package {} not found in project", sym.pkg_path))
        })?;

        let functions = ssa::build_package(&loader, pkg);
        let function = functions
            .iter()
            .find(|f| f.name == sym.name && f.recv_type == sym.recv_type)
            .ok_or_else(|| {
                QueryError::Analysis(format!("SSA function not found for {}", sym.name))
            })?;

        Ok(self.build_from_function(symbol_id, function))
    }

    fn build_from_function(&self, symbol_id: i64, function: &SsaFunction) -> CfgInfo {
        let mut blocks = Vec::new();
        let mut exit_blocks = Vec::new();

        for block in &function.blocks {
            let is_exit = block.succs.is_empty();
            if is_exit {
                exit_blocks.push(block.index);
            }

            let instructions = block
                .instrs
                .iter()
                .enumerate()
                .map(|(index, instr)| InstructionInfo {
                    index,
                    op: instr.kind.op_name().to_string(),
                    text: instr.text.clone(),
                    callee_id: self.resolve_callee_id(&instr.kind),
                })
                .collect();

            let branch_cond = block
                .instrs
                .last()
                .map(|instr| match &instr.kind {
                    InstrKind::If { cond } => cond.clone(),
                    InstrKind::Return => "return".to_string(),
                    InstrKind::Panic => "panic".to_string(),
                    _ => String::new(),
                })
                .unwrap_or_default();

            blocks.push(BasicBlockInfo {
                index: block.index,
                instructions,
                successors: block.succs.clone(),
                predecessors: block.preds.clone(),
                is_entry: block.index == 0,
                is_exit,
                branch_cond,
            });
        }

        CfgInfo {
            symbol_id,
            name: function.name.clone(),
            signature: function.sig.clone(),
            blocks,
            entry_block: 0,
            exit_blocks,
        }
    }

    fn resolve_callee_id(&self, kind: &InstrKind) -> Option<i64> {
        let site = kind.call_site()?;
        let CallTarget::Static(target) = &site.target else {
            return None;
        };
        self.store
            .get_symbol_id(&target.pkg_path, &target.name, &target.recv_type)
            .ok()
            .flatten()
    }
}
