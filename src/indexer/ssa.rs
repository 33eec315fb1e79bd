//! Lowers Go function bodies to a single-static-assignment style IR: basic
//! blocks of ordered instructions with explicit successor edges, φ markers
//! at join points, and resolved static callees where syntax allows.
//!
//! The lowering is syntax-driven. A per-function scope tracks the best-known
//! type of each local (declared annotation, composite literal, constructor
//! result, parameter), which is what callee resolution consults. Anything
//! the scope cannot prove stays a function-value or unresolved call.

use crate::indexer::loader::{
    FuncInfo, LoadedFile, LoadedPackage, Loader, TypeRef, parse_type_ref,
};
use crate::indexer::syntax::{
    line, method_receiver_name, method_receiver_type, named_children, node_text, split_selector,
};
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

/// A statically resolved callee: the symbol-table triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticTarget {
    pub pkg_path: String,
    pub name: String,
    pub recv_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// Direct reference to a named function or method.
    Static(StaticTarget),
    /// Invocation through a value whose type is a project interface.
    Interface {
        pkg_path: String,
        iface: String,
        method: String,
    },
    /// Call through a function value; resolved when the value traces back
    /// to a direct function reference.
    FuncValue(Option<StaticTarget>),
    /// Builtin, closure, or otherwise untraceable.
    Unresolved,
}

#[derive(Debug, Clone)]
pub struct CallSite {
    pub target: CallTarget,
    pub line: i64,
    /// Pretty form for display, e.g. `(*UserStore).FindByID(id)`.
    pub expr_text: String,
}

#[derive(Debug, Clone)]
pub enum InstrKind {
    Call(CallSite),
    Defer(CallSite),
    Go(CallSite),
    If { cond: String },
    Jump,
    Return,
    Panic,
    Phi { var: String },
    Alloc { var: String },
    Store { target: String },
    Send,
    Range,
    Select,
    TypeAssert,
    Unknown,
}

impl InstrKind {
    /// Normalized op name, as rendered in CFG responses.
    pub fn op_name(&self) -> &'static str {
        match self {
            InstrKind::Call(_) => "call",
            InstrKind::Defer(_) => "defer",
            InstrKind::Go(_) => "go",
            InstrKind::If { .. } => "if",
            InstrKind::Jump => "jump",
            InstrKind::Return => "return",
            InstrKind::Panic => "panic",
            InstrKind::Phi { .. } => "phi",
            InstrKind::Alloc { .. } => "alloc",
            InstrKind::Store { .. } => "store",
            InstrKind::Send => "send",
            InstrKind::Range => "range",
            InstrKind::Select => "select",
            InstrKind::TypeAssert => "typeassert",
            InstrKind::Unknown => "unknown",
        }
    }

    pub fn call_site(&self) -> Option<&CallSite> {
        match self {
            InstrKind::Call(site) | InstrKind::Defer(site) | InstrKind::Go(site) => Some(site),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instr {
    pub kind: InstrKind,
    pub text: String,
    pub line: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub index: usize,
    pub instrs: Vec<Instr>,
    pub succs: Vec<usize>,
    pub preds: Vec<usize>,
}

#[derive(Debug)]
pub struct SsaFunction {
    pub pkg_path: String,
    pub name: String,
    /// Receiver spelling (`*T` / `T`), empty for plain functions.
    pub recv_type: String,
    pub sig: String,
    pub file: String,
    pub line: i64,
    pub blocks: Vec<Block>,
}

impl SsaFunction {
    pub fn call_sites(&self) -> impl Iterator<Item = (&Instr, &CallSite)> {
        self.blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .filter_map(|i| i.kind.call_site().map(|site| (i, site)))
    }
}

#[derive(Debug)]
pub struct SsaProgram {
    pub functions: Vec<SsaFunction>,
}

impl SsaProgram {
    pub fn find_function(
        &self,
        pkg_path: &str,
        name: &str,
        recv_type: &str,
    ) -> Option<&SsaFunction> {
        self.functions.iter().find(|f| {
            f.pkg_path == pkg_path && f.name == name && f.recv_type == recv_type
        })
    }
}

/// Lower every function body in every loaded package.
pub fn build_program(loader: &Loader) -> SsaProgram {
    let mut functions = Vec::new();
    for pkg in loader.packages() {
        functions.extend(build_package(loader, pkg));
    }
    SsaProgram { functions }
}

/// Lower every function body in a single package.
pub fn build_package(loader: &Loader, pkg: &LoadedPackage) -> Vec<SsaFunction> {
    let mut functions = Vec::new();
    for file in &pkg.files {
        let root = file.tree.root_node();
        for decl in named_children(root) {
            if decl.kind() == "function_declaration" || decl.kind() == "method_declaration" {
                if let Some(function) = lower_function(loader, pkg, file, decl) {
                    functions.push(function);
                }
            }
        }
    }
    functions
}

/// Lower a single function or method declaration.
pub fn lower_function(
    loader: &Loader,
    pkg: &LoadedPackage,
    file: &LoadedFile,
    decl: Node<'_>,
) -> Option<SsaFunction> {
    let source = &file.source;
    let name = node_text(decl.child_by_field_name("name")?, source);
    if name.is_empty() {
        return None;
    }
    let recv_type = method_receiver_type(decl, source).unwrap_or_default();

    let func_info = if recv_type.is_empty() {
        pkg.types.functions.get(&name).cloned()
    } else {
        pkg.types
            .find_method(recv_type.trim_start_matches('*'), &name)
            .map(|m| m.func.clone())
    };

    let mut lowering = Lowering::new(loader, pkg, file);
    lowering.seed_scope(decl, source, func_info.as_ref(), &recv_type);

    let body = decl.child_by_field_name("body");
    if let Some(body) = body {
        lowering.lower_block_node(body);
    }
    lowering.finish();

    Some(SsaFunction {
        pkg_path: pkg.pkg_path.clone(),
        name,
        recv_type,
        sig: func_info.map(|f| f.sig).unwrap_or_default(),
        file: file.rel_path.clone(),
        line: line(decl),
        blocks: lowering.blocks,
    })
}

#[derive(Debug, Clone, Default)]
struct VarInfo {
    type_ref: Option<TypeRef>,
    func_ref: Option<StaticTarget>,
}

struct Lowering<'a> {
    loader: &'a Loader,
    pkg: &'a LoadedPackage,
    file: &'a LoadedFile,
    blocks: Vec<Block>,
    current: usize,
    terminated: bool,
    scope: HashMap<String, VarInfo>,
    /// (continue target, break target) for enclosing loops.
    loop_stack: Vec<(usize, usize)>,
}

impl<'a> Lowering<'a> {
    fn new(loader: &'a Loader, pkg: &'a LoadedPackage, file: &'a LoadedFile) -> Self {
        let entry = Block {
            index: 0,
            ..Block::default()
        };
        Self {
            loader,
            pkg,
            file,
            blocks: vec![entry],
            current: 0,
            terminated: false,
            scope: HashMap::new(),
            loop_stack: Vec::new(),
        }
    }

    fn source(&self) -> &'a str {
        &self.file.source
    }

    fn seed_scope(
        &mut self,
        decl: Node<'_>,
        source: &str,
        func_info: Option<&FuncInfo>,
        recv_type: &str,
    ) {
        if !recv_type.is_empty() {
            if let Some(recv_name) = method_receiver_name(decl, source) {
                self.scope.insert(
                    recv_name,
                    VarInfo {
                        type_ref: Some(TypeRef {
                            pkg_path: Some(self.pkg.pkg_path.clone()),
                            name: recv_type.trim_start_matches('*').to_string(),
                            pointer: recv_type.starts_with('*'),
                        }),
                        func_ref: None,
                    },
                );
            }
        }
        if let Some(info) = func_info {
            for param in &info.params {
                if param.name.is_empty() || param.name == "_" {
                    continue;
                }
                self.scope.insert(
                    param.name.clone(),
                    VarInfo {
                        type_ref: param.type_ref.clone(),
                        func_ref: None,
                    },
                );
            }
        }
    }

    fn new_block(&mut self) -> usize {
        let index = self.blocks.len();
        self.blocks.push(Block {
            index,
            ..Block::default()
        });
        index
    }

    fn connect(&mut self, from: usize, to: usize) {
        if !self.blocks[from].succs.contains(&to) {
            self.blocks[from].succs.push(to);
        }
    }

    fn emit(&mut self, kind: InstrKind, text: String, at: i64) {
        if self.terminated {
            return;
        }
        self.blocks[self.current].instrs.push(Instr {
            kind,
            text,
            line: at,
        });
    }

    fn switch_to(&mut self, block: usize) {
        self.current = block;
        self.terminated = false;
    }

    /// Append an implicit return to the final block and compute predecessor
    /// lists.
    fn finish(&mut self) {
        if !self.terminated && !self.blocks[self.current].instrs.iter().any(is_terminator) {
            self.blocks[self.current].instrs.push(Instr {
                kind: InstrKind::Return,
                text: "return".to_string(),
                line: 0,
            });
        }
        let edges: Vec<(usize, usize)> = self
            .blocks
            .iter()
            .flat_map(|b| b.succs.iter().map(move |s| (b.index, *s)))
            .collect();
        for (from, to) in edges {
            if !self.blocks[to].preds.contains(&from) {
                self.blocks[to].preds.push(from);
            }
        }
    }

    fn lower_block_node(&mut self, block: Node<'_>) -> HashSet<String> {
        let mut assigned = HashSet::new();
        for stmt in named_children(block) {
            if self.terminated {
                break;
            }
            self.lower_statement(stmt, &mut assigned);
        }
        assigned
    }

    fn lower_statement(&mut self, stmt: Node<'_>, assigned: &mut HashSet<String>) {
        let source = self.source();
        match stmt.kind() {
            "short_var_declaration" => {
                if let Some(right) = stmt.child_by_field_name("right") {
                    self.emit_calls(right);
                }
                self.record_short_var(stmt, assigned);
            }
            "var_declaration" => {
                for spec in named_children(stmt) {
                    if spec.kind() != "var_spec" {
                        continue;
                    }
                    if let Some(value) = spec.child_by_field_name("value") {
                        self.emit_calls(value);
                    }
                    self.record_var_spec(spec, assigned);
                }
            }
            "assignment_statement" => {
                if let Some(right) = stmt.child_by_field_name("right") {
                    self.emit_calls(right);
                }
                if let Some(left) = stmt.child_by_field_name("left") {
                    self.emit_calls(left);
                    let target = node_text(left, source);
                    self.record_assignment(stmt, assigned);
                    self.emit(
                        InstrKind::Store {
                            target: target.clone(),
                        },
                        format!("store {target}"),
                        line(stmt),
                    );
                }
            }
            "inc_statement" | "dec_statement" => {
                let target = named_children(stmt)
                    .first()
                    .map(|n| node_text(*n, source))
                    .unwrap_or_default();
                assigned.insert(target.clone());
                self.emit(
                    InstrKind::Store {
                        target: target.clone(),
                    },
                    format!("store {target}"),
                    line(stmt),
                );
            }
            "expression_statement" => {
                for expr in named_children(stmt) {
                    self.emit_calls(expr);
                }
            }
            "send_statement" => {
                if let Some(value) = stmt.child_by_field_name("value") {
                    self.emit_calls(value);
                }
                self.emit(InstrKind::Send, node_text(stmt, source), line(stmt));
            }
            "defer_statement" => {
                if let Some(call) = named_children(stmt).into_iter().next() {
                    self.emit_call_like(call, CallStyle::Defer);
                }
            }
            "go_statement" => {
                if let Some(call) = named_children(stmt).into_iter().next() {
                    self.emit_call_like(call, CallStyle::Go);
                }
            }
            "return_statement" => {
                for expr in named_children(stmt) {
                    self.emit_calls(expr);
                }
                let text = match named_children(stmt).first() {
                    Some(exprs) => format!("return {}", node_text(*exprs, source)),
                    None => "return".to_string(),
                };
                self.emit(InstrKind::Return, text, line(stmt));
                self.terminated = true;
            }
            "if_statement" => self.lower_if(stmt, assigned),
            "for_statement" => self.lower_for(stmt, assigned),
            "expression_switch_statement" => self.lower_switch(stmt, assigned, false),
            "type_switch_statement" => self.lower_switch(stmt, assigned, true),
            "select_statement" => self.lower_select(stmt, assigned),
            "break_statement" => {
                if let Some((_, after)) = self.loop_stack.last().copied() {
                    self.emit(InstrKind::Jump, "jump".to_string(), line(stmt));
                    let current = self.current;
                    self.connect(current, after);
                }
                self.terminated = true;
            }
            "continue_statement" => {
                if let Some((header, _)) = self.loop_stack.last().copied() {
                    self.emit(InstrKind::Jump, "jump".to_string(), line(stmt));
                    let current = self.current;
                    self.connect(current, header);
                }
                self.terminated = true;
            }
            "labeled_statement" => {
                for child in named_children(stmt) {
                    if child.kind() != "label_name" {
                        self.lower_statement(child, assigned);
                    }
                }
            }
            "block" => {
                let inner = self.lower_block_node(stmt);
                assigned.extend(inner);
            }
            _ => {
                // Fallback: surface any call expressions in unmodeled
                // statements rather than dropping them.
                self.emit_calls(stmt);
            }
        }
    }

    fn lower_if(&mut self, stmt: Node<'_>, assigned: &mut HashSet<String>) {
        let source = self.source();
        if let Some(init) = stmt.child_by_field_name("initializer") {
            self.lower_statement(init, assigned);
        }
        let cond_text = stmt
            .child_by_field_name("condition")
            .map(|n| {
                self.emit_calls(n);
                node_text(n, source)
            })
            .unwrap_or_default();
        self.emit(
            InstrKind::If {
                cond: cond_text.clone(),
            },
            format!("if {cond_text}"),
            line(stmt),
        );

        let cond_block = self.current;
        let then_block = self.new_block();
        self.connect(cond_block, then_block);

        let saved_scope = self.scope.clone();
        self.switch_to(then_block);
        let then_assigned = stmt
            .child_by_field_name("consequence")
            .map(|body| self.lower_block_node(body))
            .unwrap_or_default();
        let then_exit = if self.terminated {
            None
        } else {
            Some(self.current)
        };
        self.scope = saved_scope.clone();

        let (else_entry, else_exit, else_assigned) = match stmt.child_by_field_name("alternative") {
            Some(alt) => {
                let else_block = self.new_block();
                self.switch_to(else_block);
                let mut alt_assigned = HashSet::new();
                if alt.kind() == "block" {
                    alt_assigned = self.lower_block_node(alt);
                } else {
                    self.lower_statement(alt, &mut alt_assigned);
                }
                let exit = if self.terminated {
                    None
                } else {
                    Some(self.current)
                };
                self.scope = saved_scope;
                (Some(else_block), exit, alt_assigned)
            }
            None => (None, Some(cond_block), HashSet::new()),
        };

        if let Some(else_entry) = else_entry {
            self.connect(cond_block, else_entry);
        }

        // Join block for whichever arms fall through.
        let mut exits = Vec::new();
        if let Some(exit) = then_exit {
            exits.push(exit);
        }
        if let Some(exit) = else_exit {
            exits.push(exit);
        }
        if exits.is_empty() {
            // Both arms terminated; continue into an unreachable block so
            // later statements still lower.
            let join = self.new_block();
            self.switch_to(join);
            self.terminated = true;
            return;
        }

        let join = self.new_block();
        for exit in exits {
            self.connect(exit, join);
        }
        self.switch_to(join);
        self.insert_phis(join, &[&then_assigned, &else_assigned], 2, line(stmt));
        assigned.extend(then_assigned);
        assigned.extend(else_assigned);
    }

    fn lower_for(&mut self, stmt: Node<'_>, assigned: &mut HashSet<String>) {
        let source = self.source();
        let mut is_range = false;
        let mut cond_text = String::new();

        for child in named_children(stmt) {
            match child.kind() {
                "for_clause" => {
                    if let Some(init) = child.child_by_field_name("initializer") {
                        self.lower_statement(init, assigned);
                    }
                    if let Some(cond) = child.child_by_field_name("condition") {
                        cond_text = node_text(cond, source);
                    }
                }
                "range_clause" => {
                    is_range = true;
                    if let Some(right) = child.child_by_field_name("right") {
                        self.emit_calls(right);
                        cond_text = format!("range {}", node_text(right, source));
                    }
                    if let Some(left) = child.child_by_field_name("left") {
                        for name_node in named_children(left) {
                            let name = node_text(name_node, source);
                            if !name.is_empty() && name != "_" {
                                self.scope.insert(name.clone(), VarInfo::default());
                                assigned.insert(name);
                            }
                        }
                    }
                }
                _ if child.kind() != "block" => {
                    // Bare `for cond {}` condition expression.
                    cond_text = node_text(child, source);
                }
                _ => {}
            }
        }

        let header = self.new_block();
        let entry = self.current;
        self.connect(entry, header);
        self.switch_to(header);
        if is_range {
            self.emit(InstrKind::Range, cond_text.clone(), line(stmt));
        } else if !cond_text.is_empty() {
            self.emit(
                InstrKind::If {
                    cond: cond_text.clone(),
                },
                format!("if {cond_text}"),
                line(stmt),
            );
        }

        let body_block = self.new_block();
        let after_block = self.new_block();
        self.connect(header, body_block);
        self.connect(header, after_block);

        self.loop_stack.push((header, after_block));
        let saved_scope = self.scope.clone();
        self.switch_to(body_block);
        let body_assigned = stmt
            .child_by_field_name("body")
            .map(|body| self.lower_block_node(body))
            .unwrap_or_default();
        if !self.terminated {
            let exit = self.current;
            self.connect(exit, header);
        }
        self.scope = saved_scope;
        self.loop_stack.pop();

        self.insert_phis(header, &[&body_assigned], 1, line(stmt));
        assigned.extend(body_assigned);
        self.switch_to(after_block);
    }

    fn lower_switch(&mut self, stmt: Node<'_>, assigned: &mut HashSet<String>, type_switch: bool) {
        let source = self.source();
        if let Some(init) = stmt.child_by_field_name("initializer") {
            self.lower_statement(init, assigned);
        }
        if let Some(value) = stmt.child_by_field_name("value") {
            self.emit_calls(value);
        }

        let subject = stmt
            .child_by_field_name("value")
            .map(|n| node_text(n, source))
            .unwrap_or_default();

        let cases: Vec<Node<'_>> = named_children(stmt)
            .into_iter()
            .filter(|n| {
                matches!(
                    n.kind(),
                    "expression_case" | "type_case" | "default_case"
                )
            })
            .collect();

        let join = self.new_block();
        let mut case_assigned: Vec<HashSet<String>> = Vec::new();
        let mut cond_block = self.current;
        let saved_scope = self.scope.clone();

        if cases.is_empty() {
            self.connect(cond_block, join);
        }

        for (i, case) in cases.iter().enumerate() {
            let is_default = case.kind() == "default_case";
            let body_block = self.new_block();

            if !is_default {
                self.switch_to(cond_block);
                let case_cond = case
                    .child_by_field_name("value")
                    .or_else(|| case.child_by_field_name("type"))
                    .map(|n| node_text(n, source))
                    .unwrap_or_default();
                let cond = if subject.is_empty() {
                    case_cond
                } else if type_switch {
                    format!("{subject}.({case_cond})")
                } else {
                    format!("{subject} == {case_cond}")
                };
                if type_switch {
                    self.emit(InstrKind::TypeAssert, cond.clone(), line(*case));
                } else {
                    self.emit(
                        InstrKind::If { cond: cond.clone() },
                        format!("if {cond}"),
                        line(*case),
                    );
                }
                self.connect(cond_block, body_block);
                // Fall through to the next case test (or the join when this
                // is the last one).
                let next = if i + 1 < cases.len() {
                    let next_cond = self.new_block();
                    self.connect(cond_block, next_cond);
                    next_cond
                } else {
                    self.connect(cond_block, join);
                    join
                };
                cond_block = next;
            } else {
                self.connect(cond_block, body_block);
            }

            self.switch_to(body_block);
            self.scope = saved_scope.clone();
            let mut body_set = HashSet::new();
            for child in named_children(*case) {
                if child.kind() == "expression_list" {
                    continue;
                }
                if self.terminated {
                    break;
                }
                self.lower_statement(child, &mut body_set);
            }
            if !self.terminated {
                let exit = self.current;
                self.connect(exit, join);
            }
            case_assigned.push(body_set);
        }

        self.scope = saved_scope;
        self.switch_to(join);
        let refs: Vec<&HashSet<String>> = case_assigned.iter().collect();
        self.insert_phis(join, &refs, 2, line(stmt));
        for set in case_assigned {
            assigned.extend(set);
        }
    }

    fn lower_select(&mut self, stmt: Node<'_>, assigned: &mut HashSet<String>) {
        self.emit(InstrKind::Select, "select".to_string(), line(stmt));
        let header = self.current;
        let join = self.new_block();
        let saved_scope = self.scope.clone();

        for case in named_children(stmt) {
            if case.kind() != "communication_case" && case.kind() != "default_case" {
                continue;
            }
            let body = self.new_block();
            self.connect(header, body);
            self.switch_to(body);
            self.scope = saved_scope.clone();
            let mut body_set = HashSet::new();
            for child in named_children(case) {
                if child.kind() == "send_statement" || child.kind() == "receive_statement" {
                    self.emit_calls(child);
                    continue;
                }
                if self.terminated {
                    break;
                }
                self.lower_statement(child, &mut body_set);
            }
            if !self.terminated {
                let exit = self.current;
                self.connect(exit, join);
            }
            assigned.extend(body_set);
        }

        self.scope = saved_scope;
        self.switch_to(join);
    }

    /// Insert φ markers for names assigned on at least `min_defs` incoming
    /// branches. Joins after a conditional need two; a loop header needs
    /// one, since the back edge always pairs with the initial definition.
    fn insert_phis(
        &mut self,
        block: usize,
        branch_sets: &[&HashSet<String>],
        min_defs: usize,
        at: i64,
    ) {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for set in branch_sets {
            for name in set.iter() {
                *counts.entry(name.as_str()).or_default() += 1;
            }
        }
        let mut vars: Vec<&str> = counts
            .into_iter()
            .filter(|(_, n)| *n >= min_defs)
            .map(|(name, _)| name)
            .collect();
        vars.sort_unstable();
        let phis: Vec<Instr> = vars
            .into_iter()
            .map(|var| Instr {
                kind: InstrKind::Phi {
                    var: var.to_string(),
                },
                text: format!("phi {var}"),
                line: at,
            })
            .collect();
        self.blocks[block].instrs.splice(0..0, phis);
    }

    // Variable recording.

    fn record_short_var(&mut self, stmt: Node<'_>, assigned: &mut HashSet<String>) {
        let source = self.source();
        let Some(left) = stmt.child_by_field_name("left") else {
            return;
        };
        let names: Vec<String> = named_children(left)
            .into_iter()
            .map(|n| node_text(n, source))
            .collect();
        let values: Vec<Node<'_>> = stmt
            .child_by_field_name("right")
            .map(named_children)
            .unwrap_or_default();

        for (i, name) in names.iter().enumerate() {
            if name.is_empty() || name == "_" {
                continue;
            }
            let info = values
                .get(i)
                .map(|value| self.infer_var_info(*value))
                .unwrap_or_default();
            self.scope.insert(name.clone(), info);
            assigned.insert(name.clone());
            self.emit(
                InstrKind::Alloc { var: name.clone() },
                format!("local {name}"),
                line(stmt),
            );
        }
    }

    fn record_var_spec(&mut self, spec: Node<'_>, assigned: &mut HashSet<String>) {
        let source = self.source();
        let declared_type = spec.child_by_field_name("type").map(|type_node| {
            parse_type_ref(type_node, source, &self.pkg.pkg_path, &self.file.imports)
        });
        let values: Vec<Node<'_>> = spec
            .child_by_field_name("value")
            .map(named_children)
            .unwrap_or_default();

        let mut names = Vec::new();
        for idx in 0..spec.child_count() {
            if let Some(child) = spec.child(idx) {
                if spec.field_name_for_child(idx as u32) == Some("name") {
                    names.push(node_text(child, source));
                }
            }
        }

        for (i, name) in names.iter().enumerate() {
            if name.is_empty() || name == "_" {
                continue;
            }
            let info = match &declared_type {
                Some(type_ref) => VarInfo {
                    type_ref: Some(type_ref.clone()),
                    func_ref: None,
                },
                None => values
                    .get(i)
                    .map(|value| self.infer_var_info(*value))
                    .unwrap_or_default(),
            };
            self.scope.insert(name.clone(), info);
            assigned.insert(name.clone());
            self.emit(
                InstrKind::Alloc { var: name.clone() },
                format!("local {name}"),
                line(spec),
            );
        }
    }

    fn record_assignment(&mut self, stmt: Node<'_>, assigned: &mut HashSet<String>) {
        let source = self.source();
        let Some(left) = stmt.child_by_field_name("left") else {
            return;
        };
        let values: Vec<Node<'_>> = stmt
            .child_by_field_name("right")
            .map(named_children)
            .unwrap_or_default();
        for (i, target) in named_children(left).into_iter().enumerate() {
            let name = node_text(target, source);
            assigned.insert(name.clone());
            // Re-typing only applies to simple identifiers.
            if target.kind() == "identifier" {
                if let Some(value) = values.get(i) {
                    let info = self.infer_var_info(*value);
                    if info.type_ref.is_some() || info.func_ref.is_some() {
                        self.scope.insert(name, info);
                    }
                }
            }
        }
    }

    /// Infer scope info for the value assigned to a variable.
    fn infer_var_info(&self, value: Node<'_>) -> VarInfo {
        let func_ref = self.resolve_func_reference(value);
        VarInfo {
            type_ref: self.resolve_expr_type(value),
            func_ref,
        }
    }

    /// Trace a direct function reference (`v := pkg.Fn`, `v := Fn`) so a
    /// later `v()` resolves as a funcval call.
    fn resolve_func_reference(&self, value: Node<'_>) -> Option<StaticTarget> {
        let source = self.source();
        match value.kind() {
            "identifier" => {
                let name = node_text(value, source);
                if self.pkg.types.functions.contains_key(&name) {
                    return Some(StaticTarget {
                        pkg_path: self.pkg.pkg_path.clone(),
                        name,
                        recv_type: String::new(),
                    });
                }
                self.scope.get(&name).and_then(|v| v.func_ref.clone())
            }
            "selector_expression" => {
                let (operand, field) = split_selector(value, source)?;
                if operand.kind() == "identifier" {
                    let alias = node_text(operand, source);
                    if !self.scope.contains_key(&alias) {
                        if let Some(import_path) = self.file.imports.get(&alias) {
                            return Some(StaticTarget {
                                pkg_path: import_path.clone(),
                                name: field,
                                recv_type: String::new(),
                            });
                        }
                    }
                }
                None
            }
            "parenthesized_expression" => named_children(value)
                .into_iter()
                .next()
                .and_then(|inner| self.resolve_func_reference(inner)),
            _ => None,
        }
    }

    /// Best-known type of an expression, via the scope and package tables.
    fn resolve_expr_type(&self, expr: Node<'_>) -> Option<TypeRef> {
        let source = self.source();
        match expr.kind() {
            "identifier" => {
                let name = node_text(expr, source);
                self.scope.get(&name).and_then(|v| v.type_ref.clone())
            }
            "selector_expression" => {
                let (operand, field) = split_selector(expr, source)?;
                let operand_type = self.resolve_expr_type(operand)?;
                let pkg_path = operand_type.pkg_path.as_deref()?;
                let pkg = self.loader.package_by_path(pkg_path)?;
                pkg.types
                    .structs
                    .get(&operand_type.name)
                    .and_then(|s| s.fields.get(&field))
                    .cloned()
            }
            "unary_expression" => {
                let operator = expr
                    .child_by_field_name("operator")
                    .map(|n| node_text(n, source))
                    .unwrap_or_default();
                let operand = expr.child_by_field_name("operand")?;
                let mut inner = self.resolve_expr_type(operand)?;
                match operator.as_str() {
                    "&" => inner.pointer = true,
                    "*" => inner.pointer = false,
                    _ => {}
                }
                Some(inner)
            }
            "composite_literal" => {
                let type_node = expr.child_by_field_name("type")?;
                Some(parse_type_ref(
                    type_node,
                    source,
                    &self.pkg.pkg_path,
                    &self.file.imports,
                ))
            }
            "call_expression" => {
                let function = expr.child_by_field_name("function")?;
                match self.resolve_callee(function).0 {
                    CallTarget::Static(target) => self.function_result_type(&target),
                    _ => None,
                }
            }
            "type_assertion_expression" => {
                let type_node = expr.child_by_field_name("type")?;
                Some(parse_type_ref(
                    type_node,
                    source,
                    &self.pkg.pkg_path,
                    &self.file.imports,
                ))
            }
            "parenthesized_expression" => named_children(expr)
                .into_iter()
                .next()
                .and_then(|inner| self.resolve_expr_type(inner)),
            _ => None,
        }
    }

    fn function_result_type(&self, target: &StaticTarget) -> Option<TypeRef> {
        let pkg = self.loader.package_by_path(&target.pkg_path)?;
        let info = if target.recv_type.is_empty() {
            pkg.types.functions.get(&target.name)?
        } else {
            &pkg.types
                .find_method(target.recv_type.trim_start_matches('*'), &target.name)?
                .func
        };
        info.results.first().and_then(|r| r.type_ref.clone())
    }

    /// Classify the callee of a call expression.
    fn resolve_callee(&self, function: Node<'_>) -> (CallTarget, String) {
        let source = self.source();
        match function.kind() {
            "identifier" => {
                let name = node_text(function, source);
                if let Some(var) = self.scope.get(&name) {
                    return (CallTarget::FuncValue(var.func_ref.clone()), name);
                }
                if is_builtin_func(&name) {
                    return (CallTarget::Unresolved, name);
                }
                if self.pkg.types.functions.contains_key(&name) {
                    return (
                        CallTarget::Static(StaticTarget {
                            pkg_path: self.pkg.pkg_path.clone(),
                            name: name.clone(),
                            recv_type: String::new(),
                        }),
                        name,
                    );
                }
                (CallTarget::Unresolved, name)
            }
            "selector_expression" => {
                let Some((operand, method)) = split_selector(function, source) else {
                    return (CallTarget::Unresolved, node_text(function, source));
                };

                // Import alias: cross-package function call.
                if operand.kind() == "identifier" {
                    let alias = node_text(operand, source);
                    if !self.scope.contains_key(&alias) {
                        if let Some(import_path) = self.file.imports.get(&alias) {
                            let text = format!("{alias}.{method}");
                            return (
                                CallTarget::Static(StaticTarget {
                                    pkg_path: import_path.clone(),
                                    name: method,
                                    recv_type: String::new(),
                                }),
                                text,
                            );
                        }
                    }
                }

                // Method call on a value with a known type.
                match self.resolve_expr_type(operand) {
                    Some(type_ref) => self.resolve_method_call(&type_ref, &method),
                    None => (
                        CallTarget::Unresolved,
                        format!("{}.{}", node_text(operand, source), method),
                    ),
                }
            }
            "func_literal" => (CallTarget::FuncValue(None), "func literal".to_string()),
            "parenthesized_expression" => named_children(function)
                .into_iter()
                .next()
                .map(|inner| self.resolve_callee(inner))
                .unwrap_or((CallTarget::Unresolved, node_text(function, source))),
            _ => (CallTarget::Unresolved, node_text(function, source)),
        }
    }

    fn resolve_method_call(&self, type_ref: &TypeRef, method: &str) -> (CallTarget, String) {
        let Some(pkg_path) = type_ref.pkg_path.as_deref() else {
            return (
                CallTarget::Unresolved,
                format!("{}.{}", type_ref.name, method),
            );
        };
        let Some(pkg) = self.loader.package_by_path(pkg_path) else {
            return (
                CallTarget::Unresolved,
                format!("{}.{}", type_ref.name, method),
            );
        };

        if pkg.types.interfaces.contains_key(&type_ref.name) {
            return (
                CallTarget::Interface {
                    pkg_path: pkg_path.to_string(),
                    iface: type_ref.name.clone(),
                    method: method.to_string(),
                },
                format!("{}.{}", type_ref.name, method),
            );
        }

        match pkg.types.find_method(&type_ref.name, method) {
            Some(info) => {
                let text = format!("({}).{}", info.recv_type, method);
                (
                    CallTarget::Static(StaticTarget {
                        pkg_path: pkg_path.to_string(),
                        name: method.to_string(),
                        recv_type: info.recv_type.clone(),
                    }),
                    text,
                )
            }
            None => (
                CallTarget::Unresolved,
                format!("{}.{}", type_ref.name, method),
            ),
        }
    }

    // Call emission.

    /// Emit Call instructions for every call expression under `node`, in
    /// evaluation order (inner calls first). Closure bodies are not
    /// descended into; they belong to the anonymous function.
    fn emit_calls(&mut self, node: Node<'_>) {
        if node.kind() == "func_literal" {
            return;
        }
        for child in named_children(node) {
            self.emit_calls(child);
        }
        if node.kind() == "call_expression" {
            self.emit_call_like(node, CallStyle::Plain);
        }
    }

    fn emit_call_like(&mut self, call: Node<'_>, style: CallStyle) {
        let source = self.source();
        if call.kind() != "call_expression" {
            // `defer`/`go` bodies occasionally wrap the call in parens.
            for child in named_children(call) {
                if child.kind() == "call_expression" {
                    self.emit_call_like(child, style);
                }
            }
            return;
        }

        // For defer/go the argument expressions are evaluated immediately.
        if style != CallStyle::Plain {
            if let Some(args) = call.child_by_field_name("arguments") {
                self.emit_calls(args);
            }
        }

        let Some(function) = call.child_by_field_name("function") else {
            return;
        };

        // panic(x) lowers to its own instruction kind.
        if function.kind() == "identifier" && node_text(function, source) == "panic" {
            self.emit(
                InstrKind::Panic,
                format!("panic{}", args_text(call, source)),
                line(call),
            );
            self.terminated = true;
            return;
        }

        let (target, callee_text) = self.resolve_callee(function);
        let text = format!("{}{}", callee_text, args_text(call, source));
        let site = CallSite {
            target,
            line: line(call),
            expr_text: text.clone(),
        };
        let (kind, text) = match style {
            CallStyle::Plain => (InstrKind::Call(site), text),
            CallStyle::Defer => (InstrKind::Defer(site), format!("defer {text}")),
            CallStyle::Go => (InstrKind::Go(site), format!("go {text}")),
        };
        self.emit(kind, text, line(call));
    }
}

#[derive(Clone, Copy, PartialEq)]
enum CallStyle {
    Plain,
    Defer,
    Go,
}

fn args_text(call: Node<'_>, source: &str) -> String {
    call.child_by_field_name("arguments")
        .map(|args| node_text(args, source))
        .unwrap_or_else(|| "()".to_string())
}

fn is_terminator(instr: &Instr) -> bool {
    matches!(
        instr.kind,
        InstrKind::Return | InstrKind::Panic | InstrKind::Jump
    )
}

fn is_builtin_func(name: &str) -> bool {
    matches!(
        name,
        "append"
            | "cap"
            | "clear"
            | "close"
            | "complex"
            | "copy"
            | "delete"
            | "imag"
            | "len"
            | "make"
            | "max"
            | "min"
            | "new"
            | "panic"
            | "print"
            | "println"
            | "real"
            | "recover"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;
    use tempfile::TempDir;

    fn loaded(files: &[(&str, &str)]) -> (TempDir, Loader) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let mut loader = Loader::new(Config::default(), dir.path());
        loader.load().unwrap();
        (dir, loader)
    }

    fn static_targets(function: &SsaFunction) -> Vec<(String, String, String)> {
        function
            .call_sites()
            .filter_map(|(_, site)| match &site.target {
                CallTarget::Static(t) => {
                    Some((t.pkg_path.clone(), t.name.clone(), t.recv_type.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn resolves_same_package_and_method_calls() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

type Greeter struct{}

func (g *Greeter) Greet() {}

func helper() {}

func main() {
    g := &Greeter{}
    g.Greet()
    helper()
}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let main_fn = program.find_function("myapp", "main", "").unwrap();
        let targets = static_targets(main_fn);
        assert!(targets.contains(&("myapp".into(), "Greet".into(), "*Greeter".into())));
        assert!(targets.contains(&("myapp".into(), "helper".into(), "".into())));
    }

    #[test]
    fn resolves_struct_field_method_calls() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "svc/service.go",
                r#"package svc

import "myapp/store"

type UserService struct {
    store *store.UserStore
}

func (s *UserService) Get(id int) {
    s.store.FindByID(id)
}
"#,
            ),
            (
                "store/store.go",
                r#"package store

type UserStore struct{}

func (s *UserStore) FindByID(id int) {}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let get = program
            .find_function("myapp/svc", "Get", "*UserService")
            .unwrap();
        let targets = static_targets(get);
        assert!(targets.contains(&(
            "myapp/store".into(),
            "FindByID".into(),
            "*UserStore".into()
        )));
    }

    #[test]
    fn classifies_interface_defer_and_go_calls() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

type Notifier interface {
    Notify(msg string)
}

func cleanup() {}
func work() {}

func run(n Notifier) {
    defer cleanup()
    go work()
    n.Notify("done")
}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let run = program.find_function("myapp", "run", "").unwrap();

        let mut kinds = Vec::new();
        for block in &run.blocks {
            for instr in &block.instrs {
                match &instr.kind {
                    InstrKind::Defer(site) => kinds.push(("defer", site.target.clone())),
                    InstrKind::Go(site) => kinds.push(("go", site.target.clone())),
                    InstrKind::Call(site) => kinds.push(("call", site.target.clone())),
                    _ => {}
                }
            }
        }
        assert!(kinds.iter().any(|(style, target)| *style == "defer"
            && matches!(target, CallTarget::Static(t) if t.name == "cleanup")));
        assert!(kinds.iter().any(|(style, target)| *style == "go"
            && matches!(target, CallTarget::Static(t) if t.name == "work")));
        assert!(kinds.iter().any(|(style, target)| *style == "call"
            && matches!(
                target,
                CallTarget::Interface { iface, method, .. }
                    if iface == "Notifier" && method == "Notify"
            )));
    }

    #[test]
    fn traces_function_values() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

func worker() {}

func main() {
    f := worker
    f()
}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let main_fn = program.find_function("myapp", "main", "").unwrap();
        let funcvals: Vec<_> = main_fn
            .call_sites()
            .filter_map(|(_, site)| match &site.target {
                CallTarget::FuncValue(Some(t)) => Some(t.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(funcvals, vec!["worker".to_string()]);
    }

    #[test]
    fn if_else_produces_branch_blocks_and_phi() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

func pick(flag bool) int {
    x := 0
    if flag {
        x = 1
    } else {
        x = 2
    }
    return x
}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let pick = program.find_function("myapp", "pick", "").unwrap();

        assert!(pick.blocks.len() >= 4);
        let entry = &pick.blocks[0];
        assert_eq!(entry.succs.len(), 2);
        assert!(entry
            .instrs
            .iter()
            .any(|i| matches!(&i.kind, InstrKind::If { cond } if cond == "flag")));

        let has_phi = pick.blocks.iter().any(|b| {
            b.instrs
                .iter()
                .any(|i| matches!(&i.kind, InstrKind::Phi { var } if var == "x"))
        });
        assert!(has_phi, "join block should carry a phi for x");

        // The return block has no successors.
        let exit_blocks: Vec<_> = pick.blocks.iter().filter(|b| b.succs.is_empty()).collect();
        assert!(!exit_blocks.is_empty());
    }

    #[test]
    fn for_loop_creates_back_edge() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

func count(n int) int {
    total := 0
    for i := 0; i < n; i++ {
        total += i
    }
    return total
}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let count = program.find_function("myapp", "count", "").unwrap();

        let has_back_edge = count
            .blocks
            .iter()
            .any(|b| b.succs.iter().any(|s| *s < b.index));
        assert!(has_back_edge, "loop body should jump back to its header");
    }

    #[test]
    fn switch_lowers_to_condition_chain() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

func handleA() {}
func handleB() {}
func handleDefault() {}

func dispatch(kind string) {
    switch kind {
    case "a":
        handleA()
    case "b":
        handleB()
    default:
        handleDefault()
    }
}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let dispatch = program.find_function("myapp", "dispatch", "").unwrap();

        let targets = static_targets(dispatch);
        assert!(targets.iter().any(|(_, name, _)| name == "handleA"));
        assert!(targets.iter().any(|(_, name, _)| name == "handleB"));
        assert!(targets.iter().any(|(_, name, _)| name == "handleDefault"));

        let conds: Vec<&str> = dispatch
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .filter_map(|i| match &i.kind {
                InstrKind::If { cond } => Some(cond.as_str()),
                _ => None,
            })
            .collect();
        assert!(conds.contains(&"kind == \"a\""));
        assert!(conds.contains(&"kind == \"b\""));
    }

    #[test]
    fn select_cases_branch_from_header() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

func onMessage() {}
func onTimeout() {}

func wait(msgs chan int, timeout chan int) {
    select {
    case <-msgs:
        onMessage()
    case <-timeout:
        onTimeout()
    }
}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let wait = program.find_function("myapp", "wait", "").unwrap();

        let header = wait
            .blocks
            .iter()
            .find(|b| {
                b.instrs
                    .iter()
                    .any(|i| matches!(i.kind, InstrKind::Select))
            })
            .unwrap();
        assert_eq!(header.succs.len(), 2);

        let targets = static_targets(wait);
        assert!(targets.iter().any(|(_, name, _)| name == "onMessage"));
        assert!(targets.iter().any(|(_, name, _)| name == "onTimeout"));
    }

    #[test]
    fn panic_terminates_its_block() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

func guard(ok bool) {
    if !ok {
        panic("not ok")
    }
}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let guard = program.find_function("myapp", "guard", "").unwrap();

        let panic_block = guard
            .blocks
            .iter()
            .find(|b| b.instrs.iter().any(|i| matches!(i.kind, InstrKind::Panic)))
            .unwrap();
        assert!(panic_block.succs.is_empty());
    }

    #[test]
    fn constructor_result_types_inform_resolution() {
        let (_dir, loader) = loaded(&[
            ("go.mod", "module myapp\n"),
            (
                "main.go",
                r#"package main

type Client struct{}

func NewClient() *Client {
    return &Client{}
}

func (c *Client) Do() {}

func main() {
    c := NewClient()
    c.Do()
}
"#,
            ),
        ]);
        let program = build_program(&loader);
        let main_fn = program.find_function("myapp", "main", "").unwrap();
        let targets = static_targets(main_fn);
        assert!(targets.contains(&("myapp".into(), "Do".into(), "*Client".into())));
    }
}
