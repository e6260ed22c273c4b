//! Constant propagation over a function's lifted blocks.
//!
//! The engine runs a forward worklist analysis. Register values flow along
//! intraprocedural edges and are met at joins (a value survives only if every
//! visited predecessor agrees on it). Temporaries and forwarded stores are
//! local to one block. The final value of every temporary is recorded in a
//! [`ReplacementMap`] at the owning block's location.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    AbstractValue, CodeLocation, CompletedFunctions, FunctionSummary, ReplacementMap, Variable,
};
use crate::model::{Expr, Function, IrBlock, JumpKind, Program, Stmt, Tmp};

/// Upper bound on block visits per propagation run.
pub const DEFAULT_MAX_BLOCK_VISITS: usize = 4096;

/// Knobs controlling what the engine folds and records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatorOptions {
    /// Discard non-constant results instead of keeping symbolic values.
    pub only_consts: bool,
    /// Fold binary operations whose operands are both constant.
    pub do_binops: bool,
    /// Allow store-to-load forwarding across instruction boundaries.
    pub cross_insn_opt: bool,
}

impl PropagatorOptions {
    /// Settings used when resolving jump targets.
    pub fn constants_only() -> Self {
        Self { only_consts: true, do_binops: true, cross_insn_opt: false }
    }
}

impl Default for PropagatorOptions {
    fn default() -> Self {
        Self { only_consts: false, do_binops: true, cross_insn_opt: true }
    }
}

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("function {func:#x} has no block at its entry address")]
    MissingEntry { func: u64 },
    #[error("block {block:#x} reads temporary t{tmp} before defining it")]
    UndefinedTmp { block: u64, tmp: u32 },
    #[error("propagation over function {func:#x} did not converge within {limit} block visits")]
    IterationLimit { func: u64, limit: usize },
    #[error("failed to fingerprint function: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// A whole-function propagation engine.
pub trait PropagationEngine: Send + Sync {
    fn propagate(
        &self,
        program: &Program,
        func: &Function,
        options: &PropagatorOptions,
        completed: &CompletedFunctions,
    ) -> Result<ReplacementMap, PropagationError>;
}

type RegState = BTreeMap<String, AbstractValue>;

/// Worklist constant propagator.
#[derive(Debug, Clone)]
pub struct ConstPropagator {
    max_block_visits: usize,
}

impl Default for ConstPropagator {
    fn default() -> Self {
        Self { max_block_visits: DEFAULT_MAX_BLOCK_VISITS }
    }
}

impl ConstPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_block_visits(mut self, limit: usize) -> Self {
        self.max_block_visits = limit;
        self
    }

    fn callee_summary(
        &self,
        program: &Program,
        callee: u64,
        completed: &CompletedFunctions,
    ) -> Option<Arc<FunctionSummary>> {
        if let Some(summary) = completed.get(callee) {
            return Some(summary);
        }
        program.function(callee)?;
        let summary = summarize(program, callee, completed, &mut HashSet::new());
        Some(completed.publish(callee, summary))
    }

    fn apply_call_effects(
        &self,
        program: &Program,
        block: &IrBlock,
        regs: &mut RegState,
        completed: &CompletedFunctions,
    ) {
        match block.jump_kind {
            JumpKind::Call => {
                let summary =
                    block.next.as_const().and_then(|t| self.callee_summary(program, t, completed));
                match summary {
                    Some(summary) => regs.retain(|reg, _| !summary.clobbers(reg)),
                    None => regs.clear(),
                }
            }
            JumpKind::Syscall => regs.clear(),
            _ => {}
        }
    }
}

impl PropagationEngine for ConstPropagator {
    fn propagate(
        &self,
        program: &Program,
        func: &Function,
        options: &PropagatorOptions,
        completed: &CompletedFunctions,
    ) -> Result<ReplacementMap, PropagationError> {
        let entry = func.entry().ok_or(PropagationError::MissingEntry { func: func.addr })?;
        let preds = func.predecessors();

        let mut exits: HashMap<u64, RegState> = HashMap::new();
        let mut tmps_by_block: BTreeMap<u64, HashMap<Tmp, AbstractValue>> = BTreeMap::new();
        let mut worklist: VecDeque<u64> = VecDeque::from([entry.addr]);
        let mut queued: HashSet<u64> = HashSet::from([entry.addr]);
        let mut visits = 0usize;

        loop {
            let Some(addr) = worklist.pop_front().or_else(|| {
                // Blocks not reachable from the entry still get analyzed, from an
                // unknown state.
                func.blocks().keys().copied().find(|a| !exits.contains_key(a))
            }) else {
                break;
            };
            queued.remove(&addr);

            visits += 1;
            if visits > self.max_block_visits {
                return Err(PropagationError::IterationLimit {
                    func: func.addr,
                    limit: self.max_block_visits,
                });
            }

            let Some(block) = func.block(addr) else {
                continue;
            };

            let entry_state = if addr == func.addr {
                RegState::new()
            } else {
                meet(preds.get(&addr).into_iter().flatten().filter_map(|p| exits.get(p)))
            };

            let mut state = BlockState::new(program, options, block.addr, entry_state);
            state.run(block)?;
            self.apply_call_effects(program, block, &mut state.regs, completed);

            let BlockState { regs, tmps, .. } = state;
            tmps_by_block.insert(addr, tmps);

            if exits.get(&addr) != Some(&regs) {
                exits.insert(addr, regs);
                for succ in func.successors(addr) {
                    if queued.insert(succ) {
                        worklist.push_back(succ);
                    }
                }
            }
        }

        let mut replacements = ReplacementMap::new();
        for (addr, tmps) in tmps_by_block {
            let loc = CodeLocation::block(addr);
            for (tmp, value) in tmps {
                if !options.only_consts || value.is_const() {
                    replacements.insert(loc, Variable::Tmp(tmp), value);
                }
            }
            if let (Some(regs), Some(block)) = (exits.get(&addr), func.block(addr)) {
                let exit_loc = CodeLocation::new(addr, Some(block.stmts.len()));
                for (reg, value) in regs {
                    replacements.insert(exit_loc, Variable::Register(reg.clone()), value.clone());
                }
            }
        }

        let summary = summarize(program, func.addr, completed, &mut HashSet::new());
        completed.publish(func.addr, summary);

        log::trace!(
            "propagated function {:#x}: {} block visits, {} locations",
            func.addr,
            visits,
            replacements.len()
        );
        Ok(replacements)
    }
}

/// Keep only the register values every predecessor state agrees on.
fn meet<'a>(mut states: impl Iterator<Item = &'a RegState>) -> RegState {
    let Some(first) = states.next() else {
        return RegState::new();
    };
    let mut merged = first.clone();
    for state in states {
        merged.retain(|reg, value| state.get(reg) == Some(value));
    }
    merged
}

/// Registers written by `addr` and by everything it calls or tail-jumps to.
fn summarize(
    program: &Program,
    addr: u64,
    completed: &CompletedFunctions,
    visiting: &mut HashSet<u64>,
) -> FunctionSummary {
    let mut summary = FunctionSummary::default();
    let Some(func) = program.function(addr) else {
        summary.clobbers_all = true;
        return summary;
    };
    if !visiting.insert(addr) {
        return summary;
    }

    for block in func.blocks().values() {
        for stmt in &block.stmts {
            if let Stmt::Put { reg, .. } = stmt {
                summary.clobbered.insert(reg.clone());
            }
        }

        let has_resolved = func.resolved().get(&block.addr).is_some_and(|t| !t.is_empty());
        match block.jump_kind {
            JumpKind::Call | JumpKind::Jump | JumpKind::ConditionalExit
                if block.next.as_const().is_none() && !has_resolved =>
            {
                summary.clobbers_all = true;
            }
            JumpKind::Syscall | JumpKind::NoDecode => summary.clobbers_all = true,
            _ => {}
        }

        for target in func.external_targets(block.addr) {
            let callee = match completed.get(target) {
                Some(known) => (*known).clone(),
                None => summarize(program, target, completed, visiting),
            };
            summary.clobbers_all |= callee.clobbers_all;
            summary.clobbered.extend(callee.clobbered);
        }
    }
    summary
}

/// Abstract state while walking the statements of one block.
struct BlockState<'a> {
    program: &'a Program,
    options: &'a PropagatorOptions,
    block_addr: u64,
    bits: u32,
    regs: RegState,
    tmps: HashMap<Tmp, AbstractValue>,
    /// Constant-address stores seen so far, with the instruction index that made them.
    stores: HashMap<u64, (AbstractValue, usize)>,
    insn: usize,
}

impl<'a> BlockState<'a> {
    fn new(
        program: &'a Program,
        options: &'a PropagatorOptions,
        block_addr: u64,
        regs: RegState,
    ) -> Self {
        Self {
            program,
            options,
            block_addr,
            bits: program.arch.bits,
            regs,
            tmps: HashMap::new(),
            stores: HashMap::new(),
            insn: 0,
        }
    }

    fn run(&mut self, block: &IrBlock) -> Result<(), PropagationError> {
        for stmt in &block.stmts {
            match stmt {
                Stmt::IMark { .. } => self.insn += 1,
                Stmt::WrTmp { tmp, expr } => {
                    let value = self.eval(expr)?;
                    self.tmps.insert(*tmp, value);
                }
                Stmt::Put { reg, expr } => {
                    let value = self.eval(expr)?;
                    if self.options.only_consts && !value.is_const() {
                        self.regs.remove(reg);
                    } else {
                        self.regs.insert(reg.clone(), value);
                    }
                }
                Stmt::Store { addr, value } => {
                    let addr = self.eval(addr)?;
                    let value = self.eval(value)?;
                    match addr.as_const() {
                        Some(addr) => {
                            self.stores.insert(addr, (value, self.insn));
                        }
                        None => self.stores.clear(),
                    }
                }
                Stmt::Exit { guard, .. } => {
                    self.eval(guard)?;
                }
            }
        }
        self.eval(&block.next)?;
        Ok(())
    }

    fn eval(&self, expr: &Expr) -> Result<AbstractValue, PropagationError> {
        let value = match expr {
            Expr::Const(value) => AbstractValue::constant(*value, self.bits),
            Expr::RdTmp(tmp) => self
                .tmps
                .get(tmp)
                .cloned()
                .ok_or(PropagationError::UndefinedTmp { block: self.block_addr, tmp: tmp.0 })?,
            Expr::Get(reg) => {
                self.regs.get(reg).cloned().unwrap_or_else(|| AbstractValue::symbolic(reg.clone()))
            }
            Expr::Load(addr) => self.load(self.eval(addr)?),
            Expr::BinOp { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                match (lhs.as_const(), rhs.as_const()) {
                    (Some(a), Some(b)) if self.options.do_binops => {
                        AbstractValue::constant(op.apply(a, b, self.bits), self.bits)
                    }
                    _ => AbstractValue::compound(*op, lhs, rhs),
                }
            }
        };
        Ok(value)
    }

    fn load(&self, addr: AbstractValue) -> AbstractValue {
        let Some(addr) = addr.as_const() else {
            return AbstractValue::symbolic(format!("mem[{addr}]"));
        };
        if let Some((value, insn)) = self.stores.get(&addr) {
            if self.options.cross_insn_opt || *insn == self.insn {
                return value.clone();
            }
        }
        match self.program.read_only_word(addr) {
            Some(word) => AbstractValue::constant(word, self.bits),
            None => AbstractValue::symbolic(format!("mem[{addr:#x}]")),
        }
    }
}
