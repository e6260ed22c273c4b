use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::dataflow::CompletedFunctions;
use crate::model::{JumpKind, JumpSite, Program};
use crate::services::resolvers::{ResolveContext, ResolverChain, TargetValidity};

/// Final state of one indirect jump after the chain ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JumpStatus {
    Resolved { resolver: String, targets: Vec<u64> },
    Unresolved,
    /// A collaborator failed; the enclosing function is treated as unanalyzable.
    Failed { reason: String },
}

/// Per-jump entry of a recovery report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpReport {
    pub addr: u64,
    pub block_addr: u64,
    pub func_addr: u64,
    pub jump_kind: JumpKind,
    #[serde(flatten)]
    pub status: JumpStatus,
}

/// Outcome of offering every indirect jump of a program to a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub program: String,
    pub generated_at: String,
    pub jumps: Vec<JumpReport>,
}

impl RecoveryReport {
    pub fn resolved_count(&self) -> usize {
        self.jumps.iter().filter(|j| matches!(j.status, JumpStatus::Resolved { .. })).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.jumps.len() - self.resolved_count()
    }
}

/// Stand-in for the CFG builder: walks every indirect transfer and records
/// what the chain finds.
pub struct IndirectJumpDriver<'a> {
    chain: &'a ResolverChain,
    completed: CompletedFunctions,
}

impl<'a> IndirectJumpDriver<'a> {
    pub fn new(chain: &'a ResolverChain) -> Self {
        Self { chain, completed: CompletedFunctions::new() }
    }

    /// Summaries of every function analyzed so far.
    pub fn completed(&self) -> &CompletedFunctions {
        &self.completed
    }

    /// Resolve all indirect jumps of `program`, recording resolved targets on
    /// the owning functions.
    ///
    /// `make_oracle` builds the validity policy for the program's current
    /// state; it is called afresh for every jump site. Timeless results the
    /// chain remembered from earlier runs are dropped first.
    pub fn run<F, O>(&self, program: &mut Program, make_oracle: F) -> RecoveryReport
    where
        F: Fn(&Program) -> O,
        O: TargetValidity,
    {
        self.chain.clear_timeless_cache();
        let mut jumps = Vec::new();
        let func_addrs: Vec<u64> = program.functions.keys().copied().collect();

        for func_addr in func_addrs {
            let block_addrs: Vec<u64> = program
                .function(func_addr)
                .map(|f| f.indirect_blocks().map(|b| b.addr).collect())
                .unwrap_or_default();
            let mut failure: Option<String> = None;

            for block_addr in block_addrs {
                let (report, targets) = {
                    let Some(block) =
                        program.function(func_addr).and_then(|f| f.block(block_addr))
                    else {
                        continue;
                    };
                    let site = JumpSite::new(func_addr, block);
                    let mut report = JumpReport {
                        addr: site.addr,
                        block_addr,
                        func_addr,
                        jump_kind: site.jump_kind,
                        status: JumpStatus::Unresolved,
                    };

                    if let Some(reason) = &failure {
                        report.status = JumpStatus::Failed { reason: reason.clone() };
                        (report, Vec::new())
                    } else {
                        let oracle = make_oracle(program);
                        let ctx = ResolveContext::new(program, &self.completed, &oracle);
                        match self.chain.resolve(&ctx, &site) {
                            Ok(outcome) => match outcome.resolver {
                                Some(name) if outcome.result.resolved => {
                                    report.status = JumpStatus::Resolved {
                                        resolver: name.to_string(),
                                        targets: outcome.result.targets.clone(),
                                    };
                                    (report, outcome.result.targets)
                                }
                                _ => (report, Vec::new()),
                            },
                            Err(err) => {
                                log::warn!(
                                    "giving up on function {:#x}: {}",
                                    func_addr,
                                    err
                                );
                                let reason = err.to_string();
                                report.status = JumpStatus::Failed { reason: reason.clone() };
                                failure = Some(reason);
                                (report, Vec::new())
                            }
                        }
                    }
                };

                if !targets.is_empty() {
                    if let Some(func) = program.function_mut(func_addr) {
                        func.record_resolved(block_addr, &targets);
                    }
                    // The function grew new edges; its summary and its callers' are stale.
                    self.completed.invalidate(program, func_addr);
                }
                jumps.push(report);
            }
        }

        RecoveryReport {
            program: program.name.clone(),
            generated_at: Utc::now().to_rfc3339(),
            jumps,
        }
    }
}
