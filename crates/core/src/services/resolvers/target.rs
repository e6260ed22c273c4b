use std::collections::BTreeSet;

use crate::model::Program;

/// Policy deciding whether an address is an acceptable jump target.
///
/// Implementations must be free of side effects; they are called from any
/// worker without extra locking.
pub trait TargetValidity: Send + Sync {
    fn is_valid_target(&self, addr: u64) -> bool;
}

impl<F> TargetValidity for F
where
    F: Fn(u64) -> bool + Send + Sync,
{
    fn is_valid_target(&self, addr: u64) -> bool {
        self(addr)
    }
}

/// Target policy derived from the program's memory map.
///
/// An address is valid if it is not denied and it is hooked, a syscall entry,
/// or an aligned address inside an executable segment. The oracle snapshots
/// the program when built, so build a fresh one whenever the program changes.
#[derive(Debug, Clone)]
pub struct SegmentOracle {
    executable: Vec<(u64, u64)>,
    hooks: BTreeSet<u64>,
    syscalls: BTreeSet<u64>,
    alignment: u64,
    denied: BTreeSet<u64>,
}

impl SegmentOracle {
    pub fn new(program: &Program) -> Self {
        Self {
            executable: program
                .segments
                .iter()
                .filter(|seg| seg.executable)
                .map(|seg| (seg.start, seg.end()))
                .collect(),
            hooks: program.hooks.clone(),
            syscalls: program.syscalls.clone(),
            alignment: program.arch.instruction_alignment.max(1),
            denied: BTreeSet::new(),
        }
    }

    /// Require at least `alignment` (the architecture's own alignment still applies).
    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = self.alignment.max(alignment).max(1);
        self
    }

    pub fn with_denied(mut self, denied: impl IntoIterator<Item = u64>) -> Self {
        self.denied.extend(denied);
        self
    }

    fn in_executable_memory(&self, addr: u64) -> bool {
        self.executable.iter().any(|(start, end)| addr >= *start && addr < *end)
    }
}

impl TargetValidity for SegmentOracle {
    fn is_valid_target(&self, addr: u64) -> bool {
        if self.denied.contains(&addr) {
            return false;
        }
        if self.hooks.contains(&addr) || self.syscalls.contains(&addr) {
            return true;
        }
        self.in_executable_memory(addr) && addr % self.alignment == 0
    }
}
