use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::model::Program;

/// What callers need to know about a fully analyzed function.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionSummary {
    /// Registers the function (or anything it calls or tail-jumps to) may write.
    pub clobbered: BTreeSet<String>,
    /// Set when the function reaches code whose effects are unknown.
    #[serde(default)]
    pub clobbers_all: bool,
}

impl FunctionSummary {
    pub fn clobbers(&self, reg: &str) -> bool {
        self.clobbers_all || self.clobbered.contains(reg)
    }
}

/// Registry of functions whose analysis has completed.
///
/// Shared between workers and passed explicitly into every propagation run so
/// callee summaries are computed once. The first published summary for an
/// address wins.
///
/// Every removal bumps a generation counter. Results derived from summaries,
/// such as cached propagation maps, record the generation they saw and are
/// stale once it moves.
#[derive(Debug, Default)]
pub struct CompletedFunctions {
    inner: RwLock<HashMap<u64, Arc<FunctionSummary>>>,
    generation: AtomicU64,
}

impl CompletedFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: u64) -> Option<Arc<FunctionSummary>> {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(&addr).cloned()
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.get(addr).is_some()
    }

    /// Publish a summary and return the canonical one for `addr`.
    ///
    /// If another worker already completed the function, its summary is kept
    /// and returned instead.
    pub fn publish(&self, addr: u64, summary: FunctionSummary) -> Arc<FunctionSummary> {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.entry(addr).or_insert_with(|| Arc::new(summary)).clone()
    }

    /// Forget a single function's summary.
    pub fn remove(&self, addr: u64) -> Option<Arc<FunctionSummary>> {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let removed = guard.remove(&addr);
        if removed.is_some() {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        removed
    }

    /// Forget `addr` and every summary built on top of it, after new code or
    /// edges were discovered inside the function.
    ///
    /// Callers are found transitively through calls and tail jumps in
    /// `program`. Returns the number of summaries dropped.
    pub fn invalidate(&self, program: &Program, addr: u64) -> usize {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut pending = vec![addr];
        let mut seen = BTreeSet::from([addr]);
        let mut dropped = 0;
        while let Some(current) = pending.pop() {
            if guard.remove(&current).is_some() {
                dropped += 1;
            }
            for func in program.functions.values() {
                if func.transfers_to(current) && seen.insert(func.addr) {
                    pending.push(func.addr);
                }
            }
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        log::debug!("invalidated {} summaries starting at function {:#x}", dropped, addr);
        dropped
    }

    /// Counter advanced whenever a summary is removed.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}
