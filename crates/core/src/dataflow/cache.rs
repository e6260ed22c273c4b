use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{CompletedFunctions, PropagationError, ReplacementMap};
use crate::model::Function;

/// Content fingerprint of a function (blocks and resolved edges).
///
/// Any change to the lifted code or to the set of resolved indirect targets
/// yields a different fingerprint. The digest is memoized on the function.
pub fn fingerprint(func: &Function) -> Result<String, PropagationError> {
    Ok(func.fingerprint()?)
}

#[derive(Debug)]
struct CachedPropagation {
    fingerprint: String,
    generation: u64,
    replacements: Arc<ReplacementMap>,
}

/// Per-function memo of propagation results.
///
/// An entry is reused only while the function's fingerprint is unchanged and
/// no callee summary has been dropped from the registry since it was
/// computed, so results never outlive the code they were computed from.
#[derive(Debug, Default)]
pub struct PropagationCache {
    entries: Mutex<HashMap<u64, CachedPropagation>>,
}

impl PropagationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached map for `func`, or compute and remember it.
    ///
    /// `completed` is the registry `compute` reads callee summaries from.
    /// Nothing is cached when `compute` fails.
    pub fn get_or_compute<F>(
        &self,
        func: &Function,
        completed: &CompletedFunctions,
        compute: F,
    ) -> Result<Arc<ReplacementMap>, PropagationError>
    where
        F: FnOnce() -> Result<ReplacementMap, PropagationError>,
    {
        let current = fingerprint(func)?;
        // Must be read before `compute` runs.
        let generation = completed.generation();
        {
            let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(cached) = entries.get(&func.addr) {
                if cached.fingerprint == current && cached.generation == generation {
                    log::trace!("propagation cache hit for function {:#x}", func.addr);
                    return Ok(Arc::clone(&cached.replacements));
                }
                log::debug!(
                    "function {:#x} or its callees changed; discarding cached propagation",
                    func.addr
                );
            }
        }

        let replacements = Arc::new(compute()?);
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(
            func.addr,
            CachedPropagation {
                fingerprint: current,
                generation,
                replacements: Arc::clone(&replacements),
            },
        );
        Ok(replacements)
    }

    pub fn invalidate(&self, func_addr: u64) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(&func_addr).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
