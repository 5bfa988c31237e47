//! Thread-local compile counters.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;

///
/// CompileCounters
/// Ephemeral, in-memory counters of compile decisions.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CompileCounters {
    pub groups_compiled: u64,
    pub block_hash_aggs: u64,
    pub scalar_hash_aggs: u64,
    pub constant_keys: u64,
    pub key_fallbacks: u64,
    pub accumulator_fallbacks: u64,
    pub lazy_results: u64,
    pub materialized_results: u64,
}

thread_local! {
    static STATE: RefCell<CompileCounters> = RefCell::new(CompileCounters::default());
}

pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut CompileCounters) -> R) -> R {
    STATE.with(|cell| f(&mut cell.borrow_mut()))
}

/// Snapshot of the current thread's counters.
#[must_use]
pub fn metrics_report() -> CompileCounters {
    STATE.with(|cell| cell.borrow().clone())
}

pub fn metrics_reset() {
    with_state_mut(|m| *m = CompileCounters::default());
}
