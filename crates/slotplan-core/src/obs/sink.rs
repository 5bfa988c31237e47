//! Compile event sink boundary.
//!
//! This module is the only bridge between lowering logic and the
//! thread-local counters in `obs::metrics`.

use crate::{group::AggregationMode, obs::metrics, stage::PlanNodeId};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn CompileSink>>> = RefCell::new(None);
}

///
/// FallbackReason
///
/// Why a batched lowering attempt was abandoned for row-at-a-time execution.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FallbackReason {
    /// Some part of the group key had no block form.
    KeyNotVectorized,
    /// An accumulator input expression had no block form.
    AccumulatorInput { accumulator: &'static str },
    /// An accumulator could not produce block partial aggregates.
    AccumulatorAggregate { accumulator: &'static str },
}

///
/// CompileEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompileEvent {
    GroupCompiled {
        node: PlanNodeId,
        mode: AggregationMode,
        accumulators: usize,
        constant_key: bool,
    },
    BlockFallback {
        node: PlanNodeId,
        reason: FallbackReason,
    },
    ResultShape {
        node: PlanNodeId,
        lazy: bool,
    },
}

///
/// CompileSink
///

pub trait CompileSink {
    fn record(&self, event: CompileEvent);
}

/// CountersSink
/// Default sink writing into the thread-local compile counters.

pub(crate) struct CountersSink;

impl CompileSink for CountersSink {
    fn record(&self, event: CompileEvent) {
        metrics::with_state_mut(|m| match event {
            CompileEvent::GroupCompiled {
                mode, constant_key, ..
            } => {
                m.groups_compiled = m.groups_compiled.saturating_add(1);
                match mode {
                    AggregationMode::Block => {
                        m.block_hash_aggs = m.block_hash_aggs.saturating_add(1);
                    }
                    AggregationMode::Scalar => {
                        m.scalar_hash_aggs = m.scalar_hash_aggs.saturating_add(1);
                    }
                }
                if constant_key {
                    m.constant_keys = m.constant_keys.saturating_add(1);
                }
            }
            CompileEvent::BlockFallback { reason, .. } => match reason {
                FallbackReason::KeyNotVectorized => {
                    m.key_fallbacks = m.key_fallbacks.saturating_add(1);
                }
                FallbackReason::AccumulatorInput { .. }
                | FallbackReason::AccumulatorAggregate { .. } => {
                    m.accumulator_fallbacks = m.accumulator_fallbacks.saturating_add(1);
                }
            },
            CompileEvent::ResultShape { lazy, .. } => {
                if lazy {
                    m.lazy_results = m.lazy_results.saturating_add(1);
                } else {
                    m.materialized_results = m.materialized_results.saturating_add(1);
                }
            }
        });
    }
}

pub(crate) fn record(event: CompileEvent) {
    let installed = SINK_OVERRIDE.with(|cell| cell.borrow().clone());

    match installed {
        Some(sink) => sink.record(event),
        None => CountersSink.record(event),
    }
}

/// Run a closure with a temporary sink override.
///
/// The previous sink is restored on every exit, including unwinding.
pub fn with_compile_sink<T>(sink: Rc<dyn CompileSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn CompileSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let previous = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = previous;
            });
        }
    }

    let previous = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(previous);

    f()
}
