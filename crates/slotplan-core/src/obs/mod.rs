//! Observability: compile events, sinks and in-process counters.
//!
//! Lowering code never touches the counters directly; every event goes
//! through `sink::record`, which honors a scoped override.

pub mod metrics;
pub mod sink;

pub use metrics::{CompileCounters, metrics_report, metrics_reset};
pub use sink::{CompileEvent, CompileSink, FallbackReason, with_compile_sink};
