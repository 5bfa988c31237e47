//! ## Crate layout
//! - `core`: the group-stage compiler, its expression and slot vocabulary,
//!   accumulators, plan stages and compile telemetry.
//! - `error`: the public error type callers match on.
//!
//! The `prelude` module carries everything needed to describe a group node,
//! hand it a child builder and read back the compiled fragment.

pub use slotplan_core as core;

pub mod error;

pub use error::Error;

use crate::core::{
    config::CompileConfig,
    group::{ChildStageBuilder, GroupNode},
    reqs::PlanStageReqs,
    stage::PlanFragment,
};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compile one group node over the child `child` builds, reporting failures
/// through the public [`Error`].
pub fn compile_group(
    config: &CompileConfig,
    node: &GroupNode,
    reqs: &PlanStageReqs,
    child: &mut impl ChildStageBuilder,
) -> Result<PlanFragment, Error> {
    crate::core::group::compile_group(config, node, reqs, child).map_err(Error::from)
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        compile_group,
        core::{
            accum::AccumulatorKind,
            config::CompileConfig,
            expr::{ExprOp, Expression},
            group::{AccumulationStatement, ChildStageBuilder, GroupNode},
            obs::{CompileCounters, metrics_report, metrics_reset},
            reqs::PlanStageReqs,
            slots::{PlanStageSlots, SlotName},
            sort::{SortDirection, SortPattern},
            stage::{PlanFragment, PlanNodeId, PlanStage},
            state::StageBuilderState,
            value::Value,
        },
        error::{Error, ErrorKind, ErrorOrigin},
    };
}
