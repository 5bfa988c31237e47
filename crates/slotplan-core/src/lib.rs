//! Group-by aggregation compiler: lowers a logical group node into a
//! slot-based physical plan fragment, plus the expression, slot and
//! accumulator vocabulary it needs. Exported ergonomics live in `prelude`.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod accum;
pub mod config;
pub mod error;
pub mod expr;
pub mod group;
pub mod ir;
pub mod obs;
pub mod reqs;
pub mod slots;
pub mod sort;
pub mod stage;
pub mod state;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Vocabulary needed to describe a group node and read back its fragment.
///

pub mod prelude {
    pub use crate::{
        accum::AccumulatorKind,
        config::CompileConfig,
        error::{CompileError, InternalError, RequestError},
        expr::{ExprOp, Expression},
        group::{AccumulationStatement, ChildStageBuilder, GroupNode, compile_group},
        reqs::PlanStageReqs,
        slots::{PlanStageSlots, SlotName},
        sort::{SortDirection, SortPattern},
        stage::{PlanFragment, PlanNodeId, PlanStage},
        state::StageBuilderState,
        value::Value,
    };
}
