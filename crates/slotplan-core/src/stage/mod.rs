//! Module: stage
//! Responsibility: the physical plan-stage tree the compiler emits, its
//! deterministic explain rendering and fingerprint.
//! Does not own: stage execution.
//! Boundary: a `PlanFragment` is the complete, inert output of one
//! compilation.

mod build;
mod explain;

#[cfg(test)]
mod tests;

use crate::{
    ir::Expr,
    slots::{PlanStageSlots, SlotId},
    state::RuntimeEnvironment,
};
use derive_more::Display;

pub use build::{build_block_to_row, infer_type, make_project};

///
/// PlanNodeId
///
/// Identifier of the logical plan node a stage was built for.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{_0}")]
pub struct PlanNodeId(u32);

impl PlanNodeId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

///
/// AggExprTriple
///
/// Initial value, optional block-mode update and row-mode update of one
/// physical aggregate. `init` is `Expr::Nothing` when the aggregate starts
/// empty.
///

#[derive(Clone, Debug, PartialEq)]
pub struct AggExprTriple {
    pub init: Expr,
    pub block_agg: Option<Expr>,
    pub agg: Expr,
}

///
/// MergeExpr
///
/// Combines one spilled partial aggregate, read from `spill_slot`, into the
/// running aggregate.
///

#[derive(Clone, Debug, PartialEq)]
pub struct MergeExpr {
    pub spill_slot: SlotId,
    pub expr: Expr,
}

///
/// ScanField
///

#[derive(Clone, Debug, PartialEq)]
pub struct ScanField {
    pub name: String,
    pub slot: SlotId,
    /// True when the scan delivers the field as a block of values.
    pub block: bool,
}

///
/// ScanStage
///
/// Leaf produced by a child builder. With `block_bitmap` set the scan emits
/// batches and publishes a selectivity bitmap.
///

#[derive(Clone, Debug, PartialEq)]
pub struct ScanStage {
    pub node: PlanNodeId,
    pub result_slot: Option<SlotId>,
    pub fields: Vec<ScanField>,
    pub block_bitmap: Option<SlotId>,
}

///
/// HashAggStage
///

#[derive(Clone, Debug, PartialEq)]
pub struct HashAggStage {
    pub node: PlanNodeId,
    pub input: Box<PlanStage>,
    pub group_by: Vec<SlotId>,
    pub aggs: Vec<(SlotId, AggExprTriple)>,
    pub collator: Option<SlotId>,
    pub merging: Vec<MergeExpr>,
}

///
/// BlockHashAggStage
///
/// Batched hash aggregation. For each key in a batch the runtime binds
/// `bitmap_internal` to the key's selection mask and each `acc_data` slot to
/// the batch from the matching `block_acc_args` slot before evaluating the
/// block updates.
///

#[derive(Clone, Debug, PartialEq)]
pub struct BlockHashAggStage {
    pub node: PlanNodeId,
    pub input: Box<PlanStage>,
    pub group_by: Vec<SlotId>,
    pub group_by_out: Vec<SlotId>,
    pub aggs: Vec<(SlotId, AggExprTriple)>,
    pub selectivity_bitmap: SlotId,
    pub block_acc_args: Vec<SlotId>,
    pub bitmap_internal: SlotId,
    pub acc_data: Vec<SlotId>,
    pub merging: Vec<MergeExpr>,
}

///
/// PlanStage
///

#[derive(Clone, Debug, PartialEq)]
pub enum PlanStage {
    Scan(ScanStage),
    Project {
        node: PlanNodeId,
        input: Box<Self>,
        projects: Vec<(SlotId, Expr)>,
    },
    BlockToRow {
        node: PlanNodeId,
        input: Box<Self>,
        blocks: Vec<SlotId>,
        rows: Vec<SlotId>,
        bitmap: SlotId,
    },
    HashAgg(HashAggStage),
    BlockHashAgg(BlockHashAggStage),
}

impl PlanStage {
    #[must_use]
    pub const fn node_id(&self) -> PlanNodeId {
        match self {
            Self::Scan(scan) => scan.node,
            Self::Project { node, .. } | Self::BlockToRow { node, .. } => *node,
            Self::HashAgg(agg) => agg.node,
            Self::BlockHashAgg(agg) => agg.node,
        }
    }

    #[must_use]
    pub fn input(&self) -> Option<&Self> {
        match self {
            Self::Scan(_) => None,
            Self::Project { input, .. } | Self::BlockToRow { input, .. } => Some(input.as_ref()),
            Self::HashAgg(agg) => Some(agg.input.as_ref()),
            Self::BlockHashAgg(agg) => Some(agg.input.as_ref()),
        }
    }

    /// Stages from this one down to the leaf.
    pub fn chain(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |stage| stage.input())
    }

    /// Render the stage tree, root first, one stage per line.
    #[must_use]
    pub fn explain(&self) -> String {
        explain::render(self)
    }
}

///
/// PlanFragment
///
/// Complete output of one group compilation: the stage tree, the slots it
/// publishes and the environment slots the runtime must bind.
///

#[derive(Clone, Debug)]
pub struct PlanFragment {
    pub root: PlanStage,
    pub outputs: PlanStageSlots,
    pub environment: RuntimeEnvironment,
}

impl PlanFragment {
    /// Stable SHA-256 fingerprint of the explain rendering, as lowercase hex.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        explain::fingerprint(&self.root)
    }
}
