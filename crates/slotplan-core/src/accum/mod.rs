//! Module: accum
//! Responsibility: the accumulator capability interface and the built-in
//! accumulator operators.
//! Does not own: where accumulator inputs come from (group lowering builds
//! them) or how aggregates are executed.
//! Boundary: group lowering talks to accumulators only through `AccumOp`.

mod basic;
mod block;
mod ranked;


use crate::{
    error::InternalError,
    ir::Expr,
    slots::{PlanStageSlots, SlotId},
    state::StageBuilderState,
};
use std::fmt;

pub type BuildAddExprsFn =
    fn(&mut StageBuilderState<'_>, AccumInputs) -> Result<AccumInputs, InternalError>;
pub type BuildAddBlockExprsFn = fn(
    &mut StageBuilderState<'_>,
    AccumInputs,
    &PlanStageSlots,
) -> Result<Option<AddBlockExprs>, InternalError>;
pub type BuildAddAggsFn =
    fn(&mut StageBuilderState<'_>, AccumInputs) -> Result<Vec<Expr>, InternalError>;
pub type BuildAddBlockAggsFn = fn(
    &mut StageBuilderState<'_>,
    AccumInputs,
    SlotId,
) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError>;
pub type BuildInitFn =
    fn(&mut StageBuilderState<'_>, Option<AccumInputs>) -> Result<Vec<Expr>, InternalError>;
pub type BuildCombineAggsFn = fn(
    &mut StageBuilderState<'_>,
    Option<AccumInputs>,
    &[SlotId],
) -> Result<Vec<Expr>, InternalError>;
pub type BuildFinalizeFn = fn(
    &mut StageBuilderState<'_>,
    Option<AccumInputs>,
    &[SlotId],
) -> Result<Option<Expr>, InternalError>;

///
/// AccumOpInfo
///
/// Capability table of one accumulator operator. Optional hooks that are
/// absent mean: pass inputs through (`build_add_exprs`), no batched support
/// (`build_add_block_exprs`, `build_add_block_aggs`), start every aggregate
/// as Nothing (`build_init`) and pass the first aggregate through
/// (`build_finalize`).
///

pub struct AccumOpInfo {
    pub name: &'static str,
    pub num_aggs: usize,
    pub build_add_exprs: Option<BuildAddExprsFn>,
    pub build_add_block_exprs: Option<BuildAddBlockExprsFn>,
    pub build_add_aggs: BuildAddAggsFn,
    pub build_add_block_aggs: Option<BuildAddBlockAggsFn>,
    pub build_init: Option<BuildInitFn>,
    pub build_combine_aggs: BuildCombineAggsFn,
    pub build_finalize: Option<BuildFinalizeFn>,
}

impl fmt::Debug for AccumOpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumOpInfo")
            .field("name", &self.name)
            .field("num_aggs", &self.num_aggs)
            .field("block_exprs", &self.build_add_block_exprs.is_some())
            .field("block_aggs", &self.build_add_block_aggs.is_some())
            .finish_non_exhaustive()
    }
}

///
/// AccumulatorKind
///

#[derive(Clone, Copy, Debug)]
pub enum AccumulatorKind {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
    Count,
    FirstN,
    LastN,
    Top,
    Bottom,
    TopN,
    BottomN,
    Custom(&'static AccumOpInfo),
}

impl AccumulatorKind {
    #[must_use]
    pub fn info(self) -> &'static AccumOpInfo {
        match self {
            Self::Sum => &basic::SUM,
            Self::Avg => &basic::AVG,
            Self::Min => &basic::MIN,
            Self::Max => &basic::MAX,
            Self::First => &basic::FIRST,
            Self::Last => &basic::LAST,
            Self::Push => &basic::PUSH,
            Self::AddToSet => &basic::ADD_TO_SET,
            Self::Count => &basic::COUNT,
            Self::FirstN => &ranked::FIRST_N,
            Self::LastN => &ranked::LAST_N,
            Self::Top => &ranked::TOP,
            Self::Bottom => &ranked::BOTTOM,
            Self::TopN => &ranked::TOP_N,
            Self::BottomN => &ranked::BOTTOM_N,
            Self::Custom(info) => info,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Rank accumulators take an `output` value plus a sort pattern.
    #[must_use]
    pub const fn is_top_bottom_n(self) -> bool {
        matches!(self, Self::Top | Self::Bottom | Self::TopN | Self::BottomN)
    }

    /// Accumulators whose state is bounded by an `n` initializer.
    #[must_use]
    pub const fn is_accumulator_n(self) -> bool {
        matches!(
            self,
            Self::FirstN | Self::LastN | Self::Top | Self::Bottom | Self::TopN | Self::BottomN
        )
    }
}

impl PartialEq for AccumulatorKind {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for AccumulatorKind {}

///
/// AccumInputs
///
/// Inputs handed to accumulator hooks. The variant depends on the hook and
/// the accumulator family.
///

#[derive(Clone, Debug, PartialEq)]
pub enum AccumInputs {
    Single {
        input: Expr,
    },
    TopBottomN {
        value: Expr,
        sort_by: Expr,
        sort_spec: Expr,
    },
    BlockTopBottomN {
        values: Vec<Expr>,
        value_is_array: bool,
        sort_by: Vec<Expr>,
        use_mk: bool,
        sort_spec: Expr,
    },
    InitN {
        max_size: Expr,
        is_group_accum: Expr,
    },
    CombineTopBottomN {
        sort_spec: Expr,
    },
    FinalizeTopBottomN {
        sort_spec: Expr,
    },
}

impl AccumInputs {
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Single { .. } => "single",
            Self::TopBottomN { .. } => "top/bottom",
            Self::BlockTopBottomN { .. } => "block top/bottom",
            Self::InitN { .. } => "init n",
            Self::CombineTopBottomN { .. } => "combine top/bottom",
            Self::FinalizeTopBottomN { .. } => "finalize top/bottom",
        }
    }
}

///
/// AddBlockExprs
///
/// Result of block input lowering: batched expressions to project, the
/// accumulator data slots the aggregation binds them to, and the inputs
/// rewritten to read those data slots.
///

#[derive(Clone, Debug, PartialEq)]
pub struct AddBlockExprs {
    pub inputs: AccumInputs,
    pub exprs: Vec<Expr>,
    pub slots: Vec<SlotId>,
}

///
/// BlockAggAndRowAgg
///

#[derive(Clone, Debug, PartialEq)]
pub struct BlockAggAndRowAgg {
    pub block_agg: Expr,
    pub row_agg: Expr,
}

///
/// AccumOp
///
/// Checked entry points over one operator's capability table.
///

#[derive(Clone, Copy, Debug)]
pub struct AccumOp {
    info: &'static AccumOpInfo,
}

impl AccumOp {
    #[must_use]
    pub fn new(kind: AccumulatorKind) -> Self {
        Self { info: kind.info() }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.info.name
    }

    #[must_use]
    pub const fn num_aggs(&self) -> usize {
        self.info.num_aggs
    }

    #[must_use]
    pub const fn has_build_add_block_exprs(&self) -> bool {
        self.info.build_add_block_exprs.is_some()
    }

    #[must_use]
    pub const fn has_build_add_block_aggs(&self) -> bool {
        self.info.build_add_block_aggs.is_some()
    }

    pub fn build_add_exprs(
        &self,
        state: &mut StageBuilderState<'_>,
        inputs: AccumInputs,
    ) -> Result<AccumInputs, InternalError> {
        match self.info.build_add_exprs {
            Some(build) => build(state, inputs),
            None => Ok(inputs),
        }
    }

    pub fn build_add_block_exprs(
        &self,
        state: &mut StageBuilderState<'_>,
        inputs: AccumInputs,
        outputs: &PlanStageSlots,
    ) -> Result<Option<AddBlockExprs>, InternalError> {
        match self.info.build_add_block_exprs {
            Some(build) => build(state, inputs, outputs),
            None => Ok(None),
        }
    }

    pub fn build_add_aggs(
        &self,
        state: &mut StageBuilderState<'_>,
        inputs: AccumInputs,
    ) -> Result<Vec<Expr>, InternalError> {
        let aggs = (self.info.build_add_aggs)(state, inputs)?;
        self.check_count("partial aggregates", aggs.len())?;

        Ok(aggs)
    }

    pub fn build_add_block_aggs(
        &self,
        state: &mut StageBuilderState<'_>,
        inputs: AccumInputs,
        bitmap: SlotId,
    ) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError> {
        let Some(build) = self.info.build_add_block_aggs else {
            return Ok(None);
        };
        let aggs = build(state, inputs, bitmap)?;
        if let Some(aggs) = &aggs {
            self.check_count("block partial aggregates", aggs.len())?;
        }

        Ok(aggs)
    }

    pub fn build_initialize(
        &self,
        state: &mut StageBuilderState<'_>,
        inputs: Option<AccumInputs>,
    ) -> Result<Vec<Expr>, InternalError> {
        match self.info.build_init {
            Some(build) => build(state, inputs),
            None => Ok(vec![Expr::Nothing; self.num_aggs()]),
        }
    }

    pub fn build_combine_aggs(
        &self,
        state: &mut StageBuilderState<'_>,
        inputs: Option<AccumInputs>,
        spill_slots: &[SlotId],
    ) -> Result<Vec<Expr>, InternalError> {
        (self.info.build_combine_aggs)(state, inputs, spill_slots)
    }

    pub fn build_finalize(
        &self,
        state: &mut StageBuilderState<'_>,
        inputs: Option<AccumInputs>,
        agg_slots: &[SlotId],
    ) -> Result<Option<Expr>, InternalError> {
        match self.info.build_finalize {
            Some(build) => build(state, inputs, agg_slots),
            None => Ok(None),
        }
    }

    fn check_count(&self, what: &str, found: usize) -> Result<(), InternalError> {
        if found == self.num_aggs() {
            return Ok(());
        }

        Err(InternalError::accumulator_invariant(format!(
            "{} declared {} aggregates but produced {found} {what}",
            self.name(),
            self.num_aggs()
        )))
    }
}

/// Unwrap the single input expression of a one-argument accumulator.
pub(crate) fn single_input(op: &str, inputs: AccumInputs) -> Result<Expr, InternalError> {
    match inputs {
        AccumInputs::Single { input } => Ok(input),
        other => Err(InternalError::accumulator_invariant(format!(
            "{op} expects single inputs, found {} inputs",
            other.kind_name()
        ))),
    }
}

/// Slot `index` of an accumulator's aggregate or spill slots.
pub(crate) fn nth_slot(op: &str, slots: &[SlotId], index: usize) -> Result<SlotId, InternalError> {
    slots.get(index).copied().ok_or_else(|| {
        InternalError::accumulator_invariant(format!(
            "{op} expected at least {} slots, found {}",
            index + 1,
            slots.len()
        ))
    })
}
