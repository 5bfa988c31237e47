use crate::{
    accum::{AccumInputs, AccumOp},
    error::InternalError,
    group::{
        GroupNode,
        accum::generate_all_accum_block_exprs,
        aggs::generate_all_accum_aggs,
    },
    ir::Expr,
    slots::{PlanStageSlots, SlotId},
    stage::AggExprTriple,
    state::StageBuilderState,
};

///
/// BlockArtifacts
///
/// Everything a successful batched lowering produced. Built only when every
/// accumulator succeeded, so a failed attempt leaves nothing behind.
///

pub(super) struct BlockArtifacts {
    pub arg_exprs: Vec<Vec<Expr>>,
    pub data_slots: Vec<Vec<SlotId>>,
    pub bitmap_internal: SlotId,
    pub aggs: Vec<Vec<AggExprTriple>>,
}

/// Whether batched aggregation is worth attempting for this node.
pub(super) fn should_try_block_hash_agg(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    outputs: &PlanStageSlots,
) -> bool {
    let hooks_present = node.accumulators.iter().all(|acc| {
        let op = AccumOp::new(acc.kind);
        op.has_build_add_block_exprs() && op.has_build_add_block_aggs()
    });

    state.config().block_hash_agg_allowed()
        && outputs.has_block_output()
        && !node.has_variable_initializer()
        && state.collator_slot().is_none()
        && hooks_present
}

/// Lower every accumulator for batched aggregation.
///
/// Returns `None` when any accumulator cannot supply block inputs or block
/// partial aggregates; the caller then lowers everything row by row.
pub(super) fn attempt_block_aggregation(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    outputs: &PlanStageSlots,
) -> Result<Option<BlockArtifacts>, InternalError> {
    let Some(block_exprs) = generate_all_accum_block_exprs(state, node, outputs)? else {
        return Ok(None);
    };

    let mut inputs: Vec<AccumInputs> = Vec::with_capacity(block_exprs.len());
    let mut arg_exprs = Vec::with_capacity(block_exprs.len());
    let mut data_slots = Vec::with_capacity(block_exprs.len());
    for lowered in block_exprs {
        inputs.push(lowered.inputs);
        arg_exprs.push(lowered.exprs);
        data_slots.push(lowered.slots);
    }

    let bitmap_internal = state.slot_id();
    let Some(aggs) = generate_all_accum_aggs(state, node, inputs, None, Some(bitmap_internal))?
    else {
        return Ok(None);
    };

    if aggs.iter().flatten().any(|triple| triple.block_agg.is_none()) {
        return Err(InternalError::group_invariant(
            "expected every block partial aggregate to be defined",
        ));
    }

    Ok(Some(BlockArtifacts {
        arg_exprs,
        data_slots,
        bitmap_internal,
        aggs,
    }))
}
