use crate::{
    accum::{AccumInputs, AddBlockExprs, single_input},
    error::InternalError,
    ir::{Expr, build_vectorized_expr},
    slots::{PlanStageSlots, SlotId, SlotName, VariableTypes},
    state::StageBuilderState,
};

///
/// BlockInput
///
/// One vectorized accumulator input bound to a fresh data slot.
///

pub(super) struct BlockInput {
    pub expr: Expr,
    pub data: Expr,
    pub slot: SlotId,
}

/// Vectorize `input`, broadcasting scalar results over the selectivity
/// bitmap so the aggregation always receives a block.
pub(super) fn lower_block_input(
    state: &mut StageBuilderState<'_>,
    input: Expr,
    outputs: &PlanStageSlots,
) -> Result<Option<BlockInput>, InternalError> {
    let types = VariableTypes::from_outputs(outputs);
    let bitmap = outputs.require(&SlotName::BlockSelectivityBitmap)?.id();
    let Some(expr) = build_vectorized_expr(input, &types, bitmap) else {
        return Ok(None);
    };
    let slot = state.slot_id();

    Ok(Some(BlockInput {
        expr,
        data: Expr::slot(slot),
        slot,
    }))
}

/// Shared `build_add_block_exprs` hook for single-input accumulators.
pub(super) fn single_block_exprs(
    state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
    outputs: &PlanStageSlots,
) -> Result<Option<AddBlockExprs>, InternalError> {
    let input = single_input("block input", inputs)?;
    let Some(lowered) = lower_block_input(state, input, outputs)? else {
        return Ok(None);
    };

    Ok(Some(AddBlockExprs {
        inputs: AccumInputs::Single {
            input: lowered.data,
        },
        exprs: vec![lowered.expr],
        slots: vec![lowered.slot],
    }))
}
