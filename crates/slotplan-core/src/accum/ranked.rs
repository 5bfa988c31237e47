//! Bounded accumulators: firstN, lastN and the top/bottom family.

use crate::{
    accum::{
        AccumInputs, AccumOpInfo, AddBlockExprs, BlockAggAndRowAgg, block::lower_block_input,
        nth_slot, single_input,
    },
    error::InternalError,
    ir::{AggFunc, Builtin, Expr},
    slots::{PlanStageSlots, SlotId},
    state::StageBuilderState,
};

pub(super) static FIRST_N: AccumOpInfo = AccumOpInfo {
    name: "firstN",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: None,
    build_add_aggs: first_n_aggs,
    build_add_block_aggs: None,
    build_init: Some(init_n),
    build_combine_aggs: first_n_combine,
    build_finalize: Some(finalize_n),
};

pub(super) static LAST_N: AccumOpInfo = AccumOpInfo {
    name: "lastN",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: None,
    build_add_aggs: last_n_aggs,
    build_add_block_aggs: None,
    build_init: Some(init_n),
    build_combine_aggs: last_n_combine,
    build_finalize: Some(finalize_n),
};

pub(super) static TOP: AccumOpInfo = AccumOpInfo {
    name: "top",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: Some(top_bottom_block_exprs),
    build_add_aggs: top_aggs,
    build_add_block_aggs: Some(top_block_aggs),
    build_init: Some(init_n),
    build_combine_aggs: top_combine,
    build_finalize: Some(finalize_single),
};

pub(super) static BOTTOM: AccumOpInfo = AccumOpInfo {
    name: "bottom",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: Some(top_bottom_block_exprs),
    build_add_aggs: bottom_aggs,
    build_add_block_aggs: Some(bottom_block_aggs),
    build_init: Some(init_n),
    build_combine_aggs: bottom_combine,
    build_finalize: Some(finalize_single),
};

pub(super) static TOP_N: AccumOpInfo = AccumOpInfo {
    name: "topN",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: Some(top_bottom_block_exprs),
    build_add_aggs: top_aggs,
    build_add_block_aggs: Some(top_block_aggs),
    build_init: Some(init_n),
    build_combine_aggs: top_combine,
    build_finalize: Some(finalize_many),
};

pub(super) static BOTTOM_N: AccumOpInfo = AccumOpInfo {
    name: "bottomN",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: Some(top_bottom_block_exprs),
    build_add_aggs: bottom_aggs,
    build_add_block_aggs: Some(bottom_block_aggs),
    build_init: Some(init_n),
    build_combine_aggs: bottom_combine,
    build_finalize: Some(finalize_many),
};

fn init_n(
    _state: &mut StageBuilderState<'_>,
    inputs: Option<AccumInputs>,
) -> Result<Vec<Expr>, InternalError> {
    match inputs {
        Some(AccumInputs::InitN {
            max_size,
            is_group_accum,
        }) => Ok(vec![Expr::func(
            Builtin::NewAccumulatorNState,
            vec![max_size, is_group_accum],
        )]),
        other => Err(InternalError::accumulator_invariant(format!(
            "bounded accumulators need init n inputs, found {}",
            other.as_ref().map_or("none", AccumInputs::kind_name)
        ))),
    }
}

// firstN / lastN

fn first_n_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    let input = single_input("firstN", inputs)?;

    Ok(vec![Expr::agg(AggFunc::FirstN, vec![input])])
}

fn last_n_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    let input = single_input("lastN", inputs)?;

    Ok(vec![Expr::agg(AggFunc::LastN, vec![input])])
}

fn first_n_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    let slot = nth_slot("firstN", spill, 0)?;

    Ok(vec![Expr::agg(AggFunc::MergeFirstN, vec![Expr::slot(slot)])])
}

fn last_n_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    let slot = nth_slot("lastN", spill, 0)?;

    Ok(vec![Expr::agg(AggFunc::MergeLastN, vec![Expr::slot(slot)])])
}

// Partial states pass through untouched when a later merge consumes them.
fn finalize_n(
    state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    aggs: &[SlotId],
) -> Result<Option<Expr>, InternalError> {
    if state.needs_merge() {
        return Ok(None);
    }
    let slot = nth_slot("firstN/lastN", aggs, 0)?;

    Ok(Some(Expr::func(
        Builtin::AccumulatorNFinalize,
        vec![Expr::slot(slot)],
    )))
}

// top / bottom family

fn ranked_aggs(bottom: bool, inputs: AccumInputs) -> Result<Vec<Expr>, InternalError> {
    let AccumInputs::TopBottomN {
        value,
        sort_by,
        sort_spec,
    } = inputs
    else {
        return Err(InternalError::accumulator_invariant(format!(
            "top/bottom aggregates need top/bottom inputs, found {}",
            inputs.kind_name()
        )));
    };

    Ok(vec![Expr::agg(
        AggFunc::TopN { bottom },
        vec![value, sort_by, sort_spec],
    )])
}

fn top_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    ranked_aggs(false, inputs)
}

fn bottom_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    ranked_aggs(true, inputs)
}

fn top_bottom_block_exprs(
    state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
    outputs: &PlanStageSlots,
) -> Result<Option<AddBlockExprs>, InternalError> {
    let AccumInputs::BlockTopBottomN {
        values,
        value_is_array,
        sort_by,
        use_mk,
        sort_spec,
    } = inputs
    else {
        return Err(InternalError::accumulator_invariant(format!(
            "top/bottom block lowering needs block top/bottom inputs, found {}",
            inputs.kind_name()
        )));
    };

    let mut exprs = Vec::with_capacity(values.len() + sort_by.len());
    let mut slots = Vec::with_capacity(values.len() + sort_by.len());
    let Some(values) = lower_items(state, values, outputs, &mut exprs, &mut slots)? else {
        return Ok(None);
    };
    let Some(sort_by) = lower_items(state, sort_by, outputs, &mut exprs, &mut slots)? else {
        return Ok(None);
    };

    Ok(Some(AddBlockExprs {
        inputs: AccumInputs::BlockTopBottomN {
            values,
            value_is_array,
            sort_by,
            use_mk,
            sort_spec,
        },
        exprs,
        slots,
    }))
}

// Lower each item to a data slot; `None` when any item has no block form.
fn lower_items(
    state: &mut StageBuilderState<'_>,
    items: Vec<Expr>,
    outputs: &PlanStageSlots,
    exprs: &mut Vec<Expr>,
    slots: &mut Vec<SlotId>,
) -> Result<Option<Vec<Expr>>, InternalError> {
    let mut data = Vec::with_capacity(items.len());
    for item in items {
        let Some(lowered) = lower_block_input(state, item, outputs)? else {
            return Ok(None);
        };
        exprs.push(lowered.expr);
        slots.push(lowered.slot);
        data.push(lowered.data);
    }

    Ok(Some(data))
}

// Several block data slots collapse back into one row value.
fn row_item(items: &[Expr], multi: bool) -> Result<Expr, InternalError> {
    if multi {
        return Ok(Expr::func(Builtin::NewArray, items.to_vec()));
    }

    items.first().cloned().ok_or_else(|| {
        InternalError::accumulator_invariant("top/bottom block inputs cannot be empty")
    })
}

fn ranked_block_aggs(
    bottom: bool,
    inputs: AccumInputs,
    bitmap: SlotId,
) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError> {
    let AccumInputs::BlockTopBottomN {
        values,
        value_is_array,
        sort_by,
        use_mk,
        sort_spec,
    } = inputs
    else {
        return Err(InternalError::accumulator_invariant(format!(
            "top/bottom block aggregates need block top/bottom inputs, found {}",
            inputs.kind_name()
        )));
    };

    let row_agg = Expr::agg(
        AggFunc::TopN { bottom },
        vec![
            row_item(&values, value_is_array)?,
            row_item(&sort_by, use_mk)?,
            sort_spec.clone(),
        ],
    );

    let block_func = AggFunc::BlockTopN {
        bottom,
        values: values.len(),
        value_is_array,
        keys_multi: use_mk,
    };
    let mut args = Vec::with_capacity(2 + values.len() + sort_by.len());
    args.push(Expr::slot(bitmap));
    args.push(sort_spec);
    args.extend(values);
    args.extend(sort_by);

    Ok(Some(vec![BlockAggAndRowAgg {
        block_agg: Expr::agg(block_func, args),
        row_agg,
    }]))
}

fn top_block_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
    bitmap: SlotId,
) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError> {
    ranked_block_aggs(false, inputs, bitmap)
}

fn bottom_block_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
    bitmap: SlotId,
) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError> {
    ranked_block_aggs(true, inputs, bitmap)
}

fn ranked_combine(
    bottom: bool,
    inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    let Some(AccumInputs::CombineTopBottomN { sort_spec }) = inputs else {
        return Err(InternalError::accumulator_invariant(
            "top/bottom merge needs the sort specification",
        ));
    };
    let slot = nth_slot("top/bottom", spill, 0)?;

    Ok(vec![Expr::agg(
        AggFunc::MergeTopN { bottom },
        vec![Expr::slot(slot), sort_spec],
    )])
}

fn top_combine(
    _state: &mut StageBuilderState<'_>,
    inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    ranked_combine(false, inputs, spill)
}

fn bottom_combine(
    _state: &mut StageBuilderState<'_>,
    inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    ranked_combine(true, inputs, spill)
}

fn ranked_finalize(
    single: bool,
    state: &StageBuilderState<'_>,
    inputs: Option<AccumInputs>,
    aggs: &[SlotId],
) -> Result<Option<Expr>, InternalError> {
    if state.needs_merge() {
        return Ok(None);
    }
    let Some(AccumInputs::FinalizeTopBottomN { sort_spec }) = inputs else {
        return Err(InternalError::accumulator_invariant(
            "top/bottom finalize needs the sort specification",
        ));
    };
    let slot = nth_slot("top/bottom", aggs, 0)?;
    let func = if single {
        Builtin::TopBottomFinalize
    } else {
        Builtin::TopBottomNFinalize
    };

    Ok(Some(Expr::func(func, vec![Expr::slot(slot), sort_spec])))
}

fn finalize_single(
    state: &mut StageBuilderState<'_>,
    inputs: Option<AccumInputs>,
    aggs: &[SlotId],
) -> Result<Option<Expr>, InternalError> {
    ranked_finalize(true, state, inputs, aggs)
}

fn finalize_many(
    state: &mut StageBuilderState<'_>,
    inputs: Option<AccumInputs>,
    aggs: &[SlotId],
) -> Result<Option<Expr>, InternalError> {
    ranked_finalize(false, state, inputs, aggs)
}
