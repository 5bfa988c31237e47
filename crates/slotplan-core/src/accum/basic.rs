//! Single-input accumulators: sum, count, avg, min, max, first, last,
//! push and addToSet.

use crate::{
    accum::{
        AccumInputs, AccumOpInfo, BlockAggAndRowAgg, block::single_block_exprs, nth_slot,
        single_input,
    },
    error::InternalError,
    ir::{AggFunc, Builtin, Expr},
    slots::SlotId,
    state::StageBuilderState,
    value::Value,
};

pub(super) static SUM: AccumOpInfo = AccumOpInfo {
    name: "sum",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: Some(single_block_exprs),
    build_add_aggs: sum_aggs,
    build_add_block_aggs: Some(sum_block_aggs),
    build_init: Some(zero_init),
    build_combine_aggs: sum_combine,
    build_finalize: None,
};

pub(super) static COUNT: AccumOpInfo = AccumOpInfo {
    name: "count",
    num_aggs: 1,
    build_add_exprs: Some(count_add_exprs),
    build_add_block_exprs: Some(single_block_exprs),
    build_add_aggs: sum_aggs,
    build_add_block_aggs: Some(sum_block_aggs),
    build_init: Some(zero_init),
    build_combine_aggs: sum_combine,
    build_finalize: None,
};

pub(super) static AVG: AccumOpInfo = AccumOpInfo {
    name: "avg",
    num_aggs: 2,
    build_add_exprs: None,
    build_add_block_exprs: Some(single_block_exprs),
    build_add_aggs: avg_aggs,
    build_add_block_aggs: Some(avg_block_aggs),
    build_init: Some(avg_init),
    build_combine_aggs: avg_combine,
    build_finalize: Some(avg_finalize),
};

pub(super) static MIN: AccumOpInfo = AccumOpInfo {
    name: "min",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: Some(single_block_exprs),
    build_add_aggs: min_aggs,
    build_add_block_aggs: Some(min_block_aggs),
    build_init: None,
    build_combine_aggs: min_combine,
    build_finalize: Some(null_if_empty),
};

pub(super) static MAX: AccumOpInfo = AccumOpInfo {
    name: "max",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: Some(single_block_exprs),
    build_add_aggs: max_aggs,
    build_add_block_aggs: Some(max_block_aggs),
    build_init: None,
    build_combine_aggs: max_combine,
    build_finalize: Some(null_if_empty),
};

pub(super) static FIRST: AccumOpInfo = AccumOpInfo {
    name: "first",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: None,
    build_add_aggs: first_aggs,
    build_add_block_aggs: None,
    build_init: None,
    build_combine_aggs: first_combine,
    build_finalize: None,
};

pub(super) static LAST: AccumOpInfo = AccumOpInfo {
    name: "last",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: None,
    build_add_aggs: last_aggs,
    build_add_block_aggs: None,
    build_init: None,
    build_combine_aggs: last_combine,
    build_finalize: None,
};

pub(super) static PUSH: AccumOpInfo = AccumOpInfo {
    name: "push",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: None,
    build_add_aggs: push_aggs,
    build_add_block_aggs: None,
    build_init: Some(empty_array_init),
    build_combine_aggs: push_combine,
    build_finalize: None,
};

pub(super) static ADD_TO_SET: AccumOpInfo = AccumOpInfo {
    name: "addToSet",
    num_aggs: 1,
    build_add_exprs: None,
    build_add_block_exprs: None,
    build_add_aggs: add_to_set_aggs,
    build_add_block_aggs: None,
    build_init: Some(empty_array_init),
    build_combine_aggs: add_to_set_combine,
    build_finalize: None,
};

// One aggregate over the single input.
fn unary_agg(op: &str, func: AggFunc, inputs: AccumInputs) -> Result<Vec<Expr>, InternalError> {
    let input = single_input(op, inputs)?;

    Ok(vec![Expr::agg(func, vec![input])])
}

// One aggregate folding the first spill slot.
fn unary_combine(op: &str, func: AggFunc, spill: &[SlotId]) -> Result<Vec<Expr>, InternalError> {
    let slot = nth_slot(op, spill, 0)?;

    Ok(vec![Expr::agg(func, vec![Expr::slot(slot)])])
}

// Block aggregate over (bitmap, data) with its row-at-a-time twin.
fn unary_block_agg(
    op: &str,
    block: AggFunc,
    row: AggFunc,
    inputs: AccumInputs,
    bitmap: SlotId,
) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError> {
    let data = single_input(op, inputs)?;

    Ok(Some(vec![BlockAggAndRowAgg {
        block_agg: Expr::agg(block, vec![Expr::slot(bitmap), data.clone()]),
        row_agg: Expr::agg(row, vec![data]),
    }]))
}

// sum / count

fn count_add_exprs(
    _state: &mut StageBuilderState<'_>,
    _inputs: AccumInputs,
) -> Result<AccumInputs, InternalError> {
    Ok(AccumInputs::Single {
        input: Expr::constant(1),
    })
}

fn sum_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    unary_agg("sum", AggFunc::Sum, inputs)
}

fn sum_block_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
    bitmap: SlotId,
) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError> {
    unary_block_agg("sum", AggFunc::BlockSum, AggFunc::Sum, inputs, bitmap)
}

fn zero_init(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
) -> Result<Vec<Expr>, InternalError> {
    Ok(vec![Expr::constant(0)])
}

fn sum_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    unary_combine("sum", AggFunc::Sum, spill)
}

// avg keeps a running sum and a numeric count

const AVG_SUM_FIELD: &str = "sum";
const AVG_COUNT_FIELD: &str = "count";

fn avg_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    let input = single_input("avg", inputs)?;

    Ok(vec![
        Expr::agg(AggFunc::Sum, vec![input.clone()]),
        Expr::agg(AggFunc::CountNumeric, vec![input]),
    ])
}

fn avg_block_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
    bitmap: SlotId,
) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError> {
    let data = single_input("avg", inputs)?;
    let bitmap = Expr::slot(bitmap);

    Ok(Some(vec![
        BlockAggAndRowAgg {
            block_agg: Expr::agg(AggFunc::BlockSum, vec![bitmap.clone(), data.clone()]),
            row_agg: Expr::agg(AggFunc::Sum, vec![data.clone()]),
        },
        BlockAggAndRowAgg {
            block_agg: Expr::agg(AggFunc::BlockCountNumeric, vec![bitmap, data.clone()]),
            row_agg: Expr::agg(AggFunc::CountNumeric, vec![data]),
        },
    ]))
}

fn avg_init(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
) -> Result<Vec<Expr>, InternalError> {
    Ok(vec![Expr::constant(0), Expr::constant(0)])
}

fn avg_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    let sum = nth_slot("avg", spill, 0)?;
    let count = nth_slot("avg", spill, 1)?;

    Ok(vec![
        Expr::agg(AggFunc::Sum, vec![Expr::slot(sum)]),
        Expr::agg(AggFunc::Sum, vec![Expr::slot(count)]),
    ])
}

// Partial results keep both halves so a downstream merge can recombine them.
fn avg_finalize(
    state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    aggs: &[SlotId],
) -> Result<Option<Expr>, InternalError> {
    let sum = Expr::slot(nth_slot("avg", aggs, 0)?);
    let count = Expr::slot(nth_slot("avg", aggs, 1)?);

    if state.needs_merge() {
        return Ok(Some(Expr::func(
            Builtin::NewObj,
            vec![
                Expr::constant(AVG_COUNT_FIELD),
                count,
                Expr::constant(AVG_SUM_FIELD),
                sum,
            ],
        )));
    }

    Ok(Some(Expr::if_then_else(
        Expr::func(Builtin::Eq, vec![count.clone(), Expr::constant(0)]),
        Expr::null(),
        Expr::func(Builtin::Divide, vec![sum, count]),
    )))
}

// min / max

fn min_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    unary_agg("min", AggFunc::Min, inputs)
}

fn max_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    unary_agg("max", AggFunc::Max, inputs)
}

fn min_block_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
    bitmap: SlotId,
) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError> {
    unary_block_agg("min", AggFunc::BlockMin, AggFunc::Min, inputs, bitmap)
}

fn max_block_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
    bitmap: SlotId,
) -> Result<Option<Vec<BlockAggAndRowAgg>>, InternalError> {
    unary_block_agg("max", AggFunc::BlockMax, AggFunc::Max, inputs, bitmap)
}

fn min_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    unary_combine("min", AggFunc::Min, spill)
}

fn max_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    unary_combine("max", AggFunc::Max, spill)
}

// Groups that never saw a value report null.
fn null_if_empty(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    aggs: &[SlotId],
) -> Result<Option<Expr>, InternalError> {
    let slot = nth_slot("min/max", aggs, 0)?;

    Ok(Some(Expr::fill_empty_null(Expr::slot(slot))))
}

// first / last

fn first_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    unary_agg("first", AggFunc::First, inputs)
}

fn last_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    unary_agg("last", AggFunc::Last, inputs)
}

fn first_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    unary_combine("first", AggFunc::First, spill)
}

fn last_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    unary_combine("last", AggFunc::Last, spill)
}

// push / addToSet

fn empty_array_init(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
) -> Result<Vec<Expr>, InternalError> {
    Ok(vec![Expr::constant(Value::Array(Vec::new()))])
}

fn push_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    unary_agg("push", AggFunc::Push, inputs)
}

fn add_to_set_aggs(
    _state: &mut StageBuilderState<'_>,
    inputs: AccumInputs,
) -> Result<Vec<Expr>, InternalError> {
    unary_agg("addToSet", AggFunc::AddToSet, inputs)
}

fn push_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    unary_combine("push", AggFunc::ConcatArrays, spill)
}

fn add_to_set_combine(
    _state: &mut StageBuilderState<'_>,
    _inputs: Option<AccumInputs>,
    spill: &[SlotId],
) -> Result<Vec<Expr>, InternalError> {
    unary_combine("addToSet", AggFunc::SetUnion, spill)
}
