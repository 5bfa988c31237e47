use crate::{
    accum::{AccumInputs, AccumOp, AddBlockExprs},
    error::InternalError,
    expr::{Expression, generate_expression},
    group::{AccumulationStatement, GroupNode},
    ir::{BAD_VALUE, Builtin, Expr},
    obs::sink::{self, CompileEvent, FallbackReason},
    slots::PlanStageSlots,
    sort::{SortKeysPlanKind, SortPattern, build_sort_keys, make_sort_keys_plan},
    state::StageBuilderState,
    value::Value,
};

/// Argument field of rank accumulators holding the ranked value.
const OUTPUT_FIELD: &str = "output";

const PARALLEL_ARRAYS_MESSAGE: &str = "cannot sort with keys that are parallel arrays";

enum RankValue<'a> {
    Expr(&'a Expression),
    Constant(Value),
}

fn rank_value(acc: &AccumulationStatement) -> Result<RankValue<'_>, InternalError> {
    let name = acc.kind.name();
    let found = match &acc.argument {
        Expression::Object(fields) => fields
            .iter()
            .find(|(field, _)| field == OUTPUT_FIELD)
            .map(|(_, expr)| RankValue::Expr(expr)),
        Expression::Constant(Value::Object(fields)) => fields
            .iter()
            .find(|(field, _)| field == OUTPUT_FIELD)
            .map(|(_, value)| RankValue::Constant(value.clone())),
        _ => {
            return Err(InternalError::accumulator_invariant(format!(
                "{name} accumulator must have an object argument"
            )));
        }
    };

    found.ok_or_else(|| {
        InternalError::accumulator_invariant(format!(
            "{name} accumulator must have an output field in the argument"
        ))
    })
}

fn sort_pattern(acc: &AccumulationStatement) -> Result<&SortPattern, InternalError> {
    acc.sort_pattern.as_ref().ok_or_else(|| {
        InternalError::accumulator_invariant(format!(
            "expected sort pattern for {} accumulator",
            acc.kind.name()
        ))
    })
}

/// Environment slot reference holding a rank accumulator's sort specification.
pub(super) fn sort_spec_expr(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    index: usize,
    acc: &AccumulationStatement,
) -> Result<Expr, InternalError> {
    let pattern = sort_pattern(acc)?;

    Ok(Expr::slot(state.sort_spec_slot(node.node_id, index, pattern)))
}

fn lower_argument(
    state: &mut StageBuilderState<'_>,
    expr: &Expression,
    outputs: &PlanStageSlots,
) -> Result<Expr, InternalError> {
    let root = outputs.result_obj_if_exists();

    Ok(Expr::fill_empty_null(generate_expression(
        state, expr, root, outputs,
    )?))
}

fn rank_value_expr(
    state: &mut StageBuilderState<'_>,
    acc: &AccumulationStatement,
    outputs: &PlanStageSlots,
) -> Result<Expr, InternalError> {
    match rank_value(acc)? {
        RankValue::Expr(expr) => lower_argument(state, expr, outputs),
        RankValue::Constant(value) => Ok(Expr::Constant(value)),
    }
}

// An array `output` is split into its elements so each can live in its own block.
fn block_rank_value_exprs(
    state: &mut StageBuilderState<'_>,
    acc: &AccumulationStatement,
    outputs: &PlanStageSlots,
) -> Result<(Vec<Expr>, bool), InternalError> {
    match rank_value(acc)? {
        RankValue::Expr(Expression::Array(items)) => {
            let mut exprs = Vec::with_capacity(items.len());
            for item in items {
                exprs.push(lower_argument(state, item, outputs)?);
            }
            Ok((exprs, true))
        }
        RankValue::Expr(expr) => Ok((vec![lower_argument(state, expr, outputs)?], false)),
        RankValue::Constant(value) => Ok((vec![Expr::Constant(value)], false)),
    }
}

fn parallel_arrays_guard(check: Expr, key: Expr) -> Expr {
    Expr::if_then_else(check, key, Expr::fail(BAD_VALUE, PARALLEL_ARRAYS_MESSAGE))
}

fn sort_by_expr(
    state: &mut StageBuilderState<'_>,
    acc: &AccumulationStatement,
    outputs: &PlanStageSlots,
    sort_spec: Expr,
) -> Result<Expr, InternalError> {
    let pattern = sort_pattern(acc)?;
    let plan = make_sort_keys_plan(pattern);
    let keys = build_sort_keys(state, &plan, pattern, outputs, sort_spec)?;

    match plan.kind {
        SortKeysPlanKind::TraverseFields => {
            let mut key_exprs = keys.key_exprs;
            let full = match key_exprs.len() {
                0 => {
                    return Err(InternalError::accumulator_invariant(format!(
                        "{} sort pattern cannot be empty",
                        acc.kind.name()
                    )));
                }
                1 => key_exprs.remove(0),
                _ => Expr::func(Builtin::NewArray, key_exprs),
            };

            Ok(match keys.parallel_arrays_check {
                Some(check) => parallel_arrays_guard(check, full),
                None => full,
            })
        }
        SortKeysPlanKind::CallGenCheapSortKey => {
            let full = keys.full_key_expr.ok_or_else(|| {
                InternalError::accumulator_invariant("generated sort keys need a full key expression")
            })?;

            Ok(Expr::func(Builtin::SortKeyComponentVectorToArray, vec![full]))
        }
    }
}

// Multi-part keys stay separate so each part can be vectorized; the
// parallel-array guard rides on the first part.
fn block_sort_by_exprs(
    state: &mut StageBuilderState<'_>,
    acc: &AccumulationStatement,
    outputs: &PlanStageSlots,
    sort_spec: Expr,
) -> Result<(Vec<Expr>, bool), InternalError> {
    let pattern = sort_pattern(acc)?;
    let plan = make_sort_keys_plan(pattern);
    let keys = build_sort_keys(state, &plan, pattern, outputs, sort_spec)?;

    match plan.kind {
        SortKeysPlanKind::TraverseFields => {
            let mut key_exprs = keys.key_exprs;
            let use_mk = key_exprs.len() > 1;
            if key_exprs.is_empty() {
                key_exprs.push(Expr::func(Builtin::NewArray, Vec::new()));
            }
            if let Some(check) = keys.parallel_arrays_check {
                let first = key_exprs.remove(0);
                key_exprs.insert(0, parallel_arrays_guard(check, first));
            }

            Ok((key_exprs, use_mk))
        }
        SortKeysPlanKind::CallGenCheapSortKey => {
            let full = keys.full_key_expr.ok_or_else(|| {
                InternalError::accumulator_invariant("generated sort keys need a full key expression")
            })?;

            Ok((
                vec![Expr::func(Builtin::SortKeyComponentVectorToArray, vec![full])],
                false,
            ))
        }
    }
}

/// Row-mode inputs of one accumulator.
fn generate_accum_inputs(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    index: usize,
    acc: &AccumulationStatement,
    outputs: &PlanStageSlots,
) -> Result<AccumInputs, InternalError> {
    let inputs = if acc.kind.is_top_bottom_n() {
        let sort_spec = sort_spec_expr(state, node, index, acc)?;
        AccumInputs::TopBottomN {
            value: rank_value_expr(state, acc, outputs)?,
            sort_by: sort_by_expr(state, acc, outputs, sort_spec.clone())?,
            sort_spec,
        }
    } else {
        AccumInputs::Single {
            input: lower_argument(state, &acc.argument, outputs)?,
        }
    };

    AccumOp::new(acc.kind).build_add_exprs(state, inputs)
}

/// Row-mode inputs of every accumulator, in declaration order.
pub(super) fn generate_all_accum_inputs(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    outputs: &PlanStageSlots,
) -> Result<Vec<AccumInputs>, InternalError> {
    node.accumulators
        .iter()
        .enumerate()
        .map(|(index, acc)| generate_accum_inputs(state, node, index, acc, outputs))
        .collect()
}

fn generate_accum_block_exprs(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    index: usize,
    acc: &AccumulationStatement,
    outputs: &PlanStageSlots,
) -> Result<Option<AddBlockExprs>, InternalError> {
    let op = AccumOp::new(acc.kind);

    let inputs = if acc.kind.is_top_bottom_n() {
        let sort_spec = sort_spec_expr(state, node, index, acc)?;
        let (values, value_is_array) = block_rank_value_exprs(state, acc, outputs)?;
        let (sort_by, use_mk) = block_sort_by_exprs(state, acc, outputs, sort_spec.clone())?;
        AccumInputs::BlockTopBottomN {
            values,
            value_is_array,
            sort_by,
            use_mk,
            sort_spec,
        }
    } else {
        let input = lower_argument(state, &acc.argument, outputs)?;
        op.build_add_exprs(state, AccumInputs::Single { input })?
    };

    op.build_add_block_exprs(state, inputs, outputs)
}

/// Block inputs of every accumulator, or `None` as soon as one accumulator
/// cannot produce them.
pub(super) fn generate_all_accum_block_exprs(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    outputs: &PlanStageSlots,
) -> Result<Option<Vec<AddBlockExprs>>, InternalError> {
    let mut all = Vec::with_capacity(node.accumulators.len());

    for (index, acc) in node.accumulators.iter().enumerate() {
        let Some(block_exprs) = generate_accum_block_exprs(state, node, index, acc, outputs)?
        else {
            let accumulator = acc.kind.name();
            tracing::debug!(node = %node.node_id, accumulator, "accumulator input has no block form");
            sink::record(CompileEvent::BlockFallback {
                node: node.node_id,
                reason: FallbackReason::AccumulatorInput { accumulator },
            });

            return Ok(None);
        };
        all.push(block_exprs);
    }

    Ok(Some(all))
}
