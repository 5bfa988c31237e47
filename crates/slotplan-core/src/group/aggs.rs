use crate::{
    accum::{AccumInputs, AccumOp},
    error::InternalError,
    expr::generate_expression,
    group::{AccumulationStatement, GroupNode, accum::sort_spec_expr},
    ir::Expr,
    obs::sink::{self, CompileEvent, FallbackReason},
    slots::{PlanStageSlots, SlotId, TypeSignature, TypedSlot},
    stage::{AggExprTriple, MergeExpr},
    state::StageBuilderState,
};

// Initial values of one accumulator. Bounded accumulators lower their `n`
// initializer against the init root, when one exists.
fn generate_init(
    state: &mut StageBuilderState<'_>,
    acc: &AccumulationStatement,
    op: &AccumOp,
    init_root: Option<SlotId>,
) -> Result<Vec<Expr>, InternalError> {
    let inputs = if acc.kind.is_accumulator_n() {
        let initializer = acc.initializer.as_ref().ok_or_else(|| {
            InternalError::accumulator_invariant(format!(
                "{} accumulator requires an initializer",
                op.name()
            ))
        })?;

        let mut slots = PlanStageSlots::new();
        if let Some(root) = init_root {
            slots.set_result_obj(TypedSlot::typed(root, TypeSignature::OBJECT));
        }
        let max_size = generate_expression(state, initializer, init_root, &slots)?;

        Some(AccumInputs::InitN {
            max_size,
            is_group_accum: Expr::constant(true),
        })
    } else {
        None
    };

    op.build_initialize(state, inputs)
}

/// Aggregate triples of one accumulator.
///
/// With `bitmap` set, block partial aggregates are requested as well and
/// `None` is returned when the accumulator cannot produce them.
fn generate_accum_aggs(
    state: &mut StageBuilderState<'_>,
    acc: &AccumulationStatement,
    inputs: AccumInputs,
    init_root: Option<SlotId>,
    bitmap: Option<SlotId>,
) -> Result<Option<Vec<AggExprTriple>>, InternalError> {
    let op = AccumOp::new(acc.kind);

    let aggs: Vec<(Option<Expr>, Expr)> = match bitmap {
        None => op
            .build_add_aggs(state, inputs)?
            .into_iter()
            .map(|agg| (None, agg))
            .collect(),
        Some(bitmap) => {
            let Some(aggs) = op.build_add_block_aggs(state, inputs, bitmap)? else {
                return Ok(None);
            };
            aggs.into_iter()
                .map(|pair| (Some(pair.block_agg), pair.row_agg))
                .collect()
        }
    };

    let inits = generate_init(state, acc, &op, init_root)?;
    if inits.len() != aggs.len() {
        return Err(InternalError::accumulator_invariant(format!(
            "{} produced {} initializers for {} aggregates",
            op.name(),
            inits.len(),
            aggs.len()
        )));
    }

    Ok(Some(
        inits
            .into_iter()
            .zip(aggs)
            .map(|(init, (block_agg, agg))| AggExprTriple {
                init,
                block_agg,
                agg,
            })
            .collect(),
    ))
}

/// Aggregate triples of every accumulator, in declaration order.
pub(super) fn generate_all_accum_aggs(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    inputs: Vec<AccumInputs>,
    init_root: Option<SlotId>,
    bitmap: Option<SlotId>,
) -> Result<Option<Vec<Vec<AggExprTriple>>>, InternalError> {
    if inputs.len() != node.accumulators.len() {
        return Err(InternalError::group_invariant(format!(
            "expected inputs for {} accumulators, found {}",
            node.accumulators.len(),
            inputs.len()
        )));
    }

    let mut all = Vec::with_capacity(inputs.len());
    for (acc, inputs) in node.accumulators.iter().zip(inputs) {
        let Some(triples) = generate_accum_aggs(state, acc, inputs, init_root, bitmap)? else {
            let accumulator = acc.kind.name();
            tracing::debug!(
                node = %node.node_id,
                accumulator,
                "accumulator has no block partial aggregate"
            );
            sink::record(CompileEvent::BlockFallback {
                node: node.node_id,
                reason: FallbackReason::AccumulatorAggregate { accumulator },
            });

            return Ok(None);
        };
        all.push(triples);
    }

    Ok(Some(all))
}

/// Merge expressions recombining spilled partial aggregates, one fresh
/// spill slot per physical aggregate.
pub(super) fn generate_all_merging_exprs(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
) -> Result<Vec<Vec<MergeExpr>>, InternalError> {
    let mut all = Vec::with_capacity(node.accumulators.len());

    for (index, acc) in node.accumulators.iter().enumerate() {
        let op = AccumOp::new(acc.kind);
        if op.num_aggs() == 0 {
            return Err(InternalError::accumulator_invariant(format!(
                "{} must declare at least one aggregate",
                op.name()
            )));
        }

        let spill: Vec<SlotId> = (0..op.num_aggs()).map(|_| state.slot_id()).collect();
        let inputs = if acc.kind.is_top_bottom_n() {
            Some(AccumInputs::CombineTopBottomN {
                sort_spec: sort_spec_expr(state, node, index, acc)?,
            })
        } else {
            None
        };

        let exprs = op.build_combine_aggs(state, inputs, &spill)?;
        if exprs.len() != spill.len() {
            return Err(InternalError::accumulator_invariant(format!(
                "{} produced {} merge expressions for {} spill slots",
                op.name(),
                exprs.len(),
                spill.len()
            )));
        }

        all.push(
            spill
                .into_iter()
                .zip(exprs)
                .map(|(spill_slot, expr)| MergeExpr { spill_slot, expr })
                .collect(),
        );
    }

    Ok(all)
}
