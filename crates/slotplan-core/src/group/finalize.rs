use crate::{
    accum::{AccumInputs, AccumOp, nth_slot},
    error::InternalError,
    group::{GROUP_KEY_FIELD, GroupNode, accum::sort_spec_expr},
    ir::{Builtin, Expr},
    slots::{PlanStageSlots, SlotId, TypedSlot, VariableTypes},
    stage::{PlanStage, make_project},
    state::StageBuilderState,
};

///
/// KeyShape
///
/// How the `_id` output is rebuilt from the aggregation's key slots.
///

#[derive(Clone, Debug)]
pub(super) enum KeyShape {
    /// The key folded to a constant; the aggregation has no key slots.
    Constant(Expr),
    /// One key slot holds the whole key.
    Single,
    /// One key slot per key-object field.
    Composite,
}

///
/// FinalStage
///

pub(super) struct FinalStage {
    pub stage: PlanStage,
    pub fields: Vec<String>,
    pub slots: Vec<TypedSlot>,
}

fn key_output_expr(
    node: &GroupNode,
    shape: KeyShape,
    group_by: &[TypedSlot],
) -> Result<Expr, InternalError> {
    match shape {
        KeyShape::Constant(expr) => Ok(expr),
        KeyShape::Single => match group_by {
            [slot] => Ok(Expr::slot(slot.id())),
            _ => Err(InternalError::group_invariant(format!(
                "single key expected one key slot, found {}",
                group_by.len()
            ))),
        },
        KeyShape::Composite => {
            let parts = node.key_object().ok_or_else(|| {
                InternalError::group_invariant("composite key without a key object")
            })?;
            if parts.len() != group_by.len() {
                return Err(InternalError::group_invariant(format!(
                    "key object has {} fields but the aggregation produced {} key slots",
                    parts.len(),
                    group_by.len()
                )));
            }

            let mut args = Vec::with_capacity(parts.len() * 2);
            for ((name, _), slot) in parts.iter().zip(group_by) {
                args.push(Expr::constant(name.as_str()));
                args.push(Expr::slot(slot.id()));
            }

            Ok(Expr::func(Builtin::NewObj, args))
        }
    }
}

/// Project `_id` and one finalized value per accumulator.
///
/// Accumulators without a finalizer pass their first aggregate through.
/// When this group's output will be merged elsewhere, accumulators keep
/// their mergeable partial form.
#[expect(clippy::too_many_arguments)]
pub(super) fn generate_group_final_stage(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    stage: PlanStage,
    outputs: &PlanStageSlots,
    individual: &[TypedSlot],
    group_by: &[TypedSlot],
    agg_slots: &[TypedSlot],
    key: KeyShape,
) -> Result<FinalStage, InternalError> {
    let needs_merge = node.will_be_merged && state.needs_merge();
    let mut state = state.override_needs_merge(needs_merge);

    let mut fields = Vec::with_capacity(node.accumulators.len() + 1);
    let mut projects = Vec::with_capacity(node.accumulators.len() + 1);
    fields.push(GROUP_KEY_FIELD.to_string());
    projects.push((key_output_expr(node, key, group_by)?, None));

    let mut remaining: Vec<SlotId> = agg_slots.iter().map(|slot| slot.id()).collect();
    for (index, acc) in node.accumulators.iter().enumerate() {
        let op = AccumOp::new(acc.kind);
        if remaining.len() < op.num_aggs() {
            return Err(InternalError::group_invariant(format!(
                "{} needs {} aggregate slots but only {} remain",
                op.name(),
                op.num_aggs(),
                remaining.len()
            )));
        }
        let slots: Vec<SlotId> = remaining.drain(..op.num_aggs()).collect();

        let inputs = if acc.kind.is_top_bottom_n() {
            Some(AccumInputs::FinalizeTopBottomN {
                sort_spec: sort_spec_expr(&mut state, node, index, acc)?,
            })
        } else {
            None
        };

        let expr = match op.build_finalize(&mut state, inputs, &slots)? {
            Some(expr) => expr,
            None => Expr::slot(nth_slot(op.name(), &slots, 0)?),
        };
        fields.push(acc.field_name.clone());
        projects.push((expr, None));
    }

    if !remaining.is_empty() {
        return Err(InternalError::group_invariant(format!(
            "{} aggregate slots were not claimed by any accumulator",
            remaining.len()
        )));
    }

    let types = VariableTypes::with_slots(outputs, individual);
    let (stage, slots) = make_project(&mut state, node.node_id, &types, stage, projects);

    Ok(FinalStage {
        stage,
        fields,
        slots,
    })
}
