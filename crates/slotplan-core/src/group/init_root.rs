use crate::{
    error::InternalError,
    group::GroupNode,
    ir::{Builtin, Expr},
    slots::{PlanStageSlots, SlotId, TypeSignature, TypedSlot, VariableTypes},
    stage::{PlanStage, make_project},
    state::StageBuilderState,
    value::Value,
};

///
/// InitRoot
///
/// Stage after the reserved root slot was populated, plus the key that is
/// now a single expression.
///

pub(super) struct InitRoot {
    pub stage: PlanStage,
    pub key_exprs: Vec<Expr>,
}

// Composite keys collapse into one object key.
fn fold_composite_key(node: &GroupNode, key_exprs: Vec<Expr>) -> Result<Expr, InternalError> {
    let Some(parts) = node.key_object() else {
        let mut key_exprs = key_exprs;
        return match key_exprs.len() {
            1 => Ok(key_exprs.remove(0)),
            found => Err(InternalError::group_invariant(format!(
                "expected one key expression, found {found}"
            ))),
        };
    };

    if parts.len() != key_exprs.len() {
        return Err(InternalError::group_invariant(format!(
            "key object has {} parts but {} key expressions were lowered",
            parts.len(),
            key_exprs.len()
        )));
    }

    let mut args = Vec::with_capacity(parts.len() * 2);
    for ((name, _), expr) in parts.iter().zip(key_exprs) {
        args.push(Expr::constant(name.as_str()));
        args.push(expr);
    }

    Ok(Expr::func(Builtin::NewObj, args))
}

/// Populate the reserved init-root slot from the group key.
///
/// A key known to be an object is projected straight into the slot.
/// Anything else is projected first and the root becomes
/// `if isObject(key) then key else {}`.
#[expect(clippy::too_many_arguments)]
pub(super) fn generate_init_root_slot(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    stage: PlanStage,
    outputs: &PlanStageSlots,
    individual: &mut Vec<TypedSlot>,
    key_exprs: Vec<Expr>,
    vectorized: bool,
    reserved: SlotId,
) -> Result<InitRoot, InternalError> {
    let key = fold_composite_key(node, key_exprs)?;

    let known_object = node.key_object().is_some()
        || (!vectorized && key.constant_value().is_some_and(Value::is_object));

    let types = VariableTypes::with_slots(outputs, individual);
    let target = known_object.then_some(reserved);
    let (stage, slots) = make_project(state, node.node_id, &types, stage, vec![(key, target)]);
    let key_slot = slots
        .first()
        .copied()
        .ok_or_else(|| InternalError::group_invariant("key projection produced no slot"))?;
    individual.push(key_slot);

    let key_exprs = vec![Expr::slot(key_slot.id())];
    if known_object {
        return Ok(InitRoot { stage, key_exprs });
    }

    let root_expr = Expr::if_then_else(
        Expr::func(Builtin::IsObject, vec![Expr::slot(key_slot.id())]),
        Expr::slot(key_slot.id()),
        Expr::constant(Value::empty_object()),
    );
    let types = VariableTypes::with_slots(outputs, individual);
    let (stage, _) = make_project(
        state,
        node.node_id,
        &types,
        stage,
        vec![(root_expr, Some(reserved))],
    );
    individual.push(TypedSlot::typed(reserved, TypeSignature::OBJECT));

    Ok(InitRoot { stage, key_exprs })
}
