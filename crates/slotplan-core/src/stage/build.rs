use crate::{
    error::InternalError,
    ir::{Builtin, Expr},
    slots::{PlanStageSlots, SlotId, SlotName, TypeSignature, TypedSlot, VariableTypes},
    stage::{PlanNodeId, PlanStage},
    state::StageBuilderState,
};
use std::collections::BTreeMap;

/// Wrap `stage` in a projection evaluating `projects`.
///
/// Each projection writes to its requested target slot or to a fresh one.
/// Output slots are typed from the expression where that is knowable.
/// An empty projection list returns `stage` unchanged.
pub fn make_project(
    state: &mut StageBuilderState<'_>,
    node: PlanNodeId,
    types: &VariableTypes,
    stage: PlanStage,
    projects: Vec<(Expr, Option<SlotId>)>,
) -> (PlanStage, Vec<TypedSlot>) {
    if projects.is_empty() {
        return (stage, Vec::new());
    }

    let mut slots = Vec::with_capacity(projects.len());
    let mut assignments = Vec::with_capacity(projects.len());
    for (expr, target) in projects {
        let slot = target.unwrap_or_else(|| state.slot_id());
        let typed = match infer_type(&expr, types) {
            Some(sig) => TypedSlot::typed(slot, sig),
            None => TypedSlot::new(slot),
        };
        slots.push(typed);
        assignments.push((slot, expr));
    }

    let stage = PlanStage::Project {
        node,
        input: Box::new(stage),
        projects: assignments,
    };

    (stage, slots)
}

/// Best-effort static type of an expression's result.
#[must_use]
pub fn infer_type(expr: &Expr, types: &VariableTypes) -> Option<TypeSignature> {
    match expr {
        Expr::Constant(value) => Some(TypeSignature::of_value(value)),
        Expr::Nothing => Some(TypeSignature::NOTHING),
        Expr::Slot(id) => types.get(*id),
        Expr::Function { func, .. } if func.is_block() => Some(TypeSignature::BLOCK),
        Expr::Function { func, .. } => match func {
            Builtin::NewObj | Builtin::NewBsonObj => Some(TypeSignature::OBJECT),
            Builtin::NewArray | Builtin::AccumulatorNFinalize | Builtin::TopBottomNFinalize => {
                Some(TypeSignature::ARRAY)
            }
            Builtin::IsObject
            | Builtin::IsArray
            | Builtin::IsNumber
            | Builtin::Eq
            | Builtin::Ne
            | Builtin::Gt
            | Builtin::Gte
            | Builtin::Lt
            | Builtin::Lte
            | Builtin::And
            | Builtin::Or
            | Builtin::Not
            | Builtin::AtMostOneArray => Some(TypeSignature::BOOL),
            _ => None,
        },
        Expr::If {
            then, otherwise, ..
        } => {
            let then = infer_type(then, types)?;
            let otherwise = infer_type(otherwise, types)?;
            Some(then.include(otherwise))
        }
        Expr::Fail { .. } | Expr::Aggregate { .. } => None,
    }
}

///
/// BlockToRowSlots
///
/// Pairs of batched input slots and the row slots they are unpacked into.
///

#[derive(Default)]
struct BlockToRowSlots {
    blocks: Vec<SlotId>,
    rows: Vec<SlotId>,
    remap: BTreeMap<SlotId, SlotId>,
}

impl BlockToRowSlots {
    fn convert(&mut self, state: &mut StageBuilderState<'_>, slot: TypedSlot) -> TypedSlot {
        if let Some(row) = self.remap.get(&slot.id()) {
            return TypedSlot::new(*row);
        }

        let row = state.slot_id();
        self.blocks.push(slot.id());
        self.rows.push(row);
        self.remap.insert(slot.id(), row);

        match slot.type_signature() {
            Some(sig) if !sig.is_block() => TypedSlot::typed(row, sig),
            _ => TypedSlot::new(row),
        }
    }
}

/// Close the batched pipeline: unpack every block-typed output slot and every
/// slot in `individual` into row slots.
///
/// `outputs` is rewritten in place to publish the row slots, and its
/// selectivity bitmap is removed. The converted `individual` slots are
/// returned in order.
pub fn build_block_to_row(
    state: &mut StageBuilderState<'_>,
    node: PlanNodeId,
    stage: PlanStage,
    outputs: &mut PlanStageSlots,
    individual: &[TypedSlot],
) -> Result<(PlanStage, Vec<TypedSlot>), InternalError> {
    let bitmap = outputs
        .require(&SlotName::BlockSelectivityBitmap)?
        .id();

    let mut pairs = BlockToRowSlots::default();

    let named: Vec<(SlotName, TypedSlot)> = outputs
        .iter()
        .filter(|(name, slot)| **name != SlotName::BlockSelectivityBitmap && slot.is_block())
        .map(|(name, slot)| (name.clone(), slot))
        .collect();
    for (name, slot) in named {
        let row = pairs.convert(state, slot);
        outputs.set(name, row);
    }

    let converted = individual
        .iter()
        .map(|slot| pairs.convert(state, *slot))
        .collect();

    outputs.clear(&SlotName::BlockSelectivityBitmap);

    let stage = PlanStage::BlockToRow {
        node,
        input: Box::new(stage),
        blocks: pairs.blocks,
        rows: pairs.rows,
        bitmap,
    };

    Ok((stage, converted))
}
