use super::*;
use crate::{error::ErrorOrigin, reqs::FieldEffect, value::Value};

fn slot(generator: &mut SlotIdGenerator) -> SlotId {
    generator.generate()
}

#[test]
fn generator_starts_at_one_and_counts_allocations() {
    let mut generator = SlotIdGenerator::new();

    assert_eq!(generator.allocated(), 0);
    let first = slot(&mut generator);
    let second = slot(&mut generator);

    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 2);
    assert_eq!(generator.allocated(), 2);
    assert_eq!(first.to_string(), "s1");
}

#[test]
fn block_and_cell_tags_mark_batched_slots() {
    let mut generator = SlotIdGenerator::new();
    let id = slot(&mut generator);

    assert!(!TypedSlot::new(id).is_block(), "untyped slots are scalar");
    assert!(!TypedSlot::typed(id, TypeSignature::ANY_SCALAR).is_block());
    assert!(TypedSlot::typed(id, TypeSignature::BLOCK).is_block());
    assert!(TypedSlot::typed(id, TypeSignature::CELL.include(TypeSignature::NUMBER)).is_block());
}

#[test]
fn signature_set_operations() {
    let numeric_or_null = TypeSignature::NUMBER.include(TypeSignature::NULL);

    assert!(TypeSignature::NUMBER.is_subset(numeric_or_null));
    assert!(!numeric_or_null.is_subset(TypeSignature::NUMBER));
    assert_eq!(numeric_or_null.exclude(TypeSignature::NULL), TypeSignature::NUMBER);
    assert!(TypeSignature::ANY_SCALAR.contains_any(TypeSignature::OBJECT));
    assert!(!TypeSignature::ANY_SCALAR.contains_any(TypeSignature::BLOCK));
    assert_eq!(
        TypeSignature::of_value(&Value::Double(1.5)),
        TypeSignature::NUMBER
    );
    assert_eq!(
        TypeSignature::of_value(&Value::empty_object()),
        TypeSignature::OBJECT
    );
}

#[test]
fn result_obj_and_result_info_are_exclusive() {
    let mut generator = SlotIdGenerator::new();
    let record = slot(&mut generator);
    let base = slot(&mut generator);
    let mut outputs = PlanStageSlots::new();

    outputs.set_result_info_base(TypedSlot::typed(base, TypeSignature::OBJECT));
    outputs.add_effects_to_result_info(FieldEffects::new(FieldEffect::Keep));
    assert!(outputs.has(&SlotName::ResultInfoBase));

    outputs.set_result_obj(TypedSlot::typed(record, TypeSignature::OBJECT));
    assert_eq!(outputs.result_obj_if_exists(), Some(record));
    assert!(!outputs.has(&SlotName::ResultInfoBase));
    assert!(
        outputs.result_info_effects().is_none(),
        "materializing the record discards pending effects"
    );

    outputs.set_result_info_base(TypedSlot::typed(base, TypeSignature::OBJECT));
    assert_eq!(outputs.result_obj_if_exists(), None);
}

#[test]
fn require_reports_missing_slots_as_stage_invariants() {
    let outputs = PlanStageSlots::new();

    let err = outputs
        .require(&SlotName::BlockSelectivityBitmap)
        .expect_err("empty outputs have no bitmap");

    assert_eq!(err.origin, ErrorOrigin::Stage);
    assert!(err.message.contains("BlockSelectivityBitmap"), "{}", err.message);
}

#[test]
fn bitmap_presence_signals_block_output() {
    let mut generator = SlotIdGenerator::new();
    let field = slot(&mut generator);
    let bitmap = slot(&mut generator);
    let mut outputs = PlanStageSlots::new();

    outputs.set(SlotName::field("a"), TypedSlot::typed(field, TypeSignature::BLOCK));
    assert!(!outputs.has_block_output());

    outputs.set(
        SlotName::BlockSelectivityBitmap,
        TypedSlot::typed(bitmap, TypeSignature::BLOCK),
    );
    assert!(outputs.has_block_output());

    outputs.clear(&SlotName::BlockSelectivityBitmap);
    assert!(!outputs.has_block_output());
}

#[test]
fn variable_types_merge_outputs_with_individual_slots() {
    let mut generator = SlotIdGenerator::new();
    let published = slot(&mut generator);
    let private = slot(&mut generator);
    let untyped = slot(&mut generator);
    let mut outputs = PlanStageSlots::new();
    outputs.set(
        SlotName::field("a"),
        TypedSlot::typed(published, TypeSignature::BLOCK),
    );
    outputs.set(SlotName::field("b"), TypedSlot::new(untyped));

    let types = VariableTypes::with_slots(
        &outputs,
        &[TypedSlot::typed(private, TypeSignature::NUMBER)],
    );

    assert!(types.is_block(published));
    assert_eq!(types.get(private), Some(TypeSignature::NUMBER));
    assert_eq!(types.get(untyped), None);
    assert_eq!(outputs.type_of(published), Some(TypeSignature::BLOCK));
    assert!(!VariableTypes::from_outputs(&outputs).is_block(private));
}
