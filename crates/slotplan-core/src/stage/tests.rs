use super::*;
use crate::{
    config::CompileConfig,
    error::ErrorOrigin,
    ir::{AggFunc, Builtin},
    slots::{SlotName, TypeSignature, TypedSlot, VariableTypes},
    state::StageBuilderState,
    value::Value,
};

const NODE: PlanNodeId = PlanNodeId::new(7);

fn scan(state: &mut StageBuilderState<'_>, block: bool) -> (PlanStage, PlanStageSlots) {
    let a = state.slot_id();
    let mut outputs = PlanStageSlots::new();
    let sig = if block {
        TypeSignature::BLOCK
    } else {
        TypeSignature::NUMBER
    };
    outputs.set(SlotName::field("a"), TypedSlot::typed(a, sig));

    let block_bitmap = block.then(|| {
        let bitmap = state.slot_id();
        outputs.set(
            SlotName::BlockSelectivityBitmap,
            TypedSlot::typed(bitmap, TypeSignature::BLOCK),
        );
        bitmap
    });

    let stage = PlanStage::Scan(ScanStage {
        node: PlanNodeId::new(0),
        result_slot: None,
        fields: vec![ScanField {
            name: "a".to_string(),
            slot: a,
            block,
        }],
        block_bitmap,
    });

    (stage, outputs)
}

#[test]
fn empty_projection_returns_the_input() {
    let config = CompileConfig::new();
    let mut state = StageBuilderState::new(&config);
    let (stage, outputs) = scan(&mut state, false);
    let types = VariableTypes::from_outputs(&outputs);

    let (projected, slots) = make_project(&mut state, NODE, &types, stage.clone(), Vec::new());

    assert_eq!(projected, stage);
    assert!(slots.is_empty());
}

#[test]
fn projection_honors_targets_and_types_outputs() {
    let config = CompileConfig::new();
    let mut state = StageBuilderState::new(&config);
    let (stage, outputs) = scan(&mut state, false);
    let a = outputs.field("a").expect("scan publishes a").id();
    let target = state.slot_id();
    let types = VariableTypes::from_outputs(&outputs);

    let (projected, slots) = make_project(
        &mut state,
        NODE,
        &types,
        stage,
        vec![
            (Expr::func(Builtin::NewObj, Vec::new()), Some(target)),
            (Expr::slot(a), None),
            (Expr::func(Builtin::GetField, vec![Expr::slot(a), Expr::constant("x")]), None),
        ],
    );

    assert_eq!(slots[0], TypedSlot::typed(target, TypeSignature::OBJECT));
    assert_eq!(slots[1].type_signature(), Some(TypeSignature::NUMBER));
    assert_eq!(slots[2].type_signature(), None, "field reads are untyped");
    assert_eq!(projected.node_id(), NODE);
    assert!(matches!(&projected, PlanStage::Project { projects, .. } if projects.len() == 3));
}

#[test]
fn conditional_types_union_both_branches() {
    let types = VariableTypes::default();
    let expr = Expr::if_then_else(
        Expr::constant(true),
        Expr::constant(1),
        Expr::func(Builtin::NewObj, Vec::new()),
    );

    assert_eq!(
        infer_type(&expr, &types),
        Some(TypeSignature::NUMBER.include(TypeSignature::OBJECT))
    );
    assert_eq!(
        infer_type(
            &Expr::func(Builtin::BlockBroadcast, vec![Expr::null()]),
            &types
        ),
        Some(TypeSignature::BLOCK)
    );
    assert_eq!(infer_type(&Expr::fail(2, "x"), &types), None);
}

#[test]
fn block_to_row_unpacks_every_block_slot_once() {
    let config = CompileConfig::new();
    let mut state = StageBuilderState::new(&config);
    let (stage, mut outputs) = scan(&mut state, true);
    let block_a = outputs.field("a").expect("scan publishes a");
    let key = TypedSlot::typed(state.slot_id(), TypeSignature::BLOCK);
    let scalar = TypedSlot::typed(state.slot_id(), TypeSignature::STRING);

    let (closed, converted) =
        build_block_to_row(&mut state, NODE, stage, &mut outputs, &[block_a, key, scalar])
            .expect("bitmap present");

    assert!(!outputs.has_block_output());
    let row_a = outputs.field("a").expect("a stays published");
    assert!(!row_a.is_block());
    assert_eq!(converted[0].id(), row_a.id(), "individual slots reuse the named conversion");
    assert!(!converted[1].is_block());
    assert_eq!(
        converted[2].type_signature(),
        Some(TypeSignature::STRING),
        "scalar types survive the conversion"
    );

    let PlanStage::BlockToRow { blocks, rows, .. } = &closed else {
        panic!("expected a block-to-row stage, found {closed:?}");
    };
    assert_eq!(blocks.len(), 3);
    assert_eq!(rows.len(), 3);
}

#[test]
fn block_to_row_requires_a_bitmap() {
    let config = CompileConfig::new();
    let mut state = StageBuilderState::new(&config);
    let (stage, mut outputs) = scan(&mut state, false);

    let err = build_block_to_row(&mut state, NODE, stage, &mut outputs, &[])
        .expect_err("row input has no bitmap");

    assert_eq!(err.origin, ErrorOrigin::Stage);
}

#[test]
fn explain_renders_one_indented_line_per_stage() {
    let config = CompileConfig::new();
    let mut state = StageBuilderState::new(&config);
    let (stage, outputs) = scan(&mut state, false);
    let a = outputs.field("a").expect("scan publishes a").id();
    let out = state.slot_id();
    let spill = state.slot_id();

    let agg = PlanStage::HashAgg(HashAggStage {
        node: NODE,
        input: Box::new(stage),
        group_by: vec![a],
        aggs: vec![(
            out,
            AggExprTriple {
                init: Expr::constant(0),
                block_agg: None,
                agg: Expr::agg(AggFunc::Sum, vec![Expr::slot(a)]),
            },
        )],
        collator: None,
        merging: vec![MergeExpr {
            spill_slot: spill,
            expr: Expr::agg(AggFunc::Sum, vec![Expr::slot(spill)]),
        }],
    });

    assert_eq!(
        agg.explain(),
        "[7] group [s1] [s2 = sum(s1) init {0}] spill [s3 = sum(s3)]\n  [0] scan [s1 = a (scalar)]\n"
    );
}

#[test]
fn fingerprint_is_stable_hex_and_sensitive_to_plan_changes() {
    let config = CompileConfig::new();
    let mut state = StageBuilderState::new(&config);
    let (stage, outputs) = scan(&mut state, false);
    let a = outputs.field("a").expect("scan publishes a").id();

    let fragment = |constant: i64| PlanFragment {
        root: PlanStage::Project {
            node: NODE,
            input: Box::new(stage.clone()),
            projects: vec![(a, Expr::Constant(Value::Int(constant)))],
        },
        outputs: outputs.clone(),
        environment: state.environment().clone(),
    };

    let first = fragment(1).fingerprint();
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(first, fragment(1).fingerprint());
    assert_ne!(first, fragment(2).fingerprint());
}
