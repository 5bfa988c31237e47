use crate::{
    error::{CompileError, InternalError, RequestError},
    group::{
        AggregationMode, ChildStageBuilder, GroupNode,
        accum::generate_all_accum_inputs,
        aggs::{generate_all_accum_aggs, generate_all_merging_exprs},
        assemble::{Aggregation, AggregationInputs, BlockInputs, build_group_aggregation},
        finalize::{FinalStage, KeyShape, generate_group_final_stage},
        gate::{BlockArtifacts, attempt_block_aggregation, should_try_block_hash_agg},
        init_root::{InitRoot, generate_init_root_slot},
        key::{GroupKey, compile_group_key},
        paths::materialize_field_paths,
        reqs::compute_child_reqs_for_group,
    },
    ir::{Builtin, Expr},
    obs::sink::{self, CompileEvent},
    reqs::{PlanStageReqs, compose_effects_for_result_info, top_level_field},
    slots::{PlanStageSlots, SlotName, TypeSignature, TypedSlot, VariableTypes},
    stage::{PlanStage, build_block_to_row, make_project},
    state::StageBuilderState,
};

/// Build the stage tree for one group node.
///
/// The child is built for the requirements the group derives from `reqs`.
/// The returned slots publish `_id` and every accumulator by field name,
/// bind requested fields the group does not produce to the nothing slot,
/// and carry the result record when the parent asked for one.
pub fn build_group(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    reqs: &PlanStageReqs,
    child: &mut impl ChildStageBuilder,
) -> Result<(PlanStage, PlanStageSlots), CompileError> {
    if reqs.has_sort_keys() {
        return Err(
            InternalError::planner_invariant("group stage cannot produce sort keys").into(),
        );
    }
    if reqs.has_record_id() {
        return Err(RequestError::RecordIdThroughGroup.into());
    }

    let child_reqs = compute_child_reqs_for_group(node, reqs);
    let (stage, child_outputs) = child.build_child(state, &child_reqs)?;

    let FinalStage {
        stage,
        fields,
        slots,
    } = build_group_impl(state, node, stage, child_outputs)?;

    let expected = node.accumulators.len() + 1;
    if slots.len() != expected || fields.len() != expected {
        return Err(InternalError::group_invariant(format!(
            "expected {expected} final slots, found {}",
            slots.len()
        ))
        .into());
    }

    let mut outputs = PlanStageSlots::new();
    for (name, slot) in fields.iter().zip(&slots) {
        outputs.set(SlotName::field(name.as_str()), *slot);
    }

    for field in reqs.fields() {
        let top = top_level_field(field);
        if !fields.iter().any(|name| name == top) {
            let nothing = TypedSlot::typed(state.nothing_slot(), TypeSignature::NOTHING);
            outputs.set(SlotName::field(field.as_str()), nothing);
        }
    }

    let stage = if reqs.has_result() {
        shape_result(state, node, reqs, stage, &fields, &slots, &mut outputs)?
    } else {
        stage
    };

    Ok((stage, outputs))
}

// Prefer a lazy descriptor when the parent tracks effects and they compose;
// otherwise materialize the record from the final slots.
fn shape_result(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    reqs: &PlanStageReqs,
    stage: PlanStage,
    fields: &[String],
    slots: &[TypedSlot],
    outputs: &mut PlanStageSlots,
) -> Result<PlanStage, InternalError> {
    let lazy_effects = reqs.result_info().and_then(|(tracked, req_effects)| {
        let mut effects = node.effects();
        effects.narrow(tracked);
        compose_effects_for_result_info(&effects, req_effects)
    });

    tracing::debug!(node = %node.node_id, lazy = lazy_effects.is_some(), "group result shape");
    sink::record(CompileEvent::ResultShape {
        node: node.node_id,
        lazy: lazy_effects.is_some(),
    });

    if let Some(effects) = lazy_effects {
        let base = TypedSlot::typed(state.empty_obj_slot(), TypeSignature::OBJECT);
        outputs.set_result_info_base(base);
        outputs.add_effects_to_result_info(effects);

        return Ok(stage);
    }

    let func = if node.should_produce_bson {
        Builtin::NewBsonObj
    } else {
        Builtin::NewObj
    };
    let args = fields
        .iter()
        .zip(slots)
        .flat_map(|(name, slot)| [Expr::constant(name.as_str()), Expr::slot(slot.id())])
        .collect();

    let types = VariableTypes::from_outputs(outputs);
    let (stage, projected) = make_project(
        state,
        node.node_id,
        &types,
        stage,
        vec![(Expr::func(func, args), None)],
    );
    let record = projected
        .first()
        .ok_or_else(|| InternalError::group_invariant("result projection produced no slot"))?;
    outputs.set_result_obj(TypedSlot::typed(record.id(), TypeSignature::OBJECT));

    Ok(stage)
}

fn build_group_impl(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    stage: PlanStage,
    child_outputs: PlanStageSlots,
) -> Result<FinalStage, InternalError> {
    let mut outputs = child_outputs;

    let stage = materialize_field_paths(state, node, stage, &mut outputs)?;
    let (mut stage, key) = compile_group_key(state, node, stage, &mut outputs)?;
    let GroupKey {
        exprs: mut key_exprs,
        vectorized,
    } = key;

    let init_root = node.has_variable_initializer().then(|| state.slot_id());

    let block = if should_try_block_hash_agg(state, node, &outputs) {
        attempt_block_aggregation(state, node, &outputs)?
    } else {
        None
    };

    // Without block aggregation the key is projected while still batched and
    // then the pipeline is closed.
    let mut individual: Vec<TypedSlot> = Vec::new();
    if block.is_none() && outputs.has_block_output() {
        tracing::debug!(node = %node.node_id, "closing batched pipeline before row aggregation");

        let types = VariableTypes::from_outputs(&outputs);
        let projects = key_exprs.drain(..).map(|expr| (expr, None)).collect();
        let (projected, key_slots) = make_project(state, node.node_id, &types, stage, projects);
        let (row_stage, row_slots) =
            build_block_to_row(state, node.node_id, projected, &mut outputs, &key_slots)?;

        stage = row_stage;
        key_exprs = row_slots.iter().map(|slot| Expr::slot(slot.id())).collect();
        individual = row_slots;
    }

    let (aggs, block_inputs) = match block {
        Some(BlockArtifacts {
            arg_exprs,
            data_slots,
            bitmap_internal,
            aggs,
        }) => (
            aggs,
            Some(BlockInputs {
                arg_exprs,
                data_slots,
                bitmap_internal,
            }),
        ),
        None => {
            let inputs = generate_all_accum_inputs(state, node, &outputs)?;
            let aggs = generate_all_accum_aggs(state, node, inputs, init_root, None)?
                .ok_or_else(|| {
                    InternalError::group_invariant("row aggregates must always be available")
                })?;
            (aggs, None)
        }
    };

    let mut single_key = node.key_object().is_none();
    if let Some(reserved) = init_root {
        let InitRoot {
            stage: root_stage,
            key_exprs: root_key,
        } = generate_init_root_slot(
            state,
            node,
            stage,
            &outputs,
            &mut individual,
            key_exprs,
            vectorized,
            reserved,
        )?;
        stage = root_stage;
        key_exprs = root_key;
        single_key = true;
    }

    let merging = generate_all_merging_exprs(state, node)?;

    let constant_key = match key_exprs.as_slice() {
        [expr] if single_key && !vectorized && init_root.is_none() && expr.is_constant() => {
            Some(expr.clone())
        }
        _ => None,
    };
    if constant_key.is_some() {
        tracing::debug!(node = %node.node_id, "group key folded to a constant");
        key_exprs.clear();
    }

    let mode = if block_inputs.is_some() {
        AggregationMode::Block
    } else {
        AggregationMode::Scalar
    };
    let Aggregation {
        stage,
        group_by,
        aggs,
    } = build_group_aggregation(
        state,
        node,
        &outputs,
        &individual,
        stage,
        AggregationInputs {
            key_exprs,
            aggs,
            merging,
            block: block_inputs,
        },
    )?;

    let (stage, outputs, group_by, aggs) = match mode {
        AggregationMode::Block => {
            let mut block_outputs = PlanStageSlots::new();
            block_outputs.set(
                SlotName::BlockSelectivityBitmap,
                outputs.require(&SlotName::BlockSelectivityBitmap)?,
            );

            let closing: Vec<TypedSlot> = group_by.iter().chain(&aggs).copied().collect();
            let (stage, rows) =
                build_block_to_row(state, node.node_id, stage, &mut block_outputs, &closing)?;
            let (key_rows, agg_rows) = rows.split_at(group_by.len());

            (stage, block_outputs, key_rows.to_vec(), agg_rows.to_vec())
        }
        AggregationMode::Scalar => (stage, PlanStageSlots::new(), group_by, aggs),
    };

    let key_shape = match constant_key {
        Some(expr) => KeyShape::Constant(expr),
        None if single_key => KeyShape::Single,
        None => KeyShape::Composite,
    };
    let is_constant_key = matches!(key_shape, KeyShape::Constant(_));

    let visible: Vec<TypedSlot> = group_by.iter().chain(&aggs).copied().collect();
    let final_stage = generate_group_final_stage(
        state, node, stage, &outputs, &visible, &group_by, &aggs, key_shape,
    )?;

    tracing::debug!(
        node = %node.node_id,
        ?mode,
        accumulators = node.accumulators.len(),
        constant_key = is_constant_key,
        "group lowered"
    );
    sink::record(CompileEvent::GroupCompiled {
        node: node.node_id,
        mode,
        accumulators: node.accumulators.len(),
        constant_key: is_constant_key,
    });

    Ok(final_stage)
}
