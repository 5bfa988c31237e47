use crate::{
    error::InternalError,
    group::GroupNode,
    ir::Expr,
    slots::{PlanStageSlots, SlotId, SlotName, TypeSignature, TypedSlot, VariableTypes},
    stage::{
        AggExprTriple, BlockHashAggStage, HashAggStage, MergeExpr, PlanStage, make_project,
    },
    state::StageBuilderState,
};

///
/// BlockInputs
///
/// Batched accumulator inputs handed to the assembler.
///

pub(super) struct BlockInputs {
    pub arg_exprs: Vec<Vec<Expr>>,
    pub data_slots: Vec<Vec<SlotId>>,
    pub bitmap_internal: SlotId,
}

///
/// AggregationInputs
///
/// Lowered key and accumulator expressions of one group.
///

pub(super) struct AggregationInputs {
    pub key_exprs: Vec<Expr>,
    pub aggs: Vec<Vec<AggExprTriple>>,
    pub merging: Vec<Vec<MergeExpr>>,
    pub block: Option<BlockInputs>,
}

///
/// Aggregation
///
/// The aggregation stage plus its key and aggregate output slots, both in
/// declaration order.
///

pub(super) struct Aggregation {
    pub stage: PlanStage,
    pub group_by: Vec<TypedSlot>,
    pub aggs: Vec<TypedSlot>,
}

/// Emit the key projection followed by `HashAgg`, or `BlockHashAgg` when
/// `block` is present.
pub(super) fn build_group_aggregation(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    child_outputs: &PlanStageSlots,
    individual: &[TypedSlot],
    stage: PlanStage,
    inputs: AggregationInputs,
) -> Result<Aggregation, InternalError> {
    let AggregationInputs {
        key_exprs,
        aggs,
        merging,
        block,
    } = inputs;
    let num_keys = key_exprs.len();
    let mut projects: Vec<(Expr, Option<SlotId>)> =
        key_exprs.into_iter().map(|expr| (expr, None)).collect();
    if let Some(block) = &block {
        projects.extend(block.arg_exprs.iter().flatten().cloned().map(|expr| (expr, None)));
    }

    let types = VariableTypes::with_slots(child_outputs, individual);
    let (stage, projected) = make_project(state, node.node_id, &types, stage, projects);
    let (group_by, block_acc_args) = projected.split_at(num_keys);
    let group_by_ids: Vec<SlotId> = group_by.iter().map(|slot| slot.id()).collect();

    let triples: Vec<AggExprTriple> = aggs.into_iter().flatten().collect();
    let merging: Vec<MergeExpr> = merging.into_iter().flatten().collect();

    let Some(block) = block else {
        let aggs: Vec<(SlotId, AggExprTriple)> = triples
            .into_iter()
            .map(|triple| (state.slot_id(), triple))
            .collect();
        let agg_slots = aggs.iter().map(|(slot, _)| TypedSlot::new(*slot)).collect();

        let stage = PlanStage::HashAgg(HashAggStage {
            node: node.node_id,
            input: Box::new(stage),
            group_by: group_by_ids,
            aggs,
            collator: state.collator_slot(),
            merging,
        });

        return Ok(Aggregation {
            stage,
            group_by: group_by.to_vec(),
            aggs: agg_slots,
        });
    };

    let selectivity_bitmap = child_outputs
        .require(&SlotName::BlockSelectivityBitmap)?
        .id();
    let group_by_out: Vec<SlotId> = group_by_ids.iter().map(|_| state.slot_id()).collect();
    let aggs: Vec<(SlotId, AggExprTriple)> = triples
        .into_iter()
        .map(|triple| (state.slot_id(), triple))
        .collect();

    let block_typed = |slot: &SlotId| TypedSlot::typed(*slot, TypeSignature::BLOCK);
    let group_by_slots = group_by_out.iter().map(block_typed).collect();
    let agg_slots = aggs.iter().map(|(slot, _)| block_typed(slot)).collect();

    let stage = PlanStage::BlockHashAgg(BlockHashAggStage {
        node: node.node_id,
        input: Box::new(stage),
        group_by: group_by_ids,
        group_by_out,
        aggs,
        selectivity_bitmap,
        block_acc_args: block_acc_args.iter().map(|slot| slot.id()).collect(),
        bitmap_internal: block.bitmap_internal,
        acc_data: block.data_slots.into_iter().flatten().collect(),
        merging,
    });

    Ok(Aggregation {
        stage,
        group_by: group_by_slots,
        aggs: agg_slots,
    })
}
