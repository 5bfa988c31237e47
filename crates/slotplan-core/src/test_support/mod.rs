//! Shared fixtures for compiler tests: a scan child, node builders and the
//! reference evaluator.

pub(crate) mod eval;

use crate::{
    config::CompileConfig,
    error::CompileError,
    expr::Expression,
    group::{AccumulationStatement, ChildStageBuilder, GroupNode, compile_group},
    reqs::PlanStageReqs,
    slots::{PlanStageSlots, SlotName, TypeSignature, TypedSlot},
    stage::{PlanFragment, PlanNodeId, PlanStage, ScanField, ScanStage},
    state::StageBuilderState,
    value::Value,
};

pub(crate) const SCAN_NODE: PlanNodeId = PlanNodeId::new(0);
pub(crate) const GROUP_NODE: PlanNodeId = PlanNodeId::new(1);

///
/// ScanChild
///
/// Leaf child that publishes one slot per requested field. When built with
/// `blocks()` it emits batches whenever the requirements allow it.
///

#[derive(Debug)]
pub(crate) struct ScanChild {
    block: bool,
    pub received: Option<PlanStageReqs>,
}

impl ScanChild {
    pub(crate) const fn rows() -> Self {
        Self {
            block: false,
            received: None,
        }
    }

    pub(crate) const fn blocks() -> Self {
        Self {
            block: true,
            received: None,
        }
    }
}

impl ChildStageBuilder for ScanChild {
    fn build_child(
        &mut self,
        state: &mut StageBuilderState<'_>,
        reqs: &PlanStageReqs,
    ) -> Result<(PlanStage, PlanStageSlots), CompileError> {
        self.received = Some(reqs.clone());

        let batched = self.block && reqs.can_process_block_values() && !reqs.has_result();
        let mut outputs = PlanStageSlots::new();

        let result_slot = if reqs.has_result() {
            let slot = state.slot_id();
            outputs.set_result_obj(TypedSlot::typed(slot, TypeSignature::OBJECT));
            Some(slot)
        } else {
            None
        };

        let mut fields = Vec::with_capacity(reqs.fields().len());
        for name in reqs.fields() {
            let slot = state.slot_id();
            let typed = if batched {
                TypedSlot::typed(slot, TypeSignature::BLOCK)
            } else {
                TypedSlot::new(slot)
            };
            outputs.set(SlotName::field(name.as_str()), typed);
            fields.push(ScanField {
                name: name.clone(),
                slot,
                block: batched,
            });
        }

        let block_bitmap = if batched {
            let slot = state.slot_id();
            outputs.set(
                SlotName::BlockSelectivityBitmap,
                TypedSlot::typed(slot, TypeSignature::BLOCK),
            );
            Some(slot)
        } else {
            None
        };

        let stage = PlanStage::Scan(ScanStage {
            node: SCAN_NODE,
            result_slot,
            fields,
            block_bitmap,
        });

        Ok((stage, outputs))
    }
}

pub(crate) fn node(key: Expression, accumulators: Vec<AccumulationStatement>) -> GroupNode {
    GroupNode::new(GROUP_NODE, key, accumulators)
}

pub(crate) fn block_config() -> CompileConfig {
    CompileConfig::new().with_block_hash_agg(true)
}

/// Compile `node` over `child` with no parent requirements beyond `reqs`.
pub(crate) fn compile(
    config: &CompileConfig,
    node: &GroupNode,
    reqs: &PlanStageReqs,
    child: &mut ScanChild,
) -> PlanFragment {
    compile_group(config, node, reqs, child).expect("group should compile")
}

pub(crate) fn doc<const N: usize>(fields: [(&str, Value); N]) -> Value {
    Value::object(fields)
}
