use crate::{
    group::GroupNode,
    reqs::PlanStageReqs,
    sort::make_sort_keys_plan,
};

/// Requirements a group places on its child.
///
/// The child is asked for every top-level field the node reads. The whole
/// record is requested only when the node reads it directly or a rank
/// accumulator's sort keys need it; batched output is allowed exactly when
/// no record is requested.
#[must_use]
pub fn compute_child_reqs_for_group(node: &GroupNode, reqs: &PlanStageReqs) -> PlanStageReqs {
    let mut child = reqs
        .copy_for_child()
        .with_result_obj()
        .with_fields(node.required_fields.iter().cloned());

    if !node.need_whole_document {
        let mut sort_keys_need_root = false;
        for pattern in node
            .accumulators
            .iter()
            .filter_map(|acc| acc.sort_pattern.as_ref())
        {
            let plan = make_sort_keys_plan(pattern);
            child.add_fields(plan.fields_for_sort_keys);
            sort_keys_need_root |= plan.needs_result_obj;
        }

        if !sort_keys_need_root {
            child.clear_result();
        }
    }

    let block_allowed = !child.has_result();
    child.set_can_process_block_values(block_allowed);

    child
}
