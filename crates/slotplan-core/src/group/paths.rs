use crate::{
    error::InternalError,
    expr::{ExprFieldPath, Expression, generate_expression, walk_field_paths},
    group::GroupNode,
    slots::{PlanStageSlots, SlotName, VariableTypes},
    stage::{PlanStage, build_block_to_row, make_project},
    state::StageBuilderState,
};
use std::collections::BTreeMap;

// Distinct nested field paths read by the key and the arguments, keyed by
// their dotted form without the `CURRENT.` prefix.
fn collect_field_paths(node: &GroupNode) -> BTreeMap<String, ExprFieldPath> {
    let mut paths = BTreeMap::new();
    let exprs = std::iter::once(&node.group_by).chain(node.accumulators.iter().map(|acc| &acc.argument));

    for expr in exprs {
        walk_field_paths(expr, &mut |path| {
            // whole-record, variable and top-level references already have slots
            if path.is_variable_reference() || path.field_path().len() <= 2 {
                return;
            }
            paths
                .entry(path.path_without_current_prefix())
                .or_insert_with(|| path.clone());
        });
    }

    paths
}

// Only record paths can live in block slots; absent or untyped fields are scalar.
fn reads_block(outputs: &PlanStageSlots, path: &ExprFieldPath) -> bool {
    path.top_level_field()
        .and_then(|top| outputs.field(top))
        .is_some_and(|slot| slot.is_block())
}

fn project_paths(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    stage: PlanStage,
    outputs: &mut PlanStageSlots,
    paths: Vec<(String, ExprFieldPath)>,
) -> Result<PlanStage, InternalError> {
    if paths.is_empty() {
        return Ok(stage);
    }

    let root = outputs.result_obj_if_exists();
    let mut projects = Vec::with_capacity(paths.len());
    for (_, path) in &paths {
        let expr = Expression::FieldPath(path.clone());
        projects.push((generate_expression(state, &expr, root, outputs)?, None));
    }

    let types = VariableTypes::from_outputs(outputs);
    let (stage, slots) = make_project(state, node.node_id, &types, stage, projects);
    for ((name, _), slot) in paths.into_iter().zip(slots) {
        outputs.set(SlotName::PathExpr(name), slot);
    }

    Ok(stage)
}

/// Project each distinct nested field path once and publish it as a
/// `PathExpr` slot so later lowering reuses it.
///
/// On batched input the scalar-resident paths are projected first; the
/// pipeline is closed only if some path reads a block.
pub(super) fn materialize_field_paths(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    stage: PlanStage,
    outputs: &mut PlanStageSlots,
) -> Result<PlanStage, InternalError> {
    let paths: Vec<(String, ExprFieldPath)> = collect_field_paths(node)
        .into_iter()
        .filter(|(name, _)| !outputs.has(&SlotName::path_expr(name.as_str())))
        .collect();

    if paths.is_empty() {
        return Ok(stage);
    }

    if !outputs.has_block_output() {
        return project_paths(state, node, stage, outputs, paths);
    }

    let (on_blocks, on_scalars): (Vec<_>, Vec<_>) = paths
        .into_iter()
        .partition(|(_, path)| reads_block(outputs, path));

    let stage = project_paths(state, node, stage, outputs, on_scalars)?;
    if on_blocks.is_empty() {
        return Ok(stage);
    }

    tracing::debug!(
        node = %node.node_id,
        paths = on_blocks.len(),
        "closing batched pipeline for nested field paths"
    );
    let (stage, _) = build_block_to_row(state, node.node_id, stage, outputs, &[])?;

    project_paths(state, node, stage, outputs, on_blocks)
}
