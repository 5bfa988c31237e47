use crate::{
    error::InternalError,
    expr::generate_expression,
    group::GroupNode,
    ir::{Expr, build_vectorized_expr, optimize},
    obs::sink::{self, CompileEvent, FallbackReason},
    slots::{PlanStageSlots, SlotName, VariableTypes},
    stage::{PlanStage, build_block_to_row},
    state::StageBuilderState,
};

///
/// GroupKey
///
/// Lowered key parts. `vectorized` is set when the parts are block
/// expressions over the child's batched output.
///

#[derive(Clone, Debug)]
pub(super) struct GroupKey {
    pub exprs: Vec<Expr>,
    pub vectorized: bool,
}

// Absent single keys group under null; multi-part object keys keep absent
// parts absent so `newObj` can decide.
fn generate_key_exprs(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    outputs: &PlanStageSlots,
) -> Result<Vec<Expr>, InternalError> {
    let root = outputs.result_obj_if_exists();

    let Some(parts) = node.key_object() else {
        let expr = generate_expression(state, &node.group_by, root, outputs)?;
        return Ok(vec![Expr::fill_empty_null(expr)]);
    };

    let mut exprs = Vec::with_capacity(parts.len());
    for (_, part) in parts {
        exprs.push(generate_expression(state, part, root, outputs)?);
    }
    if exprs.len() == 1 {
        let only = exprs.remove(0);
        exprs.push(Expr::fill_empty_null(only));
    }

    Ok(exprs)
}

// Every part must vectorize; scalar parts are broadcast so each key slot
// carries a block.
fn vectorize_key_exprs(
    exprs: &[Expr],
    outputs: &PlanStageSlots,
) -> Result<Option<Vec<Expr>>, InternalError> {
    let types = VariableTypes::from_outputs(outputs);
    let bitmap = outputs.require(&SlotName::BlockSelectivityBitmap)?.id();

    let mut vectorized = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let Some(expr) = build_vectorized_expr(expr.clone(), &types, bitmap) else {
            return Ok(None);
        };
        vectorized.push(expr);
    }

    Ok(Some(vectorized))
}

/// Lower the group key.
///
/// On batched input the key is vectorized when every part allows it.
/// Otherwise the pipeline is closed and the key is lowered again over row
/// slots. Row-mode keys are constant-folded.
pub(super) fn compile_group_key(
    state: &mut StageBuilderState<'_>,
    node: &GroupNode,
    stage: PlanStage,
    outputs: &mut PlanStageSlots,
) -> Result<(PlanStage, GroupKey), InternalError> {
    let mut stage = stage;
    let mut exprs = generate_key_exprs(state, node, outputs)?;

    if outputs.has_block_output() {
        if let Some(vectorized) = vectorize_key_exprs(&exprs, outputs)? {
            return Ok((
                stage,
                GroupKey {
                    exprs: vectorized,
                    vectorized: true,
                },
            ));
        }

        tracing::debug!(node = %node.node_id, "group key has no block form");
        sink::record(CompileEvent::BlockFallback {
            node: node.node_id,
            reason: FallbackReason::KeyNotVectorized,
        });

        let (row_stage, _) = build_block_to_row(state, node.node_id, stage, outputs, &[])?;
        stage = row_stage;
        exprs = generate_key_exprs(state, node, outputs)?;
    }

    let exprs = exprs.into_iter().map(optimize).collect();

    Ok((
        stage,
        GroupKey {
            exprs,
            vectorized: false,
        },
    ))
}
