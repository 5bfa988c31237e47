use crate::{
    error::InternalError,
    expr::{ExprFieldPath, ExprOp, Expression, Variable},
    ir::{Builtin, Expr},
    slots::{PlanStageSlots, SlotId, SlotName},
    state::StageBuilderState,
};

/// Lower a logical expression to IR.
///
/// Field paths resolve in this order: a cached path-expression slot, a
/// top-level field slot plus traversal, then traversal from `root_slot`.
/// A path that resolves nowhere is a precondition violation.
pub fn generate_expression(
    state: &mut StageBuilderState<'_>,
    expr: &Expression,
    root_slot: Option<SlotId>,
    outputs: &PlanStageSlots,
) -> Result<Expr, InternalError> {
    match expr {
        Expression::Constant(value) => Ok(Expr::Constant(value.clone())),
        Expression::FieldPath(path) => lower_field_path(state, path, root_slot, outputs),
        Expression::Object(fields) => {
            let mut args = Vec::with_capacity(fields.len() * 2);
            for (name, value) in fields {
                args.push(Expr::constant(name.as_str()));
                args.push(generate_expression(state, value, root_slot, outputs)?);
            }
            Ok(Expr::func(Builtin::NewObj, args))
        }
        Expression::Array(items) => {
            let items = lower_all(state, items, root_slot, outputs)?;
            Ok(Expr::func(Builtin::NewArray, items))
        }
        Expression::Op { op, args } => {
            let args = lower_all(state, args, root_slot, outputs)?;
            lower_op(*op, args)
        }
    }
}

fn lower_all(
    state: &mut StageBuilderState<'_>,
    exprs: &[Expression],
    root_slot: Option<SlotId>,
    outputs: &PlanStageSlots,
) -> Result<Vec<Expr>, InternalError> {
    exprs
        .iter()
        .map(|expr| generate_expression(state, expr, root_slot, outputs))
        .collect()
}

fn lower_field_path(
    state: &StageBuilderState<'_>,
    path: &ExprFieldPath,
    root_slot: Option<SlotId>,
    outputs: &PlanStageSlots,
) -> Result<Expr, InternalError> {
    let components = path.field_path().components();

    if let Variable::User(name) = path.variable_ref() {
        let slot = state.variable_slot(name).ok_or_else(|| {
            InternalError::expression_unsupported(format!("use of undefined variable '$${name}'"))
        })?;
        return Ok(traverse(Expr::slot(slot), &components[1..]));
    }

    if components.len() == 1 {
        return root_slot.map(Expr::slot).ok_or_else(|| {
            InternalError::expression_invariant(
                "whole-record reference requires a result object slot",
            )
        });
    }

    if let Some(slot) = outputs.get(&SlotName::PathExpr(path.path_without_current_prefix())) {
        return Ok(Expr::slot(slot.id()));
    }

    let top = &components[1];
    if let Some(slot) = outputs.field(top) {
        return Ok(traverse(Expr::slot(slot.id()), &components[2..]));
    }

    root_slot
        .map(|root| traverse(Expr::slot(root), &components[1..]))
        .ok_or_else(|| {
            InternalError::expression_invariant(format!(
                "field '{top}' is not available from any slot"
            ))
        })
}

fn traverse(base: Expr, rest: &[String]) -> Expr {
    rest.iter().fold(base, |object, name| {
        Expr::func(Builtin::GetField, vec![object, Expr::constant(name.as_str())])
    })
}

fn lower_op(op: ExprOp, args: Vec<Expr>) -> Result<Expr, InternalError> {
    let expected = match op {
        ExprOp::Not => Some(1),
        ExprOp::Cond => Some(3),
        ExprOp::And | ExprOp::Or | ExprOp::Concat => None,
        _ => Some(2),
    };
    if let Some(expected) = expected
        && args.len() != expected
    {
        return Err(InternalError::expression_invariant(format!(
            "{op} expects {expected} arguments, found {}",
            args.len()
        )));
    }

    let func = match op {
        ExprOp::Add => Builtin::Add,
        ExprOp::Subtract => Builtin::Subtract,
        ExprOp::Multiply => Builtin::Multiply,
        ExprOp::Eq => Builtin::Eq,
        ExprOp::Ne => Builtin::Ne,
        ExprOp::Gt => Builtin::Gt,
        ExprOp::Gte => Builtin::Gte,
        ExprOp::Lt => Builtin::Lt,
        ExprOp::Lte => Builtin::Lte,
        ExprOp::IfNull => Builtin::IfNull,
        ExprOp::Not => Builtin::Not,
        ExprOp::And => Builtin::And,
        ExprOp::Or => Builtin::Or,
        ExprOp::Concat => Builtin::Concat,
        ExprOp::Cond => {
            let [cond, then, otherwise]: [Expr; 3] = args
                .try_into()
                .map_err(|_| InternalError::expression_invariant("$cond expects 3 arguments"))?;
            return Ok(Expr::if_then_else(cond, then, otherwise));
        }
    };

    Ok(Expr::func(func, args))
}
