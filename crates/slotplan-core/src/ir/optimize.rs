use crate::{
    ir::{Expr, eval_builtin},
    value::Value,
};

/// Fold constant sub-expressions.
///
/// A pure scalar builtin whose operands are all constant (or Nothing) is
/// replaced by its value; a conditional with a constant condition is replaced
/// by the chosen branch. Folds that would fail are left for runtime.
#[must_use]
pub fn optimize(expr: Expr) -> Expr {
    match expr {
        Expr::Function { func, args } => {
            let args: Vec<Expr> = args.into_iter().map(optimize).collect();
            if func.is_block() || !args.iter().all(is_foldable_operand) {
                return Expr::Function { func, args };
            }

            let values: Vec<Option<Value>> = args.iter().map(operand_value).collect();
            match eval_builtin(func, &values) {
                Ok(Some(value)) => Expr::Constant(value),
                Ok(None) => Expr::Nothing,
                Err(_) => Expr::Function { func, args },
            }
        }
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            let cond = optimize(*cond);
            match &cond {
                Expr::Constant(value) if value.is_truthy() => optimize(*then),
                Expr::Constant(_) | Expr::Nothing => optimize(*otherwise),
                _ => Expr::if_then_else(cond, optimize(*then), optimize(*otherwise)),
            }
        }
        Expr::Aggregate { func, args } => Expr::Aggregate {
            func,
            args: args.into_iter().map(optimize).collect(),
        },
        other @ (Expr::Constant(_) | Expr::Nothing | Expr::Slot(_) | Expr::Fail { .. }) => other,
    }
}

const fn is_foldable_operand(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant(_) | Expr::Nothing)
}

fn operand_value(expr: &Expr) -> Option<Value> {
    expr.constant_value().cloned()
}
