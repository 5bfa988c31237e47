use crate::{
    ir::{Builtin, Expr},
    slots::{SlotId, VariableTypes},
};

/// Rewrite a scalar expression to operate over batched slots.
///
/// Returns the rewritten expression and whether it yields a block. Returns
/// `None` when some operation touching a block operand has no block form;
/// the caller must then fall back to row-at-a-time evaluation.
#[must_use]
pub fn vectorize(expr: Expr, types: &VariableTypes) -> Option<(Expr, bool)> {
    match expr {
        Expr::Slot(id) => Some((Expr::Slot(id), types.is_block(id))),
        Expr::Function { func, args } => {
            let mut any_block = false;
            let mut rewritten = Vec::with_capacity(args.len());
            for arg in args {
                let (arg, is_block) = vectorize(arg, types)?;
                any_block |= is_block;
                rewritten.push(arg);
            }

            if !any_block {
                return Some((Expr::func(func, rewritten), false));
            }

            func.block_equivalent()
                .map(|block| (Expr::func(block, rewritten), true))
        }
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            let (cond, cond_block) = vectorize(*cond, types)?;
            let (then, then_block) = vectorize(*then, types)?;
            let (otherwise, otherwise_block) = vectorize(*otherwise, types)?;
            if cond_block || then_block || otherwise_block {
                return None;
            }

            Some((Expr::if_then_else(cond, then, otherwise), false))
        }
        Expr::Aggregate { .. } => None,
        other @ (Expr::Constant(_) | Expr::Nothing | Expr::Fail { .. }) => Some((other, false)),
    }
}

/// Vectorize an expression into one that always yields a block.
///
/// Scalar results are broadcast over `bitmap`, the selectivity bitmap of the
/// batch being processed.
#[must_use]
pub fn build_vectorized_expr(expr: Expr, types: &VariableTypes, bitmap: SlotId) -> Option<Expr> {
    let (expr, is_block) = vectorize(expr, types)?;
    if is_block {
        return Some(expr);
    }

    Some(Expr::func(
        Builtin::BlockBroadcast,
        vec![expr, Expr::slot(bitmap)],
    ))
}
