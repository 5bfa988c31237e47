//! Module: ir
//! Responsibility: the physical expression IR that plan stages evaluate,
//! plus the compile-time passes over it (constant folding, vectorization).
//! Does not own: runtime evaluation of aggregates or stages.
//! Boundary: every expression stored in a `PlanStage` is an `Expr`.

mod builtin;
mod eval;
mod optimize;
mod vectorize;


use crate::{slots::SlotId, value::Value};
use std::fmt;

pub use builtin::{AggFunc, Builtin};
pub use eval::{EvalError, eval_builtin};

#[cfg(test)]
pub(crate) use eval::{ACCUMULATOR_N_ITEMS, ACCUMULATOR_N_LIMIT, accumulator_n_items};
pub use optimize::optimize;
pub use vectorize::{build_vectorized_expr, vectorize};

/// Error code raised by runtime `fail` nodes on bad input values.
pub const BAD_VALUE: u32 = 2;

///
/// Expr
///

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Constant(Value),
    /// The absent value.
    Nothing,
    Slot(SlotId),
    Function {
        func: Builtin,
        args: Vec<Self>,
    },
    If {
        cond: Box<Self>,
        then: Box<Self>,
        otherwise: Box<Self>,
    },
    Fail {
        code: u32,
        message: String,
    },
    /// Aggregate update; only valid at the root of an aggregate expression.
    Aggregate {
        func: AggFunc,
        args: Vec<Self>,
    },
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    #[must_use]
    pub const fn null() -> Self {
        Self::Constant(Value::Null)
    }

    #[must_use]
    pub const fn slot(id: SlotId) -> Self {
        Self::Slot(id)
    }

    #[must_use]
    pub const fn func(func: Builtin, args: Vec<Self>) -> Self {
        Self::Function { func, args }
    }

    #[must_use]
    pub const fn agg(func: AggFunc, args: Vec<Self>) -> Self {
        Self::Aggregate { func, args }
    }

    #[must_use]
    pub fn if_then_else(cond: Self, then: Self, otherwise: Self) -> Self {
        Self::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn fail(code: u32, message: impl Into<String>) -> Self {
        Self::Fail {
            code,
            message: message.into(),
        }
    }

    /// `expr ?: default`
    #[must_use]
    pub fn fill_empty(expr: Self, default: Self) -> Self {
        Self::func(Builtin::FillEmpty, vec![expr, default])
    }

    /// `expr ?: null`
    #[must_use]
    pub fn fill_empty_null(expr: Self) -> Self {
        Self::fill_empty(expr, Self::null())
    }

    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    #[must_use]
    pub const fn constant_value(&self) -> Option<&Value> {
        match self {
            Self::Constant(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_slot(&self) -> Option<SlotId> {
        match self {
            Self::Slot(id) => Some(*id),
            _ => None,
        }
    }

    /// Visit every sub-expression in pre-order.
    pub fn visit(&self, f: &mut impl FnMut(&Self)) {
        f(self);
        match self {
            Self::Function { args, .. } | Self::Aggregate { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
            Self::If {
                cond,
                then,
                otherwise,
            } => {
                cond.visit(f);
                then.visit(f);
                otherwise.visit(f);
            }
            Self::Constant(_) | Self::Nothing | Self::Slot(_) | Self::Fail { .. } => {}
        }
    }

    /// True if any sub-expression satisfies `pred`.
    #[must_use]
    pub fn contains(&self, pred: impl Fn(&Self) -> bool) -> bool {
        let mut found = false;
        self.visit(&mut |expr| found |= pred(expr));

        found
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "{value}"),
            Self::Nothing => write!(f, "Nothing"),
            Self::Slot(id) => write!(f, "{id}"),
            Self::Function {
                func: Builtin::FillEmpty,
                args,
            } if args.len() == 2 => write!(f, "({} ?: {})", args[0], args[1]),
            Self::Function { func, args } => {
                write!(f, "{func}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Self::If {
                cond,
                then,
                otherwise,
            } => write!(f, "if {cond} then {then} else {otherwise}"),
            Self::Fail { code, message } => write!(f, "fail({code}, \"{message}\")"),
            Self::Aggregate { func, args } => {
                write!(f, "{func}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (index, arg) in args.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }

    Ok(())
}
