//! Module: expr
//! Responsibility: the logical expression front end the group stage consumes,
//! and its lowering into IR.
//! Does not own: parsing or validating user syntax.
//! Boundary: logical expressions never appear inside plan stages; they are
//! always lowered through `generate_expression` first.

mod lower;
mod path;
mod walk;


use crate::value::Value;
use std::fmt;

pub use lower::generate_expression;
pub use path::{CURRENT, ExprFieldPath, FieldPath, ROOT, Variable};
pub use walk::walk_field_paths;

///
/// ExprOp
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExprOp {
    Add,
    Subtract,
    Multiply,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Not,
    Cond,
    IfNull,
    Concat,
}

impl fmt::Display for ExprOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Add => "$add",
            Self::Subtract => "$subtract",
            Self::Multiply => "$multiply",
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::And => "$and",
            Self::Or => "$or",
            Self::Not => "$not",
            Self::Cond => "$cond",
            Self::IfNull => "$ifNull",
            Self::Concat => "$concat",
        };
        f.write_str(label)
    }
}

///
/// Expression
///
/// Logical expression tree as produced by the query front end.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Constant(Value),
    FieldPath(ExprFieldPath),
    Object(Vec<(String, Self)>),
    Array(Vec<Self>),
    Op { op: ExprOp, args: Vec<Self> },
}

impl Expression {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// `$a.b` for `field("a.b")`.
    #[must_use]
    pub fn field(dotted: &str) -> Self {
        Self::FieldPath(ExprFieldPath::current(dotted))
    }

    /// `$$ROOT`
    #[must_use]
    pub fn root() -> Self {
        Self::FieldPath(ExprFieldPath::root())
    }

    #[must_use]
    pub fn variable(name: &str, dotted: &str) -> Self {
        Self::FieldPath(ExprFieldPath::variable(name, dotted))
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Self)>,
        K: Into<String>,
    {
        Self::Object(
            fields
                .into_iter()
                .map(|(name, expr)| (name.into(), expr))
                .collect(),
        )
    }

    #[must_use]
    pub const fn array(items: Vec<Self>) -> Self {
        Self::Array(items)
    }

    #[must_use]
    pub const fn op(op: ExprOp, args: Vec<Self>) -> Self {
        Self::Op { op, args }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&[(String, Self)]> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// True for an absent expression or a literal constant.
    #[must_use]
    pub const fn is_null_or_constant(expr: Option<&Self>) -> bool {
        match expr {
            None => true,
            Some(expr) => expr.is_constant(),
        }
    }
}
