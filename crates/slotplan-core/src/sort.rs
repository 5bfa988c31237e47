//! Module: sort
//! Responsibility: sort patterns used by rank accumulators, the plan for
//! producing their sort keys, and the key expressions themselves.
//! Does not own: runtime ordering (the sort specification is bound as an
//! environment value and interpreted by the runtime).
//! Boundary: consumed by requirement planning and accumulator lowering.

use crate::{
    error::InternalError,
    expr::{ExprFieldPath, Expression, generate_expression},
    ir::{Builtin, Expr},
    reqs::top_level_field,
    slots::PlanStageSlots,
    state::StageBuilderState,
    value::Value,
};
use std::collections::BTreeSet;

///
/// SortDirection
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    const fn spec_value(self) -> i64 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

///
/// MetaKey
///
/// Per-record metadata a sort part can order by.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetaKey {
    TextScore,
    SearchScore,
}

impl MetaKey {
    const fn name(self) -> &'static str {
        match self {
            Self::TextScore => "textScore",
            Self::SearchScore => "searchScore",
        }
    }
}

///
/// SortKeyPart
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SortKeyPart {
    Field(String),
    Meta(MetaKey),
}

///
/// SortPatternPart
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SortPatternPart {
    pub key: SortKeyPart,
    pub direction: SortDirection,
}

///
/// SortPattern
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SortPattern {
    parts: Vec<SortPatternPart>,
}

impl SortPattern {
    #[must_use]
    pub const fn new(parts: Vec<SortPatternPart>) -> Self {
        Self { parts }
    }

    /// Pattern over plain (possibly dotted) field paths.
    pub fn by_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, SortDirection)>,
    {
        Self::new(
            fields
                .into_iter()
                .map(|(path, direction)| SortPatternPart {
                    key: SortKeyPart::Field(path.to_string()),
                    direction,
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn parts(&self) -> &[SortPatternPart] {
        &self.parts
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Sort specification value bound into the runtime environment.
    #[must_use]
    pub fn to_spec_value(&self) -> Value {
        Value::object(self.parts.iter().map(|part| match &part.key {
            SortKeyPart::Field(path) => (path.clone(), Value::Int(part.direction.spec_value())),
            SortKeyPart::Meta(meta) => ("$meta".to_string(), Value::text(meta.name())),
        }))
    }
}

///
/// SortKeysPlanKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortKeysPlanKind {
    /// One key expression per part, read from field slots.
    TraverseFields,
    /// A single runtime call computing every key from the root record.
    CallGenCheapSortKey,
}

///
/// SortKeysPlan
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SortKeysPlan {
    pub kind: SortKeysPlanKind,
    pub fields_for_sort_keys: BTreeSet<String>,
    pub needs_result_obj: bool,
}

/// Decide how the keys of `pattern` will be produced and what they read.
#[must_use]
pub fn make_sort_keys_plan(pattern: &SortPattern) -> SortKeysPlan {
    let has_meta = pattern
        .parts()
        .iter()
        .any(|part| matches!(part.key, SortKeyPart::Meta(_)));

    if has_meta {
        return SortKeysPlan {
            kind: SortKeysPlanKind::CallGenCheapSortKey,
            fields_for_sort_keys: BTreeSet::new(),
            needs_result_obj: true,
        };
    }

    let fields_for_sort_keys = pattern
        .parts()
        .iter()
        .filter_map(|part| match &part.key {
            SortKeyPart::Field(path) => Some(top_level_field(path).to_string()),
            SortKeyPart::Meta(_) => None,
        })
        .collect();

    SortKeysPlan {
        kind: SortKeysPlanKind::TraverseFields,
        fields_for_sort_keys,
        needs_result_obj: false,
    }
}

///
/// SortKeys
///

#[derive(Clone, Debug, Default)]
pub struct SortKeys {
    pub key_exprs: Vec<Expr>,
    pub parallel_arrays_check: Option<Expr>,
    pub full_key_expr: Option<Expr>,
}

/// Build the key expressions described by `plan`.
///
/// Multi-part field patterns also produce a check that at most one key
/// is an array.
pub fn build_sort_keys(
    state: &mut StageBuilderState<'_>,
    plan: &SortKeysPlan,
    pattern: &SortPattern,
    outputs: &PlanStageSlots,
    sort_spec: Expr,
) -> Result<SortKeys, InternalError> {
    match plan.kind {
        SortKeysPlanKind::TraverseFields => {
            let root = outputs.result_obj_if_exists();
            let mut key_exprs = Vec::with_capacity(pattern.len());
            for part in pattern.parts() {
                let SortKeyPart::Field(path) = &part.key else {
                    return Err(InternalError::planner_invariant(
                        "field traversal sort keys cannot include metadata parts",
                    ));
                };
                let path = Expression::FieldPath(ExprFieldPath::current(path));
                let key = generate_expression(state, &path, root, outputs)?;
                key_exprs.push(Expr::fill_empty_null(key));
            }

            let parallel_arrays_check = (key_exprs.len() > 1)
                .then(|| Expr::func(Builtin::AtMostOneArray, key_exprs.clone()));

            Ok(SortKeys {
                key_exprs,
                parallel_arrays_check,
                full_key_expr: None,
            })
        }
        SortKeysPlanKind::CallGenCheapSortKey => {
            let root = outputs.result_obj_if_exists().ok_or_else(|| {
                InternalError::planner_invariant(
                    "metadata sort keys require the result object slot",
                )
            })?;

            Ok(SortKeys {
                key_exprs: Vec::new(),
                parallel_arrays_check: None,
                full_key_expr: Some(Expr::func(
                    Builtin::GenerateSortKey,
                    vec![Expr::slot(root), sort_spec],
                )),
            })
        }
    }
}
