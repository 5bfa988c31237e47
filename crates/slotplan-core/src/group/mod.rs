//! Module: group
//! Responsibility: lower one logical group node into a hash-aggregation
//! stage tree plus its published output slots.
//! Does not own: building the child stage, accumulator semantics, or stage
//! execution.
//! Boundary: `build_group` is the only way a group node becomes stages.

mod accum;
mod aggs;
mod assemble;
mod build;
mod finalize;
mod gate;
mod init_root;
mod key;
mod paths;
mod reqs;

#[cfg(test)]
mod tests;

use crate::{
    accum::AccumulatorKind,
    config::CompileConfig,
    error::CompileError,
    expr::{Expression, walk_field_paths},
    reqs::{FieldEffect, FieldEffects, PlanStageReqs},
    slots::PlanStageSlots,
    sort::SortPattern,
    stage::{PlanFragment, PlanNodeId, PlanStage},
    state::StageBuilderState,
};
use std::collections::BTreeSet;

pub use build::build_group;
pub use reqs::compute_child_reqs_for_group;

/// Output field holding the group key.
pub const GROUP_KEY_FIELD: &str = "_id";

///
/// AggregationMode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregationMode {
    /// Row-at-a-time `HashAgg`.
    Scalar,
    /// Batched `BlockHashAgg`.
    Block,
}

///
/// AccumulationStatement
///
/// One named output of a group: an accumulator applied to an argument,
/// with an optional per-group initializer and, for rank accumulators, the
/// sort pattern that orders their inputs.
///

#[derive(Clone, Debug, PartialEq)]
pub struct AccumulationStatement {
    pub field_name: String,
    pub kind: AccumulatorKind,
    pub argument: Expression,
    pub initializer: Option<Expression>,
    pub sort_pattern: Option<SortPattern>,
}

impl AccumulationStatement {
    /// `top` and `bottom` keep one item, so they start with an initializer of 1.
    pub fn new(field_name: impl Into<String>, kind: AccumulatorKind, argument: Expression) -> Self {
        let initializer = matches!(kind, AccumulatorKind::Top | AccumulatorKind::Bottom)
            .then(|| Expression::constant(1));

        Self {
            field_name: field_name.into(),
            kind,
            argument,
            initializer,
            sort_pattern: None,
        }
    }

    #[must_use]
    pub fn with_initializer(mut self, initializer: Expression) -> Self {
        self.initializer = Some(initializer);
        self
    }

    #[must_use]
    pub fn with_sort_pattern(mut self, pattern: SortPattern) -> Self {
        self.sort_pattern = Some(pattern);
        self
    }

    /// Initializers that read the group key rather than a constant.
    #[must_use]
    pub const fn has_variable_initializer(&self) -> bool {
        !Expression::is_null_or_constant(self.initializer.as_ref())
    }
}

///
/// GroupNode
///
/// Logical group node handed to the compiler by the planner.
///

#[derive(Clone, Debug, PartialEq)]
pub struct GroupNode {
    pub node_id: PlanNodeId,
    pub group_by: Expression,
    pub accumulators: Vec<AccumulationStatement>,
    /// Top-level fields referenced by the key and the arguments.
    pub required_fields: BTreeSet<String>,
    /// Set when some expression reads the whole record.
    pub need_whole_document: bool,
    /// Set when a later stage merges this group's partial results.
    pub will_be_merged: bool,
    pub should_produce_bson: bool,
}

impl GroupNode {
    /// Build a node and derive its field dependencies from the expressions.
    #[must_use]
    pub fn new(
        node_id: PlanNodeId,
        group_by: Expression,
        accumulators: Vec<AccumulationStatement>,
    ) -> Self {
        let mut required_fields = BTreeSet::new();
        let mut need_whole_document = false;

        let exprs =
            std::iter::once(&group_by).chain(accumulators.iter().map(|acc| &acc.argument));
        for expr in exprs {
            walk_field_paths(expr, &mut |path| {
                if path.is_variable_reference() {
                    return;
                }
                match path.top_level_field() {
                    Some(top) => {
                        required_fields.insert(top.to_string());
                    }
                    None => need_whole_document = true,
                }
            });
        }

        Self {
            node_id,
            group_by,
            accumulators,
            required_fields,
            need_whole_document,
            will_be_merged: false,
            should_produce_bson: true,
        }
    }

    #[must_use]
    pub const fn with_will_be_merged(mut self, will_be_merged: bool) -> Self {
        self.will_be_merged = will_be_merged;
        self
    }

    #[must_use]
    pub const fn with_should_produce_bson(mut self, should_produce_bson: bool) -> Self {
        self.should_produce_bson = should_produce_bson;
        self
    }

    #[must_use]
    pub const fn with_need_whole_document(mut self, need_whole_document: bool) -> Self {
        self.need_whole_document = need_whole_document;
        self
    }

    /// The key object, when the key is written field by field.
    #[must_use]
    pub fn key_object(&self) -> Option<&[(String, Expression)]> {
        self.group_by.as_object()
    }

    #[must_use]
    pub fn has_variable_initializer(&self) -> bool {
        self.accumulators
            .iter()
            .any(AccumulationStatement::has_variable_initializer)
    }

    /// Effects on the flowing record: `_id` and each accumulator are set,
    /// every other field is dropped.
    #[must_use]
    pub fn effects(&self) -> FieldEffects {
        self.accumulators.iter().fold(
            FieldEffects::new(FieldEffect::Drop).with_field(GROUP_KEY_FIELD, FieldEffect::Set),
            |effects, acc| effects.with_field(acc.field_name.clone(), FieldEffect::Set),
        )
    }
}

///
/// ChildStageBuilder
///
/// Builds the stage feeding a group for the requirements the group computed.
///

pub trait ChildStageBuilder {
    fn build_child(
        &mut self,
        state: &mut StageBuilderState<'_>,
        reqs: &PlanStageReqs,
    ) -> Result<(PlanStage, PlanStageSlots), CompileError>;
}

/// Compile one group node into a self-contained fragment.
pub fn compile_group(
    config: &CompileConfig,
    node: &GroupNode,
    reqs: &PlanStageReqs,
    child: &mut impl ChildStageBuilder,
) -> Result<PlanFragment, CompileError> {
    let mut state = StageBuilderState::new(config);
    let (root, outputs) = build_group(&mut state, node, reqs, child)?;

    Ok(PlanFragment {
        root,
        outputs,
        environment: state.into_environment(),
    })
}
