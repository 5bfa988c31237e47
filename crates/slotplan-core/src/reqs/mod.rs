//! Module: reqs
//! Responsibility: describe what a parent stage needs from its child.
//! Does not own: how a child satisfies the requirements.
//! Boundary: requirement sets flow strictly downward, one per stage boundary.

mod effects;

use std::collections::BTreeSet;

pub use effects::{FieldEffect, FieldEffects, compose_effects_for_result_info};

///
/// ResultReq
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResultReq {
    /// Whole record, materialized as one object.
    Obj,

    /// Lazy descriptor: a base record plus tracked-field effects.
    Info {
        tracked: BTreeSet<String>,
        effects: FieldEffects,
    },
}

///
/// PlanStageReqs
///
/// Requirements a parent places on its child: named fields, an optional
/// result record, a record id, sort keys, and whether batched output is
/// acceptable.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PlanStageReqs {
    fields: BTreeSet<String>,
    result: Option<ResultReq>,
    record_id: bool,
    sort_keys: BTreeSet<String>,
    can_process_block_values: bool,
}

impl PlanStageReqs {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fields: BTreeSet::new(),
            result: None,
            record_id: false,
            sort_keys: BTreeSet::new(),
            can_process_block_values: false,
        }
    }

    /// Start the requirement set for a child stage.
    ///
    /// Fields, result, record id and sort keys belong to one boundary and are
    /// never inherited; only the batching permission carries over.
    #[must_use]
    pub const fn copy_for_child(&self) -> Self {
        let mut child = Self::new();
        child.can_process_block_values = self.can_process_block_values;

        child
    }

    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_fields(fields);
        self
    }

    #[must_use]
    pub fn with_result_obj(mut self) -> Self {
        self.result = Some(ResultReq::Obj);
        self
    }

    #[must_use]
    pub fn with_result_info(mut self, tracked: BTreeSet<String>, effects: FieldEffects) -> Self {
        self.result = Some(ResultReq::Info { tracked, effects });
        self
    }

    #[must_use]
    pub const fn with_record_id(mut self) -> Self {
        self.record_id = true;
        self
    }

    #[must_use]
    pub fn with_sort_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub const fn with_block_values(mut self, allowed: bool) -> Self {
        self.can_process_block_values = allowed;
        self
    }

    pub fn add_fields<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
    }

    pub fn clear_result(&mut self) {
        self.result = None;
    }

    pub const fn set_can_process_block_values(&mut self, allowed: bool) {
        self.can_process_block_values = allowed;
    }

    #[must_use]
    pub const fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    #[must_use]
    pub const fn has_result(&self) -> bool {
        self.result.is_some()
    }

    #[must_use]
    pub const fn has_result_obj(&self) -> bool {
        matches!(self.result, Some(ResultReq::Obj))
    }

    #[must_use]
    pub const fn has_result_info(&self) -> bool {
        matches!(self.result, Some(ResultReq::Info { .. }))
    }

    #[must_use]
    pub const fn result_info(&self) -> Option<(&BTreeSet<String>, &FieldEffects)> {
        match &self.result {
            Some(ResultReq::Info { tracked, effects }) => Some((tracked, effects)),
            _ => None,
        }
    }

    #[must_use]
    pub const fn has_record_id(&self) -> bool {
        self.record_id
    }

    #[must_use]
    pub fn has_sort_keys(&self) -> bool {
        !self.sort_keys.is_empty()
    }

    #[must_use]
    pub const fn can_process_block_values(&self) -> bool {
        self.can_process_block_values
    }
}

/// Top-level field name of a dotted path.
#[must_use]
pub fn top_level_field(path: &str) -> &str {
    path.split_once('.').map_or(path, |(top, _)| top)
}
