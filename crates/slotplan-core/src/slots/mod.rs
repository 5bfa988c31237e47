//! Module: slots
//! Responsibility: slot identity, slot typing and the named output-slot map a
//! stage publishes to its parent.
//! Does not own: what values a slot holds at runtime.
//! Boundary: every stage boundary in a plan fragment is described by a
//! `PlanStageSlots` value.

mod types;
#[cfg(test)]
mod tests;

use crate::{error::InternalError, reqs::FieldEffects};
use derive_more::Display;
use std::collections::BTreeMap;

pub use types::TypeSignature;

///
/// SlotId
///
/// Opaque identifier of a named runtime variable. Ids are unique for the
/// lifetime of one compilation and never recycled.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("s{_0}")]
pub struct SlotId(u32);

impl SlotId {
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

///
/// SlotIdGenerator
///

#[derive(Debug)]
pub struct SlotIdGenerator {
    next: u32,
}

impl SlotIdGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    pub const fn generate(&mut self) -> SlotId {
        let id = SlotId(self.next);
        self.next += 1;

        id
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub const fn allocated(&self) -> u32 {
        self.next - 1
    }
}

impl Default for SlotIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

///
/// TypedSlot
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TypedSlot {
    id: SlotId,
    type_sig: Option<TypeSignature>,
}

impl TypedSlot {
    #[must_use]
    pub const fn new(id: SlotId) -> Self {
        Self { id, type_sig: None }
    }

    #[must_use]
    pub const fn typed(id: SlotId, type_sig: TypeSignature) -> Self {
        Self {
            id,
            type_sig: Some(type_sig),
        }
    }

    #[must_use]
    pub const fn id(self) -> SlotId {
        self.id
    }

    #[must_use]
    pub const fn type_signature(self) -> Option<TypeSignature> {
        self.type_sig
    }

    #[must_use]
    pub const fn is_block(self) -> bool {
        match self.type_sig {
            Some(sig) => sig.is_block(),
            None => false,
        }
    }
}

///
/// SlotName
///
/// Names under which a stage publishes its output slots.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum SlotName {
    ResultObj,
    ResultInfoBase,
    RecordId,
    BlockSelectivityBitmap,
    Field(String),
    PathExpr(String),
}

impl SlotName {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn path_expr(path: impl Into<String>) -> Self {
        Self::PathExpr(path.into())
    }
}

///
/// PlanStageSlots
///
/// Mapping from slot names to typed slots, plus the pending effects of a lazy
/// result descriptor when the stage chose not to materialize its record.
///

#[derive(Clone, Debug, Default)]
pub struct PlanStageSlots {
    slots: BTreeMap<SlotName, TypedSlot>,
    result_info_effects: Option<FieldEffects>,
}

impl PlanStageSlots {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            result_info_effects: None,
        }
    }

    #[must_use]
    pub fn get(&self, name: &SlotName) -> Option<TypedSlot> {
        self.slots.get(name).copied()
    }

    /// Fetch a slot that the caller's invariants guarantee is present.
    pub fn require(&self, name: &SlotName) -> Result<TypedSlot, InternalError> {
        self.get(name).ok_or_else(|| {
            InternalError::stage_invariant(format!("expected output slot {name:?} to be present"))
        })
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<TypedSlot> {
        self.get(&SlotName::Field(name.to_string()))
    }

    #[must_use]
    pub fn has(&self, name: &SlotName) -> bool {
        self.slots.contains_key(name)
    }

    pub fn set(&mut self, name: SlotName, slot: TypedSlot) {
        self.slots.insert(name, slot);
    }

    pub fn clear(&mut self, name: &SlotName) {
        self.slots.remove(name);
    }

    /// Batched output is signalled by the presence of a selectivity bitmap.
    #[must_use]
    pub fn has_block_output(&self) -> bool {
        self.has(&SlotName::BlockSelectivityBitmap)
    }

    #[must_use]
    pub fn result_obj_if_exists(&self) -> Option<SlotId> {
        self.get(&SlotName::ResultObj).map(TypedSlot::id)
    }

    pub fn set_result_obj(&mut self, slot: TypedSlot) {
        self.clear(&SlotName::ResultInfoBase);
        self.result_info_effects = None;
        self.set(SlotName::ResultObj, slot);
    }

    pub fn set_result_info_base(&mut self, slot: TypedSlot) {
        self.clear(&SlotName::ResultObj);
        self.set(SlotName::ResultInfoBase, slot);
    }

    /// Record effects that a consumer must apply to the result-info base.
    pub fn add_effects_to_result_info(&mut self, effects: FieldEffects) {
        self.result_info_effects = Some(effects);
    }

    #[must_use]
    pub const fn result_info_effects(&self) -> Option<&FieldEffects> {
        self.result_info_effects.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotName, TypedSlot)> {
        self.slots.iter().map(|(name, slot)| (name, *slot))
    }

    /// Type of a slot when it is published under any name.
    #[must_use]
    pub fn type_of(&self, id: SlotId) -> Option<TypeSignature> {
        self.slots
            .values()
            .find(|slot| slot.id() == id)
            .and_then(|slot| slot.type_signature())
    }
}

///
/// VariableTypes
///
/// Slot-type environment used by projection typing and the vectorizer.
/// Built from a stage's published outputs plus any individually tracked
/// slots that are not published by name.
///

#[derive(Clone, Debug, Default)]
pub struct VariableTypes {
    types: BTreeMap<SlotId, TypeSignature>,
}

impl VariableTypes {
    #[must_use]
    pub fn from_outputs(outputs: &PlanStageSlots) -> Self {
        Self::with_slots(outputs, &[])
    }

    #[must_use]
    pub fn with_slots(outputs: &PlanStageSlots, individual: &[TypedSlot]) -> Self {
        let types = outputs
            .iter()
            .map(|(_, slot)| slot)
            .chain(individual.iter().copied())
            .filter_map(|slot| slot.type_signature().map(|sig| (slot.id(), sig)))
            .collect();

        Self { types }
    }

    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<TypeSignature> {
        self.types.get(&id).copied()
    }

    #[must_use]
    pub fn is_block(&self, id: SlotId) -> bool {
        self.get(id).is_some_and(TypeSignature::is_block)
    }
}
