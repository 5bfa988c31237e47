//! Module: state
//! Responsibility: per-compilation mutable state threaded through every
//! lowering step: slot allocation, runtime environment slots and the
//! scoped `needs_merge` flag.
//! Does not own: plan stages or output-slot maps.
//! Boundary: one `StageBuilderState` per compilation; never shared across
//! threads.

use crate::{
    config::CompileConfig,
    slots::{SlotId, SlotIdGenerator},
    sort::SortPattern,
    stage::PlanNodeId,
    value::Value,
};
use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
};

///
/// EnvEntry
///
/// A slot the runtime binds before execution starts.
///

#[derive(Clone, Debug, PartialEq)]
pub struct EnvEntry {
    pub label: String,
    pub value: Option<Value>,
}

///
/// RuntimeEnvironment
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuntimeEnvironment {
    entries: BTreeMap<SlotId, EnvEntry>,
}

impl RuntimeEnvironment {
    fn bind(&mut self, slot: SlotId, label: impl Into<String>, value: Option<Value>) {
        self.entries.insert(
            slot,
            EnvEntry {
                label: label.into(),
                value,
            },
        );
    }

    #[must_use]
    pub fn get(&self, slot: SlotId) -> Option<&EnvEntry> {
        self.entries.get(&slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &EnvEntry)> {
        self.entries.iter().map(|(slot, entry)| (*slot, entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

///
/// StageBuilderState
///

#[derive(Debug)]
pub struct StageBuilderState<'c> {
    config: &'c CompileConfig,
    slot_ids: SlotIdGenerator,
    needs_merge: bool,
    environment: RuntimeEnvironment,
    sort_spec_slots: BTreeMap<(PlanNodeId, usize), SlotId>,
    variables: BTreeMap<String, SlotId>,
    collator_slot: Option<SlotId>,
    nothing_slot: Option<SlotId>,
    empty_obj_slot: Option<SlotId>,
}

impl<'c> StageBuilderState<'c> {
    #[must_use]
    pub const fn new(config: &'c CompileConfig) -> Self {
        Self {
            config,
            slot_ids: SlotIdGenerator::new(),
            needs_merge: config.needs_merge,
            environment: RuntimeEnvironment {
                entries: BTreeMap::new(),
            },
            sort_spec_slots: BTreeMap::new(),
            variables: BTreeMap::new(),
            collator_slot: None,
            nothing_slot: None,
            empty_obj_slot: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &'c CompileConfig {
        self.config
    }

    pub const fn slot_id(&mut self) -> SlotId {
        self.slot_ids.generate()
    }

    #[must_use]
    pub const fn slots_allocated(&self) -> u32 {
        self.slot_ids.allocated()
    }

    #[must_use]
    pub const fn needs_merge(&self) -> bool {
        self.needs_merge
    }

    /// Override `needs_merge` until the returned guard is dropped.
    pub fn override_needs_merge(&mut self, needs_merge: bool) -> NeedsMergeGuard<'_, 'c> {
        let previous = std::mem::replace(&mut self.needs_merge, needs_merge);

        NeedsMergeGuard {
            state: self,
            previous,
        }
    }

    /// Environment slot holding the sort specification of one accumulator.
    pub fn sort_spec_slot(
        &mut self,
        node: PlanNodeId,
        accumulator: usize,
        pattern: &SortPattern,
    ) -> SlotId {
        if let Some(slot) = self.sort_spec_slots.get(&(node, accumulator)) {
            return *slot;
        }

        let slot = self.slot_ids.generate();
        self.environment.bind(
            slot,
            format!("sortSpec[{node}.{accumulator}]"),
            Some(pattern.to_spec_value()),
        );
        self.sort_spec_slots.insert((node, accumulator), slot);

        slot
    }

    /// Collator slot, present only when the configuration names a collation.
    pub fn collator_slot(&mut self) -> Option<SlotId> {
        if self.collator_slot.is_none()
            && let Some(locale) = &self.config.collation
        {
            let slot = self.slot_ids.generate();
            self.environment
                .bind(slot, "collator", Some(Value::text(locale.clone())));
            self.collator_slot = Some(slot);
        }

        self.collator_slot
    }

    /// Shared slot that always holds the absent value.
    pub fn nothing_slot(&mut self) -> SlotId {
        if let Some(slot) = self.nothing_slot {
            return slot;
        }

        let slot = self.slot_ids.generate();
        self.environment.bind(slot, "nothing", None);
        self.nothing_slot = Some(slot);

        slot
    }

    /// Shared slot that always holds an empty object.
    pub fn empty_obj_slot(&mut self) -> SlotId {
        if let Some(slot) = self.empty_obj_slot {
            return slot;
        }

        let slot = self.slot_ids.generate();
        self.environment
            .bind(slot, "emptyObj", Some(Value::empty_object()));
        self.empty_obj_slot = Some(slot);

        slot
    }

    /// Bind a user variable (`$$name`) to a constant for this compilation.
    pub fn register_variable(&mut self, name: impl Into<String>, value: Value) -> SlotId {
        let name = name.into();
        let slot = self.slot_ids.generate();
        self.environment
            .bind(slot, format!("$${name}"), Some(value));
        self.variables.insert(name, slot);

        slot
    }

    #[must_use]
    pub fn variable_slot(&self, name: &str) -> Option<SlotId> {
        self.variables.get(name).copied()
    }

    #[must_use]
    pub const fn environment(&self) -> &RuntimeEnvironment {
        &self.environment
    }

    #[must_use]
    pub fn into_environment(self) -> RuntimeEnvironment {
        self.environment
    }
}

///
/// NeedsMergeGuard
///
/// Restores the previous `needs_merge` value when dropped, on every exit
/// path of the scope that installed the override.
///

pub struct NeedsMergeGuard<'g, 'c> {
    state: &'g mut StageBuilderState<'c>,
    previous: bool,
}

impl<'c> Deref for NeedsMergeGuard<'_, 'c> {
    type Target = StageBuilderState<'c>;

    fn deref(&self) -> &Self::Target {
        self.state
    }
}

impl DerefMut for NeedsMergeGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.state
    }
}

impl Drop for NeedsMergeGuard<'_, '_> {
    fn drop(&mut self) {
        self.state.needs_merge = self.previous;
    }
}
