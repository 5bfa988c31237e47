use std::collections::{BTreeMap, BTreeSet};

///
/// FieldEffect
///
/// What a stage does to one field of the record flowing through it.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldEffect {
    /// Field passes through unchanged.
    Keep,
    /// Field is removed.
    Drop,
    /// Field is replaced by a freshly computed value.
    Set,
    /// Field is rewritten from its previous value.
    Modify,
}

///
/// FieldEffects
///
/// Per-field effects plus the effect applied to every unnamed field.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldEffects {
    fields: BTreeMap<String, FieldEffect>,
    default_effect: FieldEffect,
}

impl FieldEffects {
    #[must_use]
    pub const fn new(default_effect: FieldEffect) -> Self {
        Self {
            fields: BTreeMap::new(),
            default_effect,
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, effect: FieldEffect) -> Self {
        self.fields.insert(name.into(), effect);
        self
    }

    #[must_use]
    pub fn effect(&self, name: &str) -> FieldEffect {
        self.fields
            .get(name)
            .copied()
            .unwrap_or(self.default_effect)
    }

    #[must_use]
    pub const fn default_effect(&self) -> FieldEffect {
        self.default_effect
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldEffect)> {
        self.fields
            .iter()
            .map(|(name, effect)| (name.as_str(), *effect))
    }

    /// Restrict the named effects to the fields the consumer tracks.
    pub fn narrow(&mut self, tracked: &BTreeSet<String>) {
        self.fields.retain(|name, _| tracked.contains(name));
    }

    /// Compose `upper` (applied second) over `lower` (applied first).
    ///
    /// Returns `None` when the upper stage modifies a field the lower stage
    /// has already dropped; such a pair cannot be described lazily.
    #[must_use]
    pub fn compose(upper: &Self, lower: &Self) -> Option<Self> {
        let default_effect = compose_effect(upper.default_effect, lower.default_effect)?;
        let names: BTreeSet<&String> = upper.fields.keys().chain(lower.fields.keys()).collect();

        let mut fields = BTreeMap::new();
        for name in names {
            let effect = compose_effect(upper.effect(name), lower.effect(name))?;
            if effect != default_effect {
                fields.insert(name.clone(), effect);
            }
        }

        Some(Self {
            fields,
            default_effect,
        })
    }
}

const fn compose_effect(upper: FieldEffect, lower: FieldEffect) -> Option<FieldEffect> {
    match (upper, lower) {
        (FieldEffect::Keep, lower) => Some(lower),
        (FieldEffect::Drop | FieldEffect::Set, _) => Some(upper),
        (FieldEffect::Modify, FieldEffect::Drop) => None,
        (FieldEffect::Modify, FieldEffect::Keep | FieldEffect::Modify) => Some(FieldEffect::Modify),
        (FieldEffect::Modify, FieldEffect::Set) => Some(FieldEffect::Set),
    }
}

/// Compose a stage's own effects with the effects a consumer already tracks.
///
/// `effects` are this stage's effects; `req_effects` are the consumer's.
#[must_use]
pub fn compose_effects_for_result_info(
    effects: &FieldEffects,
    req_effects: &FieldEffects,
) -> Option<FieldEffects> {
    FieldEffects::compose(req_effects, effects)
}
