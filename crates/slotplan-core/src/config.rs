//! Module: config
//! Responsibility: compile-time switches consulted by the group compiler.
//! Does not own: where the configuration is loaded from.
//! Boundary: borrowed read-only by `StageBuilderState` for one compilation.

use serde::{Deserialize, Serialize};

///
/// CompileConfig
///
/// Feature switches and per-query settings. Every field defaults to off so a
/// partial document deserializes to the conservative row-at-a-time setup.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileConfig {
    /// Enables every batched-execution feature.
    pub full_engine: bool,

    /// Enables batched hash aggregation on its own.
    pub block_hash_agg: bool,

    /// Collation locale for string comparisons; disables batched aggregation.
    pub collation: Option<String>,

    /// The caller will merge partial results produced by this plan.
    pub needs_merge: bool,
}

impl CompileConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            full_engine: false,
            block_hash_agg: false,
            collation: None,
            needs_merge: false,
        }
    }

    #[must_use]
    pub const fn with_block_hash_agg(mut self, enabled: bool) -> Self {
        self.block_hash_agg = enabled;
        self
    }

    #[must_use]
    pub const fn with_full_engine(mut self, enabled: bool) -> Self {
        self.full_engine = enabled;
        self
    }

    #[must_use]
    pub fn with_collation(mut self, locale: impl Into<String>) -> Self {
        self.collation = Some(locale.into());
        self
    }

    #[must_use]
    pub const fn with_needs_merge(mut self, needs_merge: bool) -> Self {
        self.needs_merge = needs_merge;
        self
    }

    /// Whether batched hash aggregation may be attempted at all.
    #[must_use]
    pub const fn block_hash_agg_allowed(&self) -> bool {
        self.full_engine || self.block_hash_agg
    }
}
