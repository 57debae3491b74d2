//! Set name resolution and per-execution set contexts.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::eval::{SetUsage, TagKeys};
use crate::model::{Set, SetRegistry};
use crate::storage::{PrefetchCache, TagSource, prefetch};

static EMPTY_SET: LazyLock<Set> = LazyLock::new(Set::default);

/// Resolves set names against a query's registry. Unknown names resolve to
/// the empty set.
#[derive(Clone, Copy)]
pub struct SetResolver<'a> {
    registry: &'a SetRegistry,
}

impl<'a> SetResolver<'a> {
    pub fn new(registry: &'a SetRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, name: &str) -> &'a Set {
        match self.registry.get(name) {
            Some(set) => set,
            None => {
                tracing::debug!("Context: set '{}' is unknown, using empty set", name);
                &EMPTY_SET
            }
        }
    }
}

/// A resolved set together with its prefetched tags.
pub struct SetContext<'a> {
    pub set: &'a Set,
    pub tags: PrefetchCache,
}

impl<'a> SetContext<'a> {
    pub fn prefetch(
        usage: &SetUsage,
        set: &'a Set,
        source: &dyn TagSource,
        keys: &TagKeys,
    ) -> Result<Self> {
        Ok(Self {
            set,
            tags: prefetch(usage, set, source, keys)?,
        })
    }
}

/// The named set contexts an evaluator tree compiles against.
#[derive(Default)]
pub struct PrepareContext<'a> {
    contexts: HashMap<String, SetContext<'a>>,
}

impl<'a> PrepareContext<'a> {
    /// Resolves and prefetches every set in `usages`.
    pub fn build(
        usages: &[SetUsage],
        resolver: SetResolver<'a>,
        source: &dyn TagSource,
        keys: &TagKeys,
    ) -> Result<Self> {
        let mut contexts = HashMap::with_capacity(usages.len());
        for usage in usages {
            let set = resolver.resolve(&usage.set_name);
            let context = SetContext::prefetch(usage, set, source, keys)?;
            contexts.insert(usage.set_name.clone(), context);
        }
        Ok(Self { contexts })
    }

    /// The context for `name`. `None` when the set was never prefetched,
    /// which callers treat like an empty set.
    pub fn get(&self, name: &str) -> Option<&SetContext<'a>> {
        self.contexts.get(name)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }
}
