//! Static dependency descriptors gathered from an evaluator tree.

use std::collections::BTreeSet;

/// How much of each element has to be resolved before evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Usage {
    #[default]
    None,
    Skeleton,
    Tags,
}

/// A named set an expression dereferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetUsage {
    pub set_name: String,
    pub usage: Usage,
}

impl SetUsage {
    pub fn new(set_name: impl Into<String>, usage: Usage) -> Self {
        Self {
            set_name: set_name.into(),
            usage,
        }
    }
}

/// Set usages plus the usage required of the filtered element itself.
pub type UsedSets = (Vec<SetUsage>, Usage);

/// Adds `other` into `into`, keeping one entry per set name with the
/// highest usage.
pub fn merge_set_usages(into: &mut Vec<SetUsage>, other: Vec<SetUsage>) {
    for usage in other {
        match into.iter_mut().find(|u| u.set_name == usage.set_name) {
            Some(existing) => existing.usage = existing.usage.max(usage.usage),
            None => into.push(usage),
        }
    }
}

pub fn merge_used_sets(lhs: UsedSets, rhs: UsedSets) -> UsedSets {
    let (mut sets, lhs_usage) = lhs;
    merge_set_usages(&mut sets, rhs.0);
    (sets, lhs_usage.max(rhs.1))
}

/// Tag keys an expression reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKeys {
    /// Not statically known; every tag must be kept.
    All,
    Keys(BTreeSet<String>),
}

impl Default for TagKeys {
    fn default() -> Self {
        TagKeys::Keys(BTreeSet::new())
    }
}

impl TagKeys {
    pub fn single(key: &str) -> Self {
        TagKeys::Keys(BTreeSet::from([key.to_string()]))
    }

    pub fn merge(self, other: TagKeys) -> TagKeys {
        match (self, other) {
            (TagKeys::Keys(mut a), TagKeys::Keys(b)) => {
                a.extend(b);
                TagKeys::Keys(a)
            }
            _ => TagKeys::All,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        match self {
            TagKeys::All => true,
            TagKeys::Keys(keys) => keys.contains(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_highest_usage_per_name() {
        let mut sets = vec![SetUsage::new("a", Usage::Skeleton)];
        merge_set_usages(
            &mut sets,
            vec![SetUsage::new("a", Usage::Tags), SetUsage::new("b", Usage::Skeleton)],
        );
        assert_eq!(
            sets,
            vec![SetUsage::new("a", Usage::Tags), SetUsage::new("b", Usage::Skeleton)]
        );
    }

    #[test]
    fn all_tags_absorbs_keys() {
        let keys = TagKeys::single("name").merge(TagKeys::All);
        assert_eq!(keys, TagKeys::All);
        assert!(keys.contains("anything"));
        assert!(!TagKeys::single("name").contains("ref"));
    }
}
