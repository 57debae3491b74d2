//! Sets: named, multi-kind element collections bucketed by spatial index.

use std::collections::{BTreeMap, HashMap};

use super::element::{
    AreaSkeleton, Attic, DerivedSkeleton, ElementKind, Grouping, NodeSkeleton, RelationSkeleton,
    WaySkeleton,
};

/// Ordered bucket key. Ordering only affects locality.
pub trait SpatialIndex: Copy + Ord {
    fn value(self) -> u32;
}

/// Index for point-like elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uint32Index(pub u32);

/// Index for extent-bearing elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uint31Index(pub u32);

impl SpatialIndex for Uint32Index {
    fn value(self) -> u32 {
        self.0
    }
}

impl SpatialIndex for Uint31Index {
    fn value(self) -> u32 {
        self.0
    }
}

pub type Buckets<I, E> = BTreeMap<I, Vec<E>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Set {
    pub nodes: Buckets<Uint32Index, NodeSkeleton>,
    pub attic_nodes: Buckets<Uint32Index, Attic<NodeSkeleton>>,
    pub ways: Buckets<Uint31Index, WaySkeleton>,
    pub attic_ways: Buckets<Uint31Index, Attic<WaySkeleton>>,
    pub relations: Buckets<Uint31Index, RelationSkeleton>,
    pub attic_relations: Buckets<Uint31Index, Attic<RelationSkeleton>>,
    pub areas: Buckets<Uint31Index, AreaSkeleton>,
    pub deriveds: Buckets<Uint31Index, DerivedSkeleton>,
}

fn bucket_len<I, E>(buckets: &Buckets<I, E>) -> usize {
    buckets.values().map(Vec::len).sum()
}

fn clear_buckets<I, E>(buckets: &mut Buckets<I, E>) {
    buckets.values_mut().for_each(Vec::clear);
}

impl Set {
    /// Number of elements in one grouping.
    pub fn grouping_len(&self, grouping: Grouping) -> usize {
        match grouping {
            Grouping::Nodes => bucket_len(&self.nodes),
            Grouping::AtticNodes => bucket_len(&self.attic_nodes),
            Grouping::Ways => bucket_len(&self.ways),
            Grouping::AtticWays => bucket_len(&self.attic_ways),
            Grouping::Relations => bucket_len(&self.relations),
            Grouping::AtticRelations => bucket_len(&self.attic_relations),
            Grouping::Areas => bucket_len(&self.areas),
            Grouping::Deriveds => bucket_len(&self.deriveds),
        }
    }

    /// Number of elements of `kind` (both variants), or of all kinds.
    pub fn count(&self, kind: Option<ElementKind>) -> usize {
        Grouping::ALL
            .iter()
            .filter(|g| kind.is_none_or(|k| g.kind() == k))
            .map(|g| self.grouping_len(*g))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.count(None)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every element. Buckets stay in place.
    pub fn clear_elements(&mut self) {
        clear_buckets(&mut self.nodes);
        clear_buckets(&mut self.attic_nodes);
        clear_buckets(&mut self.ways);
        clear_buckets(&mut self.attic_ways);
        clear_buckets(&mut self.relations);
        clear_buckets(&mut self.attic_relations);
        clear_buckets(&mut self.areas);
        clear_buckets(&mut self.deriveds);
    }
}

/// Sets visible to a query, by name.
pub type SetRegistry = HashMap<String, Set>;

/// Name of the default set.
pub const DEFAULT_SET: &str = "_";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_spans_both_variants() {
        let mut set = Set::default();
        set.ways
            .insert(Uint31Index(1), vec![WaySkeleton { id: 1 }, WaySkeleton { id: 2 }]);
        set.attic_ways
            .insert(Uint31Index(1), vec![Attic::new(WaySkeleton { id: 3 }, 10)]);
        set.nodes.insert(Uint32Index(5), vec![NodeSkeleton { id: 4 }]);
        set.areas.insert(Uint31Index(9), Vec::new());

        assert_eq!(set.count(Some(ElementKind::Way)), 3);
        assert_eq!(set.count(Some(ElementKind::Area)), 0);
        assert_eq!(set.len(), 4);
        assert!(!set.is_empty());

        set.clear_elements();
        assert!(set.is_empty());
        assert_eq!(set.ways.len(), 1);
        assert_eq!(set.areas.len(), 1);
    }
}
