//! Element skeletons and the closed set of kind/variant groupings.

use std::fmt;

/// A single tag. Tag lists keep storage order and may repeat keys.
pub type Tag = (String, String);

/// Returns the first value stored under `key`.
pub fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
    Area,
    Derived,
}

impl ElementKind {
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
            ElementKind::Area => "area",
            ElementKind::Derived => "derived",
        }
    }

    /// Parses the plural selector used by `count(...)`.
    pub fn from_plural(value: &str) -> Option<Self> {
        match value {
            "nodes" => Some(ElementKind::Node),
            "ways" => Some(ElementKind::Way),
            "relations" => Some(ElementKind::Relation),
            "areas" => Some(ElementKind::Area),
            "deriveds" => Some(ElementKind::Derived),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The eight kind/variant combinations a set is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Grouping {
    Nodes,
    AtticNodes,
    Ways,
    AtticWays,
    Relations,
    AtticRelations,
    Areas,
    Deriveds,
}

impl Grouping {
    pub const ALL: [Grouping; 8] = [
        Grouping::Nodes,
        Grouping::AtticNodes,
        Grouping::Ways,
        Grouping::AtticWays,
        Grouping::Relations,
        Grouping::AtticRelations,
        Grouping::Areas,
        Grouping::Deriveds,
    ];

    pub fn kind(self) -> ElementKind {
        match self {
            Grouping::Nodes | Grouping::AtticNodes => ElementKind::Node,
            Grouping::Ways | Grouping::AtticWays => ElementKind::Way,
            Grouping::Relations | Grouping::AtticRelations => ElementKind::Relation,
            Grouping::Areas => ElementKind::Area,
            Grouping::Deriveds => ElementKind::Derived,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Grouping::Nodes => "nodes",
            Grouping::AtticNodes => "attic_nodes",
            Grouping::Ways => "ways",
            Grouping::AtticWays => "attic_ways",
            Grouping::Relations => "relations",
            Grouping::AtticRelations => "attic_relations",
            Grouping::Areas => "areas",
            Grouping::Deriveds => "deriveds",
        }
    }
}

/// Identity of an element within its grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey {
    pub id: u64,
    /// Only set for attic elements.
    pub timestamp: Option<u64>,
}

impl ElementKey {
    pub fn current(id: u64) -> Self {
        Self {
            id,
            timestamp: None,
        }
    }
}

/// Common surface of every element kind/variant.
pub trait Element {
    const GROUPING: Grouping;

    fn id(&self) -> u64;

    /// Type name reported to expressions.
    fn type_name(&self) -> &str {
        Self::GROUPING.kind().name()
    }

    fn key(&self) -> ElementKey {
        ElementKey::current(self.id())
    }

    fn timestamp(&self) -> Option<u64> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSkeleton {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaySkeleton {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSkeleton {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaSkeleton {
    pub id: u64,
}

/// Synthetic element produced by computation, e.g. a count result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedSkeleton {
    pub id: u64,
    pub type_name: String,
}

/// Historical snapshot of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attic<T> {
    pub elem: T,
    /// Unix seconds.
    pub timestamp: u64,
}

impl<T> Attic<T> {
    pub fn new(elem: T, timestamp: u64) -> Self {
        Self { elem, timestamp }
    }
}

macro_rules! impl_element {
    ($ty:ty, $grouping:expr) => {
        impl Element for $ty {
            const GROUPING: Grouping = $grouping;

            fn id(&self) -> u64 {
                self.id
            }
        }
    };
}

macro_rules! impl_attic_element {
    ($ty:ty, $grouping:expr) => {
        impl Element for Attic<$ty> {
            const GROUPING: Grouping = $grouping;

            fn id(&self) -> u64 {
                self.elem.id
            }

            fn key(&self) -> ElementKey {
                ElementKey {
                    id: self.elem.id,
                    timestamp: Some(self.timestamp),
                }
            }

            fn timestamp(&self) -> Option<u64> {
                Some(self.timestamp)
            }
        }
    };
}

impl_element!(NodeSkeleton, Grouping::Nodes);
impl_element!(WaySkeleton, Grouping::Ways);
impl_element!(RelationSkeleton, Grouping::Relations);
impl_element!(AreaSkeleton, Grouping::Areas);
impl_attic_element!(NodeSkeleton, Grouping::AtticNodes);
impl_attic_element!(WaySkeleton, Grouping::AtticWays);
impl_attic_element!(RelationSkeleton, Grouping::AtticRelations);

impl Element for DerivedSkeleton {
    const GROUPING: Grouping = Grouping::Deriveds;

    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attic_variants_exist_only_for_osm_kinds() {
        let attic: Vec<_> = Grouping::ALL
            .iter()
            .filter(|g| g.label().starts_with("attic_"))
            .map(|g| g.kind())
            .collect();
        assert_eq!(
            attic,
            vec![ElementKind::Node, ElementKind::Way, ElementKind::Relation]
        );
    }

    #[test]
    fn attic_key_carries_timestamp() {
        let elem = Attic::new(WaySkeleton { id: 7 }, 1_500_000_000);
        assert_eq!(elem.key().timestamp, Some(1_500_000_000));
        assert_eq!(elem.type_name(), "way");
        assert_eq!(NodeSkeleton { id: 7 }.key().timestamp, None);
    }

    #[test]
    fn tag_value_returns_first_duplicate() {
        let tags = vec![
            ("name".to_string(), "A".to_string()),
            ("name".to_string(), "B".to_string()),
        ];
        assert_eq!(tag_value(&tags, "name"), Some("A"));
        assert_eq!(tag_value(&tags, "ref"), None);
    }
}
