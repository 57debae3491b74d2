//! Tag storage access: the storage-layer trait, the in-memory source, and
//! the per-grouping tag stores filled during prefetch.

use anyhow::{Context, Result};
use std::collections::HashMap;

use crate::eval::{SetUsage, TagKeys, Usage};
use crate::model::{Buckets, Element, ElementKey, Grouping, Set, SpatialIndex, Tag};

/// The storage layer as seen by the filter engine.
///
/// `fetch` is a batch lookup of one spatial-index bucket. Elements without
/// tags may be omitted from the result.
pub trait TagSource {
    fn fetch(
        &self,
        grouping: Grouping,
        index: u32,
        keys: &[ElementKey],
    ) -> Result<Vec<(ElementKey, Vec<Tag>)>>;
}

/// Tag source held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTagSource {
    tags: HashMap<(Grouping, ElementKey), Vec<Tag>>,
}

impl MemoryTagSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the tag list of one element, replacing any previous list.
    pub fn put(&mut self, grouping: Grouping, key: ElementKey, tags: Vec<Tag>) {
        self.tags.insert((grouping, key), tags);
    }

    pub fn get(&self, grouping: Grouping, key: ElementKey) -> Option<&[Tag]> {
        self.tags.get(&(grouping, key)).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }
}

impl TagSource for MemoryTagSource {
    fn fetch(
        &self,
        grouping: Grouping,
        _index: u32,
        keys: &[ElementKey],
    ) -> Result<Vec<(ElementKey, Vec<Tag>)>> {
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.tags
                    .get(&(grouping, *key))
                    .map(|tags| (*key, tags.clone()))
            })
            .collect())
    }
}

/// Prefetched tags of one grouping, keyed by (spatial index, element).
#[derive(Debug, Clone, Default)]
pub struct TagStore {
    buckets: HashMap<u32, HashMap<ElementKey, Vec<Tag>>>,
}

impl TagStore {
    /// Tags of `elem` in bucket `index`; `None` means the element has no tags.
    pub fn get<I: SpatialIndex, E: Element>(&self, index: I, elem: &E) -> Option<&[Tag]> {
        self.buckets
            .get(&index.value())?
            .get(&elem.key())
            .map(Vec::as_slice)
    }

    fn insert(&mut self, index: u32, key: ElementKey, tags: Vec<Tag>) {
        self.buckets.entry(index).or_default().insert(key, tags);
    }

    /// Number of tagged elements held.
    pub fn len(&self) -> usize {
        self.buckets.values().map(HashMap::len).sum()
    }
}

/// Tag stores of one set, by grouping. A missing grouping has no tag data.
#[derive(Debug, Clone, Default)]
pub struct PrefetchCache {
    stores: HashMap<Grouping, TagStore>,
}

impl PrefetchCache {
    pub fn store(&self, grouping: Grouping) -> Option<&TagStore> {
        self.stores.get(&grouping)
    }

    pub fn tagged_elements(&self) -> usize {
        self.stores.values().map(TagStore::len).sum()
    }
}

fn prefetch_grouping<I, E>(
    buckets: &Buckets<I, E>,
    source: &dyn TagSource,
    keys: &TagKeys,
) -> Result<TagStore>
where
    I: SpatialIndex,
    E: Element,
{
    let mut store = TagStore::default();
    for (index, elems) in buckets {
        if elems.is_empty() {
            continue;
        }
        let element_keys: Vec<ElementKey> = elems.iter().map(Element::key).collect();
        let fetched = source
            .fetch(E::GROUPING, index.value(), &element_keys)
            .with_context(|| {
                format!(
                    "Storage: Failed to fetch {} tags for index {}",
                    E::GROUPING.label(),
                    index.value()
                )
            })?;
        for (key, mut tags) in fetched {
            if let TagKeys::Keys(_) = keys {
                tags.retain(|(k, _)| keys.contains(k));
            }
            store.insert(index.value(), key, tags);
        }
    }
    Ok(store)
}

/// Loads the tags `usage` requires for every non-empty grouping of `set`.
///
/// Below [`Usage::Tags`] nothing is loaded. With explicit `keys`, stored
/// tag lists are narrowed to those keys, order preserved.
pub fn prefetch(
    usage: &SetUsage,
    set: &Set,
    source: &dyn TagSource,
    keys: &TagKeys,
) -> Result<PrefetchCache> {
    let mut cache = PrefetchCache::default();
    if usage.usage < Usage::Tags {
        return Ok(cache);
    }

    macro_rules! fetch_into {
        ($field:ident, $grouping:expr) => {
            if !set.$field.is_empty() {
                let store = prefetch_grouping(&set.$field, source, keys)?;
                cache.stores.insert($grouping, store);
            }
        };
    }

    fetch_into!(nodes, Grouping::Nodes);
    fetch_into!(attic_nodes, Grouping::AtticNodes);
    fetch_into!(ways, Grouping::Ways);
    fetch_into!(attic_ways, Grouping::AtticWays);
    fetch_into!(relations, Grouping::Relations);
    fetch_into!(attic_relations, Grouping::AtticRelations);
    fetch_into!(areas, Grouping::Areas);
    fetch_into!(deriveds, Grouping::Deriveds);

    tracing::debug!(
        "Prefetch: set '{}' resolved tags for {} elements",
        usage.set_name,
        cache.tagged_elements()
    );
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attic, NodeSkeleton, Uint31Index, Uint32Index, WaySkeleton};

    fn tag(k: &str, v: &str) -> Tag {
        (k.to_string(), v.to_string())
    }

    fn fixture() -> (Set, MemoryTagSource) {
        let mut set = Set::default();
        set.nodes.insert(
            Uint32Index(10),
            vec![NodeSkeleton { id: 1 }, NodeSkeleton { id: 2 }],
        );
        set.attic_ways
            .insert(Uint31Index(3), vec![Attic::new(WaySkeleton { id: 5 }, 100)]);

        let mut source = MemoryTagSource::new();
        source.put(
            Grouping::Nodes,
            ElementKey::current(1),
            vec![tag("amenity", "cafe"), tag("name", "Corner")],
        );
        source.put(
            Grouping::AtticWays,
            ElementKey {
                id: 5,
                timestamp: Some(100),
            },
            vec![tag("highway", "path")],
        );
        // Same id, current version: must not leak into the attic lookup.
        source.put(
            Grouping::Ways,
            ElementKey::current(5),
            vec![tag("highway", "primary")],
        );
        (set, source)
    }

    #[test]
    fn prefetch_resolves_tags_per_grouping() {
        let (set, source) = fixture();
        let cache = prefetch(
            &SetUsage::new("_", Usage::Tags),
            &set,
            &source,
            &TagKeys::All,
        )
        .unwrap();

        let nodes = cache.store(Grouping::Nodes).unwrap();
        assert_eq!(
            nodes.get(Uint32Index(10), &NodeSkeleton { id: 1 }).unwrap().len(),
            2
        );
        assert!(nodes.get(Uint32Index(10), &NodeSkeleton { id: 2 }).is_none());

        let attic = cache.store(Grouping::AtticWays).unwrap();
        let tags = attic
            .get(Uint31Index(3), &Attic::new(WaySkeleton { id: 5 }, 100))
            .unwrap();
        assert_eq!(tags, &[tag("highway", "path")]);

        assert!(cache.store(Grouping::Ways).is_none());
    }

    #[test]
    fn skeleton_usage_loads_nothing() {
        let (set, source) = fixture();
        let cache = prefetch(
            &SetUsage::new("_", Usage::Skeleton),
            &set,
            &source,
            &TagKeys::All,
        )
        .unwrap();
        assert_eq!(cache.tagged_elements(), 0);
        assert!(cache.store(Grouping::Nodes).is_none());
    }

    #[test]
    fn explicit_keys_narrow_tag_lists() {
        let (set, source) = fixture();
        let cache = prefetch(
            &SetUsage::new("_", Usage::Tags),
            &set,
            &source,
            &TagKeys::single("name"),
        )
        .unwrap();
        let tags = cache
            .store(Grouping::Nodes)
            .unwrap()
            .get(Uint32Index(10), &NodeSkeleton { id: 1 })
            .unwrap();
        assert_eq!(tags, &[tag("name", "Corner")]);
    }

    struct FailingSource;

    impl TagSource for FailingSource {
        fn fetch(
            &self,
            _grouping: Grouping,
            _index: u32,
            _keys: &[ElementKey],
        ) -> Result<Vec<(ElementKey, Vec<Tag>)>> {
            Err(anyhow::anyhow!("disk unavailable"))
        }
    }

    #[test]
    fn storage_errors_carry_context() {
        let (set, _) = fixture();
        let err = prefetch(
            &SetUsage::new("_", Usage::Tags),
            &set,
            &FailingSource,
            &TagKeys::All,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to fetch nodes tags"));
    }
}
