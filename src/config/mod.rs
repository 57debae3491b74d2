use anyhow::{Context, Result, bail};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::filter::FilterStatement;
use crate::model::{
    AreaSkeleton, Attic, Buckets, DerivedSkeleton, Element, ElementKey, NodeSkeleton,
    RelationSkeleton, Set, SetRegistry, SpatialIndex, Tag, Uint31Index, Uint32Index, WaySkeleton,
};
use crate::storage::MemoryTagSource;

/// Named sets and their element tags, as read from a YAML fixture.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FixtureConfig {
    #[serde(default)]
    pub sets: BTreeMap<String, SetFixture>,
}

impl FixtureConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()
            .with_context(|| format!("Config: Failed to read fixture {:?}", path))?;
        settings
            .try_deserialize()
            .with_context(|| format!("Config: Invalid fixture {:?}", path))
    }

    /// Builds the set registry and the tag source the fixture describes.
    pub fn build(&self) -> Result<(SetRegistry, MemoryTagSource)> {
        let mut registry = SetRegistry::new();
        let mut source = MemoryTagSource::new();
        for (name, fixture) in &self.sets {
            let set = fixture
                .build(&mut source)
                .with_context(|| format!("Config: Invalid set '{}'", name))?;
            tracing::debug!("Config: set '{}' holds {} elements", name, set.len());
            registry.insert(name.clone(), set);
        }
        tracing::info!(
            "Config: loaded {} sets, {} tagged elements",
            registry.len(),
            source.len()
        );
        Ok((registry, source))
    }
}

/// Elements of one set, by grouping.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SetFixture {
    #[serde(default)]
    pub nodes: Vec<ElementFixture>,
    #[serde(default)]
    pub attic_nodes: Vec<ElementFixture>,
    #[serde(default)]
    pub ways: Vec<ElementFixture>,
    #[serde(default)]
    pub attic_ways: Vec<ElementFixture>,
    #[serde(default)]
    pub relations: Vec<ElementFixture>,
    #[serde(default)]
    pub attic_relations: Vec<ElementFixture>,
    #[serde(default)]
    pub areas: Vec<ElementFixture>,
    #[serde(default)]
    pub deriveds: Vec<ElementFixture>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ElementFixture {
    pub id: u64,
    /// Spatial index bucket.
    #[serde(default)]
    pub index: u32,
    /// Unix seconds; required for attic elements.
    #[serde(default)]
    pub timestamp: Option<u64>,
    /// Type name of a derived element.
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<(TagText, TagText)>,
}

/// A tag key or value. Only YAML strings are accepted: an unquoted `007`
/// or `1.50` has already been read as a number and lost its spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagText(pub String);

impl<'de> Deserialize<'de> for TagText {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TagTextVisitor;

        impl Visitor<'_> for TagTextVisitor {
            type Value = TagText;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a quoted string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<TagText, E> {
                Ok(TagText(value.to_string()))
            }

            fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<TagText, E> {
                Ok(TagText(value))
            }
        }

        deserializer.deserialize_any(TagTextVisitor)
    }
}

impl ElementFixture {
    fn tag_list(&self) -> Vec<Tag> {
        self.tags
            .iter()
            .map(|(key, value)| (key.0.clone(), value.0.clone()))
            .collect()
    }

    fn attic_timestamp(&self) -> Result<u64> {
        match self.timestamp {
            Some(timestamp) => Ok(timestamp),
            None => bail!("attic element {} has no timestamp", self.id),
        }
    }
}

fn insert_element<I, E>(
    buckets: &mut Buckets<I, E>,
    source: &mut MemoryTagSource,
    index: I,
    elem: E,
    fixture: &ElementFixture,
) where
    I: SpatialIndex,
    E: Element,
{
    let tags = fixture.tag_list();
    if !tags.is_empty() {
        put_tags(source, E::GROUPING, elem.key(), &tags);
    }
    buckets.entry(index).or_default().push(elem);
}

/// The same element may appear in several sets; its tags are shared.
fn put_tags(
    source: &mut MemoryTagSource,
    grouping: crate::model::Grouping,
    key: ElementKey,
    tags: &[Tag],
) {
    if let Some(previous) = source.get(grouping, key)
        && previous != tags
    {
        tracing::warn!(
            "Config: {} {} has conflicting tag lists, keeping the last one",
            grouping.label(),
            key.id
        );
    }
    source.put(grouping, key, tags.to_vec());
}

impl SetFixture {
    fn build(&self, source: &mut MemoryTagSource) -> Result<Set> {
        let mut set = Set::default();
        for e in &self.nodes {
            let node = NodeSkeleton { id: e.id };
            insert_element(&mut set.nodes, source, Uint32Index(e.index), node, e);
        }
        for e in &self.attic_nodes {
            let node = Attic::new(NodeSkeleton { id: e.id }, e.attic_timestamp()?);
            insert_element(&mut set.attic_nodes, source, Uint32Index(e.index), node, e);
        }
        for e in &self.ways {
            let way = WaySkeleton { id: e.id };
            insert_element(&mut set.ways, source, Uint31Index(e.index), way, e);
        }
        for e in &self.attic_ways {
            let way = Attic::new(WaySkeleton { id: e.id }, e.attic_timestamp()?);
            insert_element(&mut set.attic_ways, source, Uint31Index(e.index), way, e);
        }
        for e in &self.relations {
            let rel = RelationSkeleton { id: e.id };
            insert_element(&mut set.relations, source, Uint31Index(e.index), rel, e);
        }
        for e in &self.attic_relations {
            let rel = Attic::new(RelationSkeleton { id: e.id }, e.attic_timestamp()?);
            insert_element(&mut set.attic_relations, source, Uint31Index(e.index), rel, e);
        }
        for e in &self.areas {
            let area = AreaSkeleton { id: e.id };
            insert_element(&mut set.areas, source, Uint31Index(e.index), area, e);
        }
        for e in &self.deriveds {
            let derived = DerivedSkeleton {
                id: e.id,
                type_name: e.type_name.clone().unwrap_or_else(|| "derived".to_string()),
            };
            insert_element(&mut set.deriveds, source, Uint31Index(e.index), derived, e);
        }
        Ok(set)
    }
}

/// Settings taken from the command line.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuntimeConfig {
    /// Overrides the statement's input set.
    pub from: Option<String>,
    /// Overrides the statement's output set.
    pub into: Option<String>,
    /// Prefetch only the tag keys the criterion reads.
    pub trim_tags: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            from: None,
            into: None,
            trim_tags: true,
        }
    }
}

impl RuntimeConfig {
    pub fn apply(&self, mut stmt: FilterStatement) -> FilterStatement {
        if let Some(from) = &self.from {
            stmt = stmt.with_input(from.clone());
        }
        if let Some(into) = &self.into {
            stmt = stmt.with_output(into.clone());
        }
        stmt.with_trim_tags(self.trim_tags)
    }
}
