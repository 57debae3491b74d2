use anyhow::{Context, Result};
use serde::Serialize;

use crate::eval::{SetUsage, TagKeys, Usage};
use crate::model::{Buckets, Element, Grouping, Set, SpatialIndex, Tag};
use crate::storage::{TagSource, TagStore, prefetch};

pub mod jsonl;

pub use self::jsonl::JsonlSink;

/// One element of a result set, ready for output.
#[derive(Clone, Debug, Serialize)]
pub struct ElementRow {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: u64,
    pub index: u32,
    /// RFC 3339, attic elements only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub tags: Vec<Tag>,
}

pub trait ElementSink {
    fn add_element(&mut self, row: ElementRow) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

pub fn format_timestamp_secs(secs: u64) -> Option<String> {
    let secs = i64::try_from(secs).ok()?;
    let dt = time::OffsetDateTime::from_unix_timestamp(secs).ok()?;
    dt.format(&time::format_description::well_known::Rfc3339).ok()
}

fn write_grouping<I, E>(
    buckets: &Buckets<I, E>,
    store: Option<&TagStore>,
    sink: &mut dyn ElementSink,
) -> Result<usize>
where
    I: SpatialIndex,
    E: Element,
{
    let mut written = 0;
    for (index, elems) in buckets {
        for elem in elems {
            let tags = store
                .and_then(|store| store.get(*index, elem))
                .map(<[Tag]>::to_vec)
                .unwrap_or_default();
            sink.add_element(ElementRow {
                type_name: elem.type_name().to_string(),
                id: elem.id(),
                index: index.value(),
                timestamp: elem.timestamp().and_then(format_timestamp_secs),
                tags,
            })?;
            written += 1;
        }
    }
    Ok(written)
}

/// Writes every element of `set` with its full tag list, grouping by
/// grouping and bucket by bucket.
pub fn write_set(
    name: &str,
    set: &Set,
    source: &dyn TagSource,
    sink: &mut dyn ElementSink,
) -> Result<usize> {
    let cache = prefetch(&SetUsage::new(name, Usage::Tags), set, source, &TagKeys::All)
        .with_context(|| format!("Sink: Failed to load tags of set '{}'", name))?;

    let mut written = 0;
    written += write_grouping(&set.nodes, cache.store(Grouping::Nodes), sink)?;
    written += write_grouping(&set.attic_nodes, cache.store(Grouping::AtticNodes), sink)?;
    written += write_grouping(&set.ways, cache.store(Grouping::Ways), sink)?;
    written += write_grouping(&set.attic_ways, cache.store(Grouping::AtticWays), sink)?;
    written += write_grouping(&set.relations, cache.store(Grouping::Relations), sink)?;
    written += write_grouping(
        &set.attic_relations,
        cache.store(Grouping::AtticRelations),
        sink,
    )?;
    written += write_grouping(&set.areas, cache.store(Grouping::Areas), sink)?;
    written += write_grouping(&set.deriveds, cache.store(Grouping::Deriveds), sink)?;
    Ok(written)
}
