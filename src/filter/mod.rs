//! The filter statement and the engine that prunes a set in place.

use anyhow::{Context, Result};

use crate::context::{PrepareContext, SetContext, SetResolver};
use crate::eval::{EvalTask, Evaluator, SetUsage, TagKeys, Usage, is_truthy};
use crate::model::{Buckets, DEFAULT_SET, Element, Grouping, Set, SetRegistry, SpatialIndex};
use crate::statement::{Diagnostics, StaticError, Statement};
use crate::storage::{PrefetchCache, TagSource, TagStore};

/// What a statement sees of the running query.
pub struct QueryContext<'a> {
    pub sets: SetRegistry,
    pub storage: &'a dyn TagSource,
}

impl<'a> QueryContext<'a> {
    pub fn new(sets: SetRegistry, storage: &'a dyn TagSource) -> Self {
        Self { sets, storage }
    }
}

/// A restriction a statement contributes to a query plan.
pub trait QueryConstraint {
    /// Whether the constraint can produce elements on its own.
    #[allow(dead_code)]
    fn delivers_data(&self) -> bool;

    /// Index ranges the constraint restricts to; `None` for no restriction.
    #[allow(dead_code)]
    fn get_ranges(&self) -> Option<Vec<(u32, u32)>>;

    /// Removes from `into` what the constraint rejects.
    fn filter(&self, query: &QueryContext<'_>, into: &mut Set) -> Result<()>;
}

/// Keeps the elements of a set for which a criterion is truthy.
#[derive(Debug, Clone)]
pub struct FilterStatement {
    line: u32,
    input: String,
    output: String,
    trim_tags: bool,
    criterion: Option<Evaluator>,
}

impl FilterStatement {
    pub fn new(line: u32) -> Self {
        Self {
            line,
            input: DEFAULT_SET.to_string(),
            output: DEFAULT_SET.to_string(),
            trim_tags: true,
            criterion: None,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.input = name.into();
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output = name.into();
        self
    }

    /// With `false`, prefetch keeps whole tag lists instead of only the
    /// keys the criterion reads.
    pub fn with_trim_tags(mut self, trim_tags: bool) -> Self {
        self.trim_tags = trim_tags;
        self
    }

    pub fn name(&self) -> &'static str {
        "filter"
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn criterion(&self) -> Option<&Evaluator> {
        self.criterion.as_ref()
    }

    /// Accepts the first evaluator as criterion; anything else is reported.
    pub fn add_statement(&mut self, statement: Statement, _text: &str, diagnostics: &mut Diagnostics) {
        match statement {
            Statement::Evaluator(evaluator) => {
                if self.criterion.is_none() {
                    self.criterion = Some(evaluator);
                } else {
                    diagnostics.report(StaticError::DuplicateCriterion { line: self.line });
                }
            }
            Statement::Other(child) => diagnostics.report(StaticError::UnexpectedSubstatement {
                line: self.line,
                parent: self.name().to_string(),
                child,
            }),
        }
    }

    /// The constraint lives as long as the statement that issued it.
    pub fn get_query_constraint(&self) -> FilterConstraint<'_> {
        FilterConstraint { stmt: self }
    }

    /// Filters a copy of the input set and stores it as the output set.
    pub fn execute(&self, query: &mut QueryContext<'_>) -> Result<()> {
        let mut into = query.sets.get(&self.input).cloned().unwrap_or_default();
        self.get_query_constraint()
            .filter(query, &mut into)
            .with_context(|| format!("Filter: line {}: execution failed", self.line))?;
        query.sets.insert(self.output.clone(), into);
        Ok(())
    }
}

pub struct FilterConstraint<'a> {
    stmt: &'a FilterStatement,
}

impl QueryConstraint for FilterConstraint<'_> {
    fn delivers_data(&self) -> bool {
        false
    }

    fn get_ranges(&self) -> Option<Vec<(u32, u32)>> {
        None
    }

    fn filter(&self, query: &QueryContext<'_>, into: &mut Set) -> Result<()> {
        let Some(criterion) = self.stmt.criterion() else {
            return Ok(());
        };
        let stats = filter_set(
            criterion,
            &query.sets,
            query.storage,
            into,
            self.stmt.trim_tags,
        )?;
        tracing::info!(
            "Filter: line {}: kept {} of {} elements",
            self.stmt.line,
            stats.kept,
            stats.before
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub before: usize,
    pub kept: usize,
}

/// Prefetches what `criterion` needs, compiles it, and drops every element
/// of `into` whose result is falsy.
///
/// Errors can only come from the prefetch phase; once scanning starts the
/// call cannot fail, and `into` is untouched if it returns an error.
pub fn filter_set(
    criterion: &Evaluator,
    sets: &SetRegistry,
    storage: &dyn TagSource,
    into: &mut Set,
    trim_tags: bool,
) -> Result<FilterStats> {
    let (set_usages, into_usage) = criterion.used_sets();
    let tag_keys = if trim_tags {
        criterion.used_tags()
    } else {
        TagKeys::All
    };

    let task: EvalTask = {
        let context =
            PrepareContext::build(&set_usages, SetResolver::new(sets), storage, &tag_keys)
                .context("Filter: Failed to prefetch referenced sets")?;
        tracing::debug!("Filter: prefetched {} referenced sets", context.len());
        criterion.get_task(&context)
    };

    let before = into.len();
    if into_usage == Usage::None {
        let keep = is_truthy(&task.eval_key(None));
        tracing::debug!("Filter: criterion ignores the element, keep all = {}", keep);
        if !keep {
            into.clear_elements();
        }
        return Ok(FilterStats {
            before,
            kept: into.len(),
        });
    }

    let into_context = SetContext::prefetch(
        &SetUsage::new(DEFAULT_SET, into_usage),
        into,
        storage,
        &tag_keys,
    )
    .context("Filter: Failed to prefetch filtered set")?;
    let into_tags: PrefetchCache = into_context.tags;

    eval_elems(&mut into.nodes, into_tags.store(Grouping::Nodes), &task);
    eval_elems(&mut into.attic_nodes, into_tags.store(Grouping::AtticNodes), &task);
    eval_elems(&mut into.ways, into_tags.store(Grouping::Ways), &task);
    eval_elems(&mut into.attic_ways, into_tags.store(Grouping::AtticWays), &task);
    eval_elems(&mut into.relations, into_tags.store(Grouping::Relations), &task);
    eval_elems(
        &mut into.attic_relations,
        into_tags.store(Grouping::AtticRelations),
        &task,
    );
    eval_elems(&mut into.areas, into_tags.store(Grouping::Areas), &task);
    eval_elems(&mut into.deriveds, into_tags.store(Grouping::Deriveds), &task);

    Ok(FilterStats {
        before,
        kept: into.len(),
    })
}

/// Buckets stay in place even when emptied.
fn eval_elems<I, E>(items: &mut Buckets<I, E>, store: Option<&TagStore>, task: &EvalTask)
where
    I: SpatialIndex,
    E: Element,
{
    let mut removed = 0usize;
    for (index, elems) in items.iter_mut() {
        let before = elems.len();
        elems.retain(|elem| {
            let tags = store.and_then(|store| store.get(*index, elem));
            is_truthy(&task.eval(elem, tags, None))
        });
        removed += before - elems.len();
    }
    if removed > 0 {
        tracing::debug!("Filter: removed {} {}", removed, E::GROUPING.label());
    }
}
