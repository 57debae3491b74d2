//! Compiled evaluation tasks.

use super::node::{BinaryOp, UnaryOp};
use super::numeric::bool_scalar;
use crate::context::SetContext;
use crate::model::{Buckets, Element, SpatialIndex, Tag, tag_value};
use crate::storage::TagStore;

/// The element a task is evaluated for, minus its concrete type.
#[derive(Clone, Copy)]
struct Subject<'a> {
    id: u64,
    type_name: &'a str,
}

#[derive(Clone, Copy)]
struct Probe<'a> {
    subject: Option<Subject<'a>>,
    tags: Option<&'a [Tag]>,
    key: Option<&'a str>,
}

#[derive(Debug, Clone)]
enum TaskKind {
    Constant(String),
    Value(String),
    IsTag(String),
    KeyValue,
    Id,
    Type,
    Unary(UnaryOp, Option<Box<EvalTask>>),
    Binary(BinaryOp, Option<Box<EvalTask>>, Option<Box<EvalTask>>),
}

/// An evaluator tree bound to one execution's set contexts.
///
/// Set-dependent values are resolved at compile time, so evaluating a task
/// is pure and never touches storage.
#[derive(Debug, Clone)]
pub struct EvalTask {
    kind: TaskKind,
}

impl EvalTask {
    fn new(kind: TaskKind) -> Self {
        Self { kind }
    }

    pub(crate) fn constant(value: String) -> Self {
        Self::new(TaskKind::Constant(value))
    }

    pub(crate) fn value(key: String) -> Self {
        Self::new(TaskKind::Value(key))
    }

    pub(crate) fn is_tag(key: String) -> Self {
        Self::new(TaskKind::IsTag(key))
    }

    pub(crate) fn key_value() -> Self {
        Self::new(TaskKind::KeyValue)
    }

    pub(crate) fn id() -> Self {
        Self::new(TaskKind::Id)
    }

    pub(crate) fn type_name() -> Self {
        Self::new(TaskKind::Type)
    }

    pub(crate) fn unary(op: UnaryOp, rhs: Option<EvalTask>) -> Self {
        Self::new(TaskKind::Unary(op, rhs.map(Box::new)))
    }

    pub(crate) fn binary(op: BinaryOp, lhs: Option<EvalTask>, rhs: Option<EvalTask>) -> Self {
        Self::new(TaskKind::Binary(op, lhs.map(Box::new), rhs.map(Box::new)))
    }

    /// Evaluates without an element.
    pub fn eval_key(&self, key: Option<&str>) -> String {
        self.evaluate(&Probe {
            subject: None,
            tags: None,
            key,
        })
    }

    /// Evaluates for one element of any kind/variant. `tags` is `None` for
    /// untagged elements.
    pub fn eval<E: Element>(&self, elem: &E, tags: Option<&[Tag]>, key: Option<&str>) -> String {
        self.evaluate(&Probe {
            subject: Some(Subject {
                id: elem.id(),
                type_name: elem.type_name(),
            }),
            tags,
            key,
        })
    }

    fn evaluate(&self, probe: &Probe<'_>) -> String {
        match &self.kind {
            TaskKind::Constant(value) => value.clone(),
            TaskKind::Value(key) => lookup(probe.tags, key),
            TaskKind::IsTag(key) => bool_scalar(
                probe
                    .tags
                    .is_some_and(|tags| tag_value(tags, key).is_some()),
            ),
            TaskKind::KeyValue => probe
                .key
                .map(|key| lookup(probe.tags, key))
                .unwrap_or_default(),
            TaskKind::Id => probe
                .subject
                .map(|s| s.id.to_string())
                .unwrap_or_default(),
            TaskKind::Type => probe
                .subject
                .map(|s| s.type_name.to_string())
                .unwrap_or_default(),
            TaskKind::Unary(op, rhs) => op.process(&child(rhs, probe)),
            TaskKind::Binary(op, lhs, rhs) => op.process(&child(lhs, probe), &child(rhs, probe)),
        }
    }
}

fn lookup(tags: Option<&[Tag]>, key: &str) -> String {
    tags.and_then(|tags| tag_value(tags, key))
        .unwrap_or_default()
        .to_string()
}

/// A missing operand evaluates to the empty string.
fn child(task: &Option<Box<EvalTask>>, probe: &Probe<'_>) -> String {
    task.as_ref()
        .map(|task| task.evaluate(probe))
        .unwrap_or_default()
}

fn collect_grouping<I, E>(
    task: &EvalTask,
    buckets: &Buckets<I, E>,
    store: Option<&TagStore>,
    out: &mut Vec<String>,
) where
    I: SpatialIndex,
    E: Element,
{
    for (index, elems) in buckets {
        for elem in elems {
            let tags = store.and_then(|store| store.get(*index, elem));
            out.push(task.eval(elem, tags, None));
        }
    }
}

/// Evaluates `task` for every element of a set context. A missing context
/// yields no values.
pub(crate) fn values_over(task: &EvalTask, context: Option<&SetContext<'_>>) -> Vec<String> {
    let mut values = Vec::new();
    let Some(context) = context else {
        return values;
    };
    let set = context.set;
    let tags = &context.tags;

    macro_rules! collect {
        ($field:ident, $grouping:ident) => {
            collect_grouping(
                task,
                &set.$field,
                tags.store(crate::model::Grouping::$grouping),
                &mut values,
            )
        };
    }

    collect!(nodes, Nodes);
    collect!(attic_nodes, AtticNodes);
    collect!(ways, Ways);
    collect!(attic_ways, AtticWays);
    collect!(relations, Relations);
    collect!(attic_relations, AtticRelations);
    collect!(areas, Areas);
    collect!(deriveds, Deriveds);
    values
}
