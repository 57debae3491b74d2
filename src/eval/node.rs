//! Evaluator node kinds: static analysis, construction and compilation.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::numeric::{
    NAN, Numeric, bool_scalar, format_float, format_int, format_numeric, is_truthy, parse_float,
    parse_int, parse_numeric,
};
use super::task::{EvalTask, values_over};
use super::usage::{SetUsage, TagKeys, Usage, UsedSets, merge_set_usages, merge_used_sets};
use crate::context::PrepareContext;
use crate::model::ElementKind;
use crate::statement::{Diagnostics, StaticError, Statement};

/// Expression tree node. The operator set is closed.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluator {
    /// Literal value.
    Fixed(String),
    /// First value of a tag key, `t["key"]`.
    Value { key: String },
    /// `is_tag("key")`
    IsTag { key: String },
    /// Value of the key handed to the entry point, `::`.
    KeyValue,
    /// `id()`
    Id,
    /// `type()`
    Type,
    Unary(UnaryOperator),
    Binary(BinaryOperator),
    /// `set.count(kind)`; `None` counts every kind.
    SetCount {
        set: String,
        kind: Option<ElementKind>,
    },
    /// `set.u(value)` and friends.
    Aggregate {
        func: AggregateFunc,
        set: String,
        value: Option<Box<Evaluator>>,
    },
}

#[cfg(test)]
impl Evaluator {
    pub fn fixed(value: impl Into<String>) -> Self {
        Evaluator::Fixed(value.into())
    }

    pub fn value(key: impl Into<String>) -> Self {
        Evaluator::Value { key: key.into() }
    }

    pub fn unary(op: UnaryOp, child: Evaluator) -> Self {
        Evaluator::Unary(UnaryOperator {
            op,
            line: 0,
            rhs: Some(Box::new(child)),
        })
    }

    pub fn binary(op: BinaryOp, lhs: Evaluator, rhs: Evaluator) -> Self {
        Evaluator::Binary(BinaryOperator {
            op,
            line: 0,
            lhs: Some(Box::new(lhs)),
            rhs: Some(Box::new(rhs)),
        })
    }
}

impl Evaluator {
    /// Sets this subtree dereferences, and the usage it needs of the
    /// element being evaluated.
    pub fn used_sets(&self) -> UsedSets {
        match self {
            Evaluator::Fixed(_) => (Vec::new(), Usage::None),
            Evaluator::Value { .. } | Evaluator::IsTag { .. } | Evaluator::KeyValue => {
                (Vec::new(), Usage::Tags)
            }
            Evaluator::Id | Evaluator::Type => (Vec::new(), Usage::Skeleton),
            Evaluator::Unary(node) => child_used_sets(&node.rhs),
            Evaluator::Binary(node) => {
                merge_used_sets(child_used_sets(&node.lhs), child_used_sets(&node.rhs))
            }
            Evaluator::SetCount { set, .. } => {
                (vec![SetUsage::new(set.clone(), Usage::Skeleton)], Usage::None)
            }
            Evaluator::Aggregate { set, value, .. } => {
                let (inner_sets, inner_usage) = child_used_sets(value);
                let mut sets = vec![SetUsage::new(
                    set.clone(),
                    inner_usage.max(Usage::Skeleton),
                )];
                merge_set_usages(&mut sets, inner_sets);
                (sets, Usage::None)
            }
        }
    }

    /// Tag keys this subtree reads. [`TagKeys::All`] when not known.
    pub fn used_tags(&self) -> TagKeys {
        match self {
            Evaluator::Value { key } | Evaluator::IsTag { key } => TagKeys::single(key),
            Evaluator::KeyValue => TagKeys::All,
            Evaluator::Fixed(_) | Evaluator::Id | Evaluator::Type | Evaluator::SetCount { .. } => {
                TagKeys::Keys(BTreeSet::new())
            }
            Evaluator::Unary(node) => child_used_tags(&node.rhs),
            Evaluator::Binary(node) => {
                child_used_tags(&node.lhs).merge(child_used_tags(&node.rhs))
            }
            Evaluator::Aggregate { value, .. } => child_used_tags(value),
        }
    }

    /// Compiles this subtree against resolved set contexts.
    pub fn get_task(&self, context: &PrepareContext<'_>) -> EvalTask {
        match self {
            Evaluator::Fixed(value) => EvalTask::constant(value.clone()),
            Evaluator::Value { key } => EvalTask::value(key.clone()),
            Evaluator::IsTag { key } => EvalTask::is_tag(key.clone()),
            Evaluator::KeyValue => EvalTask::key_value(),
            Evaluator::Id => EvalTask::id(),
            Evaluator::Type => EvalTask::type_name(),
            Evaluator::Unary(node) => {
                EvalTask::unary(node.op, node.rhs.as_ref().map(|rhs| rhs.get_task(context)))
            }
            Evaluator::Binary(node) => EvalTask::binary(
                node.op,
                node.lhs.as_ref().map(|lhs| lhs.get_task(context)),
                node.rhs.as_ref().map(|rhs| rhs.get_task(context)),
            ),
            Evaluator::SetCount { set, kind } => {
                let count = context.get(set).map_or(0, |ctx| ctx.set.count(*kind));
                EvalTask::constant(count.to_string())
            }
            Evaluator::Aggregate { func, set, value } => {
                let values = match value {
                    Some(value) => values_over(&value.get_task(context), context.get(set)),
                    None => Vec::new(),
                };
                EvalTask::constant(func.combine(&values))
            }
        }
    }
}

fn child_used_sets(child: &Option<Box<Evaluator>>) -> UsedSets {
    child
        .as_ref()
        .map_or_else(|| (Vec::new(), Usage::None), |c| c.used_sets())
}

fn child_used_tags(child: &Option<Box<Evaluator>>) -> TagKeys {
    child.as_ref().map_or_else(TagKeys::default, |c| c.used_tags())
}

/// Offers `statement` to the first free operand slot.
fn accept_operand(
    slots: &mut [&mut Option<Box<Evaluator>>],
    parent: &'static str,
    line: u32,
    statement: Statement,
    diagnostics: &mut Diagnostics,
) {
    let expected = slots.len();
    match statement {
        Statement::Evaluator(evaluator) => {
            match slots.iter_mut().find(|slot| slot.is_none()) {
                Some(slot) => **slot = Some(Box::new(evaluator)),
                None => diagnostics.report(StaticError::TooManyEvaluators {
                    line,
                    parent: parent.to_string(),
                    expected,
                }),
            }
        }
        Statement::Other(child) => diagnostics.report(StaticError::UnexpectedSubstatement {
            line,
            parent: parent.to_string(),
            child,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Number,
    IsNum,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Not => "eval-not",
            UnaryOp::Negate => "eval-negate",
            UnaryOp::Number => "eval-number",
            UnaryOp::IsNum => "eval-is-num",
        }
    }

    pub fn process(self, rhs: &str) -> String {
        match self {
            UnaryOp::Not => bool_scalar(!is_truthy(rhs)),
            UnaryOp::Negate => {
                if let Some(value) = parse_int(rhs) {
                    return match value.checked_neg() {
                        Some(negated) => format_int(negated),
                        None => format_float(-(value as f64)),
                    };
                }
                match parse_float(rhs) {
                    Some(value) => format_float(-value),
                    None => NAN.to_string(),
                }
            }
            UnaryOp::Number => match parse_numeric(rhs) {
                Some(value) => format_numeric(value),
                None => NAN.to_string(),
            },
            UnaryOp::IsNum => bool_scalar(parse_numeric(rhs).is_some()),
        }
    }
}

/// Prefix operator with at most one operand.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOperator {
    pub op: UnaryOp,
    pub line: u32,
    pub rhs: Option<Box<Evaluator>>,
}

impl UnaryOperator {
    pub fn new(op: UnaryOp, line: u32) -> Self {
        Self { op, line, rhs: None }
    }

    /// Attaches the operand. Only the first evaluator is kept.
    pub fn add_statement(&mut self, statement: Statement, _text: &str, diagnostics: &mut Diagnostics) {
        accept_operand(
            &mut [&mut self.rhs],
            self.op.name(),
            self.line,
            statement,
            diagnostics,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Plus,
    Minus,
    Times,
    Divided,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::And => "eval-and",
            BinaryOp::Or => "eval-or",
            BinaryOp::Equal => "eval-equal",
            BinaryOp::NotEqual => "eval-not-equal",
            BinaryOp::Less => "eval-less",
            BinaryOp::LessOrEqual => "eval-less-or-equal",
            BinaryOp::Greater => "eval-greater",
            BinaryOp::GreaterOrEqual => "eval-greater-or-equal",
            BinaryOp::Plus => "eval-plus",
            BinaryOp::Minus => "eval-minus",
            BinaryOp::Times => "eval-times",
            BinaryOp::Divided => "eval-divided",
        }
    }

    pub fn process(self, lhs: &str, rhs: &str) -> String {
        match self {
            BinaryOp::And => bool_scalar(is_truthy(lhs) && is_truthy(rhs)),
            BinaryOp::Or => bool_scalar(is_truthy(lhs) || is_truthy(rhs)),
            BinaryOp::Equal => bool_scalar(compare_scalars(lhs, rhs) == Ordering::Equal),
            BinaryOp::NotEqual => bool_scalar(compare_scalars(lhs, rhs) != Ordering::Equal),
            BinaryOp::Less => bool_scalar(compare_scalars(lhs, rhs) == Ordering::Less),
            BinaryOp::LessOrEqual => bool_scalar(compare_scalars(lhs, rhs) != Ordering::Greater),
            BinaryOp::Greater => bool_scalar(compare_scalars(lhs, rhs) == Ordering::Greater),
            BinaryOp::GreaterOrEqual => bool_scalar(compare_scalars(lhs, rhs) != Ordering::Less),
            BinaryOp::Plus => arithmetic(lhs, rhs, i64::checked_add, |a, b| a + b)
                .unwrap_or_else(|| format!("{lhs}{rhs}")),
            BinaryOp::Minus => arithmetic(lhs, rhs, i64::checked_sub, |a, b| a - b)
                .unwrap_or_else(|| NAN.to_string()),
            BinaryOp::Times => arithmetic(lhs, rhs, i64::checked_mul, |a, b| a * b)
                .unwrap_or_else(|| NAN.to_string()),
            BinaryOp::Divided => match (parse_numeric(lhs), parse_numeric(rhs)) {
                (Some(a), Some(b)) => format_float(a.as_f64() / b.as_f64()),
                _ => NAN.to_string(),
            },
        }
    }
}

/// Integers, then floats, then plain strings.
pub fn compare_scalars(lhs: &str, rhs: &str) -> Ordering {
    match (parse_numeric(lhs), parse_numeric(rhs)) {
        (Some(Numeric::Int(a)), Some(Numeric::Int(b))) => a.cmp(&b),
        (Some(a), Some(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => lhs.cmp(rhs),
    }
}

/// `None` when either side is not a number.
fn arithmetic(
    lhs: &str,
    rhs: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Option<String> {
    let (a, b) = (parse_numeric(lhs)?, parse_numeric(rhs)?);
    if let (Numeric::Int(x), Numeric::Int(y)) = (a, b)
        && let Some(result) = int_op(x, y)
    {
        return Some(format_int(result));
    }
    Some(format_float(float_op(a.as_f64(), b.as_f64())))
}

/// Infix operator with up to two operands.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperator {
    pub op: BinaryOp,
    pub line: u32,
    pub lhs: Option<Box<Evaluator>>,
    pub rhs: Option<Box<Evaluator>>,
}

impl BinaryOperator {
    pub fn new(op: BinaryOp, line: u32) -> Self {
        Self {
            op,
            line,
            lhs: None,
            rhs: None,
        }
    }

    /// Attaches the left operand first, then the right one.
    pub fn add_statement(&mut self, statement: Statement, _text: &str, diagnostics: &mut Diagnostics) {
        accept_operand(
            &mut [&mut self.lhs, &mut self.rhs],
            self.op.name(),
            self.line,
            statement,
            diagnostics,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Union,
    Min,
    Max,
    Sum,
    Set,
}

pub const MULTIPLE_VALUES: &str = "< multiple values found >";

impl AggregateFunc {
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "u" => Some(AggregateFunc::Union),
            "min" => Some(AggregateFunc::Min),
            "max" => Some(AggregateFunc::Max),
            "sum" => Some(AggregateFunc::Sum),
            "set" => Some(AggregateFunc::Set),
            _ => None,
        }
    }

    /// Folds the values produced by every element of a set.
    pub fn combine(self, values: &[String]) -> String {
        let non_empty = values.iter().filter(|v| !v.is_empty());
        match self {
            AggregateFunc::Union => {
                let mut unique: Option<&String> = None;
                for value in non_empty {
                    match unique {
                        None => unique = Some(value),
                        Some(seen) if seen != value => return MULTIPLE_VALUES.to_string(),
                        Some(_) => {}
                    }
                }
                unique.cloned().unwrap_or_default()
            }
            AggregateFunc::Min | AggregateFunc::Max => {
                let candidates: Vec<&String> = non_empty.collect();
                let all_numeric = candidates.iter().all(|v| parse_numeric(v).is_some());
                let ordering = |a: &&String, b: &&String| {
                    if all_numeric {
                        compare_scalars(a, b)
                    } else {
                        a.cmp(b)
                    }
                };
                let picked = if self == AggregateFunc::Min {
                    candidates.into_iter().min_by(ordering)
                } else {
                    candidates.into_iter().max_by(ordering)
                };
                picked.cloned().unwrap_or_default()
            }
            AggregateFunc::Sum => {
                let mut total = Numeric::Int(0);
                for value in values {
                    let Some(n) = parse_numeric(value) else {
                        return NAN.to_string();
                    };
                    total = match (total, n) {
                        (Numeric::Int(a), Numeric::Int(b)) => match a.checked_add(b) {
                            Some(sum) => Numeric::Int(sum),
                            None => Numeric::Float(a as f64 + b as f64),
                        },
                        (a, b) => Numeric::Float(a.as_f64() + b.as_f64()),
                    };
                }
                format_numeric(total)
            }
            AggregateFunc::Set => non_empty
                .map(String::as_str)
                .collect::<BTreeSet<&str>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not(s: &str) -> String {
        UnaryOp::Not.process(s)
    }

    #[test]
    fn is_num() {
        assert_eq!(UnaryOp::IsNum.process(""), "0");
        assert_eq!(UnaryOp::IsNum.process("abc"), "0");
        assert_eq!(UnaryOp::IsNum.process("3"), "1");
        assert_eq!(UnaryOp::IsNum.process("3.5"), "1");
    }

    #[test]
    fn not_follows_truthiness() {
        assert_eq!(not(""), "1");
        assert_eq!(not("0"), "1");
        assert_eq!(not("0.0"), "1");
        assert_eq!(not("abc"), "0");
        assert_eq!(not("5"), "0");
        assert_eq!(not("false"), "0");
    }

    #[test]
    fn negate_and_number() {
        assert_eq!(UnaryOp::Negate.process("5"), "-5");
        assert_eq!(UnaryOp::Negate.process("-2.5"), "2.5");
        assert_eq!(UnaryOp::Negate.process("abc"), "NaN");
        assert_eq!(UnaryOp::Number.process("abc"), "NaN");
        assert_eq!(UnaryOp::Number.process("5"), "5");
        assert_eq!(UnaryOp::Number.process(" 7.0 "), "7");
    }

    #[test]
    fn double_negation_matches_number() {
        let inputs = [
            "0",
            "5",
            "-17",
            "3.5",
            "-0.25",
            "1e3",
            "9223372036854775807",
            "-9223372036854775808",
        ];
        for x in inputs {
            let twice = UnaryOp::Negate.process(&UnaryOp::Negate.process(x));
            let number = UnaryOp::Number.process(x);
            let a = parse_numeric(&twice).unwrap().as_f64();
            let b = parse_numeric(&number).unwrap().as_f64();
            assert_eq!(a, b, "double negation of {x}");
        }
    }

    #[test]
    fn comparisons_prefer_numbers() {
        assert_eq!(BinaryOp::Less.process("9", "10"), "1");
        assert_eq!(BinaryOp::Less.process("9", "10a"), "0");
        assert_eq!(BinaryOp::Equal.process("2", "2.0"), "1");
        assert_eq!(BinaryOp::NotEqual.process("a", "b"), "1");
        assert_eq!(BinaryOp::GreaterOrEqual.process("3", "3"), "1");
    }

    #[test]
    fn arithmetic_and_concatenation() {
        assert_eq!(BinaryOp::Plus.process("2", "3"), "5");
        assert_eq!(BinaryOp::Plus.process("2", "0.5"), "2.5");
        assert_eq!(BinaryOp::Plus.process("ab", "c"), "abc");
        assert_eq!(BinaryOp::Minus.process("ab", "1"), "NaN");
        assert_eq!(BinaryOp::Times.process("4", "-2"), "-8");
        assert_eq!(BinaryOp::Divided.process("1", "4"), "0.25");
        assert_eq!(BinaryOp::Divided.process("1", "0"), "NaN");
        assert_eq!(
            BinaryOp::Plus.process("9223372036854775807", "1"),
            format_float(9223372036854775807.0 + 1.0)
        );
    }

    #[test]
    fn logical_operators() {
        assert_eq!(BinaryOp::And.process("1", "yes"), "1");
        assert_eq!(BinaryOp::And.process("1", ""), "0");
        assert_eq!(BinaryOp::Or.process("0", "0.0"), "0");
        assert_eq!(BinaryOp::Or.process("", "x"), "1");
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn aggregates() {
        let values = strings(&["b", "", "a", "b"]);
        assert_eq!(AggregateFunc::Union.combine(&strings(&["x", "", "x"])), "x");
        assert_eq!(AggregateFunc::Union.combine(&values), MULTIPLE_VALUES);
        assert_eq!(AggregateFunc::Union.combine(&[]), "");
        assert_eq!(AggregateFunc::Set.combine(&values), "a;b");
        assert_eq!(AggregateFunc::Min.combine(&strings(&["10", "9"])), "9");
        assert_eq!(AggregateFunc::Max.combine(&strings(&["10", "9"])), "10");
        assert_eq!(AggregateFunc::Max.combine(&strings(&["10", "x"])), "x");
        assert_eq!(AggregateFunc::Sum.combine(&strings(&["1", "2.5"])), "3.5");
        assert_eq!(AggregateFunc::Sum.combine(&strings(&["1", ""])), "NaN");
        assert_eq!(AggregateFunc::Sum.combine(&[]), "0");
    }

    #[test]
    fn unary_keeps_first_child_and_reports_second() {
        let mut diagnostics = Diagnostics::new();
        let mut node = UnaryOperator::new(UnaryOp::Not, 3);
        node.add_statement(
            Statement::Evaluator(Evaluator::fixed("1")),
            "",
            &mut diagnostics,
        );
        node.add_statement(
            Statement::Evaluator(Evaluator::fixed("0")),
            "",
            &mut diagnostics,
        );
        node.add_statement(Statement::Other("print".into()), "", &mut diagnostics);

        assert_eq!(node.rhs.as_deref(), Some(&Evaluator::fixed("1")));
        assert_eq!(
            diagnostics.errors(),
            &[
                StaticError::TooManyEvaluators {
                    line: 3,
                    parent: "eval-not".into(),
                    expected: 1,
                },
                StaticError::UnexpectedSubstatement {
                    line: 3,
                    parent: "eval-not".into(),
                    child: "print".into(),
                },
            ]
        );
    }

    #[test]
    fn binary_fills_left_then_right() {
        let mut diagnostics = Diagnostics::new();
        let mut node = BinaryOperator::new(BinaryOp::Plus, 1);
        node.add_statement(Statement::Evaluator(Evaluator::fixed("1")), "", &mut diagnostics);
        node.add_statement(Statement::Evaluator(Evaluator::fixed("2")), "", &mut diagnostics);
        assert!(diagnostics.is_empty());
        assert_eq!(node.lhs.as_deref(), Some(&Evaluator::fixed("1")));
        assert_eq!(node.rhs.as_deref(), Some(&Evaluator::fixed("2")));
    }

    #[test]
    fn used_sets_aggregate_bottom_up() {
        let tree = Evaluator::binary(
            BinaryOp::And,
            Evaluator::unary(UnaryOp::IsNum, Evaluator::value("lanes")),
            Evaluator::Aggregate {
                func: AggregateFunc::Union,
                set: "a".into(),
                value: Some(Box::new(Evaluator::binary(
                    BinaryOp::Plus,
                    Evaluator::value("name"),
                    Evaluator::SetCount {
                        set: "b".into(),
                        kind: None,
                    },
                ))),
            },
        );
        let (sets, usage) = tree.used_sets();
        assert_eq!(usage, Usage::Tags);
        assert_eq!(
            sets,
            vec![SetUsage::new("a", Usage::Tags), SetUsage::new("b", Usage::Skeleton)]
        );
        assert_eq!(
            tree.used_tags(),
            TagKeys::Keys(BTreeSet::from(["lanes".to_string(), "name".to_string()]))
        );
    }

    #[test]
    fn childless_unary_reports_no_dependencies() {
        let node = Evaluator::Unary(UnaryOperator::new(UnaryOp::Not, 0));
        assert_eq!(node.used_sets(), (Vec::new(), Usage::None));
        assert_eq!(node.used_tags(), TagKeys::default());
    }

    #[test]
    fn key_value_degrades_to_all_tags() {
        let node = Evaluator::unary(UnaryOp::Number, Evaluator::KeyValue);
        assert_eq!(node.used_tags(), TagKeys::All);
    }
}
