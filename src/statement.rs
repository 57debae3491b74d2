//! Tree-construction protocol: statements handed to a parent, and the
//! static errors reported while attaching them.

use thiserror::Error;

use crate::eval::Evaluator;

/// A parsed statement offered to a parent via `add_statement`.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Evaluator(Evaluator),
    /// Any statement that is not an evaluator, by name (e.g. `print`).
    #[allow(dead_code)]
    Other(String),
}

/// Configuration errors found while building a tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StaticError {
    #[error("line {line}: {parent} cannot have a {child} substatement")]
    UnexpectedSubstatement {
        line: u32,
        parent: String,
        child: String,
    },

    #[error("line {line}: {parent} must have exactly {expected} evaluator substatement(s)")]
    TooManyEvaluators {
        line: u32,
        parent: String,
        expected: usize,
    },

    #[error("line {line}: a filter statement can have at most one criterion")]
    DuplicateCriterion { line: u32 },
}

/// Collects static errors. Reporting never aborts construction.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<StaticError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, error: StaticError) {
        tracing::warn!("Static error: {}", error);
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[StaticError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
