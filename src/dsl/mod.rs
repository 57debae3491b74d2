//! Text syntax for filter statements and evaluator expressions.
//!
//! Syntax:
//!   "text", 'text', 12, 1.5   - literal
//!   t["key"]                  - first value of a tag
//!   is_tag("key")             - "1" if the tag exists
//!   ::                        - value of the key being evaluated
//!   id(), type()              - element id and type name
//!   number(e), is_number(e)   - numeric conversion and test
//!   !e, -e                    - NOT, negation
//!   * / + - < <= > >= == != && ||
//!                             - binary operators, tightest first
//!   s.count(nodes)            - element count of set s (count() for all kinds)
//!   s.u(e) s.min(e) s.max(e) s.sum(e) s.set(e)
//!                             - e aggregated over set s (bare form uses _)
//!   .from(if: e)->.into       - filter statement; from/into default to _
//!
//! Nesting is limited to 128 levels.

mod lexer;
mod parser;

pub use parser::parse_filter;
