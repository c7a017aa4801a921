// SPDX-License-Identifier: MIT

//! Condition evaluation for graph workflows
//!
//! This module provides parsing and evaluation of `when` conditions used by
//! conditional edges. Conditions are simple expressions like:
//! - `intent == 'search'`
//! - `count < 5`
//! - `intent == 'bug' and (priority > 3 or not assigned == true)`

mod ast;
mod evaluator;
mod parser;
mod router;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::parse;
pub use router::{ConditionRouter, FieldRouter, UNMATCHED};

use thiserror::Error;

/// Errors raised while parsing a condition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,

    #[error("unexpected '{token}' in condition: {input}")]
    Unexpected { token: String, input: String },

    #[error("condition ends too early: {0}")]
    UnexpectedEnd(String),

    #[error("unterminated string in condition: {0}")]
    UnterminatedString(String),

    #[error("invalid number '{0}' in condition")]
    InvalidNumber(String),
}
