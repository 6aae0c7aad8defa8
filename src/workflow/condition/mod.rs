// SPDX-License-Identifier: MIT

//! Condition expressions for edge routing
//!
//! Edges with condition type `expression` carry a small boolean language
//! evaluated against execution state:
//! - `intent == 'refund'`
//! - `order.total > 100`
//! - `tags contains 'vip' and not (status == 'closed')`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::{parse, ConditionParseError};
