//! Matcher expressions: parsing, evaluation, and builtin functions.
//!
//! A matcher is a boolean expression over request fields (`r.*`), policy
//! fields (`p.*`), literals, and registered functions. Model load compiles
//! each matcher to an AST once; enforcement interprets that AST per
//! candidate rule.

pub mod ast;
pub mod eval;
pub mod functions;
mod parse;

pub use ast::{CmpOp, Expr, Ident};
pub use eval::{EvalContext, LinkQuery, Value, eval, eval_bool};
pub use functions::{FunctionMap, MatcherFunction};

use crate::error::Result;

/// Compile matcher text into an [`Expr`].
///
/// # Errors
///
/// Returns [`crate::Error::MatcherSyntax`] when the text does not parse.
pub fn compile(text: &str) -> Result<Expr> {
    parse::parse(text)
}
