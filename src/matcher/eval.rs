//! Matcher interpretation against a binding environment.
//!
//! The evaluator walks a parsed [`Expr`] with the request tuple bound under
//! its request key (`r`, `r2`, …) and the candidate rule bound under its
//! policy key (`p`, `p2`, …). Identifier resolution is positional: `r.obj`
//! reads the request slot at the index of `obj` in the request definition.
//!
//! Type coercion follows one rule: comparisons compare numerically when
//! both operands parse as integers, otherwise both sides are coerced to
//! strings. Equality additionally understands booleans and whole JSON
//! attribute values.

use std::collections::HashMap;

use serde_json::Value as Json;

use super::ast::{CmpOp, Expr, Ident};
use super::functions::FunctionMap;
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Values
// ─────────────────────────────────────────────────────────────────────────────

/// A runtime value flowing through matcher evaluation.
///
/// Request slots are usually plain strings; ABAC models pass structured
/// attribute objects instead and address into them with `r.sub.age`-style
/// paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A string value (the common case for request and policy fields)
    String(String),
    /// An integer value
    Int(i64),
    /// A boolean value
    Bool(bool),
    /// A structured attribute value (ABAC)
    Json(Json),
}

impl Value {
    /// Numeric view, when the value is or parses as an integer.
    fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            Self::Json(Json::Number(n)) => n.as_i64(),
            Self::Json(Json::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view, for logical operators.
    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Json(Json::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// String coercion used by comparisons and builtin functions.
    ///
    /// Whole JSON objects and arrays do not coerce.
    pub(crate) fn coerce_str(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Json(Json::String(s)) => Some(s.clone()),
            Self::Json(Json::Number(n)) => Some(n.to_string()),
            Self::Json(Json::Bool(b)) => Some(b.to_string()),
            Self::Json(_) => None,
        }
    }

    /// Convert a JSON leaf into its native value form.
    fn from_json(json: &Json) -> Self {
        match json {
            Json::String(s) => Self::String(s.clone()),
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) if n.is_i64() => Self::Int(n.as_i64().unwrap_or_default()),
            other => Self::Json(other.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Self::Json(json)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Binding environment
// ─────────────────────────────────────────────────────────────────────────────

/// One bound tuple: definition tokens plus the values they index into.
#[derive(Debug, Clone, Copy)]
pub struct Tuple<'a> {
    /// Field names from the model definition, in order
    pub tokens: &'a [String],
    /// Bound values; may be longer than `tokens` (extras are ignored)
    pub values: &'a [Value],
}

/// Role-graph lookup used to resolve `g`-family calls during evaluation.
///
/// Implemented by the enforcer over its per-grouping-type role managers.
pub trait LinkQuery {
    /// Answer `has_link` for the grouping type `gtype`, or `None` when the
    /// name is not a known grouping type.
    fn query_link(&self, gtype: &str, user: &str, role: &str, domain: Option<&str>)
    -> Option<bool>;
}

/// Evaluation environment for one matcher run.
pub struct EvalContext<'a> {
    tuples: HashMap<&'a str, Tuple<'a>>,
    functions: &'a FunctionMap,
    links: Option<&'a dyn LinkQuery>,
}

impl<'a> EvalContext<'a> {
    /// Create an environment with the given function table.
    pub fn new(functions: &'a FunctionMap) -> Self {
        Self {
            tuples: HashMap::new(),
            functions,
            links: None,
        }
    }

    /// Bind a tuple under its definition key (`r`, `p`, `r2`, …).
    pub fn bind(&mut self, key: &'a str, tokens: &'a [String], values: &'a [Value]) -> &mut Self {
        self.tuples.insert(key, Tuple { tokens, values });
        self
    }

    /// Attach a role-graph lookup for `g`-family calls.
    pub fn with_links(&mut self, links: &'a dyn LinkQuery) -> &mut Self {
        self.links = Some(links);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interpreter
// ─────────────────────────────────────────────────────────────────────────────

/// Evaluate a matcher expression to a boolean.
///
/// # Errors
///
/// Returns [`Error::MatcherRuntime`] when the expression evaluates to a
/// non-boolean, references an unknown tuple/field/function, or applies an
/// operator to incompatible operands.
pub fn eval_bool(expr: &Expr, ctx: &EvalContext<'_>) -> Result<bool> {
    match eval(expr, ctx)? {
        Value::Bool(b) => Ok(b),
        other => Err(Error::matcher_runtime(format!(
            "matcher must evaluate to a boolean, got {other:?}"
        ))),
    }
}

/// Evaluate a matcher expression to a [`Value`].
pub fn eval(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value> {
    match expr {
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Ident(ident) => resolve(ident, ctx),
        Expr::Not(inner) => {
            let value = eval(inner, ctx)?;
            let b = value
                .as_bool()
                .ok_or_else(|| Error::matcher_runtime("`!` applied to a non-boolean"))?;
            Ok(Value::Bool(!b))
        }
        Expr::And(lhs, rhs) => {
            if !operand_bool(lhs, ctx, "&&")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(operand_bool(rhs, ctx, "&&")?))
        }
        Expr::Or(lhs, rhs) => {
            if operand_bool(lhs, ctx, "||")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(operand_bool(rhs, ctx, "||")?))
        }
        Expr::Cmp { op, lhs, rhs } => {
            let a = eval(lhs, ctx)?;
            let b = eval(rhs, ctx)?;
            compare(*op, &a, &b).map(Value::Bool)
        }
        Expr::Call { name, args } => call(name, args, ctx),
    }
}

fn operand_bool(expr: &Expr, ctx: &EvalContext<'_>, op: &str) -> Result<bool> {
    eval(expr, ctx)?
        .as_bool()
        .ok_or_else(|| Error::matcher_runtime(format!("`{op}` applied to a non-boolean operand")))
}

fn resolve(ident: &Ident, ctx: &EvalContext<'_>) -> Result<Value> {
    let tuple = ctx.tuples.get(ident.base.as_str()).ok_or_else(|| {
        Error::matcher_runtime(format!("unknown tuple `{}` in `{ident}`", ident.base))
    })?;

    let field = ident.path.first().ok_or_else(|| {
        Error::matcher_runtime(format!("bare identifier `{}`", ident.base))
    })?;
    let idx = tuple
        .tokens
        .iter()
        .position(|t| t == field)
        .ok_or_else(|| {
            Error::matcher_runtime(format!("`{}` has no field `{field}`", ident.base))
        })?;
    let mut value = tuple.values.get(idx).cloned().ok_or_else(|| {
        Error::matcher_runtime(format!("no value bound for `{}.{field}`", ident.base))
    })?;

    // Remaining segments address into a JSON attribute object.
    for seg in &ident.path[1..] {
        let Value::Json(json) = &value else {
            return Err(Error::matcher_runtime(format!(
                "`{ident}`: `{seg}` addresses into a non-object value"
            )));
        };
        let inner = json.get(seg).ok_or_else(|| {
            Error::matcher_runtime(format!("`{ident}`: attribute `{seg}` not present"))
        })?;
        value = Value::from_json(inner);
    }

    Ok(value)
}

fn call(name: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval(arg, ctx)?);
    }

    // Registered functions win, so hosts can override any builtin.
    if let Some(f) = ctx.functions.get(name) {
        return f(&values);
    }

    // `g`-family calls route to the role manager of the matching gtype.
    if let Some(links) = ctx.links {
        if let Some(result) = query_g(links, name, &values)? {
            return Ok(Value::Bool(result));
        }
    }

    Err(Error::matcher_runtime(format!("unknown function `{name}`")))
}

fn query_g(links: &dyn LinkQuery, name: &str, args: &[Value]) -> Result<Option<bool>> {
    // Probe with placeholder arguments first so a bad arity on a known
    // gtype reports as an arity error, not "unknown function".
    if links.query_link(name, "", "", None).is_none() {
        return Ok(None);
    }
    let as_str = |v: &Value, pos: usize| {
        v.coerce_str().ok_or_else(|| {
            Error::matcher_runtime(format!("`{name}`: argument {pos} is not a string"))
        })
    };
    match args {
        [user, role] => {
            let answer = links.query_link(name, &as_str(user, 1)?, &as_str(role, 2)?, None);
            Ok(Some(answer.unwrap_or(false)))
        }
        [user, role, domain] => {
            let answer = links.query_link(
                name,
                &as_str(user, 1)?,
                &as_str(role, 2)?,
                Some(&as_str(domain, 3)?),
            );
            Ok(Some(answer.unwrap_or(false)))
        }
        _ => Err(Error::matcher_runtime(format!(
            "`{name}` takes 2 or 3 arguments, got {}",
            args.len()
        ))),
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool> {
    // Numeric comparison when both sides parse as integers.
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return Ok(match op {
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
            CmpOp::Lt => x < y,
            CmpOp::Le => x <= y,
            CmpOp::Gt => x > y,
            CmpOp::Ge => x >= y,
        });
    }

    // Structural equality for whole JSON attribute values.
    if let (Value::Json(x), Value::Json(y)) = (a, b) {
        return match op {
            CmpOp::Eq => Ok(x == y),
            CmpOp::Ne => Ok(x != y),
            _ => Err(Error::matcher_runtime(
                "ordering comparison on structured values",
            )),
        };
    }

    let (Some(x), Some(y)) = (a.coerce_str(), b.coerce_str()) else {
        return Err(Error::matcher_runtime(format!(
            "cannot compare {a:?} {op} {b:?}"
        )));
    };
    Ok(match op {
        CmpOp::Eq => x == y,
        CmpOp::Ne => x != y,
        CmpOp::Lt => x < y,
        CmpOp::Le => x <= y,
        CmpOp::Gt => x > y,
        CmpOp::Ge => x >= y,
    })
}
