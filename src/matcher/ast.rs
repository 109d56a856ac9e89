//! Matcher expression AST.
//!
//! A matcher is parsed once (at model load, or on first use for ad-hoc
//! matcher text) into this tree and then interpreted per candidate rule.
//! Keeping the tree instead of re-splitting strings is what makes nested
//! parentheses behave: `a && (b || c)` never splits at the inner `||`.

use std::fmt;

/// A parsed matcher expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String literal (`"read"` or `'read'`)
    Str(String),
    /// Integer literal
    Int(i64),
    /// Boolean literal (`true` / `false`)
    Bool(bool),
    /// Dotted identifier such as `r.sub` or `r.sub.age`
    Ident(Ident),
    /// Logical negation
    Not(Box<Expr>),
    /// Comparison between two operands
    Cmp {
        /// The comparison operator
        op: CmpOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Logical conjunction
    And(Box<Expr>, Box<Expr>),
    /// Logical disjunction
    Or(Box<Expr>, Box<Expr>),
    /// Function call, e.g. `keyMatch(r.obj, p.obj)` or `g(r.sub, p.sub)`
    Call {
        /// Function name as written in the matcher
        name: String,
        /// Argument expressions, in call order
        args: Vec<Expr>,
    },
}

/// A dotted identifier.
///
/// `base` is the tuple key (`r`, `p`, `r2`, …), the first path segment
/// selects the tuple field, and any further segments index into a JSON
/// attribute value (ABAC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    /// Tuple key (`r`, `p`, `r2`, …)
    pub base: String,
    /// Field name followed by optional JSON attribute path
    pub path: Vec<String>,
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for seg in &self.path {
            write!(f, ".{seg}")?;
        }
        Ok(())
    }
}

/// Comparison operators recognized in matcher expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(s)
    }
}
