//! Error types for warden

use std::io;

use thiserror::Error;

/// Result type alias for warden
pub type Result<T> = std::result::Result<T, Error>;

/// Warden errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed model text or unknown section
    #[error("Model syntax error: {0}")]
    ModelSyntax(String),

    /// Unparseable matcher expression
    #[error("Matcher syntax error in `{text}`: {reason}")]
    MatcherSyntax {
        /// The matcher text that failed to parse
        text: String,
        /// What went wrong
        reason: String,
    },

    /// Matcher evaluation error (unknown function, bad arity, type mismatch)
    #[error("Matcher runtime error: {0}")]
    MatcherRuntime(String),

    /// Effect expression not in the recognized set
    #[error("Unsupported effect expression: {0}")]
    UnsupportedEffect(String),

    /// Rule length does not match the policy definition
    #[error("Rule has {found} fields but `{ptype}` is defined with {expected}")]
    ArityMismatch {
        /// Policy or grouping type the rule was addressed to
        ptype: String,
        /// Field count the definition requires
        expected: usize,
        /// Field count the rule carried
        found: usize,
    },

    /// Rule is already present in the addressed table
    #[error("Rule already exists: [{}]", .0.join(", "))]
    AlreadyExists(Vec<String>),

    /// Rule is absent from the addressed table
    #[error("Rule not found: [{}]", .0.join(", "))]
    NotFound(Vec<String>),

    /// Paired-list operation with unequal sizes
    #[error("Paired lists have mismatched lengths: {left} vs {right}")]
    LengthMismatch {
        /// Length of the first list
        left: usize,
        /// Length of the second list
        right: usize,
    },

    /// Save attempted while the policy store holds a filtered subset
    #[error("Cannot save back a filtered policy set")]
    CannotSaveFiltered,

    /// Optional adapter operation not implemented
    #[error("Operation not supported by this adapter: {0}")]
    UnsupportedByAdapter(&'static str),

    /// Underlying adapter failure
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Watcher notification or callback failure
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a matcher syntax error
    pub fn matcher_syntax(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MatcherSyntax {
            text: text.into(),
            reason: reason.into(),
        }
    }

    /// Create a matcher runtime error
    pub fn matcher_runtime(reason: impl Into<String>) -> Self {
        Self::MatcherRuntime(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_rule_context() {
        let err = Error::AlreadyExists(vec!["alice".into(), "data1".into(), "read".into()]);
        assert_eq!(err.to_string(), "Rule already exists: [alice, data1, read]");
    }

    #[test]
    fn display_carries_arity_context() {
        let err = Error::ArityMismatch {
            ptype: "p".into(),
            expected: 3,
            found: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("`p`"));
        assert!(msg.contains('3'));
        assert!(msg.contains('2'));
    }
}
