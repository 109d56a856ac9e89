//! Policy-effect aggregation.
//!
//! Each candidate rule contributes a `(matched, eft)` pair; the effect
//! expression folds the stream of pairs into the final decision. The
//! recognized expressions form a closed set; anything else is rejected at
//! model load with [`Error::UnsupportedEffect`].
//!
//! [`EffectStream`] aggregates incrementally so the pipeline can stop as
//! soon as the decision is final: the first allow-match decides
//! allow-override, the first deny-match decides deny-override, the first
//! match of any kind decides priority.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Per-rule effect marker.
///
/// Rules without an `eft` field count as [`Eft::Allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eft {
    /// The rule grants access when matched
    #[default]
    Allow,
    /// The rule forbids access when matched
    Deny,
}

impl FromStr for Eft {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(Error::ModelSyntax(format!(
                "effect field must be `allow` or `deny`, got `{other}`"
            ))),
        }
    }
}

/// Recognized effect expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyEffect {
    /// `some(where (p.eft == allow))`
    AllowOverride,
    /// `!some(where (p.eft == deny))`
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDeny,
    /// `priority(p.eft) || deny`
    Priority,
}

impl PolicyEffect {
    /// Decision when the candidate rule list is empty.
    ///
    /// Effects that require at least one allow-match deny outright; pure
    /// deny-override allows, since nothing can have matched with deny.
    #[must_use]
    pub fn decision_on_no_rules(self) -> bool {
        matches!(self, Self::DenyOverride)
    }
}

impl FromStr for PolicyEffect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        match normalized.as_str() {
            "some(where(p.eft==allow))" => Ok(Self::AllowOverride),
            "!some(where(p.eft==deny))" => Ok(Self::DenyOverride),
            "some(where(p.eft==allow))&&!some(where(p.eft==deny))" => Ok(Self::AllowAndDeny),
            "priority(p.eft)||deny" => Ok(Self::Priority),
            _ => Err(Error::UnsupportedEffect(s.to_string())),
        }
    }
}

impl fmt::Display for PolicyEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AllowOverride => "some(where (p.eft == allow))",
            Self::DenyOverride => "!some(where (p.eft == deny))",
            Self::AllowAndDeny => "some(where (p.eft == allow)) && !some(where (p.eft == deny))",
            Self::Priority => "priority(p.eft) || deny",
        };
        f.write_str(s)
    }
}

/// Incremental effect aggregator for one enforce call.
///
/// Feed `(matched, eft)` outcomes in policy order via [`EffectStream::push`];
/// a `Some` return means the decision is final and iteration may stop.
/// [`EffectStream::conclude`] settles the remaining cases.
#[derive(Debug)]
pub struct EffectStream {
    kind: PolicyEffect,
    decided: Option<bool>,
    has_allow: bool,
    matched_allows: Vec<usize>,
    explanation: Vec<usize>,
}

impl EffectStream {
    /// Start aggregation under the given effect expression.
    #[must_use]
    pub fn new(kind: PolicyEffect) -> Self {
        Self {
            kind,
            decided: None,
            has_allow: false,
            matched_allows: Vec::new(),
            explanation: Vec::new(),
        }
    }

    /// Record the outcome for the rule at `idx`.
    ///
    /// Returns `Some(decision)` once the decision cannot change anymore.
    pub fn push(&mut self, idx: usize, matched: bool, eft: Eft) -> Option<bool> {
        if self.decided.is_some() {
            return self.decided;
        }
        if !matched {
            return None;
        }
        match (self.kind, eft) {
            (PolicyEffect::AllowOverride, Eft::Allow) => {
                self.explanation.push(idx);
                self.decided = Some(true);
            }
            (PolicyEffect::AllowOverride, Eft::Deny) => {}
            (PolicyEffect::DenyOverride | PolicyEffect::AllowAndDeny, Eft::Deny) => {
                self.explanation.push(idx);
                self.decided = Some(false);
            }
            (PolicyEffect::DenyOverride | PolicyEffect::AllowAndDeny, Eft::Allow) => {
                self.has_allow = true;
                self.matched_allows.push(idx);
            }
            // First match wins; ties in policy order break earlier-in-list.
            (PolicyEffect::Priority, eft) => {
                self.explanation.push(idx);
                self.decided = Some(eft == Eft::Allow);
            }
        }
        self.decided
    }

    /// Settle the decision after the last rule.
    ///
    /// Returns the decision plus the indices of the rules that contributed
    /// to it: the matched allow subset for allow-based effects, the single
    /// deciding rule for deny and priority outcomes.
    #[must_use]
    pub fn conclude(self) -> (bool, Vec<usize>) {
        if let Some(decision) = self.decided {
            return (decision, self.explanation);
        }
        match self.kind {
            PolicyEffect::AllowOverride | PolicyEffect::Priority => (false, Vec::new()),
            PolicyEffect::DenyOverride => (true, self.matched_allows),
            PolicyEffect::AllowAndDeny => {
                if self.has_allow {
                    (true, self.matched_allows)
                } else {
                    (false, Vec::new())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Recognition ───────────────────────────────────────────────────

    #[test]
    fn recognizes_the_closed_set() {
        assert_eq!(
            "some(where (p.eft == allow))".parse::<PolicyEffect>().unwrap(),
            PolicyEffect::AllowOverride
        );
        assert_eq!(
            "!some(where (p.eft == deny))".parse::<PolicyEffect>().unwrap(),
            PolicyEffect::DenyOverride
        );
        assert_eq!(
            "some(where (p.eft == allow)) && !some(where (p.eft == deny))"
                .parse::<PolicyEffect>()
                .unwrap(),
            PolicyEffect::AllowAndDeny
        );
        assert_eq!(
            "priority(p.eft) || deny".parse::<PolicyEffect>().unwrap(),
            PolicyEffect::Priority
        );
    }

    #[test]
    fn recognition_ignores_spacing() {
        assert_eq!(
            "some(where(p.eft==allow))".parse::<PolicyEffect>().unwrap(),
            PolicyEffect::AllowOverride
        );
    }

    #[test]
    fn unknown_expression_is_rejected() {
        let err = "most(where (p.eft == allow))".parse::<PolicyEffect>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedEffect(_)));
    }

    // ── Aggregation laws ──────────────────────────────────────────────

    #[test]
    fn allow_override_stops_on_first_allow() {
        let mut stream = EffectStream::new(PolicyEffect::AllowOverride);
        assert_eq!(stream.push(0, false, Eft::Allow), None);
        assert_eq!(stream.push(1, true, Eft::Deny), None);
        assert_eq!(stream.push(2, true, Eft::Allow), Some(true));
        let (decision, explanation) = stream.conclude();
        assert!(decision);
        assert_eq!(explanation, vec![2]);
    }

    #[test]
    fn allow_override_denies_without_allow_match() {
        let mut stream = EffectStream::new(PolicyEffect::AllowOverride);
        stream.push(0, false, Eft::Allow);
        let (decision, explanation) = stream.conclude();
        assert!(!decision);
        assert!(explanation.is_empty());
    }

    #[test]
    fn deny_override_stops_on_first_deny() {
        let mut stream = EffectStream::new(PolicyEffect::DenyOverride);
        assert_eq!(stream.push(0, true, Eft::Allow), None);
        assert_eq!(stream.push(1, true, Eft::Deny), Some(false));
        let (decision, explanation) = stream.conclude();
        assert!(!decision);
        assert_eq!(explanation, vec![1]);
    }

    #[test]
    fn deny_override_allows_when_no_deny_matches() {
        let mut stream = EffectStream::new(PolicyEffect::DenyOverride);
        stream.push(0, true, Eft::Allow);
        stream.push(1, false, Eft::Deny);
        let (decision, explanation) = stream.conclude();
        assert!(decision);
        assert_eq!(explanation, vec![0]);
    }

    #[test]
    fn allow_and_deny_requires_allow_and_no_deny() {
        let mut stream = EffectStream::new(PolicyEffect::AllowAndDeny);
        stream.push(0, true, Eft::Allow);
        let (decision, explanation) = stream.conclude();
        assert!(decision);
        assert_eq!(explanation, vec![0]);

        let mut stream = EffectStream::new(PolicyEffect::AllowAndDeny);
        stream.push(0, true, Eft::Allow);
        assert_eq!(stream.push(1, true, Eft::Deny), Some(false));
        let (decision, _) = stream.conclude();
        assert!(!decision);

        let stream = EffectStream::new(PolicyEffect::AllowAndDeny);
        let (decision, _) = stream.conclude();
        assert!(!decision);
    }

    #[test]
    fn priority_first_match_wins() {
        let mut stream = EffectStream::new(PolicyEffect::Priority);
        assert_eq!(stream.push(0, false, Eft::Deny), None);
        assert_eq!(stream.push(1, true, Eft::Deny), Some(false));
        let (decision, explanation) = stream.conclude();
        assert!(!decision);
        assert_eq!(explanation, vec![1]);
    }

    #[test]
    fn priority_defaults_to_deny() {
        let stream = EffectStream::new(PolicyEffect::Priority);
        let (decision, explanation) = stream.conclude();
        assert!(!decision);
        assert!(explanation.is_empty());
    }

    #[test]
    fn empty_rule_list_decisions() {
        assert!(!PolicyEffect::AllowOverride.decision_on_no_rules());
        assert!(PolicyEffect::DenyOverride.decision_on_no_rules());
        assert!(!PolicyEffect::AllowAndDeny.decision_on_no_rules());
        assert!(!PolicyEffect::Priority.decision_on_no_rules());
    }
}
