//! Model configuration: the INI-like text that declares request/policy
//! shapes, role relations, the effect expression, and matcher expressions.
//!
//! A [`Model`] is parsed once and immutable afterwards; swapping models
//! means building a new enforcer. Matchers are compiled to ASTs and the
//! effect expression is recognized here, so enforcement never re-parses
//! text.
//!
//! # Grammar
//!
//! ```text
//! [request_definition]
//! r = sub, obj, act
//! [policy_definition]
//! p = sub, obj, act
//! [role_definition]
//! g = _, _
//! [policy_effect]
//! e = some(where (p.eft == allow))
//! [matchers]
//! m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
//! ```
//!
//! Blank lines and lines starting with `#` are ignored; keys and values are
//! trimmed. The five section names above are the only ones recognized.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::effect::PolicyEffect;
use crate::error::{Error, Result};
use crate::matcher::{self, Expr};

/// Reserved token naming the per-rule effect field.
pub const EFT_TOKEN: &str = "eft";

/// A policy-type definition: ordered field tokens plus the position of the
/// optional trailing `eft` field.
#[derive(Debug, Clone)]
pub struct PolicyDef {
    tokens: Vec<String>,
    eft_index: Option<usize>,
}

impl PolicyDef {
    /// Field tokens in declaration order (including `eft` when declared).
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Index of the `eft` field, when the definition declares one.
    #[must_use]
    pub fn eft_index(&self) -> Option<usize> {
        self.eft_index
    }

    /// Number of fields a rule of this type must carry.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.tokens.len()
    }
}

/// A compiled matcher: original text plus its shared AST.
#[derive(Debug, Clone)]
pub struct Matcher {
    text: String,
    expr: Arc<Expr>,
}

impl Matcher {
    /// The matcher text as written in the model.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The compiled expression.
    #[must_use]
    pub fn expr(&self) -> &Arc<Expr> {
        &self.expr
    }
}

/// Parsed model configuration.
#[derive(Debug, Clone)]
pub struct Model {
    request_definitions: HashMap<String, Vec<String>>,
    policy_definitions: HashMap<String, PolicyDef>,
    role_definitions: BTreeMap<String, usize>,
    effects: HashMap<String, PolicyEffect>,
    matchers: HashMap<String, Matcher>,
}

impl Model {
    /// Load and parse a model file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        text.parse()
    }

    /// Request tokens declared under `rtype` (usually `"r"`).
    #[must_use]
    pub fn request_tokens(&self, rtype: &str) -> Option<&[String]> {
        self.request_definitions.get(rtype).map(Vec::as_slice)
    }

    /// Policy definition for `ptype` (usually `"p"`).
    #[must_use]
    pub fn policy_def(&self, ptype: &str) -> Option<&PolicyDef> {
        self.policy_definitions.get(ptype)
    }

    /// Arity (2 or 3) of the grouping type `gtype`, when declared.
    #[must_use]
    pub fn role_arity(&self, gtype: &str) -> Option<usize> {
        self.role_definitions.get(gtype).copied()
    }

    /// Declared grouping types, in sorted order.
    pub fn grouping_types(&self) -> impl Iterator<Item = &str> {
        self.role_definitions.keys().map(String::as_str)
    }

    /// Effect expression registered under `etype` (usually `"e"`).
    #[must_use]
    pub fn effect(&self, etype: &str) -> Option<PolicyEffect> {
        self.effects.get(etype).copied()
    }

    /// Compiled matcher registered under `mtype` (usually `"m"`).
    #[must_use]
    pub fn matcher(&self, mtype: &str) -> Option<&Matcher> {
        self.matchers.get(mtype)
    }

    /// Declared policy types, in unspecified order.
    pub fn policy_types(&self) -> impl Iterator<Item = &str> {
        self.policy_definitions.keys().map(String::as_str)
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut model = Self {
            request_definitions: HashMap::new(),
            policy_definitions: HashMap::new(),
            role_definitions: BTreeMap::new(),
            effects: HashMap::new(),
            matchers: HashMap::new(),
        };

        let mut section: Option<Section> = None;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| {
                    Error::ModelSyntax(format!("line {}: malformed section header", lineno + 1))
                })?;
                section = Some(name.trim().parse()?);
                continue;
            }
            let Some(section) = section else {
                return Err(Error::ModelSyntax(format!(
                    "line {}: assignment outside any section",
                    lineno + 1
                )));
            };
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::ModelSyntax(format!(
                    "line {}: expected `key = value`",
                    lineno + 1
                )));
            };
            model.assign(section, key.trim(), value.trim())?;
        }

        model.validate()?;
        Ok(model)
    }
}

impl Model {
    fn assign(&mut self, section: Section, key: &str, value: &str) -> Result<()> {
        match section {
            Section::RequestDefinition => {
                check_key(key, 'r', "request_definition")?;
                self.request_definitions
                    .insert(key.to_string(), split_tokens(key, value)?);
            }
            Section::PolicyDefinition => {
                check_key(key, 'p', "policy_definition")?;
                let tokens = split_tokens(key, value)?;
                let eft_index = tokens.iter().position(|t| t == EFT_TOKEN);
                if let Some(idx) = eft_index {
                    if idx + 1 != tokens.len() {
                        return Err(Error::ModelSyntax(format!(
                            "`{key}`: `{EFT_TOKEN}` must be the last field"
                        )));
                    }
                }
                self.policy_definitions
                    .insert(key.to_string(), PolicyDef { tokens, eft_index });
            }
            Section::RoleDefinition => {
                check_key(key, 'g', "role_definition")?;
                let tokens = split_tokens(key, value)?;
                if !(2..=3).contains(&tokens.len()) || tokens.iter().any(|t| t != "_") {
                    return Err(Error::ModelSyntax(format!(
                        "`{key}`: role definition must be `_, _` or `_, _, _`"
                    )));
                }
                self.role_definitions.insert(key.to_string(), tokens.len());
            }
            Section::PolicyEffect => {
                check_key(key, 'e', "policy_effect")?;
                self.effects.insert(key.to_string(), value.parse()?);
            }
            Section::Matchers => {
                check_key(key, 'm', "matchers")?;
                let expr = matcher::compile(value)?;
                self.matchers.insert(
                    key.to_string(),
                    Matcher {
                        text: value.to_string(),
                        expr: Arc::new(expr),
                    },
                );
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.request_definitions.is_empty() {
            return Err(Error::ModelSyntax("missing [request_definition]".into()));
        }
        if self.policy_definitions.is_empty() {
            return Err(Error::ModelSyntax("missing [policy_definition]".into()));
        }
        if self.effects.is_empty() {
            return Err(Error::ModelSyntax("missing [policy_effect]".into()));
        }
        if self.matchers.is_empty() {
            return Err(Error::ModelSyntax("missing [matchers]".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Section {
    RequestDefinition,
    PolicyDefinition,
    RoleDefinition,
    PolicyEffect,
    Matchers,
}

impl FromStr for Section {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "request_definition" => Ok(Self::RequestDefinition),
            "policy_definition" => Ok(Self::PolicyDefinition),
            "role_definition" => Ok(Self::RoleDefinition),
            "policy_effect" => Ok(Self::PolicyEffect),
            "matchers" => Ok(Self::Matchers),
            other => Err(Error::ModelSyntax(format!("unknown section `[{other}]`"))),
        }
    }
}

/// Keys are a single prefix letter plus an optional numeric suffix
/// (`p`, `p2`, `g3`, …).
fn check_key(key: &str, prefix: char, section: &str) -> Result<()> {
    let mut chars = key.chars();
    let valid = chars.next() == Some(prefix) && chars.all(|c| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(Error::ModelSyntax(format!(
            "invalid key `{key}` in [{section}] (expected `{prefix}`, `{prefix}2`, …)"
        )))
    }
}

fn split_tokens(key: &str, value: &str) -> Result<Vec<String>> {
    let tokens: Vec<String> = value.split(',').map(|t| t.trim().to_string()).collect();
    if tokens.iter().any(String::is_empty) {
        return Err(Error::ModelSyntax(format!("`{key}`: empty field token")));
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
";

    const RBAC_WITH_DOMAINS: &str = r"
[request_definition]
r = sub, dom, obj, act

[policy_definition]
p = sub, dom, obj, act

[role_definition]
g = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub, r.dom) && r.dom == p.dom && r.obj == p.obj && r.act == p.act
";

    // ── Parsing ───────────────────────────────────────────────────────

    #[test]
    fn parses_basic_model() {
        let model: Model = BASIC.parse().unwrap();
        assert_eq!(
            model.request_tokens("r").unwrap(),
            &["sub".to_string(), "obj".to_string(), "act".to_string()]
        );
        let def = model.policy_def("p").unwrap();
        assert_eq!(def.arity(), 3);
        assert_eq!(def.eft_index(), None);
        assert_eq!(model.effect("e"), Some(PolicyEffect::AllowOverride));
        assert!(model.matcher("m").is_some());
        assert_eq!(model.grouping_types().count(), 0);
    }

    #[test]
    fn parses_domain_model() {
        let model: Model = RBAC_WITH_DOMAINS.parse().unwrap();
        assert_eq!(model.role_arity("g"), Some(3));
        assert_eq!(model.request_tokens("r").unwrap().len(), 4);
    }

    #[test]
    fn parses_eft_field_and_comments() {
        let text = r"
# effect-carrying policy
[request_definition]
r = sub, obj, act
[policy_definition]
p = sub, obj, act, eft
[policy_effect]
e = !some(where (p.eft == deny))
[matchers]
m = r.sub == p.sub
";
        let model: Model = text.parse().unwrap();
        assert_eq!(model.policy_def("p").unwrap().eft_index(), Some(3));
        assert_eq!(model.effect("e"), Some(PolicyEffect::DenyOverride));
    }

    #[test]
    fn parses_multiple_policy_types() {
        let text = r"
[request_definition]
r = sub, obj, act
r2 = sub, act
[policy_definition]
p = sub, obj, act
p2 = sub, act
[policy_effect]
e = some(where (p.eft == allow))
[matchers]
m = r.sub == p.sub
m2 = r2.sub == p2.sub && r2.act == p2.act
";
        let model: Model = text.parse().unwrap();
        assert!(model.policy_def("p2").is_some());
        assert!(model.matcher("m2").is_some());
        assert_eq!(model.request_tokens("r2").unwrap().len(), 2);
    }

    // ── Rejections ────────────────────────────────────────────────────

    #[test]
    fn rejects_unknown_section() {
        let text = "[widgets]\nw = 1\n";
        assert!(matches!(
            text.parse::<Model>().unwrap_err(),
            Error::ModelSyntax(_)
        ));
    }

    #[test]
    fn rejects_assignment_outside_section() {
        let text = "r = sub, obj, act\n";
        assert!(text.parse::<Model>().is_err());
    }

    #[test]
    fn rejects_wrong_key_prefix() {
        let text = "[request_definition]\nq = sub\n";
        assert!(text.parse::<Model>().is_err());
    }

    #[test]
    fn rejects_eft_not_last() {
        let text = r"
[request_definition]
r = sub
[policy_definition]
p = eft, sub
[policy_effect]
e = some(where (p.eft == allow))
[matchers]
m = r.sub == p.sub
";
        assert!(text.parse::<Model>().is_err());
    }

    #[test]
    fn rejects_bad_role_definition() {
        let text = r"
[request_definition]
r = sub
[policy_definition]
p = sub
[role_definition]
g = _, _, _, _
[policy_effect]
e = some(where (p.eft == allow))
[matchers]
m = r.sub == p.sub
";
        assert!(text.parse::<Model>().is_err());
    }

    #[test]
    fn rejects_unsupported_effect() {
        let text = r"
[request_definition]
r = sub
[policy_definition]
p = sub
[policy_effect]
e = max(where (p.eft == allow))
[matchers]
m = r.sub == p.sub
";
        assert!(matches!(
            text.parse::<Model>().unwrap_err(),
            Error::UnsupportedEffect(_)
        ));
    }

    #[test]
    fn rejects_bad_matcher_at_parse_time() {
        let text = r"
[request_definition]
r = sub
[policy_definition]
p = sub
[policy_effect]
e = some(where (p.eft == allow))
[matchers]
m = r.sub == (p.sub
";
        assert!(matches!(
            text.parse::<Model>().unwrap_err(),
            Error::MatcherSyntax { .. }
        ));
    }

    #[test]
    fn rejects_missing_sections() {
        assert!("[request_definition]\nr = sub\n".parse::<Model>().is_err());
    }
}
