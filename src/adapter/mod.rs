//! Persistence adapters.
//!
//! An adapter moves policy rules between the in-memory [`PolicyStore`] and
//! some backing source. Only `load_policy` and `save_policy` are required;
//! the incremental operations are optional and default to
//! [`Error::UnsupportedByAdapter`], which is how auto-save discovers that a
//! backend cannot apply deltas.
//!
//! Adapter I/O is the enforcement core's only suspension point: everything
//! else in the crate is synchronous in-memory work.

mod file_adapter;
mod memory_adapter;

use async_trait::async_trait;
pub use file_adapter::FileAdapter;
pub use memory_adapter::MemoryAdapter;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::{PolicyStore, Section, matches_filter};

/// Rule filter for partial policy loads.
///
/// Each list aligns field-by-field with rules of the corresponding section
/// starting at field 0; an empty string matches anything. An empty list
/// keeps every rule of that section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// Field filter applied to policy rules (`p`, `p2`, …)
    pub p: Vec<String>,
    /// Field filter applied to grouping rules (`g`, `g2`, …)
    pub g: Vec<String>,
}

impl Filter {
    /// Whether the filter keeps every rule.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.p.iter().all(String::is_empty) && self.g.iter().all(String::is_empty)
    }

    /// Whether a rule of the given section passes the filter.
    #[must_use]
    pub fn keeps(&self, sec: Section, rule: &[String]) -> bool {
        let fields = match sec {
            Section::Policy => &self.p,
            Section::Grouping => &self.g,
        };
        fields.is_empty() || matches_filter(rule, 0, fields)
    }
}

/// Contract between the enforcer and a policy backend.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Load every rule from the backend into `store`.
    ///
    /// The store arrives cleared; implementations append in backend order.
    async fn load_policy(&mut self, store: &mut PolicyStore) -> Result<()>;

    /// Load only the rules passing `filter`.
    ///
    /// Implementations that support this must make [`Adapter::is_filtered`]
    /// return `true` afterwards.
    async fn load_filtered_policy(&mut self, store: &mut PolicyStore, filter: Filter)
    -> Result<()> {
        let _ = (store, filter);
        Err(Error::UnsupportedByAdapter("load_filtered_policy"))
    }

    /// Persist the full store contents, replacing what the backend held.
    async fn save_policy(&mut self, store: &PolicyStore) -> Result<()>;

    /// Persist a single added rule.
    async fn add_policy(&mut self, sec: Section, ptype: &str, rule: &[String]) -> Result<()> {
        let _ = (sec, ptype, rule);
        Err(Error::UnsupportedByAdapter("add_policy"))
    }

    /// Persist a batch of added rules.
    async fn add_policies(
        &mut self,
        sec: Section,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<()> {
        for rule in rules {
            self.add_policy(sec, ptype, rule).await?;
        }
        Ok(())
    }

    /// Persist a single removed rule.
    async fn remove_policy(&mut self, sec: Section, ptype: &str, rule: &[String]) -> Result<()> {
        let _ = (sec, ptype, rule);
        Err(Error::UnsupportedByAdapter("remove_policy"))
    }

    /// Persist a batch of removed rules.
    async fn remove_policies(
        &mut self,
        sec: Section,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<()> {
        for rule in rules {
            self.remove_policy(sec, ptype, rule).await?;
        }
        Ok(())
    }

    /// Persist a filtered removal.
    async fn remove_filtered_policy(
        &mut self,
        sec: Section,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<()> {
        let _ = (sec, ptype, field_index, field_values);
        Err(Error::UnsupportedByAdapter("remove_filtered_policy"))
    }

    /// Persist an in-place rule replacement.
    async fn update_policy(
        &mut self,
        sec: Section,
        ptype: &str,
        old: &[String],
        new: &[String],
    ) -> Result<()> {
        let _ = (sec, ptype, old, new);
        Err(Error::UnsupportedByAdapter("update_policy"))
    }

    /// Whether the last load was filtered.
    fn is_filtered(&self) -> bool {
        false
    }
}

/// Parse one CSV-like policy line into `(ptype, rule)`.
///
/// Returns `None` for blank lines and `#` comments.
pub(crate) fn parse_policy_line(line: &str) -> Option<(String, Vec<String>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut fields = line.split(',').map(|f| f.trim().to_string());
    let ptype = fields.next()?;
    Some((ptype, fields.collect()))
}

/// Classify a ptype tag into its section.
pub(crate) fn section_of(ptype: &str) -> Result<Section> {
    match ptype.chars().next() {
        Some('p') => Ok(Section::Policy),
        Some('g') => Ok(Section::Grouping),
        _ => Err(Error::Adapter(format!("unknown policy type `{ptype}`"))),
    }
}

/// Serialize the store into the CSV-like policy format: policy tables
/// first, grouping tables second, each in insertion order.
pub(crate) fn serialize_store(store: &PolicyStore) -> String {
    let mut out = String::new();
    for sec in [Section::Policy, Section::Grouping] {
        let ptypes: Vec<&str> = store.types(sec).collect();
        for ptype in ptypes {
            for rule in store.rules(sec, ptype) {
                out.push_str(ptype);
                for field in rule {
                    out.push_str(", ");
                    out.push_str(field);
                }
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_lines() {
        assert_eq!(
            parse_policy_line("p, alice, data1, read"),
            Some(("p".into(), vec!["alice".into(), "data1".into(), "read".into()]))
        );
        assert_eq!(
            parse_policy_line("  g , alice ,  admin "),
            Some(("g".into(), vec!["alice".into(), "admin".into()]))
        );
        assert_eq!(parse_policy_line("# comment"), None);
        assert_eq!(parse_policy_line("   "), None);
    }

    #[test]
    fn classifies_sections() {
        assert_eq!(section_of("p").unwrap(), Section::Policy);
        assert_eq!(section_of("p2").unwrap(), Section::Policy);
        assert_eq!(section_of("g3").unwrap(), Section::Grouping);
        assert!(section_of("x").is_err());
    }

    #[test]
    fn filter_keeps_by_section() {
        let filter = Filter {
            p: vec![String::new(), "data1".into()],
            g: Vec::new(),
        };
        let keep = vec!["alice".to_string(), "data1".to_string(), "read".to_string()];
        let drop = vec!["alice".to_string(), "data2".to_string(), "read".to_string()];
        assert!(filter.keeps(Section::Policy, &keep));
        assert!(!filter.keeps(Section::Policy, &drop));
        // No g filter: everything in the grouping section passes.
        assert!(filter.keeps(Section::Grouping, &["x".to_string()]));
    }
}
