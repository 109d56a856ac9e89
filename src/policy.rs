//! In-memory policy tables.
//!
//! Two families of named, ordered rule lists: policy types (`p`, `p2`, …)
//! and grouping types (`g`, `g2`, …). Insertion order is observable —
//! priority-effect semantics depend on it — and each list has set
//! semantics: a rule appears at most once per type.
//!
//! The store knows nothing about arity or models; the management layer
//! validates rules before they reach it.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which rule family an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// Policy tables (`p`, `p2`, …)
    Policy,
    /// Grouping (role-relation) tables (`g`, `g2`, …)
    Grouping,
}

impl Section {
    /// The section tag used in adapter contracts and event payloads.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Policy => "p",
            Self::Grouping => "g",
        }
    }
}

/// Outcome of a batch add: how many rules landed and which were skipped
/// as duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Additions {
    /// Number of rules actually inserted
    pub inserted: usize,
    /// Rules skipped because they were already present
    pub duplicates: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
struct Table {
    rules: Vec<Vec<String>>,
    index: HashSet<Vec<String>>,
}

impl Table {
    fn add(&mut self, rule: Vec<String>) -> bool {
        if self.index.contains(&rule) {
            return false;
        }
        self.index.insert(rule.clone());
        self.rules.push(rule);
        true
    }

    fn remove(&mut self, rule: &[String]) -> bool {
        if !self.index.remove(rule) {
            return false;
        }
        if let Some(pos) = self.rules.iter().position(|r| r == rule) {
            self.rules.remove(pos);
        }
        true
    }
}

/// The in-memory policy store.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    policies: BTreeMap<String, Table>,
    grouping: BTreeMap<String, Table>,
    filtered: bool,
}

impl PolicyStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self, sec: Section) -> &BTreeMap<String, Table> {
        match sec {
            Section::Policy => &self.policies,
            Section::Grouping => &self.grouping,
        }
    }

    fn tables_mut(&mut self, sec: Section) -> &mut BTreeMap<String, Table> {
        match sec {
            Section::Policy => &mut self.policies,
            Section::Grouping => &mut self.grouping,
        }
    }

    /// All rules of one type, in insertion order.
    #[must_use]
    pub fn rules(&self, sec: Section, ptype: &str) -> &[Vec<String>] {
        self.tables(sec)
            .get(ptype)
            .map_or(&[] as &[_], |t| t.rules.as_slice())
    }

    /// Type names present in a section, sorted.
    pub fn types(&self, sec: Section) -> impl Iterator<Item = &str> {
        self.tables(sec).keys().map(String::as_str)
    }

    /// Whether the exact rule is present.
    #[must_use]
    pub fn has(&self, sec: Section, ptype: &str, rule: &[String]) -> bool {
        self.tables(sec)
            .get(ptype)
            .is_some_and(|t| t.index.contains(rule))
    }

    /// Whether any rule is stored anywhere in the section.
    #[must_use]
    pub fn section_is_empty(&self, sec: Section) -> bool {
        self.tables(sec).values().all(|t| t.rules.is_empty())
    }

    /// Append a rule; duplicates are rejected.
    pub fn add(&mut self, sec: Section, ptype: &str, rule: Vec<String>) -> Result<()> {
        let table = self.tables_mut(sec).entry(ptype.to_string()).or_default();
        if table.add(rule.clone()) {
            Ok(())
        } else {
            Err(Error::AlreadyExists(rule))
        }
    }

    /// Append many rules, skipping duplicates (batch-add-ex semantics).
    ///
    /// Non-duplicate rules are applied; the outcome reports what was
    /// inserted and what was skipped. This never fails.
    pub fn add_many(&mut self, sec: Section, ptype: &str, rules: Vec<Vec<String>>) -> Additions {
        let table = self.tables_mut(sec).entry(ptype.to_string()).or_default();
        let mut outcome = Additions::default();
        for rule in rules {
            if table.add(rule.clone()) {
                outcome.inserted += 1;
            } else {
                outcome.duplicates.push(rule);
            }
        }
        outcome
    }

    /// Remove one rule.
    pub fn remove(&mut self, sec: Section, ptype: &str, rule: &[String]) -> Result<()> {
        let removed = self
            .tables_mut(sec)
            .get_mut(ptype)
            .is_some_and(|t| t.remove(rule));
        if removed {
            Ok(())
        } else {
            Err(Error::NotFound(rule.to_vec()))
        }
    }

    /// Remove many rules, all-or-nothing: if any rule is absent, nothing
    /// is removed.
    pub fn remove_many(&mut self, sec: Section, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        for rule in rules {
            if !self.has(sec, ptype, rule) {
                return Err(Error::NotFound(rule.clone()));
            }
        }
        if let Some(table) = self.tables_mut(sec).get_mut(ptype) {
            for rule in rules {
                table.remove(rule);
            }
        }
        Ok(())
    }

    /// Remove every rule matching the filter; returns the removed rules in
    /// their stored order.
    ///
    /// A rule matches when, for every `i`, `rule[field_index + i]` equals
    /// `field_values[i]` or `field_values[i]` is the empty string.
    pub fn remove_filtered(
        &mut self,
        sec: Section,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        let Some(table) = self.tables_mut(sec).get_mut(ptype) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        table.rules.retain(|rule| {
            if matches_filter(rule, field_index, field_values) {
                removed.push(rule.clone());
                false
            } else {
                true
            }
        });
        for rule in &removed {
            table.index.remove(rule);
        }
        removed
    }

    /// All rules matching the filter (same wildcard rule as
    /// [`PolicyStore::remove_filtered`]), cloned in stored order.
    #[must_use]
    pub fn get_filtered(
        &self,
        sec: Section,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        self.rules(sec, ptype)
            .iter()
            .filter(|rule| matches_filter(rule, field_index, field_values))
            .cloned()
            .collect()
    }

    /// Replace the first occurrence of `old` with `new`, keeping its
    /// position in the list.
    pub fn update(
        &mut self,
        sec: Section,
        ptype: &str,
        old: &[String],
        new: Vec<String>,
    ) -> Result<()> {
        let table = self
            .tables_mut(sec)
            .get_mut(ptype)
            .ok_or_else(|| Error::NotFound(old.to_vec()))?;
        let pos = table
            .rules
            .iter()
            .position(|r| r == old)
            .ok_or_else(|| Error::NotFound(old.to_vec()))?;
        if new.as_slice() != old && table.index.contains(&new) {
            return Err(Error::AlreadyExists(new));
        }
        table.index.remove(old);
        table.index.insert(new.clone());
        table.rules[pos] = new;
        Ok(())
    }

    /// Replace many rules pairwise, all-or-nothing.
    pub fn update_many(
        &mut self,
        sec: Section,
        ptype: &str,
        olds: &[Vec<String>],
        news: &[Vec<String>],
    ) -> Result<()> {
        if olds.len() != news.len() {
            return Err(Error::LengthMismatch {
                left: olds.len(),
                right: news.len(),
            });
        }
        // Dry-run against a scratch index so a failure mid-list leaves the
        // store untouched. Olds come out before news go in, which permits
        // swapping two rules in one call.
        let table = self
            .tables_mut(sec)
            .get_mut(ptype)
            .ok_or_else(|| Error::NotFound(olds.first().cloned().unwrap_or_default()))?;
        let mut scratch = table.index.clone();
        for old in olds {
            if !scratch.remove(old.as_slice()) {
                return Err(Error::NotFound(old.clone()));
            }
        }
        for new in news {
            if !scratch.insert(new.clone()) {
                return Err(Error::AlreadyExists(new.clone()));
            }
        }
        // Positions are resolved before any replacement so later lookups
        // cannot land on freshly written rules.
        let mut positions = Vec::with_capacity(olds.len());
        for old in olds {
            let pos = table
                .rules
                .iter()
                .position(|r| r == old)
                .ok_or_else(|| Error::NotFound(old.clone()))?;
            positions.push(pos);
        }
        for old in olds {
            table.index.remove(old.as_slice());
        }
        for (pos, new) in positions.into_iter().zip(news) {
            table.index.insert(new.clone());
            table.rules[pos] = new.clone();
        }
        Ok(())
    }

    /// Distinct values of one rule field across a type, sorted.
    #[must_use]
    pub fn field_values(&self, sec: Section, ptype: &str, field_index: usize) -> Vec<String> {
        let mut out = BTreeSet::new();
        for rule in self.rules(sec, ptype) {
            if let Some(v) = rule.get(field_index) {
                out.insert(v.clone());
            }
        }
        out.into_iter().collect()
    }

    /// Drop all rules from both sections.
    pub fn clear(&mut self) {
        self.policies.clear();
        self.grouping.clear();
    }

    /// Whether the store holds a filtered subset (writing back is
    /// disallowed while true).
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    /// Mark the store as holding a filtered subset.
    pub fn set_filtered(&mut self, filtered: bool) {
        self.filtered = filtered;
    }
}

/// Wildcard field match shared with adapters: empty filter fields match
/// anything.
pub(crate) fn matches_filter(rule: &[String], field_index: usize, field_values: &[String]) -> bool {
    field_values.iter().enumerate().all(|(i, fv)| {
        fv.is_empty() || rule.get(field_index + i).is_some_and(|v| v == fv)
    })
}
