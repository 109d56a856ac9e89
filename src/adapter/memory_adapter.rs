//! In-memory policy adapter.

use async_trait::async_trait;

use super::{Adapter, Filter};
use crate::error::Result;
use crate::policy::{PolicyStore, Section, matches_filter};

/// Adapter that persists into its own memory.
///
/// Useful for enforcers built from a model alone and as the reference
/// implementation of the full incremental contract: every optional
/// operation is supported, so auto-save works against it.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    rules: Vec<(Section, String, Vec<String>)>,
    filtered: bool,
}

impl MemoryAdapter {
    /// An empty adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the adapter holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn contains(&self, sec: Section, ptype: &str, rule: &[String]) -> bool {
        self.rules
            .iter()
            .any(|(s, p, r)| *s == sec && p == ptype && r == rule)
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn load_policy(&mut self, store: &mut PolicyStore) -> Result<()> {
        self.filtered = false;
        for (sec, ptype, rule) in &self.rules {
            // Set semantics under list representation; duplicates cannot
            // occur here because adds dedupe, but stay defensive on clones.
            let _ = store.add(*sec, ptype, rule.clone());
        }
        Ok(())
    }

    async fn load_filtered_policy(
        &mut self,
        store: &mut PolicyStore,
        filter: Filter,
    ) -> Result<()> {
        self.filtered = !filter.is_empty();
        for (sec, ptype, rule) in &self.rules {
            if filter.keeps(*sec, rule) {
                let _ = store.add(*sec, ptype, rule.clone());
            }
        }
        Ok(())
    }

    async fn save_policy(&mut self, store: &PolicyStore) -> Result<()> {
        self.rules.clear();
        for sec in [Section::Policy, Section::Grouping] {
            let ptypes: Vec<String> = store.types(sec).map(ToString::to_string).collect();
            for ptype in ptypes {
                for rule in store.rules(sec, &ptype) {
                    self.rules.push((sec, ptype.clone(), rule.clone()));
                }
            }
        }
        Ok(())
    }

    async fn add_policy(&mut self, sec: Section, ptype: &str, rule: &[String]) -> Result<()> {
        if !self.contains(sec, ptype, rule) {
            self.rules.push((sec, ptype.to_string(), rule.to_vec()));
        }
        Ok(())
    }

    async fn remove_policy(&mut self, sec: Section, ptype: &str, rule: &[String]) -> Result<()> {
        self.rules
            .retain(|(s, p, r)| !(*s == sec && p == ptype && r == rule));
        Ok(())
    }

    async fn remove_filtered_policy(
        &mut self,
        sec: Section,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<()> {
        self.rules.retain(|(s, p, r)| {
            !(*s == sec && p == ptype && matches_filter(r, field_index, field_values))
        });
        Ok(())
    }

    async fn update_policy(
        &mut self,
        sec: Section,
        ptype: &str,
        old: &[String],
        new: &[String],
    ) -> Result<()> {
        if let Some(slot) = self
            .rules
            .iter_mut()
            .find(|(s, p, r)| *s == sec && p == ptype && r == old)
        {
            slot.2 = new.to_vec();
        }
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }
}
