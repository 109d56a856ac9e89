//! Management surface: load/save, policy and grouping-policy mutations,
//! and table queries.
//!
//! Every mutation follows one sequence: validate arity against the model,
//! apply to the store, maintain role links for grouping types, persist
//! through the adapter when `auto_save` is on, then notify the watcher
//! when `auto_notify_watcher` is on. The `self_*` variants skip the last
//! two steps; they exist for watcher callbacks applying an inbound change
//! without echoing it back out.
//!
//! Auto-save keeps no transaction log: if the adapter fails after the
//! store mutated, the in-memory change stands and the error surfaces to
//! the caller (the watcher is not notified in that case). Adapters that do
//! not implement an incremental operation are skipped, not failed.

use crate::adapter::Filter;
use crate::effect::Eft;
use crate::enforcer::Enforcer;
use crate::error::{Error, Result};
use crate::policy::{Additions, PolicyStore, Section};
use crate::watcher::EventData;

fn to_rule<I, S>(rule: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    rule.into_iter().map(Into::into).collect()
}

fn to_rules<I, R, S>(rules: I) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: Into<String>,
{
    rules.into_iter().map(to_rule).collect()
}

impl Enforcer {
    // ─────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────

    fn validate_rule(&self, sec: Section, ptype: &str, rule: &[String]) -> Result<()> {
        let expected = match sec {
            Section::Policy => {
                let def = self.model.policy_def(ptype).ok_or_else(|| {
                    Error::ModelSyntax(format!("model declares no policy type `{ptype}`"))
                })?;
                if let Some(i) = def.eft_index() {
                    if let Some(eft) = rule.get(i) {
                        eft.parse::<Eft>()?;
                    }
                }
                def.arity()
            }
            Section::Grouping => self.model.role_arity(ptype).ok_or_else(|| {
                Error::ModelSyntax(format!("model declares no grouping type `{ptype}`"))
            })?,
        };
        if rule.len() != expected {
            return Err(Error::ArityMismatch {
                ptype: ptype.to_string(),
                expected,
                found: rule.len(),
            });
        }
        Ok(())
    }

    fn validate_store(&self, store: &PolicyStore) -> Result<()> {
        for sec in [Section::Policy, Section::Grouping] {
            for ptype in store.types(sec) {
                for rule in store.rules(sec, ptype) {
                    self.validate_rule(sec, ptype, rule)?;
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Persistence plumbing
    // ─────────────────────────────────────────────────────────────────

    async fn persist(&mut self, event: &EventData) -> Result<()> {
        if !self.auto_save {
            return Ok(());
        }
        let outcome = match event {
            EventData::AddPolicy { sec, ptype, rule } => {
                self.adapter.add_policy(*sec, ptype, rule).await
            }
            EventData::AddPolicies { sec, ptype, rules } => {
                self.adapter.add_policies(*sec, ptype, rules).await
            }
            EventData::RemovePolicy { sec, ptype, rule } => {
                self.adapter.remove_policy(*sec, ptype, rule).await
            }
            EventData::RemovePolicies { sec, ptype, rules } => {
                self.adapter.remove_policies(*sec, ptype, rules).await
            }
            EventData::RemoveFilteredPolicy {
                sec,
                ptype,
                field_index,
                field_values,
            } => {
                self.adapter
                    .remove_filtered_policy(*sec, ptype, *field_index, field_values)
                    .await
            }
            EventData::UpdatePolicy {
                sec,
                ptype,
                old,
                new,
            } => self.adapter.update_policy(*sec, ptype, old, new).await,
            EventData::UpdatePolicies {
                sec,
                ptype,
                olds,
                news,
            } => {
                let mut result = Ok(());
                for (old, new) in olds.iter().zip(news) {
                    result = self.adapter.update_policy(*sec, ptype, old, new).await;
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
            EventData::SavePolicy | EventData::ClearPolicy => Ok(()),
        };
        match outcome {
            Err(Error::UnsupportedByAdapter(op)) => {
                tracing::debug!(op, "adapter does not persist increments, skipping");
                Ok(())
            }
            other => other,
        }
    }

    async fn announce(&mut self, event: EventData) {
        if !self.auto_notify_watcher {
            return;
        }
        if let Some(watcher) = self.watcher.as_mut() {
            let kind = event.kind();
            if let Err(err) = watcher.notify(event).await {
                tracing::warn!(op = kind, %err, "watcher notification failed");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // Load / save
    // ─────────────────────────────────────────────────────────────────

    /// Reload the full policy set from the adapter, replacing the store.
    pub async fn load_policy(&mut self) -> Result<()> {
        let mut store = PolicyStore::new();
        self.adapter.load_policy(&mut store).await?;
        self.validate_store(&store)?;
        store.set_filtered(false);
        self.store = store;
        if self.auto_build_role_links {
            self.build_role_links()?;
        }
        Ok(())
    }

    /// Load only the rules passing `filter`; the store enters filtered
    /// mode and refuses to save until a full load.
    pub async fn load_filtered_policy(&mut self, filter: Filter) -> Result<()> {
        let mut store = PolicyStore::new();
        self.adapter.load_filtered_policy(&mut store, filter).await?;
        self.validate_store(&store)?;
        store.set_filtered(self.adapter.is_filtered());
        self.store = store;
        if self.auto_build_role_links {
            self.build_role_links()?;
        }
        Ok(())
    }

    /// Whether the store holds a filtered subset.
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        self.store.is_filtered()
    }

    /// Persist the full store through the adapter.
    ///
    /// Rejected with [`Error::CannotSaveFiltered`] while the store is
    /// filtered, so a partial subset can never overwrite the backend.
    pub async fn save_policy(&mut self) -> Result<()> {
        if self.store.is_filtered() {
            return Err(Error::CannotSaveFiltered);
        }
        self.adapter.save_policy(&self.store).await?;
        self.announce(EventData::SavePolicy).await;
        Ok(())
    }

    /// Drop every rule and role link (in memory only).
    pub async fn clear_policy(&mut self) {
        self.self_clear_policy();
        self.announce(EventData::ClearPolicy).await;
    }

    // ─────────────────────────────────────────────────────────────────
    // Mutations, default types
    // ─────────────────────────────────────────────────────────────────

    /// Add one rule to `p`.
    pub async fn add_policy<I, S>(&mut self, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_named_policy("p", rule).await
    }

    /// Add a batch of rules to `p` (duplicates skipped, reported).
    pub async fn add_policies<I, R, S>(&mut self, rules: I) -> Result<Additions>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_named_policies("p", rules).await
    }

    /// Remove one rule from `p`.
    pub async fn remove_policy<I, S>(&mut self, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_named_policy("p", rule).await
    }

    /// Remove a batch of rules from `p`, all-or-nothing.
    pub async fn remove_policies<I, R, S>(&mut self, rules: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_named_policies("p", rules).await
    }

    /// Remove every `p` rule matching the filter; returns what was
    /// removed.
    pub async fn remove_filtered_policy<I, S>(
        &mut self,
        field_index: usize,
        field_values: I,
    ) -> Result<Vec<Vec<String>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_filtered_named_policy("p", field_index, field_values)
            .await
    }

    /// Replace `old` with `new` in `p`, preserving its position.
    pub async fn update_policy<I, J, S, T>(&mut self, old: I, new: J) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.update_named_policy("p", old, new).await
    }

    /// Replace rules pairwise in `p`, all-or-nothing.
    pub async fn update_policies<I, J, R, Q, S, T>(&mut self, olds: I, news: J) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = Q>,
        Q: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.update_named_policies("p", olds, news).await
    }

    /// Add one rule to `g`.
    pub async fn add_grouping_policy<I, S>(&mut self, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_named_grouping_policy("g", rule).await
    }

    /// Add a batch of rules to `g` (duplicates skipped, reported).
    pub async fn add_grouping_policies<I, R, S>(&mut self, rules: I) -> Result<Additions>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_named_grouping_policies("g", rules).await
    }

    /// Remove one rule from `g`.
    pub async fn remove_grouping_policy<I, S>(&mut self, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_named_grouping_policy("g", rule).await
    }

    /// Remove a batch of rules from `g`, all-or-nothing.
    pub async fn remove_grouping_policies<I, R, S>(&mut self, rules: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_named_grouping_policies("g", rules).await
    }

    /// Remove every `g` rule matching the filter; returns what was
    /// removed.
    pub async fn remove_filtered_grouping_policy<I, S>(
        &mut self,
        field_index: usize,
        field_values: I,
    ) -> Result<Vec<Vec<String>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_filtered_named_grouping_policy("g", field_index, field_values)
            .await
    }

    /// Replace `old` with `new` in `g`, preserving its position.
    pub async fn update_grouping_policy<I, J, S, T>(&mut self, old: I, new: J) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.update_named_grouping_policy("g", old, new).await
    }

    // ─────────────────────────────────────────────────────────────────
    // Mutations, named types
    // ─────────────────────────────────────────────────────────────────

    /// Add one rule to the named policy type.
    pub async fn add_named_policy<I, S>(&mut self, ptype: &str, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_add(Section::Policy, ptype, to_rule(rule)).await
    }

    /// Add one rule to the named grouping type.
    pub async fn add_named_grouping_policy<I, S>(&mut self, gtype: &str, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_add(Section::Grouping, gtype, to_rule(rule))
            .await
    }

    /// Batch add to the named policy type.
    pub async fn add_named_policies<I, R, S>(&mut self, ptype: &str, rules: I) -> Result<Additions>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_add_many(Section::Policy, ptype, to_rules(rules))
            .await
    }

    /// Batch add to the named grouping type.
    pub async fn add_named_grouping_policies<I, R, S>(
        &mut self,
        gtype: &str,
        rules: I,
    ) -> Result<Additions>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_add_many(Section::Grouping, gtype, to_rules(rules))
            .await
    }

    /// Remove one rule from the named policy type.
    pub async fn remove_named_policy<I, S>(&mut self, ptype: &str, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_remove(Section::Policy, ptype, to_rule(rule))
            .await
    }

    /// Remove one rule from the named grouping type.
    pub async fn remove_named_grouping_policy<I, S>(&mut self, gtype: &str, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_remove(Section::Grouping, gtype, to_rule(rule))
            .await
    }

    /// Batch remove from the named policy type, all-or-nothing.
    pub async fn remove_named_policies<I, R, S>(&mut self, ptype: &str, rules: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_remove_many(Section::Policy, ptype, to_rules(rules))
            .await
    }

    /// Batch remove from the named grouping type, all-or-nothing.
    pub async fn remove_named_grouping_policies<I, R, S>(
        &mut self,
        gtype: &str,
        rules: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_remove_many(Section::Grouping, gtype, to_rules(rules))
            .await
    }

    /// Filtered removal from the named policy type.
    pub async fn remove_filtered_named_policy<I, S>(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: I,
    ) -> Result<Vec<Vec<String>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_remove_filtered(Section::Policy, ptype, field_index, to_rule(field_values))
            .await
    }

    /// Filtered removal from the named grouping type.
    pub async fn remove_filtered_named_grouping_policy<I, S>(
        &mut self,
        gtype: &str,
        field_index: usize,
        field_values: I,
    ) -> Result<Vec<Vec<String>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate_remove_filtered(Section::Grouping, gtype, field_index, to_rule(field_values))
            .await
    }

    /// Replace a rule in the named policy type.
    pub async fn update_named_policy<I, J, S, T>(
        &mut self,
        ptype: &str,
        old: I,
        new: J,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.mutate_update(Section::Policy, ptype, to_rule(old), to_rule(new))
            .await
    }

    /// Replace a rule in the named grouping type.
    pub async fn update_named_grouping_policy<I, J, S, T>(
        &mut self,
        gtype: &str,
        old: I,
        new: J,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.mutate_update(Section::Grouping, gtype, to_rule(old), to_rule(new))
            .await
    }

    /// Replace rules pairwise in the named policy type, all-or-nothing.
    pub async fn update_named_policies<I, J, R, Q, S, T>(
        &mut self,
        ptype: &str,
        olds: I,
        news: J,
    ) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = Q>,
        Q: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.mutate_update_many(Section::Policy, ptype, to_rules(olds), to_rules(news))
            .await
    }

    // ─────────────────────────────────────────────────────────────────
    // Self-applied mutations (no persistence, no notification)
    // ─────────────────────────────────────────────────────────────────

    /// Add without persistence or notification.
    pub fn self_add_named_policy(
        &mut self,
        sec: Section,
        ptype: &str,
        rule: Vec<String>,
    ) -> Result<()> {
        self.validate_rule(sec, ptype, &rule)?;
        self.store.add(sec, ptype, rule.clone())?;
        if sec == Section::Grouping && self.auto_build_role_links {
            self.update_link(ptype, &rule, true);
        }
        Ok(())
    }

    /// Batch add without persistence or notification.
    pub fn self_add_named_policies(
        &mut self,
        sec: Section,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<Additions> {
        for rule in &rules {
            self.validate_rule(sec, ptype, rule)?;
        }
        let outcome = self.store.add_many(sec, ptype, rules.clone());
        if sec == Section::Grouping && self.auto_build_role_links {
            let skipped: std::collections::HashSet<&Vec<String>> =
                outcome.duplicates.iter().collect();
            for rule in rules.iter().filter(|r| !skipped.contains(r)) {
                self.update_link(ptype, rule, true);
            }
        }
        Ok(outcome)
    }

    /// Remove without persistence or notification.
    pub fn self_remove_named_policy(
        &mut self,
        sec: Section,
        ptype: &str,
        rule: Vec<String>,
    ) -> Result<()> {
        self.store.remove(sec, ptype, &rule)?;
        if sec == Section::Grouping && self.auto_build_role_links {
            self.update_link(ptype, &rule, false);
        }
        Ok(())
    }

    /// Batch remove without persistence or notification.
    pub fn self_remove_named_policies(
        &mut self,
        sec: Section,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<()> {
        self.store.remove_many(sec, ptype, &rules)?;
        if sec == Section::Grouping && self.auto_build_role_links {
            for rule in &rules {
                self.update_link(ptype, rule, false);
            }
        }
        Ok(())
    }

    /// Filtered removal without persistence or notification.
    pub fn self_remove_filtered_named_policy(
        &mut self,
        sec: Section,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Vec<Vec<String>> {
        let removed = self
            .store
            .remove_filtered(sec, ptype, field_index, &field_values);
        if sec == Section::Grouping && self.auto_build_role_links {
            for rule in &removed {
                self.update_link(ptype, rule, false);
            }
        }
        removed
    }

    /// Replace without persistence or notification.
    pub fn self_update_named_policy(
        &mut self,
        sec: Section,
        ptype: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> Result<()> {
        self.validate_rule(sec, ptype, &new)?;
        self.store.update(sec, ptype, &old, new.clone())?;
        if sec == Section::Grouping && self.auto_build_role_links {
            self.update_link(ptype, &old, false);
            self.update_link(ptype, &new, true);
        }
        Ok(())
    }

    /// Pairwise replace without persistence or notification.
    pub fn self_update_named_policies(
        &mut self,
        sec: Section,
        ptype: &str,
        olds: Vec<Vec<String>>,
        news: Vec<Vec<String>>,
    ) -> Result<()> {
        for new in &news {
            self.validate_rule(sec, ptype, new)?;
        }
        self.store.update_many(sec, ptype, &olds, &news)?;
        if sec == Section::Grouping && self.auto_build_role_links {
            for old in &olds {
                self.update_link(ptype, old, false);
            }
            for new in &news {
                self.update_link(ptype, new, true);
            }
        }
        Ok(())
    }

    /// Clear without persistence or notification.
    pub fn self_clear_policy(&mut self) {
        self.store.clear();
        for rm in self.role_managers.values() {
            rm.write().clear();
        }
    }

    /// Apply an inbound watcher event using self-semantics.
    ///
    /// `SavePolicy` triggers a full reload from this enforcer's adapter;
    /// every other event applies the carried delta. Replays are idempotent
    /// for adds and removes (the precondition error is swallowed).
    pub async fn apply_event(&mut self, event: EventData) -> Result<()> {
        match event {
            EventData::AddPolicy { sec, ptype, rule } => {
                match self.self_add_named_policy(sec, &ptype, rule) {
                    Err(Error::AlreadyExists(_)) => Ok(()),
                    other => other,
                }
            }
            EventData::AddPolicies { sec, ptype, rules } => {
                self.self_add_named_policies(sec, &ptype, rules).map(|_| ())
            }
            EventData::RemovePolicy { sec, ptype, rule } => {
                match self.self_remove_named_policy(sec, &ptype, rule) {
                    Err(Error::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
            EventData::RemovePolicies { sec, ptype, rules } => {
                match self.self_remove_named_policies(sec, &ptype, rules) {
                    Err(Error::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
            EventData::RemoveFilteredPolicy {
                sec,
                ptype,
                field_index,
                field_values,
            } => {
                self.self_remove_filtered_named_policy(sec, &ptype, field_index, field_values);
                Ok(())
            }
            EventData::UpdatePolicy {
                sec,
                ptype,
                old,
                new,
            } => self.self_update_named_policy(sec, &ptype, old, new),
            EventData::UpdatePolicies {
                sec,
                ptype,
                olds,
                news,
            } => self.self_update_named_policies(sec, &ptype, olds, news),
            EventData::SavePolicy => self.load_policy().await,
            EventData::ClearPolicy => {
                self.self_clear_policy();
                Ok(())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // Internal mutation path
    // ─────────────────────────────────────────────────────────────────

    async fn mutate_add(&mut self, sec: Section, ptype: &str, rule: Vec<String>) -> Result<()> {
        self.self_add_named_policy(sec, ptype, rule.clone())?;
        let event = EventData::AddPolicy {
            sec,
            ptype: ptype.to_string(),
            rule,
        };
        self.persist(&event).await?;
        self.announce(event).await;
        Ok(())
    }

    async fn mutate_add_many(
        &mut self,
        sec: Section,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<Additions> {
        let outcome = self.self_add_named_policies(sec, ptype, rules.clone())?;
        let skipped: std::collections::HashSet<&Vec<String>> = outcome.duplicates.iter().collect();
        let inserted: Vec<Vec<String>> = rules
            .into_iter()
            .filter(|r| !skipped.contains(r))
            .collect();
        if !inserted.is_empty() {
            let event = EventData::AddPolicies {
                sec,
                ptype: ptype.to_string(),
                rules: inserted,
            };
            self.persist(&event).await?;
            self.announce(event).await;
        }
        Ok(outcome)
    }

    async fn mutate_remove(&mut self, sec: Section, ptype: &str, rule: Vec<String>) -> Result<()> {
        self.self_remove_named_policy(sec, ptype, rule.clone())?;
        let event = EventData::RemovePolicy {
            sec,
            ptype: ptype.to_string(),
            rule,
        };
        self.persist(&event).await?;
        self.announce(event).await;
        Ok(())
    }

    async fn mutate_remove_many(
        &mut self,
        sec: Section,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<()> {
        self.self_remove_named_policies(sec, ptype, rules.clone())?;
        let event = EventData::RemovePolicies {
            sec,
            ptype: ptype.to_string(),
            rules,
        };
        self.persist(&event).await?;
        self.announce(event).await;
        Ok(())
    }

    async fn mutate_remove_filtered(
        &mut self,
        sec: Section,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<Vec<Vec<String>>> {
        let removed =
            self.self_remove_filtered_named_policy(sec, ptype, field_index, field_values.clone());
        if !removed.is_empty() {
            let event = EventData::RemoveFilteredPolicy {
                sec,
                ptype: ptype.to_string(),
                field_index,
                field_values,
            };
            self.persist(&event).await?;
            self.announce(event).await;
        }
        Ok(removed)
    }

    async fn mutate_update(
        &mut self,
        sec: Section,
        ptype: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> Result<()> {
        self.self_update_named_policy(sec, ptype, old.clone(), new.clone())?;
        let event = EventData::UpdatePolicy {
            sec,
            ptype: ptype.to_string(),
            old,
            new,
        };
        self.persist(&event).await?;
        self.announce(event).await;
        Ok(())
    }

    async fn mutate_update_many(
        &mut self,
        sec: Section,
        ptype: &str,
        olds: Vec<Vec<String>>,
        news: Vec<Vec<String>>,
    ) -> Result<()> {
        self.self_update_named_policies(sec, ptype, olds.clone(), news.clone())?;
        let event = EventData::UpdatePolicies {
            sec,
            ptype: ptype.to_string(),
            olds,
            news,
        };
        self.persist(&event).await?;
        self.announce(event).await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────

    /// All rules of `p`.
    #[must_use]
    pub fn get_policy(&self) -> Vec<Vec<String>> {
        self.get_named_policy("p")
    }

    /// All rules of a named policy type.
    #[must_use]
    pub fn get_named_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.store.rules(Section::Policy, ptype).to_vec()
    }

    /// All rules of `g`.
    #[must_use]
    pub fn get_grouping_policy(&self) -> Vec<Vec<String>> {
        self.get_named_grouping_policy("g")
    }

    /// All rules of a named grouping type.
    #[must_use]
    pub fn get_named_grouping_policy(&self, gtype: &str) -> Vec<Vec<String>> {
        self.store.rules(Section::Grouping, gtype).to_vec()
    }

    /// Rules of `p` matching the filter (empty string = wildcard).
    #[must_use]
    pub fn get_filtered_policy<I, S>(&self, field_index: usize, field_values: I) -> Vec<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get_filtered_named_policy("p", field_index, field_values)
    }

    /// Rules of a named policy type matching the filter.
    #[must_use]
    pub fn get_filtered_named_policy<I, S>(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: I,
    ) -> Vec<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store
            .get_filtered(Section::Policy, ptype, field_index, &to_rule(field_values))
    }

    /// Rules of `g` matching the filter.
    #[must_use]
    pub fn get_filtered_grouping_policy<I, S>(
        &self,
        field_index: usize,
        field_values: I,
    ) -> Vec<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store
            .get_filtered(Section::Grouping, "g", field_index, &to_rule(field_values))
    }

    /// Whether `p` holds the exact rule.
    #[must_use]
    pub fn has_policy<I, S>(&self, rule: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.has_named_policy("p", rule)
    }

    /// Whether a named policy type holds the exact rule.
    #[must_use]
    pub fn has_named_policy<I, S>(&self, ptype: &str, rule: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store.has(Section::Policy, ptype, &to_rule(rule))
    }

    /// Whether `g` holds the exact rule.
    #[must_use]
    pub fn has_grouping_policy<I, S>(&self, rule: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store.has(Section::Grouping, "g", &to_rule(rule))
    }

    /// Distinct subjects (field 0) across `p` rules.
    #[must_use]
    pub fn get_all_subjects(&self) -> Vec<String> {
        self.store.field_values(Section::Policy, "p", 0)
    }

    /// Distinct objects (field 1) across `p` rules.
    #[must_use]
    pub fn get_all_objects(&self) -> Vec<String> {
        self.store.field_values(Section::Policy, "p", 1)
    }

    /// Distinct actions (field 2) across `p` rules.
    #[must_use]
    pub fn get_all_actions(&self) -> Vec<String> {
        self.store.field_values(Section::Policy, "p", 2)
    }

    /// Distinct roles (field 1) across `g` rules.
    ///
    /// Roles come from grouping tables; subjects come from policy tables.
    #[must_use]
    pub fn get_all_roles(&self) -> Vec<String> {
        self.store.field_values(Section::Grouping, "g", 1)
    }
}
