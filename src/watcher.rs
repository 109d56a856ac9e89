//! Watcher contract for propagating policy changes across enforcer
//! instances.
//!
//! A watcher is owned by the host; the enforcer only notifies it after
//! mutations (when `auto_notify_watcher` is on) and never fails a mutation
//! over a notification error — those are logged and swallowed.
//!
//! Events carry the structured operation (dispatcher-grade payloads), so a
//! peer can apply the same mutation through the enforcer's `self_*`
//! methods instead of reloading everything. Self-applied changes skip
//! persistence and re-notification, which keeps notification loops from
//! forming; receiving the same event twice is idempotent for every
//! operation except `Update` (adds and removes simply find nothing left
//! to do).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::policy::Section;

/// Structured description of one policy mutation.
///
/// Serializes as a tagged object (`"op"` discriminant), which is the wire
/// shape transport-backed watcher implementations exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EventData {
    /// One rule added
    AddPolicy {
        /// Rule family
        sec: Section,
        /// Table name
        ptype: String,
        /// The added rule
        rule: Vec<String>,
    },
    /// A batch of rules added
    AddPolicies {
        /// Rule family
        sec: Section,
        /// Table name
        ptype: String,
        /// The added rules
        rules: Vec<Vec<String>>,
    },
    /// One rule removed
    RemovePolicy {
        /// Rule family
        sec: Section,
        /// Table name
        ptype: String,
        /// The removed rule
        rule: Vec<String>,
    },
    /// A batch of rules removed
    RemovePolicies {
        /// Rule family
        sec: Section,
        /// Table name
        ptype: String,
        /// The removed rules
        rules: Vec<Vec<String>>,
    },
    /// A filtered removal
    RemoveFilteredPolicy {
        /// Rule family
        sec: Section,
        /// Table name
        ptype: String,
        /// First matched field
        field_index: usize,
        /// Filter values (empty string = wildcard)
        field_values: Vec<String>,
    },
    /// One rule replaced
    UpdatePolicy {
        /// Rule family
        sec: Section,
        /// Table name
        ptype: String,
        /// The rule that was replaced
        old: Vec<String>,
        /// Its replacement
        new: Vec<String>,
    },
    /// A batch of rules replaced pairwise
    UpdatePolicies {
        /// Rule family
        sec: Section,
        /// Table name
        ptype: String,
        /// The rules that were replaced
        olds: Vec<Vec<String>>,
        /// Their replacements
        news: Vec<Vec<String>>,
    },
    /// The full store was persisted
    SavePolicy,
    /// The store was cleared
    ClearPolicy,
}

impl EventData {
    /// Short operation tag for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddPolicy { .. } => "add_policy",
            Self::AddPolicies { .. } => "add_policies",
            Self::RemovePolicy { .. } => "remove_policy",
            Self::RemovePolicies { .. } => "remove_policies",
            Self::RemoveFilteredPolicy { .. } => "remove_filtered_policy",
            Self::UpdatePolicy { .. } => "update_policy",
            Self::UpdatePolicies { .. } => "update_policies",
            Self::SavePolicy => "save_policy",
            Self::ClearPolicy => "clear_policy",
        }
    }
}

/// Callback invoked when a peer's change arrives.
pub type UpdateCallback = Box<dyn FnMut(EventData) + Send>;

/// Contract for change propagators.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Begin listening for peer notifications.
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop listening.
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Install the callback invoked for inbound changes.
    fn set_update_callback(&mut self, callback: UpdateCallback);

    /// Broadcast a local mutation to peers.
    async fn notify(&mut self, event: EventData) -> Result<()>;

    /// Broadcast on behalf of a named enforcer (multi-enforcer hosts).
    async fn notify_for(&mut self, enforcer_id: &str, event: EventData) -> Result<()> {
        let _ = enforcer_id;
        self.notify(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_round_trip_as_tagged_json() {
        let event = EventData::AddPolicy {
            sec: Section::Policy,
            ptype: "p".into(),
            rule: vec!["alice".into(), "data1".into(), "read".into()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["op"], "add_policy");
        assert_eq!(json["sec"], "policy");

        let back: EventData = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unit_events_carry_only_the_tag() {
        let json = serde_json::to_value(EventData::SavePolicy).unwrap();
        assert_eq!(json, serde_json::json!({ "op": "save_policy" }));
    }
}
