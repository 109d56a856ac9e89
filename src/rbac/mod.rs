//! Role inheritance: the role-manager contract and its default graph
//! implementation.
//!
//! A role manager maintains the directed graph behind one grouping type
//! (`g`, `g2`, …). Nodes are `(name, domain)` pairs; an edge means "name1
//! inherits name2". The enforcer consults the manager through `g`-family
//! matcher calls and through the RBAC query APIs.

mod default_role_manager;

use std::sync::Arc;

pub use default_role_manager::{DEFAULT_MAX_DEPTH, DefaultRoleManager};

/// Pattern-matching hook for role or domain names.
///
/// Called as `f(request_name, stored_name)`; returning `true` widens
/// traversal to edges stored under `stored_name`.
pub type MatchingFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Contract for role-graph implementations.
///
/// All operations are scoped by `domain`; `None` addresses the default
/// scope, which is distinct from every named domain.
pub trait RoleManager: Send + Sync {
    /// Drop every link.
    fn clear(&mut self);

    /// Add the inheritance link `name1 → name2`. Idempotent.
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>);

    /// Remove the inheritance link `name1 → name2`. Idempotent.
    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>);

    /// Whether `name1` inherits `name2` within the bounded transitive
    /// closure (reflexive; path length capped by the manager's max depth).
    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Direct roles of `name` (out-neighbors only, no transitive closure).
    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Direct members of `name` (in-neighbors only).
    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Install pattern-matching hooks for role names and domain names.
    ///
    /// Passing `None` clears the corresponding hook.
    fn set_matching_fns(&mut self, role_fn: Option<MatchingFn>, domain_fn: Option<MatchingFn>);
}
