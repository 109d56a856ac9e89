//! Default role manager: adjacency maps with a bounded breadth-first
//! closure.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use super::{MatchingFn, RoleManager};

/// Default bound on transitive-closure depth.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Per-domain adjacency: name → direct roles.
type Adjacency = HashMap<String, BTreeSet<String>>;

/// Role graph keyed by `(name, domain)` with a bounded BFS for `has_link`.
///
/// Query results are returned in sorted order. With a domain matching
/// function installed, queries traverse every stored domain the function
/// accepts; otherwise each domain is an isolated scope.
pub struct DefaultRoleManager {
    domains: HashMap<String, Adjacency>,
    max_depth: usize,
    role_fn: Option<MatchingFn>,
    domain_fn: Option<MatchingFn>,
}

impl fmt::Debug for DefaultRoleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultRoleManager")
            .field("domains", &self.domains)
            .field("max_depth", &self.max_depth)
            .field("role_fn", &self.role_fn.is_some())
            .field("domain_fn", &self.domain_fn.is_some())
            .finish()
    }
}

impl Default for DefaultRoleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultRoleManager {
    /// Manager with the default depth bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Manager with a custom depth bound (maximum inheritance path length).
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            domains: HashMap::new(),
            max_depth,
            role_fn: None,
            domain_fn: None,
        }
    }

    /// The configured depth bound.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Adjacency maps of every domain the query domain reaches.
    fn matching_domains(&self, domain: &str) -> Vec<&Adjacency> {
        match &self.domain_fn {
            None => self.domains.get(domain).into_iter().collect(),
            Some(f) => self
                .domains
                .iter()
                .filter(|(stored, _)| stored.as_str() == domain || f(domain, stored))
                .map(|(_, adj)| adj)
                .collect(),
        }
    }

    /// Direct roles of `name` across the given adjacency maps, honoring the
    /// role pattern hook for edge sources.
    fn direct_roles_in(&self, adjacencies: &[&Adjacency], name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for adj in adjacencies {
            match &self.role_fn {
                None => {
                    if let Some(set) = adj.get(name) {
                        out.extend(set.iter().cloned());
                    }
                }
                Some(f) => {
                    for (source, set) in adj.iter() {
                        if source == name || f(name, source) {
                            out.extend(set.iter().cloned());
                        }
                    }
                }
            }
        }
        out
    }
}

fn scope(domain: Option<&str>) -> &str {
    domain.unwrap_or("")
}

impl RoleManager for DefaultRoleManager {
    fn clear(&mut self) {
        self.domains.clear();
    }

    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        self.domains
            .entry(scope(domain).to_string())
            .or_default()
            .entry(name1.to_string())
            .or_default()
            .insert(name2.to_string());
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        let dom = scope(domain);
        if let Some(adj) = self.domains.get_mut(dom) {
            if let Some(set) = adj.get_mut(name1) {
                set.remove(name2);
                if set.is_empty() {
                    adj.remove(name1);
                }
            }
            if adj.is_empty() {
                self.domains.remove(dom);
            }
        }
    }

    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        if name1 == name2 {
            return true;
        }
        let adjacencies = self.matching_domains(scope(domain));
        if adjacencies.is_empty() {
            return false;
        }

        // BFS bounded by max_depth; the visited set makes cycles terminate.
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(name1.to_string());
        let mut frontier = vec![name1.to_string()];
        for _ in 0..self.max_depth {
            let mut next = Vec::new();
            for node in &frontier {
                for role in self.direct_roles_in(&adjacencies, node) {
                    if role == name2 {
                        return true;
                    }
                    if visited.insert(role.clone()) {
                        next.push(role);
                    }
                }
            }
            if next.is_empty() {
                return false;
            }
            frontier = next;
        }
        false
    }

    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let adjacencies = self.matching_domains(scope(domain));
        self.direct_roles_in(&adjacencies, name)
            .into_iter()
            .collect()
    }

    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let mut out = BTreeSet::new();
        for adj in self.matching_domains(scope(domain)) {
            for (source, set) in adj.iter() {
                if set.contains(name) {
                    out.insert(source.clone());
                }
            }
        }
        out.into_iter().collect()
    }

    fn set_matching_fns(&mut self, role_fn: Option<MatchingFn>, domain_fn: Option<MatchingFn>) {
        self.role_fn = role_fn;
        self.domain_fn = domain_fn;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::matcher::functions;

    fn manager_with(links: &[(&str, &str)]) -> DefaultRoleManager {
        let mut rm = DefaultRoleManager::new();
        for (u, r) in links {
            rm.add_link(u, r, None);
        }
        rm
    }

    // ── Links ─────────────────────────────────────────────────────────

    #[test]
    fn reflexive_for_any_name() {
        let rm = DefaultRoleManager::new();
        assert!(rm.has_link("alice", "alice", None));
        assert!(rm.has_link("alice", "alice", Some("d1")));
    }

    #[test]
    fn direct_and_transitive_links() {
        let rm = manager_with(&[("alice", "admin"), ("admin", "superuser")]);
        assert!(rm.has_link("alice", "admin", None));
        assert!(rm.has_link("alice", "superuser", None));
        assert!(!rm.has_link("admin", "alice", None));
        assert!(!rm.has_link("bob", "admin", None));
    }

    #[test]
    fn add_link_is_idempotent() {
        let mut rm = manager_with(&[("alice", "admin")]);
        rm.add_link("alice", "admin", None);
        assert_eq!(rm.get_roles("alice", None), vec!["admin".to_string()]);
    }

    #[test]
    fn delete_link_is_idempotent() {
        let mut rm = manager_with(&[("alice", "admin")]);
        rm.delete_link("alice", "admin", None);
        assert!(!rm.has_link("alice", "admin", None));
        // Deleting again is a no-op.
        rm.delete_link("alice", "admin", None);
        assert!(!rm.has_link("alice", "admin", None));
    }

    #[test]
    fn delete_breaks_transitive_paths() {
        let mut rm = manager_with(&[("alice", "admin"), ("admin", "superuser")]);
        rm.delete_link("alice", "admin", None);
        assert!(!rm.has_link("alice", "superuser", None));
        assert!(rm.has_link("admin", "superuser", None));
    }

    #[test]
    fn cycles_terminate() {
        let rm = manager_with(&[("a", "b"), ("b", "c"), ("c", "a")]);
        assert!(rm.has_link("a", "c", None));
        assert!(!rm.has_link("a", "z", None));
    }

    #[test]
    fn depth_bound_cuts_long_chains() {
        let mut rm = DefaultRoleManager::with_max_depth(2);
        rm.add_link("u", "r1", None);
        rm.add_link("r1", "r2", None);
        rm.add_link("r2", "r3", None);
        assert!(rm.has_link("u", "r2", None));
        assert!(!rm.has_link("u", "r3", None));
    }

    // ── Domains ───────────────────────────────────────────────────────

    #[test]
    fn domains_are_isolated_scopes() {
        let mut rm = DefaultRoleManager::new();
        rm.add_link("alice", "admin", Some("d1"));
        assert!(rm.has_link("alice", "admin", Some("d1")));
        assert!(!rm.has_link("alice", "admin", Some("d2")));
        assert!(!rm.has_link("alice", "admin", None));
    }

    #[test]
    fn default_scope_is_distinct_from_named_domains() {
        let mut rm = DefaultRoleManager::new();
        rm.add_link("alice", "admin", None);
        assert!(rm.has_link("alice", "admin", None));
        assert!(!rm.has_link("alice", "admin", Some("d1")));
    }

    #[test]
    fn domain_matching_fn_widens_traversal() {
        let mut rm = DefaultRoleManager::new();
        rm.add_link("alice", "admin", Some("*"));
        assert!(!rm.has_link("alice", "admin", Some("d1")));

        rm.set_matching_fns(
            None,
            Some(Arc::new(|req, stored| {
                functions::key_match(req, stored)
            })),
        );
        assert!(rm.has_link("alice", "admin", Some("d1")));
        assert!(rm.has_link("alice", "admin", Some("d2")));
    }

    #[test]
    fn role_matching_fn_matches_pattern_sources() {
        let mut rm = DefaultRoleManager::new();
        rm.add_link("/books/*", "book_group", None);
        assert!(!rm.has_link("/books/1", "book_group", None));

        rm.set_matching_fns(
            Some(Arc::new(|req, stored| functions::key_match(req, stored))),
            None,
        );
        assert!(rm.has_link("/books/1", "book_group", None));
        assert!(!rm.has_link("/pens/1", "book_group", None));
    }

    // ── Queries ───────────────────────────────────────────────────────

    #[test]
    fn get_roles_is_direct_only_and_sorted() {
        let rm = manager_with(&[("alice", "writer"), ("alice", "admin"), ("admin", "root")]);
        assert_eq!(
            rm.get_roles("alice", None),
            vec!["admin".to_string(), "writer".to_string()]
        );
        assert!(rm.get_roles("carol", None).is_empty());
    }

    #[test]
    fn get_users_is_direct_only_and_sorted() {
        let rm = manager_with(&[("alice", "admin"), ("bob", "admin"), ("carol", "writer")]);
        assert_eq!(
            rm.get_users("admin", None),
            vec!["alice".to_string(), "bob".to_string()]
        );
        assert!(rm.get_users("missing", None).is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut rm = manager_with(&[("alice", "admin")]);
        rm.clear();
        assert!(!rm.has_link("alice", "admin", None));
        assert!(rm.get_roles("alice", None).is_empty());
    }
}
