//! RBAC convenience APIs: role assignment, permission queries, and
//! transitive (implicit) expansion.
//!
//! Everything here is sugar over the policy tables and the role managers.
//! Two sourcing rules hold throughout: subjects and permissions come from
//! policy tables, roles and memberships come from grouping tables — the
//! two are never conflated, including in the by-domain queries.

use std::collections::HashSet;

use crate::enforcer::Enforcer;
use crate::error::Result;
use crate::policy::Section;
use crate::rbac::DEFAULT_MAX_DEPTH;

fn grouping_rule(user: &str, role: &str, domain: Option<&str>) -> Vec<String> {
    let mut rule = vec![user.to_string(), role.to_string()];
    if let Some(d) = domain {
        rule.push(d.to_string());
    }
    rule
}

impl Enforcer {
    // ─────────────────────────────────────────────────────────────────
    // Direct role queries
    // ─────────────────────────────────────────────────────────────────

    /// Direct roles of `user` under `g`.
    #[must_use]
    pub fn get_roles_for_user(&self, user: &str, domain: Option<&str>) -> Vec<String> {
        self.role_manager("g")
            .map(|rm| rm.read().get_roles(user, domain))
            .unwrap_or_default()
    }

    /// Direct members of `role` under `g`.
    #[must_use]
    pub fn get_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
        self.role_manager("g")
            .map(|rm| rm.read().get_users(role, domain))
            .unwrap_or_default()
    }

    /// Whether `user` directly holds `role`.
    #[must_use]
    pub fn has_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> bool {
        self.get_roles_for_user(user, domain)
            .iter()
            .any(|r| r == role)
    }

    // ─────────────────────────────────────────────────────────────────
    // Role mutations
    // ─────────────────────────────────────────────────────────────────

    /// Grant `role` to `user`.
    pub async fn add_role_for_user(
        &mut self,
        user: &str,
        role: &str,
        domain: Option<&str>,
    ) -> Result<()> {
        self.add_grouping_policy(grouping_rule(user, role, domain))
            .await
    }

    /// Revoke `role` from `user`.
    pub async fn delete_role_for_user(
        &mut self,
        user: &str,
        role: &str,
        domain: Option<&str>,
    ) -> Result<()> {
        self.remove_grouping_policy(grouping_rule(user, role, domain))
            .await
    }

    /// Revoke every role of `user`; returns whether anything was removed.
    pub async fn delete_roles_for_user(
        &mut self,
        user: &str,
        domain: Option<&str>,
    ) -> Result<bool> {
        let fields = match domain {
            Some(d) => vec![user.to_string(), String::new(), d.to_string()],
            None => vec![user.to_string()],
        };
        let removed = self.remove_filtered_grouping_policy(0, fields).await?;
        Ok(!removed.is_empty())
    }

    /// Erase a user entirely: role memberships and direct permissions.
    pub async fn delete_user(&mut self, user: &str) -> Result<bool> {
        let roles = self
            .remove_filtered_grouping_policy(0, [user.to_string()])
            .await?;
        let permissions = self.remove_filtered_policy(0, [user.to_string()]).await?;
        Ok(!roles.is_empty() || !permissions.is_empty())
    }

    /// Erase a role entirely: memberships pointing at it and permissions
    /// granted to it.
    pub async fn delete_role(&mut self, role: &str) -> Result<bool> {
        let memberships = self
            .remove_filtered_grouping_policy(1, [role.to_string()])
            .await?;
        let permissions = self.remove_filtered_policy(0, [role.to_string()]).await?;
        Ok(!memberships.is_empty() || !permissions.is_empty())
    }

    // ─────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────

    /// Grant `user` a permission (the `p` rule `[user, …permission]`).
    pub async fn add_permission_for_user<I, S>(&mut self, user: &str, permission: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = vec![user.to_string()];
        rule.extend(permission.into_iter().map(Into::into));
        self.add_policy(rule).await
    }

    /// Revoke one permission from `user`.
    pub async fn delete_permission_for_user<I, S>(
        &mut self,
        user: &str,
        permission: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = vec![user.to_string()];
        rule.extend(permission.into_iter().map(Into::into));
        self.remove_policy(rule).await
    }

    /// Revoke every permission of `user`; returns whether anything was
    /// removed.
    pub async fn delete_permissions_for_user(&mut self, user: &str) -> Result<bool> {
        let removed = self.remove_filtered_policy(0, [user.to_string()]).await?;
        Ok(!removed.is_empty())
    }

    /// Remove a permission from every subject holding it.
    pub async fn delete_permission<I, S>(&mut self, permission: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = permission.into_iter().map(Into::into).collect();
        let removed = self.remove_filtered_policy(1, fields).await?;
        Ok(!removed.is_empty())
    }

    /// Direct permissions of `user` (optionally scoped to a domain at
    /// field 1).
    #[must_use]
    pub fn get_permissions_for_user(&self, user: &str, domain: Option<&str>) -> Vec<Vec<String>> {
        let fields = match domain {
            Some(d) => vec![user.to_string(), d.to_string()],
            None => vec![user.to_string()],
        };
        self.get_filtered_policy(0, fields)
    }

    /// Whether `user` directly holds the permission.
    #[must_use]
    pub fn has_permission_for_user<I, S>(&self, user: &str, permission: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = vec![user.to_string()];
        rule.extend(permission.into_iter().map(Into::into));
        self.has_policy(rule)
    }

    // ─────────────────────────────────────────────────────────────────
    // Implicit (transitive) queries
    // ─────────────────────────────────────────────────────────────────

    /// Roles of `user` including inherited ones, breadth-first up to the
    /// default depth bound.
    #[must_use]
    pub fn get_implicit_roles_for_user(&self, user: &str, domain: Option<&str>) -> Vec<String> {
        self.expand(user, domain, |name, dom| self.get_roles_for_user(name, dom))
    }

    /// Users holding `role` directly or through inheritance.
    #[must_use]
    pub fn get_implicit_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
        self.expand(role, domain, |name, dom| self.get_users_for_role(name, dom))
    }

    /// Permissions of `user` plus those of every implicit role.
    #[must_use]
    pub fn get_implicit_permissions_for_user(
        &self,
        user: &str,
        domain: Option<&str>,
    ) -> Vec<Vec<String>> {
        let mut subjects = vec![user.to_string()];
        subjects.extend(self.get_implicit_roles_for_user(user, domain));

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for subject in subjects {
            for rule in self.get_permissions_for_user(&subject, domain) {
                if seen.insert(rule.clone()) {
                    out.push(rule);
                }
            }
        }
        out
    }

    /// Breadth-first neighbor expansion, excluding the start node.
    fn expand<F>(&self, start: &str, domain: Option<&str>, neighbors: F) -> Vec<String>
    where
        F: Fn(&str, Option<&str>) -> Vec<String>,
    {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.to_string());
        let mut frontier = vec![start.to_string()];
        let mut out = Vec::new();
        for _ in 0..DEFAULT_MAX_DEPTH {
            let mut next = Vec::new();
            for node in &frontier {
                for found in neighbors(node, domain) {
                    if visited.insert(found.clone()) {
                        out.push(found.clone());
                        next.push(found);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }

    // ─────────────────────────────────────────────────────────────────
    // Domain-scoped variants
    // ─────────────────────────────────────────────────────────────────

    /// Direct roles of `user` within `domain`.
    #[must_use]
    pub fn get_roles_for_user_in_domain(&self, user: &str, domain: &str) -> Vec<String> {
        self.get_roles_for_user(user, Some(domain))
    }

    /// Direct members of `role` within `domain`.
    #[must_use]
    pub fn get_users_for_role_in_domain(&self, role: &str, domain: &str) -> Vec<String> {
        self.get_users_for_role(role, Some(domain))
    }

    /// Grant `role` to `user` within `domain`.
    pub async fn add_role_for_user_in_domain(
        &mut self,
        user: &str,
        role: &str,
        domain: &str,
    ) -> Result<()> {
        self.add_role_for_user(user, role, Some(domain)).await
    }

    /// Revoke `role` from `user` within `domain`.
    pub async fn delete_role_for_user_in_domain(
        &mut self,
        user: &str,
        role: &str,
        domain: &str,
    ) -> Result<()> {
        self.delete_role_for_user(user, role, Some(domain)).await
    }

    /// Direct permissions of `user` within `domain`.
    #[must_use]
    pub fn get_permissions_for_user_in_domain(
        &self,
        user: &str,
        domain: &str,
    ) -> Vec<Vec<String>> {
        self.get_permissions_for_user(user, Some(domain))
    }

    /// Distinct subjects granted permissions in `domain` (policy table,
    /// field 0, filtered by the domain field at position 1).
    ///
    /// Subjects come from policy tables; use
    /// [`Enforcer::get_all_roles_by_domain`] for the grouping side.
    #[must_use]
    pub fn get_all_users_by_domain(&self, domain: &str) -> Vec<String> {
        let filter = vec![String::new(), domain.to_string()];
        let mut users: Vec<String> = self
            .store
            .get_filtered(Section::Policy, "p", 0, &filter)
            .into_iter()
            .filter_map(|rule| rule.first().cloned())
            .collect();
        users.sort_unstable();
        users.dedup();
        users
    }

    /// Distinct roles granted in `domain` (grouping table, field 1).
    #[must_use]
    pub fn get_all_roles_by_domain(&self, domain: &str) -> Vec<String> {
        let filter = vec![String::new(), String::new(), domain.to_string()];
        let mut roles: Vec<String> = self
            .store
            .get_filtered(Section::Grouping, "g", 0, &filter)
            .into_iter()
            .filter_map(|rule| rule.get(1).cloned())
            .collect();
        roles.sort_unstable();
        roles.dedup();
        roles
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::adapter::MemoryAdapter;
    use crate::enforcer::Enforcer;
    use crate::model::Model;

    const RBAC_MODEL: &str = r"
[request_definition]
r = sub, obj, act
[policy_definition]
p = sub, obj, act
[role_definition]
g = _, _
[policy_effect]
e = some(where (p.eft == allow))
[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
";

    const DOMAIN_MODEL: &str = r"
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

    async fn rbac() -> Enforcer {
        let model: Model = RBAC_MODEL.parse().unwrap();
        Enforcer::from_model(model, MemoryAdapter::new()).await.unwrap()
    }

    async fn domains() -> Enforcer {
        let model: Model = DOMAIN_MODEL.parse().unwrap();
        Enforcer::from_model(model, MemoryAdapter::new()).await.unwrap()
    }

    // ── Roles ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn role_assignment_round_trip() {
        let mut e = rbac().await;
        e.add_role_for_user("alice", "admin", None).await.unwrap();
        assert!(e.has_role_for_user("alice", "admin", None));
        assert_eq!(e.get_roles_for_user("alice", None), vec!["admin"]);
        assert_eq!(e.get_users_for_role("admin", None), vec!["alice"]);

        e.delete_role_for_user("alice", "admin", None).await.unwrap();
        assert!(!e.has_role_for_user("alice", "admin", None));
    }

    #[tokio::test]
    async fn unknown_user_has_no_roles() {
        let e = rbac().await;
        assert!(e.get_roles_for_user("ghost", None).is_empty());
        assert!(e.get_users_for_role("ghost", None).is_empty());
    }

    #[tokio::test]
    async fn implicit_roles_follow_the_hierarchy() {
        let mut e = rbac().await;
        e.add_role_for_user("alice", "admin", None).await.unwrap();
        e.add_role_for_user("admin", "superuser", None).await.unwrap();

        // Direct query stays direct.
        assert_eq!(e.get_roles_for_user("alice", None), vec!["admin"]);
        assert_eq!(
            e.get_implicit_roles_for_user("alice", None),
            vec!["admin", "superuser"]
        );
        assert_eq!(
            e.get_implicit_users_for_role("superuser", None),
            vec!["admin", "alice"]
        );
    }

    // ── Permissions ───────────────────────────────────────────────────

    #[tokio::test]
    async fn permission_round_trip() {
        let mut e = rbac().await;
        e.add_permission_for_user("alice", ["data1", "read"])
            .await
            .unwrap();
        assert!(e.has_permission_for_user("alice", ["data1", "read"]));
        assert_eq!(
            e.get_permissions_for_user("alice", None),
            vec![vec![
                "alice".to_string(),
                "data1".to_string(),
                "read".to_string()
            ]]
        );

        e.delete_permission_for_user("alice", ["data1", "read"])
            .await
            .unwrap();
        assert!(!e.has_permission_for_user("alice", ["data1", "read"]));
    }

    #[tokio::test]
    async fn implicit_permissions_include_role_grants() {
        let mut e = rbac().await;
        e.add_permission_for_user("admin", ["data1", "read"])
            .await
            .unwrap();
        e.add_permission_for_user("alice", ["data2", "write"])
            .await
            .unwrap();
        e.add_role_for_user("alice", "admin", None).await.unwrap();

        let perms = e.get_implicit_permissions_for_user("alice", None);
        assert_eq!(perms.len(), 2);
        assert!(perms.contains(&vec![
            "admin".to_string(),
            "data1".to_string(),
            "read".to_string()
        ]));
    }

    #[tokio::test]
    async fn delete_user_erases_roles_and_permissions() {
        let mut e = rbac().await;
        e.add_permission_for_user("alice", ["data1", "read"])
            .await
            .unwrap();
        e.add_role_for_user("alice", "admin", None).await.unwrap();

        assert!(e.delete_user("alice").await.unwrap());
        assert!(e.get_permissions_for_user("alice", None).is_empty());
        assert!(e.get_roles_for_user("alice", None).is_empty());
        assert!(!e.delete_user("alice").await.unwrap());
    }

    #[tokio::test]
    async fn delete_role_erases_memberships_and_grants() {
        let mut e = rbac().await;
        e.add_permission_for_user("admin", ["data1", "read"])
            .await
            .unwrap();
        e.add_role_for_user("alice", "admin", None).await.unwrap();

        assert!(e.delete_role("admin").await.unwrap());
        assert!(!e.enforce(["alice", "data1", "read"]).unwrap());
        assert!(e.get_users_for_role("admin", None).is_empty());
    }

    // ── Domains ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn domain_scoped_roles_and_permissions() {
        let mut e = domains().await;
        e.add_policy(["admin", "d1", "data1", "read"]).await.unwrap();
        e.add_role_for_user_in_domain("alice", "admin", "d1")
            .await
            .unwrap();

        assert_eq!(e.get_roles_for_user_in_domain("alice", "d1"), vec!["admin"]);
        assert!(e.get_roles_for_user_in_domain("alice", "d2").is_empty());
        assert_eq!(e.get_users_for_role_in_domain("admin", "d1"), vec!["alice"]);
        assert_eq!(
            e.get_permissions_for_user_in_domain("admin", "d1"),
            vec![vec![
                "admin".to_string(),
                "d1".to_string(),
                "data1".to_string(),
                "read".to_string()
            ]]
        );
    }

    #[tokio::test]
    async fn by_domain_queries_keep_users_and_roles_distinct() {
        let mut e = domains().await;
        e.add_policy(["admin", "d1", "data1", "read"]).await.unwrap();
        e.add_policy(["auditor", "d1", "data1", "read"]).await.unwrap();
        e.add_policy(["admin", "d2", "data2", "read"]).await.unwrap();
        e.add_role_for_user_in_domain("alice", "admin", "d1")
            .await
            .unwrap();
        e.add_role_for_user_in_domain("bob", "viewer", "d1")
            .await
            .unwrap();

        // Subjects come from the policy table, filtered by its domain field.
        assert_eq!(e.get_all_users_by_domain("d1"), vec!["admin", "auditor"]);
        assert_eq!(e.get_all_users_by_domain("d2"), vec!["admin"]);
        // Roles come from the grouping table.
        assert_eq!(e.get_all_roles_by_domain("d1"), vec!["admin", "viewer"]);
        assert!(e.get_all_roles_by_domain("d2").is_empty());
    }
}
