//! Shared enforcer with reader/writer semantics.
//!
//! [`SyncedEnforcer`] wraps an [`Enforcer`] in `Arc<tokio::sync::RwLock>`:
//! enforcement and queries take a read lease (many may run concurrently),
//! mutations take an exclusive write lease. That yields the required
//! guarantees directly: enforcement never observes a partially applied
//! mutation, two mutations never interleave, and batch enforcement runs
//! under a single read guard, so the whole batch sees one stable snapshot.
//!
//! The convenience methods cover the hot surface; anything else goes
//! through [`SyncedEnforcer::read`] / [`SyncedEnforcer::write`].

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::enforcer::Enforcer;
use crate::error::Result;
use crate::matcher::Value;
use crate::policy::Additions;

/// A cloneable, thread-safe handle to one enforcer.
#[derive(Clone, Debug)]
pub struct SyncedEnforcer {
    inner: Arc<RwLock<Enforcer>>,
}

impl SyncedEnforcer {
    /// Wrap an enforcer for shared use.
    #[must_use]
    pub fn new(enforcer: Enforcer) -> Self {
        Self {
            inner: Arc::new(RwLock::new(enforcer)),
        }
    }

    /// Acquire a read lease for queries not covered by a wrapper method.
    pub async fn read(&self) -> RwLockReadGuard<'_, Enforcer> {
        self.inner.read().await
    }

    /// Acquire an exclusive write lease.
    pub async fn write(&self) -> RwLockWriteGuard<'_, Enforcer> {
        self.inner.write().await
    }

    /// Decide a request under a read lease.
    pub async fn enforce<I, V>(&self, request: I) -> Result<bool>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.inner.read().await.enforce(request)
    }

    /// Decide a request with explanations under a read lease.
    pub async fn enforce_ex<I, V>(&self, request: I) -> Result<(bool, Vec<Vec<String>>)>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.inner.read().await.enforce_ex(request)
    }

    /// Decide a batch under one read lease (single stable snapshot).
    pub async fn batch_enforce(&self, requests: Vec<Vec<Value>>) -> Result<Vec<bool>> {
        self.inner.read().await.batch_enforce(requests)
    }

    /// Add one `p` rule under a write lease.
    pub async fn add_policy<I, S>(&self, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.write().await.add_policy(rule).await
    }

    /// Add a batch of `p` rules under a write lease.
    pub async fn add_policies<I, R, S>(&self, rules: I) -> Result<Additions>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.write().await.add_policies(rules).await
    }

    /// Remove one `p` rule under a write lease.
    pub async fn remove_policy<I, S>(&self, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.write().await.remove_policy(rule).await
    }

    /// Add one `g` rule under a write lease.
    pub async fn add_grouping_policy<I, S>(&self, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.write().await.add_grouping_policy(rule).await
    }

    /// Remove one `g` rule under a write lease.
    pub async fn remove_grouping_policy<I, S>(&self, rule: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.write().await.remove_grouping_policy(rule).await
    }

    /// Grant a role under a write lease.
    pub async fn add_role_for_user(
        &self,
        user: &str,
        role: &str,
        domain: Option<&str>,
    ) -> Result<()> {
        self.inner
            .write()
            .await
            .add_role_for_user(user, role, domain)
            .await
    }

    /// Revoke a role under a write lease.
    pub async fn delete_role_for_user(
        &self,
        user: &str,
        role: &str,
        domain: Option<&str>,
    ) -> Result<()> {
        self.inner
            .write()
            .await
            .delete_role_for_user(user, role, domain)
            .await
    }

    /// Reload from the adapter under a write lease.
    pub async fn load_policy(&self) -> Result<()> {
        self.inner.write().await.load_policy().await
    }

    /// Persist through the adapter under a write lease.
    pub async fn save_policy(&self) -> Result<()> {
        self.inner.write().await.save_policy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::model::Model;

    const MODEL: &str = r"
[request_definition]
r = sub, obj, act
[policy_definition]
p = sub, obj, act
[policy_effect]
e = some(where (p.eft == allow))
[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
";

    async fn synced() -> SyncedEnforcer {
        let model: Model = MODEL.parse().unwrap();
        let enforcer = Enforcer::from_model(model, MemoryAdapter::new()).await.unwrap();
        SyncedEnforcer::new(enforcer)
    }

    #[tokio::test]
    async fn shared_handle_sees_mutations() {
        let e = synced().await;
        let reader = e.clone();

        assert!(!reader.enforce(["alice", "data1", "read"]).await.unwrap());
        e.add_policy(["alice", "data1", "read"]).await.unwrap();
        assert!(reader.enforce(["alice", "data1", "read"]).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_and_writers() {
        let e = synced().await;
        e.add_policy(["alice", "data1", "read"]).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let handle = e.clone();
            tasks.push(tokio::spawn(async move {
                if i % 4 == 0 {
                    let rule = [format!("user{i}"), "data1".to_string(), "read".to_string()];
                    handle.add_policy(rule).await.unwrap();
                    true
                } else {
                    handle.enforce(["alice", "data1", "read"]).await.unwrap()
                }
            }));
        }
        for task in tasks {
            // No reader may ever observe a torn store.
            assert!(task.await.unwrap());
        }

        let guard = e.read().await;
        assert_eq!(guard.get_policy().len(), 3);
    }

    #[tokio::test]
    async fn batch_runs_on_one_snapshot() {
        let e = synced().await;
        e.add_policy(["alice", "data1", "read"]).await.unwrap();
        let results = e
            .batch_enforce(vec![
                vec!["alice".into(), "data1".into(), "read".into()],
                vec!["bob".into(), "data1".into(), "read".into()],
            ])
            .await
            .unwrap();
        assert_eq!(results, vec![true, false]);
    }
}
