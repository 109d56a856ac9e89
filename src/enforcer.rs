//! The enforcer: model, policy store, role managers, function table, and
//! flags, composed into the decision pipeline.
//!
//! # Pipeline
//!
//! For each candidate rule of the addressed policy type, the matcher runs
//! with `r.*` bound to the request and `p.*` bound to the rule; the
//! per-rule `(matched, eft)` outcomes stream through the effect
//! aggregator, which stops as soon as the decision is final. Matcher
//! errors abort the call as typed errors — they are never silently treated
//! as deny.
//!
//! Enforcement and all role-graph queries are synchronous in-memory work;
//! only adapter loads/saves and watcher notifications suspend.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::adapter::{Adapter, FileAdapter};
use crate::effect::{Eft, EffectStream};
use crate::error::{Error, Result};
use crate::matcher::{
    self, EvalContext, Expr, FunctionMap, LinkQuery, MatcherFunction, Value, eval_bool,
};
use crate::model::Model;
use crate::policy::{PolicyStore, Section};
use crate::rbac::{DefaultRoleManager, RoleManager};
use crate::watcher::Watcher;

/// A role manager shared between the enforcer and host code.
pub type SharedRoleManager = Arc<RwLock<dyn RoleManager>>;

/// Model keys addressed by one enforce call.
///
/// Defaults to `r` / `p` / `e` / `m`; [`EnforceContext::new`] suffixes all
/// four for models that define named variants (`r2`, `p2`, …).
#[derive(Debug, Clone)]
pub struct EnforceContext {
    /// Request definition key
    pub rtype: String,
    /// Policy definition key
    pub ptype: String,
    /// Policy effect key
    pub etype: String,
    /// Matcher key
    pub mtype: String,
}

impl Default for EnforceContext {
    fn default() -> Self {
        Self::new("")
    }
}

impl EnforceContext {
    /// Context addressing `r<suffix>` / `p<suffix>` / `e<suffix>` /
    /// `m<suffix>`.
    #[must_use]
    pub fn new(suffix: &str) -> Self {
        Self {
            rtype: format!("r{suffix}"),
            ptype: format!("p{suffix}"),
            etype: format!("e{suffix}"),
            mtype: format!("m{suffix}"),
        }
    }
}

/// The decision engine.
///
/// One enforcer exclusively owns its model, store, and role managers; see
/// [`crate::synced::SyncedEnforcer`] for the shared, reader/writer
/// wrapper.
pub struct Enforcer {
    pub(crate) model: Model,
    pub(crate) store: PolicyStore,
    pub(crate) adapter: Box<dyn Adapter>,
    pub(crate) watcher: Option<Box<dyn Watcher>>,
    pub(crate) role_managers: HashMap<String, SharedRoleManager>,
    pub(crate) functions: FunctionMap,
    pub(crate) enabled: bool,
    pub(crate) auto_save: bool,
    pub(crate) auto_build_role_links: bool,
    pub(crate) auto_notify_watcher: bool,
    matcher_cache: DashMap<String, Arc<Expr>>,
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("store", &self.store)
            .field("enabled", &self.enabled)
            .field("auto_save", &self.auto_save)
            .field("auto_build_role_links", &self.auto_build_role_links)
            .field("auto_notify_watcher", &self.auto_notify_watcher)
            .finish_non_exhaustive()
    }
}

impl Enforcer {
    /// Build from a model file and a CSV policy file.
    pub async fn new(model_path: impl AsRef<Path>, policy_path: impl AsRef<Path>) -> Result<Self> {
        let model = Model::from_file(model_path).await?;
        Self::init(model, Box::new(FileAdapter::new(policy_path.as_ref()))).await
    }

    /// Build from a model file and an adapter.
    pub async fn with_adapter(
        model_path: impl AsRef<Path>,
        adapter: impl Adapter + 'static,
    ) -> Result<Self> {
        let model = Model::from_file(model_path).await?;
        Self::init(model, Box::new(adapter)).await
    }

    /// Build from an already-parsed model and an adapter.
    pub async fn from_model(model: Model, adapter: impl Adapter + 'static) -> Result<Self> {
        Self::init(model, Box::new(adapter)).await
    }

    async fn init(model: Model, adapter: Box<dyn Adapter>) -> Result<Self> {
        let mut role_managers: HashMap<String, SharedRoleManager> = HashMap::new();
        for gtype in model.grouping_types() {
            role_managers.insert(
                gtype.to_string(),
                Arc::new(RwLock::new(DefaultRoleManager::new())),
            );
        }

        let mut enforcer = Self {
            model,
            store: PolicyStore::new(),
            adapter,
            watcher: None,
            role_managers,
            functions: FunctionMap::default(),
            enabled: true,
            auto_save: true,
            auto_build_role_links: true,
            auto_notify_watcher: true,
            matcher_cache: DashMap::new(),
        };
        enforcer.load_policy().await?;
        Ok(enforcer)
    }

    // ─────────────────────────────────────────────────────────────────
    // Enforcement
    // ─────────────────────────────────────────────────────────────────

    /// Decide a request: `true` means allowed.
    pub fn enforce<I, V>(&self, request: I) -> Result<bool>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rvals: Vec<Value> = request.into_iter().map(Into::into).collect();
        self.decide(&EnforceContext::default(), None, &rvals)
            .map(|(decision, _)| decision)
    }

    /// Decide a request and return the rules that produced the decision.
    ///
    /// The explanation is the matched subset for allow-based effects, the
    /// deciding rule for deny and priority outcomes, and empty when
    /// enforcement is disabled.
    pub fn enforce_ex<I, V>(&self, request: I) -> Result<(bool, Vec<Vec<String>>)>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rvals: Vec<Value> = request.into_iter().map(Into::into).collect();
        self.decide(&EnforceContext::default(), None, &rvals)
    }

    /// Decide under explicit model keys (`r2`/`p2`/`e2`/`m2` variants).
    pub fn enforce_with_context<I, V>(&self, ctx: &EnforceContext, request: I) -> Result<bool>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rvals: Vec<Value> = request.into_iter().map(Into::into).collect();
        self.decide(ctx, None, &rvals).map(|(decision, _)| decision)
    }

    /// Decide with an ad-hoc matcher instead of the model's `m`.
    ///
    /// The compiled form is cached per matcher text, so repeated calls
    /// with the same string parse once.
    pub fn enforce_with_matcher<I, V>(&self, matcher: &str, request: I) -> Result<bool>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let expr = self.compile_cached(matcher)?;
        let rvals: Vec<Value> = request.into_iter().map(Into::into).collect();
        self.decide(&EnforceContext::default(), Some(&*expr), &rvals)
            .map(|(decision, _)| decision)
    }

    /// Decide a batch of requests; results come back in input order.
    pub fn batch_enforce(&self, requests: Vec<Vec<Value>>) -> Result<Vec<bool>> {
        requests
            .into_iter()
            .map(|rvals| {
                self.decide(&EnforceContext::default(), None, &rvals)
                    .map(|(decision, _)| decision)
            })
            .collect()
    }

    fn compile_cached(&self, matcher: &str) -> Result<Arc<Expr>> {
        if let Some(expr) = self.matcher_cache.get(matcher) {
            return Ok(expr.clone());
        }
        let expr = Arc::new(matcher::compile(matcher)?);
        self.matcher_cache.insert(matcher.to_string(), expr.clone());
        Ok(expr)
    }

    /// The single decision path behind every `enforce*` variant.
    fn decide(
        &self,
        ctx: &EnforceContext,
        matcher_override: Option<&Expr>,
        rvals: &[Value],
    ) -> Result<(bool, Vec<Vec<String>>)> {
        if !self.enabled {
            tracing::debug!("enforcement disabled, allowing");
            return Ok((true, Vec::new()));
        }

        let rtokens = self.model.request_tokens(&ctx.rtype).ok_or_else(|| {
            Error::ModelSyntax(format!("missing request definition `{}`", ctx.rtype))
        })?;
        if rvals.len() < rtokens.len() {
            return Err(Error::matcher_runtime(format!(
                "request has {} values but `{}` defines {}",
                rvals.len(),
                ctx.rtype,
                rtokens.len()
            )));
        }
        let pdef = self.model.policy_def(&ctx.ptype).ok_or_else(|| {
            Error::ModelSyntax(format!("missing policy definition `{}`", ctx.ptype))
        })?;
        let effect = self
            .model
            .effect(&ctx.etype)
            .ok_or_else(|| Error::ModelSyntax(format!("missing policy effect `{}`", ctx.etype)))?;
        let matcher_expr: &Expr = match matcher_override {
            Some(expr) => expr,
            None => self
                .model
                .matcher(&ctx.mtype)
                .ok_or_else(|| Error::ModelSyntax(format!("missing matcher `{}`", ctx.mtype)))?
                .expr(),
        };

        let rules = self.store.rules(Section::Policy, &ctx.ptype);
        if rules.is_empty() {
            let decision = effect.decision_on_no_rules();
            tracing::debug!(ptype = %ctx.ptype, decision, "no candidate rules");
            return Ok((decision, Vec::new()));
        }

        let mut stream = EffectStream::new(effect);
        let mut evaluated = 0usize;
        for (idx, rule) in rules.iter().enumerate() {
            let pvals: Vec<Value> = rule.iter().map(Value::from).collect();
            let mut env = EvalContext::new(&self.functions);
            env.bind(&ctx.rtype, rtokens, rvals)
                .bind(&ctx.ptype, pdef.tokens(), &pvals)
                .with_links(self);

            let matched = eval_bool(matcher_expr, &env)?;
            let eft = match pdef.eft_index() {
                Some(i) => rule[i]
                    .parse::<Eft>()
                    .map_err(|e| Error::matcher_runtime(e.to_string()))?,
                None => Eft::Allow,
            };
            evaluated = idx + 1;
            if stream.push(idx, matched, eft).is_some() {
                break;
            }
        }

        let (decision, indices) = stream.conclude();
        let explanations: Vec<Vec<String>> =
            indices.into_iter().map(|i| rules[i].clone()).collect();
        tracing::debug!(
            ptype = %ctx.ptype,
            decision,
            evaluated,
            contributing = explanations.len(),
            "enforce"
        );
        Ok((decision, explanations))
    }

    // ─────────────────────────────────────────────────────────────────
    // Flags
    // ─────────────────────────────────────────────────────────────────

    /// Turn enforcement on or off. While off, every request is allowed.
    pub fn enable_enforce(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether enforcement is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Persist each mutation through the adapter as it happens.
    ///
    /// Mutations are skipped (not failed) when the adapter does not
    /// implement the incremental operation.
    pub fn enable_auto_save(&mut self, auto_save: bool) {
        self.auto_save = auto_save;
    }

    /// Rebuild affected role links on each grouping-policy mutation.
    pub fn enable_auto_build_role_links(&mut self, auto_build: bool) {
        self.auto_build_role_links = auto_build;
    }

    /// Notify the watcher after each mutation.
    pub fn enable_auto_notify_watcher(&mut self, auto_notify: bool) {
        self.auto_notify_watcher = auto_notify;
    }

    // ─────────────────────────────────────────────────────────────────
    // Collaborators
    // ─────────────────────────────────────────────────────────────────

    /// The parsed model.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Replace the adapter. The in-memory store is left untouched; call
    /// [`Enforcer::load_policy`] to read from the new backend.
    pub fn set_adapter(&mut self, adapter: impl Adapter + 'static) {
        self.adapter = Box::new(adapter);
    }

    /// Attach a watcher for change notifications.
    pub fn set_watcher(&mut self, watcher: Box<dyn Watcher>) {
        self.watcher = Some(watcher);
    }

    /// The role manager behind a grouping type.
    #[must_use]
    pub fn role_manager(&self, gtype: &str) -> Option<SharedRoleManager> {
        self.role_managers.get(gtype).cloned()
    }

    /// Replace the role manager behind a grouping type and rebuild its
    /// links from the stored grouping policies.
    pub fn set_role_manager(&mut self, gtype: &str, rm: SharedRoleManager) -> Result<()> {
        if self.model.role_arity(gtype).is_none() {
            return Err(Error::ModelSyntax(format!(
                "model declares no grouping type `{gtype}`"
            )));
        }
        self.role_managers.insert(gtype.to_string(), rm);
        self.build_role_links_for(gtype)
    }

    /// Install pattern-matching hooks on the role manager of `gtype` and
    /// rebuild its links.
    pub fn set_role_matching_fns(
        &mut self,
        gtype: &str,
        role_fn: Option<crate::rbac::MatchingFn>,
        domain_fn: Option<crate::rbac::MatchingFn>,
    ) -> Result<()> {
        let rm = self
            .role_managers
            .get(gtype)
            .ok_or_else(|| Error::ModelSyntax(format!("model declares no grouping type `{gtype}`")))?;
        rm.write().set_matching_fns(role_fn, domain_fn);
        Ok(())
    }

    /// Register a matcher function (or shadow a builtin).
    pub fn register_function(&mut self, name: impl Into<String>, f: MatcherFunction) {
        self.functions.register(name, f);
    }

    /// Remove a registered matcher function.
    pub fn unregister_function(&mut self, name: &str) -> bool {
        self.functions.unregister(name)
    }

    // ─────────────────────────────────────────────────────────────────
    // Role links
    // ─────────────────────────────────────────────────────────────────

    /// Rebuild every role manager from the stored grouping policies.
    pub fn build_role_links(&mut self) -> Result<()> {
        let gtypes: Vec<String> = self.model.grouping_types().map(ToString::to_string).collect();
        for gtype in gtypes {
            self.build_role_links_for(&gtype)?;
        }
        Ok(())
    }

    /// Rebuild one grouping type's role graph from its stored rules.
    pub(crate) fn build_role_links_for(&mut self, gtype: &str) -> Result<()> {
        let Some(rm) = self.role_managers.get(gtype) else {
            return Err(Error::ModelSyntax(format!(
                "model declares no grouping type `{gtype}`"
            )));
        };
        let mut guard = rm.write();
        guard.clear();
        for rule in self.store.rules(Section::Grouping, gtype) {
            apply_link(&mut *guard, rule, true);
        }
        drop(guard);
        tracing::debug!(
            gtype,
            links = self.store.rules(Section::Grouping, gtype).len(),
            "rebuilt role links"
        );
        Ok(())
    }

    /// Incrementally apply or retract one grouping rule.
    pub(crate) fn update_link(&self, gtype: &str, rule: &[String], insert: bool) {
        if let Some(rm) = self.role_managers.get(gtype) {
            apply_link(&mut *rm.write(), rule, insert);
        }
    }
}

fn apply_link(rm: &mut dyn RoleManager, rule: &[String], insert: bool) {
    let (Some(name1), Some(name2)) = (rule.first(), rule.get(1)) else {
        return;
    };
    let domain = rule.get(2).map(String::as_str);
    if insert {
        rm.add_link(name1, name2, domain);
    } else {
        rm.delete_link(name1, name2, domain);
    }
}

impl LinkQuery for Enforcer {
    fn query_link(
        &self,
        gtype: &str,
        user: &str,
        role: &str,
        domain: Option<&str>,
    ) -> Option<bool> {
        let rm = self.role_managers.get(gtype)?;
        Some(rm.read().has_link(user, role, domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;

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

    async fn enforcer() -> Enforcer {
        let model: Model = MODEL.parse().unwrap();
        let mut e = Enforcer::from_model(model, MemoryAdapter::new()).await.unwrap();
        e.add_policy(["alice", "data1", "read"]).await.unwrap();
        e
    }

    #[tokio::test]
    async fn allows_matching_request() {
        let e = enforcer().await;
        assert!(e.enforce(["alice", "data1", "read"]).unwrap());
        assert!(!e.enforce(["alice", "data1", "write"]).unwrap());
        assert!(!e.enforce(["bob", "data1", "read"]).unwrap());
    }

    #[tokio::test]
    async fn disabled_enforcement_allows_everything() {
        let mut e = enforcer().await;
        e.enable_enforce(false);
        assert!(e.enforce(["bob", "data9", "write"]).unwrap());
        let (decision, explanations) = e.enforce_ex(["bob", "data9", "write"]).unwrap();
        assert!(decision);
        assert!(explanations.is_empty());
    }

    #[tokio::test]
    async fn enforce_ex_names_the_matched_rule() {
        let e = enforcer().await;
        let (decision, explanations) = e.enforce_ex(["alice", "data1", "read"]).unwrap();
        assert!(decision);
        assert_eq!(
            explanations,
            vec![vec!["alice".to_string(), "data1".to_string(), "read".to_string()]]
        );
    }

    #[tokio::test]
    async fn short_request_is_a_runtime_error() {
        let e = enforcer().await;
        let err = e.enforce(["alice", "data1"]).unwrap_err();
        assert!(matches!(err, Error::MatcherRuntime(_)));
    }

    #[tokio::test]
    async fn ad_hoc_matcher_overrides_the_model() {
        let e = enforcer().await;
        assert!(
            e.enforce_with_matcher("r.sub == p.sub", ["alice", "x", "y"])
                .unwrap()
        );
        assert!(
            !e.enforce_with_matcher("r.sub == p.sub && r.obj == p.obj", ["alice", "x", "y"])
                .unwrap()
        );
    }

    #[tokio::test]
    async fn batch_enforce_preserves_order() {
        let e = enforcer().await;
        let results = e
            .batch_enforce(vec![
                vec!["alice".into(), "data1".into(), "read".into()],
                vec!["bob".into(), "data1".into(), "read".into()],
                vec!["alice".into(), "data1".into(), "read".into()],
            ])
            .unwrap();
        assert_eq!(results, vec![true, false, true]);
    }
}
