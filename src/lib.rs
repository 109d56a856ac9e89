//! Warden — embeddable authorization library.
//!
//! One model-driven engine answers ACL, RBAC (with or without domains and
//! hierarchy), ABAC, and priority/deny-override questions: the access
//! control scheme lives entirely in the model text and the policy data,
//! not in code.
//!
//! # Features
//!
//! - **Model-driven**: INI-like model text declares request/policy shapes,
//!   role relations, the effect expression, and matchers
//! - **Compiled matchers**: expressions parse once to an AST and interpret
//!   per rule, with a pluggable function table (`keyMatch*`, `ipMatch*`,
//!   `globMatch*`, `regexMatch`, `timeMatch`, `g`-family)
//! - **Role graphs**: transitive, domain-scoped role inheritance with a
//!   bounded closure and pattern-matching hooks
//! - **Management surface**: policy/grouping mutations with arity
//!   validation, adapter auto-save, and watcher notifications
//! - **Sync options**: a single-owner [`Enforcer`] and a shared
//!   reader/writer [`SyncedEnforcer`]
//!
//! # Example
//!
//! ```
//! use warden::{Enforcer, MemoryAdapter, Model};
//!
//! # tokio_test::block_on(async {
//! let model: Model = r#"
//! [request_definition]
//! r = sub, obj, act
//! [policy_definition]
//! p = sub, obj, act
//! [policy_effect]
//! e = some(where (p.eft == allow))
//! [matchers]
//! m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
//! "#
//! .parse()
//! .unwrap();
//!
//! let mut enforcer = Enforcer::from_model(model, MemoryAdapter::new()).await.unwrap();
//! enforcer.add_policy(["alice", "data1", "read"]).await.unwrap();
//!
//! assert!(enforcer.enforce(["alice", "data1", "read"]).unwrap());
//! assert!(!enforcer.enforce(["bob", "data1", "read"]).unwrap());
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod effect;
pub mod enforcer;
pub mod error;
mod management;
pub mod matcher;
pub mod model;
pub mod policy;
pub mod rbac;
mod rbac_api;
pub mod synced;
pub mod watcher;

pub use adapter::{Adapter, FileAdapter, Filter, MemoryAdapter};
pub use effect::{Eft, PolicyEffect};
pub use enforcer::{EnforceContext, Enforcer, SharedRoleManager};
pub use error::{Error, Result};
pub use matcher::{FunctionMap, MatcherFunction, Value};
pub use model::Model;
pub use policy::{Additions, PolicyStore, Section};
pub use rbac::{DefaultRoleManager, MatchingFn, RoleManager};
pub use synced::SyncedEnforcer;
pub use watcher::{EventData, UpdateCallback, Watcher};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging for hosts that embed the crate
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
