//! Watcher notification tests
//!
//! Uses a recording watcher to check which events mutations emit, that
//! watcher failures never fail the mutation, and that a peer enforcer
//! applying the events through `apply_event` converges without echoing
//! notifications back out.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use warden::{
    Enforcer, Error, EventData, MemoryAdapter, Model, Result, UpdateCallback, Watcher,
};

const MODEL: &str = r"
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

/// Records every notified event; optionally fails each notify call.
#[derive(Default)]
struct RecordingWatcher {
    events: Arc<Mutex<Vec<EventData>>>,
    fail: bool,
}

impl RecordingWatcher {
    fn new() -> (Self, Arc<Mutex<Vec<EventData>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: events.clone(),
                fail: false,
            },
            events,
        )
    }

    fn failing() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }
    }
}

#[async_trait]
impl Watcher for RecordingWatcher {
    fn set_update_callback(&mut self, _callback: UpdateCallback) {}

    async fn notify(&mut self, event: EventData) -> Result<()> {
        if self.fail {
            return Err(Error::Watcher("connection lost".into()));
        }
        self.events.lock().push(event);
        Ok(())
    }
}

async fn enforcer() -> Enforcer {
    let model: Model = MODEL.parse().unwrap();
    Enforcer::from_model(model, MemoryAdapter::new()).await.unwrap()
}

/// Mutations emit structured events in order
#[tokio::test]
async fn mutations_notify_the_watcher() {
    let mut e = enforcer().await;
    let (watcher, events) = RecordingWatcher::new();
    e.set_watcher(Box::new(watcher));

    e.add_policy(["alice", "data1", "read"]).await.unwrap();
    e.add_grouping_policy(["alice", "admin"]).await.unwrap();
    e.remove_policy(["alice", "data1", "read"]).await.unwrap();

    let recorded = events.lock();
    assert_eq!(recorded.len(), 3);
    assert_eq!(recorded[0].kind(), "add_policy");
    assert_eq!(recorded[1].kind(), "add_policy");
    assert_eq!(recorded[2].kind(), "remove_policy");
    match &recorded[0] {
        EventData::AddPolicy { ptype, rule, .. } => {
            assert_eq!(ptype, "p");
            assert_eq!(
                rule,
                &vec!["alice".to_string(), "data1".to_string(), "read".to_string()]
            );
        }
        other => panic!("unexpected event {other:?}"),
    }
}

/// Disabling auto-notify silences the watcher
#[tokio::test]
async fn auto_notify_can_be_disabled() {
    let mut e = enforcer().await;
    let (watcher, events) = RecordingWatcher::new();
    e.set_watcher(Box::new(watcher));
    e.enable_auto_notify_watcher(false);

    e.add_policy(["alice", "data1", "read"]).await.unwrap();
    assert!(events.lock().is_empty());
}

/// A failing watcher is logged, not propagated
#[tokio::test]
async fn watcher_failure_does_not_fail_the_mutation() {
    let mut e = enforcer().await;
    e.set_watcher(Box::new(RecordingWatcher::failing()));

    e.add_policy(["alice", "data1", "read"]).await.unwrap();
    assert!(e.has_policy(["alice", "data1", "read"]));
}

/// A peer applying the event stream converges to the same decisions
#[tokio::test]
async fn peer_converges_through_apply_event() {
    let mut source = enforcer().await;
    let (watcher, events) = RecordingWatcher::new();
    source.set_watcher(Box::new(watcher));

    source.add_policy(["admin", "data1", "read"]).await.unwrap();
    source.add_grouping_policy(["alice", "admin"]).await.unwrap();
    source
        .remove_filtered_policy(0, ["nobody"])
        .await
        .map(|removed| assert!(removed.is_empty()))
        .unwrap();

    let mut peer = enforcer().await;
    let stream: Vec<EventData> = events.lock().clone();
    for event in stream {
        peer.apply_event(event).await.unwrap();
    }

    assert!(peer.enforce(["alice", "data1", "read"]).unwrap());
    assert_eq!(peer.get_policy(), source.get_policy());
    assert_eq!(peer.get_grouping_policy(), source.get_grouping_policy());

    // Replaying the same stream is idempotent.
    let replay: Vec<EventData> = events.lock().clone();
    for event in replay {
        peer.apply_event(event).await.unwrap();
    }
    assert_eq!(peer.get_policy(), source.get_policy());
}
