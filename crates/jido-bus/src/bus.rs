//! The signal bus (§3 `BusState`, §4.5): an ordered, append-only log per
//! named bus, with pattern-filterable reads, persistent subscriptions
//! delivered through the shared [`jido_core::dispatch::Dispatcher`] seam,
//! and snapshots of log subsets.
//!
//! Subscriptions are modeled as ordinary [`Router`] routes — `path` is the
//! route pattern, `Target::Dispatch(subscription.dispatch)` the target — so
//! matching a published signal against every live subscription reuses the
//! same trie the agent server routes actions through instead of
//! reimplementing pattern matching here. The router is rebuilt from the
//! subscription map on every subscribe/unsubscribe rather than mutated
//! incrementally, since `Router::remove` deletes an entire path and two
//! subscriptions may legitimately share one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use jido_core::agent::BusRegistry;
use jido_core::dispatch::{Delivery, DispatchConfig, Dispatcher};
use jido_core::error::{DispatchError, JidoError, Result, SubscriptionError};
use jido_core::id::{Id, IdGenerator};
use jido_core::plugin::patterns_match;
use jido_core::router::{Route, Router, Target};
use jido_core::signal::{validate_path, RecordedSignal, Signal};

use crate::snapshot::{SnapshotData, SnapshotRef, SnapshotRegistry};

/// A live subscription: `path` is the route pattern matched against
/// published signal types, `dispatch` is where matches are delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub path: String,
    pub dispatch: DispatchConfig,
    pub persistent: bool,
    pub created_at: DateTime<Utc>,
}

struct BusState {
    router: Router,
    log: Vec<RecordedSignal>,
    subscriptions: HashMap<String, Subscription>,
    subscription_checkpoints: HashMap<String, i64>,
    snapshot_refs: HashMap<Id, SnapshotRef>,
}

fn rebuild_router(subscriptions: &HashMap<String, Subscription>) -> Result<Router> {
    let routes = subscriptions
        .values()
        .map(|s| Route::new(s.path.clone(), Target::Dispatch(s.dispatch.clone())))
        .collect();
    Router::new(routes)
}

fn ms_to_datetime(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64).single().unwrap_or_else(Utc::now)
}

/// One named, ordered signal log with its subscriptions and snapshots.
pub struct Bus {
    name: String,
    id_generator: Arc<IdGenerator>,
    dispatcher: Arc<dyn Dispatcher>,
    snapshots: SnapshotRegistry,
    state: RwLock<BusState>,
}

impl Bus {
    pub fn new(
        name: impl Into<String>,
        dispatcher: Arc<dyn Dispatcher>,
        id_generator: Arc<IdGenerator>,
        snapshots: SnapshotRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            id_generator,
            dispatcher,
            snapshots,
            state: RwLock::new(BusState {
                router: Router::new(Vec::new()).expect("empty router is always valid"),
                log: Vec::new(),
                subscriptions: HashMap::new(),
                subscription_checkpoints: HashMap::new(),
                snapshot_refs: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record `signals` in order, assigning them a batch of sequential ids,
    /// then route and dispatch each to every matching subscription.
    /// Dispatch failures are logged per-subscriber and never fail the
    /// publish — the log is authoritative.
    pub async fn publish(&self, signals: Vec<Signal>, correlation_id: Option<Id>) -> Result<Vec<RecordedSignal>> {
        if signals.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.id_generator.generate_batch(signals.len());
        let recorded: Vec<RecordedSignal> = signals
            .into_iter()
            .zip(ids)
            .map(|(signal, (id, ts_ms))| RecordedSignal {
                id,
                correlation_id,
                created_at: ms_to_datetime(ts_ms),
                signal_type: signal.signal_type.clone(),
                signal,
            })
            .collect();

        let dispatch_plan: Vec<(Signal, DispatchConfig)> = {
            let mut state = self.state.write().expect("bus state lock poisoned");
            let mut plan = Vec::new();
            for r in &recorded {
                if let Ok(targets) = state.router.route(&r.signal) {
                    for target in targets {
                        if let Target::Dispatch(config) = target {
                            plan.push((r.signal.clone(), config));
                        }
                    }
                }
                state.log.push(r.clone());
            }
            plan
        };

        for (signal, config) in dispatch_plan {
            if let Err(err) = self.dispatcher.dispatch(&config, Delivery::new(signal)).await {
                tracing::warn!(bus = %self.name, error = %err, "bus dispatch to subscriber failed");
            }
        }

        Ok(recorded)
    }

    /// Read log entries matching `pattern` (`"*"` matches everything;
    /// anything else is matched with router pattern semantics so `user.*`
    /// and `**` both work) with `created_at_ms` strictly greater than
    /// `start_ts`, capped at `batch_size`.
    pub fn filter(
        &self,
        pattern: &str,
        start_ts: Option<i64>,
        batch_size: Option<usize>,
    ) -> Result<Vec<RecordedSignal>> {
        let state = self.state.read().expect("bus state lock poisoned");
        let mut out: Vec<RecordedSignal> = state
            .log
            .iter()
            .filter(|r| start_ts.map_or(true, |ts| r.created_at_ms() > ts))
            .filter(|r| pattern == "*" || patterns_match(&[pattern.to_string()], &r.signal_type))
            .cloned()
            .collect();
        if let Some(n) = batch_size {
            out.truncate(n);
        }
        Ok(out)
    }

    /// Register a subscription and deliver any signals it owes a catch-up
    /// replay for. `begin_timestamp` is used verbatim if given; otherwise a
    /// prior checkpoint for this `sub_id` (from an earlier, now-ended
    /// subscription) is reused; absent both, the subscription is tail-only
    /// and only sees signals published after this call.
    pub async fn subscribe(
        &self,
        sub_id: impl Into<String>,
        path: impl Into<String>,
        dispatch: DispatchConfig,
        persistent: bool,
        begin_timestamp: Option<i64>,
    ) -> Result<()> {
        let sub_id = sub_id.into();
        let path = path.into();
        dispatch.validate()?;
        validate_path(&path)?;

        let catch_up: Vec<RecordedSignal> = {
            let mut state = self.state.write().expect("bus state lock poisoned");
            if state.subscriptions.contains_key(&sub_id) {
                return Err(JidoError::Subscription(SubscriptionError::AlreadyExists(sub_id)));
            }
            let effective_begin = begin_timestamp.or_else(|| state.subscription_checkpoints.get(&sub_id).copied());
            state.subscriptions.insert(
                sub_id.clone(),
                Subscription {
                    id: sub_id.clone(),
                    path: path.clone(),
                    dispatch: dispatch.clone(),
                    persistent,
                    created_at: Utc::now(),
                },
            );
            state.router = rebuild_router(&state.subscriptions)?;
            match effective_begin {
                Some(ts) => state
                    .log
                    .iter()
                    .filter(|r| r.created_at_ms() > ts && patterns_match(&[path.clone()], &r.signal_type))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };

        for recorded in &catch_up {
            if let Err(err) = self
                .dispatcher
                .dispatch(&dispatch, Delivery::new(recorded.signal.clone()))
                .await
            {
                tracing::warn!(bus = %self.name, sub = %sub_id, error = %err, "subscription catch-up dispatch failed");
            }
        }
        if let Some(last) = catch_up.last() {
            let mut state = self.state.write().expect("bus state lock poisoned");
            let checkpoint = state.subscription_checkpoints.entry(sub_id).or_insert(0);
            *checkpoint = (*checkpoint).max(last.created_at_ms());
        }
        Ok(())
    }

    /// Remove a subscription. `delete_persistence` also drops its
    /// checkpoint; otherwise the checkpoint survives so a later
    /// re-subscribe with the same id resumes rather than replaying from
    /// the start.
    pub fn unsubscribe(&self, sub_id: &str, delete_persistence: bool) -> Result<()> {
        let mut state = self.state.write().expect("bus state lock poisoned");
        if state.subscriptions.remove(sub_id).is_none() {
            return Err(JidoError::Subscription(SubscriptionError::NotFound(sub_id.to_string())));
        }
        state.router = rebuild_router(&state.subscriptions)?;
        if delete_persistence {
            state.subscription_checkpoints.remove(sub_id);
        }
        Ok(())
    }

    /// Advance `sub_id`'s checkpoint to `max(current, recorded.created_at_ms)`.
    pub fn ack(&self, sub_id: &str, recorded: &RecordedSignal) -> Result<()> {
        let mut state = self.state.write().expect("bus state lock poisoned");
        if !state.subscriptions.contains_key(sub_id) {
            return Err(JidoError::Subscription(SubscriptionError::NotFound(sub_id.to_string())));
        }
        let checkpoint = state.subscription_checkpoints.entry(sub_id.to_string()).or_insert(0);
        *checkpoint = (*checkpoint).max(recorded.created_at_ms());
        Ok(())
    }

    /// Materialize `filter(path, None, None)` into the process-wide
    /// snapshot registry and keep only a lightweight ref in bus state.
    pub fn snapshot_create(&self, path: impl Into<String>) -> Result<SnapshotRef> {
        let path = path.into();
        let signals = self.filter(&path, None, None)?;
        let id = self.id_generator.generate().0;
        let snap_ref = self.snapshots.store(id, path, signals);
        self.state
            .write()
            .expect("bus state lock poisoned")
            .snapshot_refs
            .insert(id, snap_ref.clone());
        Ok(snap_ref)
    }

    pub fn snapshot_read(&self, id: Id) -> Result<SnapshotData> {
        self.snapshots.read(id)
    }

    pub fn snapshot_list(&self) -> Vec<SnapshotRef> {
        self.state
            .read()
            .expect("bus state lock poisoned")
            .snapshot_refs
            .values()
            .cloned()
            .collect()
    }

    pub fn snapshot_delete(&self, id: Id) -> Result<()> {
        let mut state = self.state.write().expect("bus state lock poisoned");
        if state.snapshot_refs.remove(&id).is_none() {
            return Err(JidoError::Snapshot(jido_core::error::SnapshotError::NotFound(id.to_string())));
        }
        self.snapshots.delete(id);
        Ok(())
    }

    /// Shorthand for `filter`, defaulting to every signal type.
    pub fn replay(&self, path: Option<&str>, start_ts: Option<i64>) -> Result<Vec<RecordedSignal>> {
        self.filter(path.unwrap_or("*"), start_ts, None)
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.state
            .read()
            .expect("bus state lock poisoned")
            .subscriptions
            .values()
            .cloned()
            .collect()
    }

    pub fn log_len(&self) -> usize {
        self.state.read().expect("bus state lock poisoned").log.len()
    }
}

/// Named collection of buses, created lazily, sharing one dispatcher, id
/// generator, and snapshot registry. Implements [`BusRegistry`] so it can
/// be wired into [`jido_core::agent::AgentServerConfig::buses`] or
/// [`jido_core::supervisor::JidoConfig::with_bus`] directly.
pub struct BusHub {
    buses: RwLock<HashMap<String, Arc<Bus>>>,
    dispatcher: Arc<dyn Dispatcher>,
    id_generator: Arc<IdGenerator>,
    snapshots: SnapshotRegistry,
}

impl BusHub {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, id_generator: Arc<IdGenerator>) -> Self {
        Self {
            buses: RwLock::new(HashMap::new()),
            dispatcher,
            id_generator,
            snapshots: SnapshotRegistry::new(),
        }
    }

    pub fn bus(&self, name: &str) -> Option<Arc<Bus>> {
        self.buses.read().expect("bus hub lock poisoned").get(name).cloned()
    }

    /// Create `name` if it doesn't already exist; idempotent.
    pub fn create_bus(&self, name: &str) -> Arc<Bus> {
        let mut buses = self.buses.write().expect("bus hub lock poisoned");
        buses
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Bus::new(
                    name,
                    self.dispatcher.clone(),
                    self.id_generator.clone(),
                    self.snapshots.clone(),
                ))
            })
            .clone()
    }
}

#[async_trait]
impl BusRegistry for BusHub {
    async fn publish(&self, bus_name: &str, stream: Option<&str>, signal: Signal) -> Result<()> {
        let signal = match stream {
            Some(stream) => signal.with_extension("stream", serde_json::json!(stream)),
            None => signal,
        };
        let bus = self
            .bus(bus_name)
            .ok_or_else(|| JidoError::Dispatch(DispatchError::BusNotFound(bus_name.to_string())))?;
        bus.publish(vec![signal], None).await.map(|_| ())
    }

    async fn publish_topic(&self, bus_name: &str, topic: &str, signal: Signal) -> Result<()> {
        let tagged = signal.with_extension("topic", serde_json::json!(topic));
        let bus = self
            .bus(bus_name)
            .ok_or_else(|| JidoError::Dispatch(DispatchError::BusNotFound(bus_name.to_string())))?;
        bus.publish(vec![tagged], None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct RecordingDispatcher {
        received: Mutex<Vec<Signal>>,
    }

    impl RecordingDispatcher {
        fn new() -> Self {
            Self {
                received: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn dispatch(&self, _config: &DispatchConfig, delivery: Delivery) -> Result<Value> {
            self.received.lock().unwrap().push(delivery.signal);
            Ok(Value::Null)
        }
    }

    fn test_signal(signal_type: &str) -> Signal {
        Signal::new(Id::nil(), signal_type, "test", json!({})).unwrap()
    }

    fn test_bus() -> (Bus, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let bus = Bus::new(
            "events",
            dispatcher.clone(),
            Arc::new(IdGenerator::new()),
            SnapshotRegistry::new(),
        );
        (bus, dispatcher)
    }

    #[tokio::test]
    async fn publish_records_signals_in_order() {
        let (bus, _dispatcher) = test_bus();
        let recorded = bus
            .publish(vec![test_signal("a.one"), test_signal("a.two")], None)
            .await
            .unwrap();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].id < recorded[1].id);
        assert_eq!(bus.log_len(), 2);
    }

    #[tokio::test]
    async fn publish_dispatches_to_matching_subscription() {
        let (bus, dispatcher) = test_bus();
        bus.subscribe("sub-1", "user.*", DispatchConfig::pid("receiver"), false, None)
            .await
            .unwrap();
        bus.publish(vec![test_signal("user.created")], None).await.unwrap();
        assert_eq!(dispatcher.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_does_not_dispatch_to_non_matching_subscription() {
        let (bus, dispatcher) = test_bus();
        bus.subscribe("sub-1", "order.*", DispatchConfig::pid("receiver"), false, None)
            .await
            .unwrap();
        bus.publish(vec![test_signal("user.created")], None).await.unwrap();
        assert!(dispatcher.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_subscription_id_is_rejected() {
        let (bus, _dispatcher) = test_bus();
        bus.subscribe("sub-1", "**", DispatchConfig::pid("a"), false, None)
            .await
            .unwrap();
        let err = bus
            .subscribe("sub-1", "**", DispatchConfig::pid("b"), false, None)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_deliveries() {
        let (bus, dispatcher) = test_bus();
        bus.subscribe("sub-1", "**", DispatchConfig::pid("receiver"), false, None)
            .await
            .unwrap();
        bus.unsubscribe("sub-1", true).unwrap();
        bus.publish(vec![test_signal("anything")], None).await.unwrap();
        assert!(dispatcher.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_unknown_id_is_not_found() {
        let (bus, _dispatcher) = test_bus();
        assert!(bus.unsubscribe("ghost", false).is_err());
    }

    #[tokio::test]
    async fn filter_star_matches_everything() {
        let (bus, _dispatcher) = test_bus();
        bus.publish(vec![test_signal("a.one"), test_signal("b.two")], None)
            .await
            .unwrap();
        assert_eq!(bus.filter("*", None, None).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn filter_respects_start_ts() {
        let (bus, _dispatcher) = test_bus();
        let first = bus.publish(vec![test_signal("a.one")], None).await.unwrap();
        bus.publish(vec![test_signal("a.two")], None).await.unwrap();
        let after_first = bus.filter("*", Some(first[0].created_at_ms()), None).unwrap();
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].signal.signal_type, "a.two");
    }

    #[tokio::test]
    async fn filter_caps_at_batch_size() {
        let (bus, _dispatcher) = test_bus();
        bus.publish(
            vec![test_signal("a.one"), test_signal("a.two"), test_signal("a.three")],
            None,
        )
        .await
        .unwrap();
        assert_eq!(bus.filter("*", None, Some(2)).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn ack_advances_checkpoint_monotonically() {
        let (bus, _dispatcher) = test_bus();
        bus.subscribe("sub-1", "**", DispatchConfig::pid("receiver"), true, None)
            .await
            .unwrap();
        let recorded = bus.publish(vec![test_signal("a.one")], None).await.unwrap();
        bus.ack("sub-1", &recorded[0]).unwrap();
        assert!(bus.ack("ghost", &recorded[0]).is_err());
    }

    #[tokio::test]
    async fn snapshot_round_trips_filtered_signals() {
        let (bus, _dispatcher) = test_bus();
        bus.publish(vec![test_signal("a.one"), test_signal("b.two")], None)
            .await
            .unwrap();
        let snap_ref = bus.snapshot_create("*").unwrap();
        let data = bus.snapshot_read(snap_ref.id).unwrap();
        assert_eq!(data.signals.len(), 2);
        assert_eq!(bus.snapshot_list().len(), 1);
        bus.snapshot_delete(snap_ref.id).unwrap();
        assert!(bus.snapshot_read(snap_ref.id).is_err());
        assert!(bus.snapshot_list().is_empty());
    }

    #[tokio::test]
    async fn resubscribe_after_delete_persistence_is_tail_only() {
        let (bus, dispatcher) = test_bus();
        bus.subscribe("sub-1", "**", DispatchConfig::pid("receiver"), true, None)
            .await
            .unwrap();
        bus.publish(vec![test_signal("a.one")], None).await.unwrap();
        bus.unsubscribe("sub-1", true).unwrap();
        dispatcher.received.lock().unwrap().clear();
        bus.subscribe("sub-1", "**", DispatchConfig::pid("receiver"), true, None)
            .await
            .unwrap();
        assert!(
            dispatcher.received.lock().unwrap().is_empty(),
            "no checkpoint survived delete_persistence, so resubscribe must not replay"
        );
    }

    #[tokio::test]
    async fn replay_then_snapshot_is_immutable_across_later_publishes() {
        let (bus, _dispatcher) = test_bus();
        bus.publish(
            vec![test_signal("t.1"), test_signal("t.2"), test_signal("t.1")],
            None,
        )
        .await
        .unwrap();

        let t1_only = bus.filter("t.1", None, None).unwrap();
        assert_eq!(t1_only.len(), 2);
        assert!(t1_only.iter().all(|r| r.signal.signal_type == "t.1"));
        assert!(t1_only[0].id < t1_only[1].id);

        let snap_ref = bus.snapshot_create("t.1").unwrap();
        let data = bus.snapshot_read(snap_ref.id).unwrap();
        assert_eq!(data.signals.len(), 2);

        bus.publish(vec![test_signal("t.1")], None).await.unwrap();

        let data_after = bus.snapshot_read(snap_ref.id).unwrap();
        assert_eq!(data_after.signals.len(), 2, "snapshot must not see signals published after it was taken");
        assert_eq!(bus.filter("t.1", None, None).unwrap().len(), 3, "the live log does grow");
    }

    #[tokio::test]
    async fn bus_hub_routes_publish_by_name() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let hub = BusHub::new(dispatcher.clone(), Arc::new(IdGenerator::new()));
        assert!(matches!(
            hub.publish("events", None, test_signal("a.one")).await,
            Err(JidoError::Dispatch(DispatchError::BusNotFound(_)))
        ));
        hub.create_bus("events");
        hub.publish("events", None, test_signal("a.one")).await.unwrap();
        assert_eq!(hub.bus("events").unwrap().log_len(), 1);
    }
}
