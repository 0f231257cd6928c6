//! Agent server: one supervised process per agent (§4.10).
//!
//! [`AgentServer`] owns the [`Agent`] struct, its pending-signal queue,
//! children table, and scheduler, and runs the signal-processing loop
//! described in the specification: pop, run plugin middleware, route,
//! execute through the strategy+runner, apply directives, loop. Every
//! agent is a single `tokio::spawn`ed task reading its own mailbox; two
//! agents never share mutable state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, info_span, warn, Instrument};

use crate::action::Action;
use crate::directive::{Directive, SpawnSpec};
use crate::dispatch::DispatchConfig;
use crate::error::{JidoError, LifecycleError, Result};
use crate::id::IdGenerator;
use crate::plugin::{Plugin, SignalDecision};
use crate::router::{Route, Router, Target};
use crate::runner::{self, Instruction, RunnerPolicy};
use crate::scheduler::{AgentScheduler, SchedulerMessage};
use crate::signal::Signal;
use crate::strategy::Strategy;

/// A handle to a running child, as tracked in the parent's `children` map.
#[derive(Clone)]
pub struct ChildRef {
    pub id: String,
    pub module: String,
    pub tag: String,
    pub meta: Value,
    pub handle: AgentHandle,
}

/// The reference a child holds back to its parent.
#[derive(Clone)]
pub struct ParentRef {
    pub id: String,
    pub tag: String,
    pub meta: Value,
    pub handle: AgentHandle,
}

/// Agent state as described in §3: identity, durable map state, the FIFO
/// pending-signal queue, child/parent links, and plugin-owned sub-state.
pub struct Agent {
    pub id: String,
    pub module: String,
    pub state: Map<String, Value>,
    pub pending_signals: VecDeque<Signal>,
    pub children: HashMap<String, ChildRef>,
    pub parent: Option<ParentRef>,
    pub plugin_state: HashMap<String, Value>,
    pub result: Value,
}

impl Agent {
    fn new(id: String, module: String, initial_state: Map<String, Value>) -> Self {
        Self {
            id,
            module,
            state: initial_state,
            pending_signals: VecDeque::new(),
            children: HashMap::new(),
            parent: None,
            plugin_state: HashMap::new(),
            result: Value::Null,
        }
    }

    /// A read-only view suitable for `AgentServer::state()`; never mutates.
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "module": self.module,
            "state": self.state,
            "children": self.children.keys().collect::<Vec<_>>(),
            "result": self.result,
        })
    }
}

/// The callback module a concrete agent type implements: its action
/// registry, base routes, and plugin set. Analogous to an Erlang/OTP
/// behaviour module, but expressed as a plain trait object here.
pub trait AgentModule: Send + Sync {
    fn name(&self) -> &str;
    fn actions(&self) -> Vec<Arc<dyn Action>>;
    fn signal_routes(&self) -> Vec<Route> {
        Vec::new()
    }
    fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        Vec::new()
    }
    fn initial_state(&self) -> Map<String, Value> {
        Map::new()
    }
    /// Default strategy for this module's agents; `None` uses the
    /// server's FSM default.
    fn strategy(&self) -> Option<Box<dyn Strategy>> {
        None
    }
}

/// Internal mailbox message types. `TimerTick`/`CronTick` both arrive as
/// plain `Signal`s, same as any dispatcher delivery — the agent loop
/// doesn't distinguish their origin once enqueued (§4.10, §4.12).
pub enum ServerMessage {
    Signal(Signal),
    Call {
        signal: Signal,
        reply: oneshot::Sender<Result<Value>>,
    },
    ChildDown {
        tag: String,
        reason: Option<String>,
    },
}

impl SchedulerMessage for ServerMessage {
    fn from_signal(signal: Signal) -> Self {
        ServerMessage::Signal(signal)
    }
}

/// A cheaply-cloneable reference to a running agent server: the "pid" in
/// specification terms.
#[derive(Clone)]
pub struct AgentHandle {
    pub id: String,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl AgentHandle {
    pub fn cast(&self, signal: Signal) {
        let _ = self.sender.send(ServerMessage::Signal(signal));
    }

    pub async fn call(&self, signal: Signal, timeout_ms: u64) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ServerMessage::Call { signal, reply: tx })
            .map_err(|_| JidoError::Dispatch(crate::error::DispatchError::ProcessNotAlive(self.id.clone())))?;
        match tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(JidoError::Dispatch(crate::error::DispatchError::ProcessNotAlive(
                self.id.clone(),
            ))),
            Err(_) => Err(JidoError::Timeout(std::time::Duration::from_millis(timeout_ms))),
        }
    }

    fn notify_down(&self, tag: String, reason: Option<String>) {
        let _ = self.sender.send(ServerMessage::ChildDown { tag, reason });
    }
}

/// What the supervisor injects into every agent server so `SpawnAgent`/
/// `StopChild` directives can act without the agent crate depending on
/// `jido-core`'s own supervisor type (there is none — this trait is the
/// seam the `Jido` handle in [`crate::supervisor`] implements).
#[async_trait]
pub trait AgentSpawner: Send + Sync {
    /// `module_name` is resolved against the supervisor's own module
    /// catalog (registered separately from any single agent's routes) —
    /// `jido-core` has no catalog of its own, only the directive's name.
    async fn start_child(
        &self,
        parent_id: &str,
        tag: &str,
        module_name: &str,
        opts: Value,
    ) -> Result<AgentHandle>;

    async fn stop_agent(&self, id: &str, reason: Option<String>) -> Result<()>;
}

/// Bus-facing half of dispatch, implemented by `jido-bus`'s bus manager
/// and injected so `jido-core` never depends on it directly.
#[async_trait]
pub trait BusRegistry: Send + Sync {
    async fn publish(&self, bus_name: &str, stream: Option<&str>, signal: Signal) -> Result<()>;
    async fn publish_topic(&self, bus_name: &str, topic: &str, signal: Signal) -> Result<()>;
}

/// Resolves a `pid`/`named` dispatch target to a live handle. The
/// supervisor's registry is the only full implementation; a bare agent
/// server with no registry can still dispatch to itself, its parent, and
/// its own children via [`AgentServer::dispatch_to`]'s local fallback.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn resolve(&self, id_or_name: &str) -> Option<AgentHandle>;
}

pub struct AgentServerConfig {
    pub id: String,
    pub module: Arc<dyn AgentModule>,
    pub parent: Option<ParentRef>,
    pub spawner: Arc<dyn AgentSpawner>,
    pub buses: Option<Arc<dyn BusRegistry>>,
    pub registry: Option<Arc<dyn AgentRegistry>>,
    pub id_generator: Arc<IdGenerator>,
    pub runner_policy: RunnerPolicy,
}

/// Running state of the agent loop.
pub struct AgentServer {
    agent: Agent,
    module: Arc<dyn AgentModule>,
    router: Router,
    actions: HashMap<String, Arc<dyn Action>>,
    plugins: Vec<Arc<dyn Plugin>>,
    strategy: Box<dyn Strategy>,
    runner_policy: RunnerPolicy,
    buses: Option<Arc<dyn BusRegistry>>,
    registry: Option<Arc<dyn AgentRegistry>>,
    scheduler: AgentScheduler<ServerMessage>,
    id_generator: Arc<IdGenerator>,
    spawner: Arc<dyn AgentSpawner>,
    self_handle: AgentHandle,
    mailbox: mpsc::UnboundedReceiver<ServerMessage>,
    pending_calls: HashMap<String, oneshot::Sender<Result<Value>>>,
    shutting_down: bool,
}

/// Spawn a new agent server task and return a handle to it.
pub fn spawn(config: AgentServerConfig) -> AgentHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let self_handle = AgentHandle {
        id: config.id.clone(),
        sender: tx,
    };

    let mut agent = Agent::new(config.id.clone(), config.module.name().to_string(), config.module.initial_state());
    agent.parent = config.parent.clone();

    let mut routes = config.module.signal_routes();
    let mut plugins = Vec::new();
    let mut plugin_actions = Vec::new();
    for plugin in config.module.plugins() {
        routes.extend(plugin.signal_routes());
        plugin_actions.extend(plugin.actions());
        let mounted = plugin.mount(&Value::Null).unwrap_or(Value::Null);
        agent.plugin_state.insert(plugin.state_key().to_string(), mounted);
        plugins.push(plugin);
    }
    let router = Router::new(routes).unwrap_or_else(|_| Router::new(Vec::new()).expect("empty router is valid"));

    let mut actions = HashMap::new();
    for action in config.module.actions().into_iter().chain(plugin_actions) {
        actions.insert(action.name().to_string(), action);
    }

    let strategy = config
        .module
        .strategy()
        .unwrap_or_else(|| Box::new(crate::strategy::FsmStrategy::new("idle", crate::strategy::default_fsm_transitions("idle"))));

    let scheduler = AgentScheduler::new(self_handle_sender(&self_handle));

    let server = AgentServer {
        agent,
        module: config.module,
        router,
        actions,
        plugins,
        strategy,
        runner_policy: config.runner_policy,
        buses: config.buses,
        registry: config.registry,
        scheduler,
        id_generator: config.id_generator,
        spawner: config.spawner,
        self_handle: self_handle.clone(),
        mailbox: rx,
        pending_calls: HashMap::new(),
        shutting_down: false,
    };

    tokio::spawn(server.run());
    self_handle
}

fn self_handle_sender(handle: &AgentHandle) -> mpsc::UnboundedSender<ServerMessage> {
    handle.sender.clone()
}

/// A route's `params` is a set of defaults; the triggering signal's own
/// `data` is merged over it so an action sees both what the route
/// configured and what the caller actually sent. Two objects merge
/// key-by-key with the signal's data winning; if either side isn't an
/// object, the non-null one wins outright.
fn merge_action_params(route_params: Value, signal_data: &Value) -> Value {
    match (route_params, signal_data) {
        (Value::Object(mut base), Value::Object(overrides)) => {
            for (k, v) in overrides.clone() {
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (Value::Null, data) => data.clone(),
        (base, Value::Null) => base,
        (_, data) => data.clone(),
    }
}

impl AgentServer {
    async fn run(mut self) {
        let span = info_span!("agent.server", agent_id = %self.agent.id);
        async {
            while !self.shutting_down {
                match self.mailbox.recv().await {
                    Some(ServerMessage::Signal(signal)) => {
                        self.agent.pending_signals.push_back(signal);
                        self.drain_pending(None).await;
                    }
                    Some(ServerMessage::Call { signal, reply }) => {
                        let correlation = signal.id.to_string();
                        self.pending_calls.insert(correlation.clone(), reply);
                        self.agent.pending_signals.push_back(signal);
                        self.drain_pending(Some(correlation)).await;
                    }
                    Some(ServerMessage::ChildDown { tag, reason }) => {
                        self.agent.children.remove(&tag);
                        let data = serde_json::json!({"tag": tag, "reason": reason});
                        if let Ok(lifecycle_signal) =
                            Signal::new(self.id_generator.generate().0, "jido.agent.child.exited", &self.agent.id, data)
                        {
                            self.agent.pending_signals.push_back(lifecycle_signal);
                            self.drain_pending(None).await;
                        }
                    }
                    None => break,
                }
            }
            info!(agent_id = %self.agent.id, "agent server stopped");
        }
        .instrument(span)
        .await;
    }

    /// Drain the pending queue, strictly FIFO, until empty or shutdown.
    /// When `awaited_correlation` resolves, any pending `call` waiting on
    /// it is completed.
    async fn drain_pending(&mut self, _awaited_correlation: Option<String>) {
        while let Some(signal) = self.agent.pending_signals.pop_front() {
            let correlation = signal.id.to_string();
            let outcome = self.process_one(signal).await;
            if let Some(reply) = self.pending_calls.remove(&correlation) {
                let _ = reply.send(outcome);
            }
            if self.shutting_down {
                break;
            }
        }
    }

    async fn process_one(&mut self, signal: Signal) -> Result<Value> {
        let mut working_signal = signal;

        for plugin in &self.plugins {
            if !crate::plugin::patterns_match(plugin.signal_patterns(), &working_signal.signal_type) {
                continue;
            }
            let plugin_state = self
                .agent
                .plugin_state
                .get(plugin.state_key())
                .cloned()
                .unwrap_or(Value::Null);
            match plugin.handle_signal(&working_signal, &plugin_state).await {
                SignalDecision::Continue => {}
                SignalDecision::ContinueWith(replacement) => working_signal = replacement,
                SignalDecision::Override { module, params } => {
                    return self.execute_action(&module, params).await;
                }
                SignalDecision::Error(e) => return Err(e),
            }
        }

        if working_signal.signal_type == "jido.agent.stop" {
            let reason = working_signal.data.get("reason").and_then(|r| r.as_str()).map(str::to_string);
            self.apply_directives(vec![Directive::Stop { reason }]).await?;
            return Ok(Value::Null);
        }

        // Lifecycle signals a module doesn't explicitly route are a no-op
        // rather than a routing error: most modules don't care when a
        // child starts or exits, but one that registers its own route for
        // `jido.agent.child.started`/`.exited` gets normal routing first.
        let targets = match self.router.route(&working_signal) {
            Ok(targets) => targets,
            Err(e) => {
                if matches!(
                    working_signal.signal_type.as_str(),
                    "jido.agent.child.started" | "jido.agent.child.exited"
                ) {
                    return Ok(working_signal.data.clone());
                }
                return Err(e);
            }
        };
        let target = targets.into_iter().next().expect("route() never returns Ok with an empty list");
        match target {
            Target::Action { module, params } => {
                let merged = merge_action_params(params, &working_signal.data);
                self.execute_action(&module, merged).await
            }
            Target::Dispatch(config) => {
                let delivery = crate::dispatch::Delivery::new(working_signal);
                self.dispatch_to(&config, delivery).await
            }
        }
    }

    async fn execute_action(&mut self, module: &str, params: Value) -> Result<Value> {
        let action = self
            .actions
            .get(module)
            .cloned()
            .ok_or_else(|| JidoError::execution(format!("no action registered for module '{module}'")))?;

        let policy = RunnerPolicy {
            max_retries: action.max_retries().max(self.runner_policy.max_retries),
            ..self.runner_policy.clone()
        };
        let mut queue = VecDeque::new();
        queue.push_back(Instruction::new(action, params));
        self.strategy.begin(1);
        let outcome = runner::run_simple(&mut queue, &self.agent.id, self.agent.state.clone(), &policy).await;

        match outcome {
            Ok(outcome) => {
                self.agent.state = outcome.state;
                self.agent.result = outcome.result.clone();
                self.strategy.end(&outcome.result, false);
                self.apply_directives(outcome.directives).await?;
                Ok(outcome.result)
            }
            Err(e) => {
                self.strategy.end(&Value::Null, true);
                warn!(agent_id = %self.agent.id, error = %e, "action execution failed");
                Err(e)
            }
        }
    }

    async fn apply_directives(&mut self, directives: Vec<Directive>) -> Result<()> {
        for directive in directives {
            directive.validate()?;
            if self.shutting_down {
                break;
            }
            match directive {
                Directive::SetState { .. }
                | Directive::ReplaceState { .. }
                | Directive::DeleteKeys { .. }
                | Directive::SetPath { .. }
                | Directive::DeletePath { .. } => {
                    if let Some(op) = directive.as_state_op() {
                        self.agent.state = crate::state_ops::apply_all(&self.agent.state, &[op])?;
                    }
                }
                Directive::Emit { signal, dispatch } => {
                    let delivery = crate::dispatch::Delivery::new(signal);
                    if let Err(e) = self.dispatch_to(&dispatch, delivery).await {
                        warn!(agent_id = %self.agent.id, error = %e, "emit dispatch failed");
                    }
                }
                Directive::EmitToParent { signal } => {
                    if let Some(parent) = &self.agent.parent {
                        parent.handle.cast(signal);
                    }
                }
                Directive::Schedule { delay_ms, message } => {
                    self.scheduler.schedule_once(delay_ms, message);
                }
                Directive::Cron {
                    cron,
                    job_id,
                    message,
                    timezone: _,
                } => {
                    self.scheduler.register_cron(job_id, &cron, message)?;
                }
                Directive::CronCancel { job_id } => {
                    self.scheduler.cancel_cron(&job_id);
                }
                Directive::SpawnAgent(spec) => self.handle_spawn(spec).await?,
                Directive::StopChild { tag, reason } => self.handle_stop_child(tag, reason).await?,
                Directive::Stop { reason } => {
                    info!(agent_id = %self.agent.id, ?reason, "agent stopping");
                    self.shutting_down = true;
                    self.scheduler.cancel_all();
                    for (tag, child) in self.agent.children.drain() {
                        let _ = self.spawner.stop_agent(&child.id, reason.clone()).await;
                        let _ = tag;
                    }
                }
                Directive::Enqueue { action, params, .. } => {
                    if let Some(action_impl) = self.actions.get(&action).cloned() {
                        let policy = RunnerPolicy {
                            max_retries: action_impl.max_retries().max(self.runner_policy.max_retries),
                            ..self.runner_policy.clone()
                        };
                        let mut queue = VecDeque::new();
                        queue.push_back(Instruction::new(action_impl, params));
                        let outcome = runner::run_simple(&mut queue, &self.agent.id, self.agent.state.clone(), &policy).await?;
                        self.agent.state = outcome.state;
                        Box::pin(self.apply_directives(outcome.directives)).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_spawn(&mut self, spec: SpawnSpec) -> Result<()> {
        if self.agent.children.contains_key(&spec.tag) {
            return Err(JidoError::Lifecycle(LifecycleError::ChildAlreadyRegistered(spec.tag)));
        }
        let handle = self
            .spawner
            .start_child(&self.agent.id, &spec.tag, &spec.module, spec.opts.clone())
            .await?;
        self.agent.children.insert(
            spec.tag.clone(),
            ChildRef {
                id: handle.id.clone(),
                module: spec.module.clone(),
                tag: spec.tag.clone(),
                meta: spec.meta.clone(),
                handle: handle.clone(),
            },
        );
        let data = serde_json::json!({
            "pid": handle.id,
            "child_id": handle.id,
            "child_module": spec.module,
            "tag": spec.tag,
            "meta": spec.meta,
        });
        if let Ok(lifecycle_signal) = Signal::new(self.id_generator.generate().0, "jido.agent.child.started", &self.agent.id, data) {
            self.self_handle.cast(lifecycle_signal);
        }
        Ok(())
    }

    async fn handle_stop_child(&mut self, tag: String, reason: Option<String>) -> Result<()> {
        let child = self
            .agent
            .children
            .get(&tag)
            .cloned()
            .ok_or_else(|| JidoError::Lifecycle(LifecycleError::ChildNotFound(tag.clone())))?;
        self.spawner.stop_agent(&child.id, reason.clone()).await?;
        let notifier = self.self_handle.clone();
        notifier.notify_down(tag, reason);
        Ok(())
    }

    pub fn state(&self) -> Value {
        self.agent.snapshot()
    }

    /// Resolve and deliver to a [`DispatchConfig`] target. `pid`/`named`
    /// first check local refs (self, parent, children) before falling
    /// back to the injected registry, so an agent with no registry at all
    /// can still talk to its own family tree.
    async fn dispatch_to(&self, config: &DispatchConfig, delivery: crate::dispatch::Delivery) -> Result<Value> {
        config.validate()?;
        match config {
            DispatchConfig::Pid { agent_id, mode: _ } => match self.resolve_local(agent_id) {
                Some(handle) => {
                    handle.cast(delivery.signal);
                    Ok(Value::Null)
                }
                None => match &self.registry {
                    Some(registry) => match registry.resolve(agent_id).await {
                        Some(handle) => {
                            handle.cast(delivery.signal);
                            Ok(Value::Null)
                        }
                        None => Err(JidoError::Dispatch(crate::error::DispatchError::ProcessNotAlive(agent_id.clone()))),
                    },
                    None => Err(JidoError::Dispatch(crate::error::DispatchError::ProcessNotAlive(agent_id.clone()))),
                },
            },
            DispatchConfig::Named { name, mode: _ } => match self.resolve_local(name) {
                Some(handle) => {
                    handle.cast(delivery.signal);
                    Ok(Value::Null)
                }
                None => match &self.registry {
                    Some(registry) => match registry.resolve(name).await {
                        Some(handle) => {
                            handle.cast(delivery.signal);
                            Ok(Value::Null)
                        }
                        None => Err(JidoError::Dispatch(crate::error::DispatchError::ProcessNotFound(name.clone()))),
                    },
                    None => Err(JidoError::Dispatch(crate::error::DispatchError::ProcessNotFound(name.clone()))),
                },
            },
            DispatchConfig::Bus { bus_name, stream } => match &self.buses {
                Some(buses) => buses.publish(bus_name, stream.as_deref(), delivery.signal).await.map(|_| Value::Null),
                None => Err(JidoError::Dispatch(crate::error::DispatchError::BusNotFound(bus_name.clone()))),
            },
            DispatchConfig::PubSub { bus_name, topic } => match &self.buses {
                Some(buses) => buses.publish_topic(bus_name, topic, delivery.signal).await.map(|_| Value::Null),
                None => Err(JidoError::Dispatch(crate::error::DispatchError::BusNotFound(bus_name.clone()))),
            },
            DispatchConfig::Remote { inner, .. } => {
                let inner_delivery = crate::dispatch::Delivery::new(delivery.signal);
                Box::pin(self.dispatch_to(inner, inner_delivery)).await
            }
        }
    }

    fn resolve_local(&self, id_or_name: &str) -> Option<AgentHandle> {
        if id_or_name == self.agent.id {
            return Some(self.self_handle.clone());
        }
        if let Some(parent) = &self.agent.parent {
            if parent.id == id_or_name {
                return Some(parent.handle.clone());
            }
        }
        self.agent.children.values().find(|c| c.id == id_or_name).map(|c| c.handle.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionContext, ActionOutcome};
    use serde_json::json;

    struct EchoAction;
    #[async_trait]
    impl Action for EchoAction {
        fn name(&self) -> &str {
            "echo"
        }
        async fn execute(&self, params: Value, _ctx: ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::new(params))
        }
    }

    struct EchoModule;
    impl AgentModule for EchoModule {
        fn name(&self) -> &str {
            "echo_module"
        }
        fn actions(&self) -> Vec<Arc<dyn Action>> {
            vec![Arc::new(EchoAction)]
        }
        fn signal_routes(&self) -> Vec<Route> {
            vec![Route::new("test.echo", Target::action("echo", json!({})))]
        }
    }

    struct NullSpawner;
    #[async_trait]
    impl AgentSpawner for NullSpawner {
        async fn start_child(&self, _parent_id: &str, _tag: &str, _module_name: &str, _opts: Value) -> Result<AgentHandle> {
            Err(JidoError::execution("spawning not supported in this test"))
        }
        async fn stop_agent(&self, _id: &str, _reason: Option<String>) -> Result<()> {
            Ok(())
        }
    }

    fn test_config(id: &str) -> AgentServerConfig {
        AgentServerConfig {
            id: id.to_string(),
            module: Arc::new(EchoModule),
            parent: None,
            spawner: Arc::new(NullSpawner),
            buses: None,
            registry: None,
            id_generator: Arc::new(IdGenerator::new()),
            runner_policy: RunnerPolicy::default(),
        }
    }

    #[tokio::test]
    async fn call_routes_and_returns_action_result() {
        let handle = spawn(test_config("a1"));
        let signal = Signal::new(IdGenerator::new().generate().0, "test.echo", "client", json!({"hi": "there"})).unwrap();
        let result = handle.call(signal, 1000).await.unwrap();
        assert_eq!(result, json!({"hi": "there"}));
    }

    #[tokio::test]
    async fn cast_does_not_block_caller() {
        let handle = spawn(test_config("a2"));
        let signal = Signal::new(IdGenerator::new().generate().0, "test.echo", "client", json!({})).unwrap();
        handle.cast(signal);
    }

    #[tokio::test]
    async fn unroutable_signal_returns_no_handler_error() {
        let handle = spawn(test_config("a3"));
        let signal = Signal::new(IdGenerator::new().generate().0, "nothing.here", "client", json!({})).unwrap();
        let result = handle.call(signal, 1000).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn route_default_params_are_overridden_by_signal_data() {
        let handle = spawn(test_config("a4"));
        let signal = Signal::new(
            IdGenerator::new().generate().0,
            "test.echo",
            "client",
            json!({"hi": "there", "extra": 1}),
        )
        .unwrap();
        let result = handle.call(signal, 1000).await.unwrap();
        assert_eq!(result, json!({"hi": "there", "extra": 1}));
    }

    #[test]
    fn merge_keeps_route_defaults_not_named_in_signal_data() {
        let merged = merge_action_params(json!({"a": 1, "b": 2}), &json!({"b": 99}));
        assert_eq!(merged, json!({"a": 1, "b": 99}));
    }

    #[tokio::test]
    async fn unhandled_child_started_is_a_no_op_not_an_error() {
        let handle = spawn(test_config("a5"));
        let data = json!({"pid": "child-1", "tag": "w1"});
        let signal = Signal::new(
            IdGenerator::new().generate().0,
            "jido.agent.child.started",
            "supervisor",
            data.clone(),
        )
        .unwrap();
        let result = handle.call(signal, 1000).await.unwrap();
        assert_eq!(result, data);
    }

    struct ChildStartedModule;
    impl AgentModule for ChildStartedModule {
        fn name(&self) -> &str {
            "child_started_module"
        }
        fn actions(&self) -> Vec<Arc<dyn Action>> {
            vec![Arc::new(EchoAction)]
        }
        fn signal_routes(&self) -> Vec<Route> {
            vec![Route::new(
                "jido.agent.child.started",
                Target::action("echo", json!({"handled": true})),
            )]
        }
    }

    #[tokio::test]
    async fn module_can_register_its_own_child_started_route() {
        let mut config = test_config("a6");
        config.module = Arc::new(ChildStartedModule);
        let handle = spawn(config);
        let signal = Signal::new(
            IdGenerator::new().generate().0,
            "jido.agent.child.started",
            "supervisor",
            json!({"pid": "child-1"}),
        )
        .unwrap();
        let result = handle.call(signal, 1000).await.unwrap();
        assert_eq!(result, json!({"handled": true, "pid": "child-1"}));
    }
}
