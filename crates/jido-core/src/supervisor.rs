//! The `Jido` handle: a dynamic supervisor for agent processes plus the
//! name registry (§4.11).
//!
//! A `Jido` instance bundles three things an `AgentServer` has no way to
//! build on its own: a module catalog (name → constructor, so a
//! `SpawnAgent` directive's bare `module_name` string can become a running
//! agent), a registry (`id → AgentHandle`), and a default dispatch target.
//! It implements [`crate::agent::AgentSpawner`] and
//! [`crate::agent::AgentRegistry`] so an `AgentServer` can be handed a
//! `Jido` without depending on this module's concrete type.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::agent::{AgentHandle, AgentModule, AgentRegistry, AgentServerConfig, AgentSpawner, ParentRef};
use crate::dispatch::DispatchConfig;
use crate::error::{JidoError, LifecycleError, Result};
use crate::id::IdGenerator;
use crate::runner::RunnerPolicy;

/// Constructs a fresh `AgentModule` instance for a catalog entry. Modules
/// are typically zero-sized or config-carrying structs, so a constructor
/// closure rather than a shared singleton lets every spawn get its own.
pub type ModuleConstructor = Arc<dyn Fn() -> Arc<dyn AgentModule> + Send + Sync>;

/// Name → constructor table. Distinct from any single agent's router: the
/// supervisor is the only thing that needs to turn a `SpawnAgent` directive's
/// `module` string into a runnable `AgentModule`.
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    constructors: HashMap<String, ModuleConstructor>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, ctor: ModuleConstructor) -> Self {
        self.constructors.insert(name.into(), ctor);
        self
    }

    pub fn build(&self, name: &str) -> Option<Arc<dyn AgentModule>> {
        self.constructors.get(name).map(|ctor| ctor())
    }
}

#[derive(Clone)]
pub struct JidoConfig {
    pub catalog: ModuleCatalog,
    pub default_dispatch: Option<DispatchConfig>,
    pub runner_policy: RunnerPolicy,
    pub bus: Option<Arc<dyn crate::agent::BusRegistry>>,
}

impl JidoConfig {
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self {
            catalog,
            default_dispatch: None,
            runner_policy: RunnerPolicy::default(),
            bus: None,
        }
    }

    pub fn with_default_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.default_dispatch = Some(dispatch);
        self
    }

    pub fn with_runner_policy(mut self, policy: RunnerPolicy) -> Self {
        self.runner_policy = policy;
        self
    }

    /// Every agent this instance spawns (top-level or child) is handed this
    /// bus registry for `Bus`/`PubSub` dispatch targets.
    pub fn with_bus(mut self, bus: Arc<dyn crate::agent::BusRegistry>) -> Self {
        self.bus = Some(bus);
        self
    }
}

struct Registered {
    handle: AgentHandle,
    module: String,
    parent_id: Option<String>,
}

/// Per-process Jido instance: dynamic supervisor, registry, module catalog.
/// Cheaply cloneable; every clone shares the same underlying registry.
#[derive(Clone)]
pub struct Jido {
    inner: Arc<JidoInner>,
}

struct JidoInner {
    config: JidoConfig,
    registry: RwLock<HashMap<String, Registered>>,
    id_generator: Arc<IdGenerator>,
}

impl Jido {
    pub fn new(config: JidoConfig) -> Self {
        Self {
            inner: Arc::new(JidoInner {
                config,
                registry: RwLock::new(HashMap::new()),
                id_generator: Arc::new(IdGenerator::new()),
            }),
        }
    }

    /// Start a top-level agent with explicit `id` (no parent). Returns an
    /// error if `id` is already registered within this instance.
    pub async fn start_agent(&self, module_name: &str, id: impl Into<String>, opts: Value) -> Result<AgentHandle> {
        let id = id.into();
        self.spawn_registered(module_name, id, None, opts).await
    }

    pub async fn stop_agent(&self, id_or_pid: &str, reason: Option<String>) -> Result<()> {
        let registered = {
            let mut registry = self.inner.registry.write().expect("registry lock poisoned");
            registry.remove(id_or_pid)
        };
        match registered {
            Some(registered) => {
                info!(agent_id = %id_or_pid, ?reason, "stopping agent via supervisor");
                let stop_signal = crate::signal::Signal::new(
                    self.inner.id_generator.generate().0,
                    "jido.agent.stop",
                    "supervisor",
                    serde_json::json!({"reason": reason}),
                )?;
                registered.handle.cast(stop_signal);
                Ok(())
            }
            None => Err(JidoError::Dispatch(crate::error::DispatchError::ProcessNotFound(id_or_pid.to_string()))),
        }
    }

    pub fn agent_pid(&self, id: &str) -> Option<AgentHandle> {
        self.inner.registry.read().expect("registry lock poisoned").get(id).map(|r| r.handle.clone())
    }

    /// List the ids of every agent registered as a child of `parent_id`.
    pub fn children_of(&self, parent_id: &str) -> Vec<String> {
        self.inner
            .registry
            .read()
            .expect("registry lock poisoned")
            .iter()
            .filter(|(_, r)| r.parent_id.as_deref() == Some(parent_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Deliver `signal` to this instance's configured default dispatch
    /// target, if one was set via [`JidoConfig::with_default_dispatch`].
    /// A no-op (`Ok(())`) when no default target is configured, so callers
    /// can invoke it unconditionally as a catch-all sink.
    pub async fn dispatch_default(&self, signal: crate::signal::Signal) -> Result<()> {
        let Some(target) = self.inner.config.default_dispatch.clone() else {
            return Ok(());
        };
        crate::dispatch::Dispatcher::dispatch(self, &target, crate::dispatch::Delivery::new(signal))
            .await
            .map(|_| ())
    }

    async fn spawn_registered(
        &self,
        module_name: &str,
        id: String,
        parent: Option<ParentRef>,
        opts: Value,
    ) -> Result<AgentHandle> {
        {
            let registry = self.inner.registry.read().expect("registry lock poisoned");
            if registry.contains_key(&id) {
                return Err(JidoError::Lifecycle(LifecycleError::ChildAlreadyRegistered(id)));
            }
        }
        let module = self
            .inner
            .config
            .catalog
            .build(module_name)
            .ok_or_else(|| JidoError::validation(format!("no module registered under name '{module_name}'")))?;

        let initial_opts = match opts {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("opts".to_string(), other);
                map
            }
        };
        let mut initial_state = module.initial_state();
        crate::state_ops::deep_merge(&mut initial_state, initial_opts);

        struct ModuleWithState {
            inner: Arc<dyn AgentModule>,
            state: Map<String, Value>,
        }
        impl AgentModule for ModuleWithState {
            fn name(&self) -> &str {
                self.inner.name()
            }
            fn actions(&self) -> Vec<Arc<dyn crate::action::Action>> {
                self.inner.actions()
            }
            fn signal_routes(&self) -> Vec<crate::router::Route> {
                self.inner.signal_routes()
            }
            fn plugins(&self) -> Vec<Arc<dyn crate::plugin::Plugin>> {
                self.inner.plugins()
            }
            fn initial_state(&self) -> Map<String, Value> {
                self.state.clone()
            }
            fn strategy(&self) -> Option<Box<dyn crate::strategy::Strategy>> {
                self.inner.strategy()
            }
        }

        let parent_id = parent.as_ref().map(|p| p.id.clone());
        let config = AgentServerConfig {
            id: id.clone(),
            module: Arc::new(ModuleWithState { inner: module, state: initial_state }),
            parent,
            spawner: Arc::new(self.clone()),
            buses: self.inner.config.bus.clone(),
            registry: Some(Arc::new(self.clone())),
            id_generator: self.inner.id_generator.clone(),
            runner_policy: self.inner.config.runner_policy.clone(),
        };
        let handle = crate::agent::spawn(config);

        self.inner.registry.write().expect("registry lock poisoned").insert(
            id,
            Registered {
                handle: handle.clone(),
                module: module_name.to_string(),
                parent_id,
            },
        );
        Ok(handle)
    }
}

#[async_trait]
impl AgentSpawner for Jido {
    async fn start_child(&self, parent_id: &str, tag: &str, module_name: &str, opts: Value) -> Result<AgentHandle> {
        let child_id = format!("{parent_id}/{tag}");
        let parent_handle = self
            .agent_pid(parent_id)
            .ok_or_else(|| JidoError::Dispatch(crate::error::DispatchError::ProcessNotFound(parent_id.to_string())))?;
        let parent = ParentRef {
            id: parent_id.to_string(),
            tag: tag.to_string(),
            meta: Value::Null,
            handle: parent_handle,
        };
        self.spawn_registered(module_name, child_id, Some(parent), opts).await
    }

    async fn stop_agent(&self, id: &str, reason: Option<String>) -> Result<()> {
        self.stop_agent(id, reason).await
    }
}

#[async_trait]
impl AgentRegistry for Jido {
    async fn resolve(&self, id_or_name: &str) -> Option<AgentHandle> {
        self.agent_pid(id_or_name)
    }
}

/// Lets `jido-bus` deliver to subscriptions without depending on the
/// concrete `Jido` type: a `Bus` is handed a `Dispatcher` and resolves
/// each subscription's `DispatchConfig` the same way an agent server
/// resolves an `Emit` directive's target.
#[async_trait]
impl crate::dispatch::Dispatcher for Jido {
    async fn dispatch(&self, config: &DispatchConfig, delivery: crate::dispatch::Delivery) -> Result<Value> {
        config.validate()?;
        match config {
            DispatchConfig::Pid { agent_id, .. } => match self.agent_pid(agent_id) {
                Some(handle) => {
                    handle.cast(delivery.signal);
                    Ok(Value::Null)
                }
                None => Err(JidoError::Dispatch(crate::error::DispatchError::ProcessNotAlive(agent_id.clone()))),
            },
            DispatchConfig::Named { name, .. } => match self.agent_pid(name) {
                Some(handle) => {
                    handle.cast(delivery.signal);
                    Ok(Value::Null)
                }
                None => Err(JidoError::Dispatch(crate::error::DispatchError::ProcessNotFound(name.clone()))),
            },
            DispatchConfig::Bus { bus_name, stream } => match &self.inner.config.bus {
                Some(bus) => bus.publish(bus_name, stream.as_deref(), delivery.signal).await.map(|_| Value::Null),
                None => Err(JidoError::Dispatch(crate::error::DispatchError::BusNotFound(bus_name.clone()))),
            },
            DispatchConfig::PubSub { bus_name, topic } => match &self.inner.config.bus {
                Some(bus) => bus.publish_topic(bus_name, topic, delivery.signal).await.map(|_| Value::Null),
                None => Err(JidoError::Dispatch(crate::error::DispatchError::BusNotFound(bus_name.clone()))),
            },
            DispatchConfig::Remote { inner, .. } => {
                let inner_delivery = crate::dispatch::Delivery::new(delivery.signal);
                Box::pin(crate::dispatch::Dispatcher::dispatch(self, inner, inner_delivery)).await
            }
        }
    }
}
