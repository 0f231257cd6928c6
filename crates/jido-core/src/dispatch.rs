//! Dispatch configs: where a routed or emitted signal ends up.
//!
//! A [`DispatchConfig`] is a serializable description of a delivery target.
//! Actually performing the delivery is the agent server's job (it is the
//! only thing that knows the local registry, the bus handles, and its own
//! mailbox sender) — this module only defines and validates the
//! configuration shape, mirroring the split the specification draws between
//! "target" (data) and "dispatch" (effect).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JidoError, Result};

/// Delivery mode for a `pid`/`named` dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Fire-and-forget.
    Async,
    /// Request/reply bounded by a timeout.
    Sync { timeout_ms: u64 },
}

/// A single dispatch target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchConfig {
    /// Deliver directly to a known agent id.
    Pid {
        agent_id: String,
        mode: DeliveryMode,
    },
    /// Resolve an agent by registered name, then deliver.
    Named {
        name: String,
        mode: DeliveryMode,
    },
    /// Publish onto a named bus, optionally into a specific stream.
    Bus {
        bus_name: String,
        stream: Option<String>,
    },
    /// Publish to a topic on a named pub/sub bus.
    PubSub { bus_name: String, topic: String },
    /// Wrap another dispatch kind with a remote node hint.
    Remote {
        node: String,
        inner: Box<DispatchConfig>,
    },
}

impl DispatchConfig {
    pub fn pid(agent_id: impl Into<String>) -> Self {
        DispatchConfig::Pid {
            agent_id: agent_id.into(),
            mode: DeliveryMode::Async,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        DispatchConfig::Named {
            name: name.into(),
            mode: DeliveryMode::Async,
        }
    }

    pub fn bus(bus_name: impl Into<String>) -> Self {
        DispatchConfig::Bus {
            bus_name: bus_name.into(),
            stream: None,
        }
    }

    /// Statically validate this config (and, by extension, a list of them).
    pub fn validate(&self) -> Result<()> {
        match self {
            DispatchConfig::Pid { agent_id, .. } if agent_id.is_empty() => {
                Err(JidoError::validation("pid dispatch requires a non-empty agent_id"))
            }
            DispatchConfig::Named { name, .. } if name.is_empty() => {
                Err(JidoError::validation("named dispatch requires a non-empty name"))
            }
            DispatchConfig::Bus { bus_name, .. } if bus_name.is_empty() => {
                Err(JidoError::validation("bus dispatch requires a non-empty bus_name"))
            }
            DispatchConfig::PubSub { bus_name, topic } if bus_name.is_empty() || topic.is_empty() => {
                Err(JidoError::validation("pubsub dispatch requires bus_name and topic"))
            }
            DispatchConfig::Remote { node, inner } if node.is_empty() => {
                let _ = inner;
                Err(JidoError::validation("remote dispatch requires a non-empty node"))
            }
            DispatchConfig::Remote { inner, .. } => inner.validate(),
            _ => Ok(()),
        }
    }
}

/// Validate a whole dispatch list; any invalid entry aborts with its error.
pub fn validate_opts(configs: &[DispatchConfig]) -> Result<()> {
    for cfg in configs {
        cfg.validate()?;
    }
    Ok(())
}

/// A resolved piece of content to deliver, independent of the target shape.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub signal: crate::signal::Signal,
}

impl Delivery {
    pub fn new(signal: crate::signal::Signal) -> Self {
        Self { signal }
    }
}

/// Anything capable of delivering a [`Delivery`] to a [`DispatchConfig`]
/// target. The agent server and the bus each implement this against their
/// own registry/mailbox machinery; `jido-core` only defines the contract.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, config: &DispatchConfig, delivery: Delivery) -> Result<Value>;

    /// Dispatch to a list of targets in order, aborting on the first
    /// failure.
    async fn dispatch_all(&self, configs: &[DispatchConfig], delivery: Delivery) -> Result<()> {
        for cfg in configs {
            self.dispatch(cfg, delivery.clone()).await?;
        }
        Ok(())
    }
}
