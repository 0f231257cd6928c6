//! # jido-core — supervised, hierarchical, signal-driven agents
//!
//! `jido-core` implements the agent runtime: each agent is a single
//! `tokio`-spawned process with its own mailbox, durable JSON state, and a
//! FIFO queue of inbound signals. Agents form a supervision tree (parent
//! links, named children) and talk to each other and to the outside world
//! through a small set of primitives:
//!
//! - **Signals** ([`signal`]) — the unit of communication. Immutable,
//!   time-ordered, carrying an arbitrary JSON payload.
//! - **Routing** ([`router`]) — a trie over dot-separated signal types with
//!   `*`/`**` wildcards and optional predicate matchers, resolving a signal
//!   to an action or a dispatch target.
//! - **Actions** ([`action`]) and the **runner** ([`runner`]) — the unit of
//!   work and the engine that executes it with timeout, retry/backoff, and
//!   compensation.
//! - **Directives** ([`directive`]) — the closed set of effects an action
//!   can request: mutate state, emit a signal, schedule a timer or cron job,
//!   spawn or stop a child, stop self.
//! - **Plugins** ([`plugin`]) and **strategies** ([`strategy`]) — composable
//!   middleware and batch-lifecycle bookkeeping layered around the runner.
//! - **The agent server** ([`agent`]) — ties all of the above into the
//!   actual per-agent task and mailbox loop.
//! - **The supervisor** ([`supervisor`]) — the `Jido` handle: dynamic
//!   supervision, the module catalog, and the default in-process dispatcher.
//!
//! `jido-core` has no knowledge of the bus (see `jido-bus`) or of any
//! concrete plugin (see `jido-plugins`); both are wired in through the
//! [`agent::BusRegistry`] and [`plugin::Plugin`] trait seams so this crate
//! stays the dependency root rather than a hub.

pub mod action;
pub mod agent;
pub mod directive;
pub mod dispatch;
pub mod error;
pub mod id;
pub mod plugin;
pub mod router;
pub mod runner;
pub mod scheduler;
pub mod signal;
pub mod state_ops;
pub mod strategy;
pub mod supervisor;

pub use action::{Action, ActionContext, ActionOutcome};
pub use agent::{
    Agent, AgentHandle, AgentModule, AgentRegistry, AgentServer, AgentServerConfig, AgentSpawner,
    BusRegistry, ChildRef, ParentRef, ServerMessage,
};
pub use directive::{Directive, SpawnSpec};
pub use dispatch::{Delivery, DeliveryMode, DispatchConfig, Dispatcher};
pub use error::{JidoError, Result};
pub use id::{Id, IdGenerator};
pub use plugin::{Plugin, SignalDecision};
pub use router::{Matcher, Route, Router, Target};
pub use runner::{Instruction, RunOutcome, RunnerPolicy};
pub use scheduler::{AgentScheduler, SchedulerMessage};
pub use signal::{validate_path, RecordedSignal, Signal};
pub use state_ops::StateOp;
pub use strategy::{FsmStrategy, Strategy, StrategyStatus, ThreadAwareStrategy};
pub use supervisor::{Jido, JidoConfig, ModuleCatalog, ModuleConstructor};
