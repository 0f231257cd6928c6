//! # jido-bus — ordered signal log, snapshots, subscription checkpoints
//!
//! An in-process pub/sub bus (§4.5): every [`Bus`] holds an append-only
//! log of [`jido_core::signal::RecordedSignal`]s, a set of path-pattern
//! subscriptions delivered through the shared
//! [`jido_core::dispatch::Dispatcher`] seam, and pointers into a
//! process-wide [`snapshot::SnapshotRegistry`] of materialized log
//! subsets. [`BusHub`] is the thing actually wired into
//! [`jido_core::agent::AgentServerConfig::buses`] or
//! [`jido_core::supervisor::JidoConfig`]: it creates and looks up buses by
//! name and implements [`jido_core::agent::BusRegistry`] so agents publish
//! to it without any bus-specific code of their own.
//!
//! `jido-bus` has no knowledge of any concrete dispatcher implementation;
//! it is handed one (typically a [`jido_core::supervisor::Jido`] instance,
//! which also implements `Dispatcher`) at construction time.

pub mod bus;
pub mod error;
pub mod snapshot;

pub use bus::{Bus, BusHub, Subscription};
pub use error::{JidoError, Result};
pub use snapshot::{SnapshotData, SnapshotRef, SnapshotRegistry};
