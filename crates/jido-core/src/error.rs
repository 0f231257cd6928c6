//! Error types for the Jido runtime.
//!
//! `JidoError` is the single error type returned across the router, bus,
//! directive, runner, and agent server boundaries. Each variant corresponds
//! to one of the error kinds an implementer is expected to surface (see the
//! error taxonomy in the top-level specification): validation, routing,
//! execution, timeout, compensation, dispatch, subscription, snapshot, and
//! lifecycle failures.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, JidoError>;

#[derive(Error, Debug, Clone)]
pub enum JidoError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("compensation error: {0:?}")]
    Compensation(CompensationError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl JidoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        JidoError::Validation(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        JidoError::Execution(msg.into())
    }
}

/// Errors raised while constructing or querying a [`crate::router::Router`].
#[derive(Error, Debug, Clone)]
pub enum RoutingError {
    #[error("no handler matched signal type '{0}'")]
    NoHandler(String),

    #[error("invalid path '{0}': {1}")]
    InvalidPath(String, String),

    #[error("invalid priority {0}: must be in [-100, 100]")]
    InvalidPriority(i32),

    #[error("invalid match function for path '{0}': {1}")]
    InvalidMatchFunction(String, String),
}

/// Errors raised when an `Emit`/pid/named/bus/pubsub dispatch fails.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("process '{0}' is not alive")]
    ProcessNotAlive(String),

    #[error("named process '{0}' was not found")]
    ProcessNotFound(String),

    #[error("bus '{0}' was not found")]
    BusNotFound(String),
}

/// Errors raised by `subscribe`/`unsubscribe` on the signal bus.
#[derive(Error, Debug, Clone)]
pub enum SubscriptionError {
    #[error("subscription '{0}' already exists")]
    AlreadyExists(String),

    #[error("subscription '{0}' was not found")]
    NotFound(String),
}

/// Errors raised by snapshot operations on the signal bus.
#[derive(Error, Debug, Clone)]
pub enum SnapshotError {
    #[error("snapshot '{0}' was not found")]
    NotFound(String),
}

/// Errors raised by agent/child lifecycle operations.
#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    #[error("child with tag '{0}' is already registered")]
    ChildAlreadyRegistered(String),

    #[error("child with tag '{0}' was not found")]
    ChildNotFound(String),

    #[error("agent id '{0}' is already registered")]
    AgentAlreadyRegistered(String),

    #[error("agent '{0}' was not found")]
    AgentNotFound(String),
}

/// The outcome of a failed action after exhausting retries and, if declared,
/// attempting compensation.
#[derive(Debug, Clone)]
pub struct CompensationError {
    pub compensated: bool,
    pub original_error: String,
    pub compensation_error: Option<String>,
}

impl std::fmt::Display for CompensationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "compensated={} original={} compensation_error={:?}",
            self.compensated, self.original_error, self.compensation_error
        )
    }
}
