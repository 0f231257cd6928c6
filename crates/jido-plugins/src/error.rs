//! Errors specific to the default plugins, converted into
//! [`jido_core::error::JidoError`] at the boundary where `mount`/actions
//! hand results back to the agent server — mirroring how
//! `langgraph-checkpoint::error::CheckpointError` stays a small local enum
//! rather than growing the core taxonomy for concerns only this crate has.

use thiserror::Error;

use jido_core::error::JidoError;

pub type Result<T> = std::result::Result<T, PluginError>;

#[derive(Error, Debug, Clone)]
pub enum PluginError {
    #[error("identity plugin misconfigured: {0}")]
    InvalidIdentity(String),

    #[error("memory plugin capacity exceeded: {current} entries, limit {limit}")]
    MemoryFull { current: usize, limit: usize },

    #[error("thread plugin misconfigured: {0}")]
    InvalidThread(String),

    #[error("missing or invalid field: {0}")]
    InvalidField(String),
}

impl From<PluginError> for JidoError {
    fn from(err: PluginError) -> Self {
        JidoError::execution(err.to_string())
    }
}
