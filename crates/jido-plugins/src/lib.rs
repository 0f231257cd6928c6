//! # jido-plugins — default plugins (§4.9)
//!
//! Every Jido agent picks up three default plugins unless its module's
//! `default_plugins` config disables or replaces them:
//!
//! - [`thread::ThreadPlugin`] — append-only conversation history.
//! - [`identity::IdentityPlugin`] — static descriptive metadata.
//! - [`memory::MemoryPlugin`] — a bounded key/value fact store.
//!
//! Each is an ordinary [`jido_core::plugin::Plugin`]: it owns a slice of
//! agent state under its own `state_key`, contributes a handful of routes
//! and actions, and otherwise stays out of the way of routing for
//! everything else the agent handles.

pub mod error;
pub mod identity;
pub mod memory;
pub mod thread;

pub use error::{PluginError, Result};
pub use identity::IdentityPlugin;
pub use memory::MemoryPlugin;
pub use thread::ThreadPlugin;

use std::sync::Arc;

use jido_core::plugin::Plugin;

/// The default plugin set an agent module gets unless it overrides
/// `plugins()` itself, matching the spec's "auto-included" default set.
pub fn default_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(ThreadPlugin::new()),
        Arc::new(IdentityPlugin::default()),
        Arc::new(MemoryPlugin::new()),
    ]
}
