//! Bus-specific failures are already first-class [`jido_core::error::JidoError`]
//! variants (`Subscription`, `Snapshot`, `Dispatch`) — this crate has no
//! error taxonomy of its own and re-exports the shared one so callers don't
//! need to reach into `jido_core` directly.

pub use jido_core::error::{DispatchError, JidoError, Result, SnapshotError, SubscriptionError};
