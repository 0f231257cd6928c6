//! Plugin framework (§4.9): modules that own a slice of agent state under
//! `state_key`, contribute routes and actions, and run as middleware ahead
//! of routing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::action::Action;
use crate::error::Result;
use crate::router::Route;
use crate::signal::Signal;

/// What `handle_signal` decided to do with an inbound signal.
pub enum SignalDecision {
    /// Unchanged; continue to routing.
    Continue,
    /// Replace the signal and continue to routing.
    ContinueWith(Signal),
    /// Skip routing; resolve directly to this action module + params.
    Override { module: String, params: Value },
    /// Abort processing this signal; returned to a synchronous caller.
    Error(crate::error::JidoError),
}

/// A module owning a slice of agent state at `agent.state[state_key]`.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn state_key(&self) -> &str;

    /// Signal type patterns this plugin's `handle_signal` applies to.
    /// Empty means match-all.
    fn signal_patterns(&self) -> &[String] {
        &[]
    }

    /// Routes this plugin contributes to the agent's combined router.
    fn signal_routes(&self) -> Vec<Route> {
        Vec::new()
    }

    /// Action modules this plugin contributes; merged into the agent's
    /// action map alongside the module's own at spawn time.
    fn actions(&self) -> Vec<Arc<dyn Action>> {
        Vec::new()
    }

    /// Initialize this plugin's slice of state when the agent starts.
    fn mount(&self, config: &Value) -> Result<Value>;

    /// Run before routing for every signal matching `signal_patterns`.
    async fn handle_signal(&self, signal: &Signal, plugin_state: &Value) -> SignalDecision {
        let _ = (signal, plugin_state);
        SignalDecision::Continue
    }

    /// Post-process the agent snapshot returned from a synchronous `call`,
    /// without touching durable server state.
    fn transform_result(&self, agent_view: Value) -> Value {
        agent_view
    }
}

/// Whether `plugin`'s `signal_patterns` matches `signal_type`; empty
/// patterns match everything. Uses the same dot-segment grammar as routes,
/// via a disposable single-route [`crate::router::Router`].
pub fn patterns_match(patterns: &[String], signal_type: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|pattern| {
        crate::router::Router::new(vec![Route::new(
            pattern.clone(),
            crate::router::Target::action("match-probe", Value::Null),
        )])
        .ok()
        .and_then(|router| {
            crate::signal::Signal::new(crate::id::Id::nil(), signal_type, "probe", Value::Null)
                .ok()
                .map(|s| router.route(&s).is_ok())
        })
        .unwrap_or(false)
    })
}
