//! Memory plugin (§4.9): a bounded key/value store under
//! `agent.state["memory"]`, for facts an agent wants to recall across
//! signals that don't belong in the transient [`crate::thread`] history.
//!
//! Capacity is fixed at mount time; `memory.set` on a new key past the
//! limit fails rather than silently evicting, since memory is meant to
//! hold small, deliberately-placed facts, not a cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use jido_core::action::{Action, ActionContext, ActionOutcome};
use jido_core::directive::Directive;
use jido_core::error::Result;
use jido_core::plugin::Plugin;
use jido_core::router::{Route, Target};

use crate::error::PluginError;

const STATE_KEY: &str = "memory";

fn entries_of(state: &Map<String, Value>) -> Map<String, Value> {
    state
        .get(STATE_KEY)
        .and_then(|m| m.get("entries"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

struct SetAction {
    max_entries: usize,
}

#[async_trait]
impl Action for SetAction {
    fn name(&self) -> &str {
        "memory.set"
    }

    async fn execute(&self, params: Value, ctx: ActionContext) -> Result<ActionOutcome> {
        let key = params
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| PluginError::InvalidField("memory.set requires a string 'key'".to_string()))?
            .to_string();
        let value = params.get("value").cloned().unwrap_or(Value::Null);

        let mut entries = entries_of(&ctx.state);
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            return Err(PluginError::MemoryFull {
                current: entries.len(),
                limit: self.max_entries,
            }
            .into());
        }
        entries.insert(key, value);

        let mut attrs = Map::new();
        attrs.insert(STATE_KEY.to_string(), json!({"entries": entries}));
        Ok(ActionOutcome::new(Value::Object(entries)).with_directive(Directive::SetState { attrs }))
    }
}

struct ForgetAction;

#[async_trait]
impl Action for ForgetAction {
    fn name(&self) -> &str {
        "memory.forget"
    }

    async fn execute(&self, params: Value, ctx: ActionContext) -> Result<ActionOutcome> {
        let key = params.get("key").and_then(Value::as_str).unwrap_or_default();
        let mut entries = entries_of(&ctx.state);
        entries.remove(key);

        let mut attrs = Map::new();
        attrs.insert(STATE_KEY.to_string(), json!({"entries": entries}));
        Ok(ActionOutcome::new(Value::Object(entries)).with_directive(Directive::SetState { attrs }))
    }
}

pub struct MemoryPlugin {
    max_entries: usize,
}

impl MemoryPlugin {
    pub fn new() -> Self {
        Self { max_entries: 256 }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

impl Default for MemoryPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for MemoryPlugin {
    fn name(&self) -> &str {
        "memory"
    }

    fn state_key(&self) -> &str {
        STATE_KEY
    }

    fn signal_routes(&self) -> Vec<Route> {
        vec![
            Route::new("memory.set", Target::action("memory.set", Value::Null)),
            Route::new("memory.forget", Target::action("memory.forget", Value::Null)),
        ]
    }

    fn actions(&self) -> Vec<Arc<dyn Action>> {
        vec![
            Arc::new(SetAction { max_entries: self.max_entries }),
            Arc::new(ForgetAction),
        ]
    }

    fn mount(&self, _config: &Value) -> Result<Value> {
        Ok(json!({"entries": Map::<String, Value>::new(), "max_entries": self.max_entries}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(state: Value) -> ActionContext {
        ActionContext {
            agent_id: "a1".to_string(),
            state: state.as_object().unwrap().clone(),
        }
    }

    #[tokio::test]
    async fn set_then_forget_round_trips() {
        let set = SetAction { max_entries: 10 };
        let outcome = set.execute(json!({"key": "favorite_color", "value": "teal"}), ctx(json!({}))).await.unwrap();
        assert_eq!(outcome.result["favorite_color"], "teal");

        let forget = ForgetAction;
        let outcome = forget
            .execute(json!({"key": "favorite_color"}), ctx(json!({"memory": {"entries": {"favorite_color": "teal"}}})))
            .await
            .unwrap();
        assert!(outcome.result.as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_rejects_new_key_past_capacity() {
        let action = SetAction { max_entries: 1 };
        let state = json!({"memory": {"entries": {"a": 1}}});
        let result = action.execute(json!({"key": "b", "value": 2}), ctx(state)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn set_allows_overwriting_existing_key_past_capacity() {
        let action = SetAction { max_entries: 1 };
        let state = json!({"memory": {"entries": {"a": 1}}});
        let outcome = action.execute(json!({"key": "a", "value": 99}), ctx(state)).await.unwrap();
        assert_eq!(outcome.result["a"], 99);
    }

    #[tokio::test]
    async fn forget_unknown_key_is_a_no_op() {
        let action = ForgetAction;
        let outcome = action.execute(json!({"key": "nope"}), ctx(json!({}))).await.unwrap();
        assert!(outcome.result.as_object().unwrap().is_empty());
    }
}
