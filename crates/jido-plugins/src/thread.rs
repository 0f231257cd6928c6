//! Thread plugin (§4.9): append-only conversation history under
//! `agent.state["thread"]`, the default companion to [`crate::identity`]
//! and [`crate::memory`] every agent picks up unless `default_plugins`
//! disables or replaces it.
//!
//! Entries are plain `{role, content, recorded_at}` objects. The plugin
//! itself does no LLM-specific formatting — that belongs to whatever
//! consumes `state()["thread"]["entries"]` downstream.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use jido_core::action::{Action, ActionContext, ActionOutcome};
use jido_core::error::Result;
use jido_core::plugin::Plugin;
use jido_core::router::{Route, Target};

const STATE_KEY: &str = "thread";

fn entries_of(state: &Map<String, Value>) -> Vec<Value> {
    state
        .get(STATE_KEY)
        .and_then(|t| t.get("entries"))
        .and_then(|e| e.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Appends one `{role, content}` entry, trimming the oldest entries once
/// `max_entries` is exceeded.
struct AppendAction {
    max_entries: usize,
}

#[async_trait]
impl Action for AppendAction {
    fn name(&self) -> &str {
        "thread.append"
    }

    async fn execute(&self, params: Value, ctx: ActionContext) -> Result<ActionOutcome> {
        let role = params.get("role").and_then(Value::as_str).unwrap_or("user").to_string();
        let content = params.get("content").cloned().unwrap_or(Value::Null);

        let mut entries = entries_of(&ctx.state);
        entries.push(json!({
            "role": role,
            "content": content,
            "recorded_at": Utc::now().to_rfc3339(),
        }));
        if entries.len() > self.max_entries {
            let overflow = entries.len() - self.max_entries;
            entries.drain(0..overflow);
        }

        let mut attrs = Map::new();
        attrs.insert(STATE_KEY.to_string(), json!({"entries": entries}));
        Ok(ActionOutcome::new(json!({"entries_len": entries.len()}))
            .with_directive(jido_core::directive::Directive::SetState { attrs }))
    }
}

/// Clears the thread, e.g. on a `thread.clear` signal.
struct ClearAction;

#[async_trait]
impl Action for ClearAction {
    fn name(&self) -> &str {
        "thread.clear"
    }

    async fn execute(&self, _params: Value, _ctx: ActionContext) -> Result<ActionOutcome> {
        let mut attrs = Map::new();
        attrs.insert(STATE_KEY.to_string(), json!({"entries": Vec::<Value>::new()}));
        Ok(ActionOutcome::new(Value::Null).with_directive(jido_core::directive::Directive::SetState { attrs }))
    }
}

pub struct ThreadPlugin {
    max_entries: usize,
}

impl ThreadPlugin {
    pub fn new() -> Self {
        Self { max_entries: 100 }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

impl Default for ThreadPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ThreadPlugin {
    fn name(&self) -> &str {
        "thread"
    }

    fn state_key(&self) -> &str {
        STATE_KEY
    }

    fn signal_routes(&self) -> Vec<Route> {
        vec![
            Route::new("thread.append", Target::action("thread.append", Value::Null)),
            Route::new("thread.clear", Target::action("thread.clear", Value::Null)),
        ]
    }

    fn actions(&self) -> Vec<Arc<dyn Action>> {
        vec![
            Arc::new(AppendAction { max_entries: self.max_entries }),
            Arc::new(ClearAction),
        ]
    }

    fn mount(&self, _config: &Value) -> Result<Value> {
        Ok(json!({"entries": Vec::<Value>::new(), "max_entries": self.max_entries}))
    }
}
