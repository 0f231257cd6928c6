//! Identity plugin (§4.9): the agent's own descriptive metadata
//! (`name`, `description`, `traits`) under `agent.state["identity"]`.
//!
//! Unlike [`crate::thread`] and [`crate::memory`], identity is mostly
//! static: it's set once at mount time from the module's configuration and
//! updated only through an explicit `identity.update` signal, never
//! appended to piecemeal.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use jido_core::action::{Action, ActionContext, ActionOutcome};
use jido_core::directive::Directive;
use jido_core::error::Result;
use jido_core::plugin::Plugin;
use jido_core::router::{Route, Target};

use crate::error::PluginError;

const STATE_KEY: &str = "identity";

struct UpdateAction;

#[async_trait]
impl Action for UpdateAction {
    fn name(&self) -> &str {
        "identity.update"
    }

    async fn execute(&self, params: Value, ctx: ActionContext) -> Result<ActionOutcome> {
        let Some(updates) = params.as_object() else {
            return Err(PluginError::InvalidIdentity("identity.update requires an object payload".to_string()).into());
        };

        let mut identity = ctx
            .state
            .get(STATE_KEY)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (k, v) in updates.clone() {
            identity.insert(k, v);
        }

        let mut attrs = Map::new();
        attrs.insert(STATE_KEY.to_string(), Value::Object(identity.clone()));
        Ok(ActionOutcome::new(Value::Object(identity)).with_directive(Directive::SetState { attrs }))
    }
}

pub struct IdentityPlugin {
    name: String,
    description: Option<String>,
}

impl IdentityPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Default for IdentityPlugin {
    fn default() -> Self {
        Self::new("agent")
    }
}

#[async_trait]
impl Plugin for IdentityPlugin {
    fn name(&self) -> &str {
        "identity"
    }

    fn state_key(&self) -> &str {
        STATE_KEY
    }

    fn signal_routes(&self) -> Vec<Route> {
        vec![Route::new("identity.update", Target::action("identity.update", Value::Null))]
    }

    fn actions(&self) -> Vec<Arc<dyn Action>> {
        vec![Arc::new(UpdateAction)]
    }

    fn mount(&self, _config: &Value) -> Result<Value> {
        if self.name.trim().is_empty() {
            return Err(PluginError::InvalidIdentity("identity name must not be empty".to_string()).into());
        }
        Ok(json!({"name": self.name, "description": self.description}))
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

    #[test]
    fn mount_rejects_empty_name() {
        let plugin = IdentityPlugin::new("");
        assert!(plugin.mount(&Value::Null).is_err());
    }

    #[test]
    fn mount_carries_name_and_description() {
        let plugin = IdentityPlugin::new("coordinator").with_description("routes jobs to workers");
        let mounted = plugin.mount(&Value::Null).unwrap();
        assert_eq!(mounted["name"], "coordinator");
        assert_eq!(mounted["description"], "routes jobs to workers");
    }

    #[tokio::test]
    async fn update_merges_over_existing_identity() {
        let action = UpdateAction;
        let state = json!({"identity": {"name": "coordinator", "description": "old"}});
        let outcome = action.execute(json!({"description": "new"}), ctx(state)).await.unwrap();
        assert_eq!(outcome.result["name"], "coordinator");
        assert_eq!(outcome.result["description"], "new");
    }

    #[tokio::test]
    async fn update_rejects_non_object_payload() {
        let action = UpdateAction;
        let result = action.execute(json!("not an object"), ctx(json!({}))).await;
        assert!(result.is_err());
    }
}
