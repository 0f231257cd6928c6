//! Actions: the pure units of work a [`crate::runner::Runner`] executes.
//!
//! An action receives `(params, context)` and returns an [`ActionOutcome`]
//! carrying a result value and zero or more directives. Actions are
//! intentionally dumb about scheduling, retries, and timeouts — that
//! policy lives entirely on [`crate::runner::Instruction`] and the runner
//! that executes it.

use async_trait::async_trait;
use serde_json::Value;

use crate::directive::Directive;
use crate::error::Result;

/// Context passed to an action alongside its params: agent id and the
/// current agent state, read-only from the action's perspective (state
/// changes flow back out as `SetState`/`ReplaceState` directives, never by
/// mutating this struct).
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub agent_id: String,
    pub state: serde_json::Map<String, Value>,
}

/// The value an action hands back to the runner.
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    pub result: Value,
    pub directives: Vec<Directive>,
}

impl ActionOutcome {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            directives: Vec::new(),
        }
    }

    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn with_directives(mut self, directives: Vec<Directive>) -> Self {
        self.directives.extend(directives);
        self
    }
}

/// A pure function from `(params, context)` to `(result, directives?)`.
/// Implementors must be idempotent with respect to retries: the runner may
/// invoke `execute` more than once for the same params under a retry
/// policy.
#[async_trait]
pub trait Action: Send + Sync {
    /// The dotted module name this action is registered under, used by
    /// the router's action `Target` and by compensation error reporting.
    fn name(&self) -> &str;

    async fn execute(&self, params: Value, context: ActionContext) -> Result<ActionOutcome>;

    /// Optional compensation hook, invoked with the original params and
    /// context after retries are exhausted. Default: no compensation
    /// declared (the runner treats exhaustion as a plain execution error).
    async fn compensate(&self, _params: Value, _context: ActionContext) -> Option<Result<()>> {
        None
    }

    /// Maximum retry attempts beyond the first, 0 by default (no retry).
    fn max_retries(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Action for Echo {
        fn name(&self) -> &str {
            "test.echo"
        }

        async fn execute(&self, params: Value, _context: ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::new(params))
        }
    }

    #[tokio::test]
    async fn echo_returns_params_as_result() {
        let action = Echo;
        let ctx = ActionContext {
            agent_id: "a1".to_string(),
            state: serde_json::Map::new(),
        };
        let outcome = action.execute(json!({"x": 1}), ctx).await.unwrap();
        assert_eq!(outcome.result, json!({"x": 1}));
        assert!(outcome.directives.is_empty());
    }
}
