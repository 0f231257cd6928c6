//! Runner: executes a batch of instructions against agent state.
//!
//! Two variants share one contract: given a non-empty instruction queue,
//! produce an updated state, an accumulated result, and the directives left
//! over to apply (§4.7). `Simple` pops and executes exactly one
//! instruction; `Chain` folds the whole queue, threading state through
//! every step and stopping at the first error.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::action::{Action, ActionContext, ActionOutcome};
use crate::directive::Directive;
use crate::error::{CompensationError, JidoError, Result};
use crate::state_ops::{self, StateOp};

/// One queued unit of work: the action to run, its params, and per-call
/// execution options.
#[derive(Clone)]
pub struct Instruction {
    pub action: Arc<dyn Action>,
    pub params: Value,
    pub timeout_ms: Option<u64>,
    pub apply_state: bool,
}

impl Instruction {
    pub fn new(action: Arc<dyn Action>, params: Value) -> Self {
        Self {
            action,
            params,
            timeout_ms: None,
            apply_state: true,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_apply_state(mut self, apply_state: bool) -> Self {
        self.apply_state = apply_state;
        self
    }
}

/// Retry/backoff policy applied by the runner around one instruction's
/// execution, independent of any policy the action declares for itself.
#[derive(Debug, Clone)]
pub struct RunnerPolicy {
    pub max_retries: usize,
    pub backoff_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl RunnerPolicy {
    pub fn new(max_retries: usize, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let base = self.backoff_ms as f64 * self.backoff_factor.powi(attempt as i32);
        let millis = if self.jitter {
            let mut rng = rand::thread_rng();
            base * rng.gen_range(0.5..=1.5)
        } else {
            base
        };
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

impl Default for RunnerPolicy {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// The outcome of running one or more instructions: final result value,
/// directives still pending application, and the number of attempts the
/// last instruction took (useful for tests asserting retry counts).
pub struct RunOutcome {
    pub state: serde_json::Map<String, Value>,
    pub result: Value,
    pub directives: Vec<Directive>,
    pub attempts: usize,
}

async fn execute_with_retry(
    instruction: &Instruction,
    agent_id: &str,
    state: serde_json::Map<String, Value>,
    policy: &RunnerPolicy,
) -> (Result<ActionOutcome>, usize) {
    let mut attempts = 0usize;
    loop {
        let ctx = ActionContext {
            agent_id: agent_id.to_string(),
            state: state.clone(),
        };
        let outcome = run_one_attempt(instruction, ctx).await;
        attempts += 1;
        match outcome {
            Ok(outcome) => return (Ok(outcome), attempts),
            Err(e) => {
                let retries_used = attempts - 1;
                if retries_used >= policy.max_retries {
                    return (Err(e), attempts);
                }
                let delay = policy.delay_for(retries_used);
                warn!(agent_id, attempts, ?delay, error = %e, "instruction failed, retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

async fn run_one_attempt(instruction: &Instruction, ctx: ActionContext) -> Result<ActionOutcome> {
    match instruction.timeout_ms {
        None | Some(0) => instruction.action.execute(instruction.params.clone(), ctx).await,
        Some(ms) => {
            match tokio::time::timeout(
                Duration::from_millis(ms),
                instruction.action.execute(instruction.params.clone(), ctx),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(JidoError::Timeout(Duration::from_millis(ms))),
            }
        }
    }
}

/// Run one instruction through its runner policy, falling back to
/// compensation if the action declares one and retries are exhausted.
#[instrument(skip(instruction, agent_id, state, policy), fields(agent_id = %agent_id))]
async fn execute_instruction(
    instruction: &Instruction,
    agent_id: &str,
    state: serde_json::Map<String, Value>,
    policy: &RunnerPolicy,
) -> (Result<ActionOutcome>, usize) {
    let (outcome, attempts) = execute_with_retry(instruction, agent_id, state.clone(), policy).await;
    match outcome {
        Ok(outcome) => (Ok(outcome), attempts),
        Err(original_error) => {
            let ctx = ActionContext {
                agent_id: agent_id.to_string(),
                state,
            };
            match instruction
                .action
                .compensate(instruction.params.clone(), ctx)
                .await
            {
                None => (Err(original_error), attempts),
                Some(Ok(())) => (
                    Err(JidoError::Compensation(CompensationError {
                        compensated: true,
                        original_error: original_error.to_string(),
                        compensation_error: None,
                    })),
                    attempts,
                ),
                Some(Err(compensation_error)) => (
                    Err(JidoError::Compensation(CompensationError {
                        compensated: false,
                        original_error: original_error.to_string(),
                        compensation_error: Some(compensation_error.to_string()),
                    })),
                    attempts,
                ),
            }
        }
    }
}

fn split_directives(directives: Vec<Directive>) -> (Vec<StateOp>, Vec<Directive>) {
    let mut ops = Vec::new();
    let mut rest = Vec::new();
    for directive in directives {
        match directive.as_state_op() {
            Some(op) => ops.push(op),
            None => rest.push(directive),
        }
    }
    (ops, rest)
}

/// Pop and execute exactly one instruction. State ops from its directives
/// are applied immediately unless the instruction opts out
/// (`apply_state: false`); every other directive is returned for the
/// caller (agent server) to apply.
pub async fn run_simple(
    queue: &mut VecDeque<Instruction>,
    agent_id: &str,
    state: serde_json::Map<String, Value>,
    policy: &RunnerPolicy,
) -> Result<RunOutcome> {
    let instruction = queue
        .pop_front()
        .ok_or_else(|| JidoError::execution("runner invoked with an empty instruction queue"))?;
    let (outcome, attempts) = execute_instruction(&instruction, agent_id, state.clone(), policy).await;
    let outcome = outcome?;
    let (ops, rest) = split_directives(outcome.directives);
    let next_state = if instruction.apply_state {
        state_ops::apply_all(&state, &ops)?
    } else {
        state
    };
    Ok(RunOutcome {
        state: next_state,
        result: outcome.result,
        directives: rest,
        attempts,
    })
}

/// Fold the entire queue in order, threading state through each step.
/// `apply_directives` controls whether non-state directives are applied as
/// they're produced (by being handed back already-merged) or purely
/// accumulated for the caller; state ops are always threaded so each step
/// sees the previous step's state. On the first error, stop and return the
/// pre-failure state.
pub async fn run_chain(
    queue: &mut VecDeque<Instruction>,
    agent_id: &str,
    mut state: serde_json::Map<String, Value>,
    policy: &RunnerPolicy,
    apply_directives: bool,
) -> Result<RunOutcome> {
    let mut last_result = Value::Null;
    let mut accumulated_directives = Vec::new();
    let mut attempts = 0usize;

    while let Some(instruction) = queue.pop_front() {
        let (outcome, this_attempts) =
            execute_instruction(&instruction, agent_id, state.clone(), policy).await;
        attempts = this_attempts;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(agent_id, "chain runner aborted, preserving pre-failure state");
                return Err(e);
            }
        };
        let (ops, rest) = split_directives(outcome.directives);
        if instruction.apply_state {
            state = state_ops::apply_all(&state, &ops)?;
        }
        last_result = outcome.result;
        accumulated_directives.extend(rest);
    }
    // `apply_directives` only governs whether the agent server applies
    // non-state directives as each step completes or waits for the whole
    // chain to finish; the pure runner always returns them in step order
    // either way, it never applies them itself.
    let _ = apply_directives;

    Ok(RunOutcome {
        state,
        result: last_result,
        directives: accumulated_directives,
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JidoError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFails {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Action for AlwaysFails {
        fn name(&self) -> &str {
            "test.always_fails"
        }
        async fn execute(&self, _params: Value, _ctx: ActionContext) -> Result<ActionOutcome> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(JidoError::execution("boom"))
        }
    }

    struct SetsState;

    #[async_trait]
    impl Action for SetsState {
        fn name(&self) -> &str {
            "test.sets_state"
        }
        async fn execute(&self, params: Value, _ctx: ActionContext) -> Result<ActionOutcome> {
            let attrs = params.as_object().cloned().unwrap_or_default();
            Ok(ActionOutcome::new(json!("ok")).with_directive(Directive::SetState { attrs }))
        }
    }

    #[tokio::test]
    async fn retry_then_fail_counts_every_attempt() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let action = Arc::new(AlwaysFails {
            attempts: attempts.clone(),
        });
        let mut queue = VecDeque::new();
        queue.push_back(Instruction::new(action, json!({})));
        let policy = RunnerPolicy::new(2, 0);
        let result = run_simple(&mut queue, "a1", serde_json::Map::new(), &policy).await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn simple_applies_state_ops_by_default() {
        let action = Arc::new(SetsState);
        let mut queue = VecDeque::new();
        queue.push_back(Instruction::new(action, json!({"greeting": "hi"})));
        let policy = RunnerPolicy::default();
        let outcome = run_simple(&mut queue, "a1", serde_json::Map::new(), &policy)
            .await
            .unwrap();
        assert_eq!(outcome.state.get("greeting"), Some(&json!("hi")));
        assert!(outcome.directives.is_empty());
    }

    #[tokio::test]
    async fn simple_skips_state_when_apply_state_false() {
        let action = Arc::new(SetsState);
        let mut queue = VecDeque::new();
        queue.push_back(Instruction::new(action, json!({"greeting": "hi"})).with_apply_state(false));
        let policy = RunnerPolicy::default();
        let outcome = run_simple(&mut queue, "a1", serde_json::Map::new(), &policy)
            .await
            .unwrap();
        assert!(outcome.state.is_empty());
    }

    #[tokio::test]
    async fn chain_threads_state_across_steps() {
        let mut queue = VecDeque::new();
        queue.push_back(Instruction::new(Arc::new(SetsState), json!({"a": 1})));
        queue.push_back(Instruction::new(Arc::new(SetsState), json!({"b": 2})));
        let policy = RunnerPolicy::default();
        let outcome = run_chain(&mut queue, "a1", serde_json::Map::new(), &policy, true)
            .await
            .unwrap();
        assert_eq!(outcome.state.get("a"), Some(&json!(1)));
        assert_eq!(outcome.state.get("b"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn chain_stops_at_first_error_preserving_prior_state() {
        let mut queue = VecDeque::new();
        queue.push_back(Instruction::new(Arc::new(SetsState), json!({"a": 1})));
        queue.push_back(Instruction::new(
            Arc::new(AlwaysFails {
                attempts: Arc::new(AtomicUsize::new(0)),
            }),
            json!({}),
        ));
        let policy = RunnerPolicy::default();
        let result = run_chain(&mut queue, "a1", serde_json::Map::new(), &policy, true).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn timeout_zero_disables_timeout() {
        let action = Arc::new(SetsState);
        let mut queue = VecDeque::new();
        queue.push_back(Instruction::new(action, json!({"x": 1})).with_timeout_ms(0));
        let policy = RunnerPolicy::default();
        assert!(run_simple(&mut queue, "a1", serde_json::Map::new(), &policy)
            .await
            .is_ok());
    }
}
