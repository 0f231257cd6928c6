//! Strategy: wraps the runner with lifecycle state around a batch of
//! instructions (§4.8).
//!
//! A strategy doesn't execute actions itself — it tracks *where a batch
//! is* (`begin`/`end`/`snapshot`) around calls into [`crate::runner`]. The
//! agent server owns exactly one strategy instance per agent and consults
//! it before and after each batch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JidoError, Result};

/// A strategy's point-in-time status, returned by `snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrategyStatus {
    pub status: String,
    pub done: bool,
    pub details: Option<String>,
}

pub trait Strategy: Send + Sync {
    fn begin(&mut self, instruction_count: usize);
    fn end(&mut self, result: &Value, failed: bool);
    fn snapshot(&self) -> StrategyStatus;
}

/// Finite state machine strategy: `initial -> processing -> {initial |
/// done | error}` per batch, constrained by a declared transition table.
pub struct FsmStrategy {
    initial_state: String,
    current_state: String,
    transitions: HashMap<String, Vec<String>>,
    auto_transition: bool,
    processed_count: usize,
    last_result: Option<Value>,
}

impl FsmStrategy {
    pub fn new(initial_state: impl Into<String>, transitions: HashMap<String, Vec<String>>) -> Self {
        let initial_state = initial_state.into();
        Self {
            current_state: initial_state.clone(),
            initial_state,
            transitions,
            auto_transition: true,
            processed_count: 0,
            last_result: None,
        }
    }

    pub fn with_auto_transition(mut self, auto_transition: bool) -> Self {
        self.auto_transition = auto_transition;
        self
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count
    }

    pub fn last_result(&self) -> Option<&Value> {
        self.last_result.as_ref()
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    fn transition_to(&mut self, target: &str) -> Result<()> {
        let allowed = self
            .transitions
            .get(&self.current_state)
            .map(|targets| targets.iter().any(|t| t == target))
            .unwrap_or(false);
        if !allowed {
            return Err(JidoError::validation(format!(
                "FSM strategy cannot transition from '{}' to '{target}'",
                self.current_state
            )));
        }
        self.current_state = target.to_string();
        Ok(())
    }
}

impl Strategy for FsmStrategy {
    fn begin(&mut self, _instruction_count: usize) {
        let _ = self.transition_to("processing");
    }

    fn end(&mut self, result: &Value, failed: bool) {
        self.processed_count += 1;
        self.last_result = Some(result.clone());
        let target = if failed {
            "error"
        } else if self.auto_transition {
            self.initial_state.as_str()
        } else {
            "done"
        };
        let _ = self.transition_to(target);
    }

    fn snapshot(&self) -> StrategyStatus {
        StrategyStatus {
            status: self.current_state.clone(),
            done: self.current_state == "done",
            details: self.last_result.as_ref().map(|v| v.to_string()),
        }
    }
}

/// Default transition table used when a caller doesn't supply one:
/// `initial -> processing -> {initial, done, error}`, `error -> initial`.
pub fn default_fsm_transitions(initial: &str) -> HashMap<String, Vec<String>> {
    let mut table = HashMap::new();
    table.insert(initial.to_string(), vec!["processing".to_string()]);
    table.insert(
        "processing".to_string(),
        vec![initial.to_string(), "done".to_string(), "error".to_string()],
    );
    table.insert("error".to_string(), vec![initial.to_string()]);
    table.insert("done".to_string(), vec![initial.to_string()]);
    table
}

/// Thread-aware strategy: a thin wrapper that, in addition to standard FSM
/// bookkeeping, records `instruction_start`/`instruction_end` markers —
/// consumed by the Thread plugin (`jido-plugins`) when present. Kept
/// simple here: bookkeeping is just a counter pair, since the actual
/// thread-entry persistence lives in the plugin's own state.
pub struct ThreadAwareStrategy {
    inner: FsmStrategy,
    pub instruction_starts: usize,
    pub instruction_ends: usize,
}

impl ThreadAwareStrategy {
    pub fn new(initial_state: impl Into<String>) -> Self {
        let initial_state = initial_state.into();
        let transitions = default_fsm_transitions(&initial_state);
        Self {
            inner: FsmStrategy::new(initial_state, transitions),
            instruction_starts: 0,
            instruction_ends: 0,
        }
    }
}

impl Strategy for ThreadAwareStrategy {
    fn begin(&mut self, instruction_count: usize) {
        self.instruction_starts += instruction_count;
        self.inner.begin(instruction_count);
    }

    fn end(&mut self, result: &Value, failed: bool) {
        self.instruction_ends += 1;
        self.inner.end(result, failed);
    }

    fn snapshot(&self) -> StrategyStatus {
        self.inner.snapshot()
    }
}
