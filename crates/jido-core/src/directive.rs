//! Directives: the closed set of side-effects an action may request.
//!
//! An action returns zero or more directives alongside its result; the
//! agent server applies them in the order returned (§4.6). Directives are
//! grouped into four effect classes purely for documentation purposes —
//! [`Directive::is_terminal`] is the only classification the runtime itself
//! acts on, since terminal directives end a batch early.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::DispatchConfig;
use crate::error::{JidoError, Result};
use crate::signal::Signal;
use crate::state_ops::StateOp;

/// A module + tag pair identifying a child agent to spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnSpec {
    pub module: String,
    pub tag: String,
    #[serde(default)]
    pub opts: Value,
    #[serde(default)]
    pub meta: Value,
}

#[derive(Debug, Clone)]
pub enum Directive {
    SetState {
        attrs: serde_json::Map<String, Value>,
    },
    ReplaceState {
        state: serde_json::Map<String, Value>,
    },
    DeleteKeys {
        keys: Vec<String>,
    },
    SetPath {
        path: Vec<String>,
        value: Value,
    },
    DeletePath {
        path: Vec<String>,
    },
    Emit {
        signal: Signal,
        dispatch: DispatchConfig,
    },
    /// Shorthand for `Emit` targeted at the issuing agent's parent; a
    /// no-op if the agent has no parent.
    EmitToParent {
        signal: Signal,
    },
    Schedule {
        delay_ms: u64,
        message: Signal,
    },
    Cron {
        cron: String,
        job_id: String,
        message: Signal,
        timezone: Option<String>,
    },
    CronCancel {
        job_id: String,
    },
    SpawnAgent(SpawnSpec),
    StopChild {
        tag: String,
        reason: Option<String>,
    },
    Stop {
        reason: Option<String>,
    },
    /// Legacy: push an action back onto the pending queue.
    Enqueue {
        action: String,
        params: Value,
        context: Option<Value>,
    },
}

impl Directive {
    /// `true` for directives that end the current batch: `Stop` and
    /// `StopChild` are the only ones (stopping a child does not itself
    /// stop the issuing agent, but per §4.6 both are grouped "terminal"
    /// in the sense that nothing after them in a Chain run matters once
    /// the agent begins tearing down).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Directive::Stop { .. })
    }

    pub fn is_state_affecting(&self) -> bool {
        matches!(
            self,
            Directive::SetState { .. }
                | Directive::ReplaceState { .. }
                | Directive::DeleteKeys { .. }
                | Directive::SetPath { .. }
                | Directive::DeletePath { .. }
        )
    }

    /// Convert a state-affecting directive into a [`StateOp`]; `None` for
    /// every other directive kind.
    pub fn as_state_op(&self) -> Option<StateOp> {
        match self {
            Directive::SetState { attrs } => Some(StateOp::SetState {
                attrs: attrs.clone(),
            }),
            Directive::ReplaceState { state } => Some(StateOp::ReplaceState {
                state: state.clone(),
            }),
            Directive::DeleteKeys { keys } => Some(StateOp::DeleteKeys {
                keys: keys.clone(),
            }),
            Directive::SetPath { path, value } => Some(StateOp::SetPath {
                path: path.clone(),
                value: value.clone(),
            }),
            Directive::DeletePath { path } => Some(StateOp::DeletePath {
                path: path.clone(),
            }),
            _ => None,
        }
    }

    /// Validate directive-specific invariants that don't depend on runtime
    /// state (e.g. the child registry). `DeregisterAction`-style self-target
    /// checks live here: a `StopChild` may not name the issuing agent's own
    /// tag sentinel `""`, and a `Cron`/`CronCancel` job id must be non-empty.
    pub fn validate(&self) -> Result<()> {
        match self {
            Directive::SetPath { path, .. } | Directive::DeletePath { path } if path.is_empty() => {
                Err(JidoError::validation("path directives require a non-empty path"))
            }
            Directive::Cron { cron, job_id, .. } => {
                if job_id.is_empty() {
                    return Err(JidoError::validation("Cron requires a non-empty job_id"));
                }
                normalize_cron(cron)
                    .parse::<::cron::Schedule>()
                    .map_err(|e| JidoError::validation(format!("invalid cron expression '{cron}': {e}")))?;
                Ok(())
            }
            Directive::CronCancel { job_id } if job_id.is_empty() => {
                Err(JidoError::validation("CronCancel requires a non-empty job_id"))
            }
            Directive::SpawnAgent(spec) => {
                if spec.tag.is_empty() {
                    return Err(JidoError::validation("SpawnAgent requires a non-empty tag"));
                }
                if spec.module.is_empty() {
                    return Err(JidoError::validation("SpawnAgent requires a non-empty module"));
                }
                Ok(())
            }
            Directive::StopChild { tag, .. } if tag.is_empty() => {
                Err(JidoError::validation("StopChild requires a non-empty tag, it must not target the issuing agent itself"))
            }
            _ => Ok(()),
        }
    }
}

/// Adapt a standard 5-field cron expression (`minute hour day month
/// weekday`, the form used throughout the specification's examples) to the
/// 6-field form the `cron` crate requires by prepending a `0` seconds
/// field. Expressions that already carry a seconds field pass through
/// unchanged.
pub fn normalize_cron(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Validate a whole directive list, in order; the first invalid entry
/// aborts with its error.
pub fn validate_all(directives: &[Directive]) -> Result<()> {
    for directive in directives {
        directive.validate()?;
    }
    Ok(())
}
