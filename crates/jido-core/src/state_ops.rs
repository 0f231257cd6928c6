//! State ops: the small set of mutations a directive can apply to agent
//! state (a `serde_json::Map`).
//!
//! All ops are applied in-order and atomically per signal: [`apply_all`]
//! clones the starting state, applies each op in sequence, and only commits
//! the result if every op succeeds.

use serde_json::{Map, Value};

use crate::error::{JidoError, Result};

/// A single state mutation, as carried by the `SetState`/`ReplaceState`/
/// `DeleteKeys`/`SetPath`/`DeletePath` directive kinds.
#[derive(Debug, Clone)]
pub enum StateOp {
    /// Deep-merge `attrs` into the state map.
    SetState { attrs: Map<String, Value> },
    /// Replace the whole state map.
    ReplaceState { state: Map<String, Value> },
    /// Remove the given top-level keys, if present.
    DeleteKeys { keys: Vec<String> },
    /// Set a value at a dotted path, creating intermediate objects.
    SetPath { path: Vec<String>, value: Value },
    /// Remove a value at a dotted path; a no-op if any segment is missing.
    DeletePath { path: Vec<String> },
}

/// Deep-merge `patch` into `base`: objects merge key-by-key recursively,
/// any other value (including arrays) overwrites outright.
pub fn deep_merge(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, patch_value) in patch {
        match base.get_mut(&key) {
            Some(Value::Object(base_obj)) => match patch_value {
                Value::Object(patch_obj) => deep_merge(base_obj, patch_obj),
                other => {
                    base.insert(key, other);
                }
            },
            _ => {
                base.insert(key, patch_value);
            }
        }
    }
}

fn set_path(state: &mut Map<String, Value>, path: &[String], value: Value) -> Result<()> {
    let (head, rest) = match path.split_first() {
        Some(pair) => pair,
        None => return Err(JidoError::validation("SetPath requires a non-empty path")),
    };
    if rest.is_empty() {
        state.insert(head.clone(), value);
        return Ok(());
    }
    let entry = state
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    let nested = entry.as_object_mut().expect("just ensured object");
    set_path(nested, rest, value)
}

fn delete_path(state: &mut Map<String, Value>, path: &[String]) {
    let (head, rest) = match path.split_first() {
        Some(pair) => pair,
        None => return,
    };
    if rest.is_empty() {
        state.remove(head);
        return;
    }
    if let Some(Value::Object(nested)) = state.get_mut(head) {
        delete_path(nested, rest);
    }
}

/// Apply one op to `state` in place.
pub fn apply_one(state: &mut Map<String, Value>, op: &StateOp) -> Result<()> {
    match op {
        StateOp::SetState { attrs } => {
            deep_merge(state, attrs.clone());
            Ok(())
        }
        StateOp::ReplaceState { state: new_state } => {
            *state = new_state.clone();
            Ok(())
        }
        StateOp::DeleteKeys { keys } => {
            for key in keys {
                state.remove(key);
            }
            Ok(())
        }
        StateOp::SetPath { path, value } => set_path(state, path, value.clone()),
        StateOp::DeletePath { path } => {
            delete_path(state, path);
            Ok(())
        }
    }
}

/// Apply every op in order against a clone of `state`, committing only if
/// all ops succeed; on the first error, the original state is untouched.
pub fn apply_all(state: &Map<String, Value>, ops: &[StateOp]) -> Result<Map<String, Value>> {
    let mut working = state.clone();
    for op in ops {
        apply_one(&mut working, op)?;
    }
    Ok(working)
}
