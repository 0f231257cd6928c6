//! Signals: the immutable, typed records routed through Jido.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JidoError, Result};
use crate::id::Id;

fn type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9*_\-]+(\.[A-Za-z0-9*_\-]+)*$").unwrap())
}

/// Validate a dot-segmented signal or route path against the grammar in the
/// specification: `^[A-Za-z0-9*_\-]+(\.[A-Za-z0-9*_\-]+)*$`, no `..`, and no
/// segment containing `**` glued to other characters.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(JidoError::validation("path must not be empty"));
    }
    if path.contains("..") {
        return Err(JidoError::validation(format!(
            "path '{path}' must not contain '..'"
        )));
    }
    if !type_pattern().is_match(path) {
        return Err(JidoError::validation(format!(
            "path '{path}' does not match the required grammar"
        )));
    }
    for segment in path.split('.') {
        if segment.len() > 2 && segment.contains("**") {
            return Err(JidoError::validation(format!(
                "segment '{segment}' in path '{path}' must not embed '**' within other characters"
            )));
        }
    }
    Ok(())
}

/// An immutable, typed record. Equality is by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Id,
    #[serde(rename = "type")]
    pub signal_type: String,
    pub source: String,
    pub time: DateTime<Utc>,
    pub datacontenttype: String,
    pub data: Value,
    #[serde(default)]
    pub extensions: HashMap<String, Value>,
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Signal {}

impl Signal {
    /// Construct a signal, validating the type grammar and non-empty
    /// source. Signal types may not contain `*`/`**` at publication time
    /// even though the grammar permits those characters for route paths.
    pub fn new(
        id: Id,
        signal_type: impl Into<String>,
        source: impl Into<String>,
        data: Value,
    ) -> Result<Self> {
        let signal_type = signal_type.into();
        let source = source.into();
        validate_path(&signal_type)?;
        if signal_type.contains('*') {
            return Err(JidoError::validation(format!(
                "signal type '{signal_type}' must not contain wildcards; wildcards are only valid in route paths"
            )));
        }
        if source.is_empty() {
            return Err(JidoError::validation("signal source must not be empty"));
        }
        Ok(Self {
            id,
            signal_type,
            source,
            time: Utc::now(),
            datacontenttype: "application/json".to_string(),
            data,
            extensions: HashMap::new(),
        })
    }

    pub fn with_datacontenttype(mut self, dct: impl Into<String>) -> Self {
        self.datacontenttype = dct.into();
        self
    }

    pub fn with_extension(mut self, namespace: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(namespace.into(), value);
        self
    }

    /// The `target` extension, when present, carries a routing hint (e.g.
    /// `emit_to_parent`).
    pub fn target_extension(&self) -> Option<&Value> {
        self.extensions.get("target")
    }
}

/// A signal as recorded in a bus log: the signal itself plus provenance
/// (`correlation_id`, `created_at`) assigned by the bus at publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedSignal {
    pub id: Id,
    pub correlation_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub signal_type: String,
    pub signal: Signal,
}

impl RecordedSignal {
    pub fn new(id: Id, signal: Signal, correlation_id: Option<Id>) -> Self {
        Self {
            id,
            correlation_id,
            created_at: Utc::now(),
            signal_type: signal.signal_type.clone(),
            signal,
        }
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdGenerator;

    fn gen_id() -> Id {
        IdGenerator::new().generate().0
    }

    #[test]
    fn rejects_empty_source() {
        let err = Signal::new(gen_id(), "user.created", "", Value::Null);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_double_dot() {
        let err = Signal::new(gen_id(), "user..created", "svc", Value::Null);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_wildcard_in_signal_type() {
        let err = Signal::new(gen_id(), "user.*", "svc", Value::Null);
        assert!(err.is_err());
    }

    #[test]
    fn accepts_well_formed_type() {
        let s = Signal::new(gen_id(), "user.created", "svc", Value::Null).unwrap();
        assert_eq!(s.signal_type, "user.created");
    }

    #[test]
    fn equality_is_by_id() {
        let id = gen_id();
        let a = Signal::new(id, "a.b", "svc", Value::Null).unwrap();
        let mut b = Signal::new(id, "a.b", "svc", Value::Null).unwrap();
        b.data = serde_json::json!({"different": true});
        assert_eq!(a, b);
    }
}
