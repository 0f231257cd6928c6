//! Process-wide registry of full snapshot bodies (§4.5, §3).
//!
//! `Bus` keeps only a lightweight [`SnapshotRef`] per snapshot in its own
//! state; the full signal payload lives here, addressed by id, so bus state
//! stays cheap to read while snapshot bodies themselves can grow large.
//! Entries are immutable once stored — a snapshot is replaced only by
//! deleting it and creating a new one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jido_core::error::{JidoError, Result, SnapshotError};
use jido_core::id::Id;
use jido_core::signal::RecordedSignal;

/// Lightweight pointer kept in `Bus` state: enough to list and address a
/// snapshot without holding its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub id: Id,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// The full materialized body of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    pub id: Id,
    pub path: String,
    pub signals: Vec<RecordedSignal>,
    pub created_at: DateTime<Utc>,
}

/// Shared, cloneable handle to the registry; every [`crate::bus::Bus`]
/// created by the same [`crate::bus::BusHub`] stores into the same
/// instance.
#[derive(Clone, Default)]
pub struct SnapshotRegistry {
    inner: Arc<RwLock<HashMap<Id, SnapshotData>>>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize and store `signals` as snapshot `id`, returning the
    /// lightweight ref the caller keeps in bus state.
    pub fn store(&self, id: Id, path: String, signals: Vec<RecordedSignal>) -> SnapshotRef {
        let created_at = Utc::now();
        let data = SnapshotData {
            id,
            path: path.clone(),
            signals,
            created_at,
        };
        self.inner
            .write()
            .expect("snapshot registry lock poisoned")
            .insert(id, data);
        SnapshotRef { id, path, created_at }
    }

    pub fn read(&self, id: Id) -> Result<SnapshotData> {
        self.inner
            .read()
            .expect("snapshot registry lock poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| JidoError::Snapshot(SnapshotError::NotFound(id.to_string())))
    }

    /// Returns whether an entry was actually present.
    pub fn delete(&self, id: Id) -> bool {
        self.inner
            .write()
            .expect("snapshot registry lock poisoned")
            .remove(&id)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jido_core::id::IdGenerator;

    fn id() -> Id {
        IdGenerator::new().generate().0
    }

    #[test]
    fn stored_snapshot_round_trips() {
        let registry = SnapshotRegistry::new();
        let snap_id = id();
        let snap_ref = registry.store(snap_id, "orders.*".to_string(), Vec::new());
        assert_eq!(snap_ref.id, snap_id);
        let data = registry.read(snap_id).unwrap();
        assert_eq!(data.path, "orders.*");
    }

    #[test]
    fn reading_unknown_id_is_not_found() {
        let registry = SnapshotRegistry::new();
        assert!(registry.read(id()).is_err());
    }

    #[test]
    fn deleting_removes_the_entry() {
        let registry = SnapshotRegistry::new();
        let snap_id = id();
        registry.store(snap_id, "orders.*".to_string(), Vec::new());
        assert!(registry.delete(snap_id));
        assert!(registry.read(snap_id).is_err());
        assert!(!registry.delete(snap_id), "second delete finds nothing");
    }
}
