//! Time-ordered unique identifiers.
//!
//! An [`Id`] packs a millisecond Unix timestamp and a per-millisecond
//! sequence number into a single 128-bit value (backed by [`uuid::Uuid`] so
//! it serializes and displays like any other opaque id in the ecosystem), so
//! ids generated in the same process are totally ordered by
//! `(timestamp, sequence)` even when many are minted within the same
//! millisecond. [`IdGenerator`] is the only source of truth for "now" as far
//! as ordering goes: if the wall clock appears to move backward, the
//! generator freezes its timestamp and keeps incrementing the sequence
//! rather than emitting a smaller id.

use std::cmp::Ordering;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 128-bit time-ordered identifier: the high 64 bits are a millisecond
/// Unix timestamp, the low 64 bits are a per-millisecond sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(Uuid);

impl Id {
    fn from_parts(timestamp_ms: u64, seq: u64) -> Self {
        Id(Uuid::from_u64_pair(timestamp_ms, seq))
    }

    /// The nil id, useful as a placeholder (e.g. the router's canonical
    /// probe signal); never produced by [`IdGenerator`].
    pub fn nil() -> Self {
        Id(Uuid::nil())
    }

    fn parts(&self) -> (u64, u64) {
        self.0.as_u64_pair()
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.parts().0
    }

    pub fn sequence(&self) -> u64 {
        self.parts().1
    }

    /// Total order over `(timestamp, sequence)`, matching the ordering the
    /// bus relies on for its append-only log.
    pub fn compare(&self, other: &Id) -> Ordering {
        self.parts().cmp(&other.parts())
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct GeneratorState {
    last_ts: u64,
    seq: u64,
}

/// Monotonic generator over `(ms_timestamp, seq)`.
///
/// A single instance is meant to be shared (it is `Send + Sync`); every
/// agent server and bus process draws ids from the same generator so that
/// cross-process comparisons stay meaningful.
pub struct IdGenerator {
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GeneratorState { last_ts: 0, seq: 0 }),
        }
    }

    fn now_ms() -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    /// Generate the next id, returning it along with its timestamp.
    pub fn generate(&self) -> (Id, u64) {
        let mut state = self.state.lock().expect("id generator mutex poisoned");
        let now = Self::now_ms();
        if now > state.last_ts {
            state.last_ts = now;
            state.seq = 0;
        } else {
            // Clock did not advance (or went backward): freeze the
            // timestamp and keep incrementing the sequence so ids never
            // regress.
            state.seq += 1;
        }
        let id = Id::from_parts(state.last_ts, state.seq);
        (id, state.last_ts)
    }

    /// Reserve `n` contiguous sequence numbers under one timestamp
    /// atomically, so a batch publish preserves order even within one
    /// millisecond.
    pub fn generate_batch(&self, n: usize) -> Vec<(Id, u64)> {
        if n == 0 {
            return Vec::new();
        }
        let mut state = self.state.lock().expect("id generator mutex poisoned");
        let now = Self::now_ms();
        if now > state.last_ts {
            state.last_ts = now;
            state.seq = 0;
        } else {
            state.seq += 1;
        }
        let ts = state.last_ts;
        let start = state.seq;
        state.seq += (n - 1) as u64;
        (0..n as u64)
            .map(|offset| (Id::from_parts(ts, start + offset), ts))
            .collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_are_strictly_increasing() {
        let gen = IdGenerator::new();
        let batch = gen.generate_batch(50);
        for window in batch.windows(2) {
            assert_eq!(window[0].0.compare(&window[1].0), Ordering::Less);
        }
    }

    #[test]
    fn single_ids_increase_across_calls() {
        let gen = IdGenerator::new();
        let (a, _) = gen.generate();
        let (b, _) = gen.generate();
        assert_ne!(a, b);
        assert_eq!(a.compare(&b), Ordering::Less);
    }

    #[test]
    fn sequence_resets_are_monotonic_even_under_contention() {
        let gen = IdGenerator::new();
        let mut prev: Option<Id> = None;
        for _ in 0..500 {
            let (id, _) = gen.generate();
            if let Some(p) = prev {
                assert_eq!(p.compare(&id), Ordering::Less);
            }
            prev = Some(id);
        }
    }

    #[test]
    fn zero_batch_is_empty() {
        let gen = IdGenerator::new();
        assert!(gen.generate_batch(0).is_empty());
    }
}
