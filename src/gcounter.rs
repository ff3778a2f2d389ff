use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crdt::{Crdt, ReplicaState};
use crate::error::{Result, SyncError};

/// A grow-only counter (G-Counter) keyed by node identity.
///
/// Each node only ever raises its own entry. The total is the sum of every
/// entry, and merging takes the per-node maximum, which is what makes merge
/// commutative, associative and idempotent: it is a pointwise `max` over a
/// map, and `max` has all three properties.
///
/// # Example
///
/// ```
/// use gossip_counter::prelude::*;
///
/// let mut a = GCounter::new("node-a");
/// a.increment_by(5).unwrap();
///
/// let mut b = GCounter::new("node-b");
/// b.increment_by(3).unwrap();
///
/// a.merge(&b);
/// b.merge(&a);
/// assert_eq!(a.value(), 8);
/// assert_eq!(b.value(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounter {
    actor: String,
    counts: BTreeMap<String, u64>,
}

impl GCounter {
    /// Create an empty counter owned by `actor`.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            counts: BTreeMap::new(),
        }
    }

    /// Raise this node's entry by `n`.
    pub fn increment_by(&mut self, n: u64) -> Result<()> {
        let entry = self.counts.entry(self.actor.clone()).or_insert(0);
        *entry = entry.checked_add(n).ok_or(SyncError::Overflow {
            current: *entry,
            amount: n,
        })?;
        Ok(())
    }

    /// Sum of all entries. Saturates rather than wrapping.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |acc, &c| acc.saturating_add(c))
    }

    /// This node's actor ID.
    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// The entry recorded for `actor`, zero if unseen.
    #[must_use]
    pub fn count_for(&self, actor: &str) -> u64 {
        self.counts.get(actor).copied().unwrap_or(0)
    }

    /// Number of distinct nodes that have contributed.
    #[must_use]
    pub fn replicas(&self) -> usize {
        self.counts.len()
    }
}

impl Crdt for GCounter {
    fn merge(&mut self, other: &Self) {
        for (actor, &count) in &other.counts {
            let entry = self.counts.entry(actor.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }
}

impl ReplicaState for GCounter {
    fn increment(&mut self, amount: u64) -> Result<()> {
        self.increment_by(amount)
    }

    fn total(&self) -> u64 {
        self.value()
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(SyncError::Serialize)
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(SyncError::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_counter_is_zero() {
        let c = GCounter::new("a");
        assert_eq!(c.value(), 0);
        assert_eq!(c.replicas(), 0);
    }

    #[test]
    fn increment_by_accumulates() {
        let mut c = GCounter::new("a");
        c.increment_by(5).unwrap();
        c.increment_by(2).unwrap();
        assert_eq!(c.value(), 7);
        assert_eq!(c.count_for("a"), 7);
        assert_eq!(c.count_for("b"), 0);
    }

    #[test]
    fn increment_overflow_is_rejected() {
        let mut c = GCounter::new("a");
        c.increment_by(u64::MAX).unwrap();
        let err = c.increment_by(1).unwrap_err();
        assert!(matches!(err, SyncError::Overflow { amount: 1, .. }));
        assert_eq!(c.value(), u64::MAX);
    }

    #[test]
    fn value_saturates_across_replicas() {
        let mut a = GCounter::new("a");
        a.increment_by(u64::MAX).unwrap();
        let mut b = GCounter::new("b");
        b.increment_by(10).unwrap();
        a.merge(&b);
        assert_eq!(a.value(), u64::MAX);
    }

    #[test]
    fn merge_takes_max_per_actor() {
        let mut c1 = GCounter::new("a");
        c1.increment_by(2).unwrap();

        let mut c2 = GCounter::new("a");
        c2.increment_by(1).unwrap();

        // a=2 vs a=1, the larger survives
        c1.merge(&c2);
        assert_eq!(c1.value(), 2);
    }

    #[test]
    fn merge_sums_different_actors() {
        let mut c1 = GCounter::new("a");
        c1.increment_by(1).unwrap();

        let mut c2 = GCounter::new("b");
        c2.increment_by(2).unwrap();

        c1.merge(&c2);
        assert_eq!(c1.value(), 3);
        assert_eq!(c1.actor(), "a");
    }

    #[test]
    fn merge_is_idempotent() {
        let mut c1 = GCounter::new("a");
        c1.increment_by(1).unwrap();

        let mut c2 = GCounter::new("b");
        c2.increment_by(1).unwrap();

        c1.merge(&c2);
        let after_first = c1.clone();
        c1.merge(&c2);

        assert_eq!(c1, after_first);
    }

    #[test]
    fn serialize_roundtrip_keeps_entries() {
        let mut c = GCounter::new("node-1");
        c.increment_by(42).unwrap();

        let bytes = ReplicaState::serialize(&c).unwrap();
        let decoded = <GCounter as ReplicaState>::deserialize(&bytes).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn deserialize_rejects_garbage() {
        for junk in [&b""[..], b"{", b"null", b"\xff\xfe", br#"{"actor":1}"#] {
            assert!(matches!(
                <GCounter as ReplicaState>::deserialize(junk),
                Err(SyncError::Deserialize(_))
            ));
        }
    }

    #[test]
    fn json_shape_is_stable() {
        let mut c = GCounter::new("n1");
        c.increment_by(3).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&ReplicaState::serialize(&c).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"actor": "n1", "counts": {"n1": 3}}));
    }
}
