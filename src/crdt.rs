use crate::error::SyncError;

/// A state-based CRDT: replicas converge by exchanging and merging full state.
///
/// # Properties
///
/// All implementations must satisfy:
/// - **Commutativity:** `a.merge(b) == b.merge(a)`
/// - **Associativity:** `a.merge(b.merge(c)) == a.merge(b).merge(c)`
/// - **Idempotency:** `a.merge(a) == a`
pub trait Crdt {
    /// Merge another replica's state into this one.
    ///
    /// After merging, `self` contains the least upper bound of both states.
    fn merge(&mut self, other: &Self);
}

/// The replicated value a [`SyncCoordinator`](crate::SyncCoordinator) owns.
///
/// The coordinator only relies on this contract: it never looks inside the
/// state, it increments it, reads its total, and moves it across the wire as
/// opaque bytes.
pub trait ReplicaState: Crdt + Send + Sync + Sized + 'static {
    /// Add `amount` to this replica's own contribution.
    fn increment(&mut self, amount: u64) -> Result<(), SyncError>;

    /// The converged value across every replica this state has seen.
    fn total(&self) -> u64;

    /// Encode the full state for a peer.
    fn serialize(&self) -> Result<Vec<u8>, SyncError>;

    /// Decode a peer's state. Must reject, never panic on, arbitrary input.
    fn deserialize(bytes: &[u8]) -> Result<Self, SyncError>;
}
