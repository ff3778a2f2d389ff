use std::sync::OnceLock;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::crdt::ReplicaState;
use crate::error::{Result, SyncError};
use crate::gcounter::GCounter;
use crate::identity::NodeIdentity;

/// Sole owner of this node's replica state.
///
/// Every read, increment and merge goes through here. Increments and merges
/// take the write lock, reads and snapshots the read lock, and nothing that
/// touches the network runs while either is held: broadcasts are handed to
/// the dispatcher task (see [`DeltaBroadcaster::attach`]) after the lock is
/// released.
///
/// [`DeltaBroadcaster::attach`]: crate::DeltaBroadcaster::attach
///
/// # Example
///
/// ```
/// use gossip_counter::prelude::*;
///
/// let a = SyncCoordinator::new(GCounter::new("a"));
/// let b = SyncCoordinator::new(GCounter::new("b"));
///
/// a.increment(5).unwrap();
/// b.increment(3).unwrap();
///
/// b.absorb(&a.snapshot().unwrap());
/// a.absorb(&b.snapshot().unwrap());
/// assert_eq!(a.read(), 8);
/// assert_eq!(b.read(), 8);
/// ```
pub struct SyncCoordinator<S = GCounter> {
    state: RwLock<S>,
    dispatch: OnceLock<mpsc::Sender<()>>,
}

impl SyncCoordinator<GCounter> {
    /// A zeroed counter owned by `identity`.
    pub fn for_node(identity: &NodeIdentity) -> Self {
        Self::new(GCounter::new(identity.as_str()))
    }
}

impl<S: ReplicaState> SyncCoordinator<S> {
    /// Take ownership of `state`. No broadcasts are scheduled until a
    /// dispatcher is attached.
    pub fn new(state: S) -> Self {
        Self {
            state: RwLock::new(state),
            dispatch: OnceLock::new(),
        }
    }

    /// Add `amount` to the local replica and return the new total.
    ///
    /// Negative amounts are rejected with [`SyncError::InvalidArgument`] and
    /// leave the state untouched. A non-zero increment schedules a delta
    /// broadcast without waiting for it.
    pub fn increment(&self, amount: i64) -> Result<u64> {
        let amount = u64::try_from(amount).map_err(|_| SyncError::InvalidArgument(amount))?;

        let total = {
            let mut state = self.state.write();
            state.increment(amount)?;
            state.total()
        };

        if amount > 0 {
            self.schedule_broadcast();
        }
        Ok(total)
    }

    /// Current total.
    #[must_use]
    pub fn read(&self) -> u64 {
        self.state.read().total()
    }

    /// Serialized copy of the full local state.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        self.state.read().serialize()
    }

    /// Merge a peer's serialized state.
    ///
    /// Empty or undecodable input is dropped: peers are not trusted to send
    /// well-formed data, and a bad payload must never disturb local state.
    pub fn absorb(&self, remote: &[u8]) {
        if remote.is_empty() {
            return;
        }
        if let Err(e) = self.try_absorb(remote) {
            debug!(error = %e, bytes = remote.len(), "dropping peer state");
        }
    }

    fn try_absorb(&self, remote: &[u8]) -> Result<()> {
        // Decode before locking so a large payload never stalls writers.
        let other = S::deserialize(remote)?;
        let mut state = self.state.write();
        let before = state.total();
        state.merge(&other);
        trace!(before, after = state.total(), "merged peer state");
        Ok(())
    }

    /// Install the dispatcher wake-up channel. Returns `false` if one is
    /// already installed.
    pub(crate) fn set_dispatch(&self, tx: mpsc::Sender<()>) -> bool {
        self.dispatch.set(tx).is_ok()
    }

    fn schedule_broadcast(&self) {
        let Some(tx) = self.dispatch.get() else {
            return;
        };
        match tx.try_send(()) {
            // Full means a wake-up is already pending; its snapshot will
            // include this increment.
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                debug!("delta dispatcher has stopped; broadcast skipped");
            }
        }
    }
}
