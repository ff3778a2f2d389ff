use thiserror::Error;

use crate::codec::CodecError;

/// Errors surfaced by the synchronization core.
///
/// Only request-path failures (bad increments, a state that cannot be
/// encoded) ever reach a caller. Receive-path variants exist so they can be
/// logged before the offending peer data is dropped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The increment amount was negative. Grow-only counters cannot go down.
    #[error("invalid increment amount {0}: only non-negative amounts are supported")]
    InvalidArgument(i64),

    /// The local replica's contribution would exceed `u64::MAX`.
    #[error("counter overflow: adding {amount} to {current} exceeds u64::MAX")]
    Overflow {
        /// Current value of the local entry.
        current: u64,
        /// Amount that was rejected.
        amount: u64,
    },

    /// Local state could not be encoded.
    #[error("failed to serialize replica state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Peer state could not be decoded.
    #[error("failed to deserialize replica state: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// A sync message could not be framed or unframed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Convenience alias used across the crate.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
