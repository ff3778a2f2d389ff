//! Convenient re-exports for common usage.
//!
//! ```
//! use gossip_counter::prelude::*;
//! ```

pub use crate::Crdt;
pub use crate::Delegate;
pub use crate::DeltaBroadcaster;
pub use crate::GCounter;
pub use crate::MergeDelegate;
pub use crate::MergePolicy;
pub use crate::NodeIdentity;
pub use crate::ReplicaState;
pub use crate::SyncCoordinator;
