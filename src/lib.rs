//! # gossip-counter
//!
//! A grow-only counter replicated across a gossip cluster with no
//! coordinator. Every node converges to the same total by two independent
//! paths:
//!
//! - **Delta broadcast.** A local increment schedules a merge message on the
//!   membership service's retransmit-limited broadcast queue.
//! - **Push/pull anti-entropy.** On join (and, depending on the
//!   [`MergePolicy`], on every refresh) peers swap full state.
//!
//! Both paths end in [`Crdt::merge`], which is commutative, associative and
//! idempotent, so delivery order and duplication do not matter.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use gossip_counter::prelude::*;
//!
//! let a = Arc::new(SyncCoordinator::new(GCounter::new("a")));
//! let b = Arc::new(SyncCoordinator::new(GCounter::new("b")));
//! let to_a = MergeDelegate::new(a.clone());
//! let to_b = MergeDelegate::new(b.clone());
//!
//! a.increment(5).unwrap();
//! b.increment(3).unwrap();
//!
//! // a joins b: both sides merge the join exchange
//! to_b.on_state_response(&to_a.on_state_request(true), true);
//! to_a.on_state_response(&to_b.on_state_request(true), true);
//!
//! assert_eq!(a.read(), 8);
//! assert_eq!(b.read(), 8);
//! ```
//!
//! ## Layout
//!
//! - [`GCounter`]: the replicated value ([`ReplicaState`]).
//! - [`codec`]: framing of sync messages on the gossip channel.
//! - [`DeltaBroadcaster`]: outbound merge broadcasts and the dispatcher task.
//! - [`MergeDelegate`]: inbound gossip and push/pull handling.
//! - [`SyncCoordinator`]: the single owner of the state.

#![warn(missing_docs)]

mod broadcast;
mod coordinator;
mod crdt;
mod delegate;
mod error;
mod gcounter;
mod identity;

pub mod codec;
pub mod membership;
pub mod prelude;

pub use broadcast::{
    Broadcast, BroadcastQueue, CounterBroadcast, DeltaBroadcaster, DEFAULT_DISPATCH_CAPACITY,
};
pub use coordinator::SyncCoordinator;
pub use crdt::{Crdt, ReplicaState};
pub use delegate::{Delegate, MergeDelegate, MergePolicy};
pub use error::{Result, SyncError};
pub use gcounter::GCounter;
pub use identity::NodeIdentity;
