//! # gossip-counter-membership
//!
//! The membership service a [`gossip_counter`] node runs on: it keeps the
//! list of peers, drains the transmit-limited broadcast queue over UDP (or
//! TCP for broadcasts too large for one datagram), and performs full-state
//! push/pull exchanges over TCP on join and on a timer.
//! Application callbacks go through [`gossip_counter::Delegate`].
//!
//! There is deliberately no failure detector: a peer is dropped only when a
//! push/pull exchange with it fails.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gossip_counter::prelude::*;
//! use gossip_counter_membership::{Memberlist, TransportConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let id = NodeIdentity::generate();
//! let coordinator = Arc::new(SyncCoordinator::for_node(&id));
//! let delegate = Arc::new(MergeDelegate::new(coordinator.clone()));
//!
//! let memberlist = Memberlist::create(TransportConfig::new(id.as_str()), delegate).await?;
//! DeltaBroadcaster::new(memberlist.broadcasts()).attach(&coordinator);
//! memberlist.join(&["10.0.0.2:7946".to_string()]).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod memberlist;
mod members;
mod queue;
mod wire;

use thiserror::Error;

pub use config::TransportConfig;
pub use memberlist::Memberlist;
pub use members::MemberTable;
pub use queue::{retransmit_limit, TransmitLimitedQueue};

/// Errors from the membership transport.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// Socket or stream failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A membership frame could not be encoded or decoded.
    #[error("wire format error: {0}")]
    Wire(#[from] postcard::Error),

    /// A push/pull frame exceeded the configured maximum.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced frame length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A TCP exchange with a peer did not finish in time.
    #[error("exchange with {0} timed out")]
    Timeout(std::net::SocketAddr),

    /// A seed address did not resolve.
    #[error("could not resolve seed '{0}'")]
    Resolve(String),

    /// No seed could be contacted.
    #[error("failed to join any of {attempted} seed(s)")]
    JoinFailed {
        /// Number of seeds tried.
        attempted: usize,
    },
}
