//! The view of the cluster the core needs from a membership service.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// A node known to the membership service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The node's [`NodeIdentity`](crate::NodeIdentity).
    pub name: String,
    /// Gossip address (UDP and TCP share the port).
    pub addr: SocketAddr,
    /// Opaque metadata supplied by the node's delegate.
    #[serde(default)]
    pub meta: Vec<u8>,
}

/// Read access to cluster membership.
pub trait Membership: Send + Sync {
    /// This node.
    fn local_member(&self) -> Member;

    /// Every live member, including this node.
    fn members(&self) -> Vec<Member>;

    /// Number of live members, including this node.
    fn num_members(&self) -> usize {
        self.members().len()
    }
}
