use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{Action, Frame};
use crate::coordinator::SyncCoordinator;
use crate::crdt::ReplicaState;
use crate::gcounter::GCounter;

/// Callbacks a membership service invokes on behalf of the application.
pub trait Delegate: Send + Sync {
    /// Metadata advertised with this node, at most `limit` bytes.
    fn node_meta(&self, _limit: usize) -> Vec<u8> {
        Vec::new()
    }

    /// A gossip message arrived from a peer.
    fn on_message(&self, raw: &[u8]);

    /// A peer is starting a push/pull exchange and wants our full state.
    fn on_state_request(&self, is_join: bool) -> Vec<u8>;

    /// A peer's full state arrived as part of a push/pull exchange.
    fn on_state_response(&self, remote: &[u8], is_join: bool);
}

/// When a full-state push/pull response is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Merge only the exchange performed while joining. Periodic refreshes
    /// are skipped once the node is part of the cluster.
    #[default]
    JoinOnly,
    /// Merge every exchange.
    Always,
}

impl MergePolicy {
    fn accepts(self, is_join: bool) -> bool {
        match self {
            Self::JoinOnly => is_join,
            Self::Always => true,
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::JoinOnly => "join-only",
            Self::Always => "always",
        })
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join-only" | "join" => Ok(Self::JoinOnly),
            "always" => Ok(Self::Always),
            other => Err(format!(
                "unknown merge policy '{other}', expected 'join-only' or 'always'"
            )),
        }
    }
}

/// Receive side of the protocol: routes every peer-initiated event into the
/// coordinator.
pub struct MergeDelegate<S = GCounter> {
    coordinator: Arc<SyncCoordinator<S>>,
    policy: MergePolicy,
}

impl<S: ReplicaState> MergeDelegate<S> {
    /// A delegate for `coordinator` using the default [`MergePolicy`].
    pub fn new(coordinator: Arc<SyncCoordinator<S>>) -> Self {
        Self::with_policy(coordinator, MergePolicy::default())
    }

    /// A delegate for `coordinator` with an explicit merge policy.
    pub fn with_policy(coordinator: Arc<SyncCoordinator<S>>, policy: MergePolicy) -> Self {
        Self {
            coordinator,
            policy,
        }
    }

    /// The policy applied to push/pull responses.
    #[must_use]
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }
}

impl<S: ReplicaState> Delegate for MergeDelegate<S> {
    fn on_message(&self, raw: &[u8]) {
        if raw.is_empty() {
            return;
        }
        match Frame::decode(raw) {
            Ok(Frame::Data(msg)) => match msg.action {
                Action::Merge => self.coordinator.absorb(&msg.payload),
                Action::Other(name) => warn!(action = %name, "ignoring unsupported sync action"),
            },
            Ok(Frame::Unknown { kind, .. }) => {
                debug!(kind, "ignoring non-counter gossip message");
            }
            Err(e) => debug!(error = %e, "dropping malformed gossip message"),
        }
    }

    fn on_state_request(&self, is_join: bool) -> Vec<u8> {
        match self.coordinator.snapshot() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, is_join, "cannot offer local state to peer");
                Vec::new()
            }
        }
    }

    fn on_state_response(&self, remote: &[u8], is_join: bool) {
        if remote.is_empty() {
            return;
        }
        if !self.policy.accepts(is_join) {
            debug!(policy = %self.policy, "skipping periodic state refresh");
            return;
        }
        self.coordinator.absorb(remote);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SyncMessage;

    fn pair() -> (Arc<SyncCoordinator>, Arc<SyncCoordinator>) {
        (
            Arc::new(SyncCoordinator::new(GCounter::new("a"))),
            Arc::new(SyncCoordinator::new(GCounter::new("b"))),
        )
    }

    fn merge_frame(state: Vec<u8>) -> Vec<u8> {
        Frame::Data(SyncMessage::merge(state)).encode().unwrap()
    }

    #[test]
    fn merge_message_is_absorbed() {
        let (a, b) = pair();
        b.increment(3).unwrap();
        let delegate = MergeDelegate::new(a.clone());

        delegate.on_message(&merge_frame(b.snapshot().unwrap()));
        assert_eq!(a.read(), 3);
    }

    #[test]
    fn unknown_action_and_kind_are_ignored() {
        let (a, b) = pair();
        b.increment(3).unwrap();
        let delegate = MergeDelegate::new(a.clone());

        let reset = Frame::Data(SyncMessage {
            action: Action::Other("reset".into()),
            payload: b.snapshot().unwrap(),
        });
        delegate.on_message(&reset.encode().unwrap());
        delegate.on_message(b"xsomething else");
        delegate.on_message(b"");
        delegate.on_message(b"d{{{{");
        assert_eq!(a.read(), 0);
    }

    #[test]
    fn state_request_returns_snapshot() {
        let (a, _) = pair();
        a.increment(7).unwrap();
        let delegate = MergeDelegate::new(a.clone());
        assert_eq!(delegate.on_state_request(true), a.snapshot().unwrap());
        assert_eq!(delegate.on_state_request(false), a.snapshot().unwrap());
    }

    #[test]
    fn join_only_policy_skips_refresh() {
        let (a, b) = pair();
        b.increment(3).unwrap();
        let delegate = MergeDelegate::new(a.clone());
        assert_eq!(delegate.policy(), MergePolicy::JoinOnly);

        delegate.on_state_response(&b.snapshot().unwrap(), false);
        assert_eq!(a.read(), 0);

        delegate.on_state_response(&b.snapshot().unwrap(), true);
        assert_eq!(a.read(), 3);
    }

    #[test]
    fn always_policy_merges_refresh() {
        let (a, b) = pair();
        b.increment(3).unwrap();
        let delegate = MergeDelegate::with_policy(a.clone(), MergePolicy::Always);

        delegate.on_state_response(&b.snapshot().unwrap(), false);
        assert_eq!(a.read(), 3);
    }

    #[test]
    fn empty_state_response_is_ignored() {
        let (a, _) = pair();
        let delegate = MergeDelegate::with_policy(a.clone(), MergePolicy::Always);
        delegate.on_state_response(b"", true);
        assert_eq!(a.read(), 0);
    }

    #[test]
    fn merge_policy_parses() {
        assert_eq!("join-only".parse(), Ok(MergePolicy::JoinOnly));
        assert_eq!("always".parse(), Ok(MergePolicy::Always));
        assert!("sometimes".parse::<MergePolicy>().is_err());
        assert_eq!(MergePolicy::Always.to_string(), "always");
    }
}
