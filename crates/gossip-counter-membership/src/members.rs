use std::collections::BTreeMap;

use gossip_counter::membership::Member;
use parking_lot::RwLock;
use rand::seq::SliceRandom;

/// The set of nodes this node knows about.
///
/// There is no failure detection: peers are added when they are learned
/// through a push/pull exchange and removed only when an exchange with them
/// fails.
pub struct MemberTable {
    local: Member,
    peers: RwLock<BTreeMap<String, Member>>,
}

impl MemberTable {
    /// A table containing only `local`.
    pub fn new(local: Member) -> Self {
        Self {
            local,
            peers: RwLock::new(BTreeMap::new()),
        }
    }

    /// This node.
    #[must_use]
    pub fn local(&self) -> &Member {
        &self.local
    }

    /// This node followed by every known peer.
    #[must_use]
    pub fn members(&self) -> Vec<Member> {
        let peers = self.peers.read();
        let mut all = Vec::with_capacity(peers.len() + 1);
        all.push(self.local.clone());
        all.extend(peers.values().cloned());
        all
    }

    /// Every known peer, excluding this node.
    #[must_use]
    pub fn peers(&self) -> Vec<Member> {
        self.peers.read().values().cloned().collect()
    }

    /// Number of members including this node.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.read().len() + 1
    }

    /// Always false: the local node is a member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Insert or refresh a peer. Returns `true` if it was not known before.
    /// Entries naming this node are ignored.
    pub fn upsert(&self, member: Member) -> bool {
        if member.name == self.local.name {
            return false;
        }
        self.peers
            .write()
            .insert(member.name.clone(), member)
            .is_none()
    }

    /// Forget a peer.
    pub fn remove(&self, name: &str) -> Option<Member> {
        self.peers.write().remove(name)
    }

    /// Up to `k` distinct peers chosen at random.
    #[must_use]
    pub fn random_peers(&self, k: usize) -> Vec<Member> {
        let peers = self.peers();
        peers
            .choose_multiple(&mut rand::thread_rng(), k)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, port: u16) -> Member {
        Member {
            name: name.to_string(),
            addr: ([127, 0, 0, 1], port).into(),
            meta: Vec::new(),
        }
    }

    #[test]
    fn local_is_always_a_member() {
        let table = MemberTable::new(member("me", 1));
        assert_eq!(table.len(), 1);
        assert_eq!(table.members(), vec![member("me", 1)]);
        assert!(table.peers().is_empty());
        assert!(table.random_peers(3).is_empty());
    }

    #[test]
    fn upsert_ignores_self_and_refreshes_peers() {
        let table = MemberTable::new(member("me", 1));
        assert!(!table.upsert(member("me", 9)));
        assert!(table.upsert(member("a", 2)));
        assert!(!table.upsert(member("a", 3)));
        assert_eq!(table.len(), 2);
        assert_eq!(table.peers(), vec![member("a", 3)]);
    }

    #[test]
    fn random_peers_are_distinct_and_bounded() {
        let table = MemberTable::new(member("me", 1));
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            table.upsert(member(name, 10 + i as u16));
        }
        let picked = table.random_peers(3);
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|m| m.name != "me"));
        let mut names: Vec<_> = picked.iter().map(|m| m.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 3);
        assert_eq!(table.random_peers(10).len(), 4);
    }

    #[test]
    fn remove_forgets_peer() {
        let table = MemberTable::new(member("me", 1));
        table.upsert(member("a", 2));
        assert!(table.remove("a").is_some());
        assert!(table.remove("a").is_none());
        assert_eq!(table.len(), 1);
    }
}
