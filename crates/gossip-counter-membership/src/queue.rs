use gossip_counter::{Broadcast, BroadcastQueue};
use parking_lot::Mutex;
use tracing::trace;

/// How many times a broadcast is sent in a cluster of `num_nodes`.
///
/// Grows logarithmically with cluster size so every node is reached with
/// high probability without flooding large clusters.
#[must_use]
pub fn retransmit_limit(retransmit_mult: usize, num_nodes: usize) -> usize {
    let node_scale = ((num_nodes + 1) as f64).log10().ceil() as usize;
    retransmit_mult * node_scale.max(1)
}

struct Queued {
    broadcast: Box<dyn Broadcast>,
    transmits: usize,
    id: u64,
}

#[derive(Default)]
struct Inner {
    items: Vec<Queued>,
    next_id: u64,
}

/// A broadcast queue that retires each message after a bounded number of
/// transmissions.
///
/// Messages that have been sent the fewest times go first, newest first
/// among equals. The queue never holds more than its configured depth: the
/// most-transmitted messages are pruned first.
pub struct TransmitLimitedQueue {
    num_nodes: Box<dyn Fn() -> usize + Send + Sync>,
    retransmit_mult: usize,
    max_depth: usize,
    inner: Mutex<Inner>,
}

impl TransmitLimitedQueue {
    /// A queue sizing its retransmit limit from `num_nodes()`.
    pub fn new(
        num_nodes: impl Fn() -> usize + Send + Sync + 'static,
        retransmit_mult: usize,
        max_depth: usize,
    ) -> Self {
        Self {
            num_nodes: Box::new(num_nodes),
            retransmit_mult,
            max_depth: max_depth.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of broadcasts waiting.
    #[must_use]
    pub fn num_queued(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Take as many broadcasts as fit in `limit` bytes, each costing its
    /// length plus `overhead`. Every returned message counts as one
    /// transmission.
    pub fn get_broadcasts(&self, overhead: usize, limit: usize) -> Vec<Vec<u8>> {
        let mut used = 0;
        self.take(overhead, |cost| {
            if used + cost > limit {
                return false;
            }
            used += cost;
            true
        })
    }

    /// Take every broadcast that could never fit in `limit` bytes on its
    /// own. These need a stream transport; each returned message counts as
    /// one transmission just like [`get_broadcasts`](Self::get_broadcasts).
    pub fn get_oversized(&self, overhead: usize, limit: usize) -> Vec<Vec<u8>> {
        self.take(overhead, |cost| cost > limit)
    }

    fn take(&self, overhead: usize, mut admit: impl FnMut(usize) -> bool) -> Vec<Vec<u8>> {
        let transmit_limit = retransmit_limit(self.retransmit_mult, (self.num_nodes)());

        let mut out = Vec::new();
        let mut retired = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.items.is_empty() {
                return out;
            }
            inner
                .items
                .sort_by(|a, b| a.transmits.cmp(&b.transmits).then(b.id.cmp(&a.id)));

            let mut kept = Vec::with_capacity(inner.items.len());
            for mut queued in inner.items.drain(..) {
                if !admit(queued.broadcast.message().len() + overhead) {
                    kept.push(queued);
                    continue;
                }
                out.push(queued.broadcast.message().to_vec());
                queued.transmits += 1;
                if queued.transmits >= transmit_limit {
                    retired.push(queued.broadcast);
                } else {
                    kept.push(queued);
                }
            }
            inner.items = kept;
        }

        if !retired.is_empty() {
            trace!(count = retired.len(), transmit_limit, "retiring broadcasts");
        }
        for broadcast in retired {
            broadcast.finished();
        }
        out
    }

    /// Drop the most-transmitted broadcasts until at most `max_retain` remain.
    pub fn prune(&self, max_retain: usize) {
        let pruned = {
            let mut inner = self.inner.lock();
            Self::prune_locked(&mut inner, max_retain)
        };
        for broadcast in pruned {
            broadcast.finished();
        }
    }

    /// Drop everything.
    pub fn reset(&self) {
        self.prune(0);
    }

    fn prune_locked(inner: &mut Inner, max_retain: usize) -> Vec<Box<dyn Broadcast>> {
        if inner.items.len() <= max_retain {
            return Vec::new();
        }
        inner
            .items
            .sort_by(|a, b| a.transmits.cmp(&b.transmits).then(b.id.cmp(&a.id)));
        inner
            .items
            .drain(max_retain..)
            .map(|q| q.broadcast)
            .collect()
    }
}

impl BroadcastQueue for TransmitLimitedQueue {
    fn queue_broadcast(&self, broadcast: Box<dyn Broadcast>) {
        let mut finished = Vec::new();
        {
            let mut inner = self.inner.lock();
            let mut i = 0;
            while i < inner.items.len() {
                if broadcast.invalidates(inner.items[i].broadcast.as_ref()) {
                    finished.push(inner.items.swap_remove(i).broadcast);
                } else {
                    i += 1;
                }
            }

            let id = inner.next_id;
            inner.next_id += 1;
            inner.items.push(Queued {
                broadcast,
                transmits: 0,
                id,
            });

            finished.extend(Self::prune_locked(&mut inner, self.max_depth));
        }
        for broadcast in finished {
            broadcast.finished();
        }
    }
}
