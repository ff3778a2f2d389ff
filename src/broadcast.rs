//! Outbound side of the protocol: local mutations become gossip broadcasts.
//!
//! The queue itself belongs to the membership service; this module only
//! defines the seam ([`BroadcastQueue`], [`Broadcast`]) and the producer
//! ([`DeltaBroadcaster`]) plus the dispatcher task that feeds it.

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::codec::{Frame, SyncMessage};
use crate::coordinator::SyncCoordinator;
use crate::crdt::ReplicaState;
use crate::error::Result;

/// Default depth of the wake-up queue between increments and the dispatcher.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 16;

/// A message sitting in a membership broadcast queue.
pub trait Broadcast: Send + Sync {
    /// Whether queuing `self` makes `other` obsolete, so `other` can be dropped.
    fn invalidates(&self, other: &dyn Broadcast) -> bool;

    /// The bytes to put on the wire.
    fn message(&self) -> &[u8];

    /// Called once when the queue retires this broadcast, either because it
    /// was transmitted enough times or because it was pruned.
    fn finished(self: Box<Self>);
}

/// A best-effort, retransmit-limited broadcast queue.
pub trait BroadcastQueue: Send + Sync {
    /// Enqueue a broadcast for dissemination to peers.
    fn queue_broadcast(&self, broadcast: Box<dyn Broadcast>);
}

/// Broadcast envelope for counter state.
pub struct CounterBroadcast {
    msg: Vec<u8>,
    notify: Option<oneshot::Sender<()>>,
}

impl CounterBroadcast {
    /// Wrap an encoded frame.
    pub fn new(msg: Vec<u8>) -> Self {
        Self { msg, notify: None }
    }

    /// Wrap an encoded frame and return a receiver fired when it is retired.
    pub fn with_notify(msg: Vec<u8>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                msg,
                notify: Some(tx),
            },
            rx,
        )
    }
}

impl Broadcast for CounterBroadcast {
    // Merges are monotonic and idempotent: a later state never makes an
    // earlier one harmful to deliver, so nothing is invalidated.
    fn invalidates(&self, _other: &dyn Broadcast) -> bool {
        false
    }

    fn message(&self) -> &[u8] {
        &self.msg
    }

    fn finished(self: Box<Self>) {
        if let Some(notify) = self.notify {
            let _ = notify.send(());
        }
    }
}

/// Turns "local state changed" into a queued merge broadcast.
#[derive(Clone)]
pub struct DeltaBroadcaster {
    queue: Arc<dyn BroadcastQueue>,
}

impl DeltaBroadcaster {
    /// A broadcaster feeding `queue`.
    pub fn new(queue: Arc<dyn BroadcastQueue>) -> Self {
        Self { queue }
    }

    /// Queue `state` as a merge message. Queued exactly once per call;
    /// fan-out and retransmission are up to the queue.
    pub fn publish(&self, state: &[u8]) -> Result<()> {
        let msg = encode_merge(state)?;
        trace!(bytes = msg.len(), "queueing merge broadcast");
        self.queue.queue_broadcast(Box::new(CounterBroadcast::new(msg)));
        Ok(())
    }

    /// Like [`publish`](Self::publish), returning a receiver that resolves
    /// once the queue retires the message.
    pub fn publish_with_notify(&self, state: &[u8]) -> Result<oneshot::Receiver<()>> {
        let msg = encode_merge(state)?;
        let (broadcast, done) = CounterBroadcast::with_notify(msg);
        self.queue.queue_broadcast(Box::new(broadcast));
        Ok(done)
    }

    /// Start the dispatcher task for `coordinator` with the default capacity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach<S: ReplicaState>(self, coordinator: &Arc<SyncCoordinator<S>>) -> JoinHandle<()> {
        self.attach_with_capacity(coordinator, DEFAULT_DISPATCH_CAPACITY)
    }

    /// Start the dispatcher task for `coordinator`.
    ///
    /// Increments post a wake-up on a bounded queue of `capacity` slots. The
    /// task snapshots the state on each wake-up, so a full queue never loses
    /// an update: a pending wake-up already covers it. The task exits once
    /// the coordinator is dropped.
    pub fn attach_with_capacity<S: ReplicaState>(
        self,
        coordinator: &Arc<SyncCoordinator<S>>,
        capacity: usize,
    ) -> JoinHandle<()> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        if !coordinator.set_dispatch(tx) {
            warn!("delta dispatcher already attached; ignoring second attach");
        }
        tokio::spawn(dispatch(Arc::downgrade(coordinator), rx, self))
    }
}

fn encode_merge(state: &[u8]) -> Result<Vec<u8>> {
    Ok(Frame::Data(SyncMessage::merge(state.to_vec())).encode()?)
}

async fn dispatch<S: ReplicaState>(
    coordinator: Weak<SyncCoordinator<S>>,
    mut wakeups: mpsc::Receiver<()>,
    broadcaster: DeltaBroadcaster,
) {
    while wakeups.recv().await.is_some() {
        // One snapshot covers every wake-up queued so far.
        while wakeups.try_recv().is_ok() {}

        let Some(coordinator) = coordinator.upgrade() else {
            break;
        };
        let state = match coordinator.snapshot() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "skipping delta broadcast: snapshot failed");
                continue;
            }
        };
        drop(coordinator);

        if let Err(e) = broadcaster.publish(&state) {
            warn!(error = %e, "skipping delta broadcast: encode failed");
        }
    }
    debug!("delta dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::codec::Action;
    use crate::GCounter;

    #[derive(Default)]
    struct RecordingQueue {
        queued: Mutex<Vec<Box<dyn Broadcast>>>,
    }

    impl RecordingQueue {
        fn drain(&self) -> Vec<Box<dyn Broadcast>> {
            std::mem::take(&mut *self.queued.lock())
        }
    }

    impl BroadcastQueue for RecordingQueue {
        fn queue_broadcast(&self, broadcast: Box<dyn Broadcast>) {
            self.queued.lock().push(broadcast);
        }
    }

    fn decode_total(msg: &[u8]) -> u64 {
        match Frame::decode(msg).unwrap() {
            Frame::Data(m) => {
                assert_eq!(m.action, Action::Merge);
                <GCounter as ReplicaState>::deserialize(&m.payload)
                    .unwrap()
                    .value()
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn publish_queues_one_data_frame() {
        let queue = Arc::new(RecordingQueue::default());
        let broadcaster = DeltaBroadcaster::new(queue.clone());

        broadcaster.publish(br#"{"actor":"a","counts":{"a":4}}"#).unwrap();

        let queued = queue.drain();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].message()[0], crate::codec::DATA_TAG);
        assert_eq!(decode_total(queued[0].message()), 4);
    }

    #[test]
    fn publish_rejects_non_json_state() {
        let queue = Arc::new(RecordingQueue::default());
        let broadcaster = DeltaBroadcaster::new(queue.clone());
        assert!(broadcaster.publish(b"\x00\x01").is_err());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn counter_broadcast_never_invalidates() {
        let a = CounterBroadcast::new(b"d{}".to_vec());
        let b = CounterBroadcast::new(b"d{}".to_vec());
        assert!(!a.invalidates(&b));
        assert!(!b.invalidates(&a));
    }

    #[tokio::test]
    async fn finished_fires_notify() {
        let queue = Arc::new(RecordingQueue::default());
        let broadcaster = DeltaBroadcaster::new(queue.clone());
        let done = broadcaster
            .publish_with_notify(br#"{"actor":"a","counts":{}}"#)
            .unwrap();

        for b in queue.drain() {
            b.finished();
        }
        done.await.unwrap();
    }

    #[tokio::test]
    async fn dispatcher_broadcasts_latest_state() {
        let queue = Arc::new(RecordingQueue::default());
        let coordinator = Arc::new(SyncCoordinator::new(GCounter::new("a")));
        let handle = DeltaBroadcaster::new(queue.clone()).attach(&coordinator);

        coordinator.increment(2).unwrap();
        coordinator.increment(3).unwrap();

        let mut latest = 0;
        for _ in 0..100 {
            if let Some(last) = queue.drain().last() {
                latest = latest.max(decode_total(last.message()));
            }
            if latest == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(latest, 5);

        drop(coordinator);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn full_dispatch_queue_does_not_block_increments() {
        let queue = Arc::new(RecordingQueue::default());
        let coordinator = Arc::new(SyncCoordinator::new(GCounter::new("a")));
        let _handle = DeltaBroadcaster::new(queue.clone()).attach_with_capacity(&coordinator, 1);

        for _ in 0..1_000 {
            coordinator.increment(1).unwrap();
        }
        assert_eq!(coordinator.read(), 1_000);

        let mut latest = 0;
        for _ in 0..100 {
            for b in queue.drain() {
                latest = latest.max(decode_total(b.message()));
            }
            if latest == 1_000 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(latest, 1_000);
    }
}
