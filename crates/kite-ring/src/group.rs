//! Replication group contract and the in-process implementation.
//!
//! All nodes of a group must apply the same payloads in the same order,
//! so the state machine must be deterministic for mutations. Reads stay
//! off this path entirely.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use kite_common::{KiteError, KiteResult};
use kite_proto::Response;

/// Completion handle for one submitted payload.
///
/// Delivery completes the handle with the apply result; dropping it
/// unanswered makes the originator's receiver resolve with an error, so
/// a lost submission never strands a request task.
pub struct ReplyHandle {
    tx: oneshot::Sender<Response>,
}

impl ReplyHandle {
    /// Creates a handle and the receiver the originator awaits.
    #[must_use]
    pub fn pair() -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Completes the handle. The originator may have given up waiting;
    /// that is not an error here.
    pub fn complete(self, response: Response) {
        if self.tx.send(response).is_err() {
            debug!("reply receiver dropped before delivery");
        }
    }
}

/// Callbacks invoked by a replication group on its bound machine.
///
/// `deliver` is the only required method; the rest are lifecycle
/// notifications with no-op defaults.
pub trait StateMachine: Send + Sync + 'static {
    /// Transforms a payload before it is broadcast. Pass-through unless
    /// the machine needs to rewrite non-deterministic fields.
    fn preprocess(&self, _sequence: u64, payload: Vec<u8>) -> Vec<u8> {
        payload
    }

    /// Applies one delivered payload.
    ///
    /// Payloads arrive in a total order, each exactly once. `reply` is
    /// Some only on the node that originated the submission.
    fn deliver(&self, sequence: u64, payload: &[u8], reply: Option<ReplyHandle>);

    /// All deliveries up to `sequence` are durable in the group log.
    fn flushed(&self, _sequence: u64) {}

    /// Serializes state for snapshot transfer to a lagging member.
    fn save(&self) -> Bytes {
        Bytes::new()
    }

    /// Replaces state from a transferred snapshot.
    fn restore(&self, _snapshot: &[u8]) {}

    /// Snapshot transfer finished.
    fn snapshot_done(&self) {}

    /// This node was removed from the group.
    fn removed(&self) {}

    /// The group entered recovery; submissions will fail until a phase
    /// callback arrives.
    fn recovering(&self) {}

    /// This node is leading the group.
    fn leading(&self, _members: &[String]) {}

    /// This node follows `leader`.
    fn following(&self, _leader: &str, _members: &[String]) {}
}

/// A totally ordered delivery channel for mutation payloads.
pub trait ReplicationGroup: Send + Sync {
    /// Submits a payload for ordered delivery.
    ///
    /// Fails with `GroupBusy` when the group's submission queue is full
    /// and with `InvalidPhase` when the group cannot deliver at all; the
    /// caller maps those onto Retry and Error responses.
    fn send(&self, payload: Vec<u8>, reply: ReplyHandle) -> KiteResult<()>;

    /// Group identifier, for logs and stats.
    fn id(&self) -> usize;
}

struct Submission {
    payload: Vec<u8>,
    reply: ReplyHandle,
}

/// The single-node replication group.
///
/// A bounded queue and one pump task stand in for atomic broadcast:
/// total order is send order, delivery happens on the pump. Created
/// unbound; [`bind`](LocalGroup::bind) attaches the state machine and
/// starts delivery. Sends before bind fail with `InvalidPhase`.
pub struct LocalGroup {
    id: usize,
    queue_depth: usize,
    tx: RwLock<Option<mpsc::Sender<Submission>>>,
}

impl LocalGroup {
    /// Creates an unbound group.
    #[must_use]
    pub fn new(id: usize, queue_depth: usize) -> Self {
        Self {
            id,
            queue_depth,
            tx: RwLock::new(None),
        }
    }

    /// Binds the state machine and starts the pump task.
    ///
    /// Must run inside a tokio runtime. The single-node group leads
    /// from the moment it is bound.
    pub fn bind(&self, machine: Arc<dyn StateMachine>) {
        let (tx, mut rx) = mpsc::channel::<Submission>(self.queue_depth);
        let id = self.id;
        machine.leading(&[]);
        tokio::spawn(async move {
            let mut sequence: u64 = 0;
            while let Some(Submission { payload, reply }) = rx.recv().await {
                sequence += 1;
                let payload = machine.preprocess(sequence, payload);
                machine.deliver(sequence, &payload, Some(reply));
                machine.flushed(sequence);
            }
            debug!(group = id, sequence, "delivery pump stopped");
        });
        *self.tx.write() = Some(tx);
    }
}

impl ReplicationGroup for LocalGroup {
    fn send(&self, payload: Vec<u8>, reply: ReplyHandle) -> KiteResult<()> {
        let guard = self.tx.read();
        let Some(tx) = guard.as_ref() else {
            return Err(KiteError::InvalidPhase);
        };
        tx.try_send(Submission { payload, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(group = self.id, "submission queue full");
                    KiteError::GroupBusy
                }
                mpsc::error::TrySendError::Closed(_) => KiteError::InvalidPhase,
            })
    }

    fn id(&self) -> usize {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records delivered payloads and answers with their sequence.
    #[derive(Default)]
    struct RecordingMachine {
        delivered: Mutex<Vec<(u64, Vec<u8>)>>,
    }

    impl StateMachine for RecordingMachine {
        fn deliver(&self, sequence: u64, payload: &[u8], reply: Option<ReplyHandle>) {
            self.delivered.lock().push((sequence, payload.to_vec()));
            if let Some(reply) = reply {
                reply.complete(Response::ok(sequence.to_string()));
            }
        }
    }

    #[tokio::test]
    async fn test_delivers_in_send_order() {
        let machine = Arc::new(RecordingMachine::default());
        let group = LocalGroup::new(0, 16);
        group.bind(Arc::clone(&machine) as Arc<dyn StateMachine>);

        let mut receivers = Vec::new();
        for i in 0..5u8 {
            let (reply, rx) = ReplyHandle::pair();
            group.send(vec![i], reply).unwrap();
            receivers.push(rx);
        }
        for (i, rx) in receivers.into_iter().enumerate() {
            let response = rx.await.unwrap();
            assert_eq!(response.reason, (i as u64 + 1).to_string());
        }

        let delivered = machine.delivered.lock();
        let payloads: Vec<_> = delivered.iter().map(|(_, p)| p[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_send_before_bind_is_invalid_phase() {
        let group = LocalGroup::new(0, 16);
        let (reply, _rx) = ReplyHandle::pair();
        assert!(matches!(
            group.send(vec![1], reply).unwrap_err(),
            KiteError::InvalidPhase
        ));
    }

    #[tokio::test]
    async fn test_full_queue_is_group_busy() {
        // Current-thread runtime: the pump cannot run between try_sends,
        // so a depth-1 queue fills deterministically.
        let group = LocalGroup::new(0, 1);
        group.bind(Arc::new(RecordingMachine::default()));

        let (first, first_rx) = ReplyHandle::pair();
        group.send(vec![1], first).unwrap();

        let (second, _second_rx) = ReplyHandle::pair();
        let err = group.send(vec![2], second).unwrap_err();
        assert!(matches!(err, KiteError::GroupBusy));
        assert!(err.is_retryable());

        assert!(first_rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unanswered_reply_resolves_receiver() {
        let (reply, rx) = ReplyHandle::pair();
        drop(reply);
        assert!(rx.await.is_err());
    }
}
