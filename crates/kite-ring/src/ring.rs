//! The ring: one store bound to one replication group.

use std::sync::Arc;

use tracing::{debug, info};

use kite_common::KiteResult;
use kite_store::Store;

use crate::group::{LocalGroup, ReplicationGroup, ReplyHandle, StateMachine};

/// The state machine a ring binds to its group: payloads are decoded
/// operations applied straight through [`Store::apply`].
pub struct StoreMachine {
    store: Arc<Store>,
}

impl StoreMachine {
    /// Wraps a store for delivery.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl StateMachine for StoreMachine {
    fn deliver(&self, sequence: u64, payload: &[u8], reply: Option<ReplyHandle>) {
        let response = self.store.apply(payload);
        debug!(sequence, status = ?response.status, "payload applied");
        if let Some(reply) = reply {
            reply.complete(response);
        }
    }

    fn recovering(&self) {
        info!("ring recovering");
    }

    fn leading(&self, members: &[String]) {
        info!(members = members.len(), "ring leading");
    }

    fn following(&self, leader: &str, members: &[String]) {
        info!(leader, members = members.len(), "ring following");
    }
}

/// One shard's ordered mutation channel.
///
/// A node runs one or more rings over the same store; the dispatcher
/// picks a ring per mutation. Ordering holds within a ring, never
/// across rings.
pub struct Ring {
    group: Box<dyn ReplicationGroup>,
}

impl Ring {
    /// Builds a single-node ring: a [`LocalGroup`] bound to the store.
    ///
    /// Must run inside a tokio runtime.
    #[must_use]
    pub fn local(id: usize, store: Arc<Store>, queue_depth: usize) -> Self {
        let group = LocalGroup::new(id, queue_depth);
        group.bind(Arc::new(StoreMachine::new(store)));
        Self {
            group: Box::new(group),
        }
    }

    /// Builds a ring over an externally provided group.
    #[must_use]
    pub fn over(group: Box<dyn ReplicationGroup>) -> Self {
        Self { group }
    }

    /// Submits a payload for ordered delivery.
    pub fn send(&self, payload: Vec<u8>, reply: ReplyHandle) -> KiteResult<()> {
        self.group.send(payload, reply)
    }

    /// The underlying group's identifier.
    #[must_use]
    pub fn id(&self) -> usize {
        self.group.id()
    }
}
