//! Request dispatch and per-table statistics.
//!
//! The dispatcher is the single entry point for decoded operations.
//! Reads go straight to the local store; mutations are encoded and
//! submitted to one of the node's rings, and the calling task suspends
//! on a completion handle until delivery applies the payload. Every
//! error becomes a typed wire response at this boundary; nothing above
//! it sees a `KiteError`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kite_proto::{Operation, Response};
use kite_ring::{ReplyHandle, Ring};
use kite_store::Store;

#[derive(Default)]
struct TableCounters {
    create: AtomicU64,
    drop: AtomicU64,
    get: AtomicU64,
    insert: AtomicU64,
    update: AtomicU64,
}

impl TableCounters {
    fn snapshot(&self) -> TableStats {
        TableStats {
            create: self.create.load(Ordering::Relaxed),
            drop: self.drop.load(Ordering::Relaxed),
            get: self.get.load(Ordering::Relaxed),
            insert: self.insert.load(Ordering::Relaxed),
            update: self.update.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time operation counts for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    /// Create operations seen.
    pub create: u64,
    /// Drop operations seen.
    pub drop: u64,
    /// Get operations seen.
    pub get: u64,
    /// Insert operations seen.
    pub insert: u64,
    /// Update operations seen.
    pub update: u64,
}

/// The node statistics snapshot served by the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    /// Per-table operation counts.
    pub tables: BTreeMap<String, TableStats>,
    /// Live scan contexts, parked or mid-request.
    pub live_contexts: usize,
    /// Scans currently parked under a token.
    pub parked_contexts: usize,
}

/// Routes operations to the local store or through a ring.
pub struct Dispatcher {
    store: Arc<Store>,
    rings: Vec<Ring>,
    counters: DashMap<String, Arc<TableCounters>>,
}

impl Dispatcher {
    /// A dispatcher that applies mutations directly, no replication.
    #[must_use]
    pub fn standalone(store: Arc<Store>) -> Self {
        Self {
            store,
            rings: Vec::new(),
            counters: DashMap::new(),
        }
    }

    /// A dispatcher routing mutations through the given rings.
    #[must_use]
    pub fn replicated(store: Arc<Store>, rings: Vec<Ring>) -> Self {
        Self {
            store,
            rings,
            counters: DashMap::new(),
        }
    }

    /// The store this dispatcher serves.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Decodes and dispatches a wire payload.
    ///
    /// A payload that does not decode answers with an Error response;
    /// the transport keeps the connection.
    pub async fn dispatch_bytes(&self, payload: &[u8]) -> Response {
        match Operation::decode(payload) {
            Ok(op) => self.dispatch(op).await,
            Err(e) => {
                debug!(error = %e, "undecodable operation payload");
                Response::from(&e)
            }
        }
    }

    /// Dispatches one operation.
    pub async fn dispatch(&self, op: Operation) -> Response {
        self.record(&op);

        if op.is_mutation() && !self.rings.is_empty() {
            return self.submit(&op).await;
        }
        self.store.execute(&op)
    }

    /// Submits a mutation to a uniformly chosen ring and awaits delivery.
    async fn submit(&self, op: &Operation) -> Response {
        let payload = match op.encode() {
            Ok(payload) => payload,
            Err(e) => return Response::from(&e),
        };
        let ring = &self.rings[rand::thread_rng().gen_range(0..self.rings.len())];

        let (reply, rx) = ReplyHandle::pair();
        if let Err(e) = ring.send(payload, reply) {
            debug!(ring = ring.id(), error = %e, "ring rejected submission");
            return Response::from(&e);
        }
        match rx.await {
            Ok(response) => response,
            Err(_) => Response::error("delivery abandoned the request"),
        }
    }

    fn record(&self, op: &Operation) {
        // Tokened continuations carry no table name; they go uncounted.
        let Some(table) = op.table() else { return };
        let counters = self
            .counters
            .entry(table.to_string())
            .or_default()
            .clone();
        let counter = match op {
            Operation::Create { .. } => &counters.create,
            Operation::Drop { .. } => &counters.drop,
            Operation::Insert { .. } => &counters.insert,
            Operation::Update { .. } => &counters.update,
            Operation::Get(_) => &counters.get,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of per-table counters and context occupancy.
    #[must_use]
    pub fn stats(&self) -> StatsReport {
        let tables = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        StatsReport {
            tables,
            live_contexts: self.store.live_contexts(),
            parked_contexts: self.store.parked_contexts(),
        }
    }
}
