//! Catch-up replicator.
//!
//! A node that falls behind (or joins fresh) pulls whole tables from a
//! peer using the ordinary pagination protocol, applying the records
//! through its own dispatcher so replicated deployments re-broadcast
//! them. The worker runs off the request path; enqueueing a catch-up is
//! always non-blocking.
//!
//! Progress is tracked as a checkpoint key per (source, table). A retry
//! resumes from the checkpoint; the boundary key is fetched twice and
//! the second insert is an idempotent upsert.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{info, warn};

use kite_proto::{GetRequest, Operation, QueryType, Response, Status};

use crate::dispatcher::Dispatcher;

/// One page of 128 entries plus the spare slot.
const PULL_PAGE_LIMIT: u32 = 129;

const MAX_PULL_ATTEMPTS: u32 = 3;

/// A request to pull one table from one peer.
#[derive(Debug, Clone)]
pub struct CatchUpRequest {
    /// Base URL of the peer to pull from.
    pub source: String,
    /// Table to pull.
    pub table: String,
}

/// Background worker pulling tables from peers.
pub struct Replicator {
    tx: mpsc::Sender<CatchUpRequest>,
}

impl Replicator {
    /// Spawns the worker. Must run inside a tokio runtime.
    #[must_use]
    pub fn spawn(dispatcher: Arc<Dispatcher>, queue_depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<CatchUpRequest>(queue_depth);
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let mut checkpoints: HashMap<String, Bytes> = HashMap::new();

            while let Some(request) = rx.recv().await {
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    match pull(&client, &dispatcher, &request, &mut checkpoints).await {
                        Ok(pulled) => {
                            info!(
                                source = %request.source,
                                table = %request.table,
                                pulled,
                                "catch-up finished"
                            );
                            break;
                        }
                        Err(e) if attempt < MAX_PULL_ATTEMPTS => {
                            warn!(
                                source = %request.source,
                                table = %request.table,
                                attempt,
                                error = %e,
                                "catch-up failed, retrying"
                            );
                            tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt)))
                                .await;
                        }
                        Err(e) => {
                            warn!(
                                source = %request.source,
                                table = %request.table,
                                error = %e,
                                "catch-up abandoned"
                            );
                            break;
                        }
                    }
                }
            }
        });
        Self { tx }
    }

    /// Queues a catch-up. Returns false when the queue is full or the
    /// worker has stopped; the caller may simply ask again later.
    pub fn enqueue(&self, request: CatchUpRequest) -> bool {
        self.tx.try_send(request).is_ok()
    }
}

async fn pull(
    client: &reqwest::Client,
    dispatcher: &Dispatcher,
    request: &CatchUpRequest,
    checkpoints: &mut HashMap<String, Bytes>,
) -> Result<usize> {
    let checkpoint_key = format!("{}/{}", request.source, request.table);
    let start = checkpoints.get(&checkpoint_key).cloned().unwrap_or_default();

    let created = dispatcher
        .dispatch(Operation::Create {
            table: request.table.clone(),
        })
        .await;
    if !created.is_ok() {
        bail!("local create failed: {}", created.reason);
    }

    let mut pulled = 0;
    let mut next = Operation::Get(GetRequest::fresh(
        request.table.clone(),
        QueryType::GreaterEqual,
        start,
        PULL_PAGE_LIMIT,
    ));
    loop {
        let page = exchange(client, &request.source, &next).await?;
        if page.status != Status::Ok {
            bail!("peer answered {:?}: {}", page.status, page.reason);
        }

        if let Some(last) = page.keys.last().cloned() {
            pulled += page.count();
            let applied = dispatcher
                .dispatch(Operation::Insert {
                    table: request.table.clone(),
                    keys: page.keys.clone(),
                    values: page.values.clone(),
                })
                .await;
            if !applied.is_ok() {
                bail!("local insert failed: {}", applied.reason);
            }
            checkpoints.insert(checkpoint_key.clone(), last);
        }

        if !page.has_more() {
            return Ok(pulled);
        }
        next = Operation::Get(GetRequest::continuation(
            page.token,
            QueryType::GreaterEqual,
            PULL_PAGE_LIMIT,
        ));
    }
}

async fn exchange(client: &reqwest::Client, source: &str, op: &Operation) -> Result<Response> {
    let body = op.encode()?;
    let bytes = client
        .post(source)
        .body(body)
        .send()
        .await
        .with_context(|| format!("request to {source} failed"))?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(Response::decode(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kite_store::Store;

    #[tokio::test]
    async fn test_enqueue_bounded() {
        let dispatcher = Arc::new(Dispatcher::standalone(Arc::new(Store::default())));
        let replicator = Replicator::spawn(dispatcher, 1);

        // The worker is parked on an unreachable peer or the queue; at
        // least one of the two enqueues must land, and a third against
        // a full queue reports false rather than blocking.
        let request = CatchUpRequest {
            source: "http://127.0.0.1:1/".to_string(),
            table: "t".to_string(),
        };
        assert!(replicator.enqueue(request.clone()));
        let _ = replicator.enqueue(request.clone());
        let _ = replicator.enqueue(request);
    }
}
