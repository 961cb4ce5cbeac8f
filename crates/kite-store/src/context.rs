//! Scan contexts and the token registry.
//!
//! A [`Context`] carries one engine session and cursor across the round
//! trips of a paged scan. Between pages it is parked in the
//! [`ContextManager`] under its token; resolving a token removes the
//! context from the registry, so each token is good for exactly one
//! further continuation (or one Done release), and a concurrent
//! duplicate continuation finds nothing and gets an empty response.
//!
//! Contexts release their table's reader slot on every exit path: both
//! `close` and `Drop` return it, so an error in the middle of a page
//! fetch can never leak the slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, trace};
use uuid::Uuid;

use kite_common::{KiteError, KiteResult};
use kite_engine::{Cursor, Engine, Session};
use kite_proto::QueryType;

use crate::registry::TableRegistry;

/// A session-bound unit wrapping one engine cursor for one scan or
/// mutation batch.
pub struct Context {
    token: String,
    table: String,
    kind: QueryType,
    // Sessions stay alive as long as their cursor; field order keeps
    // the cursor dropping first.
    cursor: Cursor,
    _session: Session,
    /// Inclusive upper key for Between scans, set by the first page.
    pub bound: Option<Bytes>,
    /// Counter threshold for Between scans, set by the first page.
    pub threshold: Option<u32>,
    done: bool,
    touched: Instant,
    released: bool,
    registry: Arc<TableRegistry>,
    open_count: Arc<AtomicUsize>,
}

impl Context {
    fn open(
        engine: &Engine,
        registry: Arc<TableRegistry>,
        open_count: Arc<AtomicUsize>,
        table: &str,
        kind: QueryType,
    ) -> KiteResult<Self> {
        registry.acquire(table)?;
        let session = match engine.open_session(table) {
            Ok(session) => session,
            Err(e) => {
                registry.release(table);
                return Err(e);
            }
        };
        let cursor = session.open_cursor();
        let token = Uuid::new_v4().to_string();
        trace!(table, %token, ?kind, "context opened");
        Ok(Self {
            token,
            table: table.to_string(),
            kind,
            cursor,
            _session: session,
            bound: None,
            threshold: None,
            done: false,
            touched: Instant::now(),
            released: false,
            registry,
            open_count,
        })
    }

    /// The context's stable token, usable as a registry key.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The table this context is bound to.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The scan kind fixed at open time.
    #[must_use]
    pub fn kind(&self) -> QueryType {
        self.kind
    }

    /// The cursor, positioned wherever the previous page left it.
    pub fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    /// True once the scan has produced its last entry.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Marks the scan finished; the next registry step closes it.
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Releases the cursor, session, and table reader slot. Idempotent.
    pub fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.cursor.reset();
        self.registry.release(&self.table);
        self.open_count.fetch_sub(1, Ordering::AcqRel);
        trace!(table = %self.table, token = %self.token, "context closed");
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.touched.elapsed() > ttl
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.close();
    }
}

/// Registry of paused scans, keyed by continuation token.
pub struct ContextManager {
    parked: DashMap<String, Context>,
    open_count: Arc<AtomicUsize>,
    max_contexts: usize,
    ttl: Duration,
}

impl ContextManager {
    /// Creates a manager with the given admission cap and idle TTL.
    #[must_use]
    pub fn new(max_contexts: usize, ttl: Duration) -> Self {
        Self {
            parked: DashMap::new(),
            open_count: Arc::new(AtomicUsize::new(0)),
            max_contexts,
            ttl,
        }
    }

    /// Opens a context on a table.
    ///
    /// Fails with `ContextLimit` once the cap is reached and with
    /// `TableDropped` when the table's drop sentinel is set. The count
    /// covers every live context, parked or mid-request.
    pub fn open(
        &self,
        engine: &Engine,
        registry: &Arc<TableRegistry>,
        table: &str,
        kind: QueryType,
    ) -> KiteResult<Context> {
        let max = self.max_contexts;
        self.open_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current >= max {
                    None
                } else {
                    Some(current + 1)
                }
            })
            .map_err(|_| KiteError::ContextLimit { max })?;

        match Context::open(
            engine,
            Arc::clone(registry),
            Arc::clone(&self.open_count),
            table,
            kind,
        ) {
            Ok(context) => Ok(context),
            Err(e) => {
                // The slot claimed above is not yet owned by a Context;
                // return it here on any open failure.
                self.open_count.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    /// Parks a context under its token for the next round trip.
    pub fn park(&self, mut context: Context) -> String {
        context.touched = Instant::now();
        let token = context.token.clone();
        self.parked.insert(token.clone(), context);
        token
    }

    /// Claims the context parked under `token`.
    ///
    /// Returns None for unknown, already-claimed, or expired tokens;
    /// expired contexts are closed on the way out.
    pub fn resolve(&self, token: &str) -> Option<Context> {
        let (_, context) = self.parked.remove(token)?;
        if context.expired(self.ttl) {
            debug!(token, "continuation token expired");
            // Drop closes it.
            return None;
        }
        Some(context)
    }

    /// Closes every parked context idle longer than the TTL.
    ///
    /// Returns how many were reaped. Clients that abandon a scan
    /// without sending Done land here.
    pub fn sweep(&self) -> usize {
        let before = self.parked.len();
        let ttl = self.ttl;
        self.parked.retain(|_, context| !context.expired(ttl));
        let reaped = before - self.parked.len();
        if reaped > 0 {
            debug!(reaped, "swept abandoned scan contexts");
        }
        reaped
    }

    /// Number of currently parked contexts.
    #[must_use]
    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    /// Number of live contexts, parked or mid-request.
    #[must_use]
    pub fn live_len(&self) -> usize {
        self.open_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Engine, Arc<TableRegistry>) {
        let engine = Engine::new();
        engine.create_table("t").unwrap();
        let registry = Arc::new(TableRegistry::new());
        registry.register("t").unwrap();
        (engine, registry)
    }

    #[test]
    fn test_open_close_releases_reader() {
        let (engine, registry) = fixture();
        let manager = ContextManager::new(4, Duration::from_secs(60));

        let mut context = manager
            .open(&engine, &registry, "t", QueryType::GreaterEqual)
            .unwrap();
        assert_eq!(registry.context_count("t"), Some(1));
        assert_eq!(manager.live_len(), 1);

        context.close();
        assert_eq!(registry.context_count("t"), Some(0));
        assert_eq!(manager.live_len(), 0);

        // Idempotent.
        context.close();
        assert_eq!(registry.context_count("t"), Some(0));
    }

    #[test]
    fn test_drop_path_releases_reader() {
        let (engine, registry) = fixture();
        let manager = ContextManager::new(4, Duration::from_secs(60));

        {
            let _context = manager
                .open(&engine, &registry, "t", QueryType::Between)
                .unwrap();
            assert_eq!(registry.context_count("t"), Some(1));
        }
        assert_eq!(registry.context_count("t"), Some(0));
        assert_eq!(manager.live_len(), 0);
    }

    #[test]
    fn test_admission_cap() {
        let (engine, registry) = fixture();
        let manager = ContextManager::new(2, Duration::from_secs(60));

        let _a = manager
            .open(&engine, &registry, "t", QueryType::Equal)
            .unwrap();
        let _b = manager
            .open(&engine, &registry, "t", QueryType::Equal)
            .unwrap();
        assert!(matches!(
            manager
                .open(&engine, &registry, "t", QueryType::Equal)
                .err(),
            Some(KiteError::ContextLimit { max: 2 })
        ));
    }

    #[test]
    fn test_failed_open_returns_slot() {
        let (engine, registry) = fixture();
        let manager = ContextManager::new(2, Duration::from_secs(60));

        // Unregistered table: acquire fails before any Context exists,
        // so the admission slot must come back every time.
        for _ in 0..3 {
            assert!(manager
                .open(&engine, &registry, "missing", QueryType::Equal)
                .is_err());
        }
        assert_eq!(manager.live_len(), 0);

        // The full cap is still available for real tables.
        let _a = manager
            .open(&engine, &registry, "t", QueryType::Equal)
            .unwrap();
        let _b = manager
            .open(&engine, &registry, "t", QueryType::Equal)
            .unwrap();
        assert_eq!(manager.live_len(), 2);
    }

    #[test]
    fn test_token_single_use() {
        let (engine, registry) = fixture();
        let manager = ContextManager::new(4, Duration::from_secs(60));

        let context = manager
            .open(&engine, &registry, "t", QueryType::GreaterEqual)
            .unwrap();
        let token = manager.park(context);

        assert!(manager.resolve(&token).is_some());
        assert!(manager.resolve(&token).is_none());
    }

    #[test]
    fn test_expired_token_closes_context() {
        let (engine, registry) = fixture();
        let manager = ContextManager::new(4, Duration::from_millis(1));

        let context = manager
            .open(&engine, &registry, "t", QueryType::GreaterEqual)
            .unwrap();
        let token = manager.park(context);

        std::thread::sleep(Duration::from_millis(5));
        assert!(manager.resolve(&token).is_none());
        assert_eq!(registry.context_count("t"), Some(0));
        assert_eq!(manager.live_len(), 0);
    }

    #[test]
    fn test_sweep_reaps_idle() {
        let (engine, registry) = fixture();
        let manager = ContextManager::new(4, Duration::from_millis(1));

        let context = manager
            .open(&engine, &registry, "t", QueryType::Between)
            .unwrap();
        manager.park(context);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(manager.sweep(), 1);
        assert_eq!(manager.parked_len(), 0);
        assert_eq!(registry.context_count("t"), Some(0));
    }
}
