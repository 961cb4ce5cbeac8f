//! Table registry and lifecycle gate.
//!
//! Each table carries a live-context counter. Contexts are the readers;
//! Drop is the single writer and must observe zero readers before it
//! may touch the engine. The counter is the only cross-thread state:
//! all transitions are atomic increment/decrement/compare-and-set,
//! never a lock held across engine I/O.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use kite_common::{KiteError, KiteResult};

/// Sentinel for a table whose drop has begun; no new context may open.
const DROPPED: i64 = -1;

/// Backoff schedule for the drop-side reader drain, roughly 63ms total.
const DRAIN_BACKOFF_MS: [u64; 6] = [1, 2, 4, 8, 16, 32];

#[derive(Debug)]
struct TableEntry {
    contexts: AtomicI64,
}

/// Name -> liveness registry governing create/drop races.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: DashMap<String, Arc<TableEntry>>,
}

impl TableRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table with zero live contexts.
    pub fn register(&self, name: &str) -> KiteResult<()> {
        match self.tables.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(KiteError::TableExists {
                table: name.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(TableEntry {
                    contexts: AtomicI64::new(0),
                }));
                Ok(())
            }
        }
    }

    /// True if the table is registered (dropping tables included).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Number of registered tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True if no tables are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Takes a reader slot on the table.
    ///
    /// Fails fast with `TableDropped` once the drop sentinel is set; a
    /// context must never open onto a table whose drop has begun.
    pub fn acquire(&self, name: &str) -> KiteResult<()> {
        let entry = self.entry(name)?;
        entry
            .contexts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < 0 {
                    None
                } else {
                    Some(current + 1)
                }
            })
            .map(|_| ())
            .map_err(|_| KiteError::TableDropped {
                table: name.to_string(),
            })
    }

    /// Returns a reader slot.
    ///
    /// Tolerates a racing drop having already removed the entry; the
    /// drop cannot have begun while this reader was still counted, so a
    /// missing entry means the release already happened.
    pub fn release(&self, name: &str) {
        if let Some(entry) = self.tables.get(name) {
            entry.contexts.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Current live-context count, for reporting. Negative while a drop
    /// is in progress.
    #[must_use]
    pub fn context_count(&self, name: &str) -> Option<i64> {
        self.tables
            .get(name)
            .map(|entry| entry.contexts.load(Ordering::Acquire))
    }

    /// Claims the table for dropping.
    ///
    /// Drains readers with bounded exponential backoff, then attempts
    /// the atomic 0 -> sentinel transition. If readers remain for the
    /// whole budget the claim fails with `TableBusy` and nothing
    /// destructive has happened; the caller retries the whole drop.
    pub fn begin_drop(&self, name: &str) -> KiteResult<()> {
        let entry = self.entry(name)?;

        let mut backoff = DRAIN_BACKOFF_MS.iter();
        loop {
            match entry
                .contexts
                .compare_exchange(0, DROPPED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(current) if current < 0 => {
                    // A concurrent drop claimed the table first.
                    return Err(KiteError::TableDropped {
                        table: name.to_string(),
                    });
                }
                Err(current) => match backoff.next() {
                    Some(ms) => {
                        debug!(table = name, readers = current, "drop waiting for contexts");
                        std::thread::sleep(Duration::from_millis(*ms));
                    }
                    None => {
                        return Err(KiteError::TableBusy {
                            table: name.to_string(),
                        })
                    }
                },
            }
        }
    }

    /// Removes a claimed table after the engine drop completed.
    pub fn finish_drop(&self, name: &str) {
        self.tables.remove(name);
    }

    /// Names of all registered tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|e| e.key().clone()).collect()
    }

    fn entry(&self, name: &str) -> KiteResult<Arc<TableEntry>> {
        self.tables
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| KiteError::TableNotFound {
                table: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_drop_removes() {
        let registry = TableRegistry::new();
        registry.register("t").unwrap();
        assert!(registry.contains("t"));

        registry.begin_drop("t").unwrap();
        registry.finish_drop("t");
        assert!(!registry.contains("t"));
    }

    #[test]
    fn test_register_twice() {
        let registry = TableRegistry::new();
        registry.register("t").unwrap();
        assert!(matches!(
            registry.register("t").unwrap_err(),
            KiteError::TableExists { .. }
        ));
    }

    #[test]
    fn test_acquire_blocks_drop() {
        let registry = TableRegistry::new();
        registry.register("t").unwrap();
        registry.acquire("t").unwrap();

        // Reader held for the whole backoff budget: drop reports busy
        // and the table stays usable.
        assert!(matches!(
            registry.begin_drop("t").unwrap_err(),
            KiteError::TableBusy { .. }
        ));
        assert!(registry.contains("t"));

        registry.release("t");
        registry.begin_drop("t").unwrap();
        registry.finish_drop("t");
    }

    #[test]
    fn test_acquire_after_drop_claim_fails_fast() {
        let registry = TableRegistry::new();
        registry.register("t").unwrap();
        registry.begin_drop("t").unwrap();

        assert!(matches!(
            registry.acquire("t").unwrap_err(),
            KiteError::TableDropped { .. }
        ));
    }

    #[test]
    fn test_drop_waits_for_concurrent_reader() {
        let registry = Arc::new(TableRegistry::new());
        registry.register("t").unwrap();
        registry.acquire("t").unwrap();

        let drop_side = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.begin_drop("t"))
        };

        // Release while the drop is inside its backoff loop; the claim
        // must then succeed.
        std::thread::sleep(Duration::from_millis(5));
        registry.release("t");

        drop_side.join().unwrap().unwrap();
        assert_eq!(registry.context_count("t"), Some(DROPPED));
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let registry = Arc::new(TableRegistry::new());
        registry.register("t").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.acquire("t").unwrap();
                        registry.release("t");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.context_count("t"), Some(0));
    }
}
