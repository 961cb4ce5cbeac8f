//! Engine connection and sessions.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;

use kite_common::{KiteError, KiteResult};

use crate::cursor::Cursor;

/// One table's ordered data, shared between the engine and open sessions.
pub(crate) type TableData = Arc<RwLock<BTreeMap<Bytes, Bytes>>>;

/// The storage engine connection.
///
/// Owns the set of named tables. Creating and dropping tables is
/// registry-driven: the engine itself performs no liveness accounting,
/// that is the store's table registry's job.
pub struct Engine {
    tables: DashMap<String, TableData>,
}

impl Engine {
    /// Opens an in-memory engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    /// Creates a table. Creating an existing table is a no-op.
    pub fn create_table(&self, name: &str) -> KiteResult<()> {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::new())));
        Ok(())
    }

    /// Drops a table, discarding its data.
    ///
    /// Sessions already bound to the table keep a detached handle; the
    /// store's registry guarantees none exist when this is called.
    pub fn drop_table(&self, name: &str) -> KiteResult<()> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| KiteError::TableNotFound {
                table: name.to_string(),
            })
    }

    /// Returns true if the table exists in the engine.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Opens a session bound to one table.
    pub fn open_session(&self, table: &str) -> KiteResult<Session> {
        let data = self
            .tables
            .get(table)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| KiteError::TableNotFound {
                table: table.to_string(),
            })?;
        Ok(Session { data })
    }

    /// Number of entries in a table, for reporting.
    #[must_use]
    pub fn table_len(&self, name: &str) -> usize {
        self.tables
            .get(name)
            .map(|entry| entry.value().read().len())
            .unwrap_or(0)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// A session bound to one table.
///
/// Sessions are cheap handles; each scan or mutation batch owns exactly
/// one, never shared across contexts.
pub struct Session {
    data: TableData,
}

impl Session {
    /// Opens a cursor over the session's table.
    #[must_use]
    pub fn open_cursor(&self) -> Cursor {
        Cursor::new(Arc::clone(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_idempotent() {
        let engine = Engine::new();
        engine.create_table("events").unwrap();
        engine.create_table("events").unwrap();
        assert!(engine.has_table("events"));
    }

    #[test]
    fn test_drop_missing_table() {
        let engine = Engine::new();
        let err = engine.drop_table("nope").unwrap_err();
        assert!(matches!(err, KiteError::TableNotFound { .. }));
    }

    #[test]
    fn test_session_survives_drop() {
        let engine = Engine::new();
        engine.create_table("events").unwrap();
        let session = engine.open_session("events").unwrap();

        let mut cursor = session.open_cursor();
        cursor.set_key(b"k");
        cursor.set_value(b"v");
        cursor.insert().unwrap();

        engine.drop_table("events").unwrap();

        // The detached handle still answers reads.
        cursor.set_key(b"k");
        assert!(cursor.search().unwrap());
    }
}
