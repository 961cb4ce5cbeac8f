//! Cursor implementation for table traversal and range scans.
//!
//! The cursor follows the put-then-act protocol of LSM engine APIs:
//! `set_key`/`set_value` stage operands, `insert`/`update`/`search`/
//! `search_near` consume them. Scans position the cursor with
//! `search_near` and walk with `next`/`prev`, reading the current entry
//! through [`Cursor::key`] and [`Cursor::value`].

use std::ops::Bound;

use bytes::Bytes;

use kite_common::{KiteError, KiteResult};

use crate::engine::TableData;

/// Result of a near-match seek.
///
/// `search_near` positions the cursor on the exact key when present,
/// otherwise on an adjacent key, reporting which side it landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// Positioned on the exact key.
    Found,
    /// Positioned on the smallest key greater than the target.
    Larger,
    /// Positioned on the largest key smaller than the target.
    Smaller,
    /// The table is empty; the cursor is unpositioned.
    NotFound,
}

/// Cursor positioning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Not positioned on any entry.
    Unpositioned,
    /// Positioned on a valid entry.
    Valid,
    /// Walked past either end of the table.
    Exhausted,
}

/// A cursor over one table.
pub struct Cursor {
    data: TableData,
    pending_key: Option<Bytes>,
    pending_value: Option<Bytes>,
    position: Option<Bytes>,
    state: CursorState,
}

impl Cursor {
    pub(crate) fn new(data: TableData) -> Self {
        Self {
            data,
            pending_key: None,
            pending_value: None,
            position: None,
            state: CursorState::Unpositioned,
        }
    }

    /// Clears staged operands and the current position.
    pub fn reset(&mut self) {
        self.pending_key = None;
        self.pending_value = None;
        self.position = None;
        self.state = CursorState::Unpositioned;
    }

    /// Stages the key operand for the next operation.
    pub fn set_key(&mut self, key: &[u8]) {
        self.pending_key = Some(Bytes::copy_from_slice(key));
    }

    /// Stages the value operand for the next operation.
    pub fn set_value(&mut self, value: &[u8]) {
        self.pending_value = Some(Bytes::copy_from_slice(value));
    }

    /// Returns the cursor's positioning state.
    #[must_use]
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Returns the key under the cursor, if positioned.
    #[must_use]
    pub fn key(&self) -> Option<Bytes> {
        self.position.clone()
    }

    /// Returns the value under the cursor, if positioned.
    #[must_use]
    pub fn value(&self) -> Option<Bytes> {
        let key = self.position.as_ref()?;
        self.data.read().get(key).cloned()
    }

    fn take_pending_key(&mut self) -> KiteResult<Bytes> {
        self.pending_key
            .take()
            .ok_or_else(|| KiteError::internal("cursor operation without a staged key"))
    }

    fn take_pending_value(&mut self) -> KiteResult<Bytes> {
        self.pending_value
            .take()
            .ok_or_else(|| KiteError::internal("cursor operation without a staged value"))
    }

    /// Writes the staged (key, value) pair, creating or replacing.
    pub fn insert(&mut self) -> KiteResult<()> {
        let key = self.take_pending_key()?;
        let value = self.take_pending_value()?;
        self.data.write().insert(key, value);
        Ok(())
    }

    /// Writes the staged (key, value) pair.
    ///
    /// The in-memory engine treats update as upsert; callers that need
    /// found/not-found discrimination search first.
    pub fn update(&mut self) -> KiteResult<()> {
        self.insert()
    }

    /// Exact lookup of the staged key. Positions the cursor on a hit.
    pub fn search(&mut self) -> KiteResult<bool> {
        let key = self.take_pending_key()?;
        let found = self.data.read().contains_key(&key);
        if found {
            self.position = Some(key);
            self.state = CursorState::Valid;
        } else {
            self.position = None;
            self.state = CursorState::Unpositioned;
        }
        Ok(found)
    }

    /// Seeks to the staged key or its nearest neighbor.
    ///
    /// Prefers the exact key, then the smallest larger key, then the
    /// largest smaller key.
    pub fn search_near(&mut self) -> KiteResult<SearchStatus> {
        let key = self.take_pending_key()?;
        let data = self.data.read();

        if data.contains_key(&key) {
            drop(data);
            self.position = Some(key);
            self.state = CursorState::Valid;
            return Ok(SearchStatus::Found);
        }

        if let Some((larger, _)) = data
            .range::<Bytes, _>((Bound::Excluded(&key), Bound::Unbounded))
            .next()
        {
            let larger = larger.clone();
            drop(data);
            self.position = Some(larger);
            self.state = CursorState::Valid;
            return Ok(SearchStatus::Larger);
        }

        if let Some((smaller, _)) = data
            .range::<Bytes, _>((Bound::Unbounded, Bound::Excluded(&key)))
            .next_back()
        {
            let smaller = smaller.clone();
            drop(data);
            self.position = Some(smaller);
            self.state = CursorState::Valid;
            return Ok(SearchStatus::Smaller);
        }

        self.position = None;
        self.state = CursorState::Unpositioned;
        Ok(SearchStatus::NotFound)
    }

    /// Advances to the next key in ascending order.
    ///
    /// From an unpositioned cursor this moves to the first entry.
    /// Returns false once the table is exhausted in this direction.
    pub fn next(&mut self) -> KiteResult<bool> {
        let data = self.data.read();
        let next = match &self.position {
            Some(current) => data
                .range::<Bytes, _>((Bound::Excluded(current), Bound::Unbounded))
                .next()
                .map(|(k, _)| k.clone()),
            None => data.iter().next().map(|(k, _)| k.clone()),
        };
        drop(data);

        match next {
            Some(key) => {
                self.position = Some(key);
                self.state = CursorState::Valid;
                Ok(true)
            }
            None => {
                self.state = CursorState::Exhausted;
                Ok(false)
            }
        }
    }

    /// Steps to the previous key in descending order.
    ///
    /// From an unpositioned cursor this moves to the last entry.
    /// Returns false once the table is exhausted in this direction.
    pub fn prev(&mut self) -> KiteResult<bool> {
        let data = self.data.read();
        let prev = match &self.position {
            Some(current) => data
                .range::<Bytes, _>((Bound::Unbounded, Bound::Excluded(current)))
                .next_back()
                .map(|(k, _)| k.clone()),
            None => data.iter().next_back().map(|(k, _)| k.clone()),
        };
        drop(data);

        match prev {
            Some(key) => {
                self.position = Some(key);
                self.state = CursorState::Valid;
                Ok(true)
            }
            None => {
                self.state = CursorState::Exhausted;
                Ok(false)
            }
        }
    }
}
