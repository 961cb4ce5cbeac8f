//! # kite-engine
//!
//! The ordered byte-string storage engine consumed by the KiteDB store.
//!
//! The contract is cursor-shaped: tables are created and dropped by
//! name, a [`Session`] binds to one table, and a [`Cursor`] supports
//! `reset`/`set_key`/`set_value`/`insert`/`update`/`search`/
//! [`search_near`](Cursor::search_near)/`next`/`prev` over
//! byte-lexicographic key order.
//!
//! The default [`Engine`] is an in-memory ordered map. Production
//! deployments are expected to swap in a persistent engine with the
//! same contract; everything above this crate depends only on the
//! cursor semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cursor;
mod engine;

pub use cursor::{Cursor, CursorState, SearchStatus};
pub use engine::{Engine, Session};
