//! # kite-store
//!
//! The storage coordination layer of KiteDB: table lifecycle under
//! concurrent access, scan contexts carried across round trips by
//! continuation tokens, counter/accumulate value semantics, and the
//! [`Store`] that executes operations against the engine.
//!
//! The store is deliberately synchronous; every operation either
//! completes against the engine or fails with a typed error. Routing a
//! mutation through consensus, and suspending a caller until delivery,
//! is the dispatcher's and ring's business, not the store's.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod context;
mod registry;
mod store;

pub use codec::CounterValue;
pub use context::{Context, ContextManager};
pub use registry::TableRegistry;
pub use store::{Store, StoreOptions};
