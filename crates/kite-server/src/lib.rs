//! # kite-server
//!
//! The KiteDB server: request dispatch, per-table statistics, the HTTP
//! transport, the catch-up replicator, and the `kited` daemon.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dispatcher;
pub mod http;
pub mod replicator;
