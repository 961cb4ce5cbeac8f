//! # kite-proto
//!
//! Wire protocol messages for KiteDB.
//!
//! The transport carries exactly two shapes: an encoded [`Operation`]
//! in a request body and an encoded [`Response`] in the reply. Both are
//! serde structs encoded with bincode; the transport never interprets
//! them.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod message;

pub use message::{GetRequest, Operation, QueryType, Response, Status, UpdateMode};
