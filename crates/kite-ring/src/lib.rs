//! # kite-ring
//!
//! The replication-group contract and its in-process implementation.
//!
//! Mutations never touch the store directly on the request path: the
//! dispatcher encodes them and hands them to a [`Ring`], whose group
//! delivers payloads in a total order to the bound [`StateMachine`].
//! The machine applies each payload and completes the originator's
//! [`ReplyHandle`], so the request task suspends on a oneshot rather
//! than blocking a thread on consensus.
//!
//! [`LocalGroup`] is the single-node group: a bounded in-process queue
//! and one pump task, delivering in send order. A clustered deployment
//! substitutes a networked [`ReplicationGroup`] with the same contract;
//! nothing above this crate changes.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod group;
mod ring;

pub use group::{LocalGroup, ReplicationGroup, ReplyHandle, StateMachine};
pub use ring::{Ring, StoreMachine};
