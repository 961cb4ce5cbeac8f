//! # kite-common
//!
//! Common types, errors, and constants for KiteDB.
//!
//! This crate provides the foundational pieces used across all KiteDB
//! components:
//!
//! - **Errors**: unified error handling with [`KiteError`]
//! - **Constants**: system-wide limits and defaults

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod error;

pub use constants::*;
pub use error::{ErrorCode, KiteError, KiteResult};
