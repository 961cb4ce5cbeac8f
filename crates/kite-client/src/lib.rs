//! # kite-client
//!
//! Client library for KiteDB.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bytes::Bytes;
//! use kite_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("http://localhost:7070");
//!
//!     client.create_table("events").await?;
//!     client
//!         .insert(
//!             "events",
//!             vec![Bytes::from_static(b"k1")],
//!             vec![Bytes::from_static(b"v1")],
//!         )
//!         .await?;
//!
//!     // Paged range scan: a non-empty token means more pages exist.
//!     let mut page = client.scan_from("events", Bytes::new(), 100).await?;
//!     while page.has_more() {
//!         page = client.next_page(&page.token, 100).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;

/// Client connection.
pub mod client;

pub use client::Client;
pub use error::{ClientError, ClientResult};
