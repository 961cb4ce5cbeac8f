//! # kite-test
//!
//! Integration tests for KiteDB. The tests live under `tests/` and
//! exercise the full client-to-store path over HTTP.
