//! Operation and response message types.
//!
//! ```text
//! Client ──Operation──▶ Dispatcher ──(mutation)──▶ Ring.send ─▶ deliver
//!        ◀──Response──              ◀──(read)────── Store
//! ```
//!
//! Mutations and reads share one envelope; the dispatcher routes on the
//! variant. A `Get` carrying a continuation token resumes a paused scan
//! instead of opening a fresh one.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use kite_common::{KiteError, KiteResult};

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The operation was applied or answered.
    Ok,
    /// The operation failed; `reason` explains why.
    Error,
    /// The node cannot take the operation right now; retry the whole
    /// call (never a resend under the same continuation token).
    Retry,
}

/// The kind of read a `Get` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    /// Point lookup; always completes in one round.
    Equal,
    /// Ascending scan from the first key >= `key`.
    GreaterEqual,
    /// Descending scan from the last key <= `key`.
    LessEqual,
    /// Ascending scan from `key` with inclusive upper bound `key2`.
    Between,
    /// Release a paused scan without fetching more data.
    Done,
}

/// How an `Update` treats an existing value.
///
/// The mode is explicit on the wire; the store never infers it from the
/// payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateMode {
    /// Per key: bump the leading counter, or store counter = 1 when the
    /// key is new. Takes no values.
    Increment,
    /// Unconditionally replace the value.
    Overwrite,
    /// Per key: bump the leading counter and append the new payload to
    /// the stored one, or store `[1][payload]` when the key is new.
    Accumulate,
}

/// A read request.
///
/// A fresh query names a table; a continuation names a token issued by
/// an earlier page. `limit` has page-size-plus-one semantics: a page
/// holds at most `limit - 1` entries, the spare slot detects that more
/// data remains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    /// Table to read. Ignored when `token` is set.
    pub table: String,
    /// Scan kind.
    pub query: QueryType,
    /// Seek key (fresh queries).
    pub key: Bytes,
    /// Inclusive upper bound, Between queries only.
    pub key2: Bytes,
    /// Continuation token from a previous page; empty for fresh queries.
    pub token: String,
    /// Page size plus one.
    pub limit: u32,
    /// Keep only entries whose leading counter is >= this; None disables.
    pub count_threshold: Option<u32>,
}

impl GetRequest {
    /// Builds a fresh point or directional query.
    #[must_use]
    pub fn fresh(table: impl Into<String>, query: QueryType, key: Bytes, limit: u32) -> Self {
        Self {
            table: table.into(),
            query,
            key,
            key2: Bytes::new(),
            token: String::new(),
            limit,
            count_threshold: None,
        }
    }

    /// Builds a fresh Between query.
    #[must_use]
    pub fn between(
        table: impl Into<String>,
        key: Bytes,
        key2: Bytes,
        limit: u32,
        count_threshold: Option<u32>,
    ) -> Self {
        Self {
            table: table.into(),
            query: QueryType::Between,
            key,
            key2,
            token: String::new(),
            limit,
            count_threshold,
        }
    }

    /// Builds a continuation for a previously issued token.
    #[must_use]
    pub fn continuation(token: impl Into<String>, query: QueryType, limit: u32) -> Self {
        Self {
            table: String::new(),
            query,
            key: Bytes::new(),
            key2: Bytes::new(),
            token: token.into(),
            limit,
            count_threshold: None,
        }
    }

    /// Builds a release for a previously issued token.
    #[must_use]
    pub fn done(token: impl Into<String>) -> Self {
        Self::continuation(token, QueryType::Done, 0)
    }

    /// True if this request resumes a paused scan.
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

/// A client-visible operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a table.
    Create {
        /// Table name.
        table: String,
    },
    /// Drop a table once it has no live contexts.
    Drop {
        /// Table name.
        table: String,
    },
    /// Write (key, value) pairs. Counts must match.
    Insert {
        /// Table name.
        table: String,
        /// Keys, pairwise with `values`.
        keys: Vec<Bytes>,
        /// Values, pairwise with `keys`.
        values: Vec<Bytes>,
    },
    /// Update keys under an explicit mode.
    Update {
        /// Table name.
        table: String,
        /// Update mode.
        mode: UpdateMode,
        /// Keys to touch.
        keys: Vec<Bytes>,
        /// Values; empty for `Increment`, pairwise otherwise.
        values: Vec<Bytes>,
    },
    /// Read.
    Get(GetRequest),
}

impl Operation {
    /// Encodes the operation for the wire or a replication payload.
    pub fn encode(&self) -> KiteResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| KiteError::Decode {
            message: e.to_string(),
        })
    }

    /// Decodes an operation from wire bytes.
    pub fn decode(bytes: &[u8]) -> KiteResult<Self> {
        bincode::deserialize(bytes).map_err(|e| KiteError::Decode {
            message: e.to_string(),
        })
    }

    /// True for operations that go through the replicated path.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Get(_))
    }

    /// The table this operation addresses, when it names one.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Create { table }
            | Self::Drop { table }
            | Self::Insert { table, .. }
            | Self::Update { table, .. } => Some(table),
            Self::Get(get) => {
                if get.has_token() {
                    None
                } else {
                    Some(&get.table)
                }
            }
        }
    }
}

/// The reply to any operation.
///
/// An empty `token` on a scan response means the scan is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Outcome.
    pub status: Status,
    /// Human-readable outcome detail.
    pub reason: String,
    /// Continuation token; empty when no further page exists.
    pub token: String,
    /// Result keys.
    pub keys: Vec<Bytes>,
    /// Result values, pairwise with `keys`.
    pub values: Vec<Bytes>,
}

impl Response {
    /// An OK response with a message and no data.
    #[must_use]
    pub fn ok(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            reason: reason.into(),
            token: String::new(),
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// An error response.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason: reason.into(),
            token: String::new(),
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// A retry response.
    #[must_use]
    pub fn retry(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Retry,
            reason: reason.into(),
            token: String::new(),
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// An OK response with no data and no token.
    ///
    /// This is the answer to an unknown or expired continuation token:
    /// tokens are ephemeral, resolving a stale one is not an error.
    #[must_use]
    pub fn empty() -> Self {
        Self::ok("")
    }

    /// A page of scan results.
    #[must_use]
    pub fn page(token: impl Into<String>, keys: Vec<Bytes>, values: Vec<Bytes>) -> Self {
        Self {
            status: Status::Ok,
            reason: "OK".to_string(),
            token: token.into(),
            keys,
            values,
        }
    }

    /// True when status is OK.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Number of returned entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    /// True when a further page can be fetched.
    #[must_use]
    pub fn has_more(&self) -> bool {
        !self.token.is_empty()
    }

    /// Encodes the response for the wire.
    pub fn encode(&self) -> KiteResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| KiteError::Decode {
            message: e.to_string(),
        })
    }

    /// Decodes a response from wire bytes.
    pub fn decode(bytes: &[u8]) -> KiteResult<Self> {
        bincode::deserialize(bytes).map_err(|e| KiteError::Decode {
            message: e.to_string(),
        })
    }
}

/// Converts a store-level error into its wire response.
///
/// This is the single point where the error taxonomy maps onto response
/// statuses: retryable conditions become `Retry`, everything else
/// `Error`.
impl From<&KiteError> for Response {
    fn from(err: &KiteError) -> Self {
        if err.is_retryable() {
            Self::retry(err.to_string())
        } else {
            Self::error(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_roundtrip() {
        let op = Operation::Insert {
            table: "events".to_string(),
            keys: vec![Bytes::from_static(b"k1")],
            values: vec![Bytes::from_static(b"v1")],
        };
        let encoded = op.encode().unwrap();
        assert_eq!(Operation::decode(&encoded).unwrap(), op);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = Operation::decode(&[0xff; 3]).unwrap_err();
        assert!(matches!(err, KiteError::Decode { .. }));
    }

    #[test]
    fn test_get_request_routing() {
        let fresh = GetRequest::fresh("t", QueryType::Equal, Bytes::from_static(b"k"), 1);
        assert!(!fresh.has_token());
        assert_eq!(Operation::Get(fresh).table(), Some("t"));

        let cont = GetRequest::continuation("tok", QueryType::Between, 100);
        assert!(cont.has_token());
        assert_eq!(Operation::Get(cont).table(), None);
    }

    #[test]
    fn test_error_status_mapping() {
        let resp: Response = (&KiteError::GroupBusy).into();
        assert_eq!(resp.status, Status::Retry);

        let resp: Response = (&KiteError::LengthMismatch { keys: 1, values: 2 }).into();
        assert_eq!(resp.status, Status::Error);
    }

    #[test]
    fn test_scan_exhaustion_signalled_by_empty_token() {
        let page = Response::page("", vec![Bytes::from_static(b"k")], vec![Bytes::new()]);
        assert!(!page.has_more());
        assert_eq!(page.count(), 1);
    }
}
