//! Error handling for KiteDB.
//!
//! This module provides the unified error type and result alias used
//! across all KiteDB components. Errors are caught at the dispatcher
//! boundary and converted into typed wire responses; nothing propagates
//! across the wire as a panic or a transport failure.

use thiserror::Error;

/// Result type alias for KiteDB operations.
pub type KiteResult<T> = std::result::Result<T, KiteError>;

/// Error codes for categorizing errors.
///
/// Stable numeric codes for programmatic handling; the high byte is the
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,

    // Table errors (0x0100 - 0x01FF)
    /// Table already exists.
    TableExists = 0x0100,
    /// Table does not exist.
    TableNotFound = 0x0101,
    /// Table has a drop in progress.
    TableDropped = 0x0102,
    /// Table still has live contexts.
    TableBusy = 0x0103,

    // Context errors (0x0200 - 0x02FF)
    /// Live-context admission cap reached.
    ContextLimit = 0x0200,

    // Operation errors (0x0300 - 0x03FF)
    /// Keys and values counts differ.
    LengthMismatch = 0x0300,
    /// Malformed wire payload.
    Decode = 0x0301,
    /// Malformed counter-prefixed value.
    Codec = 0x0302,

    // Replication errors (0x0400 - 0x04FF)
    /// Broadcast layer cannot accept more in-flight sends.
    GroupBusy = 0x0400,
    /// Replication group is not in a phase that accepts sends.
    InvalidPhase = 0x0401,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Table",
            0x02 => "Context",
            0x03 => "Operation",
            0x04 => "Replication",
            _ => "Unknown",
        }
    }
}

/// The main error type for KiteDB.
///
/// Each variant carries the context needed to build a wire response at
/// the dispatcher boundary.
#[derive(Debug, Error)]
pub enum KiteError {
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Table already exists. Non-fatal: create is idempotent.
    #[error("table already exists: {table}")]
    TableExists {
        /// Table name.
        table: String,
    },

    /// Table does not exist.
    #[error("table does not exist: {table}")]
    TableNotFound {
        /// Table name.
        table: String,
    },

    /// Table has a drop in progress or completed; no new contexts may open.
    #[error("table is dropped: {table}")]
    TableDropped {
        /// Table name.
        table: String,
    },

    /// Drop observed live contexts for the full backoff budget.
    #[error("table has active contexts: {table}")]
    TableBusy {
        /// Table name.
        table: String,
    },

    /// Live-context admission cap reached.
    #[error("too many live contexts (cap {max})")]
    ContextLimit {
        /// The configured cap.
        max: usize,
    },

    /// Keys and values counts differ on an insert or value-mode update.
    #[error("length mismatch: {keys} keys, {values} values")]
    LengthMismatch {
        /// Number of keys in the request.
        keys: usize,
        /// Number of values in the request.
        values: usize,
    },

    /// Malformed wire payload.
    #[error("decode error: {message}")]
    Decode {
        /// Decoder message.
        message: String,
    },

    /// Malformed counter-prefixed value.
    #[error("counter codec error: {message}")]
    Codec {
        /// Codec message.
        message: String,
    },

    /// Broadcast layer cannot accept more in-flight sends.
    #[error("replication group busy")]
    GroupBusy,

    /// Replication group is not in a phase that accepts sends.
    #[error("replication group in invalid phase")]
    InvalidPhase,
}

impl KiteError {
    /// Returns the stable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::TableExists { .. } => ErrorCode::TableExists,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::TableDropped { .. } => ErrorCode::TableDropped,
            Self::TableBusy { .. } => ErrorCode::TableBusy,
            Self::ContextLimit { .. } => ErrorCode::ContextLimit,
            Self::LengthMismatch { .. } => ErrorCode::LengthMismatch,
            Self::Decode { .. } => ErrorCode::Decode,
            Self::Codec { .. } => ErrorCode::Codec,
            Self::GroupBusy => ErrorCode::GroupBusy,
            Self::InvalidPhase => ErrorCode::InvalidPhase,
        }
    }

    /// True if the caller should retry the whole call later.
    ///
    /// Retry means the full mutating call, never a resend under the same
    /// continuation token.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TableBusy { .. } | Self::ContextLimit { .. } | Self::GroupBusy
        )
    }

    /// Shorthand for an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_categorized() {
        assert_eq!(ErrorCode::TableExists.category(), "Table");
        assert_eq!(ErrorCode::ContextLimit.category(), "Context");
        assert_eq!(ErrorCode::GroupBusy.category(), "Replication");
        assert_eq!(ErrorCode::LengthMismatch.as_u16(), 0x0300);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(KiteError::GroupBusy.is_retryable());
        assert!(KiteError::TableBusy {
            table: "t".to_string()
        }
        .is_retryable());
        assert!(!KiteError::TableNotFound {
            table: "t".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_display_carries_context() {
        let err = KiteError::LengthMismatch { keys: 3, values: 2 };
        assert_eq!(err.to_string(), "length mismatch: 3 keys, 2 values");
    }
}
