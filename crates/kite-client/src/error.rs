//! Client error types.

use thiserror::Error;

use kite_common::KiteError;

/// Errors surfaced by the client.
///
/// Protocol-level Error and Retry statuses are not errors here; they
/// come back inside the [`Response`](kite_proto::Response) for the
/// caller to inspect.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP exchange failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not decode.
    #[error(transparent)]
    Protocol(#[from] KiteError),
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ClientError::from(KiteError::Decode {
            message: "truncated".to_string(),
        });
        assert!(err.to_string().contains("truncated"));
    }
}
