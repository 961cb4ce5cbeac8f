//! Counter-prefixed value encoding.
//!
//! Increment and accumulate updates store values as a 4-byte big-endian
//! contribution counter followed by the payload. The codec is the only
//! place that knows the layout; nothing else slices offsets by hand.

use bytes::{BufMut, Bytes, BytesMut};

use kite_common::{KiteError, KiteResult, COUNTER_PREFIX_LEN};

/// A counter-prefixed value: `[count: u32 BE][payload]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterValue {
    /// How many updates have touched the key.
    pub count: u32,
    /// The accumulated payload.
    pub payload: Bytes,
}

impl CounterValue {
    /// A first contribution: count 1 over the given payload.
    #[must_use]
    pub fn initial(payload: Bytes) -> Self {
        Self { count: 1, payload }
    }

    /// Bumps the contribution counter, leaving the payload untouched.
    #[must_use]
    pub fn incremented(self) -> Self {
        Self {
            count: self.count.wrapping_add(1),
            payload: self.payload,
        }
    }

    /// Bumps the counter and appends a further contribution.
    #[must_use]
    pub fn accumulated(self, extra: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(self.payload.len() + extra.len());
        payload.put_slice(&self.payload);
        payload.put_slice(extra);
        Self {
            count: self.count.wrapping_add(1),
            payload: payload.freeze(),
        }
    }

    /// Encodes to the stored layout.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(COUNTER_PREFIX_LEN + self.payload.len());
        buf.put_u32(self.count);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decodes a stored value.
    pub fn decode(bytes: &[u8]) -> KiteResult<Self> {
        if bytes.len() < COUNTER_PREFIX_LEN {
            return Err(KiteError::Codec {
                message: format!("value too short for counter prefix: {} bytes", bytes.len()),
            });
        }
        let count = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(Self {
            count,
            payload: Bytes::copy_from_slice(&bytes[COUNTER_PREFIX_LEN..]),
        })
    }

    /// Reads just the leading counter, for threshold filtering.
    ///
    /// Values shorter than the prefix (raw inserts, overwrites) have no
    /// counter and never pass a threshold.
    #[must_use]
    pub fn count_of(bytes: &[u8]) -> Option<u32> {
        if bytes.len() < COUNTER_PREFIX_LEN {
            return None;
        }
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
