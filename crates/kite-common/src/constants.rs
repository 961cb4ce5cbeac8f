//! System-wide constants and limits.

/// Maximum value size in bytes (16 MB).
pub const MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

/// Default maximum number of live scan contexts per node.
///
/// Opening a context past this limit fails; the cap is the backstop for
/// clients that abandon a paged scan without sending Done.
pub const DEFAULT_MAX_CONTEXTS: usize = 1024;

/// Default idle TTL for a paused scan context, in seconds.
pub const DEFAULT_CONTEXT_TTL_SECS: u64 = 60;

/// Size of the big-endian counter prefix on increment/accumulate values.
pub const COUNTER_PREFIX_LEN: usize = 4;
