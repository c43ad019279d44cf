//! Recoverable errors.
//!
//! Misuse of the recording/replay contract (an inverted replay range, the
//! passive identity used as an adjoint slot, pushing past reserved room)
//! panics instead: those are bugs in the caller, not conditions to handle.

use thiserror::Error;

/// Rejected [`TapeConfig`](crate::TapeConfig).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A chained buffer layer was given segments that cannot hold a record.
    #[error("segment size of the {layer} layer must be positive")]
    ZeroSegmentSize { layer: &'static str },
}
