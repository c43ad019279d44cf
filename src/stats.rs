//! Structured tape diagnostics.
//!
//! These are plain values; formatting them for humans is left to the caller.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Occupancy of one chained buffer layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerStatistics {
    /// Number of allocated segments, spare ones included.
    pub segments: usize,
    /// Capacity used for newly allocated segments.
    pub segment_size: usize,
    /// Records currently stored.
    pub entries: usize,
    /// Records the allocated segments can hold.
    pub capacity: usize,
    /// Size of one record.
    pub entry_bytes: usize,
    pub used_bytes: usize,
    pub allocated_bytes: usize,
}

/// State of the identity allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexStatistics {
    /// Highest identity issued since the last reset.
    pub max_issued: usize,
    /// Identities currently held by variables.
    pub live: usize,
    /// Freed identities waiting for reuse.
    pub stored: usize,
    /// Capacity of the free list.
    pub allocated: usize,
    pub bytes_stored: usize,
    pub bytes_allocated: usize,
}

/// Size of the adjoint vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdjointStatistics {
    pub len: usize,
    pub allocated_bytes: usize,
}

/// Snapshot of everything a [`Tape`](crate::Tape) holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TapeStatistics {
    pub statements: LayerStatistics,
    pub jacobians: LayerStatistics,
    pub external_functions: LayerStatistics,
    pub adjoints: AdjointStatistics,
    pub indices: IndexStatistics,
}

/// Snapshot of everything a [`LinearTape`](crate::LinearTape) holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinearTapeStatistics {
    pub operators: LayerStatistics,
    pub jacobians: LayerStatistics,
    pub adjoints: AdjointStatistics,
    /// Identities issued by the expression counter.
    pub expressions: usize,
}
