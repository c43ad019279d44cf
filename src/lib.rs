//! Tape-based reverse-mode automatic differentiation.
//!
//! A [`Tape`] records every active assignment as a statement with the
//! partial derivatives of its right-hand side, stored in chained segmented
//! buffers. The reverse sweep replays the recording backwards and accumulates
//! adjoints. Identities are recycled through a free list, and user callbacks
//! can be recorded as external functions that run at their place in the
//! sweep. [`LinearTape`] is the variant with strictly increasing identities.

pub mod adjoints;
pub mod api;
pub mod chunk;
pub mod config;
pub mod error;
pub mod expression;
pub mod external;
pub mod float;
pub mod index;
pub mod interface;
pub mod linear_tape;
pub mod stats;
pub mod tape;

pub use adjoints::Adjoints;
pub use api::{gradient, jacobian, vjp};
pub use config::{Optimizations, TapeConfig};
pub use error::ConfigError;
pub use expression::{Expression, Variable};
pub use external::ExternalFunction;
pub use float::Float;
pub use index::{Index, PASSIVE};
pub use interface::ReverseTape;
pub use linear_tape::{LinearPosition, LinearTape};
pub use stats::{
    AdjointStatistics, IndexStatistics, LayerStatistics, LinearTapeStatistics, TapeStatistics,
};
pub use tape::{Position, Tape};

/// Index tape over `f64`.
pub type Tape64 = Tape<f64>;
/// Index tape over `f32`.
pub type Tape32 = Tape<f32>;
/// Linear tape over `f64`.
pub type LinearTape64 = LinearTape<f64>;
