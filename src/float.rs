use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for the primal/adjoint types a tape records (`f32`, `f64`).
///
/// Bundles the numeric and utility traits the recording and the reverse sweep
/// need: finiteness checks for the jacobian filters, an additive identity for
/// fresh adjoint slots, and `Debug` for diagnostics.
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Default + Debug + Display + 'static
{
}

impl Float for f32 {}
impl Float for f64 {}
