//! The recording/replay protocol shared by [`Tape`](crate::Tape) and
//! [`LinearTape`](crate::LinearTape).
//!
//! Expressions talk to a tape only through [`push_jacobi`](ReverseTape::push_jacobi)
//! and [`push_jacobi_unit`](ReverseTape::push_jacobi_unit); assignments go
//! through the `store*` family.

use std::fmt::Debug;

use crate::expression::{Expression, Variable};
use crate::index::Index;
use crate::Float;

/// A reverse-mode tape.
pub trait ReverseTape<F: Float> {
    /// Composite checkpoint of the recording. `Default` is the initial
    /// position; later positions compare greater.
    type Position: Copy + Debug + Default + Ord;

    /// Prepare the identity slot of a newly constructed variable.
    fn init_gradient_data(&mut self, value: &mut F, index: &mut Index);

    /// Give up the identity of a variable that goes out of use.
    fn destroy_gradient_data(&mut self, value: &mut F, index: &mut Index);

    /// Consume `var` and give its identity back.
    fn drop_variable(&mut self, mut var: Variable<F>) {
        self.destroy_gradient_data(&mut var.value, &mut var.index);
    }

    /// `lhs = rhs` for a general expression.
    fn store<E: Expression<F>>(&mut self, lhs: &mut Variable<F>, rhs: &E);

    /// `lhs = rhs` for a plain copy of another variable.
    fn store_copy(&mut self, lhs: &mut Variable<F>, rhs: &Variable<F>);

    /// `lhs = rhs` for a passive value.
    fn store_constant(&mut self, lhs: &mut Variable<F>, rhs: F);

    /// Record one leaf term `jacobi * d(leaf)` of the statement being stored.
    fn push_jacobi(&mut self, jacobi: F, value: F, index: Index);

    /// Record one leaf term with unit coefficient.
    fn push_jacobi_unit(&mut self, value: F, index: Index);

    /// Mark `var` as an independent input of the recording.
    fn register_input(&mut self, var: &mut Variable<F>);

    /// Mark `var` as an output of the recording.
    fn register_output(&mut self, var: &mut Variable<F>);

    fn set_active(&mut self);
    fn set_passive(&mut self);
    fn is_active(&self) -> bool;

    /// Current end of the recording.
    fn position(&self) -> Self::Position;

    /// Rewind the recording to `pos` and clear all adjoints.
    fn reset_to(&mut self, pos: &Self::Position);

    /// Rewind the whole recording.
    fn reset(&mut self) {
        self.reset_to(&Self::Position::default());
    }

    /// Reverse sweep from `start` back to `end` (`start >= end`).
    fn evaluate_range(&mut self, start: &Self::Position, end: &Self::Position);

    /// Reverse sweep over the whole recording.
    fn evaluate(&mut self) {
        let start = self.position();
        self.evaluate_range(&start, &Self::Position::default());
    }

    /// Adjoint of `index`, zero if never touched.
    fn get_gradient(&self, index: Index) -> F;

    /// Mutable adjoint of `index`. Panics for the passive identity.
    fn gradient(&mut self, index: Index) -> &mut F;

    /// Overwrite the adjoint of `index`; ignored for the passive identity.
    fn set_gradient(&mut self, index: Index, gradient: F);
}
