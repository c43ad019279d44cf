//! Right-hand sides of recorded assignments.
//!
//! An [`Expression`] knows its primal value, an upper bound on how many
//! differentiable leaves it has, and how to report each leaf to a tape with
//! the product of partial derivatives along the path to it. The node kinds
//! form a closed set: leaves ([`Term`], [`Variable`], [`Constant`]),
//! [`Unary`] and [`Binary`]. Intermediate nodes carry their precomputed
//! partials, so reporting is a plain walk with multiplication.
//!
//! ```
//! use segtape::expression::{add, scale};
//! use segtape::{ReverseTape, Tape};
//!
//! let mut tape = Tape::<f64>::new();
//! tape.set_active();
//! let mut x1 = tape.new_variable(5.0);
//! let mut x2 = tape.new_variable(7.0);
//! tape.register_input(&mut x1);
//! tape.register_input(&mut x2);
//!
//! let mut y = tape.new_variable(0.0);
//! tape.store(&mut y, &add(scale(2.0, x1.term()), scale(3.0, x2.term())));
//! assert_eq!(y.value(), 31.0);
//!
//! tape.set_gradient(y.index(), 1.0);
//! tape.evaluate();
//! assert_eq!(tape.get_gradient(x1.index()), 2.0);
//! assert_eq!(tape.get_gradient(x2.index()), 3.0);
//! ```

use crate::index::{Index, PASSIVE};
use crate::interface::ReverseTape;
use crate::Float;

/// A right-hand side the tape can record.
pub trait Expression<F: Float> {
    /// Upper bound on the leaves reported by [`calc_gradient`](Self::calc_gradient).
    const MAX_ACTIVE: usize;

    /// Primal value.
    fn value(&self) -> F;

    /// Report every differentiable leaf with its partial derivative.
    fn calc_gradient<T: ReverseTape<F>>(&self, tape: &mut T);

    /// Report every differentiable leaf with its partial derivative times
    /// `jacobi`.
    fn calc_gradient_scaled<T: ReverseTape<F>>(&self, tape: &mut T, jacobi: F);
}

impl<F: Float, E: Expression<F>> Expression<F> for &E {
    const MAX_ACTIVE: usize = E::MAX_ACTIVE;

    #[inline]
    fn value(&self) -> F {
        (**self).value()
    }

    #[inline]
    fn calc_gradient<T: ReverseTape<F>>(&self, tape: &mut T) {
        (**self).calc_gradient(tape)
    }

    #[inline]
    fn calc_gradient_scaled<T: ReverseTape<F>>(&self, tape: &mut T, jacobi: F) {
        (**self).calc_gradient_scaled(tape, jacobi)
    }
}

/// A differentiable scalar: primal value plus the identity of its adjoint slot.
///
/// Not `Clone`: an identity is owned by one variable at a time. Copies go
/// through [`ReverseTape::store_copy`], and a variable that is no longer
/// needed should be handed back with
/// [`Tape::drop_variable`](crate::Tape::drop_variable) so its identity can be
/// reused.
#[derive(Debug, Default)]
pub struct Variable<F: Float> {
    pub(crate) value: F,
    pub(crate) index: Index,
}

impl<F: Float> Variable<F> {
    /// A variable that does not depend on any input.
    #[inline]
    pub fn constant(value: F) -> Self {
        Variable {
            value,
            index: PASSIVE,
        }
    }

    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    /// Change the primal value without recording anything.
    #[inline]
    pub fn set_value(&mut self, value: F) {
        self.value = value;
    }

    #[inline]
    pub fn index(&self) -> Index {
        self.index
    }

    /// Whether the variable currently depends on a recorded input.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.index != PASSIVE
    }

    /// Snapshot of value and identity for use inside an expression.
    ///
    /// Needed when the variable also appears on the left-hand side, e.g.
    /// `y = y * x`.
    #[inline]
    pub fn term(&self) -> Term<F> {
        Term {
            value: self.value,
            index: self.index,
        }
    }
}

impl<F: Float> Expression<F> for Variable<F> {
    const MAX_ACTIVE: usize = 1;

    #[inline]
    fn value(&self) -> F {
        self.value
    }

    #[inline]
    fn calc_gradient<T: ReverseTape<F>>(&self, tape: &mut T) {
        tape.push_jacobi_unit(self.value, self.index);
    }

    #[inline]
    fn calc_gradient_scaled<T: ReverseTape<F>>(&self, tape: &mut T, jacobi: F) {
        tape.push_jacobi(jacobi, self.value, self.index);
    }
}

/// Leaf holding a copy of a variable's value and identity.
#[derive(Clone, Copy, Debug)]
pub struct Term<F: Float> {
    pub value: F,
    pub index: Index,
}

impl<F: Float> Expression<F> for Term<F> {
    const MAX_ACTIVE: usize = 1;

    #[inline]
    fn value(&self) -> F {
        self.value
    }

    #[inline]
    fn calc_gradient<T: ReverseTape<F>>(&self, tape: &mut T) {
        tape.push_jacobi_unit(self.value, self.index);
    }

    #[inline]
    fn calc_gradient_scaled<T: ReverseTape<F>>(&self, tape: &mut T, jacobi: F) {
        tape.push_jacobi(jacobi, self.value, self.index);
    }
}

/// Passive leaf.
#[derive(Clone, Copy, Debug)]
pub struct Constant<F: Float>(pub F);

impl<F: Float> Expression<F> for Constant<F> {
    const MAX_ACTIVE: usize = 0;

    #[inline]
    fn value(&self) -> F {
        self.0
    }

    #[inline]
    fn calc_gradient<T: ReverseTape<F>>(&self, _tape: &mut T) {}

    #[inline]
    fn calc_gradient_scaled<T: ReverseTape<F>>(&self, _tape: &mut T, _jacobi: F) {}
}

/// `f(arg)` with precomputed `f'(arg)`.
#[derive(Clone, Copy, Debug)]
pub struct Unary<E, F> {
    pub arg: E,
    pub value: F,
    pub derivative: F,
}

impl<F: Float, E: Expression<F>> Expression<F> for Unary<E, F> {
    const MAX_ACTIVE: usize = E::MAX_ACTIVE;

    #[inline]
    fn value(&self) -> F {
        self.value
    }

    #[inline]
    fn calc_gradient<T: ReverseTape<F>>(&self, tape: &mut T) {
        self.arg.calc_gradient_scaled(tape, self.derivative);
    }

    #[inline]
    fn calc_gradient_scaled<T: ReverseTape<F>>(&self, tape: &mut T, jacobi: F) {
        self.arg.calc_gradient_scaled(tape, jacobi * self.derivative);
    }
}

/// `f(lhs, rhs)` with precomputed partials.
#[derive(Clone, Copy, Debug)]
pub struct Binary<A, B, F> {
    pub lhs: A,
    pub rhs: B,
    pub value: F,
    pub d_lhs: F,
    pub d_rhs: F,
}

impl<F: Float, A: Expression<F>, B: Expression<F>> Expression<F> for Binary<A, B, F> {
    const MAX_ACTIVE: usize = A::MAX_ACTIVE + B::MAX_ACTIVE;

    #[inline]
    fn value(&self) -> F {
        self.value
    }

    #[inline]
    fn calc_gradient<T: ReverseTape<F>>(&self, tape: &mut T) {
        self.lhs.calc_gradient_scaled(tape, self.d_lhs);
        self.rhs.calc_gradient_scaled(tape, self.d_rhs);
    }

    #[inline]
    fn calc_gradient_scaled<T: ReverseTape<F>>(&self, tape: &mut T, jacobi: F) {
        self.lhs.calc_gradient_scaled(tape, jacobi * self.d_lhs);
        self.rhs.calc_gradient_scaled(tape, jacobi * self.d_rhs);
    }
}

// ── Constructors ──

#[inline]
pub fn unary<F: Float, E: Expression<F>>(arg: E, value: F, derivative: F) -> Unary<E, F> {
    Unary {
        arg,
        value,
        derivative,
    }
}

#[inline]
pub fn add<F: Float, A: Expression<F>, B: Expression<F>>(a: A, b: B) -> Binary<A, B, F> {
    let value = a.value() + b.value();
    Binary {
        lhs: a,
        rhs: b,
        value,
        d_lhs: F::one(),
        d_rhs: F::one(),
    }
}

#[inline]
pub fn sub<F: Float, A: Expression<F>, B: Expression<F>>(a: A, b: B) -> Binary<A, B, F> {
    let value = a.value() - b.value();
    Binary {
        lhs: a,
        rhs: b,
        value,
        d_lhs: F::one(),
        d_rhs: -F::one(),
    }
}

#[inline]
pub fn mul<F: Float, A: Expression<F>, B: Expression<F>>(a: A, b: B) -> Binary<A, B, F> {
    let (av, bv) = (a.value(), b.value());
    Binary {
        lhs: a,
        rhs: b,
        value: av * bv,
        d_lhs: bv,
        d_rhs: av,
    }
}

#[inline]
pub fn div<F: Float, A: Expression<F>, B: Expression<F>>(a: A, b: B) -> Binary<A, B, F> {
    let av = a.value();
    let inv = F::one() / b.value();
    Binary {
        lhs: a,
        rhs: b,
        value: av * inv,
        d_lhs: inv,
        d_rhs: -av * inv * inv,
    }
}

/// `factor * e` with a passive factor.
#[inline]
pub fn scale<F: Float, E: Expression<F>>(factor: F, e: E) -> Unary<E, F> {
    let value = factor * e.value();
    unary(e, value, factor)
}

#[inline]
pub fn neg<F: Float, E: Expression<F>>(e: E) -> Unary<E, F> {
    let value = -e.value();
    unary(e, value, -F::one())
}

/// `e * e` reported as a single leaf term.
#[inline]
pub fn square<F: Float, E: Expression<F>>(e: E) -> Unary<E, F> {
    let v = e.value();
    unary(e, v * v, v + v)
}

#[inline]
pub fn sin<F: Float, E: Expression<F>>(e: E) -> Unary<E, F> {
    let v = e.value();
    unary(e, v.sin(), v.cos())
}

#[inline]
pub fn cos<F: Float, E: Expression<F>>(e: E) -> Unary<E, F> {
    let v = e.value();
    unary(e, v.cos(), -v.sin())
}

#[inline]
pub fn exp<F: Float, E: Expression<F>>(e: E) -> Unary<E, F> {
    let r = e.value().exp();
    unary(e, r, r)
}

#[inline]
pub fn ln<F: Float, E: Expression<F>>(e: E) -> Unary<E, F> {
    let v = e.value();
    unary(e, v.ln(), F::one() / v)
}

#[inline]
pub fn sqrt<F: Float, E: Expression<F>>(e: E) -> Unary<E, F> {
    let r = e.value().sqrt();
    unary(e, r, F::one() / (r + r))
}

#[inline]
pub fn powi<F: Float, E: Expression<F>>(e: E, n: i32) -> Unary<E, F> {
    let v = e.value();
    let d = F::from_i32(n).unwrap_or_else(F::zero) * v.powi(n - 1);
    unary(e, v.powi(n), d)
}
