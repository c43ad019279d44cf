//! Forward pass: statements, jacobians, inputs and external functions.

use std::any::Any;

use tracing::debug;

use crate::adjoints::Adjoints;
use crate::expression::{Expression, Variable};
use crate::external::{ExternalCall, ExternalFunction, ExternalRelease};
use crate::index::{Index, PASSIVE};
use crate::Float;

use super::{ArgCount, ExternalRecord, JacobiEntry, Statement, Tape};

impl<F: Float> Tape<F> {
    /// A new passive variable holding `value`.
    pub fn new_variable(&mut self, value: F) -> Variable<F> {
        let mut var = Variable::constant(value);
        self.init_gradient_data(&mut var.value, &mut var.index);
        var
    }

    /// Give the identity of `var` back for reuse.
    ///
    /// Variables from before a [`reset`](Self::reset) should be dropped before
    /// the new recording issues identities: afterwards a stale identity at or
    /// below [`max_issued`](Self::max_issued) is indistinguishable from a live
    /// one. Stale identities above it are ignored.
    pub fn drop_variable(&mut self, mut var: Variable<F>) {
        self.destroy_gradient_data(&mut var.value, &mut var.index);
    }

    #[inline]
    pub fn init_gradient_data(&mut self, _value: &mut F, index: &mut Index) {
        *index = PASSIVE;
    }

    #[inline]
    pub fn destroy_gradient_data(&mut self, _value: &mut F, index: &mut Index) {
        self.indices.free_index(index);
    }

    /// Record `lhs = rhs`.
    ///
    /// The expression reports its leaves through [`push_jacobi`](Self::push_jacobi).
    /// If none of them is active the assignment is a constant and the identity
    /// of `lhs` is freed; otherwise `lhs` keeps (or gets) an identity and one
    /// statement is appended. The value of `lhs` is updated in every case.
    pub fn store<E: Expression<F>>(&mut self, lhs: &mut Variable<F>, rhs: &E) {
        if self.active {
            // the statement slot must exist before the jacobian segment can
            // capture the statement position
            self.statements_mut().reserve(1);
            self.jacobians_mut().reserve(E::MAX_ACTIVE);

            let start = self.jacobians().offset();
            rhs.calc_gradient(self);
            let active = self.jacobians().offset() - start;
            self.finish_statement(&mut lhs.index, active);
        } else {
            self.indices.free_index(&mut lhs.index);
        }
        lhs.value = rhs.value();
    }

    fn finish_statement(&mut self, lhs: &mut Index, active: usize) {
        if active == 0 {
            self.indices.free_index(lhs);
        } else {
            assert!(
                active <= ArgCount::MAX as usize,
                "statement with {} active arguments exceeds the limit of {}",
                active,
                ArgCount::MAX
            );
            self.indices.check_index(lhs);
            self.statements_mut().push(Statement {
                args: active as ArgCount,
                lhs: *lhs,
            });
        }
    }

    /// Record `lhs = rhs` for a plain copy: one unit entry, no expression walk.
    pub fn store_copy(&mut self, lhs: &mut Variable<F>, rhs: &Variable<F>) {
        if self.active && rhs.index != PASSIVE {
            self.indices.check_index(&mut lhs.index);
            self.statements_mut().reserve(1);
            self.jacobians_mut().reserve(1);
            self.jacobians_mut().push(JacobiEntry {
                jacobi: F::one(),
                index: rhs.index,
            });
            self.statements_mut().push(Statement {
                args: 1,
                lhs: lhs.index,
            });
        } else {
            self.indices.free_index(&mut lhs.index);
        }
        lhs.value = rhs.value;
    }

    /// Assign a passive value: frees the identity of `lhs`.
    #[inline]
    pub fn store_constant(&mut self, lhs: &mut Variable<F>, rhs: F) {
        self.indices.free_index(&mut lhs.index);
        lhs.value = rhs;
    }

    /// Append a statement whose `size` jacobians the caller pushes right after
    /// with [`push_jacobi_manual`](Self::push_jacobi_manual).
    ///
    /// Does nothing while the tape is passive.
    pub fn store_manual(&mut self, lhs: &mut Index, size: usize) {
        if self.active {
            assert!(
                size <= ArgCount::MAX as usize,
                "statement with {} arguments exceeds the limit of {}",
                size,
                ArgCount::MAX
            );
            self.statements_mut().reserve(1);
            self.jacobians_mut().reserve(size);
            self.indices.check_index(lhs);
            self.statements_mut().push(Statement {
                args: size as ArgCount,
                lhs: *lhs,
            });
        }
    }

    /// Append a jacobian entry without filtering. Only valid after
    /// [`store_manual`](Self::store_manual).
    #[inline]
    pub fn push_jacobi_manual(&mut self, jacobi: F, index: Index) {
        self.jacobians_mut().push(JacobiEntry { jacobi, index });
    }

    /// Record the leaf `index` with partial derivative `jacobi`.
    ///
    /// Passive leaves are skipped, as are non-finite and zero coefficients when
    /// the corresponding [`Optimizations`](crate::Optimizations) are on.
    #[inline]
    pub fn push_jacobi(&mut self, jacobi: F, _value: F, index: Index) {
        if index == PASSIVE {
            return;
        }
        if self.optimizations.ignore_invalid_jacobians && !jacobi.is_finite() {
            return;
        }
        if self.optimizations.ignore_zero_jacobians && jacobi == F::zero() {
            return;
        }
        self.jacobians_mut().push(JacobiEntry { jacobi, index });
    }

    /// Record the leaf `index` with unit partial derivative.
    #[inline]
    pub fn push_jacobi_unit(&mut self, _value: F, index: Index) {
        if index != PASSIVE {
            self.jacobians_mut().push(JacobiEntry {
                jacobi: F::one(),
                index,
            });
        }
    }

    /// Give `var` an identity so it becomes an independent input.
    #[inline]
    pub fn register_input(&mut self, var: &mut Variable<F>) {
        self.indices.check_index(&mut var.index);
    }

    /// Outputs need no marking on this tape.
    #[inline]
    pub fn register_output(&mut self, _var: &mut Variable<F>) {}

    /// Record a type-erased external function. The tape owns `data` from now
    /// on and passes it to `release` when the record is discarded.
    ///
    /// While the tape is passive nothing is recorded and `data` is released
    /// immediately.
    pub fn push_external_function_handle(
        &mut self,
        call: ExternalCall<F>,
        data: Box<dyn Any>,
        release: ExternalRelease,
    ) {
        self.push_external(ExternalFunction::new(call, data, release));
    }

    /// Record an external function over concrete data `D`.
    ///
    /// ```
    /// use segtape::{Adjoints, Tape};
    ///
    /// let mut tape = Tape::<f64>::new();
    /// tape.set_active();
    /// let mut x = tape.new_variable(1.0);
    /// tape.register_input(&mut x);
    ///
    /// // d(out)/dx = 4, contributed by the callback
    /// let mut out = tape.new_variable(0.0);
    /// tape.register_input(&mut out);
    /// tape.push_external_function(
    ///     |ids: &mut (u32, u32), adjoints: &mut Adjoints<f64>| {
    ///         let a = adjoints.take(ids.1);
    ///         adjoints.add(ids.0, 4.0 * a);
    ///     },
    ///     (x.index(), out.index()),
    ///     |_| {},
    /// );
    ///
    /// tape.set_gradient(out.index(), 1.0);
    /// tape.evaluate();
    /// assert_eq!(tape.get_gradient(x.index()), 4.0);
    /// ```
    pub fn push_external_function<D: 'static>(
        &mut self,
        call: impl FnMut(&mut D, &mut Adjoints<F>) + 'static,
        data: D,
        release: impl FnOnce(D) + 'static,
    ) {
        self.push_external(ExternalFunction::typed(call, data, release));
    }

    fn push_external(&mut self, mut function: ExternalFunction<F>) {
        if !self.active {
            debug!("external function pushed on a passive tape; releasing its data");
            function.release();
            return;
        }
        self.external.reserve(1);
        let checkpoint = self.jacobians().position();
        self.external.push(ExternalRecord {
            function,
            checkpoint,
        });
    }
}
