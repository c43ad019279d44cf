//! Tape with linearly increasing identities.
//!
//! Every recorded expression gets the next value of an expression counter as
//! its identity, so the adjoint of identity `k` belongs to the `k`-th
//! operator and the replay needs no per-statement left-hand side. Identities
//! are never reused: the adjoint vector grows with the length of the
//! recording rather than with the number of live variables.
//!
//! ```text
//! operators (argument counts) -> jacobian entries -> expression counter
//! ```
//!
//! External functions are not supported on this tape.

use tracing::{debug, trace};

use crate::adjoints::Adjoints;
use crate::chunk::{Chain, ChainPosition, Counter, Nested};
use crate::config::{Optimizations, TapeConfig};
use crate::error::ConfigError;
use crate::expression::{Expression, Variable};
use crate::index::{Index, PASSIVE};
use crate::interface::ReverseTape;
use crate::stats::LinearTapeStatistics;
use crate::tape::{ArgCount, JacobiEntry};
use crate::Float;

/// Checkpoint of a [`LinearTape`]: operator and jacobian layer positions and
/// the expression count.
pub type LinearPosition = ChainPosition<ChainPosition<Index>>;

type DataChain<F> = Chain<JacobiEntry<F>, Counter>;
type OperatorChain<F> = Chain<ArgCount, DataChain<F>>;

/// Reverse-mode tape without identity reuse.
///
/// Starts passive; nothing is recorded until [`set_active`](Self::set_active).
pub struct LinearTape<F: Float> {
    operators: OperatorChain<F>,
    adjoints: Adjoints<F>,
    optimizations: Optimizations,
    active: bool,
}

impl<F: Float> Default for LinearTape<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> LinearTape<F> {
    pub fn new() -> Self {
        Self::build(&TapeConfig::default())
    }

    /// Create an empty, passive tape. The statement segment size applies to
    /// the operator layer; the external segment size is unused.
    pub fn with_config(config: TapeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    fn build(config: &TapeConfig) -> Self {
        let data = Chain::new(config.jacobian_segment_size, Counter::default());
        LinearTape {
            operators: Chain::new(config.statement_segment_size, data),
            adjoints: Adjoints::new(),
            optimizations: config.optimizations,
            active: false,
        }
    }

    #[inline]
    fn data(&self) -> &DataChain<F> {
        self.operators.inner()
    }

    #[inline]
    fn data_mut(&mut self) -> &mut DataChain<F> {
        self.operators.inner_mut()
    }

    /// Push an operator with `args` entries and return its identity.
    fn push_operator(&mut self, args: ArgCount) -> Index {
        self.operators.push(args);
        self.data_mut().inner_mut().next()
    }

    #[inline]
    pub fn set_active(&mut self) {
        self.active = true;
    }

    #[inline]
    pub fn set_passive(&mut self) {
        self.active = false;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn optimizations(&self) -> Optimizations {
        self.optimizations
    }

    pub fn set_optimizations(&mut self, optimizations: Optimizations) {
        self.optimizations = optimizations;
    }

    /// A new passive variable holding `value`.
    pub fn new_variable(&mut self, value: F) -> Variable<F> {
        Variable::constant(value)
    }

    pub fn store<E: Expression<F>>(&mut self, lhs: &mut Variable<F>, rhs: &E) {
        if self.active {
            // inner layers first so a new operator segment captures the
            // jacobian position the statement's entries start at
            self.data_mut().reserve(E::MAX_ACTIVE);
            self.operators.reserve(1);

            let start = self.data().offset();
            rhs.calc_gradient(self);
            let active = self.data().offset() - start;
            lhs.index = if active == 0 {
                PASSIVE
            } else {
                assert!(
                    active <= ArgCount::MAX as usize,
                    "statement with {} active arguments exceeds the limit of {}",
                    active,
                    ArgCount::MAX
                );
                self.push_operator(active as ArgCount)
            };
        } else {
            lhs.index = PASSIVE;
        }
        lhs.value = rhs.value();
    }

    /// Copies share the identity of their source; nothing is recorded.
    pub fn store_copy(&mut self, lhs: &mut Variable<F>, rhs: &Variable<F>) {
        lhs.index = if self.active { rhs.index } else { PASSIVE };
        lhs.value = rhs.value;
    }

    #[inline]
    pub fn store_constant(&mut self, lhs: &mut Variable<F>, rhs: F) {
        lhs.index = PASSIVE;
        lhs.value = rhs;
    }

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
        self.data_mut().push(JacobiEntry { jacobi, index });
    }

    #[inline]
    pub fn push_jacobi_unit(&mut self, _value: F, index: Index) {
        if index != PASSIVE {
            self.data_mut().push(JacobiEntry {
                jacobi: F::one(),
                index,
            });
        }
    }

    /// Give `var` the next identity through an operator without arguments.
    pub fn register_input(&mut self, var: &mut Variable<F>) {
        self.operators.reserve(1);
        var.index = self.push_operator(0);
    }

    #[inline]
    pub fn position(&self) -> LinearPosition {
        self.operators.position()
    }

    /// Identities issued since the last reset.
    pub fn expression_count(&self) -> Index {
        self.data().inner().count()
    }

    pub fn used_operators(&self) -> usize {
        self.operators.len()
    }

    pub fn used_jacobians(&self) -> usize {
        self.data().len()
    }

    pub fn adjoints_size(&self) -> usize {
        self.expression_count() as usize + 1
    }

    #[inline]
    pub fn get_gradient(&self, index: Index) -> F {
        self.adjoints.get(index)
    }

    #[inline]
    pub fn gradient(&mut self, index: Index) -> &mut F {
        self.adjoints.get_mut(index)
    }

    #[inline]
    pub fn set_gradient(&mut self, index: Index, gradient: F) {
        if index != PASSIVE {
            *self.adjoints.get_mut(index) = gradient;
        }
    }

    pub fn clear_adjoints(&mut self) {
        self.adjoints.clear();
    }

    pub fn set_adjoints_size(&mut self, size: usize) {
        self.adjoints.ensure_len(size);
    }

    pub fn statistics(&self) -> LinearTapeStatistics {
        LinearTapeStatistics {
            operators: self.operators.statistics(),
            jacobians: self.data().statistics(),
            adjoints: self.adjoints.statistics(),
            expressions: self.expression_count() as usize,
        }
    }

    /// Propagate adjoints from `start` back to `end`.
    ///
    /// # Panics
    ///
    /// Panics if `start` precedes `end`.
    pub fn evaluate_range(&mut self, start: &LinearPosition, end: &LinearPosition) {
        assert!(
            start >= end,
            "reverse sweep needs start >= end: {:?} < {:?}",
            start,
            end
        );
        let size = self.adjoints_size();
        self.adjoints.ensure_len(size);
        trace!(?start, ?end, "reverse sweep");

        let skip_zero = self.optimizations.skip_zero_adjoints;
        let LinearTape {
            operators,
            adjoints,
            ..
        } = self;
        let data = operators.inner();

        let mut op_pos = start.offset;
        let mut data_cursor = start.inner;
        for seg in (end.segment + 1..=start.segment).rev() {
            let seg_start = *operators.segment_start(seg);
            evaluate_data(
                data,
                &data_cursor,
                &seg_start,
                operators.segment(seg),
                &mut op_pos,
                adjoints,
                skip_zero,
            );
            data_cursor = seg_start;
            op_pos = operators.segment(seg - 1).len();
        }
        evaluate_data(
            data,
            &data_cursor,
            &end.inner,
            operators.segment(end.segment),
            &mut op_pos,
            adjoints,
            skip_zero,
        );
        debug_assert_eq!(op_pos, end.offset, "operator and expression counts disagree");
    }

    pub fn evaluate(&mut self) {
        let start = self.position();
        self.evaluate_range(&start, &LinearPosition::default());
    }

    /// Rewind the recording to `pos` and clear all adjoints.
    pub fn reset_to(&mut self, pos: &LinearPosition) {
        self.adjoints.clear();
        self.operators.reset_to(pos);
        debug!(?pos, "linear tape reset");
    }

    pub fn reset(&mut self) {
        self.reset_to(&LinearPosition::default());
    }
}

/// Sweep the jacobian layer segment by segment; the operators of the range
/// all live in `ops`, ending at `op_pos`.
fn evaluate_data<F: Float>(
    data: &DataChain<F>,
    start: &ChainPosition<Index>,
    end: &ChainPosition<Index>,
    ops: &[ArgCount],
    op_pos: &mut usize,
    adjoints: &mut Adjoints<F>,
    skip_zero: bool,
) {
    let mut adj_pos = start.inner;
    let mut data_pos = start.offset;
    for seg in (end.segment + 1..=start.segment).rev() {
        let seg_start = *data.segment_start(seg);
        evaluate_expressions(
            ops,
            op_pos,
            data.segment(seg),
            data_pos,
            adj_pos,
            seg_start,
            adjoints,
            skip_zero,
        );
        adj_pos = seg_start;
        data_pos = data.segment(seg - 1).len();
    }
    evaluate_expressions(
        ops, op_pos, data.segment(end.segment), data_pos, adj_pos, end.inner, adjoints,
        skip_zero,
    );
}

#[allow(clippy::too_many_arguments)]
#[inline]
fn evaluate_expressions<F: Float>(
    ops: &[ArgCount],
    op_pos: &mut usize,
    entries: &[JacobiEntry<F>],
    mut data_pos: usize,
    mut adj_pos: Index,
    adj_end: Index,
    adjoints: &mut Adjoints<F>,
    skip_zero: bool,
) {
    while adj_pos > adj_end {
        *op_pos -= 1;
        let args = ops[*op_pos] as usize;
        if args > 0 {
            let adj = adjoints.take(adj_pos);
            let first = data_pos - args;
            if !(skip_zero && adj == F::zero()) {
                for entry in entries[first..data_pos].iter().rev() {
                    adjoints[entry.index] = adjoints[entry.index] + entry.jacobi * adj;
                }
            }
            data_pos = first;
        }
        adj_pos -= 1;
    }
}

impl<F: Float> ReverseTape<F> for LinearTape<F> {
    type Position = LinearPosition;

    #[inline]
    fn init_gradient_data(&mut self, _value: &mut F, index: &mut Index) {
        *index = PASSIVE;
    }

    /// Identities are not reused on this tape.
    #[inline]
    fn destroy_gradient_data(&mut self, _value: &mut F, _index: &mut Index) {}

    #[inline]
    fn store<E: Expression<F>>(&mut self, lhs: &mut Variable<F>, rhs: &E) {
        LinearTape::store(self, lhs, rhs)
    }

    #[inline]
    fn store_copy(&mut self, lhs: &mut Variable<F>, rhs: &Variable<F>) {
        LinearTape::store_copy(self, lhs, rhs)
    }

    #[inline]
    fn store_constant(&mut self, lhs: &mut Variable<F>, rhs: F) {
        LinearTape::store_constant(self, lhs, rhs)
    }

    #[inline]
    fn push_jacobi(&mut self, jacobi: F, value: F, index: Index) {
        LinearTape::push_jacobi(self, jacobi, value, index)
    }

    #[inline]
    fn push_jacobi_unit(&mut self, value: F, index: Index) {
        LinearTape::push_jacobi_unit(self, value, index)
    }

    #[inline]
    fn register_input(&mut self, var: &mut Variable<F>) {
        LinearTape::register_input(self, var)
    }

    #[inline]
    fn register_output(&mut self, _var: &mut Variable<F>) {}

    #[inline]
    fn set_active(&mut self) {
        LinearTape::set_active(self)
    }

    #[inline]
    fn set_passive(&mut self) {
        LinearTape::set_passive(self)
    }

    #[inline]
    fn is_active(&self) -> bool {
        LinearTape::is_active(self)
    }

    #[inline]
    fn position(&self) -> LinearPosition {
        LinearTape::position(self)
    }

    fn reset_to(&mut self, pos: &LinearPosition) {
        LinearTape::reset_to(self, pos)
    }

    fn evaluate_range(&mut self, start: &LinearPosition, end: &LinearPosition) {
        LinearTape::evaluate_range(self, start, end)
    }

    #[inline]
    fn get_gradient(&self, index: Index) -> F {
        LinearTape::get_gradient(self, index)
    }

    #[inline]
    fn gradient(&mut self, index: Index) -> &mut F {
        LinearTape::gradient(self, index)
    }

    #[inline]
    fn set_gradient(&mut self, index: Index, gradient: F) {
        LinearTape::set_gradient(self, index, gradient)
    }
}
