//! Segmented tape with identity reuse.
//!
//! The recording is three chained layers:
//!
//! ```text
//! external functions -> jacobian entries -> statements
//! ```
//!
//! A statement stores the identity of the assigned variable and how many
//! jacobian entries (`coefficient`, `input identity`) precede it. External
//! function records store the jacobian position at which they were pushed.
//! Identities come from an [`IndexAllocator`] and are recycled as soon as a
//! variable is overwritten by a constant or dropped, so the adjoint vector only
//! grows with the number of simultaneously live variables.
//!
//! The reverse sweep reads each statement's adjoint, zeroes the slot, and
//! distributes `coefficient * adjoint` to the inputs, stopping at every
//! external function on the way to run its callback.

use crate::adjoints::Adjoints;
use crate::chunk::{Chain, ChainPosition, Terminator};
use crate::config::{Optimizations, TapeConfig};
use crate::error::ConfigError;
use crate::expression::{Expression, Variable};
use crate::external::ExternalFunction;
use crate::index::{Index, IndexAllocator, PASSIVE};
use crate::interface::ReverseTape;
use crate::stats::TapeStatistics;
use crate::Float;

mod recording;
mod reverse;

pub mod thread_local;
pub use self::thread_local::{with_active_tape, with_tape, TapeThreadLocal};

/// Number of jacobian entries of one statement.
pub type ArgCount = u8;

/// A recorded assignment: `lhs` receives `args` jacobian entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Statement {
    pub(crate) args: ArgCount,
    pub(crate) lhs: Index,
}

/// One leaf term of a statement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct JacobiEntry<F> {
    pub(crate) jacobi: F,
    pub(crate) index: Index,
}

/// External function with the jacobian position it was pushed at.
pub(crate) struct ExternalRecord<F: Float> {
    pub(crate) function: ExternalFunction<F>,
    pub(crate) checkpoint: JacobianPosition,
}

pub type StatementPosition = ChainPosition<()>;
pub type JacobianPosition = ChainPosition<StatementPosition>;
/// Checkpoint of a [`Tape`]: external function, jacobian and statement
/// layer positions.
pub type Position = ChainPosition<JacobianPosition>;

pub(crate) type StatementChain = Chain<Statement, Terminator>;
pub(crate) type JacobianChain<F> = Chain<JacobiEntry<F>, StatementChain>;
pub(crate) type ExternalChain<F> = Chain<ExternalRecord<F>, JacobianChain<F>>;

/// Reverse-mode tape with segmented storage and identity reuse.
///
/// Starts passive; nothing is recorded until [`set_active`](Self::set_active).
pub struct Tape<F: Float> {
    external: ExternalChain<F>,
    adjoints: Adjoints<F>,
    indices: IndexAllocator,
    optimizations: Optimizations,
    active: bool,
}

impl<F: Float> Default for Tape<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> Tape<F> {
    /// Create an empty, passive tape with the default configuration.
    pub fn new() -> Self {
        Self::build(&TapeConfig::default())
    }

    /// Create an empty, passive tape.
    pub fn with_config(config: TapeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    fn build(config: &TapeConfig) -> Self {
        let statements = Chain::new(config.statement_segment_size, Terminator);
        let jacobians = Chain::new(config.jacobian_segment_size, statements);
        Tape {
            external: Chain::new(config.external_segment_size, jacobians),
            adjoints: Adjoints::new(),
            indices: IndexAllocator::new(),
            optimizations: config.optimizations,
            active: false,
        }
    }

    #[inline]
    pub(crate) fn jacobians(&self) -> &JacobianChain<F> {
        self.external.inner()
    }

    #[inline]
    pub(crate) fn jacobians_mut(&mut self) -> &mut JacobianChain<F> {
        self.external.inner_mut()
    }

    #[inline]
    pub(crate) fn statements(&self) -> &StatementChain {
        self.external.inner().inner()
    }

    #[inline]
    pub(crate) fn statements_mut(&mut self) -> &mut StatementChain {
        self.external.inner_mut().inner_mut()
    }

    // ── Activity ──

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

    // ── Sizing ──

    pub fn optimizations(&self) -> Optimizations {
        self.optimizations
    }

    pub fn set_optimizations(&mut self, optimizations: Optimizations) {
        self.optimizations = optimizations;
    }

    pub fn set_statement_segment_size(&mut self, size: usize) {
        self.statements_mut().set_segment_size(size);
    }

    pub fn set_jacobian_segment_size(&mut self, size: usize) {
        self.jacobians_mut().set_segment_size(size);
    }

    pub fn set_external_segment_size(&mut self, size: usize) {
        self.external.set_segment_size(size);
    }

    /// Preallocate room for `jacobians` entries and `statements` statements.
    pub fn resize(&mut self, jacobians: usize, statements: usize) {
        self.jacobians_mut().resize(jacobians);
        self.statements_mut().resize(statements);
    }

    /// Preallocate the adjoint vector.
    pub fn set_adjoints_size(&mut self, size: usize) {
        self.adjoints.ensure_len(size);
    }

    // ── Adjoints ──

    /// Adjoint of `index`; zero for identities the vector does not cover.
    #[inline]
    pub fn get_gradient(&self, index: Index) -> F {
        self.adjoints.get(index)
    }

    /// Mutable adjoint of `index`, growing the vector on demand.
    ///
    /// # Panics
    ///
    /// Panics for the passive identity.
    #[inline]
    pub fn gradient(&mut self, index: Index) -> &mut F {
        self.adjoints.get_mut(index)
    }

    /// Set the adjoint of `index`. The passive identity is ignored.
    #[inline]
    pub fn set_gradient(&mut self, index: Index, gradient: F) {
        if index != PASSIVE {
            *self.adjoints.get_mut(index) = gradient;
        }
    }

    pub fn adjoints(&self) -> &Adjoints<F> {
        &self.adjoints
    }

    /// Zero every adjoint without touching the recording.
    pub fn clear_adjoints(&mut self) {
        self.adjoints.clear();
    }

    // ── Diagnostics ──

    #[inline]
    pub fn position(&self) -> Position {
        self.external.position()
    }

    pub fn used_statements(&self) -> usize {
        self.statements().len()
    }

    pub fn used_jacobians(&self) -> usize {
        self.jacobians().len()
    }

    pub fn used_external_functions(&self) -> usize {
        self.external.len()
    }

    /// Adjoint slots a full sweep needs: every issued identity plus slot 0.
    pub fn adjoints_size(&self) -> usize {
        self.indices.max_issued() as usize + 1
    }

    /// Highest identity issued since the last reset.
    pub fn max_issued(&self) -> Index {
        self.indices.max_issued()
    }

    pub fn statistics(&self) -> TapeStatistics {
        TapeStatistics {
            statements: self.statements().statistics(),
            jacobians: self.jacobians().statistics(),
            external_functions: self.external.statistics(),
            adjoints: self.adjoints.statistics(),
            indices: self.indices.statistics(),
        }
    }
}

impl<F: Float> ReverseTape<F> for Tape<F> {
    type Position = Position;

    #[inline]
    fn init_gradient_data(&mut self, value: &mut F, index: &mut Index) {
        Tape::init_gradient_data(self, value, index)
    }

    #[inline]
    fn destroy_gradient_data(&mut self, value: &mut F, index: &mut Index) {
        Tape::destroy_gradient_data(self, value, index)
    }

    #[inline]
    fn store<E: Expression<F>>(&mut self, lhs: &mut Variable<F>, rhs: &E) {
        Tape::store(self, lhs, rhs)
    }

    #[inline]
    fn store_copy(&mut self, lhs: &mut Variable<F>, rhs: &Variable<F>) {
        Tape::store_copy(self, lhs, rhs)
    }

    #[inline]
    fn store_constant(&mut self, lhs: &mut Variable<F>, rhs: F) {
        Tape::store_constant(self, lhs, rhs)
    }

    #[inline]
    fn push_jacobi(&mut self, jacobi: F, value: F, index: Index) {
        Tape::push_jacobi(self, jacobi, value, index)
    }

    #[inline]
    fn push_jacobi_unit(&mut self, value: F, index: Index) {
        Tape::push_jacobi_unit(self, value, index)
    }

    #[inline]
    fn register_input(&mut self, var: &mut Variable<F>) {
        Tape::register_input(self, var)
    }

    #[inline]
    fn register_output(&mut self, var: &mut Variable<F>) {
        Tape::register_output(self, var)
    }

    #[inline]
    fn set_active(&mut self) {
        Tape::set_active(self)
    }

    #[inline]
    fn set_passive(&mut self) {
        Tape::set_passive(self)
    }

    #[inline]
    fn is_active(&self) -> bool {
        Tape::is_active(self)
    }

    #[inline]
    fn position(&self) -> Position {
        Tape::position(self)
    }

    fn reset_to(&mut self, pos: &Position) {
        Tape::reset_to(self, pos)
    }

    fn evaluate_range(&mut self, start: &Position, end: &Position) {
        Tape::evaluate_range(self, start, end)
    }

    #[inline]
    fn get_gradient(&self, index: Index) -> F {
        Tape::get_gradient(self, index)
    }

    #[inline]
    fn gradient(&mut self, index: Index) -> &mut F {
        Tape::gradient(self, index)
    }

    #[inline]
    fn set_gradient(&mut self, index: Index, gradient: F) {
        Tape::set_gradient(self, index, gradient)
    }
}
