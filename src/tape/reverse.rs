//! Reverse sweep and rewinding.

use tracing::{debug, trace};

use crate::adjoints::Adjoints;
use crate::chunk::Nested;
use crate::Float;

use super::{
    JacobiEntry, JacobianChain, JacobianPosition, Position, Statement, StatementChain,
    StatementPosition, Tape,
};

impl<F: Float> Tape<F> {
    /// Propagate adjoints from `start` back to `end`.
    ///
    /// Seed the adjoints of the outputs first, e.g. with
    /// [`set_gradient`](Self::set_gradient). External functions recorded in the
    /// range run at their recorded place.
    ///
    /// # Panics
    ///
    /// Panics if `start` precedes `end`.
    pub fn evaluate_range(&mut self, start: &Position, end: &Position) {
        assert!(
            start >= end,
            "reverse sweep needs start >= end: {:?} < {:?}",
            start,
            end
        );
        self.adjoints
            .ensure_len(self.indices.max_issued() as usize + 1);
        trace!(?start, ?end, "reverse sweep");

        let skip_zero = self.optimizations.skip_zero_adjoints;
        let Tape {
            external, adjoints, ..
        } = self;

        let mut cursor = start.inner;
        external.for_each_rev(start, end, |record, jacobians| {
            evaluate_jacobians(jacobians, &cursor, &record.checkpoint, adjoints, skip_zero);
            record.function.evaluate(adjoints);
            cursor = record.checkpoint;
        });
        evaluate_jacobians(external.inner(), &cursor, &end.inner, adjoints, skip_zero);
    }

    /// Propagate adjoints over the whole recording.
    pub fn evaluate(&mut self) {
        let start = self.position();
        self.evaluate_range(&start, &Position::default());
    }

    /// Rewind the recording to `pos`.
    ///
    /// Clears all adjoints, releases the data of every external function
    /// recorded after `pos`, truncates all layers and resets the identity
    /// allocator, which invalidates every identity issued so far. Old
    /// variables handed to [`drop_variable`](Self::drop_variable) right after
    /// the reset are demoted without being recycled.
    pub fn reset_to(&mut self, pos: &Position) {
        if *pos != Position::default() {
            // entries before `pos` survive with their identities
            self.adjoints
                .ensure_len(self.indices.max_issued() as usize + 1);
        }
        self.adjoints.clear();

        let end = self.external.position();
        let mut released = 0usize;
        self.external.for_each_rev(&end, pos, |record, _| {
            if record.function.release() {
                released += 1;
            }
        });
        self.external.reset_to(pos);
        self.indices.reset();
        debug!(?pos, released, "tape reset");
    }

    /// Rewind the whole recording.
    pub fn reset(&mut self) {
        self.reset_to(&Position::default());
    }
}

/// Sweep the jacobian layer from `start` back to `end`, one segment at a time.
fn evaluate_jacobians<F: Float>(
    jacobians: &JacobianChain<F>,
    start: &JacobianPosition,
    end: &JacobianPosition,
    adjoints: &mut Adjoints<F>,
    skip_zero: bool,
) {
    let statements = jacobians.inner();
    let mut data_pos = start.offset;
    let mut stmt_cursor = start.inner;

    for seg in (end.segment + 1..=start.segment).rev() {
        let seg_start = *jacobians.segment_start(seg);
        evaluate_statements(
            statements,
            &stmt_cursor,
            &seg_start,
            jacobians.segment(seg),
            &mut data_pos,
            adjoints,
            skip_zero,
        );
        stmt_cursor = seg_start;
        data_pos = jacobians.segment(seg - 1).len();
    }

    // also covers start and end in the same segment
    evaluate_statements(
        statements,
        &stmt_cursor,
        &end.inner,
        jacobians.segment(end.segment),
        &mut data_pos,
        adjoints,
        skip_zero,
    );
    debug_assert_eq!(data_pos, end.offset, "statement and jacobian counts disagree");
}

/// Sweep the statements between two positions; their jacobians all live in
/// `entries`, ending at `data_pos`.
fn evaluate_statements<F: Float>(
    statements: &StatementChain,
    start: &StatementPosition,
    end: &StatementPosition,
    entries: &[JacobiEntry<F>],
    data_pos: &mut usize,
    adjoints: &mut Adjoints<F>,
    skip_zero: bool,
) {
    let mut stmt_pos = start.offset;
    for seg in (end.segment + 1..=start.segment).rev() {
        evaluate_expressions(
            &statements.segment(seg)[..stmt_pos],
            entries,
            data_pos,
            adjoints,
            skip_zero,
        );
        stmt_pos = statements.segment(seg - 1).len();
    }
    evaluate_expressions(
        &statements.segment(end.segment)[end.offset..stmt_pos],
        entries,
        data_pos,
        adjoints,
        skip_zero,
    );
}

#[inline]
fn evaluate_expressions<F: Float>(
    statements: &[Statement],
    entries: &[JacobiEntry<F>],
    data_pos: &mut usize,
    adjoints: &mut Adjoints<F>,
    skip_zero: bool,
) {
    for stmt in statements.iter().rev() {
        let adj = adjoints.take(stmt.lhs);
        let args = stmt.args as usize;
        let first = *data_pos - args;
        if !(skip_zero && adj == F::zero()) {
            for entry in entries[first..*data_pos].iter().rev() {
                adjoints[entry.index] = adjoints[entry.index] + entry.jacobi * adj;
            }
        }
        *data_pos = first;
    }
}
