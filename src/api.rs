//! One-call drivers: record on a fresh tape, seed, sweep, collect.

use crate::expression::Variable;
use crate::float::Float;
use crate::tape::Tape;

fn record_inputs<F: Float>(tape: &mut Tape<F>, x: &[F]) -> Vec<Variable<F>> {
    tape.set_active();
    x.iter()
        .map(|&val| {
            let mut var = tape.new_variable(val);
            tape.register_input(&mut var);
            var
        })
        .collect()
}

/// Compute the gradient of a scalar function `f : R^n → R` using reverse mode.
///
/// `f` records its computation on the tape it is given.
///
/// ```
/// use segtape::expression::{add, square};
///
/// let g = segtape::gradient(|tape, x| {
///     let mut y = tape.new_variable(0.0);
///     tape.store(&mut y, &add(square(x[0].term()), square(x[1].term())));
///     y
/// }, &[3.0_f64, 4.0]);
/// assert!((g[0] - 6.0).abs() < 1e-10);
/// assert!((g[1] - 8.0).abs() < 1e-10);
/// ```
pub fn gradient<F: Float>(
    f: impl FnOnce(&mut Tape<F>, &[Variable<F>]) -> Variable<F>,
    x: &[F],
) -> Vec<F> {
    let mut tape = Tape::new();
    let inputs = record_inputs(&mut tape, x);
    let output = f(&mut tape, &inputs);
    tape.set_passive();

    tape.set_gradient(output.index(), F::one());
    tape.evaluate();
    inputs.iter().map(|v| tape.get_gradient(v.index())).collect()
}

/// Vector-Jacobian product (reverse mode): `(f(x), wᵀ·J)`.
///
/// Evaluates `f` at `x` and computes the adjoint product with weights `w`.
pub fn vjp<F: Float>(
    f: impl FnOnce(&mut Tape<F>, &[Variable<F>]) -> Vec<Variable<F>>,
    x: &[F],
    w: &[F],
) -> (Vec<F>, Vec<F>) {
    let mut tape = Tape::new();
    let inputs = record_inputs(&mut tape, x);
    let outputs = f(&mut tape, &inputs);
    tape.set_passive();
    assert_eq!(
        outputs.len(),
        w.len(),
        "w length must match the number of outputs"
    );

    // outputs may share an identity, so seeds accumulate
    for (out, &wi) in outputs.iter().zip(w) {
        if out.is_active() {
            let seed = tape.gradient(out.index());
            *seed = *seed + wi;
        }
    }
    tape.evaluate();

    let values = outputs.iter().map(|v| v.value()).collect();
    let grad = inputs.iter().map(|v| tape.get_gradient(v.index())).collect();
    (values, grad)
}

/// Jacobian of `f : R^n → R^m`, one reverse sweep per output.
///
/// Returns `(f(x), J)` where `J[i][j] = ∂f_i/∂x_j`.
pub fn jacobian<F: Float>(
    f: impl FnOnce(&mut Tape<F>, &[Variable<F>]) -> Vec<Variable<F>>,
    x: &[F],
) -> (Vec<F>, Vec<Vec<F>>) {
    let mut tape = Tape::new();
    let inputs = record_inputs(&mut tape, x);
    let outputs = f(&mut tape, &inputs);
    tape.set_passive();

    let values = outputs.iter().map(|v| v.value()).collect();
    let rows = outputs
        .iter()
        .map(|out| {
            tape.clear_adjoints();
            tape.set_gradient(out.index(), F::one());
            tape.evaluate();
            inputs.iter().map(|v| tape.get_gradient(v.index())).collect()
        })
        .collect();
    (values, rows)
}
