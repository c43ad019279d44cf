use approx::assert_relative_eq;
use segtape::expression::{add, cos, div, exp, ln, mul, powi, scale, sin, sqrt, square, sub, Constant};
use segtape::{Optimizations, ReverseTape, Tape, TapeConfig, Variable};

/// Differentiate a single-variable expression built from `x`.
fn reverse_grad<E>(build: impl FnOnce(&Variable<f64>) -> E, x_val: f64) -> f64
where
    E: segtape::Expression<f64>,
{
    let mut tape = Tape::new();
    tape.set_active();
    let mut x = tape.new_variable(x_val);
    tape.register_input(&mut x);
    let mut y = tape.new_variable(0.0);
    let rhs = build(&x);
    tape.store(&mut y, &rhs);
    tape.set_gradient(y.index(), 1.0);
    tape.evaluate();
    tape.get_gradient(x.index())
}

/// Central finite difference for comparison.
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-7;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

/// Extended Rosenbrock function recorded statement by statement.
fn rosenbrock<T: ReverseTape<f64>>(tape: &mut T, x: &[Variable<f64>]) -> Variable<f64> {
    let mut sum = Variable::constant(0.0);
    for i in 0..x.len() - 1 {
        let mut t = Variable::default();
        tape.store(&mut t, &sub(x[i + 1].term(), square(x[i].term())));
        let mut u = Variable::default();
        tape.store(&mut u, &sub(Constant(1.0), x[i].term()));
        let rhs = add(sum.term(), add(square(u.term()), scale(100.0, square(t.term()))));
        tape.store(&mut sum, &rhs);
    }
    sum
}

fn rosenbrock_grad(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    (0..n)
        .map(|i| {
            let mut g = 0.0;
            if i + 1 < n {
                g += -2.0 * (1.0 - x[i]) - 400.0 * x[i] * (x[i + 1] - x[i] * x[i]);
            }
            if i > 0 {
                g += 200.0 * (x[i] - x[i - 1] * x[i - 1]);
            }
            g
        })
        .collect()
}

fn record_inputs(tape: &mut Tape<f64>, x: &[f64]) -> Vec<Variable<f64>> {
    x.iter()
        .map(|&v| {
            let mut var = tape.new_variable(v);
            tape.register_input(&mut var);
            var
        })
        .collect()
}

fn rosenbrock_on(config: TapeConfig, x: &[f64]) -> Vec<f64> {
    let mut tape = Tape::with_config(config).unwrap();
    tape.set_active();
    let inputs = record_inputs(&mut tape, x);
    let y = rosenbrock(&mut tape, &inputs);
    tape.set_gradient(y.index(), 1.0);
    tape.evaluate();
    inputs.iter().map(|v| tape.get_gradient(v.index())).collect()
}

// ── Scenarios ──

#[test]
fn weighted_sum() {
    let mut tape = Tape::new();
    tape.set_active();
    let mut x1 = tape.new_variable(5.0);
    let mut x2 = tape.new_variable(7.0);
    tape.register_input(&mut x1);
    tape.register_input(&mut x2);

    let mut y = tape.new_variable(0.0);
    tape.store(&mut y, &add(scale(2.0, x1.term()), scale(3.0, x2.term())));
    assert_eq!(tape.used_statements(), 1);
    assert_eq!(tape.used_jacobians(), 2);

    tape.set_gradient(y.index(), 1.0);
    tape.evaluate();
    assert_relative_eq!(tape.get_gradient(x1.index()), 2.0);
    assert_relative_eq!(tape.get_gradient(x2.index()), 3.0);
    // consumed by the sweep
    assert_eq!(tape.get_gradient(y.index()), 0.0);
}

#[test]
fn product_and_square_agree() {
    let mut tape = Tape::new();
    tape.set_active();
    let mut x = tape.new_variable(4.0);
    tape.register_input(&mut x);

    let mut z = tape.new_variable(0.0);
    tape.store(&mut z, &mul(x.term(), x.term()));
    let mut w = tape.new_variable(0.0);
    tape.store(&mut w, &square(x.term()));
    // the product reports x twice, the square once
    assert_eq!(tape.used_jacobians(), 3);

    tape.set_gradient(z.index(), 1.0);
    tape.evaluate();
    assert_relative_eq!(tape.get_gradient(x.index()), 8.0);

    tape.clear_adjoints();
    tape.set_gradient(w.index(), 1.0);
    tape.evaluate();
    assert_relative_eq!(tape.get_gradient(x.index()), 8.0);
}

#[test]
fn chain_rule_through_statements() {
    // a = x * y; b = sin(a); c = b + 3y  =>  dc/dx = cos(xy) y, dc/dy = cos(xy) x + 3
    let (xv, yv): (f64, f64) = (0.7, 1.3);
    let mut tape = Tape::new();
    tape.set_active();
    let mut x = tape.new_variable(xv);
    let mut y = tape.new_variable(yv);
    tape.register_input(&mut x);
    tape.register_input(&mut y);

    let mut a = tape.new_variable(0.0);
    tape.store(&mut a, &mul(x.term(), y.term()));
    let mut b = tape.new_variable(0.0);
    tape.store(&mut b, &sin(a.term()));
    let mut c = tape.new_variable(0.0);
    tape.store(&mut c, &add(b.term(), scale(3.0, y.term())));
    assert_eq!(tape.used_statements(), 3);

    tape.set_gradient(c.index(), 1.0);
    tape.evaluate();
    let ca = (xv * yv).cos();
    assert_relative_eq!(tape.get_gradient(x.index()), ca * yv, max_relative = 1e-12);
    assert_relative_eq!(tape.get_gradient(y.index()), ca * xv + 3.0, max_relative = 1e-12);
}

#[test]
fn self_assignment_uses_the_old_value() {
    let mut tape = Tape::new();
    tape.set_active();
    let mut x = tape.new_variable(3.0);
    tape.register_input(&mut x);
    let mut y = tape.new_variable(0.0);
    tape.store_copy(&mut y, &x);
    for _ in 0..3 {
        let rhs = mul(y.term(), x.term());
        tape.store(&mut y, &rhs);
    }
    // y = x^4
    assert_relative_eq!(y.value(), 81.0);
    tape.set_gradient(y.index(), 1.0);
    tape.evaluate();
    assert_relative_eq!(tape.get_gradient(x.index()), 4.0 * 27.0, max_relative = 1e-12);
}

// ── Elementals ──

fn check_elemental(grad: f64, f: impl Fn(f64) -> f64, x: f64) {
    assert_relative_eq!(grad, finite_diff(f, x), max_relative = 1e-6);
}

#[test]
fn elementals_match_finite_differences() {
    let x = 0.8;
    check_elemental(reverse_grad(|v| sin(v.term()), x), f64::sin, x);
    check_elemental(reverse_grad(|v| cos(v.term()), x), f64::cos, x);
    check_elemental(reverse_grad(|v| exp(v.term()), x), f64::exp, x);
    check_elemental(reverse_grad(|v| ln(v.term()), x), f64::ln, x);
    check_elemental(reverse_grad(|v| sqrt(v.term()), x), f64::sqrt, x);
    check_elemental(reverse_grad(|v| powi(v.term(), 3), x), |t| t.powi(3), x);
    check_elemental(reverse_grad(|v| div(Constant(1.0), v.term()), x), |t| 1.0 / t, x);
    check_elemental(
        reverse_grad(|v| exp(sin(mul(v.term(), v.term()))), x),
        |t| (t * t).sin().exp(),
        x,
    );
}

#[test]
fn constant_expression_records_nothing() {
    let mut tape = Tape::new();
    tape.set_active();
    let mut x = tape.new_variable(2.0);
    tape.register_input(&mut x);
    let mut y = tape.new_variable(0.0);
    tape.store(&mut y, &scale(2.0, x.term()));
    assert!(y.is_active());

    tape.store(&mut y, &add(Constant(1.0), Constant(2.0)));
    assert!(!y.is_active());
    assert_relative_eq!(y.value(), 3.0);
    assert_eq!(tape.used_statements(), 1);
}

#[test]
fn passive_recording_is_ignored() {
    let mut tape = Tape::new();
    let mut x = tape.new_variable(2.0);
    tape.register_input(&mut x);
    let mut y = tape.new_variable(0.0);
    tape.store(&mut y, &square(x.term()));
    assert!(!y.is_active());
    assert_relative_eq!(y.value(), 4.0);
    assert_eq!(tape.used_statements(), 0);
    assert_eq!(tape.used_jacobians(), 0);
}

// ── Sweep properties ──

#[test]
fn second_sweep_is_idempotent() {
    let x = [1.2, 0.8, -0.5];
    let mut tape = Tape::new();
    tape.set_active();
    let inputs = record_inputs(&mut tape, &x);
    let y = rosenbrock(&mut tape, &inputs);

    tape.set_gradient(y.index(), 1.0);
    tape.evaluate();
    let first: Vec<f64> = inputs.iter().map(|v| tape.get_gradient(v.index())).collect();

    tape.evaluate();
    let second: Vec<f64> = inputs.iter().map(|v| tape.get_gradient(v.index())).collect();
    assert_eq!(first, second);
}

#[test]
fn rosenbrock_matches_analytic_gradient() {
    let x = [1.2, 0.8, -0.5, 2.0, 0.3];
    let grad = rosenbrock_on(TapeConfig::default(), &x);
    for (g, e) in grad.iter().zip(rosenbrock_grad(&x)) {
        assert_relative_eq!(*g, e, max_relative = 1e-12);
    }
}

#[test]
fn split_sweep_equals_full_sweep() {
    let x = [1.2, 0.8, -0.5, 2.0];
    let mut tape = Tape::with_config(TapeConfig::with_segment_size(3)).unwrap();
    tape.set_active();
    let inputs = record_inputs(&mut tape, &x);
    let p1 = tape.position();
    let half = rosenbrock(&mut tape, &inputs[..2]);
    let p2 = tape.position();
    let mut y = rosenbrock(&mut tape, &inputs[1..]);
    let rhs = add(y.term(), half.term());
    tape.store(&mut y, &rhs);
    let p3 = tape.position();

    tape.set_gradient(y.index(), 1.0);
    tape.evaluate_range(&p3, &p1);
    let full: Vec<f64> = inputs.iter().map(|v| tape.get_gradient(v.index())).collect();

    tape.clear_adjoints();
    tape.set_gradient(y.index(), 1.0);
    tape.evaluate_range(&p3, &p2);
    tape.evaluate_range(&p2, &p1);
    let split: Vec<f64> = inputs.iter().map(|v| tape.get_gradient(v.index())).collect();

    assert_eq!(full, split);
}

#[test]
#[should_panic(expected = "start >= end")]
fn inverted_range_is_rejected() {
    let mut tape = Tape::<f64>::new();
    tape.set_active();
    let begin = tape.position();
    let mut x = tape.new_variable(1.0);
    tape.register_input(&mut x);
    let mut y = tape.new_variable(0.0);
    tape.store(&mut y, &square(x.term()));
    let end = tape.position();
    tape.evaluate_range(&begin, &end);
}

#[test]
fn segment_size_does_not_change_results() {
    let x = [1.2, 0.8, -0.5, 2.0, 0.3, -1.1];
    let tiny = rosenbrock_on(TapeConfig::with_segment_size(1), &x);
    let large = rosenbrock_on(TapeConfig::with_segment_size(10_000), &x);
    assert_eq!(tiny, large);
}

#[test]
fn filters_do_not_change_results() {
    let x = [1.0, 1.0, 0.0, 2.0];
    let on = rosenbrock_on(TapeConfig::default(), &x);
    let off = rosenbrock_on(
        TapeConfig {
            optimizations: Optimizations::none(),
            ..TapeConfig::default()
        },
        &x,
    );
    assert_eq!(on, off);
}

#[test]
fn zero_jacobians_are_filtered() {
    let mut tape = Tape::new();
    tape.set_active();
    let mut x = tape.new_variable(0.0);
    tape.register_input(&mut x);
    let mut y = tape.new_variable(0.0);
    // d(x^2)/dx = 0 at x = 0
    tape.store(&mut y, &square(x.term()));
    assert_eq!(tape.used_jacobians(), 0);
    assert!(!y.is_active());

    tape.set_optimizations(Optimizations::none());
    tape.store(&mut y, &square(x.term()));
    assert_eq!(tape.used_jacobians(), 1);
    assert!(y.is_active());
}

#[test]
fn invalid_jacobians_are_filtered() {
    let mut tape = Tape::new();
    tape.set_active();
    let mut x = tape.new_variable(0.0);
    tape.register_input(&mut x);
    let mut y = tape.new_variable(0.0);
    tape.store(&mut y, &sqrt(x.term()));
    assert_eq!(tape.used_jacobians(), 0);
}

#[test]
fn manual_statement() {
    let mut tape = Tape::new();
    tape.set_active();
    let mut x1 = tape.new_variable(2.0);
    let mut x2 = tape.new_variable(5.0);
    tape.register_input(&mut x1);
    tape.register_input(&mut x2);

    // y = x1 * x2 with hand-computed partials
    let mut y = segtape::PASSIVE;
    tape.store_manual(&mut y, 2);
    tape.push_jacobi_manual(5.0, x1.index());
    tape.push_jacobi_manual(2.0, x2.index());

    tape.set_gradient(y, 1.0);
    tape.evaluate();
    assert_relative_eq!(tape.get_gradient(x1.index()), 5.0);
    assert_relative_eq!(tape.get_gradient(x2.index()), 2.0);
}

#[test]
fn f32_tape() {
    let mut tape = Tape::<f32>::new();
    tape.set_active();
    let mut x = tape.new_variable(3.0);
    tape.register_input(&mut x);
    let mut y = tape.new_variable(0.0);
    tape.store(&mut y, &mul(x.term(), exp(Constant(0.0))));
    tape.set_gradient(y.index(), 1.0);
    tape.evaluate();
    assert_relative_eq!(tape.get_gradient(x.index()), 1.0f32);
}
