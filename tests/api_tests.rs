use approx::assert_relative_eq;
use segtape::expression::{add, mul, scale, sin, square, sub, Constant};
use segtape::tape::{with_active_tape, with_tape};
use segtape::{gradient, jacobian, vjp, Tape, Variable};

fn rosenbrock(tape: &mut Tape<f64>, x: &[Variable<f64>]) -> Variable<f64> {
    let mut sum = tape.new_variable(0.0);
    for i in 0..x.len() - 1 {
        let mut t1 = tape.new_variable(0.0);
        tape.store(&mut t1, &sub(Constant(1.0), x[i].term()));
        let mut t2 = tape.new_variable(0.0);
        tape.store(&mut t2, &sub(x[i + 1].term(), square(x[i].term())));
        let rhs = add(sum.term(), add(square(t1.term()), scale(100.0, square(t2.term()))));
        tape.store(&mut sum, &rhs);
        tape.drop_variable(t1);
        tape.drop_variable(t2);
    }
    sum
}

// ── gradient ──

#[test]
fn gradient_sum_of_squares() {
    let g = gradient(
        |tape, x| {
            let mut y = tape.new_variable(0.0);
            tape.store(&mut y, &add(square(x[0].term()), square(x[1].term())));
            y
        },
        &[3.0, 4.0],
    );
    assert_relative_eq!(g[0], 6.0, max_relative = 1e-12);
    assert_relative_eq!(g[1], 8.0, max_relative = 1e-12);
}

#[test]
fn gradient_rosenbrock_2d() {
    let x = [1.5_f64, 2.0];
    let g = gradient(rosenbrock, &x);
    let expected_dx = -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0] * x[0]);
    let expected_dy = 200.0 * (x[1] - x[0] * x[0]);
    assert_relative_eq!(g[0], expected_dx, max_relative = 1e-10);
    assert_relative_eq!(g[1], expected_dy, max_relative = 1e-10);
}

#[test]
fn gradient_rosenbrock_at_minimum() {
    let x = vec![1.0; 10];
    let g = gradient(rosenbrock, &x);
    for gi in &g {
        assert_relative_eq!(*gi, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn gradient_of_constant_output_is_zero() {
    let g = gradient(|tape, _| tape.new_variable(2.0), &[1.0, 2.0]);
    assert_eq!(g, vec![0.0, 0.0]);
}

// ── vjp ──

fn two_outputs(tape: &mut Tape<f64>, x: &[Variable<f64>]) -> Vec<Variable<f64>> {
    // f(x, y) = [x * y, sin(x) + y]
    let mut f0 = tape.new_variable(0.0);
    tape.store(&mut f0, &mul(x[0].term(), x[1].term()));
    let mut f1 = tape.new_variable(0.0);
    tape.store(&mut f1, &add(sin(x[0].term()), x[1].term()));
    vec![f0, f1]
}

#[test]
fn vjp_weights_rows() {
    let x = [0.5, 2.0];
    let (values, g) = vjp(two_outputs, &x, &[2.0, -1.0]);
    assert_relative_eq!(values[0], 1.0);
    assert_relative_eq!(values[1], 0.5f64.sin() + 2.0);
    assert_relative_eq!(g[0], 2.0 * 2.0 - 0.5f64.cos(), max_relative = 1e-12);
    assert_relative_eq!(g[1], 2.0 * 0.5 - 1.0, epsilon = 1e-12);
}

#[test]
fn vjp_with_copied_output() {
    let (_, g) = vjp(
        |tape, x| {
            let mut y = tape.new_variable(0.0);
            tape.store(&mut y, &scale(3.0, x[0].term()));
            let mut z = tape.new_variable(0.0);
            tape.store_copy(&mut z, &y);
            vec![y, z]
        },
        &[1.0],
        &[1.0, 1.0],
    );
    assert_relative_eq!(g[0], 6.0);
}

#[test]
#[should_panic(expected = "w length")]
fn vjp_rejects_mismatched_weights() {
    let _ = vjp(two_outputs, &[0.5, 2.0], &[1.0]);
}

// ── jacobian ──

#[test]
fn jacobian_rows_match_vjp() {
    let x = [0.5, 2.0];
    let (values, jac) = jacobian(two_outputs, &x);
    assert_eq!(values.len(), 2);
    for (i, row) in jac.iter().enumerate() {
        let mut w = [0.0, 0.0];
        w[i] = 1.0;
        let (_, g) = vjp(two_outputs, &x, &w);
        for (a, b) in row.iter().zip(&g) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }
    assert_relative_eq!(jac[0][0], 2.0);
    assert_relative_eq!(jac[1][1], 1.0);
}

// ── thread-local tape ──

#[test]
fn installed_tape_nests_and_restores() {
    let mut outer = Tape::<f64>::new();
    let mut inner = Tape::<f64>::new();
    outer.set_active();
    with_tape(&mut outer, || {
        with_active_tape(|tape: &mut Tape<f64>| {
            let mut x = tape.new_variable(2.0);
            tape.register_input(&mut x);
            let mut y = tape.new_variable(0.0);
            tape.store(&mut y, &square(x.term()));
        });
        with_tape(&mut inner, || {
            with_active_tape(|tape: &mut Tape<f64>| assert!(!tape.is_active()));
        });
        with_active_tape(|tape: &mut Tape<f64>| assert_eq!(tape.used_statements(), 1));
    });
    assert_eq!(outer.used_statements(), 1);
    assert_eq!(inner.used_statements(), 0);
}

#[test]
#[should_panic(expected = "already borrowed")]
fn nested_borrow_of_the_installed_tape_panics() {
    let mut tape = Tape::<f64>::new();
    with_tape(&mut tape, || {
        with_active_tape(|_outer: &mut Tape<f64>| {
            with_active_tape(|_inner: &mut Tape<f64>| ());
        });
    });
}

#[test]
fn slot_is_restored_after_a_panic() {
    let mut tape = Tape::<f64>::new();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        with_tape(&mut tape, || {
            with_active_tape(|_: &mut Tape<f64>| panic!("inside the closure"));
        })
    }));
    assert!(result.is_err());
    let after = std::panic::catch_unwind(|| with_active_tape(|_: &mut Tape<f64>| ()));
    assert!(after.is_err());
}

#[test]
#[should_panic(expected = "no tape installed")]
fn missing_tape_panics() {
    with_active_tape(|tape: &mut Tape<f32>| tape.set_active());
}
