use segtape::expression::{add, scale, square, sub, Constant};
use segtape::{ReverseTape, Variable};

// ─── Rosenbrock ────────────────────────────────────────────────────────────

/// Records the extended Rosenbrock function, one statement per temporary.
pub fn rosenbrock<T: ReverseTape<f64>>(tape: &mut T, x: &[Variable<f64>]) -> Variable<f64> {
    let mut sum = Variable::constant(0.0);
    for i in 0..x.len() - 1 {
        let mut t1 = Variable::default();
        tape.store(&mut t1, &sub(Constant(1.0), x[i].term()));
        let mut t2 = Variable::default();
        tape.store(&mut t2, &sub(x[i + 1].term(), square(x[i].term())));
        let rhs = add(sum.term(), add(square(t1.term()), scale(100.0, square(t2.term()))));
        tape.store(&mut sum, &rhs);
        tape.drop_variable(t1);
        tape.drop_variable(t2);
    }
    sum
}

pub fn rosenbrock_f64(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 0..x.len() - 1 {
        let t1 = 1.0 - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum += t1 * t1 + 100.0 * t2 * t2;
    }
    sum
}

// ─── Finite Differences ────────────────────────────────────────────────────

pub fn finite_diff_gradient(f: impl Fn(&[f64]) -> f64, x: &[f64], h: f64) -> Vec<f64> {
    let n = x.len();
    let mut grad = vec![0.0; n];
    for i in 0..n {
        let mut xp = x.to_vec();
        let mut xm = x.to_vec();
        xp[i] += h;
        xm[i] -= h;
        grad[i] = (f(&xp) - f(&xm)) / (2.0 * h);
    }
    grad
}

// ─── Helpers ───────────────────────────────────────────────────────────────

pub fn make_input(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 + 0.01 * i as f64).collect()
}

/// Register `x` as inputs on an active tape.
pub fn register<T: ReverseTape<f64>>(tape: &mut T, x: &[f64]) -> Vec<Variable<f64>> {
    tape.set_active();
    x.iter()
        .map(|&v| {
            let mut var = Variable::constant(v);
            tape.register_input(&mut var);
            var
        })
        .collect()
}
