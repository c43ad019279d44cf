//! Implicit per-thread default tape.
//!
//! Everything in this crate takes the tape explicitly. Code that prefers one
//! ambient tape per float type, the way a differentiable scalar wrapper
//! would use it, installs a tape for the duration of a closure with
//! [`with_tape`] and reaches it from inside through [`with_active_tape`].
//! Installations nest; the previous tape comes back when the closure returns
//! or unwinds.

use std::cell::Cell;
use std::thread::LocalKey;

use crate::Float;

use super::Tape;

thread_local! {
    static TAPE_F32: Cell<*mut Tape<f32>> = const { Cell::new(std::ptr::null_mut()) };
    static TAPE_F64: Cell<*mut Tape<f64>> = const { Cell::new(std::ptr::null_mut()) };
}

/// Selects the thread-local slot for a float type.
pub trait TapeThreadLocal: Float {
    fn cell() -> &'static LocalKey<Cell<*mut Tape<Self>>>;
}

impl TapeThreadLocal for f32 {
    fn cell() -> &'static LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F32
    }
}

impl TapeThreadLocal for f64 {
    fn cell() -> &'static LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F64
    }
}

/// Puts `prev` back into the slot on drop, including during unwinding.
struct Restore<F: TapeThreadLocal> {
    prev: *mut Tape<F>,
}

impl<F: TapeThreadLocal> Restore<F> {
    fn swap(ptr: *mut Tape<F>) -> Self {
        let prev = F::cell().with(|cell| cell.replace(ptr));
        Restore { prev }
    }
}

impl<F: TapeThreadLocal> Drop for Restore<F> {
    fn drop(&mut self) {
        let prev = self.prev;
        F::cell().with(|cell| cell.set(prev));
    }
}

/// Install `tape` as this thread's default for `F` while `f` runs.
///
/// ```
/// use segtape::expression::square;
/// use segtape::tape::{with_active_tape, with_tape};
/// use segtape::Tape;
///
/// let mut tape = Tape::<f64>::new();
/// tape.set_active();
/// with_tape(&mut tape, || {
///     with_active_tape(|tape: &mut Tape<f64>| {
///         let mut x = tape.new_variable(2.0);
///         tape.register_input(&mut x);
///         let mut y = tape.new_variable(0.0);
///         tape.store(&mut y, &square(x.term()));
///     });
/// });
/// assert_eq!(tape.used_statements(), 1);
/// ```
pub fn with_tape<F: TapeThreadLocal, R>(tape: &mut Tape<F>, f: impl FnOnce() -> R) -> R {
    let _restore = Restore::swap(tape as *mut Tape<F>);
    f()
}

/// Run `f` on the tape installed for `F` on this thread.
///
/// The tape is taken out of the slot while `f` runs.
///
/// # Panics
///
/// Panics if no tape is installed, or if it is already lent out to an
/// enclosing `with_active_tape` call.
pub fn with_active_tape<F: TapeThreadLocal, R>(f: impl FnOnce(&mut Tape<F>) -> R) -> R {
    let restore = Restore::swap(std::ptr::null_mut());
    assert!(
        !restore.prev.is_null(),
        "no tape installed for this thread, or it is already borrowed by an enclosing with_active_tape"
    );
    // SAFETY: the pointer was installed by `with_tape` from a unique borrow
    // that outlives this call, since `with_tape` restores the slot before it
    // returns. The slot stays null while `tape` is alive, so no second
    // reference can be handed out.
    let tape = unsafe { &mut *restore.prev };
    f(tape)
}
