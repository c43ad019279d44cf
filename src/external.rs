//! User callbacks that take part in the reverse sweep.
//!
//! An external function is recorded at a point of the tape and invoked when
//! the reverse sweep passes that point, after everything recorded later has
//! been distributed and before anything recorded earlier. It owns a piece of
//! data for the lifetime of the record; the release hook gets that data back
//! exactly once, when a reset discards the record or the tape is dropped.

use std::any::Any;
use std::fmt;

use crate::adjoints::Adjoints;
use crate::Float;

/// Callback invoked during the reverse sweep with the record's data.
pub type ExternalCall<F> = Box<dyn FnMut(&mut dyn Any, &mut Adjoints<F>)>;

/// Hook that receives the record's data when the record is discarded.
pub type ExternalRelease = Box<dyn FnOnce(Box<dyn Any>)>;

/// A recorded callback together with the data it owns.
pub struct ExternalFunction<F: Float> {
    call: ExternalCall<F>,
    data: Option<Box<dyn Any>>,
    release: Option<ExternalRelease>,
}

impl<F: Float> ExternalFunction<F> {
    /// Build from type-erased parts.
    pub fn new(call: ExternalCall<F>, data: Box<dyn Any>, release: ExternalRelease) -> Self {
        ExternalFunction {
            call,
            data: Some(data),
            release: Some(release),
        }
    }

    /// Build from a callback and release hook over concrete data `D`.
    pub fn typed<D: 'static>(
        mut call: impl FnMut(&mut D, &mut Adjoints<F>) + 'static,
        data: D,
        release: impl FnOnce(D) + 'static,
    ) -> Self {
        ExternalFunction::new(
            Box::new(move |data: &mut dyn Any, adjoints: &mut Adjoints<F>| {
                if let Some(data) = data.downcast_mut::<D>() {
                    call(data, adjoints);
                }
            }),
            Box::new(data),
            Box::new(move |data: Box<dyn Any>| {
                if let Ok(data) = data.downcast::<D>() {
                    release(*data);
                }
            }),
        )
    }

    /// Run the callback. May happen any number of times.
    #[inline]
    pub(crate) fn evaluate(&mut self, adjoints: &mut Adjoints<F>) {
        if let Some(data) = self.data.as_deref_mut() {
            (self.call)(data, adjoints);
        }
    }

    /// Hand the data to the release hook. Returns `false` if that already
    /// happened.
    pub(crate) fn release(&mut self) -> bool {
        match (self.data.take(), self.release.take()) {
            (Some(data), Some(release)) => {
                release(data);
                true
            }
            _ => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.data.is_none()
    }
}

impl<F: Float> Drop for ExternalFunction<F> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<F: Float> fmt::Debug for ExternalFunction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalFunction")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}
