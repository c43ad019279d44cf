//! Adjoint vector indexed by variable identity.
//!
//! Reads past the end yield zero; writes grow the vector on demand.

use std::ops::{Index as IndexOp, IndexMut};

use tracing::trace;

use crate::index::{Index, PASSIVE};
use crate::stats::AdjointStatistics;
use crate::Float;

/// Dense identity -> adjoint map, grown on demand.
///
/// Slot `0` belongs to the passive identity and never receives contributions.
/// External function callbacks get `&mut Adjoints` during the reverse sweep
/// and accumulate into the identities they own.
#[derive(Clone, Debug, Default)]
pub struct Adjoints<F: Float> {
    values: Vec<F>,
}

impl<F: Float> Adjoints<F> {
    pub fn new() -> Self {
        Adjoints { values: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Grow (never shrink) to `len` slots; new slots are zero.
    pub fn ensure_len(&mut self, len: usize) {
        if self.values.len() < len {
            trace!(from = self.values.len(), to = len, "growing adjoint vector");
            self.values.resize(len, F::zero());
        }
    }

    /// Adjoint of `index`, zero if it lies beyond the vector.
    #[inline]
    pub fn get(&self, index: Index) -> F {
        self.values
            .get(index as usize)
            .copied()
            .unwrap_or_else(F::zero)
    }

    /// Mutable adjoint of `index`, growing the vector if needed.
    ///
    /// # Panics
    ///
    /// Panics for the passive identity.
    #[inline]
    pub fn get_mut(&mut self, index: Index) -> &mut F {
        assert!(index != PASSIVE, "the passive identity has no adjoint slot");
        self.ensure_len(index as usize + 1);
        &mut self.values[index as usize]
    }

    /// `adjoint[index] += value`, ignoring the passive identity.
    #[inline]
    pub fn add(&mut self, index: Index, value: F) {
        if index != PASSIVE {
            let slot = self.get_mut(index);
            *slot = *slot + value;
        }
    }

    /// Read the adjoint of `index` and zero its slot.
    #[inline]
    pub fn take(&mut self, index: Index) -> F {
        match self.values.get_mut(index as usize) {
            Some(slot) => std::mem::replace(slot, F::zero()),
            None => F::zero(),
        }
    }

    /// Zero every slot, keeping the allocation.
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = F::zero());
    }

    #[inline]
    pub fn as_slice(&self) -> &[F] {
        &self.values
    }

    pub fn statistics(&self) -> AdjointStatistics {
        AdjointStatistics {
            len: self.values.len(),
            allocated_bytes: self.values.capacity() * std::mem::size_of::<F>(),
        }
    }
}

/// Unchecked-growth indexing for the reverse sweep, where the vector was
/// sized before the walk started.
impl<F: Float> IndexOp<Index> for Adjoints<F> {
    type Output = F;

    #[inline]
    fn index(&self, index: Index) -> &F {
        &self.values[index as usize]
    }
}

impl<F: Float> IndexMut<Index> for Adjoints<F> {
    #[inline]
    fn index_mut(&mut self, index: Index) -> &mut F {
        &mut self.values[index as usize]
    }
}
