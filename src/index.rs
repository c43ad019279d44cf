//! Identity allocation with a free list.
//!
//! Every differentiable variable carries an [`Index`] naming its adjoint slot.
//! Identities are recycled: a freed identity goes on a free list and is handed
//! out again before the high-water mark grows, which keeps the adjoint vector
//! as small as the number of simultaneously live variables.

use crate::stats::IndexStatistics;

/// Identity of a differentiable variable. `0` means "no derivative".
pub type Index = u32;

/// Sentinel identity of constants and of variables that are not recorded.
pub const PASSIVE: Index = 0;

/// Free-list plus high-water-mark allocator for variable identities.
#[derive(Clone, Debug, Default)]
pub struct IndexAllocator {
    free: Vec<Index>,
    max_issued: Index,
}

impl IndexAllocator {
    /// Create an allocator that has not issued any identity yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a fresh identity to `slot` if it is [`PASSIVE`]; otherwise keep it.
    #[inline]
    pub fn check_index(&mut self, slot: &mut Index) {
        if *slot == PASSIVE {
            *slot = match self.free.pop() {
                Some(index) => index,
                None => self.next_index(),
            };
        }
    }

    /// Return the identity in `slot` to the free list and demote the slot to
    /// [`PASSIVE`].
    ///
    /// The caller guarantees that no entry still to be replayed references the
    /// identity. Identities above [`max_issued`](Self::max_issued) predate the
    /// last [`reset`](Self::reset); they are demoted without entering the free
    /// list.
    #[inline]
    pub fn free_index(&mut self, slot: &mut Index) {
        if *slot != PASSIVE {
            if *slot <= self.max_issued {
                self.free.push(*slot);
            }
            *slot = PASSIVE;
        }
    }

    /// Highest identity ever produced since the last [`reset`](Self::reset).
    #[inline]
    pub fn max_issued(&self) -> Index {
        self.max_issued
    }

    /// Forget every issued identity.
    pub fn reset(&mut self) {
        self.free.clear();
        self.max_issued = PASSIVE;
    }

    /// Counts for diagnostics.
    pub fn statistics(&self) -> IndexStatistics {
        let stored = self.free.len();
        IndexStatistics {
            max_issued: self.max_issued as usize,
            live: (self.max_issued as usize).saturating_sub(stored),
            stored,
            allocated: self.free.capacity(),
            bytes_stored: stored * std::mem::size_of::<Index>(),
            bytes_allocated: self.free.capacity() * std::mem::size_of::<Index>(),
        }
    }

    fn next_index(&mut self) -> Index {
        self.max_issued = match self.max_issued.checked_add(1) {
            Some(next) => next,
            None => panic!("identity space exhausted: more than {} live variables", Index::MAX),
        };
        self.max_issued
    }
}
