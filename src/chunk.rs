//! Chained, segmented append-only buffers.
//!
//! A [`Chain`] stores records in fixed-capacity segments and grows by adding
//! segments, so appending never moves recorded data. Each chain owns the next
//! finer-grained layer (`inner`) and every segment remembers where that inner
//! layer stood when the segment became current. Positions are therefore
//! composite: one `(segment, offset)` pair per layer, nested down to a
//! terminator. The nesting depth is fixed by the types, e.g.
//! `ChainPosition<ChainPosition<()>>` for a two-layer chain.
//!
//! Spare segments are kept after a reset and reused on the next growth.

use std::fmt::Debug;

use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::index::Index;
use crate::stats::LayerStatistics;

/// A layer that can sit inside a [`Chain`].
pub trait Nested {
    /// Composite position of this layer and everything nested in it.
    type Position: Copy + Debug + Default + Ord;

    /// Current end of the recording in this layer.
    fn position(&self) -> Self::Position;

    /// Truncate this layer (and the layers it owns) back to `pos`.
    fn reset_to(&mut self, pos: &Self::Position);
}

/// Innermost layer with nothing to record.
#[derive(Clone, Copy, Debug, Default)]
pub struct Terminator;

impl Nested for Terminator {
    type Position = ();

    #[inline]
    fn position(&self) {}

    #[inline]
    fn reset_to(&mut self, _pos: &()) {}
}

/// Innermost layer that counts recorded expressions.
///
/// The count doubles as the identity of the last recorded expression.
#[derive(Clone, Copy, Debug, Default)]
pub struct Counter {
    count: Index,
}

impl Counter {
    #[inline]
    pub fn count(&self) -> Index {
        self.count
    }

    /// Advance the counter and return the new identity.
    #[inline]
    pub fn next(&mut self) -> Index {
        self.count = match self.count.checked_add(1) {
            Some(next) => next,
            None => panic!("identity space exhausted: more than {} expressions", Index::MAX),
        };
        self.count
    }
}

impl Nested for Counter {
    type Position = Index;

    #[inline]
    fn position(&self) -> Index {
        self.count
    }

    #[inline]
    fn reset_to(&mut self, pos: &Index) {
        assert!(
            *pos <= self.count,
            "cannot reset expression counter forward: {} > {}",
            pos,
            self.count
        );
        self.count = *pos;
    }
}

/// Position inside a [`Chain`]: segment, offset in that segment, and the
/// position of the inner layer.
///
/// The derived ordering is lexicographic, which matches recording order: a
/// position taken later never compares less than one taken earlier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainPosition<P> {
    pub segment: usize,
    pub offset: usize,
    pub inner: P,
}

struct Segment<T, P> {
    items: Vec<T>,
    capacity: usize,
    /// Inner position when this segment became current.
    start: P,
}

impl<T, P> Segment<T, P> {
    fn new(capacity: usize, start: P) -> Self {
        Segment {
            items: Vec::with_capacity(capacity),
            capacity,
            start,
        }
    }

    #[inline]
    fn room(&self) -> usize {
        self.capacity - self.items.len()
    }
}

/// Segmented append-only buffer owning the next layer of the chain.
pub struct Chain<T, I: Nested> {
    segments: Vec<Segment<T, I::Position>>,
    current: usize,
    segment_size: usize,
    inner: I,
}

impl<T, I: Nested> Chain<T, I> {
    /// Create a chain with one empty segment of `segment_size` records.
    pub fn new(segment_size: usize, inner: I) -> Self {
        assert!(segment_size > 0, "segment size must be positive");
        let start = inner.position();
        Chain {
            segments: vec![Segment::new(segment_size, start)],
            current: 0,
            segment_size,
            inner,
        }
    }

    #[inline]
    pub fn inner(&self) -> &I {
        &self.inner
    }

    #[inline]
    pub fn inner_mut(&mut self) -> &mut I {
        &mut self.inner
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Capacity of segments allocated from now on. Existing segments keep
    /// their size.
    pub fn set_segment_size(&mut self, segment_size: usize) {
        assert!(segment_size > 0, "segment size must be positive");
        self.segment_size = segment_size;
    }

    /// Make sure the current segment can take `n` more records.
    #[inline]
    pub fn reserve(&mut self, n: usize) {
        if self.segments[self.current].room() < n {
            self.next_segment(n);
        }
    }

    fn next_segment(&mut self, n: usize) {
        let start = self.inner.position();
        let capacity = self.segment_size.max(n);
        self.current += 1;
        match self.segments.get_mut(self.current) {
            Some(spare) if spare.capacity >= n => {
                spare.items.clear();
                spare.start = start;
            }
            Some(spare) => {
                trace!(segment = self.current, capacity, "replacing undersized spare segment");
                *spare = Segment::new(capacity, start);
            }
            None => {
                trace!(segment = self.current, capacity, "allocating tape segment");
                self.segments.push(Segment::new(capacity, start));
            }
        }
    }

    /// Append a record. Room must have been [`reserve`](Self::reserve)d.
    #[inline]
    pub fn push(&mut self, item: T) {
        let segment = &mut self.segments[self.current];
        assert!(
            segment.items.len() < segment.capacity,
            "segment overflow: push of more records than reserved"
        );
        segment.items.push(item);
    }

    /// Offset of the next record inside the current segment.
    #[inline]
    pub fn offset(&self) -> usize {
        self.segments[self.current].items.len()
    }

    #[inline]
    pub fn position(&self) -> ChainPosition<I::Position> {
        ChainPosition {
            segment: self.current,
            offset: self.offset(),
            inner: self.inner.position(),
        }
    }

    /// Number of records stored.
    pub fn len(&self) -> usize {
        self.segments[..=self.current]
            .iter()
            .map(|s| s.items.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated segments, spare ones included.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Index of the segment records are currently appended to.
    pub fn current_segment(&self) -> usize {
        self.current
    }

    /// Records of segment `i`.
    #[inline]
    pub fn segment(&self, i: usize) -> &[T] {
        &self.segments[i].items
    }

    /// Inner position captured when segment `i` became current.
    #[inline]
    pub fn segment_start(&self, i: usize) -> &I::Position {
        &self.segments[i].start
    }

    /// Preallocate spare segments until `total` records fit.
    pub fn resize(&mut self, total: usize) {
        let mut capacity: usize = self.segments.iter().map(|s| s.capacity).sum();
        while capacity < total {
            trace!(
                segment = self.segments.len(),
                capacity = self.segment_size,
                "preallocating tape segment"
            );
            self.segments
                .push(Segment::new(self.segment_size, I::Position::default()));
            capacity += self.segment_size;
        }
    }

    /// Visit the records between `start` and `end` in reverse recording order.
    ///
    /// `start` must not precede `end`. The callback also receives the inner
    /// layer so it can replay the finer-grained data up to each record.
    pub fn for_each_rev(
        &mut self,
        start: &ChainPosition<I::Position>,
        end: &ChainPosition<I::Position>,
        mut f: impl FnMut(&mut T, &mut I),
    ) {
        assert!(
            (start.segment, start.offset) >= (end.segment, end.offset),
            "reverse iteration needs start >= end: {:?} < {:?}",
            start,
            end
        );
        assert!(
            start.segment <= self.current,
            "position {:?} lies beyond the recording",
            start
        );

        let Chain {
            segments, inner, ..
        } = self;
        for seg in (end.segment..=start.segment).rev() {
            let items = &mut segments[seg].items;
            let hi = if seg == start.segment {
                start.offset
            } else {
                items.len()
            };
            let lo = if seg == end.segment { end.offset } else { 0 };
            for item in items[lo..hi].iter_mut().rev() {
                f(item, inner);
            }
        }
    }

    /// Occupancy counts for diagnostics.
    pub fn statistics(&self) -> LayerStatistics {
        let entry_bytes = std::mem::size_of::<T>();
        let entries = self.len();
        let capacity: usize = self.segments.iter().map(|s| s.capacity).sum();
        LayerStatistics {
            segments: self.segments.len(),
            segment_size: self.segment_size,
            entries,
            capacity,
            entry_bytes,
            used_bytes: entries * entry_bytes,
            allocated_bytes: capacity * entry_bytes,
        }
    }
}

impl<T, I: Nested> Nested for Chain<T, I> {
    type Position = ChainPosition<I::Position>;

    #[inline]
    fn position(&self) -> Self::Position {
        Chain::position(self)
    }

    fn reset_to(&mut self, pos: &Self::Position) {
        assert!(
            pos.segment < self.current
                || (pos.segment == self.current && pos.offset <= self.offset()),
            "cannot reset to {:?}: beyond the end of the recording",
            pos
        );
        for segment in &mut self.segments[pos.segment + 1..=self.current] {
            segment.items.clear();
        }
        self.segments[pos.segment].items.truncate(pos.offset);
        self.current = pos.segment;
        self.inner.reset_to(&pos.inner);
    }
}

impl<T, I: Nested + Default> Default for Chain<T, I> {
    fn default() -> Self {
        Chain::new(crate::config::DEFAULT_SEGMENT_SIZE, I::default())
    }
}
