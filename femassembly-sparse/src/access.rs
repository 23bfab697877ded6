//! Shared mutable access to disjoint ranges of a slice from multiple threads.
use std::marker::PhantomData;
use std::ops::Range;

/// A raw view into a mutable slice that hands out subslices to parallel workers.
///
/// Obtaining a subslice is `unsafe`: the caller guarantees that ranges handed to different threads
/// never overlap. Row-partitioned CSR storage satisfies this whenever the row offsets are
/// non-decreasing, which is how the slot arena and the compacted matrices use it.
pub struct DisjointSliceAccess<'a, T> {
    ptr: *mut T,
    len: usize,
    marker: PhantomData<&'a mut T>,
}

impl<'a, T> DisjointSliceAccess<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Construct a subslice for the given range.
    ///
    /// # Safety
    ///
    /// Multiple threads must not call this function with overlapping ranges, and no two
    /// subslices obtained from the same access may overlap while both are alive.
    ///
    /// # Panics
    ///
    /// Panics if the range is not contained in the slice.
    pub unsafe fn subslice_mut(&self, range: Range<usize>) -> &'a mut [T] {
        let Range { start, end } = range;
        assert!(start <= end && end <= self.len, "Range out of bounds for disjoint access.");
        std::slice::from_raw_parts_mut(self.ptr.add(start), end - start)
    }
}

impl<'a, T> Clone for DisjointSliceAccess<'a, T> {
    fn clone(&self) -> Self {
        Self {
            ptr: self.ptr,
            len: self.len,
            marker: PhantomData,
        }
    }
}

impl<'a, T> Copy for DisjointSliceAccess<'a, T> {}

unsafe impl<'a, T: Send> Sync for DisjointSliceAccess<'a, T> {}
unsafe impl<'a, T: Send> Send for DisjointSliceAccess<'a, T> {}

/// Returns `true` if `offsets` is a valid CSR offset array for storage of length `len`.
pub fn offsets_are_valid(offsets: &[usize], len: usize) -> bool {
    offsets.first() == Some(&0)
        && offsets.last() == Some(&len)
        && offsets.windows(2).all(|w| w[0] <= w[1])
}
