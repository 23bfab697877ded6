//! Triplet (COO) accumulation and its compaction into CSR.
use itertools::izip;
use nalgebra_sparse::{CsrMatrix, SparseFormatError};
use num::Zero;
use rayon::prelude::*;
use std::ops::AddAssign;

/// A list of `(row, col, value)` triplets, possibly containing duplicates.
///
/// Does not support arithmetic, only used for assembling CSR matrices. Duplicates are summed when
/// the list is compacted with [`CooMatrix::to_csr`] or [`CooMatrix::to_csr_sorted`].
#[derive(Debug, Clone)]
pub struct CooMatrix<T> {
    nrows: usize,
    ncols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<T>,
}

impl<T> CooMatrix<T>
where
    T: Copy + Zero + AddAssign,
{
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self::with_capacity(nrows, ncols, 0)
    }

    pub fn with_capacity(nrows: usize, ncols: usize, capacity: usize) -> Self {
        Self {
            nrows,
            ncols,
            rows: Vec::with_capacity(capacity),
            cols: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    #[inline(always)]
    pub fn push(&mut self, i: usize, j: usize, v: T) {
        assert!(i < self.nrows, "Row index out of bounds.");
        assert!(j < self.ncols, "Column index out of bounds.");
        self.rows.push(i);
        self.cols.push(j);
        self.values.push(v);
    }

    /// Removes all triplets, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.cols.clear();
        self.values.clear();
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored triplets, counting duplicates.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn triplet_iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        izip!(&self.rows, &self.cols, &self.values).map(|(&i, &j, &v)| (i, j, v))
    }

    /// Compacts the triplets into CSR by bucketing on rows, then sorting and merging each row.
    pub fn to_csr(&self) -> Result<CsrMatrix<T>, SparseFormatError> {
        // Bucket triplets by row (counting sort), keeping the original order within each row
        let mut bucket_offsets = vec![0usize; self.nrows + 1];
        for &i in &self.rows {
            bucket_offsets[i + 1] += 1;
        }
        for i in 0..self.nrows {
            bucket_offsets[i + 1] += bucket_offsets[i];
        }
        let mut fill = bucket_offsets.clone();
        let mut bucket_entries = vec![(0usize, T::zero()); self.nnz()];
        for (&i, &j, &v) in izip!(&self.rows, &self.cols, &self.values) {
            bucket_entries[fill[i]] = (j, v);
            fill[i] += 1;
        }

        let mut offsets = Vec::with_capacity(self.nrows + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        offsets.push(0);
        for bounds in bucket_offsets.windows(2) {
            let row_entries = &mut bucket_entries[bounds[0]..bounds[1]];
            row_entries.sort_unstable_by_key(|&(j, _)| j);
            merge_sorted_entries(row_entries.iter().copied(), &mut col_indices, &mut values);
            offsets.push(col_indices.len());
        }

        CsrMatrix::try_from_csr_data(self.nrows, self.ncols, offsets, col_indices, values)
    }

    /// Compacts the triplets into CSR with a global parallel sort by `(row, col)` followed by a
    /// single linear merge pass.
    pub fn to_csr_sorted(&self) -> Result<CsrMatrix<T>, SparseFormatError>
    where
        T: Send + Sync,
    {
        let mut triplets: Vec<_> = self.triplet_iter().collect();
        triplets.par_sort_unstable_by_key(|&(i, j, _)| (i, j));

        let mut offsets = Vec::with_capacity(self.nrows + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        offsets.push(0);

        let mut begin = 0;
        for row in 0..self.nrows {
            let end = begin + triplets[begin..].partition_point(|&(i, _, _)| i == row);
            let row_entries = triplets[begin..end].iter().map(|&(_, j, v)| (j, v));
            merge_sorted_entries(row_entries, &mut col_indices, &mut values);
            offsets.push(col_indices.len());
            begin = end;
        }

        CsrMatrix::try_from_csr_data(self.nrows, self.ncols, offsets, col_indices, values)
    }
}

/// Appends column-sorted `(col, value)` entries, summing runs of equal columns.
fn merge_sorted_entries<T>(
    entries: impl Iterator<Item = (usize, T)>,
    col_indices: &mut Vec<usize>,
    values: &mut Vec<T>,
) where
    T: AddAssign,
{
    let row_start = col_indices.len();
    for (j, v) in entries {
        if col_indices.len() > row_start && col_indices.last() == Some(&j) {
            if let Some(last) = values.last_mut() {
                *last += v;
            }
        } else {
            col_indices.push(j);
            values.push(v);
        }
    }
}
