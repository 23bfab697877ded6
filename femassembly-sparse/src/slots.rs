//! CSR storage whose column slots are claimed while values are scattered into it.
//!
//! A [`SlotCsr`] is created from row offsets alone. Every column slot starts out as
//! [`UNCLAIMED`]; the first contribution to `(row, col)` claims the first free slot of the row and
//! every later contribution to the same entry accumulates into that slot. Since the row offsets
//! fix the capacity of every row, the structure can be built before anything is known about the
//! column indices, and reused unchanged for any number of subsequent numeric passes.
use crate::access::{offsets_are_valid, DisjointSliceAccess};
use crate::atomic::AtomicF64;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use std::error::Error;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Marker stored in a column slot that has not been claimed by any column.
pub const UNCLAIMED: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SlotError {
    InvalidOffsets { nrows: usize },
    RowOutOfBounds { row: usize, nrows: usize },
    ColumnOutOfBounds { row: usize, col: usize, ncols: usize },
    DuplicateColumn { row: usize, col: usize },
    NonContiguousClaims { row: usize },
    SlotNotFound { row: usize, col: usize },
    EntryNotFound { row: usize, col: usize },
    PatternMismatch { row: usize },
    InvalidCsr(String),
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOffsets { nrows } => write!(f, "Invalid row offsets for {} rows", nrows),
            Self::RowOutOfBounds { row, nrows } => {
                write!(f, "Row {} out of bounds for matrix with {} rows", row, nrows)
            }
            Self::ColumnOutOfBounds { row, col, ncols } => write!(
                f,
                "Column {} in row {} out of bounds for matrix with {} columns",
                col, row, ncols
            ),
            Self::DuplicateColumn { row, col } => {
                write!(f, "Column {} appears more than once in row {}", col, row)
            }
            Self::NonContiguousClaims { row } => {
                write!(f, "Row {} has a claimed column slot after an unclaimed one", row)
            }
            Self::SlotNotFound { row, col } => write!(
                f,
                "No free column slot left in row {} for column {} (row capacity too small)",
                row, col
            ),
            Self::EntryNotFound { row, col } => {
                write!(f, "Entry ({}, {}) is not present in the sparsity structure", row, col)
            }
            Self::PatternMismatch { row } => write!(
                f,
                "Row {} of the target matrix does not match the claimed columns",
                row
            ),
            Self::InvalidCsr(msg) => write!(f, "Failed to construct CSR matrix: {}", msg),
        }
    }
}

impl Error for SlotError {}

/// Sentinel-slot CSR arena with claim-or-accumulate insertion.
///
/// Insertion comes in three flavors:
///
/// - [`SlotCsr::add`] for single-threaded scatter through exclusive access,
/// - [`SlotCsr::add_concurrent`] for scatter from many threads at once, where claiming a slot is a
///   compare-and-swap on the column and accumulation is an atomic floating-point addition,
/// - [`SlotCsr::par_rows_mut`], which hands every row to exactly one worker so that the worker can
///   claim and accumulate with plain writes.
#[derive(Debug)]
pub struct SlotCsr {
    ncols: usize,
    row_offsets: Vec<usize>,
    columns: Vec<AtomicUsize>,
    values: Vec<AtomicF64>,
}

impl SlotCsr {
    /// Creates an arena with all column slots unclaimed and all values zero.
    pub fn try_from_row_offsets(ncols: usize, row_offsets: Vec<usize>) -> Result<Self, SlotError> {
        let capacity = row_offsets.last().copied().unwrap_or(0);
        if !offsets_are_valid(&row_offsets, capacity) {
            return Err(SlotError::InvalidOffsets {
                nrows: row_offsets.len().saturating_sub(1),
            });
        }
        Ok(Self {
            ncols,
            columns: (0..capacity).map(|_| AtomicUsize::new(UNCLAIMED)).collect(),
            values: (0..capacity).map(|_| AtomicF64::default()).collect(),
            row_offsets,
        })
    }

    /// Creates an arena in which some column slots have already been claimed.
    ///
    /// Within each row, claimed slots must precede unclaimed slots and no column may appear twice.
    pub fn try_from_row_offsets_and_columns(
        ncols: usize,
        row_offsets: Vec<usize>,
        columns: Vec<usize>,
    ) -> Result<Self, SlotError> {
        if !offsets_are_valid(&row_offsets, columns.len()) {
            return Err(SlotError::InvalidOffsets {
                nrows: row_offsets.len().saturating_sub(1),
            });
        }

        for (row, bounds) in row_offsets.windows(2).enumerate() {
            let row_columns = &columns[bounds[0]..bounds[1]];
            let claimed = row_columns
                .iter()
                .take_while(|&&col| col != UNCLAIMED)
                .count();
            if row_columns[claimed..].iter().any(|&col| col != UNCLAIMED) {
                return Err(SlotError::NonContiguousClaims { row });
            }
            for (k, &col) in row_columns[..claimed].iter().enumerate() {
                if col >= ncols {
                    return Err(SlotError::ColumnOutOfBounds { row, col, ncols });
                }
                if row_columns[..k].contains(&col) {
                    return Err(SlotError::DuplicateColumn { row, col });
                }
            }
        }

        Ok(Self {
            ncols,
            values: (0..columns.len()).map(|_| AtomicF64::default()).collect(),
            columns: columns.into_iter().map(AtomicUsize::new).collect(),
            row_offsets,
        })
    }

    pub fn nrows(&self) -> usize {
        self.row_offsets.len() - 1
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Total number of column slots, claimed or not.
    pub fn capacity(&self) -> usize {
        self.columns.len()
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_offsets[row]..self.row_offsets[row + 1]
    }

    /// Number of slots that have been claimed by a column.
    pub fn claimed_count(&self) -> usize {
        self.columns
            .iter()
            .filter(|col| col.load(Ordering::Relaxed) != UNCLAIMED)
            .count()
    }

    /// Snapshot of the column slots, with [`UNCLAIMED`] for free slots.
    pub fn column_slots(&self) -> Vec<usize> {
        self.columns
            .iter()
            .map(|col| col.load(Ordering::Relaxed))
            .collect()
    }

    fn checked_row_range(&self, row: usize, col: usize) -> Result<Range<usize>, SlotError> {
        if row >= self.nrows() {
            Err(SlotError::RowOutOfBounds {
                row,
                nrows: self.nrows(),
            })
        } else if col >= self.ncols {
            Err(SlotError::ColumnOutOfBounds {
                row,
                col,
                ncols: self.ncols,
            })
        } else {
            Ok(self.row_range(row))
        }
    }

    fn find_slot(&self, row: usize, col: usize) -> Result<usize, SlotError> {
        self.checked_row_range(row, col)?
            .find(|&slot| self.columns[slot].load(Ordering::Acquire) == col)
            .ok_or(SlotError::EntryNotFound { row, col })
    }

    /// Returns the value stored for `(row, col)`, or `None` if no slot is claimed by `col`.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.find_slot(row, col)
            .ok()
            .map(|slot| self.values[slot].load(Ordering::Acquire))
    }

    /// Accumulates `value` into `(row, col)`, claiming a slot if the column is not yet present.
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> Result<(), SlotError> {
        let range = self.checked_row_range(row, col)?;
        claim_or_accumulate(
            &mut self.columns[range.clone()],
            &mut self.values[range],
            row,
            col,
            value,
        )
    }

    /// Concurrent version of [`SlotCsr::add`].
    ///
    /// Any number of threads may call this method at the same time. A slot is claimed by a
    /// compare-and-swap from [`UNCLAIMED`] to `col`; slots are never released, so a thread that
    /// loses the race for a slot either finds its own column there or moves on to the next slot.
    pub fn add_concurrent(&self, row: usize, col: usize, value: f64) -> Result<(), SlotError> {
        for slot in self.checked_row_range(row, col)? {
            let column = &self.columns[slot];
            let mut current = column.load(Ordering::Acquire);
            if current == UNCLAIMED {
                current = match column.compare_exchange(UNCLAIMED, col, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(_) => col,
                    Err(actual) => actual,
                };
            }
            if current == col {
                self.values[slot].fetch_add(value, Ordering::AcqRel);
                return Ok(());
            }
        }
        Err(SlotError::SlotNotFound { row, col })
    }

    /// Overwrites the value of an existing entry.
    pub fn set_existing(&mut self, row: usize, col: usize, value: f64) -> Result<(), SlotError> {
        let slot = self.find_slot(row, col)?;
        self.values[slot].set(value);
        Ok(())
    }

    /// Gives every row to exactly one parallel worker.
    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = RowSlotsMut<'_>> + '_ {
        let nrows = self.nrows();
        let ncols = self.ncols;
        let offsets = &self.row_offsets;
        let columns = DisjointSliceAccess::new(&mut self.columns);
        let values = DisjointSliceAccess::new(&mut self.values);
        (0..nrows).into_par_iter().map(move |row| {
            let range = offsets[row]..offsets[row + 1];
            // SAFETY: offsets were validated to be non-decreasing on construction, so the ranges
            // of distinct rows are disjoint, and each row index is visited exactly once.
            let (columns, values) = unsafe {
                (
                    columns.subslice_mut(range.clone()),
                    values.subslice_mut(range),
                )
            };
            RowSlotsMut {
                row,
                ncols,
                columns,
                values,
            }
        })
    }

    /// Zeros all values while keeping the claimed columns.
    pub fn clear_values(&mut self) {
        self.values.par_iter_mut().for_each(|value| value.set(0.0));
    }

    /// Releases all column slots and zeros all values.
    pub fn reset(&mut self) {
        self.columns
            .par_iter_mut()
            .for_each(|col| *col.get_mut() = UNCLAIMED);
        self.clear_values();
    }

    /// Compacts the arena into a CSR matrix with sorted columns, dropping unclaimed slots.
    pub fn to_csr(&self) -> Result<CsrMatrix<f64>, SlotError> {
        let rows: Vec<Vec<(usize, f64)>> = (0..self.nrows())
            .into_par_iter()
            .map(|row| {
                let mut entries: Vec<_> = self
                    .row_range(row)
                    .filter_map(|slot| {
                        let col = self.columns[slot].load(Ordering::Acquire);
                        (col != UNCLAIMED).then(|| (col, self.values[slot].load(Ordering::Acquire)))
                    })
                    .collect();
                entries.sort_unstable_by_key(|&(col, _)| col);
                entries
            })
            .collect();

        let nnz = rows.iter().map(Vec::len).sum();
        let mut offsets = Vec::with_capacity(self.nrows() + 1);
        let mut col_indices = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        offsets.push(0);
        for entries in rows {
            for (col, value) in entries {
                col_indices.push(col);
                values.push(value);
            }
            offsets.push(col_indices.len());
        }

        CsrMatrix::try_from_csr_data(self.nrows(), self.ncols, offsets, col_indices, values)
            .map_err(|err| SlotError::InvalidCsr(err.to_string()))
    }

    /// Writes the current values into a matrix previously obtained from [`SlotCsr::to_csr`].
    ///
    /// The pattern of `target` is reused as-is, so no allocation takes place. Fails if the claimed
    /// columns of any row differ from the pattern of the corresponding row of `target`.
    pub fn compact_into(&self, target: &mut CsrMatrix<f64>) -> Result<(), SlotError> {
        if target.nrows() != self.nrows() || target.ncols() != self.ncols {
            return Err(SlotError::PatternMismatch { row: 0 });
        }
        let (offsets, col_indices, values) = target.csr_data_mut();
        let target_values = DisjointSliceAccess::new(values);
        (0..self.nrows()).into_par_iter().try_for_each(|row| {
            let range = offsets[row]..offsets[row + 1];
            let target_cols = &col_indices[range.clone()];
            // SAFETY: the offsets of a valid CSR matrix are non-decreasing, so rows are disjoint.
            let target_row = unsafe { target_values.subslice_mut(range) };
            let mut claimed = 0;
            for slot in self.row_range(row) {
                let col = self.columns[slot].load(Ordering::Acquire);
                if col == UNCLAIMED {
                    continue;
                }
                claimed += 1;
                let idx = target_cols
                    .binary_search(&col)
                    .map_err(|_| SlotError::PatternMismatch { row })?;
                target_row[idx] = self.values[slot].load(Ordering::Acquire);
            }
            if claimed == target_cols.len() {
                Ok(())
            } else {
                Err(SlotError::PatternMismatch { row })
            }
        })
    }
}

/// Exclusive access to the slots of a single row.
#[derive(Debug)]
pub struct RowSlotsMut<'a> {
    row: usize,
    ncols: usize,
    columns: &'a mut [AtomicUsize],
    values: &'a mut [AtomicF64],
}

impl<'a> RowSlotsMut<'a> {
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn capacity(&self) -> usize {
        self.columns.len()
    }

    pub fn add(&mut self, col: usize, value: f64) -> Result<(), SlotError> {
        if col >= self.ncols {
            return Err(SlotError::ColumnOutOfBounds {
                row: self.row,
                col,
                ncols: self.ncols,
            });
        }
        claim_or_accumulate(&mut *self.columns, &mut *self.values, self.row, col, value)
    }
}

fn claim_or_accumulate(
    columns: &mut [AtomicUsize],
    values: &mut [AtomicF64],
    row: usize,
    col: usize,
    value: f64,
) -> Result<(), SlotError> {
    for (slot_col, slot_value) in columns.iter_mut().zip(values.iter_mut()) {
        let slot_col = slot_col.get_mut();
        if *slot_col == col {
            slot_value.add(value);
            return Ok(());
        } else if *slot_col == UNCLAIMED {
            *slot_col = col;
            slot_value.set(value);
            return Ok(());
        }
    }
    Err(SlotError::SlotNotFound { row, col })
}
