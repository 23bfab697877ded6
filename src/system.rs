//! The assembled linear system of one partition and its hand-off to a solver.
use crate::assembly::strategy::GlobalAssembler;
use crate::comm::Communicator;
use crate::dof::DofNumbering;
use crate::error::{AssemblyError, SolveError};
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CsrMatrix, SparseEntry, SparseEntryMut};

pub mod backend;

pub use backend::{BackendSolution, DenseLuBackend, IjConjugateGradientBackend, LinearSolverBackend};

/// Matrix, right-hand side and solution indexed by local DoF.
///
/// Rows of DoFs the partition does not own are present but empty.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    matrix: Option<CsrMatrix<f64>>,
    rhs: DVector<f64>,
    solution: DVector<f64>,
}

/// The owned rows of a partition in global numbering, as handed to a distributed solver.
///
/// Rows `first_row..first_row + num_rows()` are stored in CSR form with global column indices.
#[derive(Debug, Clone, PartialEq)]
pub struct IjSystem {
    pub first_row: usize,
    pub total_rows: usize,
    pub row_offsets: Vec<usize>,
    pub columns: Vec<usize>,
    pub values: Vec<f64>,
    pub rhs: Vec<f64>,
    pub initial_guess: Vec<f64>,
}

impl IjSystem {
    pub fn num_rows(&self) -> usize {
        self.rhs.len()
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

impl LinearSystem {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            matrix: None,
            rhs: DVector::zeros(num_dofs),
            solution: DVector::zeros(num_dofs),
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.rhs.len()
    }

    fn check_dimensions(&self, nrows: usize, ncols: usize) -> Result<(), AssemblyError> {
        for (what, actual) in [("matrix rows", nrows), ("matrix columns", ncols)] {
            if actual != self.num_dofs() {
                return Err(AssemblyError::SizeMismatch {
                    what,
                    expected: self.num_dofs(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Replaces the matrix by a zero matrix with the given pattern.
    pub fn set_sparsity_structure(&mut self, pattern: SparsityPattern) -> Result<(), AssemblyError> {
        self.check_dimensions(pattern.major_dim(), pattern.minor_dim())?;
        let values = vec![0.0; pattern.nnz()];
        self.matrix = Some(CsrMatrix::try_from_pattern_and_values(pattern, values)?);
        Ok(())
    }

    /// Takes over the matrix assembled by `assembler`.
    ///
    /// The first call allocates the matrix. Later calls write the new values into the existing
    /// matrix, which keeps its pattern.
    pub fn load_matrix(&mut self, assembler: &GlobalAssembler) -> Result<(), AssemblyError> {
        if let Some(matrix) = self.matrix.as_mut() {
            return assembler.compact_into(matrix);
        }
        let matrix = assembler.to_csr()?;
        self.check_dimensions(matrix.nrows(), matrix.ncols())?;
        debug!("Compacted global matrix with {} non-zeros", matrix.nnz());
        self.matrix = Some(matrix);
        Ok(())
    }

    pub fn matrix(&self) -> Option<&CsrMatrix<f64>> {
        self.matrix.as_ref()
    }

    fn matrix_mut(&mut self) -> Result<&mut CsrMatrix<f64>, AssemblyError> {
        self.matrix.as_mut().ok_or(AssemblyError::MissingMatrix)
    }

    fn entry_mut(&mut self, row: usize, col: usize) -> Result<&mut f64, AssemblyError> {
        match self.matrix_mut()?.get_entry_mut(row, col) {
            Some(SparseEntryMut::NonZero(value)) => Ok(value),
            _ => Err(AssemblyError::EntryNotInPattern { row, col }),
        }
    }

    /// Value of an explicitly stored entry.
    pub fn matrix_value(&self, row: usize, col: usize) -> Option<f64> {
        match self.matrix.as_ref()?.get_entry(row, col)? {
            SparseEntry::NonZero(value) => Some(*value),
            SparseEntry::Zero => None,
        }
    }

    pub fn matrix_add_value(&mut self, row: usize, col: usize, value: f64) -> Result<(), AssemblyError> {
        *self.entry_mut(row, col)? += value;
        Ok(())
    }

    pub fn matrix_set_value(&mut self, row: usize, col: usize, value: f64) -> Result<(), AssemblyError> {
        *self.entry_mut(row, col)? = value;
        Ok(())
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    pub fn rhs_mut(&mut self) -> &mut DVector<f64> {
        &mut self.rhs
    }

    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }

    pub fn solution_mut(&mut self) -> &mut DVector<f64> {
        &mut self.solution
    }

    /// Zeros the matrix values and the right-hand side. The pattern and the solution are kept.
    pub fn clear_values(&mut self) {
        if let Some(matrix) = &mut self.matrix {
            matrix.values_mut().fill(0.0);
        }
        self.rhs.fill(0.0);
    }

    /// Turns `row` into the identity row with right-hand side `value`.
    pub fn eliminate_row(&mut self, row: usize, value: f64) -> Result<(), AssemblyError> {
        let matrix = self.matrix_mut()?;
        let nrows = matrix.nrows();
        let mut csr_row = matrix.get_row_mut(row).ok_or(AssemblyError::NodeOutOfBounds {
            node: row,
            num_nodes: nrows,
        })?;
        let (cols, values) = csr_row.cols_and_values_mut();
        let mut has_diagonal = false;
        for (&col, entry) in cols.iter().zip(values) {
            if col == row {
                *entry = 1.0;
                has_diagonal = true;
            } else {
                *entry = 0.0;
            }
        }
        if !has_diagonal {
            return Err(AssemblyError::EntryNotInPattern { row, col: row });
        }
        self.rhs[row] = value;
        Ok(())
    }

    /// Eliminates the rows flagged in `rows` and the columns flagged in `columns`.
    ///
    /// Every row `j` not flagged in `columns` has its entries in flagged columns `i` moved to the
    /// right-hand side, `b[j] -= A[j][i] values[i]`, and zeroed. Every row flagged in `rows` then
    /// becomes an identity row with right-hand side `values[row]`. The whole matrix is swept, so
    /// the result does not depend on the matrix being symmetric.
    pub fn eliminate_row_column(
        &mut self,
        rows: &[bool],
        columns: &[bool],
        values: &[f64],
    ) -> Result<(), AssemblyError> {
        let n = self.num_dofs();
        let lengths = [
            ("eliminated rows", rows.len()),
            ("eliminated columns", columns.len()),
            ("prescribed values", values.len()),
        ];
        for (what, len) in lengths {
            if len != n {
                return Err(AssemblyError::SizeMismatch {
                    what,
                    expected: n,
                    actual: len,
                });
            }
        }

        let Self { matrix, rhs, .. } = &mut *self;
        let matrix = matrix.as_mut().ok_or(AssemblyError::MissingMatrix)?;
        for j in (0..n).filter(|&j| !columns[j]) {
            if let Some(mut csr_row) = matrix.get_row_mut(j) {
                let (cols, row_values) = csr_row.cols_and_values_mut();
                for (&col, entry) in cols.iter().zip(row_values) {
                    if columns[col] {
                        rhs[j] -= *entry * values[col];
                        *entry = 0.0;
                    }
                }
            }
        }

        for row in (0..n).filter(|&row| rows[row]) {
            self.eliminate_row(row, values[row])?;
        }
        Ok(())
    }

    /// Collects the owned rows in global numbering.
    pub fn to_ij_system(&self, dofs: &DofNumbering) -> Result<IjSystem, AssemblyError> {
        let matrix = self.matrix.as_ref().ok_or(AssemblyError::MissingMatrix)?;
        self.check_dimensions(dofs.num_dofs(), dofs.num_dofs())?;
        let global = |dof: usize| {
            dofs.global_index(dof)
                .ok_or_else(|| AssemblyError::InvalidStructure(format!("DoF {} has no global number", dof)))
        };

        let mut ij = IjSystem {
            first_row: dofs.owned_row_range().start,
            total_rows: dofs.total_dofs(),
            row_offsets: vec![0],
            columns: Vec::new(),
            values: Vec::new(),
            rhs: Vec::with_capacity(dofs.num_owned()),
            initial_guess: Vec::with_capacity(dofs.num_owned()),
        };
        for dof in dofs.owned_dofs() {
            let row = matrix.row(dof);
            for (&col, &value) in row.col_indices().iter().zip(row.values()) {
                ij.columns.push(global(col)?);
                ij.values.push(value);
            }
            ij.row_offsets.push(ij.columns.len());
            ij.rhs.push(self.rhs[dof]);
            ij.initial_guess.push(self.solution[dof]);
        }
        Ok(ij)
    }

    /// Solves the system with `backend` and stores the result in [`LinearSystem::solution`],
    /// including the ghost entries, which receive the values computed by their owners.
    ///
    /// This is a collective operation: every rank of `comm` must call it.
    pub fn solve(
        &mut self,
        backend: &mut dyn LinearSolverBackend,
        dofs: &DofNumbering,
        comm: &dyn Communicator,
    ) -> Result<BackendSolution, SolveError> {
        let ij = self.to_ij_system(dofs)?;
        let solution = backend.solve(&ij, comm)?;
        if solution.values.len() != ij.num_rows() {
            return Err(SolveError::DimensionMismatch {
                expected: ij.num_rows(),
                actual: solution.values.len(),
            });
        }
        for (dof, &value) in dofs.owned_dofs().zip(&solution.values) {
            self.solution[dof] = value;
        }
        dofs.synchronize_values(comm, &mut self.solution)?;
        Ok(solution)
    }
}
