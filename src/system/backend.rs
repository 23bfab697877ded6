//! Linear solver backends consuming the owned rows of every partition.
use crate::comm::Communicator;
use crate::error::{DistributedError, SolveError};
use crate::system::IjSystem;
use femassembly_sparse::cg::{CgErrorKind, ConjugateGradient, JacobiPreconditioner};
use femassembly_sparse::coo::CooMatrix;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

/// Solution of the owned rows of one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSolution {
    pub first_row: usize,
    pub values: Vec<f64>,
    pub num_iterations: usize,
    pub relative_residual: f64,
}

pub trait LinearSolverBackend {
    fn name(&self) -> &'static str;

    /// Solves the global system whose owned rows are given by `system`.
    ///
    /// This is a collective operation: every rank of `comm` must call it with its own rows.
    fn solve(&mut self, system: &IjSystem, comm: &dyn Communicator) -> Result<BackendSolution, SolveError>;
}

/// The complete system, as seen by every rank after gathering all owned rows.
#[derive(Debug, Clone)]
struct GlobalSystem {
    matrix: CsrMatrix<f64>,
    rhs: DVector<f64>,
    initial_guess: DVector<f64>,
}

impl GlobalSystem {
    fn owned_rows(&self, system: &IjSystem, solution: &DVector<f64>) -> Vec<f64> {
        solution.as_slice()[system.first_row..system.first_row + system.num_rows()].to_vec()
    }
}

fn gather_global_system(system: &IjSystem, comm: &dyn Communicator) -> Result<GlobalSystem, SolveError> {
    let num_rows = system.num_rows();
    if system.row_offsets.len() != num_rows + 1 || system.columns.len() != system.values.len() {
        return Err(SolveError::DimensionMismatch {
            expected: num_rows + 1,
            actual: system.row_offsets.len(),
        });
    }

    // Indices: first row, number of rows, row lengths, columns. Reals: values, rhs, guess.
    let mut indices = vec![system.first_row, num_rows];
    indices.extend(system.row_offsets.windows(2).map(|w| w[1] - w[0]));
    indices.extend_from_slice(&system.columns);
    let mut reals = system.values.clone();
    reals.extend_from_slice(&system.rhs);
    reals.extend_from_slice(&system.initial_guess);

    let gathered_indices = comm.all_gather_indices(&indices)?;
    let gathered_reals = comm.all_gather_reals(&reals)?;

    let total = system.total_rows;
    let mut coo = CooMatrix::new(total, total);
    let mut rhs = DVector::zeros(total);
    let mut initial_guess = DVector::zeros(total);
    let mut next_row = 0;

    for (indices, reals) in gathered_indices.iter().zip(&gathered_reals) {
        let malformed = |actual| DistributedError::CollectiveSizeMismatch {
            expected: indices.len(),
            actual,
        };
        let (first_row, rank_rows) = match indices.as_slice() {
            &[first_row, rank_rows, ..] => (first_row, rank_rows),
            other => return Err(malformed(other.len()).into()),
        };
        if first_row != next_row || first_row + rank_rows > total {
            return Err(DistributedError::NonContiguousNumbering { total }.into());
        }
        let lengths = indices.get(2..2 + rank_rows).ok_or_else(|| malformed(indices.len()))?;
        let columns = &indices[2 + rank_rows..];
        let nnz: usize = lengths.iter().sum();
        if columns.len() != nnz || reals.len() != nnz + 2 * rank_rows {
            return Err(malformed(reals.len()).into());
        }

        let (values, rest) = reals.split_at(nnz);
        let (rank_rhs, rank_guess) = rest.split_at(rank_rows);
        let mut offset = 0;
        for (local_row, &len) in lengths.iter().enumerate() {
            let row = first_row + local_row;
            for (&col, &value) in columns[offset..offset + len].iter().zip(&values[offset..offset + len]) {
                if col >= total {
                    return Err(SolveError::DimensionMismatch {
                        expected: total,
                        actual: col + 1,
                    });
                }
                coo.push(row, col, value);
            }
            offset += len;
            rhs[row] = rank_rhs[local_row];
            initial_guess[row] = rank_guess[local_row];
        }
        next_row = first_row + rank_rows;
    }

    if next_row != total {
        return Err(DistributedError::RowCountMismatch {
            gathered: next_row,
            expected: total,
        }
        .into());
    }

    let matrix = coo
        .to_csr()
        .map_err(|err| SolveError::Backend(err.to_string()))?;
    Ok(GlobalSystem {
        matrix,
        rhs,
        initial_guess,
    })
}

/// Dense LU factorization of the gathered system. Intended for small systems and as a reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLuBackend;

impl LinearSolverBackend for DenseLuBackend {
    fn name(&self) -> &'static str {
        "dense-lu"
    }

    fn solve(&mut self, system: &IjSystem, comm: &dyn Communicator) -> Result<BackendSolution, SolveError> {
        let global = gather_global_system(system, comm)?;
        let dense = DMatrix::from(&global.matrix);
        let solution = dense.clone().lu().solve(&global.rhs).ok_or(SolveError::Singular)?;
        if solution.iter().any(|x| !x.is_finite()) {
            return Err(SolveError::Singular);
        }

        let residual = &global.rhs - &dense * &solution;
        let rhs_norm = global.rhs.norm();
        Ok(BackendSolution {
            first_row: system.first_row,
            values: global.owned_rows(system, &solution),
            num_iterations: 0,
            relative_residual: if rhs_norm > 0.0 { residual.norm() / rhs_norm } else { residual.norm() },
        })
    }
}

/// Jacobi-preconditioned conjugate gradient on the gathered system.
#[derive(Debug, Clone)]
pub struct IjConjugateGradientBackend {
    tolerance: f64,
    max_iterations: usize,
    solver: ConjugateGradient,
}

impl Default for IjConjugateGradientBackend {
    fn default() -> Self {
        Self::new(1e-7, 1000)
    }
}

impl IjConjugateGradientBackend {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
            solver: ConjugateGradient::new()
                .with_tolerance(tolerance)
                .with_max_iter(max_iterations),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }
}

impl LinearSolverBackend for IjConjugateGradientBackend {
    fn name(&self) -> &'static str {
        "conjugate-gradient"
    }

    fn solve(&mut self, system: &IjSystem, comm: &dyn Communicator) -> Result<BackendSolution, SolveError> {
        let global = gather_global_system(system, comm)?;
        let preconditioner = JacobiPreconditioner::from_csr(&global.matrix);
        let mut x = global.initial_guess.clone();

        let output = self
            .solver
            .solve_with_guess(&global.matrix, &preconditioner, &global.rhs, &mut x)
            .map_err(|err| {
                warn!("Conjugate gradient failed after {} iterations: {}", err.num_iterations, err.kind);
                match err.kind {
                    CgErrorKind::MaxIterationsReached { max_iter } => SolveError::NotConverged { iterations: max_iter },
                    CgErrorKind::IndefiniteOperator | CgErrorKind::IndefinitePreconditioner => {
                        SolveError::IndefiniteOperator
                    }
                    other => SolveError::Backend(other.to_string()),
                }
            })?;

        debug!(
            "Conjugate gradient converged in {} iterations, relative residual {:e}",
            output.num_iterations, output.relative_residual
        );
        Ok(BackendSolution {
            first_row: system.first_row,
            values: global.owned_rows(system, &x),
            num_iterations: output.num_iterations,
            relative_residual: output.relative_residual,
        })
    }
}
