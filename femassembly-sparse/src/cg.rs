//! Preconditioned conjugate gradient for symmetric positive definite systems.
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use std::error::Error;
use std::fmt;

pub type BoxedError = Box<dyn Error + Send + Sync>;

/// Computes `y = A x` for some (implicitly represented) square matrix `A`.
pub trait LinearOperator {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), BoxedError>;
}

impl<'a, A> LinearOperator for &'a A
where
    A: ?Sized + LinearOperator,
{
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), BoxedError> {
        <A as LinearOperator>::apply(self, y, x)
    }
}

impl LinearOperator for DMatrix<f64> {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), BoxedError> {
        y.gemv(1.0, self, x, 0.0);
        Ok(())
    }
}

impl LinearOperator for CsrMatrix<f64> {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), BoxedError> {
        if y.len() != self.nrows() || x.len() != self.ncols() {
            return Err(format!(
                "Dimension mismatch: {}x{} operator applied to x of length {} with y of length {}",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len()
            )
            .into());
        }
        y.as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, y_i)| {
                let row = self.row(i);
                *y_i = row
                    .col_indices()
                    .iter()
                    .zip(row.values())
                    .map(|(&j, &a_ij)| a_ij * x[j])
                    .sum();
            });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityOperator;

impl LinearOperator for IdentityOperator {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), BoxedError> {
        y.copy_from(x);
        Ok(())
    }
}

/// Diagonal (Jacobi) preconditioner `P = diag(A)^-1`.
///
/// Rows with a zero diagonal entry are left unscaled.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inverse_diagonal: DVector<f64>,
}

impl JacobiPreconditioner {
    pub fn from_csr(matrix: &CsrMatrix<f64>) -> Self {
        let inverse_diagonal = DVector::from_iterator(
            matrix.nrows(),
            (0..matrix.nrows()).map(|i| {
                let diagonal = matrix
                    .get_entry(i, i)
                    .map(|entry| entry.into_value())
                    .unwrap_or(0.0);
                if diagonal != 0.0 {
                    diagonal.recip()
                } else {
                    1.0
                }
            }),
        );
        Self { inverse_diagonal }
    }
}

impl LinearOperator for JacobiPreconditioner {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) -> Result<(), BoxedError> {
        y.copy_from(x);
        y.component_mul_assign(&self.inverse_diagonal);
        Ok(())
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum CgErrorKind {
    OperatorError(BoxedError),
    PreconditionerError(BoxedError),
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for CgErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => write!(f, "Error applying operator: {}", err),
            Self::PreconditionerError(err) => write!(f, "Error applying preconditioner: {}", err),
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached", max_iter)
            }
        }
    }
}

#[derive(Debug)]
pub struct CgError {
    pub num_iterations: usize,
    pub kind: CgErrorKind,
}

impl fmt::Display for CgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CG solve failed after {} iterations: {}", self.num_iterations, self.kind)
    }
}

impl Error for CgError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgOutput {
    /// Number of updates made to the initial guess.
    pub num_iterations: usize,
    /// Final (approximate) residual norm divided by the norm of the right-hand side.
    pub relative_residual: f64,
}

#[derive(Debug, Clone)]
struct CgWorkspace {
    r: DVector<f64>,
    z: DVector<f64>,
    p: DVector<f64>,
    ap: DVector<f64>,
}

impl Default for CgWorkspace {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            ap: DVector::zeros(0),
        }
    }
}

impl CgWorkspace {
    fn resize(&mut self, dim: usize) {
        for buffer in [&mut self.r, &mut self.z, &mut self.p, &mut self.ap] {
            if buffer.len() != dim {
                *buffer = DVector::zeros(dim);
            }
        }
    }
}

/// Conjugate gradient with relative residual stopping criterion `||r|| <= tol * ||b||`.
///
/// The residual used is the one updated by the CG recurrence, not a freshly computed `b - Ax`.
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    tolerance: f64,
    max_iter: Option<usize>,
    workspace: CgWorkspace,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new()
    }
}

impl ConjugateGradient {
    pub fn new() -> Self {
        Self {
            tolerance: 1e-8,
            max_iter: None,
            workspace: CgWorkspace::default(),
        }
    }

    pub fn with_tolerance(self, tolerance: f64) -> Self {
        Self { tolerance, ..self }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }

    /// Solves `A x = b` starting from the initial guess stored in `x`.
    pub fn solve_with_guess(
        &mut self,
        a: &dyn LinearOperator,
        preconditioner: &dyn LinearOperator,
        b: &DVector<f64>,
        x: &mut DVector<f64>,
    ) -> Result<CgOutput, CgError> {
        use CgErrorKind::*;
        assert_eq!(b.len(), x.len(), "Right-hand side and solution must have the same length.");

        let fail = |num_iterations, kind| Err(CgError { num_iterations, kind });
        let mut iterations = 0;

        self.workspace.resize(x.len());
        let CgWorkspace { r, z, p, ap } = &mut self.workspace;

        let b_norm = b.norm();
        if b_norm == 0.0 {
            x.fill(0.0);
            return Ok(CgOutput {
                num_iterations: 0,
                relative_residual: 0.0,
            });
        }

        // r = b - Ax
        if let Err(err) = a.apply(r, x) {
            return fail(iterations, OperatorError(err));
        }
        r.axpy(1.0, b, -1.0);

        // z = Pr
        if let Err(err) = preconditioner.apply(z, r) {
            return fail(iterations, PreconditionerError(err));
        }
        p.copy_from(&*z);
        let mut z_dot_r = z.dot(&*r);

        loop {
            let relative_residual = r.norm() / b_norm;
            if relative_residual <= self.tolerance {
                return Ok(CgOutput {
                    num_iterations: iterations,
                    relative_residual,
                });
            }
            if let Some(max_iter) = self.max_iter {
                if iterations >= max_iter {
                    return fail(iterations, MaxIterationsReached { max_iter });
                }
            }

            if let Err(err) = a.apply(ap, p) {
                return fail(iterations, OperatorError(err));
            }
            let p_dot_ap = p.dot(&*ap);
            if p_dot_ap <= 0.0 {
                return fail(iterations, IndefiniteOperator);
            }
            if z_dot_r <= 0.0 {
                return fail(iterations, IndefinitePreconditioner);
            }

            let alpha = z_dot_r / p_dot_ap;
            x.axpy(alpha, &*p, 1.0);
            r.axpy(-alpha, &*ap, 1.0);
            iterations += 1;

            if let Err(err) = preconditioner.apply(z, r) {
                return fail(iterations, PreconditionerError(err));
            }
            let z_dot_r_next = z.dot(&*r);
            let beta = z_dot_r_next / z_dot_r;
            // p <- z + beta * p
            p.axpy(1.0, &*z, beta);
            z_dot_r = z_dot_r_next;
        }
    }
}
