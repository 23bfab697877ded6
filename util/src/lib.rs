use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Dense copy of a CSR matrix, for comparisons in tests.
pub fn csr_to_dense(matrix: &CsrMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from(matrix)
}

/// Largest absolute deviation from symmetry, `max |A_ij - A_ji|`.
pub fn symmetry_defect(matrix: &DMatrix<f64>) -> f64 {
    (matrix - matrix.transpose()).abs().max()
}

/// Largest absolute row sum.
pub fn max_abs_row_sum(matrix: &DMatrix<f64>) -> f64 {
    matrix
        .row_iter()
        .map(|row| row.sum().abs())
        .fold(0.0, f64::max)
}
