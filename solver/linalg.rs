//! Thin bridge between `ndarray` containers and faer's dense factorizations.
//!
//! Only the pieces the search needs are exposed: a Cholesky factor of a
//! symmetric positive-definite block, and a regularized solve that escalates a
//! diagonal ridge until the factorization succeeds.

use faer::linalg::solvers::{self, Solve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
    #[error("Matrix is {rows}x{cols}, but a square matrix matching the right-hand side ({rhs}) was expected.")]
    ShapeMismatch { rows: usize, cols: usize, rhs: usize },
}

/// Ridge multipliers tried, relative to the mean absolute diagonal, before a
/// regularized solve gives up.
const RIDGE_LADDER: [f64; 6] = [0.0, 1e-10, 1e-8, 1e-6, 1e-4, 1e-2];

enum Storage<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

impl Storage<'_> {
    #[inline]
    fn as_ref(&self) -> MatRef<'_, f64> {
        match self {
            Storage::Borrowed(view) => *view,
            Storage::Owned(mat) => mat.as_ref(),
        }
    }
}

/// A faer view over an `ndarray` matrix; borrows when the memory layout allows.
pub struct MatrixView<'a> {
    storage: Storage<'a>,
}

impl<'a> MatrixView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let storage = match array.as_slice() {
            Some(slice) if array.is_standard_layout() => {
                Storage::Borrowed(MatRef::from_row_major_slice(slice, rows, cols))
            }
            _ => Storage::Owned(Mat::from_fn(rows, cols, |i, j| array[(i, j)])),
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        self.storage.as_ref()
    }
}

/// A faer column view over an `ndarray` vector.
pub struct ColumnView<'a> {
    storage: Storage<'a>,
}

impl<'a> ColumnView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix1>) -> Self {
        let len = array.len();
        let storage = match array.as_slice() {
            Some(slice) => Storage::Borrowed(MatRef::from_row_major_slice(slice, len, 1)),
            None => Storage::Owned(Mat::from_fn(len, 1, |i, _| array[i])),
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        self.storage.as_ref()
    }
}

pub struct CholeskyFactor {
    factor: solvers::Llt<f64>,
}

impl CholeskyFactor {
    pub fn solve_vec<S: Data<Elem = f64>>(&self, rhs: &ArrayBase<S, Ix1>) -> Array1<f64> {
        let rhs_view = ColumnView::new(rhs);
        let sol = self.factor.solve(rhs_view.as_ref());
        Array1::from_shape_fn(rhs.len(), |i| sol[(i, 0)])
    }
}

pub trait Cholesky {
    fn cholesky(&self) -> Result<CholeskyFactor, LinalgError>;
}

impl<S: Data<Elem = f64>> Cholesky for ArrayBase<S, Ix2> {
    fn cholesky(&self) -> Result<CholeskyFactor, LinalgError> {
        let view = MatrixView::new(self);
        let factor = view
            .as_ref()
            .llt(Side::Lower)
            .map_err(LinalgError::Cholesky)?;
        Ok(CholeskyFactor { factor })
    }
}

/// Solves `(A + λI) x = b` for symmetric `A`, escalating `λ` along
/// [`RIDGE_LADDER`] until the Cholesky factorization succeeds.
pub fn solve_regularized(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, LinalgError> {
    let (rows, cols) = a.dim();
    if rows != cols || rows != b.len() {
        return Err(LinalgError::ShapeMismatch {
            rows,
            cols,
            rhs: b.len(),
        });
    }
    let scale = if rows == 0 {
        1.0
    } else {
        (a.diag().iter().map(|v| v.abs()).sum::<f64>() / rows as f64).max(f64::EPSILON)
    };

    let mut last_err = None;
    for ridge in RIDGE_LADDER {
        let mut shifted = a.clone();
        if ridge > 0.0 {
            shifted.diag_mut().mapv_inplace(|d| d + ridge * scale);
        }
        match shifted.cholesky() {
            Ok(factor) => {
                let x = factor.solve_vec(b);
                if x.iter().all(|v| v.is_finite()) {
                    return Ok(x);
                }
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(LinalgError::ShapeMismatch {
        rows,
        cols,
        rhs: b.len(),
    }))
}
