use crate::dimensions::{DMatrix, DVector};
use crate::errors::KinError;
use bytes::{Buf, BufMut};

/// Extends the dynamically sized matrix with the shape-checked and fused
/// operations this library relies on. All operations which may fail report a
/// [KinError] instead of panicking.
pub trait MatrixExt: Sized {
    /// Element-wise sum, or `ShapeMismatch` if the shapes differ.
    fn try_add(&self, other: &Self) -> Result<Self, KinError>;
    /// Element-wise difference, or `ShapeMismatch` if the shapes differ.
    fn try_sub(&self, other: &Self) -> Result<Self, KinError>;
    /// Matrix product, or `ShapeMismatch` if the inner dimensions differ.
    fn try_mul(&self, other: &Self) -> Result<Self, KinError>;
    /// Element-wise product, or `ShapeMismatch` if the shapes differ.
    fn try_component_mul(&self, other: &Self) -> Result<Self, KinError>;
    /// Matrix inverse, or `Singular` if no inverse exists.
    fn try_inverse_or_err(&self) -> Result<Self, KinError>;
    /// Lower Cholesky factor of a symmetric positive definite matrix, or
    /// `Singular` when the factorization does not exist.
    fn cholesky_lower(&self) -> Result<Self, KinError>;
    /// Computes `self * other^T` without materializing the transpose.
    fn post_multiply_transpose(&self, other: &Self) -> Result<Self, KinError>;
    /// Computes `other^T * self` without materializing the transpose.
    fn pre_multiply_transpose(&self, other: &Self) -> Result<Self, KinError>;
    /// Returns a copy retaining the lower triangle, plus `n_above` diagonals
    /// above the main diagonal. All other elements are zeroed.
    fn lower_triangle(&self, n_above: usize) -> Self;
    /// Returns a copy retaining the upper triangle, plus `n_below` diagonals
    /// below the main diagonal. All other elements are zeroed.
    fn upper_triangle(&self, n_below: usize) -> Self;
    /// Destructively reorders the rows from a permutation vector: row `i` of
    /// the result is row `permutation[i]` of the input.
    fn permute_rows(&mut self, permutation: &[usize]) -> Result<(), KinError>;
    /// Destructively reorders the columns from a permutation vector.
    fn permute_columns(&mut self, permutation: &[usize]) -> Result<(), KinError>;
}

impl MatrixExt for DMatrix<f64> {
    fn try_add(&self, other: &Self) -> Result<Self, KinError> {
        if self.shape() != other.shape() {
            return Err(shape_err(self, other));
        }
        Ok(self + other)
    }

    fn try_sub(&self, other: &Self) -> Result<Self, KinError> {
        if self.shape() != other.shape() {
            return Err(shape_err(self, other));
        }
        Ok(self - other)
    }

    fn try_mul(&self, other: &Self) -> Result<Self, KinError> {
        if self.ncols() != other.nrows() {
            return Err(shape_err(self, other));
        }
        Ok(self * other)
    }

    fn try_component_mul(&self, other: &Self) -> Result<Self, KinError> {
        if self.shape() != other.shape() {
            return Err(shape_err(self, other));
        }
        Ok(self.component_mul(other))
    }

    fn try_inverse_or_err(&self) -> Result<Self, KinError> {
        self.clone().try_inverse().ok_or(KinError::Singular)
    }

    fn cholesky_lower(&self) -> Result<Self, KinError> {
        match self.clone().cholesky() {
            Some(factor) => Ok(factor.l()),
            None => Err(KinError::Singular),
        }
    }

    fn post_multiply_transpose(&self, other: &Self) -> Result<Self, KinError> {
        // (m x n) * (p x n)^T requires matching column counts
        if self.ncols() != other.ncols() {
            return Err(shape_err(self, other));
        }
        let (m, n) = self.shape();
        let p = other.nrows();
        let mut product = DMatrix::<f64>::zeros(m, p);
        for i in 0..m {
            for j in 0..p {
                let mut sum = 0.0;
                for k in 0..n {
                    sum += self[(i, k)] * other[(j, k)];
                }
                product[(i, j)] = sum;
            }
        }
        Ok(product)
    }

    fn pre_multiply_transpose(&self, other: &Self) -> Result<Self, KinError> {
        // (p x m)^T * (m x n) requires matching row counts
        if self.nrows() != other.nrows() {
            return Err(shape_err(self, other));
        }
        let (m, n) = self.shape();
        let p = other.ncols();
        let mut product = DMatrix::<f64>::zeros(p, n);
        for i in 0..p {
            for j in 0..n {
                let mut sum = 0.0;
                for k in 0..m {
                    sum += other[(k, i)] * self[(k, j)];
                }
                product[(i, j)] = sum;
            }
        }
        Ok(product)
    }

    fn lower_triangle(&self, n_above: usize) -> Self {
        let mut masked = self.clone();
        for i in 0..self.nrows() {
            for j in 0..self.ncols() {
                if j > i + n_above {
                    masked[(i, j)] = 0.0;
                }
            }
        }
        masked
    }

    fn upper_triangle(&self, n_below: usize) -> Self {
        let mut masked = self.clone();
        for i in 0..self.nrows() {
            for j in 0..self.ncols() {
                if i > j + n_below {
                    masked[(i, j)] = 0.0;
                }
            }
        }
        masked
    }

    fn permute_rows(&mut self, permutation: &[usize]) -> Result<(), KinError> {
        let m = self.nrows();
        if permutation.len() != m || permutation.iter().any(|&p| p >= m) {
            return Err(KinError::ShapeMismatch(m, self.ncols(), permutation.len(), 1));
        }
        let original = self.clone();
        for (i, &p) in permutation.iter().enumerate() {
            for j in 0..self.ncols() {
                self[(i, j)] = original[(p, j)];
            }
        }
        Ok(())
    }

    fn permute_columns(&mut self, permutation: &[usize]) -> Result<(), KinError> {
        let n = self.ncols();
        if permutation.len() != n || permutation.iter().any(|&p| p >= n) {
            return Err(KinError::ShapeMismatch(self.nrows(), n, 1, permutation.len()));
        }
        let original = self.clone();
        for (j, &p) in permutation.iter().enumerate() {
            for i in 0..self.nrows() {
                self[(i, j)] = original[(i, p)];
            }
        }
        Ok(())
    }
}

fn shape_err(lhs: &DMatrix<f64>, rhs: &DMatrix<f64>) -> KinError {
    KinError::ShapeMismatch(lhs.nrows(), lhs.ncols(), rhs.nrows(), rhs.ncols())
}

/// Outer product `a * b^T` of two column vectors.
pub fn outer_product(a: &DVector<f64>, b: &DVector<f64>) -> DMatrix<f64> {
    let mut product = DMatrix::<f64>::zeros(a.len(), b.len());
    for i in 0..a.len() {
        for j in 0..b.len() {
            product[(i, j)] = a[i] * b[j];
        }
    }
    product
}

/// Serializes a matrix as `u64 rows, u64 cols` followed by the elements in
/// row-major order.
pub fn serialize_matrix<B: BufMut>(matrix: &DMatrix<f64>, buf: &mut B) {
    buf.put_u64_le(matrix.nrows() as u64);
    buf.put_u64_le(matrix.ncols() as u64);
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            buf.put_f64_le(matrix[(i, j)]);
        }
    }
}

/// Deserializes a matrix written by [serialize_matrix].
pub fn deserialize_matrix<B: Buf>(buf: &mut B) -> Result<DMatrix<f64>, KinError> {
    if buf.remaining() < 16 {
        return Err(KinError::LoadingError("truncated matrix header".to_string()));
    }
    let rows = buf.get_u64_le() as usize;
    let cols = buf.get_u64_le() as usize;
    if buf.remaining() < rows * cols * 8 {
        return Err(KinError::LoadingError("truncated matrix elements".to_string()));
    }
    let mut matrix = DMatrix::<f64>::zeros(rows, cols);
    for i in 0..rows {
        for j in 0..cols {
            matrix[(i, j)] = buf.get_f64_le();
        }
    }
    Ok(matrix)
}
