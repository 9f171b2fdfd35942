//! Small dense linear algebra for LinUCB (pure math, no DB).
//!
//! Arm matrices stay symmetric positive-definite (identity plus a sum of outer
//! products), so a Cholesky factorization is enough for every solve.

use crate::error::EngineError;

/// Pivots at or below this are treated as a loss of positive-definiteness.
const PIVOT_EPSILON: f64 = 1e-12;

/// Row-major square matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SquareMatrix {
    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self { n, data }
    }

    /// Rebuild from a flattened row-major buffer.
    pub fn from_flat(n: usize, data: Vec<f64>) -> Result<Self, EngineError> {
        if data.len() != n * n {
            return Err(EngineError::Computation(format!(
                "matrix buffer has {} values, expected {}x{}",
                data.len(),
                n,
                n
            )));
        }
        Ok(Self { n, data })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n + col]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// `self += x xᵀ`
    pub fn add_outer(&mut self, x: &[f64]) {
        debug_assert_eq!(x.len(), self.n);
        for i in 0..self.n {
            for j in 0..self.n {
                self.data[i * self.n + j] += x[i] * x[j];
            }
        }
    }

    /// Factor `self = L Lᵀ`. Fails if the matrix is not positive-definite.
    pub fn cholesky(&self) -> Result<Cholesky, EngineError> {
        let n = self.n;
        let mut l = vec![0.0; n * n];
        for j in 0..n {
            let mut diag = self.get(j, j);
            for k in 0..j {
                diag -= l[j * n + k] * l[j * n + k];
            }
            if !diag.is_finite() || diag <= PIVOT_EPSILON {
                return Err(EngineError::Computation(format!(
                    "matrix is not positive-definite (pivot {} = {})",
                    j, diag
                )));
            }
            let pivot = diag.sqrt();
            l[j * n + j] = pivot;
            for i in (j + 1)..n {
                let mut v = self.get(i, j);
                for k in 0..j {
                    v -= l[i * n + k] * l[j * n + k];
                }
                l[i * n + j] = v / pivot;
            }
        }
        Ok(Cholesky { n, l })
    }
}

/// Lower-triangular factor of a positive-definite matrix.
#[derive(Debug, Clone)]
pub struct Cholesky {
    n: usize,
    l: Vec<f64>,
}

impl Cholesky {
    /// Solve `L y = b`.
    fn forward(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut v = b[i];
            for k in 0..i {
                v -= self.l[i * n + k] * y[k];
            }
            y[i] = v / self.l[i * n + i];
        }
        y
    }

    /// Solve `A x = b`.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        let y = self.forward(b);
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut v = y[i];
            for k in (i + 1)..n {
                v -= self.l[k * n + i] * x[k];
            }
            x[i] = v / self.l[i * n + i];
        }
        x
    }

    /// `xᵀ A⁻¹ x`, computed as `|L⁻¹ x|²`.
    pub fn inverse_quadratic_form(&self, x: &[f64]) -> f64 {
        self.forward(x).iter().map(|v| v * v).sum()
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_identity_solve_is_noop() {
        let chol = SquareMatrix::identity(3).cholesky().unwrap();
        assert_eq!(chol.solve(&[1.0, -2.0, 0.5]), vec![1.0, -2.0, 0.5]);
        assert!(approx(chol.inverse_quadratic_form(&[0.5, 0.5, 0.0]), 0.5));
    }

    #[test]
    fn test_solve_after_rank_one_update() {
        // A = I + x xᵀ with x = [1, 2]  =>  A = [[2, 2], [2, 5]]
        let mut a = SquareMatrix::identity(2);
        a.add_outer(&[1.0, 2.0]);
        assert_eq!(a.as_slice(), &[2.0, 2.0, 2.0, 5.0]);

        let chol = a.cholesky().unwrap();
        let x = chol.solve(&[4.0, 11.0]);
        // 2a + 2b = 4, 2a + 5b = 11 => b = 7/3, a = -1/3
        assert!(approx(x[0], -1.0 / 3.0));
        assert!(approx(x[1], 7.0 / 3.0));

        // A⁻¹ = 1/6 [[5, -2], [-2, 2]]; for v = [1, 1]: (5 - 4 + 2) / 6 = 0.5
        assert!(approx(chol.inverse_quadratic_form(&[1.0, 1.0]), 0.5));
    }

    #[test]
    fn test_singular_matrix_fails_loudly() {
        let singular = SquareMatrix::from_flat(2, vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(matches!(
            singular.cholesky(),
            Err(EngineError::Computation(_))
        ));
    }

    #[test]
    fn test_non_finite_entries_rejected() {
        let bad = SquareMatrix::from_flat(1, vec![f64::NAN]).unwrap();
        assert!(bad.cholesky().is_err());
    }

    #[test]
    fn test_from_flat_checks_length() {
        assert!(SquareMatrix::from_flat(2, vec![1.0; 3]).is_err());
    }
}
