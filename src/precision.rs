//! SPDE basis matrices and the GMRF precision built from them.
//!
//! `Q(κ) = κ⁴·M0 + 2κ²·M1 + M2` with `κ = exp(ln_kappa)`. The union of the
//! three sparsity patterns is analyzed once when the mesh matrices are
//! supplied; every evaluation only recomputes the values.

use crate::linalg::sparse_cholesky::{CholeskyError, FillReducingOrdering, SymbolicCholesky};
use crate::model::ModelError;
use crate::scalar::Scalar;
use faer::sparse::SparseColMat;
use ndarray::{Array2, ArrayView1};
use std::collections::BTreeMap;

const SYMMETRY_REL_TOL: f64 = 1e-10;

const BASIS_NAMES: [&str; 3] = ["M0", "M1", "M2"];

/// Finite-element matrices of the SPDE approximation on a fixed mesh.
#[derive(Debug, Clone)]
pub struct SpdeMatrices {
    n_nodes: usize,
    symbolic: SymbolicCholesky,
    /// `[M0, M1, M2]` coefficients for every value slot of `symbolic`.
    coefficients: Vec<[f64; 3]>,
}

impl SpdeMatrices {
    pub fn new(
        m0: &SparseColMat<usize, f64>,
        m1: &SparseColMat<usize, f64>,
        m2: &SparseColMat<usize, f64>,
        ordering: FillReducingOrdering,
    ) -> Result<Self, ModelError> {
        let n = m0.nrows();
        if n == 0 {
            return Err(ModelError::InvalidInput(
                "SPDE basis matrices must have at least one mesh node".to_string(),
            ));
        }

        let mut entries: BTreeMap<(usize, usize), [f64; 3]> = BTreeMap::new();
        for (which, matrix) in [m0, m1, m2].into_iter().enumerate() {
            let name = BASIS_NAMES[which];
            if matrix.nrows() != n {
                return Err(ModelError::DimensionMismatch {
                    what: format!("{name} rows"),
                    expected: n,
                    found: matrix.nrows(),
                });
            }
            if matrix.ncols() != n {
                return Err(ModelError::DimensionMismatch {
                    what: format!("{name} columns"),
                    expected: n,
                    found: matrix.ncols(),
                });
            }
            let (symbolic, values) = matrix.parts();
            let col_ptr = symbolic.col_ptr();
            let row_idx = symbolic.row_idx();
            for col in 0..n {
                for idx in col_ptr[col]..col_ptr[col + 1] {
                    let value = values[idx];
                    let row = row_idx[idx];
                    if !value.is_finite() {
                        return Err(ModelError::InvalidInput(format!(
                            "{name} has a non-finite entry at ({row}, {col})"
                        )));
                    }
                    entries.entry((row, col)).or_insert([0.0; 3])[which] += value;
                }
            }
        }

        for (&(row, col), coeffs) in &entries {
            if row == col {
                continue;
            }
            let mirrored = entries.get(&(col, row)).copied().unwrap_or([0.0; 3]);
            for which in 0..3 {
                let (a, b) = (coeffs[which], mirrored[which]);
                if (a - b).abs() > SYMMETRY_REL_TOL * a.abs().max(b.abs()).max(1.0) {
                    return Err(ModelError::InvalidInput(format!(
                        "{} is not symmetric: entry ({row}, {col}) = {a:.6e} but ({col}, {row}) = {b:.6e}",
                        BASIS_NAMES[which]
                    )));
                }
            }
        }

        let upper: Vec<((usize, usize), [f64; 3])> = entries
            .into_iter()
            .filter(|&((row, col), _)| row <= col)
            .collect();
        let pattern: Vec<(usize, usize)> = upper.iter().map(|&(key, _)| key).collect();
        let (symbolic, slots) = SymbolicCholesky::analyze(n, &pattern, ordering)?;

        let mut coefficients = vec![[0.0; 3]; slots.len()];
        for (entry, &slot) in slots.iter().enumerate() {
            coefficients[slot] = upper[entry].1;
        }

        Ok(Self {
            n_nodes: n,
            symbolic,
            coefficients,
        })
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    /// Assemble `Q = exp(4·ln_kappa)·M0 + 2·exp(2·ln_kappa)·M1 + M2`.
    ///
    /// `ln_kappa` is not clamped; overflow of the exponentials for extreme
    /// values surfaces as a failed factorization or a non-finite objective.
    pub fn precision<D: Scalar>(&self, ln_kappa: D) -> PrecisionMatrix<'_, D> {
        let kappa4 = ln_kappa.scale(4.0).exp();
        let two_kappa2 = ln_kappa.scale(2.0).exp().scale(2.0);
        let values = self
            .coefficients
            .iter()
            .map(|&[c0, c1, c2]| kappa4.scale(c0) + two_kappa2.scale(c1) + D::from_f64(c2))
            .collect();
        PrecisionMatrix {
            symbolic: &self.symbolic,
            values,
        }
    }
}

/// Sparse symmetric precision matrix over the scalar type `D`.
#[derive(Debug, Clone)]
pub struct PrecisionMatrix<'s, D> {
    symbolic: &'s SymbolicCholesky,
    values: Vec<D>,
}

impl<'s, D: Scalar> PrecisionMatrix<'s, D> {
    #[inline]
    pub fn dim(&self) -> usize {
        self.symbolic.dim()
    }

    pub fn quadratic_form(&self, x: ArrayView1<'_, D>) -> D {
        self.symbolic.quadratic_form(&self.values, x)
    }

    /// Factorize and keep the log-determinant for repeated density
    /// evaluations against this precision.
    pub fn factorize(self) -> Result<FactorizedPrecision<'s, D>, CholeskyError> {
        let log_det = self.symbolic.factorize(&self.values)?.log_determinant();
        Ok(FactorizedPrecision {
            precision: self,
            log_det,
        })
    }

    /// Dense copy of the real parts, for small-mesh verification.
    pub fn to_dense(&self) -> Array2<f64> {
        let n = self.dim();
        let mut dense = Array2::<f64>::zeros((n, n));
        for ((row, col), value) in self.symbolic.slot_coordinates().zip(&self.values) {
            dense[[row, col]] = value.value();
            dense[[col, row]] = value.value();
        }
        dense
    }
}

/// A precision matrix together with `log|Q|` from its Cholesky factor.
#[derive(Debug, Clone)]
pub struct FactorizedPrecision<'s, D> {
    precision: PrecisionMatrix<'s, D>,
    log_det: D,
}

impl<'s, D: Scalar> FactorizedPrecision<'s, D> {
    #[inline]
    pub fn precision(&self) -> &PrecisionMatrix<'s, D> {
        &self.precision
    }

    #[inline]
    pub fn log_det(&self) -> D {
        self.log_det
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::sparse::Triplet;

    fn sparse(n: usize, entries: &[(usize, usize, f64)]) -> SparseColMat<usize, f64> {
        let triplets: Vec<_> = entries
            .iter()
            .map(|&(r, c, v)| Triplet::new(r, c, v))
            .collect();
        SparseColMat::try_new_from_triplets(n, n, &triplets).expect("valid triplets")
    }

    fn two_node_mesh() -> (
        SparseColMat<usize, f64>,
        SparseColMat<usize, f64>,
        SparseColMat<usize, f64>,
    ) {
        let m0 = sparse(2, &[(0, 0, 0.5), (1, 1, 0.5)]);
        let m1 = sparse(2, &[(0, 0, 1.0), (0, 1, -1.0), (1, 0, -1.0), (1, 1, 1.0)]);
        let m2 = sparse(2, &[(0, 0, 4.0), (0, 1, -4.0), (1, 0, -4.0), (1, 1, 4.0)]);
        (m0, m1, m2)
    }

    #[test]
    fn precision_combines_basis_matrices_with_kappa_powers() {
        let (m0, m1, m2) = two_node_mesh();
        let spde = SpdeMatrices::new(&m0, &m1, &m2, FillReducingOrdering::Natural)
            .expect("valid mesh");
        let ln_kappa = 0.4_f64;
        let q = spde.precision(ln_kappa).to_dense();
        let k2 = (2.0 * ln_kappa).exp();
        let k4 = (4.0 * ln_kappa).exp();
        assert!((q[[0, 0]] - (0.5 * k4 + 2.0 * k2 + 4.0)).abs() < 1e-12);
        assert!((q[[0, 1]] - (-2.0 * k2 - 4.0)).abs() < 1e-12);
        assert_eq!(q[[0, 1]], q[[1, 0]]);
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let (m0, m1, _) = two_node_mesh();
        let m2 = sparse(3, &[(0, 0, 1.0)]);
        let err = SpdeMatrices::new(&m0, &m1, &m2, FillReducingOrdering::Natural)
            .expect_err("3x3 M2 against 2x2 M0");
        assert!(matches!(err, ModelError::DimensionMismatch { .. }));
    }

    #[test]
    fn rejects_asymmetric_basis() {
        let (m0, _, m2) = two_node_mesh();
        let m1 = sparse(2, &[(0, 0, 1.0), (0, 1, -1.0), (1, 1, 1.0)]);
        let err = SpdeMatrices::new(&m0, &m1, &m2, FillReducingOrdering::Natural)
            .expect_err("upper-only M1 is asymmetric");
        assert!(matches!(err, ModelError::InvalidInput(msg) if msg.contains("M1")));
    }

    #[test]
    fn factorized_log_det_is_finite_for_moderate_kappa() {
        let (m0, m1, m2) = two_node_mesh();
        let spde = SpdeMatrices::new(&m0, &m1, &m2, FillReducingOrdering::ApproximateMinimumDegree)
            .expect("valid mesh");
        for ln_kappa in [-3.0_f64, 0.0, 2.5] {
            let factored = spde.precision(ln_kappa).factorize().expect("SPD");
            assert!(factored.log_det().is_finite());
        }
    }
}
