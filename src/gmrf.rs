//! Negative log-density of a zero-mean GMRF.
//!
//! For precision `Q` and marginal scale `σ`, `x ~ N(0, σ²·Q⁻¹)` has
//!
//! `-log p(x) = ½·(x/σ)ᵀQ(x/σ) − ½·log|Q| + n·log σ + ½·n·log 2π`.
//!
//! `log|Q|` comes from a factorization computed once per precision and shared
//! by every field evaluated against it.

use crate::linalg::faer_ndarray::{FaerCholesky, FaerLinalgError};
use crate::model::ModelError;
use crate::precision::FactorizedPrecision;
use crate::scalar::{LN_2PI, Scalar};
use faer::Side;
use ndarray::{Array2, ArrayView1};

/// Factorized precision matrix able to score GMRF realizations.
pub trait PrecisionFactor<D: Scalar> {
    fn dim(&self) -> usize;

    /// `log|Q|`.
    fn log_determinant(&self) -> D;

    /// `xᵀQx`.
    fn quadratic_form(&self, x: ArrayView1<'_, D>) -> D;
}

impl<D: Scalar> PrecisionFactor<D> for FactorizedPrecision<'_, D> {
    #[inline]
    fn dim(&self) -> usize {
        self.precision().dim()
    }

    #[inline]
    fn log_determinant(&self) -> D {
        self.log_det()
    }

    #[inline]
    fn quadratic_form(&self, x: ArrayView1<'_, D>) -> D {
        self.precision().quadratic_form(x)
    }
}

/// Dense reference backend on faer's Cholesky, for meshes small enough to
/// hold `Q` densely.
pub struct DensePrecisionFactor {
    matrix: Array2<f64>,
    log_det: f64,
}

impl DensePrecisionFactor {
    pub fn new(matrix: Array2<f64>) -> Result<Self, FaerLinalgError> {
        let log_det = matrix.cholesky(Side::Lower)?.log_determinant();
        Ok(Self { matrix, log_det })
    }
}

impl PrecisionFactor<f64> for DensePrecisionFactor {
    fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    fn log_determinant(&self) -> f64 {
        self.log_det
    }

    fn quadratic_form(&self, x: ArrayView1<'_, f64>) -> f64 {
        x.dot(&self.matrix.dot(&x))
    }
}

/// `-log N(x; 0, scale²·Q⁻¹)`; the result is added to a negative
/// log-likelihood.
pub fn gmrf_neg_log_density<D, F>(
    factor: &F,
    x: ArrayView1<'_, D>,
    scale: D,
) -> Result<D, ModelError>
where
    D: Scalar,
    F: PrecisionFactor<D> + ?Sized,
{
    let n = factor.dim();
    if x.len() != n {
        return Err(ModelError::DimensionMismatch {
            what: "GMRF realization".to_string(),
            expected: n,
            found: x.len(),
        });
    }
    let inv_scale = D::one() / scale;
    let scaled = x.mapv(|v| v * inv_scale);
    let half_quad = factor.quadratic_form(scaled.view()).scale(0.5);
    let half_log_det = factor.log_determinant().scale(0.5);
    let n = n as f64;
    Ok(half_quad - half_log_det + scale.ln().scale(n) + D::from_f64(0.5 * n * LN_2PI))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn identity_precision_gives_standard_normal_density() {
        let factor = DensePrecisionFactor::new(Array2::eye(2)).expect("identity is SPD");
        let x = array![1.0_f64, -2.0];
        let nll = gmrf_neg_log_density(&factor, x.view(), 1.0).expect("matching dim");
        let expected = 0.5 * (1.0 + 4.0) + LN_2PI;
        assert!((nll - expected).abs() < 1e-12);
    }

    #[test]
    fn scale_enters_as_variance_multiplier() {
        // Q = 4·I with scale 0.5 is N(0, 0.0625·I), sd 0.25.
        let factor = DensePrecisionFactor::new(Array2::eye(1) * 4.0).expect("SPD");
        let x = array![0.3_f64];
        let nll = gmrf_neg_log_density(&factor, x.view(), 0.5).expect("matching dim");
        let sd = 0.25f64;
        let expected = 0.5 * (0.3 / sd).powi(2) + sd.ln() + 0.5 * LN_2PI;
        assert!((nll - expected).abs() < 1e-12);
    }

    #[test]
    fn rejects_wrong_length() {
        let factor = DensePrecisionFactor::new(Array2::eye(3)).expect("SPD");
        let x = array![0.0_f64, 1.0];
        assert!(matches!(
            gmrf_neg_log_density(&factor, x.view(), 1.0),
            Err(ModelError::DimensionMismatch {
                expected: 3,
                found: 2,
                ..
            })
        ));
    }
}
