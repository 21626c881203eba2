//! Forward-mode derivatives of the objective and of the abundance index.
//!
//! The objective is generic over [`Scalar`](crate::scalar::Scalar), so
//! derivatives come from running the same evaluation on dual numbers: one
//! `Dual64` pass per direction for first derivatives, one `HyperDual64` pass
//! per parameter pair for second derivatives. Passes are independent and run
//! on the rayon pool; each pass writes its own output slot, so results do not
//! depend on scheduling.

use crate::model::{ModelError, SpatiotemporalModel};
use crate::report::index_by_year;
use ndarray::{Array1, Array2};
use num_dual::{Dual64, HyperDual64};
use rayon::prelude::*;
use serde::Serialize;

fn check_len(what: &str, expected: usize, found: usize) -> Result<(), ModelError> {
    if expected == found {
        Ok(())
    } else {
        Err(ModelError::DimensionMismatch {
            what: what.to_string(),
            expected,
            found,
        })
    }
}

/// Objective value and its derivative along `direction`.
pub fn directional_derivative(
    model: &SpatiotemporalModel<'_>,
    theta: &[f64],
    direction: &[f64],
) -> Result<(f64, f64), ModelError> {
    check_len("direction", theta.len(), direction.len())?;
    let dual: Vec<Dual64> = theta
        .iter()
        .zip(direction)
        .map(|(&t, &d)| Dual64::new(t, d))
        .collect();
    let params = model.layout().unflatten(&dual)?;
    let jnll = model.evaluate(&params)?.jnll;
    Ok((jnll.re, jnll.eps))
}

fn unit_direction(n: usize, i: usize) -> Vec<f64> {
    let mut e = vec![0.0; n];
    e[i] = 1.0;
    e
}

/// Gradient of the joint NLL at `theta`.
pub fn gradient(
    model: &SpatiotemporalModel<'_>,
    theta: &[f64],
) -> Result<Array1<f64>, ModelError> {
    let n = theta.len();
    check_len("flat parameter vector", model.layout().len(), n)?;
    let partials = (0..n)
        .into_par_iter()
        .map(|i| directional_derivative(model, theta, &unit_direction(n, i)).map(|(_, d)| d))
        .collect::<Result<Vec<f64>, _>>()?;
    Ok(Array1::from(partials))
}

/// Second derivative `∂²f/∂θ_i∂θ_j`.
fn hessian_entry(
    model: &SpatiotemporalModel<'_>,
    theta: &[f64],
    i: usize,
    j: usize,
) -> Result<f64, ModelError> {
    let hyper: Vec<HyperDual64> = theta
        .iter()
        .enumerate()
        .map(|(k, &t)| {
            let e1 = if k == i { 1.0 } else { 0.0 };
            let e2 = if k == j { 1.0 } else { 0.0 };
            HyperDual64::new(t, e1, e2, 0.0)
        })
        .collect();
    let params = model.layout().unflatten(&hyper)?;
    Ok(model.evaluate(&params)?.jnll.eps1eps2)
}

/// Full Hessian of the joint NLL. Only the upper triangle is evaluated; the
/// result is exactly symmetric.
pub fn hessian(
    model: &SpatiotemporalModel<'_>,
    theta: &[f64],
) -> Result<Array2<f64>, ModelError> {
    let n = theta.len();
    check_len("flat parameter vector", model.layout().len(), n)?;
    let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| (i..n).map(move |j| (i, j))).collect();
    let entries = pairs
        .par_iter()
        .map(|&(i, j)| hessian_entry(model, theta, i, j))
        .collect::<Result<Vec<f64>, _>>()?;
    let mut h = Array2::<f64>::zeros((n, n));
    for (&(i, j), value) in pairs.iter().zip(entries) {
        h[[i, j]] = value;
        h[[j, i]] = value;
    }
    Ok(h)
}

/// Abundance index with its sensitivity to every flat parameter.
#[derive(Debug, Clone, Serialize)]
pub struct AdReport {
    pub values: Array1<f64>,
    /// `n_years × n_parameters`.
    pub jacobian: Array2<f64>,
}

impl AdReport {
    /// Delta-method standard errors `sqrt(J Σ Jᵀ)` for a parameter covariance `Σ`.
    pub fn delta_method_std_errors(
        &self,
        covariance: &Array2<f64>,
    ) -> Result<Array1<f64>, ModelError> {
        let n = self.jacobian.ncols();
        let (rows, cols) = covariance.dim();
        check_len("covariance rows", n, rows)?;
        check_len("covariance columns", n, cols)?;
        let projected = self.jacobian.dot(covariance);
        Ok(Array1::from_shape_fn(self.values.len(), |t| {
            let var = projected.row(t).dot(&self.jacobian.row(t));
            var.max(0.0).sqrt()
        }))
    }
}

/// `cpue_t` and its Jacobian at `theta`.
///
/// The point must be admissible: the objective is evaluated first and its
/// errors are returned unchanged.
pub fn adreport_cpue(
    model: &SpatiotemporalModel<'_>,
    theta: &[f64],
) -> Result<AdReport, ModelError> {
    let layout = model.layout();
    let params = layout.unflatten(theta)?;
    let values = model.evaluate(&params)?.report.cpue_t;
    let reference = &model.config().reference;

    let n = theta.len();
    let columns = (0..n)
        .into_par_iter()
        .map(|i| {
            let dual = layout.unflatten(
                &theta
                    .iter()
                    .enumerate()
                    .map(|(k, &t)| Dual64::new(t, if k == i { 1.0 } else { 0.0 }))
                    .collect::<Vec<_>>(),
            )?;
            Ok(index_by_year(&dual, reference).mapv(|c| c.eps))
        })
        .collect::<Result<Vec<Array1<f64>>, ModelError>>()?;

    let mut jacobian = Array2::<f64>::zeros((values.len(), n));
    for (i, column) in columns.into_iter().enumerate() {
        jacobian.column_mut(i).assign(&column);
    }
    Ok(AdReport { values, jacobian })
}
