//! Latent-field contributions to the joint negative log-likelihood.

use crate::gmrf::{PrecisionFactor, gmrf_neg_log_density};
use crate::model::ModelError;
use crate::scalar::{Scalar, ordered_sum};
use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Marginal scale `1 / exp(ln_tau)` of a field with log-precision-scale `ln_tau`.
#[inline]
pub fn field_scale<D: Scalar>(ln_tau: D) -> D {
    D::one() / ln_tau.exp()
}

/// `omega_s ~ GMRF(Q)` scaled by `1/exp(ln_tau_O)`.
pub fn spatial_term<D, F>(
    factor: &F,
    omega_s: ArrayView1<'_, D>,
    ln_tau_o: D,
) -> Result<D, ModelError>
where
    D: Scalar,
    F: PrecisionFactor<D> + ?Sized,
{
    gmrf_neg_log_density(factor, omega_s, field_scale(ln_tau_o))
}

/// Sum over years of `epsilon_st[, t] ~ GMRF(Q)` scaled by `1/exp(ln_tau_E)`.
pub fn spatiotemporal_term<D, F>(
    factor: &F,
    epsilon_st: ArrayView2<'_, D>,
    ln_tau_e: D,
) -> Result<D, ModelError>
where
    D: Scalar,
    F: PrecisionFactor<D> + ?Sized,
{
    let scale = field_scale(ln_tau_e);
    let per_year = (0..epsilon_st.len_of(Axis(1)))
        .map(|t| gmrf_neg_log_density(factor, epsilon_st.column(t), scale))
        .collect::<Result<Vec<D>, _>>()?;
    Ok(ordered_sum(per_year))
}

/// [`spatiotemporal_term`] with the year columns scored on the rayon pool.
/// The per-year values are still summed in year order.
pub fn par_spatiotemporal_term<D, F>(
    factor: &F,
    epsilon_st: ArrayView2<'_, D>,
    ln_tau_e: D,
) -> Result<D, ModelError>
where
    D: Scalar + Send + Sync,
    F: PrecisionFactor<D> + Sync + ?Sized,
{
    let n_years = epsilon_st.len_of(Axis(1));
    if n_years < 2 {
        return spatiotemporal_term(factor, epsilon_st, ln_tau_e);
    }
    let scale = field_scale(ln_tau_e);
    let per_year = (0..n_years)
        .into_par_iter()
        .map(|t| gmrf_neg_log_density(factor, epsilon_st.column(t), scale))
        .collect::<Result<Vec<D>, _>>()?;
    Ok(ordered_sum(per_year))
}
