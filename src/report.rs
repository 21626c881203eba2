//! Interpretable transforms of the parameters, recomputed on every evaluation.

use crate::data::CpueData;
use crate::model::JnllComponents;
use crate::params::Parameters;
use crate::scalar::Scalar;
use crate::types::ReferenceLevels;
use ndarray::Array1;
use serde::Serialize;
use std::f64::consts::PI;

const SQRT_8: f64 = 2.828_427_124_746_190_3;

#[derive(Debug, Clone, Serialize)]
pub struct Report<D> {
    pub jnll: D,
    pub components: JnllComponents<D>,
    /// Distance at which spatial correlation falls to about 0.13.
    pub range: D,
    pub sigma_o: D,
    pub sigma_e: D,
    pub sigma: D,
    pub intercept: D,
    pub beta_depth: D,
    /// `mu_i − logcpue_i`; `None` where the observation is missing.
    pub resids: Vec<Option<D>>,
    /// Standardized abundance index, one value per year.
    pub cpue_t: Array1<D>,
}

/// `sqrt(8) / kappa`.
#[inline]
pub fn spatial_range<D: Scalar>(ln_kappa: D) -> D {
    D::from_f64(SQRT_8) / ln_kappa.exp()
}

/// `1 / sqrt(4π·tau²·kappa²)`, the marginal SD of a Matérn (ν = 1) GMRF field.
#[inline]
pub fn marginal_sd<D: Scalar>(ln_tau: D, ln_kappa: D) -> D {
    let tau2 = ln_tau.scale(2.0).exp();
    let kappa2 = ln_kappa.scale(2.0).exp();
    D::one() / (tau2 * kappa2).scale(4.0 * PI).sqrt()
}

pub fn residuals<D: Scalar>(data: &CpueData, mu: &Array1<D>) -> Vec<Option<D>> {
    data.log_cpue()
        .iter()
        .zip(mu.iter())
        .map(|(y, &m)| y.map(|y| m - D::from_f64(y)))
        .collect()
}

/// `exp(intercept + beta_year[t] + reference effects + beta_depth·depth_ref)`.
pub fn index_by_year<D: Scalar>(params: &Parameters<D>, reference: &ReferenceLevels) -> Array1<D> {
    let base = params.intercept
        + params.beta_month[reference.month]
        + params.beta_geartype[reference.geartype]
        + params.beta_hooksize[reference.hooksize]
        + params.beta_statarea[reference.statarea]
        + params.beta_depth.scale(reference.depth);
    params.beta_year.mapv(|b| (base + b).exp())
}

pub(crate) fn build<D: Scalar>(
    data: &CpueData,
    params: &Parameters<D>,
    reference: &ReferenceLevels,
    mu: &Array1<D>,
    components: JnllComponents<D>,
) -> Report<D> {
    Report {
        jnll: components.total(),
        components,
        range: spatial_range(params.ln_kappa),
        sigma_o: marginal_sd(params.ln_tau_o, params.ln_kappa),
        sigma_e: marginal_sd(params.ln_tau_e, params.ln_kappa),
        sigma: params.ln_obs.exp(),
        intercept: params.intercept,
        beta_depth: params.beta_depth,
        resids: residuals(data, mu),
        cpue_t: index_by_year(params, reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_and_sd_at_unit_kappa() {
        assert!((spatial_range(0.0_f64) - 8.0_f64.sqrt()).abs() < 1e-15);
        let expected = 1.0 / (4.0 * PI).sqrt();
        assert!((marginal_sd(0.0_f64, 0.0) - expected).abs() < 1e-15);
    }

    #[test]
    fn marginal_sd_halves_when_tau_doubles() {
        let base = marginal_sd(0.2_f64, -0.5);
        let doubled = marginal_sd(0.2 + 2.0_f64.ln(), -0.5);
        assert!((base / doubled - 2.0).abs() < 1e-12);
    }
}
