//! Linear predictor and Gaussian observation likelihood.

use crate::data::CpueData;
use crate::params::Parameters;
use crate::scalar::{LN_2PI, Scalar};
use ndarray::Array1;

/// `mu_i` for every observation, missing or not.
pub fn linear_predictor<D: Scalar>(data: &CpueData, params: &Parameters<D>) -> Array1<D> {
    let site = data.site().codes();
    let year = data.year().codes();
    let geartype = data.geartype().codes();
    let month = data.month().codes();
    let hooksize = data.hooksize().codes();
    let statarea = data.statarea().codes();
    let depth = data.depth();

    Array1::from_shape_fn(data.n_observations(), |i| {
        let (s, t) = (site[i], year[i]);
        params.intercept
            + params.beta_year[t]
            + params.beta_month[month[i]]
            + params.beta_geartype[geartype[i]]
            + params.beta_hooksize[hooksize[i]]
            + params.beta_statarea[statarea[i]]
            + params.beta_depth.scale(depth[i])
            + params.omega_s[s]
            + params.epsilon_st[[s, t]]
    })
}

/// `-log N(y; mu, sd)` with the standard deviation given directly.
#[inline]
pub fn gaussian_nll<D: Scalar>(y: f64, mu: D, sd: D, ln_sd: D) -> D {
    let z = (D::from_f64(y) - mu) / sd;
    D::from_f64(0.5 * LN_2PI) + ln_sd + (z * z).scale(0.5)
}

/// Data term: Gaussian NLL of the observed log-CPUE with `sd = exp(ln_obs)`.
/// Missing observations contribute nothing.
pub fn observation_nll<D: Scalar>(data: &CpueData, mu: &Array1<D>, ln_obs: D) -> D {
    let sd = ln_obs.exp();
    let mut nll = D::zero();
    for (y, &m) in data.log_cpue().iter().zip(mu.iter()) {
        if let Some(y) = *y {
            nll += gaussian_nll(y, m, sd, ln_obs);
        }
    }
    nll
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_nll_matches_closed_form() {
        let (y, mu, ln_sd) = (1.3_f64, 0.4_f64, -0.2_f64);
        let sd = ln_sd.exp();
        let expected = 0.5 * LN_2PI + sd.ln() + 0.5 * ((y - mu) / sd).powi(2);
        assert!((gaussian_nll(y, mu, sd, ln_sd) - expected).abs() < 1e-14);
    }

    #[test]
    fn nll_is_minimized_at_the_observation() {
        let at = gaussian_nll(2.0, 2.0_f64, 1.0, 0.0);
        let off = gaussian_nll(2.0, 2.1_f64, 1.0, 0.0);
        assert!(at < off);
        assert!((at - 0.5 * LN_2PI).abs() < 1e-14);
    }
}
