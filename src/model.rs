//! Joint negative log-likelihood of the spatiotemporal CPUE model.
//!
//! One evaluation assembles `Q(κ)`, factorizes it once, scores the spatial
//! field and every yearly spatiotemporal field against that factor, adds the
//! Gaussian observation likelihood and derives the reported quantities. The
//! model holds no mutable state; any number of threads may evaluate it at
//! once.

use crate::data::CpueData;
use crate::fields::{par_spatiotemporal_term, spatial_term, spatiotemporal_term};
use crate::likelihood::{linear_predictor, observation_nll};
use crate::linalg::sparse_cholesky::CholeskyError;
use crate::params::{ParameterLayout, Parameters};
use crate::precision::FactorizedPrecision;
use crate::report::{self, Report};
use crate::scalar::Scalar;
use crate::types::ModelConfig;
use ndarray::{Array1, ArrayView2};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid model input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}.")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error(
        "Factor '{factor}' has code {code} at row {row}, but only {n_levels} levels are defined."
    )]
    LevelOutOfRange {
        factor: String,
        row: usize,
        code: usize,
        n_levels: usize,
    },

    #[error("The GMRF precision matrix could not be factorized: {0}")]
    PrecisionNotPositiveDefinite(#[from] CholeskyError),

    #[error("The {component} contribution to the objective is not finite.")]
    NonFiniteObjective { component: &'static str },
}

impl ModelError {
    /// True when the error rejects the parameter point rather than the inputs;
    /// an optimizer may back off and try elsewhere.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ModelError::PrecisionNotPositiveDefinite(CholeskyError::NotPositiveDefinite { .. })
                | ModelError::NonFiniteObjective { .. }
        )
    }
}

/// Breakdown of the joint NLL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JnllComponents<D> {
    /// Observation likelihood.
    pub data: D,
    /// `omega_s` prior.
    pub spatial: D,
    /// `epsilon_st` prior, summed over years.
    pub spatiotemporal: D,
}

impl<D: Scalar> JnllComponents<D> {
    #[inline]
    pub fn total(&self) -> D {
        self.data + self.spatial + self.spatiotemporal
    }

    fn first_non_finite(&self) -> Option<&'static str> {
        [
            ("spatial field", self.spatial),
            ("spatiotemporal field", self.spatiotemporal),
            ("observation likelihood", self.data),
        ]
        .into_iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(name, _)| name)
    }
}

/// Output of a single objective evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation<D> {
    pub jnll: D,
    pub components: JnllComponents<D>,
    pub mu: Array1<D>,
    pub report: Report<D>,
}

#[derive(Debug, Clone)]
pub struct SpatiotemporalModel<'a> {
    data: &'a CpueData,
    config: ModelConfig,
    layout: ParameterLayout,
}

impl<'a> SpatiotemporalModel<'a> {
    pub fn new(data: &'a CpueData, config: ModelConfig) -> Result<Self, ModelError> {
        let reference = &config.reference;
        let levels = data.levels();
        for (factor, code, n_levels) in [
            ("geartype", reference.geartype, levels.geartype),
            ("month", reference.month, levels.month),
            ("hooksize", reference.hooksize, levels.hooksize),
            ("statarea", reference.statarea, levels.statarea),
        ] {
            if code >= n_levels {
                return Err(ModelError::InvalidInput(format!(
                    "reference {factor} level {code} is outside its {n_levels} levels"
                )));
            }
        }
        if !reference.depth.is_finite() {
            return Err(ModelError::InvalidInput(
                "reference depth must be finite".to_string(),
            ));
        }
        let layout = ParameterLayout::for_data(data);
        log::debug!(
            "Spatiotemporal model: {} parameters ({} latent), parallel years: {}",
            layout.len(),
            layout.random_indices().len(),
            config.parallel_years
        );
        Ok(Self {
            data,
            config,
            layout,
        })
    }

    #[inline]
    pub fn data(&self) -> &CpueData {
        self.data
    }

    #[inline]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    #[inline]
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Evaluate the joint NLL and every reported quantity at `params`.
    ///
    /// Year fields are scored on the rayon pool when `parallel_years` is set.
    pub fn evaluate<D>(&self, params: &Parameters<D>) -> Result<Evaluation<D>, ModelError>
    where
        D: Scalar + Send + Sync,
    {
        let parallel = self.config.parallel_years;
        self.evaluate_with(params, |factor, epsilon_st, ln_tau_e| {
            if parallel {
                par_spatiotemporal_term(factor, epsilon_st, ln_tau_e)
            } else {
                spatiotemporal_term(factor, epsilon_st, ln_tau_e)
            }
        })
    }

    /// Single-threaded [`evaluate`](Self::evaluate) for scalar types that
    /// cannot cross threads; `parallel_years` is ignored.
    pub fn evaluate_serial<D: Scalar>(
        &self,
        params: &Parameters<D>,
    ) -> Result<Evaluation<D>, ModelError> {
        self.evaluate_with(params, |factor, epsilon_st, ln_tau_e| {
            spatiotemporal_term(factor, epsilon_st, ln_tau_e)
        })
    }

    fn evaluate_with<D, S>(
        &self,
        params: &Parameters<D>,
        score_years: S,
    ) -> Result<Evaluation<D>, ModelError>
    where
        D: Scalar,
        S: FnOnce(&FactorizedPrecision<'_, D>, ArrayView2<'_, D>, D) -> Result<D, ModelError>,
    {
        self.layout.validate(params)?;

        let precision = self.data.spde().precision(params.ln_kappa);
        let factor = precision.factorize().map_err(|err| {
            log::debug!(
                "Rejecting parameter point: ln_kappa = {:.6e}: {err}",
                params.ln_kappa.value()
            );
            ModelError::from(err)
        })?;

        let spatial = spatial_term(&factor, params.omega_s.view(), params.ln_tau_o)?;
        let spatiotemporal = score_years(&factor, params.epsilon_st.view(), params.ln_tau_e)?;

        let mu = linear_predictor(self.data, params);
        let data = observation_nll(self.data, &mu, params.ln_obs);

        let components = JnllComponents {
            data,
            spatial,
            spatiotemporal,
        };
        if let Some(component) = components.first_non_finite() {
            log::debug!("Rejecting parameter point: non-finite {component} term");
            return Err(ModelError::NonFiniteObjective { component });
        }
        log::trace!(
            "jnll components: data = {:.6e}, spatial = {:.6e}, spatiotemporal = {:.6e}",
            data.value(),
            spatial.value(),
            spatiotemporal.value()
        );

        let report = report::build(self.data, params, &self.config.reference, &mu, components);
        Ok(Evaluation {
            jnll: components.total(),
            components,
            mu,
            report,
        })
    }

    /// Joint NLL at a flat parameter vector.
    pub fn objective(&self, theta: &[f64]) -> Result<f64, ModelError> {
        let params = self.layout.unflatten(theta)?;
        Ok(self.evaluate(&params)?.jnll)
    }
}
