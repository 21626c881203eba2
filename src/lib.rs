#![deny(dead_code)]
#![deny(unused_imports)]

pub mod data;
pub mod derivatives;
pub mod fields;
pub mod gmrf;
pub mod likelihood;
pub mod linalg;
pub mod model;
pub mod params;
pub mod precision;
pub mod report;
pub mod scalar;
pub mod types;

pub use data::{CpueData, Factor, FactorLevels, LogCpue, Observation, is_missing};
pub use derivatives::{AdReport, adreport_cpue, directional_derivative, gradient, hessian};
pub use gmrf::{DensePrecisionFactor, PrecisionFactor, gmrf_neg_log_density};
pub use linalg::sparse_cholesky::{CholeskyError, FillReducingOrdering};
pub use model::{Evaluation, JnllComponents, ModelError, SpatiotemporalModel};
pub use params::{ParameterBlock, ParameterKind, ParameterLayout, Parameters};
pub use precision::{FactorizedPrecision, PrecisionMatrix, SpdeMatrices};
pub use report::Report;
pub use scalar::Scalar;
pub use types::{ModelConfig, ReferenceLevels};
