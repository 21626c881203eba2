#![allow(dead_code)]

use faer::sparse::{SparseColMat, Triplet};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatiotemporal_cpue::linalg::faer_ndarray::sparse_to_dense;
use spatiotemporal_cpue::{
    CpueData, FactorLevels, FillReducingOrdering, Observation, ParameterLayout, Parameters,
    SpdeMatrices,
};

pub const LEVELS: FactorLevels = FactorLevels {
    geartype: 2,
    month: 3,
    hooksize: 2,
    statarea: 2,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn to_sparse(dense: &Array2<f64>) -> SparseColMat<usize, f64> {
    let n = dense.nrows();
    let triplets: Vec<_> = dense
        .indexed_iter()
        .filter(|(_, v)| **v != 0.0)
        .map(|((r, c), &v)| Triplet::new(r, c, v))
        .collect();
    SparseColMat::try_new_from_triplets(n, n, &triplets).expect("valid triplets")
}

/// Linear finite elements on a 1-D chain of `n` nodes with spacing `h`:
/// lumped mass `C`, stiffness `G`, and `G C⁻¹ G`.
pub fn chain_fem_matrices(
    n: usize,
    h: f64,
) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
    assert!(n >= 2);
    let mut c = Array2::<f64>::zeros((n, n));
    let mut g = Array2::<f64>::zeros((n, n));
    for e in 0..n - 1 {
        for (a, b) in [(e, e), (e + 1, e + 1)] {
            c[[a, b]] += 0.5 * h;
            g[[a, b]] += 1.0 / h;
        }
        g[[e, e + 1]] -= 1.0 / h;
        g[[e + 1, e]] -= 1.0 / h;
    }
    let c_inv = Array2::from_diag(&c.diag().mapv(|v| 1.0 / v));
    let m2 = g.dot(&c_inv).dot(&g);
    (c, g, m2)
}

/// `[M0, M1, M2]` of a unit-spacing chain in faer CSC form.
pub fn chain_sparse_matrices(n: usize) -> [SparseColMat<usize, f64>; 3] {
    let (m0, m1, m2) = chain_fem_matrices(n, 1.0);
    [to_sparse(&m0), to_sparse(&m1), to_sparse(&m2)]
}

pub fn chain_spde(n: usize, ordering: FillReducingOrdering) -> SpdeMatrices {
    let [m0, m1, m2] = chain_sparse_matrices(n);
    SpdeMatrices::new(&m0, &m1, &m2, ordering).expect("chain mesh matrices are valid")
}

/// Dense `Q(κ)` of the chain, assembled directly from the densified inputs.
pub fn chain_dense_precision(n: usize, ln_kappa: f64) -> Array2<f64> {
    let [m0, m1, m2] = chain_sparse_matrices(n);
    let kappa2 = (2.0 * ln_kappa).exp();
    sparse_to_dense(&m0) * (kappa2 * kappa2)
        + sparse_to_dense(&m1) * (2.0 * kappa2)
        + sparse_to_dense(&m2)
}

/// Random observations on a chain mesh; every `missing_every`-th row is missing.
pub fn synthetic_data(
    n_nodes: usize,
    n_years: usize,
    n_obs: usize,
    missing_every: Option<usize>,
    seed: u64,
) -> CpueData {
    let mut rng = StdRng::seed_from_u64(seed);
    let observations: Vec<Observation> = (0..n_obs)
        .map(|i| Observation {
            site: rng.random_range(0..n_nodes),
            year: i % n_years,
            geartype: rng.random_range(0..LEVELS.geartype),
            month: rng.random_range(0..LEVELS.month),
            hooksize: rng.random_range(0..LEVELS.hooksize),
            statarea: rng.random_range(0..LEVELS.statarea),
            depth: rng.random_range(20.0..150.0),
            log_cpue: match missing_every {
                Some(k) if i % k == k - 1 => None,
                _ => Some(rng.random_range(-1.0..2.0)),
            },
        })
        .collect();
    CpueData::from_observations(
        &observations,
        n_years,
        LEVELS,
        chain_spde(n_nodes, FillReducingOrdering::default()),
    )
    .expect("synthetic data is consistent")
}

/// Moderate random parameter values; depth slope kept small against depths
/// near 100.
pub fn random_parameters(layout: &ParameterLayout, seed: u64) -> Parameters<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut params = layout.zeros();
    params.intercept = rng.random_range(-0.5..0.5);
    params.beta_depth = rng.random_range(-0.005..0.005);
    params.ln_tau_o = rng.random_range(-0.5..0.5);
    params.ln_tau_e = rng.random_range(-0.5..0.5);
    params.ln_kappa = rng.random_range(-0.5..0.5);
    params.ln_obs = rng.random_range(-0.5..0.2);
    for v in params
        .beta_year
        .iter_mut()
        .chain(params.beta_geartype.iter_mut())
        .chain(params.beta_month.iter_mut())
        .chain(params.beta_hooksize.iter_mut())
        .chain(params.beta_statarea.iter_mut())
        .chain(params.omega_s.iter_mut())
        .chain(params.epsilon_st.iter_mut())
    {
        *v = rng.random_range(-0.5..0.5);
    }
    params
}
