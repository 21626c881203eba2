pub mod faer_ndarray;
pub mod sparse_cholesky;
