use crate::scalar::Scalar;
use dyn_stack::{MemBuffer, MemStack, StackReq};
use faer::sparse::linalg::amd;
use faer::sparse::linalg::cholesky::simplicial::{self, SymbolicSimplicialCholesky};
use faer::sparse::{FaerError, SymbolicSparseColMatRef};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CholeskyError {
    #[error(
        "Matrix is not positive definite: pivot {pivot:.6e} at elimination step {column}."
    )]
    NotPositiveDefinite { column: usize, pivot: f64 },

    #[error("Entry ({row}, {col}) lies outside a {n}x{n} matrix.")]
    EntryOutOfBounds { row: usize, col: usize, n: usize },

    #[error("Entry ({row}, {col}) is listed more than once.")]
    DuplicateEntry { row: usize, col: usize },

    #[error("Vector of length {found} does not match matrix dimension {expected}.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Symbolic analysis failed: {0}")]
    Symbolic(#[from] FaerError),
}

/// Symmetric permutation applied before factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FillReducingOrdering {
    Natural,
    /// faer's approximate minimum degree ordering.
    #[default]
    ApproximateMinimumDegree,
}

/// Structure of a symmetric sparse matrix and of its Cholesky factor.
///
/// The matrix is held as the upper triangle of `P A Pᵀ` in compressed sparse
/// column form with sorted row indices. The ordering and the factor pattern
/// come from faer's symbolic routines; values live outside this struct so one
/// analysis serves every numeric factorization, whatever the scalar type.
#[derive(Debug, Clone)]
pub struct SymbolicCholesky {
    n: usize,
    /// `perm[new] = old`.
    perm: Vec<usize>,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    /// Pattern of `L`: diagonal first in each column, then increasing rows.
    factor: SymbolicSimplicialCholesky<usize>,
    /// Strict lower part of `L` by row: for row `k`, the columns `j < k`
    /// (increasing) and the slot of `L[k, j]`.
    l_row_ptr: Vec<usize>,
    l_row_cols: Vec<usize>,
    l_row_slots: Vec<usize>,
}

impl SymbolicCholesky {
    /// Analyze the pattern given by `upper_entries` (pairs `(row, col)` with
    /// `row <= col`, no duplicates).
    ///
    /// Returns the analysis and, for every input entry, the slot its value
    /// must be written to in the permuted value array.
    pub fn analyze(
        n: usize,
        upper_entries: &[(usize, usize)],
        ordering: FillReducingOrdering,
    ) -> Result<(Self, Vec<usize>), CholeskyError> {
        for &(row, col) in upper_entries {
            if row >= n || col >= n || row > col {
                return Err(CholeskyError::EntryOutOfBounds { row, col, n });
            }
        }

        let identity: Vec<usize> = (0..n).collect();
        let perm = match ordering {
            FillReducingOrdering::Natural => identity,
            FillReducingOrdering::ApproximateMinimumDegree => {
                let (col_ptr, row_idx, _) = permuted_upper(n, upper_entries, &identity)?;
                approximate_minimum_degree(n, &col_ptr, &row_idx)?
            }
        };
        let mut pinv = vec![0usize; n];
        for (new, &old) in perm.iter().enumerate() {
            pinv[old] = new;
        }

        let (col_ptr, row_idx, slot_of_entry) = permuted_upper(n, upper_entries, &pinv)?;
        let factor = simplicial_pattern(n, &col_ptr, &row_idx)?;
        let (l_row_ptr, l_row_cols, l_row_slots) = row_pattern(&factor);

        log::debug!(
            "Symbolic Cholesky ({:?}): n={}, nnz(upper)={}, nnz(L)={}",
            ordering,
            n,
            row_idx.len(),
            factor.len_val()
        );
        Ok((
            Self {
                n,
                perm,
                col_ptr,
                row_idx,
                factor,
                l_row_ptr,
                l_row_cols,
                l_row_slots,
            },
            slot_of_entry,
        ))
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Number of stored upper-triangle entries (length of a value array).
    #[inline]
    pub fn nnz(&self) -> usize {
        self.row_idx.len()
    }

    #[inline]
    pub fn factor_nnz(&self) -> usize {
        self.factor.len_val()
    }

    #[inline]
    pub fn permutation(&self) -> &[usize] {
        &self.perm
    }

    /// Row and column, in original numbering, of every value slot.
    pub fn slot_coordinates(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n).flat_map(move |col| {
            (self.col_ptr[col]..self.col_ptr[col + 1])
                .map(move |p| (self.perm[self.row_idx[p]], self.perm[col]))
        })
    }

    /// `xᵀ A x` for `x` in original numbering.
    pub fn quadratic_form<D: Scalar>(&self, values: &[D], x: ArrayView1<'_, D>) -> D {
        debug_assert_eq!(values.len(), self.nnz());
        let mut acc = D::zero();
        for col in 0..self.n {
            let x_col = x[self.perm[col]];
            for p in self.col_ptr[col]..self.col_ptr[col + 1] {
                let row = self.row_idx[p];
                let term = values[p] * x[self.perm[row]] * x_col;
                if row == col {
                    acc += term;
                } else {
                    acc += term + term;
                }
            }
        }
        acc
    }

    /// Up-looking numeric factorization `P A Pᵀ = L Lᵀ`.
    ///
    /// Row `k` of `L` solves `L[..k, ..k] y = A[..k, k]` over the precomputed
    /// row pattern, so no elimination-tree walk happens per factorization.
    pub fn factorize<D: Scalar>(
        &self,
        values: &[D],
    ) -> Result<CholeskyFactor<'_, D>, CholeskyError> {
        if values.len() != self.nnz() {
            return Err(CholeskyError::DimensionMismatch {
                expected: self.nnz(),
                found: values.len(),
            });
        }
        let l_col_ptr = self.factor.col_ptr();
        let l_rows = self.factor.row_idx();
        let mut l_vals = vec![D::zero(); self.factor_nnz()];
        let mut x = vec![D::zero(); self.n];

        for k in 0..self.n {
            for p in self.col_ptr[k]..self.col_ptr[k + 1] {
                x[self.row_idx[p]] = values[p];
            }
            let mut d = x[k];
            x[k] = D::zero();
            for q in self.l_row_ptr[k]..self.l_row_ptr[k + 1] {
                let j = self.l_row_cols[q];
                let slot = self.l_row_slots[q];
                let lkj = x[j] / l_vals[l_col_ptr[j]];
                x[j] = D::zero();
                for p in l_col_ptr[j] + 1..slot {
                    x[l_rows[p]] -= l_vals[p] * lkj;
                }
                d -= lkj * lkj;
                l_vals[slot] = lkj;
            }
            let pivot = d.value();
            if !(pivot > 0.0 && pivot.is_finite()) {
                return Err(CholeskyError::NotPositiveDefinite { column: k, pivot });
            }
            l_vals[l_col_ptr[k]] = d.sqrt();
        }

        Ok(CholeskyFactor {
            symbolic: self,
            l_vals,
        })
    }
}

/// Numeric Cholesky factor laid out on the pattern of its [`SymbolicCholesky`].
#[derive(Debug, Clone)]
pub struct CholeskyFactor<'s, D> {
    symbolic: &'s SymbolicCholesky,
    l_vals: Vec<D>,
}

impl<D: Scalar> CholeskyFactor<'_, D> {
    #[inline]
    fn diagonal(&self, column: usize) -> D {
        self.l_vals[self.symbolic.factor.col_ptr()[column]]
    }

    /// `log|A| = 2 Σ log L_jj`.
    pub fn log_determinant(&self) -> D {
        let mut acc = D::zero();
        for column in 0..self.symbolic.n {
            acc += self.diagonal(column).ln();
        }
        acc + acc
    }
}

/// Upper-triangle CSC of `P A Pᵀ` with sorted rows, where `pinv[old] = new`,
/// together with the value slot of every input entry.
fn permuted_upper(
    n: usize,
    upper_entries: &[(usize, usize)],
    pinv: &[usize],
) -> Result<(Vec<usize>, Vec<usize>, Vec<usize>), CholeskyError> {
    let mut keyed: Vec<(usize, usize, usize)> = upper_entries
        .iter()
        .enumerate()
        .map(|(entry, &(row, col))| {
            let (a, b) = (pinv[row], pinv[col]);
            (a.max(b), a.min(b), entry)
        })
        .collect();
    keyed.sort_unstable();
    if let Some(pair) = keyed
        .windows(2)
        .find(|pair| (pair[0].0, pair[0].1) == (pair[1].0, pair[1].1))
    {
        let (row, col) = upper_entries[pair[1].2];
        return Err(CholeskyError::DuplicateEntry { row, col });
    }

    let mut col_ptr = vec![0usize; n + 1];
    let mut row_idx = Vec::with_capacity(keyed.len());
    let mut slot_of_entry = vec![0usize; keyed.len()];
    for (slot, &(col, row, entry)) in keyed.iter().enumerate() {
        col_ptr[col + 1] += 1;
        row_idx.push(row);
        slot_of_entry[entry] = slot;
    }
    for col in 0..n {
        col_ptr[col + 1] += col_ptr[col];
    }
    Ok((col_ptr, row_idx, slot_of_entry))
}

fn approximate_minimum_degree(
    n: usize,
    col_ptr: &[usize],
    row_idx: &[usize],
) -> Result<Vec<usize>, CholeskyError> {
    let pattern = SymbolicSparseColMatRef::new_checked(n, n, col_ptr, None, row_idx);
    let mut perm = vec![0usize; n];
    let mut perm_inv = vec![0usize; n];
    let mut mem = MemBuffer::new(amd::order_scratch::<usize>(n, row_idx.len()));
    let stack = MemStack::new(&mut mem);
    amd::order(
        &mut perm,
        &mut perm_inv,
        pattern,
        amd::Control::default(),
        stack,
    )?;
    Ok(perm)
}

fn simplicial_pattern(
    n: usize,
    col_ptr: &[usize],
    row_idx: &[usize],
) -> Result<SymbolicSimplicialCholesky<usize>, CholeskyError> {
    let pattern = SymbolicSparseColMatRef::new_checked(n, n, col_ptr, None, row_idx);
    let mut mem = MemBuffer::new(StackReq::any_of(&[
        simplicial::prefactorize_symbolic_cholesky_scratch::<usize>(n, row_idx.len()),
        simplicial::factorize_simplicial_symbolic_cholesky_scratch::<usize>(n),
    ]));
    let stack = MemStack::new(&mut mem);
    let mut parents = vec![0isize; n];
    let mut col_counts = vec![0usize; n];
    let etree =
        simplicial::prefactorize_symbolic_cholesky(&mut parents, &mut col_counts, pattern, stack);
    Ok(simplicial::factorize_simplicial_symbolic_cholesky(
        pattern,
        etree,
        &col_counts,
        stack,
    )?)
}

/// Row-wise copy of the strict lower pattern of `L`.
fn row_pattern(
    factor: &SymbolicSimplicialCholesky<usize>,
) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let n = factor.nrows();
    let col_ptr = factor.col_ptr();
    let rows = factor.row_idx();

    let mut row_ptr = vec![0usize; n + 1];
    for j in 0..n {
        for &i in &rows[col_ptr[j] + 1..col_ptr[j + 1]] {
            row_ptr[i + 1] += 1;
        }
    }
    for i in 0..n {
        row_ptr[i + 1] += row_ptr[i];
    }

    let strict = row_ptr[n];
    let mut cols = vec![0usize; strict];
    let mut slots = vec![0usize; strict];
    let mut fill = row_ptr[..n].to_vec();
    for j in 0..n {
        for p in col_ptr[j] + 1..col_ptr[j + 1] {
            let i = rows[p];
            cols[fill[i]] = j;
            slots[fill[i]] = p;
            fill[i] += 1;
        }
    }
    (row_ptr, cols, slots)
}
