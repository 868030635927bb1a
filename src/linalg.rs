//! Sparse/dense numerics for the factorization embedders.
//!
//! Only what ProNE and the adjacency reducers need: a CSR matrix over `f64`,
//! randomized truncated SVD (Halko, Martinsson & Tropp 2011) and the modified
//! Bessel function used as Chebyshev coefficients.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use std::collections::HashMap;

/// Compressed sparse row matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl SparseMatrix {
    /// Wrap raw CSR buffers. Column ids within a row must be sorted and unique.
    pub fn from_csr(
        rows: usize,
        cols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(indptr.len(), rows + 1);
        debug_assert_eq!(indices.len(), data.len());
        Self { rows, cols, indptr, indices, data }
    }

    pub fn identity(n: usize) -> Self {
        Self {
            rows: n,
            cols: n,
            indptr: (0..=n).collect(),
            indices: (0..n).collect(),
            data: vec![1.0; n],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let (a, b) = (self.indptr[i], self.indptr[i + 1]);
        (&self.indices[a..b], &self.data[a..b])
    }

    /// Apply `f(row, col, value)` to every stored entry.
    pub fn map_entries(&self, mut f: impl FnMut(usize, usize, f64) -> f64) -> Self {
        let mut out = self.clone();
        for i in 0..self.rows {
            for k in self.indptr[i]..self.indptr[i + 1] {
                out.data[k] = f(i, self.indices[k], self.data[k]);
            }
        }
        out
    }

    /// Each non-empty row scaled to unit L1 norm.
    pub fn row_normalize_l1(&self) -> Self {
        let mut out = self.clone();
        for i in 0..self.rows {
            let (a, b) = (self.indptr[i], self.indptr[i + 1]);
            let s: f64 = out.data[a..b].iter().map(|x| x.abs()).sum();
            if s > 0.0 {
                for x in &mut out.data[a..b] {
                    *x /= s;
                }
            }
        }
        out
    }

    /// Column sums.
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for (&j, &x) in self.indices.iter().zip(self.data.iter()) {
            sums[j] += x;
        }
        sums
    }

    /// `self + alpha * I` (square matrices only).
    pub fn add_identity(&self, alpha: f64) -> Self {
        debug_assert_eq!(self.rows, self.cols);
        let mut indptr = vec![0usize; self.rows + 1];
        let mut indices = Vec::with_capacity(self.nnz() + self.rows);
        let mut data = Vec::with_capacity(self.nnz() + self.rows);
        for i in 0..self.rows {
            let (cols, vals) = self.row(i);
            let mut placed = false;
            for (&j, &x) in cols.iter().zip(vals.iter()) {
                if !placed && j >= i {
                    if j == i {
                        indices.push(j);
                        data.push(x + alpha);
                        placed = true;
                        continue;
                    }
                    indices.push(i);
                    data.push(alpha);
                    placed = true;
                }
                indices.push(j);
                data.push(x);
            }
            if !placed {
                indices.push(i);
                data.push(alpha);
            }
            indptr[i + 1] = indices.len();
        }
        Self { rows: self.rows, cols: self.cols, indptr, indices, data }
    }

    /// `self * x` for a dense right-hand side.
    pub fn matmul_dense(&self, x: &Array2<f64>) -> Array2<f64> {
        debug_assert_eq!(self.cols, x.nrows());
        let mut out = Array2::<f64>::zeros((self.rows, x.ncols()));
        for i in 0..self.rows {
            let mut out_row = out.row_mut(i);
            let (cols, vals) = self.row(i);
            for (&j, &a) in cols.iter().zip(vals.iter()) {
                out_row.scaled_add(a, &x.row(j));
            }
        }
        out
    }

    /// `self^T * x` for a dense right-hand side.
    pub fn t_matmul_dense(&self, x: &Array2<f64>) -> Array2<f64> {
        debug_assert_eq!(self.rows, x.nrows());
        let mut out = Array2::<f64>::zeros((self.cols, x.ncols()));
        for i in 0..self.rows {
            let x_row = x.row(i);
            let (cols, vals) = self.row(i);
            for (&j, &a) in cols.iter().zip(vals.iter()) {
                out.row_mut(j).scaled_add(a, &x_row);
            }
        }
        out
    }

    /// Sparse-sparse product.
    pub fn matmul_sparse(&self, other: &SparseMatrix) -> Self {
        debug_assert_eq!(self.cols, other.rows);
        let mut indptr = vec![0usize; self.rows + 1];
        let mut indices = Vec::new();
        let mut data = Vec::new();
        let mut acc: HashMap<usize, f64> = HashMap::new();
        for i in 0..self.rows {
            acc.clear();
            let (cols, vals) = self.row(i);
            for (&k, &a) in cols.iter().zip(vals.iter()) {
                let (ocols, ovals) = other.row(k);
                for (&j, &b) in ocols.iter().zip(ovals.iter()) {
                    *acc.entry(j).or_insert(0.0) += a * b;
                }
            }
            let mut row: Vec<(usize, f64)> = acc.iter().map(|(&j, &x)| (j, x)).collect();
            row.sort_unstable_by_key(|&(j, _)| j);
            for (j, x) in row {
                indices.push(j);
                data.push(x);
            }
            indptr[i + 1] = indices.len();
        }
        Self { rows: self.rows, cols: other.cols, indptr, indices, data }
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((self.rows, self.cols));
        for i in 0..self.rows {
            let (cols, vals) = self.row(i);
            for (&j, &x) in cols.iter().zip(vals.iter()) {
                out[[i, j]] = x;
            }
        }
        out
    }
}

/// Anything that can be multiplied against a dense block from either side.
pub trait LinearOperator {
    fn shape(&self) -> (usize, usize);
    /// `A * x`
    fn apply(&self, x: &Array2<f64>) -> Array2<f64>;
    /// `A^T * x`
    fn apply_t(&self, x: &Array2<f64>) -> Array2<f64>;
}

impl LinearOperator for SparseMatrix {
    fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
    fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        self.matmul_dense(x)
    }
    fn apply_t(&self, x: &Array2<f64>) -> Array2<f64> {
        self.t_matmul_dense(x)
    }
}

impl LinearOperator for Array2<f64> {
    fn shape(&self) -> (usize, usize) {
        self.dim()
    }
    fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        self.dot(x)
    }
    fn apply_t(&self, x: &Array2<f64>) -> Array2<f64> {
        self.t().dot(x)
    }
}

/// Randomized truncated SVD.
///
/// Returns the leading `k` left singular vectors (`m x k`) and singular values
/// (descending). Right singular vectors are never needed by the embedders.
pub fn randomized_svd<A: LinearOperator>(
    op: &A,
    k: usize,
    n_iter: usize,
    oversample: usize,
    seed: u64,
) -> Result<(Array2<f64>, Array1<f64>)> {
    let (m, n) = op.shape();
    if k == 0 {
        return Err(Error::InvalidConfig("n_components must be > 0".into()));
    }
    if k > m.min(n) {
        return Err(Error::InvalidConfig(format!(
            "n_components={k} exceeds matrix rank bound {}",
            m.min(n)
        )));
    }
    let l = (k + oversample).min(m.min(n));

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let omega = Array2::from_shape_simple_fn((n, l), || StandardNormal.sample(&mut rng));

    let mut q = op.apply(&omega);
    orthonormalize_columns(&mut q);
    for _ in 0..n_iter {
        let mut z = op.apply_t(&q);
        orthonormalize_columns(&mut z);
        q = op.apply(&z);
        orthonormalize_columns(&mut q);
    }

    // B = Q^T A, so B B^T = (A^T Q)^T (A^T Q).
    let bt = op.apply_t(&q);
    let gram = bt.t().dot(&bt);
    let (evals, evecs) = symmetric_eigen(&gram);

    let mut order: Vec<usize> = (0..evals.len()).collect();
    order.sort_by(|&a, &b| evals[b].total_cmp(&evals[a]));
    let top = &order[..k];

    let sigma = Array1::from_iter(top.iter().map(|&i| evals[i].max(0.0).sqrt()));
    let vk = evecs.select(Axis(1), top);
    Ok((q.dot(&vk), sigma))
}

/// Modified Gram-Schmidt on the columns of `x`, in place.
///
/// Columns that are (numerically) dependent on earlier ones are zeroed.
pub fn orthonormalize_columns(x: &mut Array2<f64>) {
    let cols = x.ncols();
    for j in 0..cols {
        for i in 0..j {
            let proj = x.column(i).dot(&x.column(j));
            let ci = x.column(i).to_owned();
            x.column_mut(j).scaled_add(-proj, &ci);
        }
        let norm = x.column(j).dot(&x.column(j)).sqrt();
        if norm > 1e-12 {
            x.column_mut(j).mapv_inplace(|v| v / norm);
        } else {
            x.column_mut(j).fill(0.0);
        }
    }
}

/// Eigen-decomposition of a small symmetric matrix (cyclic Jacobi).
///
/// Returns `(eigenvalues, eigenvectors)` with eigenvectors in columns, unsorted.
pub fn symmetric_eigen(a: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    let mut a = a.clone();
    let mut v = Array2::<f64>::eye(n);

    let scale: f64 = a.iter().map(|x| x * x).sum::<f64>().max(f64::MIN_POSITIVE);
    for _sweep in 0..100 {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= 1e-24 * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    ((0..n).map(|i| a[[i, i]]).collect(), v)
}

/// Scale every non-zero row to unit L2 norm, in place.
pub fn normalize_rows_l2(x: &mut Array2<f64>) {
    for mut row in x.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
}

/// Modified Bessel function of the first kind, `I_k(x)`, by power series.
pub fn bessel_i(k: u32, x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    for i in 1..=k {
        term *= half / i as f64;
    }
    let mut sum = term;
    let sq = half * half;
    for m in 1..500u32 {
        term *= sq / (m as f64 * (m + k) as f64);
        sum += term;
        if term.abs() <= 1e-17 * sum.abs() {
            break;
        }
    }
    sum
}

pub(crate) fn cosine(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let na = a.dot(&a).sqrt();
    let nb = b.dot(&b).sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    a.dot(&b) / (na * nb)
}
