//! ProNE: fast and scalable network representation learning.
//!
//! Two stages:
//! 1. Sparse matrix factorization of a shifted log transition matrix
//!    (negative-sampling corrected), via randomized truncated SVD.
//! 2. Spectral propagation: a Chebyshev expansion of a band-pass filter on the
//!    normalized Laplacian, applied to the stage-1 features, then re-factorized.
//!
//! Zhang et al. (2019). "ProNE: Fast and Scalable Network Representation Learning."

use crate::csr::CsrGraph;
use crate::embedder::{ensure_non_empty, Embedder};
use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use crate::linalg::{bessel_i, normalize_rows_l2, randomized_svd, LinearOperator, SparseMatrix};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

const SVD_ITERS: usize = 5;
const SVD_OVERSAMPLE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProNEConfig {
    pub n_components: usize,
    /// Chebyshev expansion order. 1 disables propagation.
    pub step: u32,
    /// Band-pass center on the Laplacian spectrum.
    pub mu: f64,
    /// Bessel coefficient scale.
    pub theta: f64,
    /// Exponent on column sums for the negative-sampling correction.
    pub exponent: f64,
    pub seed: u64,
}

impl Default for ProNEConfig {
    fn default() -> Self {
        Self { n_components: 32, step: 10, mu: 0.2, theta: 0.5, exponent: 0.75, seed: 42 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProNE {
    pub config: ProNEConfig,
    embeddings: Option<Embeddings>,
}

impl ProNE {
    pub fn new(config: ProNEConfig) -> Self {
        Self { config, embeddings: None }
    }

    /// Stage 1 features: `U * sqrt(S)` of the corrected log matrix, rows L2-normalized.
    pub fn pre_factorization(&self, adjacency: &SparseMatrix) -> Result<Array2<f64>> {
        let c1 = adjacency.row_normalize_l1();

        let mut neg: Vec<f64> = c1.col_sums().into_iter().map(|s| s.powf(self.config.exponent)).collect();
        let total: f64 = neg.iter().sum();
        if total > 0.0 {
            for x in &mut neg {
                *x /= total;
            }
        }

        // ln(C1_ij) - ln(A_ij * neg_j) on A's sparsity pattern; non-positive
        // entries contribute ln(1) = 0.
        let log_pos = |x: f64| if x > 0.0 { x.ln() } else { 0.0 };
        let m = c1.map_entries(|i, j, c| {
            let (cols, vals) = adjacency.row(i);
            let a = cols.binary_search(&j).map(|k| vals[k]).unwrap_or(0.0);
            log_pos(c) - log_pos(a * neg[j])
        });

        self.tsvd(&m)
    }

    /// Stage 2: Chebyshev band-pass propagation of `features` over the graph.
    pub fn chebyshev_gaussian(&self, adjacency: &SparseMatrix, features: &Array2<f64>) -> Result<Array2<f64>> {
        let step = self.config.step;
        if step <= 1 {
            return Ok(features.clone());
        }
        let (mu, theta) = (self.config.mu, self.config.theta);

        let a = adjacency.add_identity(1.0);
        let da = a.row_normalize_l1();
        // M = L - mu*I = (I - DA) - mu*I, so M x = (1 - mu) x - DA x.
        let apply_m = |x: &Array2<f64>| -> Array2<f64> { x * (1.0 - mu) - da.matmul_dense(x) };

        let mut lx0 = features.clone();
        let mut lx1 = apply_m(features);
        lx1 = apply_m(&lx1) * 0.5 - features;

        let mut conv = &lx0 * bessel_i(0, theta) - &lx1 * (2.0 * bessel_i(1, theta));
        for i in 2..step {
            let mut lx2 = apply_m(&lx1);
            lx2 = (apply_m(&lx2) - &lx1 * 2.0) - &lx0;
            let coef = 2.0 * bessel_i(i, theta);
            if i % 2 == 0 {
                conv = conv + &lx2 * coef;
            } else {
                conv = conv - &lx2 * coef;
            }
            lx0 = lx1;
            lx1 = lx2;
        }

        let mm = a.matmul_dense(&(features - &conv));
        self.tsvd(&mm)
    }

    fn tsvd<A: LinearOperator>(&self, matrix: &A) -> Result<Array2<f64>> {
        let (u, s) = randomized_svd(matrix, self.config.n_components, SVD_ITERS, SVD_OVERSAMPLE, self.config.seed)?;
        let mut x = u * &s.mapv(f64::sqrt);
        normalize_rows_l2(&mut x);
        Ok(x)
    }
}

impl Embedder for ProNE {
    fn fit(&mut self, graph: &CsrGraph) -> Result<()> {
        self.embeddings = None;
        ensure_non_empty(graph)?;
        let n = graph.node_count();
        if self.config.n_components == 0 || self.config.n_components > n {
            return Err(Error::InvalidConfig(format!(
                "n_components={} must be in 1..={n}",
                self.config.n_components
            )));
        }
        info!(nodes = n, edges = graph.edge_count(), dim = self.config.n_components, "fitting prone");
        let started = Instant::now();

        let adjacency = graph.to_sparse_matrix();
        let features = self.pre_factorization(&adjacency)?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "prone factorization done");
        let vectors = self.chebyshev_gaussian(&adjacency, &features)?;

        if vectors.iter().any(|x| !x.is_finite()) {
            return Err(Error::Diverged { epoch: 0 });
        }
        self.embeddings = Some(Embeddings::new(graph.names().to_vec(), vectors.mapv(|x| x as f32))?);
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "prone fitted");
        Ok(())
    }

    fn embeddings(&self) -> Option<&Embeddings> {
        self.embeddings.as_ref()
    }
}
