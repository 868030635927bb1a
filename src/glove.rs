//! GloVe on graphs: edge weights are treated as co-occurrence counts.
//!
//! Minimizes `Σ f(w_uv) (x_u · x_v + b_u + b_v - ln w_uv)²` with AdaGrad, where
//! `f(w) = min(1, (w / max_count)^exponent)` damps the pull of very heavy edges.
//!
//! Pennington et al. (2014). "GloVe: Global Vectors for Word Representation."

use crate::csr::CsrGraph;
use crate::embedder::{ensure_non_empty, Convergence, Embedder};
use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GloVeConfig {
    pub n_components: usize,
    pub tol: f32,
    pub tol_samples: usize,
    pub max_epoch: usize,
    pub learning_rate: f32,
    pub max_loss: f32,
    /// Counts at or above this get full weight.
    pub max_count: f32,
    pub exponent: f32,
    pub seed: u64,
}

impl Default for GloVeConfig {
    fn default() -> Self {
        Self {
            n_components: 32,
            tol: 1e-4,
            tol_samples: 10,
            max_epoch: 10_000,
            learning_rate: 0.1,
            max_loss: 10.0,
            max_count: 50.0,
            exponent: 0.5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GloVe {
    pub config: GloVeConfig,
    embeddings: Option<Embeddings>,
}

impl GloVe {
    pub fn new(config: GloVeConfig) -> Self {
        Self { config, embeddings: None }
    }
}

struct AdaGrad {
    dim: usize,
    x: Vec<f32>,
    b: Vec<f32>,
    gx: Vec<f32>,
    gb: Vec<f32>,
}

impl AdaGrad {
    fn edge(&mut self, u: usize, v: usize, count: f32, c: &GloVeConfig) -> f32 {
        let weight = if count < c.max_count { (count / c.max_count).powf(c.exponent) } else { 1.0 };
        let (uo, vo) = (u * self.dim, v * self.dim);

        let mut dot = 0.0f32;
        for i in 0..self.dim {
            dot += self.x[uo + i] * self.x[vo + i];
        }
        let diff = (dot + self.b[u] + self.b[v] - count.ln()).clamp(-c.max_loss, c.max_loss);
        let fdiff = weight * diff;

        for i in 0..self.dim {
            let (xu, xv) = (self.x[uo + i], self.x[vo + i]);
            let (gu, gv) = (fdiff * xv, fdiff * xu);
            self.x[uo + i] -= c.learning_rate * gu / self.gx[uo + i].sqrt();
            self.x[vo + i] -= c.learning_rate * gv / self.gx[vo + i].sqrt();
            self.gx[uo + i] += gu * gu;
            self.gx[vo + i] += gv * gv;
        }
        self.b[u] -= c.learning_rate * fdiff / self.gb[u].sqrt();
        self.b[v] -= c.learning_rate * fdiff / self.gb[v].sqrt();
        self.gb[u] += fdiff * fdiff;
        self.gb[v] += fdiff * fdiff;

        0.5 * weight * diff * diff
    }

    /// One pass over `edges`; mean weighted loss.
    fn epoch(&mut self, edges: &[(usize, usize, f32)], c: &GloVeConfig) -> f32 {
        if edges.is_empty() {
            return 0.0;
        }
        let total: f64 = edges.iter().map(|&(u, v, w)| self.edge(u, v, w, c) as f64).sum();
        (total / edges.len() as f64) as f32
    }
}

impl Embedder for GloVe {
    fn fit(&mut self, graph: &CsrGraph) -> Result<()> {
        self.embeddings = None;
        ensure_non_empty(graph)?;
        let c = self.config.clone();
        if c.n_components == 0 || !(c.max_count > 0.0) || !(c.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(
                "n_components, max_count and learning_rate must be > 0".into(),
            ));
        }
        let n = graph.node_count();
        let edges: Vec<(usize, usize, f32)> = graph.edges().filter(|&(_, _, w)| w > 0.0).collect();
        info!(nodes = n, edges = edges.len(), dim = c.n_components, "fitting glove");
        if edges.is_empty() {
            warn!("graph has no positive-weight edges; vectors stay at their random initialization");
        }
        let started = Instant::now();

        let mut rng = ChaCha8Rng::seed_from_u64(c.seed);
        let dim = c.n_components;
        let mut state = AdaGrad {
            dim,
            x: (0..n * dim).map(|_| (rng.random::<f32>() - 0.5) / dim as f32).collect(),
            b: vec![0.0; n],
            gx: vec![1.0; n * dim],
            gb: vec![1.0; n],
        };

        let mut convergence = Convergence::new(c.tol, c.tol_samples);
        let mut epochs_run = 0;
        for epoch in 0..c.max_epoch {
            epochs_run = epoch + 1;
            let loss = state.epoch(&edges, &c);
            if !loss.is_finite() {
                return Err(Error::Diverged { epoch });
            }
            debug!(epoch, loss, "glove epoch");
            if convergence.update(loss) {
                break;
            }
        }

        let vectors = Array2::from_shape_vec((n, dim), state.x)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        self.embeddings = Some(Embeddings::new(graph.names().to_vec(), vectors)?);
        info!(epochs = epochs_run, elapsed_ms = started.elapsed().as_millis() as u64, "glove fitted");
        Ok(())
    }

    fn embeddings(&self) -> Option<&Embeddings> {
        self.embeddings.as_ref()
    }
}
