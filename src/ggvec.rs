//! GGVec: global graph vectors.
//!
//! Fits `x_u · x_v + b_u + b_v ≈ w_uv^exponent` directly on the stored edges with
//! plain SGD, plus a light negative pass that pushes random non-edges toward zero.
//! There is no walk corpus, so this scales with the edge count and is usually
//! the fastest embedder on large graphs.

use crate::csr::CsrGraph;
use crate::embedder::{ensure_non_empty, Convergence, Embedder};
use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Early-stopping tolerance on the epoch loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ToleranceRepr", into = "ToleranceRepr")]
pub enum Tolerance {
    /// `max(learning_rate / 2, 0.05)`
    Auto,
    Value(f32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ToleranceRepr {
    Value(f32),
    Named(String),
}

impl TryFrom<ToleranceRepr> for Tolerance {
    type Error = String;

    fn try_from(repr: ToleranceRepr) -> std::result::Result<Self, String> {
        match repr {
            ToleranceRepr::Value(v) => Ok(Tolerance::Value(v)),
            ToleranceRepr::Named(s) if s.eq_ignore_ascii_case("auto") => Ok(Tolerance::Auto),
            ToleranceRepr::Named(s) => Err(format!("invalid tolerance {s:?}, expected a number or \"auto\"")),
        }
    }
}

impl From<Tolerance> for ToleranceRepr {
    fn from(t: Tolerance) -> Self {
        match t {
            Tolerance::Auto => ToleranceRepr::Named("auto".into()),
            Tolerance::Value(v) => ToleranceRepr::Value(v),
        }
    }
}

impl Tolerance {
    fn resolve(self, learning_rate: f32) -> f32 {
        match self {
            Tolerance::Auto => (learning_rate / 2.0).max(0.05),
            Tolerance::Value(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GGVecConfig {
    pub n_components: usize,
    /// Fit the `order`-th power of the adjacency (neighbors of neighbors for 2).
    /// Cost grows roughly quadratically with each step.
    pub order: u32,
    pub learning_rate: f32,
    /// Residual clip.
    pub max_loss: f32,
    pub tol: Tolerance,
    /// Plateau window (epochs).
    pub tol_samples: usize,
    /// Edge weights are fit as `w^exponent`.
    pub exponent: f32,
    /// Negative samples per node, as a fraction of its degree.
    pub negative_ratio: f32,
    pub max_epoch: usize,
    pub seed: u64,
}

impl Default for GGVecConfig {
    fn default() -> Self {
        Self {
            n_components: 32,
            order: 1,
            learning_rate: 0.1,
            max_loss: 10.0,
            tol: Tolerance::Auto,
            tol_samples: 75,
            exponent: 0.33,
            negative_ratio: 0.15,
            max_epoch: 350,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GGVec {
    pub config: GGVecConfig,
    embeddings: Option<Embeddings>,
}

impl GGVec {
    pub fn new(config: GGVecConfig) -> Self {
        Self { config, embeddings: None }
    }

    fn validate(&self) -> Result<()> {
        let c = &self.config;
        if c.n_components == 0 {
            return Err(Error::InvalidConfig("n_components must be > 0".into()));
        }
        if c.order == 0 {
            return Err(Error::InvalidConfig("order must be >= 1".into()));
        }
        if !(c.learning_rate > 0.0) || !(c.max_loss > 0.0) {
            return Err(Error::InvalidConfig("learning_rate and max_loss must be > 0".into()));
        }
        if c.negative_ratio < 0.0 {
            return Err(Error::InvalidConfig("negative_ratio must be >= 0".into()));
        }
        Ok(())
    }
}

/// Adjacency raised to `order`, diagonal dropped.
fn graph_power(graph: &CsrGraph, order: u32) -> Result<CsrGraph> {
    let a = graph.to_sparse_matrix();
    let mut acc = a.clone();
    for _ in 1..order {
        acc = acc.matmul_sparse(&a);
    }
    let acc = acc.map_entries(|i, j, x| if i == j { 0.0 } else { x });
    graph.with_matrix(&acc)
}

struct Params {
    dim: usize,
    x: Vec<f32>,
    b: Vec<f32>,
}

impl Params {
    /// One clipped SGD step on the pair toward `target`. Returns the clipped residual.
    fn step(&mut self, u: usize, v: usize, target: f32, lr: f32, max_loss: f32) -> f32 {
        let (uo, vo) = (u * self.dim, v * self.dim);
        let mut dot = 0.0f32;
        for i in 0..self.dim {
            dot += self.x[uo + i] * self.x[vo + i];
        }
        let loss = (dot + self.b[u] + self.b[v] - target).clamp(-max_loss, max_loss);
        let g = lr * loss;
        for i in 0..self.dim {
            let (xu, xv) = (self.x[uo + i], self.x[vo + i]);
            self.x[uo + i] -= g * xv;
            self.x[vo + i] -= g * xu;
        }
        self.b[u] -= g;
        self.b[v] -= g;
        loss
    }
}

/// Fit on `graph` (already raised to the configured order). Returns the flat
/// `n * dim` vectors and the per-epoch mean positive loss.
fn train(graph: &CsrGraph, c: &GGVecConfig) -> Result<(Vec<f32>, Vec<f32>)> {
    let n = graph.node_count();
    let nnz = graph.edge_count();
    let mut rng = ChaCha8Rng::seed_from_u64(c.seed);
    let dim = c.n_components;
    let scale = 1.0 / (dim as f32).sqrt();
    let mut params = Params {
        dim,
        x: (0..n * dim).map(|_| (rng.random::<f32>() - 0.5) * scale).collect(),
        b: vec![0.0; n],
    };
    let targets: Vec<f32> = graph.weights().iter().map(|w| w.powf(c.exponent)).collect();

    let mut convergence = Convergence::new(c.tol.resolve(c.learning_rate), c.tol_samples);
    let mut losses = Vec::new();
    for epoch in 0..c.max_epoch {
        let mut total = 0.0f64;
        for u in 0..n {
            let (lo, hi) = (graph.indptr()[u], graph.indptr()[u + 1]);
            for k in lo..hi {
                let v = graph.indices()[k];
                total += params.step(u, v, targets[k], c.learning_rate, c.max_loss).abs() as f64;
            }
        }
        negative_pass(&mut params, graph, c, &mut rng);

        let loss = if nnz > 0 { (total / nnz as f64) as f32 } else { 0.0 };
        if !loss.is_finite() || params.x.iter().any(|x| !x.is_finite()) {
            return Err(Error::Diverged { epoch });
        }
        debug!(epoch, loss, "ggvec epoch");
        losses.push(loss);
        if convergence.update(loss) {
            break;
        }
    }
    Ok((params.x, losses))
}

/// Push `ceil(negative_ratio * max(deg, 1))` random partners of each node toward
/// zero. Draws landing on the node or a neighbor are dropped. Returns the number
/// of updates made.
fn negative_pass(params: &mut Params, graph: &CsrGraph, c: &GGVecConfig, rng: &mut ChaCha8Rng) -> usize {
    let n = graph.node_count();
    if !(c.negative_ratio > 0.0) || n < 2 {
        return 0;
    }
    let mut updates = 0;
    for u in 0..n {
        let draws = (c.negative_ratio * graph.degree(u).max(1) as f32).ceil() as usize;
        for _ in 0..draws {
            let v = rng.random_range(0..n);
            if v == u || graph.has_edge(u, v) {
                continue;
            }
            params.step(u, v, 0.0, c.learning_rate, c.max_loss);
            updates += 1;
        }
    }
    updates
}

impl Embedder for GGVec {
    fn fit(&mut self, graph: &CsrGraph) -> Result<()> {
        self.embeddings = None;
        ensure_non_empty(graph)?;
        self.validate()?;
        let c = &self.config;
        let started = Instant::now();

        let graph: Cow<'_, CsrGraph> =
            if c.order > 1 { Cow::Owned(graph_power(graph, c.order)?) } else { Cow::Borrowed(graph) };
        let n = graph.node_count();
        info!(nodes = n, edges = graph.edge_count(), order = c.order, dim = c.n_components, "fitting ggvec");
        if graph.edge_count() == 0 {
            warn!("graph has no edges; vectors stay at their random initialization");
        }

        let (x, losses) = train(&graph, c)?;
        let vectors = Array2::from_shape_vec((n, c.n_components), x)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        info!(
            epochs = losses.len(),
            loss = losses.last().copied().unwrap_or_default(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ggvec fitted"
        );
        self.embeddings = Some(Embeddings::new(graph.names().to_vec(), vectors)?);
        Ok(())
    }

    fn embeddings(&self) -> Option<&Embeddings> {
        self.embeddings.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_parses_auto_and_numbers() {
        let auto: Tolerance = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, Tolerance::Auto);
        let v: Tolerance = serde_json::from_str("0.25").unwrap();
        assert_eq!(v, Tolerance::Value(0.25));
        assert!(serde_json::from_str::<Tolerance>("\"soon\"").is_err());
        assert_eq!(Tolerance::Auto.resolve(0.4), 0.2);
        assert_eq!(Tolerance::Auto.resolve(0.01), 0.05);
    }

    fn triangle_with_pendant() -> CsrGraph {
        CsrGraph::from_edges(4, &[(0, 1), (1, 2), (2, 0), (2, 3)], false).unwrap()
    }

    fn dot(e: &Embeddings, a: usize, b: usize) -> f32 {
        e.vector(a).unwrap().dot(&e.vector(b).unwrap())
    }

    #[test]
    fn fits_edge_weights() {
        let g = triangle_with_pendant();
        let cfg = GGVecConfig {
            n_components: 8,
            tol: Tolerance::Value(1e-3),
            max_epoch: 2_000,
            negative_ratio: 0.0,
            ..Default::default()
        };
        let (_, losses) = train(&g, &cfg).unwrap();
        assert!(losses[0] > 0.5, "first={}", losses[0]);
        assert!(losses.last().unwrap() < &0.05, "last={:?}", losses.last());

        let mut model = GGVec::new(cfg);
        model.fit(&g).unwrap();
        let e = model.embeddings().unwrap();
        assert_eq!(e.as_array().dim(), (4, 8));
        assert!(e.as_array().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn auto_tolerance_stops_before_max_epoch() {
        let g = triangle_with_pendant();
        let cfg = GGVecConfig { n_components: 8, negative_ratio: 0.0, max_epoch: 20_000, ..Default::default() };
        let (_, losses) = train(&g, &cfg).unwrap();
        assert!(losses.len() < cfg.max_epoch, "ran all {} epochs", losses.len());

        // Stopping early means a larger budget changes nothing.
        let a = GGVec::new(cfg.clone()).fit_transform(&g).unwrap();
        let b = GGVec::new(GGVecConfig { max_epoch: 40_000, ..cfg }).fit_transform(&g).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn negative_pass_skips_self_and_neighbors() {
        let cfg = GGVecConfig { n_components: 4, negative_ratio: 3.0, ..Default::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        // Every draw in a clique is the node itself or a neighbor.
        let clique = CsrGraph::from_edges(4, &[(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)], false).unwrap();
        let mut params = Params { dim: 4, x: vec![0.5; 16], b: vec![0.0; 4] };
        assert_eq!(negative_pass(&mut params, &clique, &cfg, &mut rng), 0);
        assert!(params.x.iter().all(|&x| x == 0.5));
        assert!(params.b.iter().all(|&b| b == 0.0));

        // In a star, the hub has every other node as a neighbor, so it is never
        // part of a negative pair; leaves still pair up with each other.
        let star = CsrGraph::from_edges(4, &[(0, 1), (0, 2), (0, 3)], false).unwrap();
        let mut params = Params { dim: 4, x: vec![0.5; 16], b: vec![0.0; 4] };
        let updates = negative_pass(&mut params, &star, &cfg, &mut rng);
        assert!(updates > 0);
        assert!(updates <= 3 * 3);
        assert!(params.x[..4].iter().all(|&x| x == 0.5));
        assert_eq!(params.b[0], 0.0);
        assert!(params.x[4..].iter().any(|&x| x != 0.5));
    }

    #[test]
    fn huge_learning_rate_diverges() {
        let g = triangle_with_pendant();
        let cfg = GGVecConfig { learning_rate: 1e30, max_loss: 1e30, max_epoch: 50, ..Default::default() };
        let mut model = GGVec::new(cfg);
        assert!(matches!(model.fit(&g), Err(Error::Diverged { .. })));
        assert!(model.embeddings().is_none());
    }

    #[test]
    fn failed_refit_clears_previous_vectors() {
        let g = triangle_with_pendant();
        let mut model = GGVec::new(GGVecConfig { n_components: 4, max_epoch: 10, ..Default::default() });
        model.fit(&g).unwrap();
        assert!(model.embeddings().is_some());

        model.config.learning_rate = 1e30;
        model.config.max_loss = 1e30;
        assert!(model.fit(&g).is_err());
        assert!(matches!(model.predict("0"), Err(Error::NotFitted)));
    }

    #[test]
    fn edges_score_above_non_edges() {
        let g = CsrGraph::from_edges(4, &[(0, 1), (2, 3)], false).unwrap();
        let cfg = GGVecConfig { n_components: 8, negative_ratio: 1.0, max_epoch: 500, ..Default::default() };
        let mut model = GGVec::new(cfg);
        model.fit(&g).unwrap();
        let e = model.embeddings().unwrap();
        assert!(dot(e, 0, 1) > dot(e, 0, 2));
        assert!(dot(e, 2, 3) > dot(e, 1, 3));
    }

    #[test]
    fn second_order_graph_links_two_hop_neighbors() {
        let g = CsrGraph::from_edges(3, &[(0, 1), (1, 2)], false).unwrap();
        let g2 = graph_power(&g, 2).unwrap();
        assert!(g2.has_edge(0, 2));
        assert!(!g2.has_edge(0, 0));
        assert!(!g2.has_edge(0, 1));
    }

    #[test]
    fn zero_order_is_rejected() {
        let g = CsrGraph::from_edges(2, &[(0, 1)], false).unwrap();
        let mut model = GGVec::new(GGVecConfig { order: 0, ..Default::default() });
        assert!(matches!(model.fit(&g), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn deterministic_for_seed() {
        let g = CsrGraph::from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 4)], false).unwrap();
        let cfg = GGVecConfig { n_components: 4, max_epoch: 20, ..Default::default() };
        let a = GGVec::new(cfg.clone()).fit_transform(&g).unwrap();
        let b = GGVec::new(cfg).fit_transform(&g).unwrap();
        assert_eq!(a, b);
    }
}
