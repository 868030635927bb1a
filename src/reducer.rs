//! Embeddings by reducing the adjacency matrix directly.
//!
//! Any [`Reducer`] (a map from an `n x n` sparse matrix to `n x d` features)
//! becomes an [`Embedder`] through [`AdjacencyEmbedder`].

use crate::csr::CsrGraph;
use crate::embedder::{ensure_non_empty, Embedder};
use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use crate::linalg::{randomized_svd, SparseMatrix};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Dimensionality reduction of a sparse matrix to `n_components` columns.
pub trait Reducer {
    fn reduce(&self, matrix: &SparseMatrix, n_components: usize) -> Result<Array2<f32>>;
}

/// Randomized truncated SVD; rows are `U * S` (the projection onto the top
/// right singular vectors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncatedSvd {
    /// Power iterations.
    pub n_iter: usize,
    pub seed: u64,
}

impl Default for TruncatedSvd {
    fn default() -> Self {
        Self { n_iter: 5, seed: 42 }
    }
}

impl Reducer for TruncatedSvd {
    fn reduce(&self, matrix: &SparseMatrix, n_components: usize) -> Result<Array2<f32>> {
        let (u, s) = randomized_svd(matrix, n_components, self.n_iter, 10, self.seed)?;
        Ok((u * &s).mapv(|x| x as f32))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjacencyEmbedder<R> {
    pub reducer: R,
    pub n_components: usize,
    /// Row-normalize the adjacency before reducing.
    pub normalize_graph: bool,
    embeddings: Option<Embeddings>,
}

impl<R: Reducer> AdjacencyEmbedder<R> {
    pub fn new(reducer: R, n_components: usize) -> Self {
        Self { reducer, n_components, normalize_graph: true, embeddings: None }
    }

    pub fn with_normalize_graph(mut self, normalize: bool) -> Self {
        self.normalize_graph = normalize;
        self
    }
}

impl Default for AdjacencyEmbedder<TruncatedSvd> {
    fn default() -> Self {
        Self::new(TruncatedSvd::default(), 32)
    }
}

impl<R: Reducer> Embedder for AdjacencyEmbedder<R> {
    fn fit(&mut self, graph: &CsrGraph) -> Result<()> {
        self.embeddings = None;
        ensure_non_empty(graph)?;
        if self.n_components == 0 {
            return Err(Error::InvalidConfig("n_components must be > 0".into()));
        }
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            dim = self.n_components,
            normalize = self.normalize_graph,
            "fitting adjacency reducer"
        );
        let started = Instant::now();

        let matrix = graph.to_sparse_matrix();
        let matrix = if self.normalize_graph { matrix.row_normalize_l1() } else { matrix };
        let vectors = self.reducer.reduce(&matrix, self.n_components)?;
        if vectors.nrows() != graph.node_count() {
            return Err(Error::InvalidConfig(format!(
                "reducer returned {} rows for {} nodes",
                vectors.nrows(),
                graph.node_count()
            )));
        }

        self.embeddings = Some(Embeddings::new(graph.names().to_vec(), vectors)?);
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "adjacency reducer fitted");
        Ok(())
    }

    fn embeddings(&self) -> Option<&Embeddings> {
        self.embeddings.as_ref()
    }
}
