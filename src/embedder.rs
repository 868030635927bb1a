//! The common embedder interface.

use crate::csr::CsrGraph;
use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// A model that learns one vector per graph node.
pub trait Embedder {
    /// Learn embeddings for every node of `graph`, replacing any previous fit.
    /// On error the model is left unfitted.
    fn fit(&mut self, graph: &CsrGraph) -> Result<()>;

    /// Learned embeddings, if fitted.
    fn embeddings(&self) -> Option<&Embeddings>;

    /// `fit`, then return the vectors in node-index order.
    fn fit_transform(&mut self, graph: &CsrGraph) -> Result<Array2<f32>> {
        self.fit(graph)?;
        Ok(self.embeddings().ok_or(Error::NotFitted)?.as_array().clone())
    }

    /// Vector of a node by name.
    fn predict(&self, node: &str) -> Result<Vec<f32>> {
        let emb = self.embeddings().ok_or(Error::NotFitted)?;
        Ok(emb.get(node)?.to_vec())
    }

    /// Write the learned vectors in word2vec text format.
    fn save_vectors(&self, path: &Path) -> Result<()> {
        self.embeddings().ok_or(Error::NotFitted)?.save_vectors(path)
    }
}

/// Persist an embedder (configuration plus learned vectors) as JSON.
pub fn save<M: Serialize>(model: &M, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let w = BufWriter::new(File::create(path)?);
    serde_json::to_writer(w, model)?;
    info!(path = %path.display(), "saved model");
    Ok(())
}

/// Load an embedder written by [`save`].
pub fn load<M: DeserializeOwned>(path: impl AsRef<Path>) -> Result<M> {
    let r = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(r)?)
}

pub(crate) fn ensure_non_empty(graph: &CsrGraph) -> Result<()> {
    if graph.is_empty() {
        return Err(Error::EmptyGraph);
    }
    Ok(())
}

/// Converging-loss tracker shared by the gradient embedders.
///
/// Stops when the loss drops below `tol`, or when the last `window` losses
/// span less than `tol`.
#[derive(Debug)]
pub(crate) struct Convergence {
    tol: f32,
    window: usize,
    recent: std::collections::VecDeque<f32>,
}

impl Convergence {
    pub(crate) fn new(tol: f32, window: usize) -> Self {
        Self { tol, window, recent: std::collections::VecDeque::with_capacity(window + 1) }
    }

    /// Record an epoch loss; true when training should stop.
    pub(crate) fn update(&mut self, loss: f32) -> bool {
        if loss < self.tol {
            return true;
        }
        if self.window == 0 {
            return false;
        }
        self.recent.push_back(loss);
        if self.recent.len() > self.window {
            self.recent.pop_front();
        }
        if self.recent.len() < self.window {
            return false;
        }
        let (lo, hi) = self
            .recent
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        hi - lo < self.tol
    }
}
