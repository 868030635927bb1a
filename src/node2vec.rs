//! Node2Vec: biased random walks fed to skip-gram.
//!
//! Walk bias is expressed the way the walk corpus sees it:
//! - `return_weight` multiplies the chance of stepping straight back (`1/p`)
//! - `neighbor_weight` multiplies the chance of moving away from the previous
//!   node's neighborhood (`1/q`)
//!
//! With both at 1.0 the walk is a first-order walk proportional to edge weights
//! (DeepWalk on weighted graphs).
//!
//! Grover & Leskovec (2016). "node2vec: Scalable Feature Learning for Networks."

use crate::csr::CsrGraph;
use crate::embedder::{ensure_non_empty, Embedder};
use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use crate::alias::PrecomputedBiasedWalks;
use crate::random_walk::{WalkConfig, WeightedNode2VecPlusConfig};
use crate::word2vec::{SkipGram, SkipGramConfig};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// How walks are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkMode {
    /// Transition weights computed at each step from edge weights.
    #[default]
    Weighted,
    /// Alias tables built once per fit. Edge weights are ignored, and memory
    /// grows with `sum(deg^2)`.
    Precomputed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node2VecConfig {
    /// Embedding dimension.
    pub n_components: usize,
    /// Nodes per walk.
    pub walk_length: usize,
    /// Walks started from every node.
    pub epochs: usize,
    pub return_weight: f32,
    pub neighbor_weight: f32,
    pub walk_mode: WalkMode,
    /// Keep the generated walks on the model after `fit`.
    pub keep_walks: bool,
    pub seed: u64,
    /// Skip-gram settings. `embedding_dim` and `seed` are overridden by the fields above.
    pub word2vec: SkipGramConfig,
}

impl Default for Node2VecConfig {
    fn default() -> Self {
        Self {
            n_components: 32,
            walk_length: 30,
            epochs: 20,
            return_weight: 1.0,
            neighbor_weight: 1.0,
            walk_mode: WalkMode::Weighted,
            keep_walks: false,
            seed: 42,
            word2vec: SkipGramConfig {
                window_size: 10,
                negative_samples: 5,
                epochs: 10,
                ..Default::default()
            },
        }
    }
}

impl Node2VecConfig {
    pub fn with_n_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
    }

    pub fn with_walks(mut self, walk_length: usize, epochs: usize) -> Self {
        self.walk_length = walk_length;
        self.epochs = epochs;
        self
    }

    pub fn with_bias(mut self, return_weight: f32, neighbor_weight: f32) -> Self {
        self.return_weight = return_weight;
        self.neighbor_weight = neighbor_weight;
        self
    }

    pub fn with_walk_mode(mut self, mode: WalkMode) -> Self {
        self.walk_mode = mode;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.return_weight > 0.0) || !(self.neighbor_weight > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "return_weight ({}) and neighbor_weight ({}) must be > 0",
                self.return_weight, self.neighbor_weight
            )));
        }
        if self.n_components == 0 || self.walk_length == 0 || self.epochs == 0 {
            return Err(Error::InvalidConfig(
                "n_components, walk_length and epochs must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn walk_config(&self) -> WeightedNode2VecPlusConfig {
        WeightedNode2VecPlusConfig {
            length: self.walk_length,
            walks_per_node: self.epochs,
            p: 1.0 / self.return_weight,
            q: 1.0 / self.neighbor_weight,
            gamma: 0.0,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node2Vec {
    pub config: Node2VecConfig,
    embeddings: Option<Embeddings>,
    #[serde(skip)]
    walks: Option<Vec<Vec<usize>>>,
}

impl Node2Vec {
    pub fn new(config: Node2VecConfig) -> Self {
        Self { config, embeddings: None, walks: None }
    }

    /// Walks from the last `fit`, when `keep_walks` was set.
    pub fn walks(&self) -> Option<&[Vec<usize>]> {
        self.walks.as_deref()
    }

    fn generate_walks(&self, graph: &CsrGraph) -> Result<Vec<Vec<usize>>> {
        let cfg = self.config.walk_config();
        match self.config.walk_mode {
            WalkMode::Weighted => {
                #[cfg(feature = "parallel")]
                let walks = crate::random_walk::generate_biased_walks_weighted_ref_parallel(graph, cfg, false);
                #[cfg(not(feature = "parallel"))]
                let walks = crate::random_walk::generate_biased_walks_weighted_ref(graph, cfg);
                Ok(walks)
            }
            WalkMode::Precomputed => {
                let cfg = WalkConfig {
                    length: cfg.length,
                    walks_per_node: cfg.walks_per_node,
                    p: cfg.p,
                    q: cfg.q,
                    seed: cfg.seed,
                };
                let pre = PrecomputedBiasedWalks::new(graph, cfg.p, cfg.q);
                #[cfg(feature = "parallel")]
                {
                    let starts: Vec<usize> = (0..graph.node_count()).collect();
                    crate::alias::generate_biased_walks_precomp_ref_parallel_from_nodes(&pre, &starts, cfg)
                }
                #[cfg(not(feature = "parallel"))]
                {
                    crate::alias::generate_biased_walks_precomp_ref(&pre, cfg)
                }
            }
        }
    }
}

impl Embedder for Node2Vec {
    fn fit(&mut self, graph: &CsrGraph) -> Result<()> {
        self.embeddings = None;
        self.walks = None;
        ensure_non_empty(graph)?;
        self.config.validate()?;
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            dim = self.config.n_components,
            mode = ?self.config.walk_mode,
            "fitting node2vec"
        );

        let started = Instant::now();
        let walks = self.generate_walks(graph)?;
        info!(walks = walks.len(), elapsed_ms = started.elapsed().as_millis() as u64, "generated walks");

        let sg_config = SkipGramConfig {
            embedding_dim: self.config.n_components,
            seed: self.config.seed,
            ..self.config.word2vec.clone()
        };
        let mut model = SkipGram::new(graph.node_count(), sg_config)?;
        let loss = model.train(&walks)?;
        if !loss.is_finite() {
            return Err(Error::Diverged { epoch: self.config.word2vec.epochs });
        }

        self.embeddings = Some(Embeddings::new(graph.names().to_vec(), model.embeddings())?);
        self.walks = self.config.keep_walks.then_some(walks);
        info!(loss, elapsed_ms = started.elapsed().as_millis() as u64, "node2vec fitted");
        Ok(())
    }

    fn embeddings(&self) -> Option<&Embeddings> {
        self.embeddings.as_ref()
    }
}
