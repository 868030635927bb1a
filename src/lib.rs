//! # nodevectors
//!
//! Node embeddings for graphs: learn one dense vector per node so that nodes
//! close in the graph end up close in vector space.
//!
//! Embedders:
//! - [`Node2Vec`]: biased random walks + skip-gram
//! - [`GGVec`]: direct SGD on edge weights, fast on large graphs
//! - [`ProNE`]: sparse factorization + spectral propagation
//! - [`GloVe`]: weighted log-count regression for co-occurrence-like weights
//! - [`AdjacencyEmbedder`]: any [`Reducer`] applied to the adjacency matrix
//!
//! All of them implement [`Embedder`] and take a [`CsrGraph`]:
//!
//! ```no_run
//! use nodevectors::{CsrGraph, EdgeListOptions, Embedder, GGVec};
//!
//! # fn main() -> nodevectors::Result<()> {
//! let graph = CsrGraph::read_edgelist("edges.csv", &EdgeListOptions::default())?;
//! let mut model = GGVec::default();
//! model.fit(&graph)?;
//! let similar = model.embeddings().unwrap().most_similar("alice", 5)?;
//! # Ok(())
//! # }
//! ```
//!
//! The walk samplers, skip-gram trainer and linear-algebra helpers the embedders
//! are built from are public too.

pub mod alias;
pub mod csr;
pub mod embedder;
pub mod embeddings;
pub mod error;
pub mod ggvec;
pub mod glove;
pub mod graph;
pub mod linalg;
pub mod node2vec;
pub mod prone;
pub mod random_walk;
pub mod reducer;
pub mod topk;
pub mod word2vec;

pub use alias::{
    generate_biased_walks_precomp_ref, generate_biased_walks_precomp_ref_from_nodes,
    PrecomputedBiasedWalks,
};
#[cfg(feature = "parallel")]
pub use alias::generate_biased_walks_precomp_ref_parallel_from_nodes;
pub use csr::{CsrGraph, EdgeListOptions};
pub use embedder::{load, save, Embedder};
pub use embeddings::Embeddings;
pub use error::{Error, Result};
pub use ggvec::{GGVec, GGVecConfig, Tolerance};
pub use glove::{GloVe, GloVeConfig};
pub use graph::{Graph, GraphRef, WeightedGraph, WeightedGraphRef};
pub use linalg::{randomized_svd, LinearOperator, SparseMatrix};
pub use node2vec::{Node2Vec, Node2VecConfig, WalkMode};
pub use prone::{ProNE, ProNEConfig};
pub use random_walk::{
    generate_biased_walks, generate_biased_walks_from_nodes, generate_biased_walks_ref,
    generate_biased_walks_ref_from_nodes, generate_biased_walks_weighted_plus_ref,
    generate_biased_walks_weighted_ref, generate_walks, generate_walks_from_nodes,
    generate_walks_ref, generate_walks_ref_from_nodes, generate_walks_ref_streaming_from_nodes,
    WalkConfig, WeightedNode2VecPlusConfig,
};
#[cfg(feature = "parallel")]
pub use random_walk::{
    generate_biased_walks_ref_parallel, generate_biased_walks_weighted_ref_parallel,
    generate_walks_ref_parallel,
};
pub use reducer::{AdjacencyEmbedder, Reducer, TruncatedSvd};
pub use topk::{normalize, top_k, top_k_by};
pub use word2vec::{SkipGram, SkipGramConfig};
