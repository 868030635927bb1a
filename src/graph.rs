//! Graph adapter traits.
//!
//! Walk samplers and embedders are generic over these so that callers can feed
//! their own adjacency storage. [`crate::CsrGraph`] implements all of them.

pub trait Graph {
    fn node_count(&self) -> usize;
    fn neighbors(&self, node: usize) -> Vec<usize>;
    fn out_degree(&self, node: usize) -> usize {
        self.neighbors(node).len()
    }
}

/// A graph view that hands out **borrowed** neighbor slices.
///
/// Random walks call this once per step, so avoiding a `Vec` per call matters.
/// Neighbor slices should be sorted ascending; the precomputed alias tables
/// binary-search them.
pub trait GraphRef {
    fn node_count(&self) -> usize;
    fn neighbors_ref(&self, node: usize) -> &[usize];
    fn out_degree(&self, node: usize) -> usize {
        self.neighbors_ref(node).len()
    }
}

pub trait WeightedGraph: Graph {
    fn edge_weight(&self, source: usize, target: usize) -> f32;
}

/// A weighted graph view with contiguous neighbor and weight rows (CSR layout).
pub trait WeightedGraphRef {
    fn node_count(&self) -> usize;

    /// Return `(neighbors, weights)` for a node.
    ///
    /// Requirements:
    /// - `neighbors.len() == weights.len()`
    /// - weights are non-negative
    fn neighbors_and_weights_ref(&self, node: usize) -> (&[usize], &[f32]);

    fn out_degree(&self, node: usize) -> usize {
        self.neighbors_and_weights_ref(node).0.len()
    }
}

#[cfg(feature = "petgraph")]
impl<N, E, Ty, Ix> Graph for petgraph::Graph<N, E, Ty, Ix>
where
    Ty: petgraph::EdgeType,
    Ix: petgraph::graph::IndexType,
{
    fn node_count(&self) -> usize {
        self.node_count()
    }
    fn neighbors(&self, node: usize) -> Vec<usize> {
        self.neighbors(petgraph::graph::NodeIndex::new(node)).map(|idx| idx.index()).collect()
    }
}
