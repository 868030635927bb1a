//! Compressed sparse row graph with named nodes.
//!
//! Every embedder consumes a [`CsrGraph`]. Rows are sorted by neighbor id and
//! parallel edges are merged by summing their weights, so a row is both a valid
//! `GraphRef` neighbor list and a sparse matrix row.

use crate::error::{Error, Result};
use crate::graph::{Graph, GraphRef, WeightedGraph, WeightedGraphRef};
use crate::linalg::SparseMatrix;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Options for [`CsrGraph::read_edgelist`].
#[derive(Debug, Clone)]
pub struct EdgeListOptions {
    /// Field delimiter (`b','` for CSV, `b'\t'` for TSV, `b' '` for space separated).
    pub delimiter: u8,
    /// Skip the first line.
    pub has_header: bool,
    /// When false, every edge is inserted in both directions.
    pub directed: bool,
}

impl Default for EdgeListOptions {
    fn default() -> Self {
        Self { delimiter: b',', has_header: false, directed: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsrGraph {
    indptr: Vec<usize>,
    indices: Vec<usize>,
    weights: Vec<f32>,
    names: Vec<String>,
    name_index: HashMap<String, usize>,
}

impl CsrGraph {
    /// Unit-weight graph over nodes `0..n`, named by their index.
    pub fn from_edges(n: usize, edges: &[(usize, usize)], directed: bool) -> Result<Self> {
        let weighted: Vec<(usize, usize, f32)> = edges.iter().map(|&(u, v)| (u, v, 1.0)).collect();
        Self::from_weighted_edges(n, &weighted, directed)
    }

    /// Weighted graph over nodes `0..n`, named by their index.
    pub fn from_weighted_edges(
        n: usize,
        edges: &[(usize, usize, f32)],
        directed: bool,
    ) -> Result<Self> {
        let names: Vec<String> = (0..n).map(|i| i.to_string()).collect();
        Self::build(names, edges.to_vec(), directed)
    }

    /// Build from `(source, target, weight)` name triples.
    ///
    /// Node indices are assigned in first-seen order.
    pub fn from_named_edges<I, S>(edges: I, directed: bool) -> Result<Self>
    where
        I: IntoIterator<Item = (S, S, f32)>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = Vec::new();
        let mut lookup: HashMap<String, usize> = HashMap::new();
        let mut intern = |name: &str| -> usize {
            if let Some(&i) = lookup.get(name) {
                return i;
            }
            let i = names.len();
            names.push(name.to_string());
            lookup.insert(name.to_string(), i);
            i
        };

        let mut triples = Vec::new();
        for (s, t, w) in edges {
            let u = intern(s.as_ref());
            let v = intern(t.as_ref());
            triples.push((u, v, w));
        }
        Self::build(names, triples, directed)
    }

    /// Read a `source<delim>target[<delim>weight]` edge list.
    ///
    /// Lines starting with `#` are comments. A missing weight column means 1.0.
    pub fn read_edgelist(path: impl AsRef<Path>, options: &EdgeListOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(options.has_header)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut rows: Vec<(String, String, f32)> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
            // Space-delimited files often carry repeated separators.
            let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < 2 {
                return Err(Error::Parse {
                    line,
                    message: format!("expected at least 2 columns, got {}", fields.len()),
                });
            }
            let weight = match fields.get(2) {
                Some(raw) => raw.parse::<f32>().map_err(|e| Error::Parse {
                    line,
                    message: format!("invalid weight {raw:?}: {e}"),
                })?,
                None => 1.0,
            };
            rows.push((fields[0].to_string(), fields[1].to_string(), weight));
        }

        let graph = Self::from_named_edges(
            rows.iter().map(|(s, t, w)| (s.as_str(), t.as_str(), *w)),
            options.directed,
        )?;
        info!(
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "loaded edge list"
        );
        Ok(graph)
    }

    /// Build a CSR graph from a petgraph graph, mapping edge payloads to weights.
    #[cfg(feature = "petgraph")]
    pub fn from_petgraph<N, E, Ty, Ix, F>(graph: &petgraph::Graph<N, E, Ty, Ix>, weight: F) -> Result<Self>
    where
        Ty: petgraph::EdgeType,
        Ix: petgraph::graph::IndexType,
        F: Fn(&E) -> f32,
    {
        use petgraph::visit::EdgeRef;

        let n = graph.node_count();
        let edges: Vec<(usize, usize, f32)> = graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), weight(e.weight())))
            .collect();
        Self::from_weighted_edges(n, &edges, graph.is_directed())
    }

    fn build(names: Vec<String>, mut edges: Vec<(usize, usize, f32)>, directed: bool) -> Result<Self> {
        let n = names.len();
        for &(u, v, w) in &edges {
            if u >= n || v >= n {
                return Err(Error::NodeOutOfRange { index: u.max(v), len: n });
            }
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "edge ({u}, {v}) has invalid weight {w}"
                )));
            }
        }

        if !directed {
            let reversed: Vec<(usize, usize, f32)> = edges
                .iter()
                .filter(|(u, v, _)| u != v)
                .map(|&(u, v, w)| (v, u, w))
                .collect();
            edges.extend(reversed);
        }
        edges.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut indptr = vec![0usize; n + 1];
        let mut indices: Vec<usize> = Vec::with_capacity(edges.len());
        let mut weights: Vec<f32> = Vec::with_capacity(edges.len());
        let mut last: Option<(usize, usize)> = None;
        for (u, v, w) in edges {
            if last == Some((u, v)) {
                // parallel edge
                if let Some(acc) = weights.last_mut() {
                    *acc += w;
                }
                continue;
            }
            indices.push(v);
            weights.push(w);
            indptr[u + 1] += 1;
            last = Some((u, v));
        }
        for i in 0..n {
            indptr[i + 1] += indptr[i];
        }

        let name_index = names.iter().enumerate().map(|(i, s)| (s.clone(), i)).collect();
        debug!(nodes = n, nnz = indices.len(), directed, "built csr graph");
        Ok(Self { indptr, indices, weights, names, name_index })
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Number of stored (directed) entries.
    pub fn edge_count(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn node_name(&self, node: usize) -> Option<&str> {
        self.names.get(node).map(String::as_str)
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// `(neighbors, weights)` of a node; empty for out-of-range ids.
    pub fn row(&self, node: usize) -> (&[usize], &[f32]) {
        if node >= self.node_count() {
            return (&[], &[]);
        }
        let (a, b) = (self.indptr[node], self.indptr[node + 1]);
        (&self.indices[a..b], &self.weights[a..b])
    }

    pub fn degree(&self, node: usize) -> usize {
        self.row(node).0.len()
    }

    pub fn weighted_degree(&self, node: usize) -> f32 {
        self.row(node).1.iter().sum()
    }

    /// Whether `target` is an out-neighbor of `source`.
    pub fn has_edge(&self, source: usize, target: usize) -> bool {
        self.row(source).0.binary_search(&target).is_ok()
    }

    /// Row-stochastic copy: each non-empty row sums to 1.
    pub fn normalize(&self) -> Self {
        let mut out = self.clone();
        for node in 0..out.node_count() {
            let (a, b) = (out.indptr[node], out.indptr[node + 1]);
            let row = &mut out.weights[a..b];
            let sum: f32 = row.iter().sum();
            if sum > 0.0 {
                for w in row.iter_mut() {
                    *w /= sum;
                }
            }
        }
        out
    }

    /// Iterate stored edges as `(source, target, weight)`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.node_count()).flat_map(move |u| {
            let (nbrs, wts) = self.row(u);
            nbrs.iter().zip(wts.iter()).map(move |(&v, &w)| (u, v, w))
        })
    }

    pub fn to_sparse_matrix(&self) -> SparseMatrix {
        let n = self.node_count();
        SparseMatrix::from_csr(
            n,
            n,
            self.indptr.clone(),
            self.indices.clone(),
            self.weights.iter().map(|&w| w as f64).collect(),
        )
    }

    /// Replace the adjacency with `matrix`, keeping node names.
    ///
    /// Zero entries are dropped. `matrix` must be square with this graph's size.
    pub(crate) fn with_matrix(&self, matrix: &SparseMatrix) -> Result<Self> {
        let n = self.node_count();
        if matrix.rows() != n || matrix.cols() != n {
            return Err(Error::InvalidConfig(format!(
                "matrix shape {}x{} does not match graph with {n} nodes",
                matrix.rows(),
                matrix.cols()
            )));
        }
        let mut edges = Vec::with_capacity(matrix.nnz());
        for u in 0..n {
            let (cols, vals) = matrix.row(u);
            for (&v, &w) in cols.iter().zip(vals.iter()) {
                if w > 0.0 {
                    edges.push((u, v, w as f32));
                }
            }
        }
        Self::build(self.names.clone(), edges, true)
    }
}

impl Graph for CsrGraph {
    fn node_count(&self) -> usize {
        CsrGraph::node_count(self)
    }

    fn neighbors(&self, node: usize) -> Vec<usize> {
        self.row(node).0.to_vec()
    }
}

impl GraphRef for CsrGraph {
    fn node_count(&self) -> usize {
        CsrGraph::node_count(self)
    }

    fn neighbors_ref(&self, node: usize) -> &[usize] {
        self.row(node).0
    }
}

impl WeightedGraph for CsrGraph {
    fn edge_weight(&self, source: usize, target: usize) -> f32 {
        let (nbrs, wts) = self.row(source);
        match nbrs.binary_search(&target) {
            Ok(i) => wts[i],
            Err(_) => 0.0,
        }
    }
}

impl WeightedGraphRef for CsrGraph {
    fn node_count(&self) -> usize {
        CsrGraph::node_count(self)
    }

    fn neighbors_and_weights_ref(&self, node: usize) -> (&[usize], &[f32]) {
        self.row(node)
    }
}
