//! Precomputed node2vec transition tables (PecanPy "PreComp" mode).
//!
//! Every directed edge `prev -> cur` owns an alias table over `neighbors(cur)`,
//! so each second-order step is an O(1) draw. Tables for `cur` sit back to back,
//! one per predecessor, for `sum(deg(v)^2)` entries in total: fine for sparse
//! graphs, prohibitive around hubs. Edge weights are ignored.

use crate::error::{Error, Result};
use crate::graph::GraphRef;
use crate::random_walk::WalkConfig;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Alias tables for unweighted node2vec walks with fixed `p` and `q`.
#[derive(Debug, Clone)]
pub struct PrecomputedBiasedWalks {
    /// Sorted adjacency in CSR form.
    indptr: Vec<usize>,
    indices: Vec<usize>,
    /// Start of node `v`'s `deg(v)^2` table block.
    blocks: Vec<usize>,
    accept: Vec<f32>,
    alias: Vec<u32>,
    p: f32,
    q: f32,
}

impl PrecomputedBiasedWalks {
    pub fn new<G: GraphRef>(graph: &G, p: f32, q: f32) -> Self {
        let n = graph.node_count();
        let mut indptr = Vec::with_capacity(n + 1);
        let mut indices = Vec::new();
        indptr.push(0);
        for v in 0..n {
            let start = indices.len();
            indices.extend_from_slice(graph.neighbors_ref(v));
            indices[start..].sort_unstable();
            indptr.push(indices.len());
        }

        let mut blocks = Vec::with_capacity(n + 1);
        blocks.push(0);
        for v in 0..n {
            let deg = indptr[v + 1] - indptr[v];
            blocks.push(blocks[v] + deg * deg);
        }
        let total = blocks[n];

        let mut pre = Self {
            indptr,
            indices,
            blocks,
            accept: vec![0.0; total],
            alias: vec![0; total],
            p,
            q,
        };
        pre.fill_tables();
        pre
    }

    fn row(&self, v: usize) -> &[usize] {
        &self.indices[self.indptr[v]..self.indptr[v + 1]]
    }

    fn fill_tables(&mut self) {
        let (inv_p, inv_q) = (1.0 / self.p, 1.0 / self.q);
        let mut probs: Vec<f32> = Vec::new();
        let mut scratch = AliasScratch::default();

        for cur in 0..self.node_count() {
            let deg = self.indptr[cur + 1] - self.indptr[cur];
            for prev_j in 0..deg {
                let prev = self.row(cur)[prev_j];
                probs.clear();
                probs.extend(self.row(cur).iter().map(|&x| {
                    if x == prev {
                        inv_p
                    } else if self.row(prev).binary_search(&x).is_ok() {
                        1.0
                    } else {
                        inv_q
                    }
                }));

                let start = self.blocks[cur] + deg * prev_j;
                scratch.build(
                    &probs,
                    &mut self.accept[start..start + deg],
                    &mut self.alias[start..start + deg],
                );
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.indptr.len() - 1
    }

    fn check(&self, config: &WalkConfig) -> Result<()> {
        if (self.p - config.p).abs() > 1e-6 || (self.q - config.q).abs() > 1e-6 {
            return Err(Error::InvalidConfig(format!(
                "precomputed tables use p={}, q={} but walk config has p={}, q={}",
                self.p, self.q, config.p, config.q
            )));
        }
        Ok(())
    }

    fn walk<R: Rng>(&self, start: usize, length: usize, rng: &mut R) -> Vec<usize> {
        let mut walk = Vec::with_capacity(length);
        walk.push(start);
        if start >= self.node_count() {
            return walk;
        }
        let mut prev: Option<usize> = None;
        let mut cur = start;

        while walk.len() < length {
            let nbrs = self.row(cur);
            if nbrs.is_empty() {
                break;
            }
            // No table exists for the first step, or after a `prev -> cur` edge
            // with no reverse `cur -> prev`; both take a uniform step.
            let table = prev.and_then(|p| nbrs.binary_search(&p).ok());
            let next = match table {
                Some(prev_j) => {
                    let start = self.blocks[cur] + nbrs.len() * prev_j;
                    let end = start + nbrs.len();
                    nbrs[draw(&self.accept[start..end], &self.alias[start..end], rng)]
                }
                None => nbrs[rng.random_range(0..nbrs.len())],
            };
            walk.push(next);
            prev = Some(cur);
            cur = next;
        }
        walk
    }
}

pub fn generate_biased_walks_precomp_ref(
    pre: &PrecomputedBiasedWalks,
    config: WalkConfig,
) -> Result<Vec<Vec<usize>>> {
    let start_nodes: Vec<usize> = (0..pre.node_count()).collect();
    generate_biased_walks_precomp_ref_from_nodes(pre, &start_nodes, config)
}

/// Precomputed walks from an explicit set of start nodes, epoch-major like the
/// other generators.
pub fn generate_biased_walks_precomp_ref_from_nodes(
    pre: &PrecomputedBiasedWalks,
    start_nodes: &[usize],
    config: WalkConfig,
) -> Result<Vec<Vec<usize>>> {
    pre.check(&config)?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut order = start_nodes.to_vec();
    let mut walks = Vec::with_capacity(start_nodes.len() * config.walks_per_node);
    for _ in 0..config.walks_per_node {
        order.shuffle(&mut rng);
        walks.extend(order.iter().map(|&node| pre.walk(node, config.length, &mut rng)));
    }
    Ok(walks)
}

/// Parallel [`generate_biased_walks_precomp_ref_from_nodes`]. Output depends on
/// `seed` only, not on the rayon thread count.
#[cfg(feature = "parallel")]
pub fn generate_biased_walks_precomp_ref_parallel_from_nodes(
    pre: &PrecomputedBiasedWalks,
    start_nodes: &[usize],
    config: WalkConfig,
) -> Result<Vec<Vec<usize>>> {
    pre.check(&config)?;
    Ok(crate::random_walk::parallel_jobs(start_nodes, config.walks_per_node, config.seed, |seed, node| {
        pre.walk(node, config.length, &mut ChaCha8Rng::seed_from_u64(seed))
    }))
}

/// Reusable work lists for Vose's alias construction.
#[derive(Default)]
struct AliasScratch {
    small: Vec<usize>,
    large: Vec<usize>,
}

impl AliasScratch {
    /// Fill `accept`/`alias` for the (unnormalized) weights `probs`.
    fn build(&mut self, probs: &[f32], accept: &mut [f32], alias: &mut [u32]) {
        let k = probs.len();
        let total: f32 = probs.iter().sum();
        self.small.clear();
        self.large.clear();
        for (i, &w) in probs.iter().enumerate() {
            accept[i] = if total > 0.0 { w * k as f32 / total } else { 1.0 };
            alias[i] = i as u32;
            if accept[i] < 1.0 {
                self.small.push(i);
            } else {
                self.large.push(i);
            }
        }
        while let (Some(&s), Some(&l)) = (self.small.last(), self.large.last()) {
            self.small.pop();
            self.large.pop();
            alias[s] = l as u32;
            accept[l] -= 1.0 - accept[s];
            if accept[l] < 1.0 {
                self.small.push(l);
            } else {
                self.large.push(l);
            }
        }
        // Leftovers are 1 up to rounding.
        for &i in self.small.iter().chain(&self.large) {
            accept[i] = 1.0;
        }
    }
}

fn draw<R: Rng>(accept: &[f32], alias: &[u32], rng: &mut R) -> usize {
    let i = rng.random_range(0..accept.len());
    if rng.random::<f32>() < accept[i] {
        i
    } else {
        alias[i] as usize
    }
}
