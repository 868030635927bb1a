//! Random walk generation.
//!
//! Three samplers share one skeleton (epoch-major, start nodes shuffled per epoch):
//! - uniform first-order walks (DeepWalk)
//! - unweighted second-order node2vec walks, by rejection sampling
//! - weighted node2vec / node2vec+ walks, by CDF sampling over biased edge weights
//!
//! The weighted variants follow PecanPy (`get_normalized_probs`,
//! `get_extended_normalized_probs`).

use crate::graph::{Graph, GraphRef, WeightedGraphRef};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    pub length: usize,
    pub walks_per_node: usize,
    pub p: f32,
    pub q: f32,
    pub seed: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self { length: 80, walks_per_node: 10, p: 1.0, q: 1.0, seed: 42 }
    }
}

/// Parameters for weighted node2vec / node2vec+ walk generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedNode2VecPlusConfig {
    /// Maximum walk length (in nodes).
    pub length: usize,
    /// Number of walks per node.
    pub walks_per_node: usize,
    /// Return parameter \(p\).
    pub p: f32,
    /// In-out parameter \(q\).
    pub q: f32,
    /// Node2vec+ parameter \(\gamma\) controlling the “noisy edge” threshold.
    pub gamma: f32,
    /// Seed for deterministic RNG.
    pub seed: u64,
}

impl Default for WeightedNode2VecPlusConfig {
    fn default() -> Self {
        Self { length: 80, walks_per_node: 10, p: 1.0, q: 1.0, gamma: 0.0, seed: 42 }
    }
}

// Uniform access to neighbor lists for both adapter flavours, so that the `Graph`
// and `GraphRef` entry points consume the RNG identically.
trait Neighbors {
    fn count(&self) -> usize;
    fn with_neighbors<T>(&self, node: usize, f: impl FnOnce(&[usize]) -> T) -> T;
}

struct Owned<'a, G>(&'a G);
struct Borrowed<'a, G>(&'a G);

impl<G: Graph> Neighbors for Owned<'_, G> {
    fn count(&self) -> usize {
        self.0.node_count()
    }
    fn with_neighbors<T>(&self, node: usize, f: impl FnOnce(&[usize]) -> T) -> T {
        f(&self.0.neighbors(node))
    }
}

impl<G: GraphRef> Neighbors for Borrowed<'_, G> {
    fn count(&self) -> usize {
        self.0.node_count()
    }
    fn with_neighbors<T>(&self, node: usize, f: impl FnOnce(&[usize]) -> T) -> T {
        f(self.0.neighbors_ref(node))
    }
}

pub(crate) fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;
    x
}

pub fn generate_walks<G: Graph>(graph: &G, config: WalkConfig) -> Vec<Vec<usize>> {
    let start_nodes: Vec<usize> = (0..graph.node_count()).collect();
    generate_walks_from_nodes(graph, &start_nodes, config)
}

pub fn generate_walks_from_nodes<G: Graph>(
    graph: &G,
    start_nodes: &[usize],
    config: WalkConfig,
) -> Vec<Vec<usize>> {
    collect(start_nodes.len() * config.walks_per_node, |sink| {
        stream_uniform(&Owned(graph), start_nodes, config, sink)
    })
}

pub fn generate_walks_ref<G: GraphRef>(graph: &G, config: WalkConfig) -> Vec<Vec<usize>> {
    let start_nodes: Vec<usize> = (0..graph.node_count()).collect();
    generate_walks_ref_from_nodes(graph, &start_nodes, config)
}

pub fn generate_walks_ref_from_nodes<G: GraphRef>(
    graph: &G,
    start_nodes: &[usize],
    config: WalkConfig,
) -> Vec<Vec<usize>> {
    collect(start_nodes.len() * config.walks_per_node, |sink| {
        stream_uniform(&Borrowed(graph), start_nodes, config, sink)
    })
}

/// Uniform walks handed to `on_walk` one at a time from a reused buffer.
///
/// Same walks, same order as [`generate_walks_ref_from_nodes`], without holding
/// them all in memory.
pub fn generate_walks_ref_streaming_from_nodes<G, F>(
    graph: &G,
    start_nodes: &[usize],
    config: WalkConfig,
    on_walk: F,
) where
    G: GraphRef,
    F: FnMut(&[usize]),
{
    stream_uniform(&Borrowed(graph), start_nodes, config, on_walk)
}

pub fn generate_biased_walks<G: Graph>(graph: &G, config: WalkConfig) -> Vec<Vec<usize>> {
    let start_nodes: Vec<usize> = (0..graph.node_count()).collect();
    generate_biased_walks_from_nodes(graph, &start_nodes, config)
}

pub fn generate_biased_walks_from_nodes<G: Graph>(
    graph: &G,
    start_nodes: &[usize],
    config: WalkConfig,
) -> Vec<Vec<usize>> {
    collect(start_nodes.len() * config.walks_per_node, |sink| {
        stream_biased(&Owned(graph), start_nodes, config, sink)
    })
}

pub fn generate_biased_walks_ref<G: GraphRef>(graph: &G, config: WalkConfig) -> Vec<Vec<usize>> {
    let start_nodes: Vec<usize> = (0..graph.node_count()).collect();
    generate_biased_walks_ref_from_nodes(graph, &start_nodes, config)
}

pub fn generate_biased_walks_ref_from_nodes<G: GraphRef>(
    graph: &G,
    start_nodes: &[usize],
    config: WalkConfig,
) -> Vec<Vec<usize>> {
    collect(start_nodes.len() * config.walks_per_node, |sink| {
        stream_biased(&Borrowed(graph), start_nodes, config, sink)
    })
}

fn collect(capacity: usize, run: impl FnOnce(&mut dyn FnMut(&[usize]))) -> Vec<Vec<usize>> {
    let mut walks = Vec::with_capacity(capacity);
    run(&mut |w: &[usize]| walks.push(w.to_vec()));
    walks
}

fn stream_uniform<N: Neighbors>(
    graph: &N,
    start_nodes: &[usize],
    config: WalkConfig,
    mut on_walk: impl FnMut(&[usize]),
) {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut epoch_nodes = start_nodes.to_vec();
    let mut buf = Vec::with_capacity(config.length);
    for _ in 0..config.walks_per_node {
        epoch_nodes.shuffle(&mut rng);
        for &node in &epoch_nodes {
            unbiased_walk_into(graph, node, config.length, &mut rng, &mut buf);
            on_walk(&buf);
        }
    }
}

fn stream_biased<N: Neighbors>(
    graph: &N,
    start_nodes: &[usize],
    config: WalkConfig,
    mut on_walk: impl FnMut(&[usize]),
) {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut epoch_nodes = start_nodes.to_vec();
    let mut buf = Vec::with_capacity(config.length);
    let mut prev_nbrs = Vec::new();
    for _ in 0..config.walks_per_node {
        epoch_nodes.shuffle(&mut rng);
        for &node in &epoch_nodes {
            biased_walk_into(graph, node, config, &mut rng, &mut prev_nbrs, &mut buf);
            on_walk(&buf);
        }
    }
}

fn unbiased_walk_into<N: Neighbors, R: Rng>(
    graph: &N,
    start: usize,
    length: usize,
    rng: &mut R,
    walk: &mut Vec<usize>,
) {
    walk.clear();
    if start >= graph.count() || length == 0 {
        walk.push(start);
        return;
    }
    walk.push(start);
    let mut curr = start;
    for _ in 1..length {
        let next = graph.with_neighbors(curr, |nbrs| nbrs.choose(rng).copied());
        match next {
            Some(n) => {
                walk.push(n);
                curr = n;
            }
            None => break,
        }
    }
}

fn biased_walk_into<N: Neighbors, R: Rng>(
    graph: &N,
    start: usize,
    config: WalkConfig,
    rng: &mut R,
    prev_nbrs: &mut Vec<usize>,
    walk: &mut Vec<usize>,
) {
    walk.clear();
    walk.push(start);
    if start >= graph.count() {
        return;
    }
    let mut curr = start;
    let mut prev: Option<usize> = None;

    for _ in 1..config.length {
        let next = graph.with_neighbors(curr, |nbrs| {
            if nbrs.is_empty() {
                return None;
            }
            Some(match prev {
                Some(p_node) => sample_biased_rejection(rng, p_node, prev_nbrs.as_slice(), nbrs, config.p, config.q),
                None => nbrs[rng.random_range(0..nbrs.len())],
            })
        });
        let Some(next) = next else { break };
        walk.push(next);
        prev = Some(curr);
        prev_nbrs.clear();
        graph.with_neighbors(curr, |nbrs| prev_nbrs.extend_from_slice(nbrs));
        curr = next;
    }
}

fn sample_biased_rejection<R: Rng>(
    rng: &mut R,
    prev_node: usize,
    prev_neighbors: &[usize],
    neighbors: &[usize],
    p: f32,
    q: f32,
) -> usize {
    let max_prob = (1.0 / p).max(1.0).max(1.0 / q);
    loop {
        let candidate = neighbors[rng.random_range(0..neighbors.len())];
        let r: f32 = rng.random();
        let unnorm_prob = if candidate == prev_node {
            1.0 / p
        } else if prev_neighbors.contains(&candidate) {
            1.0
        } else {
            1.0 / q
        };
        if r < unnorm_prob / max_prob {
            return candidate;
        }
    }
}

#[cfg(feature = "parallel")]
pub fn generate_walks_ref_parallel<G: GraphRef + Sync>(graph: &G, config: WalkConfig) -> Vec<Vec<usize>> {
    let start_nodes: Vec<usize> = (0..graph.node_count()).collect();
    parallel_jobs(&start_nodes, config.walks_per_node, config.seed, |seed, node| {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut walk = Vec::with_capacity(config.length);
        unbiased_walk_into(&Borrowed(graph), node, config.length, &mut rng, &mut walk);
        walk
    })
}

#[cfg(feature = "parallel")]
pub fn generate_biased_walks_ref_parallel<G: GraphRef + Sync>(graph: &G, config: WalkConfig) -> Vec<Vec<usize>> {
    let start_nodes: Vec<usize> = (0..graph.node_count()).collect();
    parallel_jobs(&start_nodes, config.walks_per_node, config.seed, |seed, node| {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut walk = Vec::with_capacity(config.length);
        let mut prev_nbrs = Vec::new();
        biased_walk_into(&Borrowed(graph), node, config, &mut rng, &mut prev_nbrs, &mut walk);
        walk
    })
}

/// Deterministic fan-out of `(epoch, node)` walk jobs.
///
/// Invariant: output is stable for a fixed `seed`, independent of Rayon thread count.
#[cfg(feature = "parallel")]
pub(crate) fn parallel_jobs<F>(start_nodes: &[usize], epochs: usize, seed: u64, walk: F) -> Vec<Vec<usize>>
where
    F: Fn(u64, usize) -> Vec<usize> + Sync,
{
    use rayon::prelude::*;

    let mut epoch_nodes: Vec<usize> = start_nodes.to_vec();
    let mut jobs: Vec<(u32, usize)> = Vec::with_capacity(start_nodes.len() * epochs);
    for epoch in 0..(epochs as u32) {
        let mut rng = ChaCha8Rng::seed_from_u64(mix64(seed ^ (epoch as u64)));
        epoch_nodes.shuffle(&mut rng);
        jobs.extend(epoch_nodes.iter().map(|&node| (epoch, node)));
    }

    jobs.par_iter()
        .enumerate()
        .map(|(i, &(epoch, node))| {
            let job_seed = mix64(seed ^ ((epoch as u64) << 32) ^ (node as u64) ^ (i as u64));
            walk(job_seed, node)
        })
        .collect()
}

pub fn generate_biased_walks_weighted_ref<G: WeightedGraphRef>(
    graph: &G,
    config: WeightedNode2VecPlusConfig,
) -> Vec<Vec<usize>> {
    generate_biased_walks_weighted_impl(graph, config, false)
}

pub fn generate_biased_walks_weighted_plus_ref<G: WeightedGraphRef>(
    graph: &G,
    config: WeightedNode2VecPlusConfig,
) -> Vec<Vec<usize>> {
    generate_biased_walks_weighted_impl(graph, config, true)
}

/// Parallel weighted node2vec (`extend = false`) or node2vec+ walks.
#[cfg(feature = "parallel")]
pub fn generate_biased_walks_weighted_ref_parallel<G: WeightedGraphRef + Sync>(
    graph: &G,
    config: WeightedNode2VecPlusConfig,
    extend: bool,
) -> Vec<Vec<usize>> {
    let noise_thresholds =
        if extend { compute_noise_thresholds(graph, config.gamma) } else { Vec::new() };
    let start_nodes: Vec<usize> = (0..graph.node_count()).collect();
    parallel_jobs(&start_nodes, config.walks_per_node, config.seed, |seed, node| {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        weighted_walk(graph, node, config, extend, &noise_thresholds, &mut rng)
    })
}

fn generate_biased_walks_weighted_impl<G: WeightedGraphRef>(
    graph: &G,
    config: WeightedNode2VecPlusConfig,
    extend: bool,
) -> Vec<Vec<usize>> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut start_nodes: Vec<usize> = (0..graph.node_count()).collect();

    let noise_thresholds =
        if extend { compute_noise_thresholds(graph, config.gamma) } else { Vec::new() };

    let mut walks = Vec::with_capacity(graph.node_count() * config.walks_per_node);
    for _ in 0..config.walks_per_node {
        start_nodes.shuffle(&mut rng);
        for &node in &start_nodes {
            walks.push(weighted_walk(graph, node, config, extend, &noise_thresholds, &mut rng));
        }
    }
    walks
}

fn weighted_walk<G: WeightedGraphRef, R: Rng>(
    graph: &G,
    start: usize,
    config: WeightedNode2VecPlusConfig,
    extend: bool,
    noise_thresholds: &[f32],
    rng: &mut R,
) -> Vec<usize> {
    let mut walk = Vec::with_capacity(config.length);
    walk.push(start);

    let mut curr = start;
    let mut prev: Option<usize> = None;
    let mut buf: Vec<f32> = Vec::new();

    for _ in 1..config.length {
        let (nbrs, wts) = graph.neighbors_and_weights_ref(curr);
        if nbrs.is_empty() {
            break;
        }
        debug_assert_eq!(nbrs.len(), wts.len());

        let next = match prev {
            Some(prev_idx) if extend => {
                fill_next_node2vec_plus_buf(
                    graph,
                    curr,
                    prev_idx,
                    nbrs,
                    wts,
                    config,
                    noise_thresholds,
                    &mut buf,
                );
                sample_cdf(rng, nbrs, &buf)
            }
            Some(prev_idx) => {
                fill_next_node2vec_weighted_buf(graph, prev_idx, nbrs, wts, config, &mut buf);
                sample_cdf(rng, nbrs, &buf)
            }
            None => sample_cdf(rng, nbrs, wts),
        };

        walk.push(next);
        prev = Some(curr);
        curr = next;
    }

    walk
}

fn fill_next_node2vec_weighted_buf<G: WeightedGraphRef>(
    graph: &G,
    prev: usize,
    nbrs: &[usize],
    wts: &[f32],
    config: WeightedNode2VecPlusConfig,
    buf: &mut Vec<f32>,
) {
    // Out edges are neighbors(cur) that are not neighbors(prev).
    let (prev_nbrs, _) = graph.neighbors_and_weights_ref(prev);

    buf.clear();
    buf.extend_from_slice(wts);

    for (i, &x) in nbrs.iter().enumerate() {
        if x == prev {
            buf[i] /= config.p;
        } else if !prev_nbrs.contains(&x) {
            buf[i] /= config.q;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn fill_next_node2vec_plus_buf<G: WeightedGraphRef>(
    graph: &G,
    cur: usize,
    prev: usize,
    nbrs: &[usize],
    wts: &[f32],
    config: WeightedNode2VecPlusConfig,
    noise_thresholds: &[f32],
    buf: &mut Vec<f32>,
) {
    // alpha(out) = 1/q + (1 - 1/q) * t(out), where
    //   t = 0 for non-common neighbors,
    //   t = w(prev,x)/threshold[x] for loose common edges (w(prev,x) < threshold[x]).
    // Suppress: if w(cur,x) < threshold[cur], alpha = min(1, 1/q).
    let (prev_nbrs, prev_wts) = graph.neighbors_and_weights_ref(prev);

    buf.clear();
    buf.extend_from_slice(wts);

    let inv_q = 1.0 / config.q;
    let thr_cur = noise_thresholds[cur];

    for (i, &x) in nbrs.iter().enumerate() {
        if x == prev {
            buf[i] /= config.p;
            continue;
        }

        let mut is_out = true;
        let mut t: f32 = 0.0;

        if let Some(j) = prev_nbrs.iter().position(|&y| y == x) {
            let thr_x = noise_thresholds[x];
            let w_prev_x = prev_wts[j];
            if thr_x > 0.0 && w_prev_x >= thr_x {
                is_out = false;
            } else if thr_x > 0.0 {
                t = (w_prev_x / thr_x).max(0.0);
            }
        }

        if is_out {
            let mut alpha = inv_q + (1.0 - inv_q) * t;
            if buf[i] < thr_cur {
                alpha = inv_q.min(1.0);
            }
            buf[i] *= alpha;
        }
    }
}

fn compute_noise_thresholds<G: WeightedGraphRef>(graph: &G, gamma: f32) -> Vec<f32> {
    (0..graph.node_count())
        .map(|v| {
            let (_, wts) = graph.neighbors_and_weights_ref(v);
            if wts.is_empty() {
                return 0.0;
            }
            let len = wts.len() as f32;
            let mean = wts.iter().sum::<f32>() / len;
            let var = wts.iter().map(|&x| (x - mean) * (x - mean)).sum::<f32>() / len;
            (mean + gamma * var.sqrt()).max(0.0)
        })
        .collect()
}

/// Draw a neighbor proportionally to `weights`; uniform if they sum to zero.
///
/// `nbrs` must be non-empty.
fn sample_cdf<R: Rng>(rng: &mut R, nbrs: &[usize], weights: &[f32]) -> usize {
    debug_assert_eq!(nbrs.len(), weights.len());
    if nbrs.len() == 1 {
        return nbrs[0];
    }

    let sum = weights.iter().copied().sum::<f32>();
    if !(sum > 0.0) {
        return nbrs[rng.random_range(0..nbrs.len())];
    }

    let mut r = rng.random::<f32>() * sum;
    for (i, &w) in weights.iter().enumerate() {
        if r < w {
            return nbrs[i];
        }
        r -= w;
    }
    nbrs[nbrs.len() - 1]
}
