//! Benchmarks for walk generation and sampling strategies.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nodevectors::{
    generate_biased_walks_precomp_ref, generate_biased_walks_ref,
    generate_biased_walks_weighted_plus_ref, generate_biased_walks_weighted_ref, generate_walks_ref,
    CsrGraph, PrecomputedBiasedWalks, WalkConfig, WeightedNode2VecPlusConfig,
};
use rand::prelude::*;
use std::hint::black_box;

fn ring(n: usize) -> CsrGraph {
    let edges: Vec<(usize, usize)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
    CsrGraph::from_edges(n, &edges, false).unwrap()
}

/// Barabási–Albert preferential attachment, `m` edges per new node, random weights.
fn barabasi_albert(n: usize, m: usize, seed: u64) -> CsrGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let init = m + 1;
    let mut edges: Vec<(usize, usize, f32)> = Vec::new();
    // Node ids repeated by degree.
    let mut targets: Vec<usize> = Vec::new();
    for i in 0..init {
        for j in (i + 1)..init {
            edges.push((i, j, rng.random_range(0.1..5.0)));
            targets.extend([i, j]);
        }
    }
    for v in init..n {
        let mut chosen: Vec<usize> = Vec::with_capacity(m);
        while chosen.len() < m {
            let u = targets[rng.random_range(0..targets.len())];
            if !chosen.contains(&u) {
                chosen.push(u);
            }
        }
        for &u in &chosen {
            edges.push((v, u, rng.random_range(0.1..5.0)));
            targets.extend([u, v]);
        }
    }
    CsrGraph::from_weighted_edges(n, &edges, false).unwrap()
}

/// Stochastic block model with `blocks` equal communities.
fn sbm(n: usize, blocks: usize, p_in: f64, p_out: f64, seed: u64) -> CsrGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let bsz = n.div_ceil(blocks);
    let mut edges = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let p = if i / bsz == j / bsz { p_in } else { p_out };
            if rng.random::<f64>() < p {
                edges.push((i, j));
            }
        }
    }
    CsrGraph::from_edges(n, &edges, false).unwrap()
}

fn bench_walk_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("walk_generation");

    for n in [1_000usize, 10_000] {
        let graphs = [
            ("ring", ring(n)),
            ("ba_m4", barabasi_albert(n, 4, 123)),
            ("sbm4", sbm(n, 4, 0.02, 0.002, 123)),
        ];
        let cfg = WalkConfig { length: 40, walks_per_node: 2, p: 0.5, q: 2.0, seed: 123 };

        for (name, g) in graphs {
            group.bench_with_input(BenchmarkId::new(format!("{name}/unbiased"), n), &n, |b, _| {
                b.iter(|| black_box(generate_walks_ref(black_box(&g), black_box(cfg))))
            });

            group.bench_with_input(BenchmarkId::new(format!("{name}/biased_otf"), n), &n, |b, _| {
                b.iter(|| black_box(generate_biased_walks_ref(black_box(&g), black_box(cfg))))
            });

            // Table construction is measured apart from sampling.
            let pre = PrecomputedBiasedWalks::new(&g, cfg.p, cfg.q);
            group.bench_with_input(BenchmarkId::new(format!("{name}/biased_precomp"), n), &n, |b, _| {
                b.iter(|| black_box(generate_biased_walks_precomp_ref(black_box(&pre), black_box(cfg))))
            });
        }
    }

    group.finish();
}

fn bench_weighted_walks(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_walks");
    let n = 5_000;
    let g = barabasi_albert(n, 4, 7);
    let cfg = WeightedNode2VecPlusConfig { length: 40, walks_per_node: 2, p: 0.5, q: 2.0, gamma: 1.0, seed: 7 };

    group.bench_function("ba_m4/node2vec", |b| {
        b.iter(|| black_box(generate_biased_walks_weighted_ref(black_box(&g), black_box(cfg))))
    });
    group.bench_function("ba_m4/node2vec_plus", |b| {
        b.iter(|| black_box(generate_biased_walks_weighted_plus_ref(black_box(&g), black_box(cfg))))
    });
    group.finish();
}

criterion_group!(benches, bench_walk_generation, bench_weighted_walks);
criterion_main!(benches);
