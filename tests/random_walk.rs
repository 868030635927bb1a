use nodevectors::{
    generate_biased_walks, generate_biased_walks_precomp_ref,
    generate_biased_walks_precomp_ref_from_nodes, generate_biased_walks_ref,
    generate_biased_walks_weighted_plus_ref, generate_biased_walks_weighted_ref, generate_walks,
    generate_walks_ref, normalize, top_k, CsrGraph, Error, PrecomputedBiasedWalks, WalkConfig,
    WeightedGraphRef, WeightedNode2VecPlusConfig,
};
use nodevectors::{Graph, GraphRef};
use proptest::prelude::*;

/// Adjacency-list adapter, the shape most callers bring from their own code.
#[derive(Debug, Clone)]
struct AdjListGraph {
    adj: Vec<Vec<usize>>,
}

impl AdjListGraph {
    fn new(mut adj: Vec<Vec<usize>>) -> Self {
        for nbrs in &mut adj {
            nbrs.sort_unstable();
        }
        Self { adj }
    }
}

impl Graph for AdjListGraph {
    fn node_count(&self) -> usize {
        self.adj.len()
    }

    fn neighbors(&self, node: usize) -> Vec<usize> {
        self.adj.get(node).cloned().unwrap_or_default()
    }
}

impl GraphRef for AdjListGraph {
    fn node_count(&self) -> usize {
        self.adj.len()
    }

    fn neighbors_ref(&self, node: usize) -> &[usize] {
        self.adj.get(node).map(Vec::as_slice).unwrap_or(&[])
    }
}

// 0--1--2
//     \ |
//       3
fn kite_adj() -> AdjListGraph {
    AdjListGraph::new(vec![vec![1], vec![0, 2, 3], vec![1, 3], vec![1, 2]])
}

fn kite_csr() -> CsrGraph {
    CsrGraph::from_edges(4, &[(0, 1), (1, 2), (1, 3), (2, 3)], false).unwrap()
}

fn assert_walks_sane(walks: &[Vec<usize>], n: usize, max_len: usize) {
    for w in walks {
        assert!(!w.is_empty(), "walk should never be empty");
        assert!(w.len() <= max_len, "walk length exceeded config");
        for &v in w {
            assert!(v < n, "walk node index out of range: {v} >= {n}");
        }
    }
}

fn assert_walks_follow_edges<G: GraphRef>(g: &G, walks: &[Vec<usize>]) {
    for w in walks {
        for win in w.windows(2) {
            let (u, v) = (win[0], win[1]);
            assert!(g.neighbors_ref(u).binary_search(&v).is_ok(), "walk step {u} -> {v} is not an edge");
        }
    }
}

#[test]
fn owned_and_borrowed_adapters_agree() {
    let g = kite_adj();
    let cfg = WalkConfig { length: 8, walks_per_node: 3, p: 1.0, q: 1.0, seed: 42 };

    let a = generate_walks(&g, cfg);
    let b = generate_walks_ref(&g, cfg);
    assert_eq!(a, b, "Graph vs GraphRef paths should match");
    assert_walks_sane(&a, 4, cfg.length);
    assert_walks_follow_edges(&g, &a);

    let cfg = WalkConfig { p: 0.5, q: 2.0, ..cfg };
    let a = generate_biased_walks(&g, cfg);
    let b = generate_biased_walks_ref(&g, cfg);
    assert_eq!(a, b);
    assert_walks_follow_edges(&g, &a);
}

#[test]
fn csr_graph_walks_match_adjacency_list() {
    // Same topology, same sorted neighbor order: the sampler cannot tell them apart.
    let cfg = WalkConfig { length: 10, walks_per_node: 4, p: 0.25, q: 4.0, seed: 9 };
    assert_eq!(generate_walks_ref(&kite_adj(), cfg), generate_walks_ref(&kite_csr(), cfg));
    assert_eq!(generate_biased_walks_ref(&kite_adj(), cfg), generate_biased_walks_ref(&kite_csr(), cfg));
}

#[test]
fn walks_are_epoch_major() {
    let g = kite_csr();
    let cfg = WalkConfig { length: 5, walks_per_node: 3, seed: 1, ..Default::default() };
    let walks = generate_walks_ref(&g, cfg);
    assert_eq!(walks.len(), 12);
    for epoch in walks.chunks(4) {
        let mut starts: Vec<usize> = epoch.iter().map(|w| w[0]).collect();
        starts.sort_unstable();
        assert_eq!(starts, vec![0, 1, 2, 3], "each epoch starts once from every node");
    }
}

#[test]
fn isolated_node_walks_have_length_1() {
    let g = AdjListGraph::new(vec![vec![]]);
    let cfg = WalkConfig { length: 10, walks_per_node: 3, p: 0.5, q: 2.0, seed: 7 };

    let u = generate_walks(&g, cfg);
    assert_eq!(u, generate_walks_ref(&g, cfg));
    assert_eq!(u.len(), 3);
    assert!(u.iter().all(|w| w.as_slice() == [0]));

    let b = generate_biased_walks(&g, cfg);
    assert_eq!(b, generate_biased_walks_ref(&g, cfg));
    assert!(b.iter().all(|w| w.as_slice() == [0]));
}

#[test]
fn topk_and_normalize_basic() {
    let scores = [0.0, 2.0, f64::NAN, 1.0, f64::INFINITY, -1.0];
    let got = top_k(&scores, 2);
    assert_eq!(got, vec![(1, 2.0), (3, 1.0)]);

    let mut v = vec![1.0, 1.0, 2.0];
    normalize(&mut v);
    assert!((v.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    assert!((v[2] - 0.5).abs() < 1e-12);
}

proptest! {
    // Every emitted step is in range and follows an edge, for arbitrary small graphs.
    #[test]
    fn prop_walks_follow_edges_and_are_in_range(
        n in 1usize..8,
        adj in prop::collection::vec(prop::collection::vec(0usize..8, 0..8), 1..8),
        seed in any::<u64>(),
    ) {
        let mut adj2: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, nbrs) in adj.into_iter().take(n).enumerate() {
            adj2[i] = nbrs.into_iter().map(|x| x % n).collect();
        }
        let g = AdjListGraph::new(adj2);

        let cfg = WalkConfig { length: 10, walks_per_node: 2, p: 0.5, q: 2.0, seed };
        let u = generate_walks_ref(&g, cfg);
        assert_walks_sane(&u, n, cfg.length);
        assert_walks_follow_edges(&g, &u);

        let b = generate_biased_walks_ref(&g, cfg);
        assert_walks_sane(&b, n, cfg.length);
        assert_walks_follow_edges(&g, &b);
    }

    // Undirected CSR construction is symmetric whatever the input order or duplicates.
    #[test]
    fn prop_undirected_csr_is_symmetric(
        edges in prop::collection::vec((0usize..10, 0usize..10), 0..30),
    ) {
        let g = CsrGraph::from_edges(10, &edges, false).unwrap();
        for (u, v, w) in g.edges() {
            prop_assert!(g.has_edge(v, u));
            prop_assert!(w > 0.0);
        }
        for u in 0..10 {
            let (nbrs, _) = g.row(u);
            prop_assert!(nbrs.windows(2).all(|p| p[0] < p[1]));
        }
    }
}

#[test]
fn from_nodes_is_reproducible_and_subset_sized() {
    let g = kite_adj();
    let cfg = WalkConfig { length: 6, walks_per_node: 4, p: 0.5, q: 2.0, seed: 123 };
    let starts = [0usize, 2usize];

    let w1 = nodevectors::generate_walks_ref_from_nodes(&g, &starts, cfg);
    assert_eq!(w1, nodevectors::generate_walks_ref_from_nodes(&g, &starts, cfg));
    assert_eq!(w1, nodevectors::generate_walks_from_nodes(&g, &starts, cfg));
    assert_eq!(w1.len(), starts.len() * cfg.walks_per_node);
    assert!(w1.iter().all(|w| starts.contains(&w[0])));

    let b1 = nodevectors::generate_biased_walks_ref_from_nodes(&g, &starts, cfg);
    assert_eq!(b1, nodevectors::generate_biased_walks_from_nodes(&g, &starts, cfg));
    assert_eq!(b1.len(), starts.len() * cfg.walks_per_node);
    assert_walks_sane(&b1, 4, cfg.length);
}

#[test]
fn precomp_is_reproducible_and_follows_edges() {
    let g = kite_adj();
    let cfg = WalkConfig { length: 8, walks_per_node: 3, p: 0.5, q: 2.0, seed: 7 };

    let pre = PrecomputedBiasedWalks::new(&g, cfg.p, cfg.q);
    let w1 = generate_biased_walks_precomp_ref(&pre, cfg).unwrap();
    let w2 = generate_biased_walks_precomp_ref(&pre, cfg).unwrap();
    assert_eq!(w1, w2, "precomputed walks must be deterministic for same seed");
    assert_walks_sane(&w1, 4, cfg.length);
    assert_walks_follow_edges(&g, &w1);

    let starts = [1usize, 3usize];
    let sub = generate_biased_walks_precomp_ref_from_nodes(&pre, &starts, cfg).unwrap();
    assert_eq!(sub.len(), starts.len() * cfg.walks_per_node);
}

#[test]
fn precomp_rejects_mismatched_bias() {
    let pre = PrecomputedBiasedWalks::new(&kite_adj(), 0.5, 2.0);
    let cfg = WalkConfig { p: 1.0, q: 2.0, ..Default::default() };
    assert!(matches!(generate_biased_walks_precomp_ref(&pre, cfg), Err(Error::InvalidConfig(_))));
}

#[test]
fn precomp_does_not_panic_on_non_reciprocal_edges() {
    // 0 -> 1 -> 2, no way back: the second-order step cannot assume prev ∈ neighbors(cur).
    let g = CsrGraph::from_edges(3, &[(0, 1), (1, 2)], true).unwrap();
    let cfg = WalkConfig { length: 6, walks_per_node: 2, p: 0.5, q: 2.0, seed: 1 };

    let pre = PrecomputedBiasedWalks::new(&g, cfg.p, cfg.q);
    let walks = generate_biased_walks_precomp_ref(&pre, cfg).unwrap();
    assert_walks_sane(&walks, 3, cfg.length);
    assert_walks_follow_edges(&g, &walks);
}

#[test]
fn node2vec_plus_matches_node2vec_on_unit_weights() {
    // With unit weights the noise thresholds are constant, so node2vec+ never
    // reweights anything.
    let g = kite_csr();
    let cfg = WeightedNode2VecPlusConfig { length: 8, walks_per_node: 3, p: 0.5, q: 2.0, gamma: 2.0, seed: 123 };

    let w = generate_biased_walks_weighted_ref(&g, cfg);
    let w_plus = generate_biased_walks_weighted_plus_ref(&g, cfg);
    assert_eq!(w, w_plus, "node2vec+ must match node2vec when weights are all 1");
}

#[test]
fn weighted_walks_prefer_heavy_edges() {
    // Star around 0: leaf 1 is 50x heavier than leaf 2.
    let g = CsrGraph::from_weighted_edges(3, &[(0, 1, 50.0), (0, 2, 1.0)], false).unwrap();
    let cfg = WeightedNode2VecPlusConfig { length: 2, walks_per_node: 200, seed: 5, ..Default::default() };
    let walks = generate_biased_walks_weighted_ref(&g, cfg);

    let (mut to_heavy, mut to_light) = (0, 0);
    for w in walks.iter().filter(|w| w[0] == 0) {
        match w[1] {
            1 => to_heavy += 1,
            2 => to_light += 1,
            _ => unreachable!(),
        }
    }
    assert!(to_heavy > 10 * to_light, "heavy={to_heavy} light={to_light}");
    assert_eq!(WeightedGraphRef::node_count(&g), 3);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_is_thread_count_invariant() {
    use nodevectors::{
        generate_biased_walks_precomp_ref_parallel_from_nodes, generate_biased_walks_ref_parallel,
        generate_biased_walks_weighted_ref_parallel, generate_walks_ref_parallel,
    };

    let g = kite_csr();
    let cfg = WalkConfig { length: 8, walks_per_node: 5, p: 0.5, q: 2.0, seed: 999 };

    let pool1 = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
    let pool4 = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();

    let u1 = pool1.install(|| generate_walks_ref_parallel(&g, cfg));
    let u4 = pool4.install(|| generate_walks_ref_parallel(&g, cfg));
    assert_eq!(u1, u4, "unbiased parallel output must be thread-count invariant");

    let b1 = pool1.install(|| generate_biased_walks_ref_parallel(&g, cfg));
    let b4 = pool4.install(|| generate_biased_walks_ref_parallel(&g, cfg));
    assert_eq!(b1, b4, "biased parallel output must be thread-count invariant");

    let pre = PrecomputedBiasedWalks::new(&g, cfg.p, cfg.q);
    let starts = [0usize, 2usize];
    let p1 = pool1.install(|| generate_biased_walks_precomp_ref_parallel_from_nodes(&pre, &starts, cfg)).unwrap();
    let p4 = pool4.install(|| generate_biased_walks_precomp_ref_parallel_from_nodes(&pre, &starts, cfg)).unwrap();
    assert_eq!(p1, p4, "precomp parallel output must be thread-count invariant");

    let wcfg = WeightedNode2VecPlusConfig { length: 8, walks_per_node: 5, p: 0.5, q: 2.0, gamma: 1.0, seed: 3 };
    let w1 = pool1.install(|| generate_biased_walks_weighted_ref_parallel(&g, wcfg, true));
    let w4 = pool4.install(|| generate_biased_walks_weighted_ref_parallel(&g, wcfg, true));
    assert_eq!(w1, w4);
}
