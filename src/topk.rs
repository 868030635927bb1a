//! Ranking utilities.

use ordered_float::NotNan;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// The `k` largest finite, strictly positive scores as `(index, score)`, descending.
pub fn top_k(scores: &[f64], k: usize) -> Vec<(usize, f64)> {
    bounded_heap(scores.iter().copied().enumerate().filter(|&(_, s)| s > 0.0), k)
}

/// The `k` largest finite scores (any sign) as `(index, score)`, descending.
///
/// Cosine similarities are ranked with this one; negative similarity is still a rank.
pub fn top_k_by<I>(scores: I, k: usize) -> Vec<(usize, f64)>
where
    I: IntoIterator<Item = (usize, f64)>,
{
    bounded_heap(scores, k)
}

fn bounded_heap<I>(scores: I, k: usize) -> Vec<(usize, f64)>
where
    I: IntoIterator<Item = (usize, f64)>,
{
    if k == 0 {
        return Vec::new();
    }
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (i, score) in scores {
        if !score.is_finite() {
            continue;
        }
        let Ok(s) = NotNan::new(score) else { continue };
        if heap.len() < k {
            heap.push(Reverse((s, i)));
        } else if let Some(&Reverse((min_score, _))) = heap.peek() {
            if s > min_score {
                heap.pop();
                heap.push(Reverse((s, i)));
            }
        }
    }
    let mut results: Vec<(usize, f64)> =
        heap.into_iter().map(|Reverse((s, i))| (i, s.into_inner())).collect();
    results.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    results
}

pub fn normalize(scores: &mut [f64]) {
    let sum: f64 = scores.iter().sum();
    if sum > 0.0 {
        for s in scores {
            *s /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_k_by_keeps_negative_scores() {
        let got = top_k_by(vec![(0, -0.5), (1, 0.25), (2, -0.1), (3, f64::NAN)], 3);
        assert_eq!(got, vec![(1, 0.25), (2, -0.1), (0, -0.5)]);
    }

    #[test]
    fn zero_k_is_empty() {
        assert!(top_k(&[1.0, 2.0], 0).is_empty());
    }
}
