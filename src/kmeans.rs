//! Seeded k-means over planar points.
//!
//! k-means++ seeding, Lloyd iterations, best of `n_init` restarts by
//! inertia. Every cluster keeps at least one member as long as there are at
//! least `k` points: an emptied cluster is reseeded with the point farthest
//! from its centroid, taken from a cluster that can spare it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::geometry;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KMeansOptions {
    pub n_init: usize,
    pub max_iter: usize,
    /// Convergence threshold on the largest centroid shift, in metres.
    pub tolerance_m: f64,
    pub seed: u64,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tolerance_m: 0.01,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    pub labels: Vec<usize>,
    pub centroids: Vec<(f64, f64)>,
    /// Sum of squared distances from each point to its centroid.
    pub inertia: f64,
}

pub fn kmeans(points: &[(f64, f64)], k: usize, options: &KMeansOptions) -> KMeansResult {
    if points.is_empty() || k == 0 {
        return KMeansResult {
            labels: vec![0; points.len()],
            centroids: Vec::new(),
            inertia: 0.0,
        };
    }
    if k >= points.len() {
        return KMeansResult {
            labels: (0..points.len()).collect(),
            centroids: points.to_vec(),
            inertia: 0.0,
        };
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut best: Option<KMeansResult> = None;
    for _ in 0..options.n_init.max(1) {
        let run = lloyd(points, seed_plus_plus(points, k, &mut rng), options);
        if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    best.unwrap_or_else(|| KMeansResult {
        labels: vec![0; points.len()],
        centroids: vec![points[0]],
        inertia: 0.0,
    })
}

fn dist2(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (a.0 - b.0, a.1 - b.1);
    dx * dx + dy * dy
}

fn nearest(point: (f64, f64), centroids: &[(f64, f64)]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, dist2(point, *c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn seed_plus_plus(points: &[(f64, f64)], k: usize, rng: &mut StdRng) -> Vec<(f64, f64)> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    while centroids.len() < k {
        let weights: Vec<f64> = points.iter().map(|p| nearest(*p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = points.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };
        centroids.push(points[pick]);
    }
    centroids
}

fn lloyd(points: &[(f64, f64)], mut centroids: Vec<(f64, f64)>, options: &KMeansOptions) -> KMeansResult {
    let k = centroids.len();
    let mut labels = vec![0usize; points.len()];

    for _ in 0..options.max_iter.max(1) {
        for (label, point) in labels.iter_mut().zip(points) {
            *label = nearest(*point, &centroids).0;
        }
        fill_empty_clusters(points, &mut labels, &centroids, k);

        let mut sums = vec![(0.0, 0.0, 0usize); k];
        for (label, point) in labels.iter().zip(points) {
            let entry = &mut sums[*label];
            entry.0 += point.0;
            entry.1 += point.1;
            entry.2 += 1;
        }
        let mut max_shift: f64 = 0.0;
        for (centroid, (sx, sy, n)) in centroids.iter_mut().zip(sums) {
            if n == 0 {
                continue;
            }
            let updated = (sx / n as f64, sy / n as f64);
            max_shift = max_shift.max(geometry::distance(*centroid, updated));
            *centroid = updated;
        }
        if max_shift <= options.tolerance_m {
            break;
        }
    }

    let inertia = labels
        .iter()
        .zip(points)
        .map(|(label, point)| dist2(*point, centroids[*label]))
        .sum();
    KMeansResult {
        labels,
        centroids,
        inertia,
    }
}

fn fill_empty_clusters(points: &[(f64, f64)], labels: &mut [usize], centroids: &[(f64, f64)], k: usize) {
    let mut counts = vec![0usize; k];
    for label in labels.iter() {
        counts[*label] += 1;
    }
    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let donor = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| counts[**label] > 1)
            .map(|(i, label)| (i, dist2(points[i], centroids[*label])))
            .fold(None, |best: Option<(usize, f64)>, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            });
        if let Some((i, _)) = donor {
            counts[labels[i]] -= 1;
            labels[i] = empty;
            counts[empty] += 1;
        }
    }
}
