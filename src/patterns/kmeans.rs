//! Seeded k-means
//!
//! Lloyd iterations from k-means++ starts; the best of several restarts
//! by inertia wins. Deterministic for a given seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_RESTARTS: usize = 10;
const DEFAULT_MAX_ITER: usize = 300;

/// k-means configuration
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    restarts: usize,
    max_iter: usize,
    seed: u64,
}

/// A fitted partition
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Cluster index per input row
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to assigned centroids
    pub inertia: f64,
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the closest centroid, lowest index on ties
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = sq_dist(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

impl KMeans {
    pub fn new(k: usize, seed: u64) -> Self {
        Self {
            k: k.max(1),
            restarts: DEFAULT_RESTARTS,
            max_iter: DEFAULT_MAX_ITER,
            seed,
        }
    }

    /// Partition `data` into `k` clusters; None if there are fewer rows than `k`
    pub fn fit(&self, data: &[Vec<f64>]) -> Option<KMeansFit> {
        if data.len() < self.k {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;

        for _ in 0..self.restarts {
            let centroids = self.plus_plus(data, &mut rng);
            let fit = self.lloyd(data, centroids);
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }

        best
    }

    /// k-means++ seeding
    fn plus_plus(&self, data: &[Vec<f64>], rng: &mut StdRng) -> Vec<Vec<f64>> {
        let mut centroids = vec![data[rng.gen_range(0..data.len())].clone()];
        let mut dists: Vec<f64> = data.iter().map(|p| sq_dist(p, &centroids[0])).collect();

        while centroids.len() < self.k {
            let total: f64 = dists.iter().sum();
            let next = if total > 0.0 {
                let mut target = rng.gen::<f64>() * total;
                let mut chosen = data.len() - 1;
                for (i, d) in dists.iter().enumerate() {
                    if target < *d {
                        chosen = i;
                        break;
                    }
                    target -= d;
                }
                chosen
            } else {
                // All points coincide with existing centroids
                rng.gen_range(0..data.len())
            };

            let centroid = data[next].clone();
            for (d, p) in dists.iter_mut().zip(data) {
                *d = d.min(sq_dist(p, &centroid));
            }
            centroids.push(centroid);
        }

        centroids
    }

    fn lloyd(&self, data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>) -> KMeansFit {
        let dims = data[0].len();
        let mut labels: Vec<usize> = data.iter().map(|p| nearest(p, &centroids).0).collect();

        for _ in 0..self.max_iter {
            let mut sums = vec![vec![0.0; dims]; self.k];
            let mut counts = vec![0usize; self.k];
            for (p, &label) in data.iter().zip(&labels) {
                counts[label] += 1;
                for (s, x) in sums[label].iter_mut().zip(p) {
                    *s += x;
                }
            }
            // Empty clusters keep their previous centroid
            for (c, (sum, count)) in centroids.iter_mut().zip(sums.into_iter().zip(&counts)) {
                if *count > 0 {
                    *c = sum.into_iter().map(|s| s / *count as f64).collect();
                }
            }

            let next: Vec<usize> = data.iter().map(|p| nearest(p, &centroids).0).collect();
            if next == labels {
                break;
            }
            labels = next;
        }

        let inertia = data
            .iter()
            .zip(&labels)
            .map(|(p, &l)| sq_dist(p, &centroids[l]))
            .sum();

        KMeansFit {
            labels,
            centroids,
            inertia,
        }
    }
}
