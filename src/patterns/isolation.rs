//! Isolation forest
//!
//! Random recursive partitioning: anomalous rows are isolated in fewer
//! splits. Scores follow the usual convention of `-2^(-E[h(x)] / c(n))`,
//! so more negative means more anomalous. Rows scoring below the
//! `contamination` percentile of the training scores are outliers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_TREES: usize = 100;
const DEFAULT_MAX_SAMPLES: usize = 256;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn path_length(&self, row: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.path_length(row, depth + 1)
                } else {
                    right.path_length(row, depth + 1)
                }
            }
        }
    }
}

fn build(data: &[Vec<f64>], indices: Vec<usize>, depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if depth >= max_depth || indices.len() <= 1 {
        return Node::Leaf { size: indices.len() };
    }

    let dims = data[indices[0]].len();
    let bounds: Vec<(usize, f64, f64)> = (0..dims)
        .filter_map(|j| {
            let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(data[i][j]), hi.max(data[i][j]))
            });
            (lo < hi).then_some((j, lo, hi))
        })
        .collect();

    if bounds.is_empty() {
        return Node::Leaf { size: indices.len() };
    }

    let (feature, lo, hi) = bounds[rng.gen_range(0..bounds.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.into_iter().partition(|&i| data[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build(data, left, depth + 1, max_depth, rng)),
        right: Box::new(build(data, right, depth + 1, max_depth, rng)),
    }
}

/// Isolation forest configuration
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: usize,
    max_samples: usize,
    contamination: f64,
    seed: u64,
}

/// A fitted forest with its decision threshold
#[derive(Debug, Clone)]
pub struct IsolationModel {
    trees: Vec<Node>,
    sample_size: usize,
    /// Scores strictly below this are outliers
    pub offset: f64,
}

impl IsolationForest {
    pub fn new(contamination: f64, seed: u64) -> Self {
        Self {
            trees: DEFAULT_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination: contamination.clamp(0.0, 0.5),
            seed,
        }
    }

    /// Fit on `data`; None for empty input
    pub fn fit(&self, data: &[Vec<f64>]) -> Option<IsolationModel> {
        if data.is_empty() {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample_size = self.max_samples.min(data.len());
        let max_depth = (sample_size as f64).log2().ceil().max(0.0) as usize;

        let trees = (0..self.trees)
            .map(|_| {
                let indices = rand::seq::index::sample(&mut rng, data.len(), sample_size).into_vec();
                build(data, indices, 0, max_depth, &mut rng)
            })
            .collect();

        let mut model = IsolationModel {
            trees,
            sample_size,
            offset: 0.0,
        };
        let training_scores = model.score_samples(data);
        model.offset = percentile(&training_scores, self.contamination * 100.0);
        Some(model)
    }
}

impl IsolationModel {
    /// Anomaly score per row, in `[-1, 0)`; lower is more anomalous
    pub fn score_samples(&self, data: &[Vec<f64>]) -> Vec<f64> {
        let norm = average_path_length(self.sample_size);
        data.iter()
            .map(|row| {
                let mean_depth = self
                    .trees
                    .iter()
                    .map(|tree| tree.path_length(row, 0))
                    .sum::<f64>()
                    / self.trees.len() as f64;
                if norm > 0.0 {
                    -(2f64.powf(-mean_depth / norm))
                } else {
                    -1.0
                }
            })
            .collect()
    }

    /// Outlier flag per score
    pub fn is_outlier(&self, score: f64) -> bool {
        score < self.offset
    }
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
