//! Isolation forest over the 2-D (frequency, amplitude) feature space.
//!
//! Points that are isolated by few random axis-aligned splits are outliers.
//! Scores follow Liu et al. (2008): `s(x) = 2^(-E[h(x)] / c(psi))`. The
//! decision margin is `-s(x) - offset`, where `offset` is the
//! contamination-quantile of the training scores, so roughly `contamination`
//! of the training set falls below zero.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use super::DetectError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

pub type Point = [f64; 2];

/// Forest hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_samples: usize,
    /// Expected outlier fraction in the training data.
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &[Point], idx: &mut [usize], height_limit: usize, rng: &mut StdRng) -> Self {
        let mut nodes = Vec::new();
        Self::grow_node(data, idx, 0, height_limit, rng, &mut nodes);
        Self { nodes }
    }

    fn grow_node(
        data: &[Point],
        idx: &mut [usize],
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
        nodes: &mut Vec<Node>,
    ) -> usize {
        let id = nodes.len();
        nodes.push(Node::Leaf { size: idx.len() });
        if depth >= height_limit || idx.len() <= 1 {
            return id;
        }

        // Random feature among those that still vary.
        let first = rng.gen_range(0..2);
        let mut split = None;
        for feature in [first, 1 - first] {
            let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(data[i][feature]), hi.max(data[i][feature]))
            });
            if lo < hi {
                split = Some((feature, rng.gen_range(lo..hi)));
                break;
            }
        }
        let Some((feature, threshold)) = split else {
            return id;
        };

        let mut mid = 0;
        for j in 0..idx.len() {
            if data[idx[j]][feature] < threshold {
                idx.swap(mid, j);
                mid += 1;
            }
        }
        let (left_idx, right_idx) = idx.split_at_mut(mid);
        let left = Self::grow_node(data, left_idx, depth + 1, height_limit, rng, nodes);
        let right = Self::grow_node(data, right_idx, depth + 1, height_limit, rng, nodes);
        nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, x: &Point) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[feature] < threshold { left } else { right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(size),
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
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

/// Linear-interpolated percentile, `p` in [0, 100].
fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// A fitted isolation forest.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample: usize,
    offset: f64,
}

impl IsolationForest {
    pub fn fit(data: &[Point], params: ForestParams) -> Result<Self, DetectError> {
        let data: Vec<Point> = data
            .iter()
            .copied()
            .filter(|p| p[0].is_finite() && p[1].is_finite())
            .collect();
        if data.is_empty() {
            return Err(DetectError::EmptyTrainingSet);
        }

        let subsample = params.max_samples.min(data.len()).max(1);
        let height_limit = (subsample as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let mut idx = index::sample(&mut rng, data.len(), subsample).into_vec();
                IsolationTree::grow(&data, &mut idx, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            subsample,
            offset: 0.0,
        };
        let train_scores: Vec<f64> = data.iter().map(|p| forest.score_sample(p)).collect();
        forest.offset = percentile(&train_scores, 100.0 * params.contamination);
        Ok(forest)
    }

    /// Opposite of the anomaly score: lower is more abnormal, in [-1, 0].
    pub fn score_sample(&self, x: &Point) -> f64 {
        let mean_depth = self.trees.iter().map(|t| t.path_length(x)).sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.subsample);
        if norm <= 0.0 {
            return -0.5;
        }
        -(2f64.powf(-mean_depth / norm))
    }

    /// Signed margin to the decision boundary; negative means outlier.
    pub fn decision(&self, x: &Point) -> f64 {
        self.score_sample(x) - self.offset
    }

    pub fn is_outlier(&self, x: &Point) -> bool {
        self.decision(x) < 0.0
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// FM-like cluster: a handful of carriers at moderate amplitude.
    fn cluster(n: usize) -> Vec<Point> {
        let mut rng = StdRng::seed_from_u64(9);
        (0..n)
            .map(|i| {
                let carrier = [88.5, 95.3, 102.5][i % 3];
                [carrier, rng.gen_range(0.5..1.0)]
            })
            .collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) is roughly 10.24
        assert!((average_path_length(256) - 10.24).abs() < 0.05);
    }

    #[test]
    fn test_percentile() {
        let v = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 50.0), 3.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert!((percentile(&v, 5.0) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_outlier_scores_lower() {
        let forest = IsolationForest::fit(&cluster(600), ForestParams::default()).unwrap();
        let inlier = [95.3, 0.75];
        let outlier = [60.0, 4.5];
        assert!(forest.decision(&outlier) < forest.decision(&inlier));
        assert!(forest.is_outlier(&outlier));
        assert!(!forest.is_outlier(&inlier));
    }

    #[test]
    fn test_contamination_fraction() {
        let data = cluster(1000);
        let forest = IsolationForest::fit(&data, ForestParams::default()).unwrap();
        let flagged = data.iter().filter(|p| forest.is_outlier(p)).count();
        let fraction = flagged as f64 / data.len() as f64;
        assert!(fraction <= 0.06, "fraction {}", fraction);
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let data = cluster(400);
        let a = IsolationForest::fit(&data, ForestParams::default()).unwrap();
        let b = IsolationForest::fit(&data, ForestParams::default()).unwrap();
        for p in [[90.0, 0.2], [95.3, 0.8], [101.0, 3.0]] {
            assert_eq!(a.decision(&p), b.decision(&p));
        }
        assert_eq!(a.n_trees(), 100);
    }

    #[test]
    fn test_empty_training_set() {
        let res = IsolationForest::fit(&[], ForestParams::default());
        assert!(matches!(res, Err(DetectError::EmptyTrainingSet)));
    }

    #[test]
    fn test_constant_data() {
        let data = vec![[95.0, 1.0]; 50];
        let forest = IsolationForest::fit(&data, ForestParams::default()).unwrap();
        // Unsplittable data gives every point the same score.
        assert_eq!(forest.decision(&[95.0, 1.0]), 0.0);
    }
}
