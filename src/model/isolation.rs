//! Isolation forest. Raw scores are the negated anomaly score `-2^(-E[h(x)]/c(psi))`,
//! so they lie in [-1, 0) and higher means more typical. The boundary is the
//! training-score percentile at `contamination`.

use super::{ModelScore, ModelSnapshot, OutlierModel};
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use chrono::Utc;
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const ALGORITHM: &str = "isolation_forest";

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

/// One isolation tree stored as an arena; index 0 is the root.
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(data: &Array2<f64>, rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, rows, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &Array2<f64>,
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= max_depth || rows.len() <= 1 {
            return id;
        }

        // Only features that still vary within this node, over a span representable
        // as f64, can isolate anything.
        let ranges: Vec<(usize, f64, f64)> = (0..data.ncols())
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = data[[r, f]];
                    (lo.min(v), hi.max(v))
                });
                (lo < hi && (hi - lo).is_finite()).then_some((f, lo, hi))
            })
            .collect();
        if ranges.is_empty() {
            return id;
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = rng.gen_range(lo..hi);
        let (l_rows, r_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[[r, feature]] < threshold);

        let left = self.grow(data, l_rows, depth + 1, max_depth, rng);
        let right = self.grow(data, r_rows, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, x: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[feature] < threshold { left } else { right };
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

/// Linear-interpolated percentile, `q` in [0, 100].
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn to_matrix(vectors: &[FeatureVector]) -> Array2<f64> {
    let rows: Vec<[f64; FeatureVector::DIM]> = vectors.iter().map(|v| v.to_array()).collect();
    Array2::from_shape_fn((rows.len(), FeatureVector::DIM), |(i, j)| rows[i][j])
}

struct Fit {
    trees: Vec<IsolationTree>,
    normalizer: f64,
    snapshot: ModelSnapshot,
}

pub struct IsolationForest {
    config: ModelConfig,
    fit: Option<Fit>,
}

impl IsolationForest {
    pub fn new(config: ModelConfig) -> Self {
        Self { config, fit: None }
    }

    fn raw_score(fit: &Fit, x: ArrayView1<f64>) -> f64 {
        let mean_path =
            fit.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / fit.trees.len() as f64;
        -(2f64.powf(-mean_path / fit.normalizer))
    }
}

impl OutlierModel for IsolationForest {
    fn fit(&mut self, vectors: &[FeatureVector]) -> Result<()> {
        if vectors.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }
        let data = to_matrix(vectors);
        let n = data.nrows();
        let psi = self.config.sample_size.clamp(1, n);
        let max_depth = (psi as f64).log2().ceil() as usize;
        let num_trees = self.config.num_trees.max(1);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let trees: Vec<IsolationTree> = (0..num_trees)
            .map(|_| {
                let rows = rand::seq::index::sample(&mut rng, n, psi).into_vec();
                IsolationTree::build(&data, rows, max_depth, &mut rng)
            })
            .collect();

        let mut fit = Fit {
            trees,
            normalizer: average_path_length(psi).max(1.0),
            snapshot: ModelSnapshot {
                algorithm: ALGORITHM.to_string(),
                boundary: 0.0,
                trained_on: n,
                trained_at: Utc::now(),
                seed: self.config.seed,
            },
        };
        let train_scores: Vec<f64> = data
            .rows()
            .into_iter()
            .map(|row| Self::raw_score(&fit, row))
            .collect();
        let contamination = self.config.contamination.clamp(f64::EPSILON, 0.5);
        fit.snapshot.boundary = percentile(&train_scores, contamination * 100.0);

        tracing::debug!(
            trees = num_trees,
            samples = n,
            boundary = fit.snapshot.boundary,
            "isolation forest fit"
        );
        self.fit = Some(fit);
        Ok(())
    }

    fn score(&self, vector: &FeatureVector) -> Result<ModelScore> {
        let fit = self.fit.as_ref().ok_or(Error::ModelNotTrained)?;
        let x = vector.to_array();
        Ok(ModelScore {
            raw: Self::raw_score(fit, ArrayView1::from(&x[..])),
            boundary: fit.snapshot.boundary,
        })
    }

    fn snapshot(&self) -> Option<ModelSnapshot> {
        self.fit.as_ref().map(|f| f.snapshot.clone())
    }
}
