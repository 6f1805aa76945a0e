//! Histogram-based GBDT trainer.
//!
//! Trees grow depth-wise on quantized features. Each round computes
//! gradients from the current margins, samples rows, then grows one tree per
//! output group on its own column sample. Margins are updated by traversing
//! the new tree on the raw feature values, so training and inference share a
//! single split rule.

use ndarray::ArrayView2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;

use super::binning::{BinnedMatrix, MISSING_BIN};
use super::config::PipelineConfig;
use super::forest::Forest;
use super::objective::{GradsTuple, ObjectiveFn};
use super::tree::{ALL_OBSERVED_LEFT, MutableTree, NodeId, Tree};
use crate::utils::Parallelism;

// =============================================================================
// GainParams
// =============================================================================

/// Split gain parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GainParams {
    /// L2 regularization on leaf weights.
    pub reg_lambda: f64,
    /// Minimum hessian sum in each child.
    pub min_child_weight: f64,
    /// Minimum gain to accept a split.
    pub min_gain: f64,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            min_gain: 0.0,
        }
    }
}

impl GainParams {
    #[inline]
    fn score(&self, grad: f64, hess: f64) -> f64 {
        grad * grad / (hess + self.reg_lambda)
    }

    /// Second-order gain of splitting a parent into `(left, right)`.
    #[inline]
    pub fn split_gain(&self, left: (f64, f64), right: (f64, f64)) -> f64 {
        let parent = (left.0 + right.0, left.1 + right.1);
        0.5 * (self.score(left.0, left.1) + self.score(right.0, right.1) - self.score(parent.0, parent.1))
            - self.min_gain
    }

    /// Newton step leaf weight (before shrinkage).
    #[inline]
    pub fn leaf_weight(&self, grad: f64, hess: f64) -> f64 {
        -grad / (hess + self.reg_lambda)
    }
}

// =============================================================================
// GBDTParams
// =============================================================================

/// Parameters for GBDT training.
#[derive(Clone, Debug)]
pub struct GBDTParams {
    pub n_trees: u32,
    pub learning_rate: f32,
    pub max_depth: u32,
    pub max_bins: usize,
    pub gain: GainParams,
    /// Fraction of rows used per round.
    pub subsample: f32,
    /// Fraction of features used per tree.
    pub colsample_bytree: f32,
    pub seed: u64,
}

impl From<&PipelineConfig> for GBDTParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            learning_rate: config.learning_rate,
            max_depth: config.tree.max_depth,
            max_bins: config.tree.max_bins as usize,
            gain: GainParams {
                reg_lambda: config.regularization.lambda as f64,
                min_child_weight: config.regularization.min_child_weight as f64,
                min_gain: config.regularization.min_gain as f64,
            },
            subsample: config.sampling.subsample,
            colsample_bytree: config.sampling.colsample_bytree,
            seed: config.seed,
        }
    }
}

// =============================================================================
// GBDTTrainer
// =============================================================================

/// GBDT trainer for class-index targets.
pub struct GBDTTrainer {
    objective: Box<dyn ObjectiveFn>,
    params: GBDTParams,
}

impl GBDTTrainer {
    pub fn new(objective: Box<dyn ObjectiveFn>, params: GBDTParams) -> Self {
        Self { objective, params }
    }

    pub fn params(&self) -> &GBDTParams {
        &self.params
    }

    /// Train a forest on a row-major `[n_rows, n_features]` matrix.
    pub fn train(&self, features: ArrayView2<'_, f32>, targets: &[u32], parallelism: Parallelism) -> Forest {
        let (n_rows, n_features) = features.dim();
        debug_assert_eq!(targets.len(), n_rows);
        let n_outputs = self.objective.n_outputs();

        let owned;
        let flat: &[f32] = match features.as_slice() {
            Some(flat) => flat,
            None => {
                owned = features.iter().copied().collect::<Vec<_>>();
                &owned
            }
        };
        let row = |i: usize| &flat[i * n_features..(i + 1) * n_features];

        let binned = BinnedMatrix::from_features(features, self.params.max_bins, parallelism);

        let mut base_score = vec![0.0f32; n_outputs];
        self.objective.compute_base_score(targets, &mut base_score);
        let mut forest = Forest::new(n_outputs as u32).with_base_score(base_score.clone());

        let mut margins: Vec<f32> = base_score
            .iter()
            .flat_map(|&b| std::iter::repeat_n(b, n_rows))
            .collect();
        let mut grads = vec![GradsTuple::default(); n_rows * n_outputs];
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        let grower = TreeGrower {
            binned: &binned,
            params: &self.params,
            parallelism,
        };

        for round in 0..self.params.n_trees {
            self.objective.compute_gradients(n_rows, &margins, targets, &mut grads);
            let rows = self.sample_rows(n_rows, &mut rng);

            for output in 0..n_outputs {
                let feature_subset = self.sample_features(n_features, &mut rng);
                let output_grads = &grads[output * n_rows..(output + 1) * n_rows];
                let tree = grower.grow(output_grads, rows.clone(), &feature_subset);

                let deltas = parallelism.maybe_par_map(0..n_rows, |i| tree.predict_row(row(i)));
                for (margin, delta) in margins[output * n_rows..(output + 1) * n_rows]
                    .iter_mut()
                    .zip(deltas)
                {
                    *margin += delta;
                }

                tracing::trace!(round, output, n_nodes = tree.n_nodes(), "grew tree");
                forest.push_tree(tree, output as u32);
            }

            tracing::debug!(
                round,
                objective = self.objective.name(),
                sampled_rows = rows.len(),
                "finished boosting round"
            );
        }

        forest
    }

    fn sample_rows(&self, n_rows: usize, rng: &mut StdRng) -> Vec<u32> {
        let rate = self.params.subsample;
        if rate >= 1.0 {
            return (0..n_rows as u32).collect();
        }
        let rows: Vec<u32> = (0..n_rows as u32).filter(|_| rng.r#gen::<f32>() < rate).collect();
        if rows.is_empty() {
            (0..n_rows as u32).collect()
        } else {
            rows
        }
    }

    fn sample_features(&self, n_features: usize, rng: &mut StdRng) -> Vec<usize> {
        let rate = self.params.colsample_bytree;
        if rate >= 1.0 || n_features <= 1 {
            return (0..n_features).collect();
        }
        let amount = ((n_features as f32 * rate).ceil() as usize).clamp(1, n_features);
        let mut picked = sample(rng, n_features, amount).into_vec();
        picked.sort_unstable();
        picked
    }
}

// =============================================================================
// Tree growing
// =============================================================================

/// Best split found for one node.
#[derive(Debug, Clone, PartialEq)]
struct SplitCandidate {
    feature: usize,
    /// Rows with bin `<= bin` go left.
    bin: usize,
    threshold: f32,
    default_left: bool,
    gain: f64,
}

struct NodeTask {
    node: NodeId,
    rows: Vec<u32>,
    grad: f64,
    hess: f64,
}

struct TreeGrower<'a> {
    binned: &'a BinnedMatrix,
    params: &'a GBDTParams,
    parallelism: Parallelism,
}

impl TreeGrower<'_> {
    fn grow(&self, grads: &[GradsTuple], rows: Vec<u32>, features: &[usize]) -> Tree {
        let mut tree = MutableTree::with_root();
        let (grad, hess) = sum_grads(grads, &rows);
        let mut level = vec![NodeTask { node: 0, rows, grad, hess }];

        for _depth in 0..self.params.max_depth {
            let mut next = Vec::new();
            for task in level {
                match self.find_split(grads, &task, features) {
                    Some(split) => {
                        let (left, right) = tree.split(
                            task.node,
                            split.feature as u32,
                            split.threshold,
                            split.default_left,
                        );
                        let bins = self.binned.feature(split.feature);
                        let (left_rows, right_rows): (Vec<u32>, Vec<u32>) =
                            task.rows.iter().partition(|&&r| {
                                let bin = bins[r as usize];
                                if bin == MISSING_BIN {
                                    split.default_left
                                } else {
                                    bin as usize <= split.bin
                                }
                            });
                        for (node, rows) in [(left, left_rows), (right, right_rows)] {
                            let (grad, hess) = sum_grads(grads, &rows);
                            next.push(NodeTask { node, rows, grad, hess });
                        }
                    }
                    None => self.finish_leaf(&mut tree, &task),
                }
            }
            level = next;
            if level.is_empty() {
                break;
            }
        }

        for task in &level {
            self.finish_leaf(&mut tree, task);
        }
        tree.freeze()
    }

    fn finish_leaf(&self, tree: &mut MutableTree, task: &NodeTask) {
        let weight = self.params.gain.leaf_weight(task.grad, task.hess) * self.params.learning_rate as f64;
        tree.set_leaf_value(task.node, weight as f32);
    }

    fn find_split(&self, grads: &[GradsTuple], task: &NodeTask, features: &[usize]) -> Option<SplitCandidate> {
        let gain = &self.params.gain;
        if task.rows.len() < 2 || task.hess < 2.0 * gain.min_child_weight {
            return None;
        }

        let candidates = self
            .parallelism
            .maybe_par_map(features.to_vec(), |f| self.best_split_for_feature(grads, task, f));

        // Sequential reduction keeps the choice independent of thread timing.
        let mut best: Option<SplitCandidate> = None;
        for candidate in candidates.into_iter().flatten() {
            if best.as_ref().is_none_or(|b| candidate.gain > b.gain) {
                best = Some(candidate);
            }
        }
        best
    }

    fn best_split_for_feature(&self, grads: &[GradsTuple], task: &NodeTask, feature: usize) -> Option<SplitCandidate> {
        let mapper = self.binned.mapper(feature);
        let n_bins = mapper.n_bins();
        let bins = self.binned.feature(feature);

        // Histogram over value bins; missing rows are summed separately.
        let mut hist = vec![(0.0f64, 0.0f64); n_bins];
        let mut missing = (0.0f64, 0.0f64);
        for &r in &task.rows {
            let g = grads[r as usize];
            let slot = match bins[r as usize] {
                MISSING_BIN => &mut missing,
                bin => &mut hist[bin as usize],
            };
            slot.0 += g.grad as f64;
            slot.1 += g.hess as f64;
        }

        let gain_params = &self.params.gain;
        let total = (task.grad, task.hess);
        let has_missing = missing.1 > 0.0;
        let mut best: Option<SplitCandidate> = None;
        let mut consider = |bin: usize, threshold: f32, left: (f64, f64), default_left: bool| {
            let right = (total.0 - left.0, total.1 - left.1);
            if left.1 < gain_params.min_child_weight || right.1 < gain_params.min_child_weight {
                return;
            }
            let gain = gain_params.split_gain(left, right);
            if gain > 0.0 && best.as_ref().is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    bin,
                    threshold,
                    default_left,
                    gain,
                });
            }
        };

        let mut observed_left = (0.0f64, 0.0f64);
        for (bin, &(g, h)) in hist.iter().enumerate().take(n_bins.saturating_sub(1)) {
            observed_left.0 += g;
            observed_left.1 += h;
            let threshold = mapper.threshold(bin);
            consider(bin, threshold, observed_left, false);
            if has_missing {
                consider(
                    bin,
                    threshold,
                    (observed_left.0 + missing.0, observed_left.1 + missing.1),
                    true,
                );
            }
        }

        // Observed values left, missing values right.
        if has_missing {
            let observed = (total.0 - missing.0, total.1 - missing.1);
            consider(n_bins - 1, ALL_OBSERVED_LEFT, observed, false);
        }

        best
    }
}

fn sum_grads(grads: &[GradsTuple], rows: &[u32]) -> (f64, f64) {
    rows.iter().fold((0.0, 0.0), |(g, h), &r| {
        let pair = grads[r as usize];
        (g + pair.grad as f64, h + pair.hess as f64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::objective::{LogisticLoss, SoftmaxLoss};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn params(n_trees: u32) -> GBDTParams {
        GBDTParams {
            n_trees,
            learning_rate: 0.3,
            max_depth: 3,
            max_bins: 255,
            gain: GainParams::default(),
            subsample: 1.0,
            colsample_bytree: 1.0,
            seed: 7,
        }
    }

    #[test]
    fn gain_formula() {
        let gain = GainParams { reg_lambda: 1.0, min_child_weight: 0.0, min_gain: 0.0 };
        // Symmetric children: 0.5 * (4/3 + 4/3 - 0) = 4/3
        assert_abs_diff_eq!(gain.split_gain((2.0, 2.0), (-2.0, 2.0)), 4.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(gain.leaf_weight(2.0, 3.0), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn learns_a_threshold() {
        let n = 200;
        let features = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f32 } else { (i % 7) as f32 });
        let targets: Vec<u32> = (0..n).map(|i| u32::from(i >= 100)).collect();

        let trainer = GBDTTrainer::new(Box::new(LogisticLoss), params(10));
        let forest = trainer.train(features.view(), &targets, Parallelism::Sequential);
        assert_eq!(forest.n_trees(), 10);
        assert_eq!(forest.validate(2), Ok(()));

        let margins = forest.predict(features.view(), Parallelism::Sequential);
        for i in 0..n {
            assert_eq!(margins[[i, 0]] > 0.0, i >= 100, "row {i}");
        }
        // The first split separates the classes on feature 0.
        let first = forest.trees().next().unwrap();
        assert_eq!(first.split_indices()[0], 0);
    }

    #[test]
    fn learns_missingness() {
        let n = 100;
        let features = Array2::from_shape_fn((n, 1), |(i, _)| if i % 2 == 0 { f32::NAN } else { 1.0 });
        let targets: Vec<u32> = (0..n).map(|i| u32::from(i % 2 == 0)).collect();

        let trainer = GBDTTrainer::new(Box::new(LogisticLoss), params(5));
        let forest = trainer.train(features.view(), &targets, Parallelism::Sequential);
        let positive = forest.predict_row(&[f32::NAN])[0];
        let negative = forest.predict_row(&[1.0])[0];
        assert!(positive > 0.0 && negative < 0.0);
    }

    #[test]
    fn multiclass_grows_one_tree_per_class() {
        let n = 90;
        let features = Array2::from_shape_fn((n, 1), |(i, _)| i as f32);
        let targets: Vec<u32> = (0..n).map(|i| (i / 30) as u32).collect();

        let trainer = GBDTTrainer::new(Box::new(SoftmaxLoss::new(3)), params(4));
        let forest = trainer.train(features.view(), &targets, Parallelism::Parallel);
        assert_eq!(forest.n_trees(), 12);
        assert_eq!(forest.n_groups(), 3);

        let margins = forest.predict(features.view(), Parallelism::Sequential);
        for i in [5, 45, 85] {
            let row = margins.row(i);
            let argmax = (0..3).max_by(|&a, &b| row[a].total_cmp(&row[b])).unwrap();
            assert_eq!(argmax as u32, targets[i]);
        }
    }

    #[test]
    fn seeded_sampling_is_deterministic() {
        let n = 300;
        let features = Array2::from_shape_fn((n, 4), |(i, j)| ((i * (j + 3)) % 17) as f32);
        let targets: Vec<u32> = (0..n).map(|i| u32::from((i * 5) % 17 > 8)).collect();
        let mut p = params(8);
        p.subsample = 0.8;
        p.colsample_bytree = 0.5;

        let a = GBDTTrainer::new(Box::new(LogisticLoss), p.clone()).train(features.view(), &targets, Parallelism::Sequential);
        let b = GBDTTrainer::new(Box::new(LogisticLoss), p).train(features.view(), &targets, Parallelism::Parallel);
        assert_eq!(a, b);
    }
}
