//! Forest of trees with per-group accumulation.

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

use super::tree::{Tree, TreeValidationError};
use crate::utils::Parallelism;

/// Rows per prediction block.
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Structural validation errors for [`Forest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForestValidationError {
    #[error("forest has no output groups")]
    NoGroups,

    #[error("base score has {len} entries for {n_groups} groups")]
    BaseScoreLenMismatch { n_groups: u32, len: usize },

    #[error("{len} group assignments for {n_trees} trees")]
    TreeGroupsLenMismatch { n_trees: usize, len: usize },

    #[error("tree {tree_idx} assigned to group {group} of {n_groups}")]
    TreeGroupOutOfRange {
        tree_idx: usize,
        group: u32,
        n_groups: u32,
    },

    #[error("base score is not finite")]
    NonFiniteBaseScore,

    #[error("tree {tree_idx}: {error}")]
    InvalidTree {
        tree_idx: usize,
        error: TreeValidationError,
    },
}

/// Additive tree ensemble.
///
/// Each tree contributes to one output group; a sample's margin for group
/// `g` is `base_score[g]` plus the leaf values of all trees in `g`.
#[derive(Debug, Clone, PartialEq)]
pub struct Forest {
    trees: Vec<Tree>,
    tree_groups: Vec<u32>,
    n_groups: u32,
    base_score: Vec<f32>,
}

impl Forest {
    pub fn new(n_groups: u32) -> Self {
        Self {
            trees: Vec::new(),
            tree_groups: Vec::new(),
            n_groups,
            base_score: vec![0.0; n_groups as usize],
        }
    }

    pub fn with_base_score(mut self, base_score: Vec<f32>) -> Self {
        debug_assert_eq!(base_score.len(), self.n_groups as usize);
        self.base_score = base_score;
        self
    }

    /// Assemble a forest from stored parts. Run [`Forest::validate`] afterwards.
    pub fn from_parts(trees: Vec<Tree>, tree_groups: Vec<u32>, n_groups: u32, base_score: Vec<f32>) -> Self {
        Self {
            trees,
            tree_groups,
            n_groups,
            base_score,
        }
    }

    pub fn push_tree(&mut self, tree: Tree, group: u32) {
        debug_assert!(group < self.n_groups, "group out of range");
        self.trees.push(tree);
        self.tree_groups.push(group);
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn n_groups(&self) -> u32 {
        self.n_groups
    }

    #[inline]
    pub fn base_score(&self) -> &[f32] {
        &self.base_score
    }

    #[inline]
    pub fn tree_groups(&self) -> &[u32] {
        &self.tree_groups
    }

    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.iter()
    }

    pub fn trees_with_groups(&self) -> impl Iterator<Item = (&Tree, u32)> {
        self.trees.iter().zip(self.tree_groups.iter()).map(|(t, &g)| (t, g))
    }

    /// Validate group assignments, base score and every tree.
    pub fn validate(&self, n_features: usize) -> Result<(), ForestValidationError> {
        if self.n_groups == 0 {
            return Err(ForestValidationError::NoGroups);
        }
        if self.base_score.len() != self.n_groups as usize {
            return Err(ForestValidationError::BaseScoreLenMismatch {
                n_groups: self.n_groups,
                len: self.base_score.len(),
            });
        }
        if self.base_score.iter().any(|v| !v.is_finite()) {
            return Err(ForestValidationError::NonFiniteBaseScore);
        }
        if self.tree_groups.len() != self.trees.len() {
            return Err(ForestValidationError::TreeGroupsLenMismatch {
                n_trees: self.trees.len(),
                len: self.tree_groups.len(),
            });
        }
        for (tree_idx, &group) in self.tree_groups.iter().enumerate() {
            if group >= self.n_groups {
                return Err(ForestValidationError::TreeGroupOutOfRange {
                    tree_idx,
                    group,
                    n_groups: self.n_groups,
                });
            }
        }
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features)
                .map_err(|error| ForestValidationError::InvalidTree { tree_idx, error })?;
        }
        Ok(())
    }

    /// Margins for a single row.
    pub fn predict_row(&self, features: &[f32]) -> Vec<f32> {
        let mut output = self.base_score.clone();
        for (tree, group) in self.trees_with_groups() {
            output[group as usize] += tree.predict_row(features);
        }
        output
    }

    /// Margins for a row-major `[n_rows, n_features]` matrix.
    ///
    /// Returns `[n_rows, n_groups]`. Rows are processed in blocks of
    /// [`DEFAULT_BLOCK_SIZE`], in parallel when allowed. The result does not
    /// depend on the parallelism mode.
    pub fn predict(&self, features: ArrayView2<'_, f32>, parallelism: Parallelism) -> Array2<f32> {
        let n_rows = features.nrows();
        let n_groups = self.n_groups as usize;
        let mut output = Array2::<f32>::zeros((n_rows, n_groups));

        // A freshly allocated array is contiguous.
        if let Some(buffer) = output.as_slice_mut() {
            parallelism.maybe_par_chunks_mut(buffer, DEFAULT_BLOCK_SIZE * n_groups, |block, out| {
                let start = block * DEFAULT_BLOCK_SIZE;
                for (offset, margins) in out.chunks_mut(n_groups).enumerate() {
                    margins.copy_from_slice(&self.base_score);
                    let row = features.row(start + offset);
                    let owned;
                    let values: &[f32] = match row.as_slice() {
                        Some(values) => values,
                        None => {
                            owned = row.to_vec();
                            &owned
                        }
                    };
                    for (tree, group) in self.trees_with_groups() {
                        margins[group as usize] += tree.predict_row(values);
                    }
                }
            });
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tree::MutableTree;
    use ndarray::Array2;

    fn stump(threshold: f32, left: f32, right: f32) -> Tree {
        let mut tree = MutableTree::with_root();
        let (l, r) = tree.split(0, 0, threshold, true);
        tree.set_leaf_value(l, left);
        tree.set_leaf_value(r, right);
        tree.freeze()
    }

    #[test]
    fn trees_sum_with_base_score() {
        let mut forest = Forest::new(1).with_base_score(vec![0.5]);
        forest.push_tree(stump(0.5, 1.0, 2.0), 0);
        forest.push_tree(stump(0.5, 0.5, 1.5), 0);
        assert_eq!(forest.predict_row(&[0.3]), vec![2.0]);
        assert_eq!(forest.predict_row(&[0.7]), vec![4.0]);
        assert_eq!(forest.predict_row(&[f32::NAN]), vec![2.0]);
    }

    #[test]
    fn groups_accumulate_separately() {
        let mut forest = Forest::new(2);
        forest.push_tree(stump(0.5, 1.0, 2.0), 0);
        forest.push_tree(stump(0.5, -1.0, -2.0), 1);
        assert_eq!(forest.predict_row(&[0.0]), vec![1.0, -1.0]);
    }

    #[test]
    fn batch_matches_single_row_in_both_modes() {
        let mut forest = Forest::new(2).with_base_score(vec![0.1, -0.1]);
        forest.push_tree(stump(50.0, 1.0, 2.0), 0);
        forest.push_tree(stump(120.0, -1.0, -2.0), 1);

        let n_rows = 200;
        let features = Array2::from_shape_fn((n_rows, 1), |(i, _)| i as f32);
        let seq = forest.predict(features.view(), Parallelism::Sequential);
        let par = forest.predict(features.view(), Parallelism::Parallel);
        assert_eq!(seq, par);
        assert_eq!(seq.dim(), (n_rows, 2));
        for i in [0, 63, 64, 130, 199] {
            assert_eq!(seq.row(i).to_vec(), forest.predict_row(&[i as f32]));
        }
    }

    #[test]
    fn validation() {
        let mut forest = Forest::new(1);
        forest.push_tree(stump(0.5, 1.0, 2.0), 0);
        assert_eq!(forest.validate(1), Ok(()));
        assert!(matches!(forest.validate(0), Err(ForestValidationError::InvalidTree { tree_idx: 0, .. })));

        let bad = Forest::from_parts(vec![stump(0.5, 1.0, 2.0)], vec![3], 2, vec![0.0, 0.0]);
        assert!(matches!(bad.validate(1), Err(ForestValidationError::TreeGroupOutOfRange { group: 3, .. })));

        let bad = Forest::from_parts(vec![], vec![], 2, vec![0.0]);
        assert!(matches!(bad.validate(1), Err(ForestValidationError::BaseScoreLenMismatch { .. })));
    }

    #[test]
    fn empty_input_gives_empty_margins() {
        let forest = Forest::new(3);
        let features = Array2::<f32>::zeros((0, 4));
        assert_eq!(forest.predict(features.view(), Parallelism::Parallel).dim(), (0, 3));
    }
}
