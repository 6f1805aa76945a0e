//! Decision tree storage (SoA) and the mutable builder used during training.

use thiserror::Error;

/// Index of a node within one tree (0 = root).
pub type NodeId = u32;

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,

    #[error("node arrays have inconsistent lengths")]
    LenMismatch,

    #[error("node {node}: {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },

    #[error("node {node} was reached more than once")]
    DuplicateVisit { node: NodeId },

    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },

    #[error("node {node} splits on feature {feature}, but only {n_features} features exist")]
    FeatureOutOfBounds {
        node: NodeId,
        feature: u32,
        n_features: usize,
    },

    #[error("node {node} holds a non-finite value")]
    NonFinite { node: NodeId },
}

// ============================================================================
// Tree
// ============================================================================

/// Threshold of a split that separates missing from observed values only.
pub const ALL_OBSERVED_LEFT: f32 = f32::INFINITY;

/// Routing of a non-missing value at a split.
#[inline]
pub fn goes_left(value: f32, threshold: f32) -> bool {
    value < threshold || threshold == ALL_OBSERVED_LEFT
}

/// Structure-of-Arrays tree storage.
///
/// Numeric splits only: a sample goes left when `value < threshold`, and
/// missing values follow `default_left`. A threshold of
/// [`ALL_OBSERVED_LEFT`] sends every non-missing value left, `+inf` included.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    split_indices: Box<[u32]>,
    split_thresholds: Box<[f32]>,
    left_children: Box<[u32]>,
    right_children: Box<[u32]>,
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f32]>,
}

impl Tree {
    /// Create a tree from parallel arrays.
    ///
    /// Call [`Tree::validate`] before traversing a tree from untrusted input.
    pub fn new(
        split_indices: Vec<u32>,
        split_thresholds: Vec<f32>,
        left_children: Vec<u32>,
        right_children: Vec<u32>,
        default_left: Vec<bool>,
        is_leaf: Vec<bool>,
        leaf_values: Vec<f32>,
    ) -> Self {
        Self {
            split_indices: split_indices.into_boxed_slice(),
            split_thresholds: split_thresholds.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            default_left: default_left.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_values: leaf_values.into_boxed_slice(),
        }
    }

    /// A single-leaf tree.
    pub fn constant(value: f32) -> Self {
        Self::new(vec![0], vec![0.0], vec![0], vec![0], vec![false], vec![true], vec![value])
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&leaf| leaf).count()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    pub fn split_indices(&self) -> &[u32] {
        &self.split_indices
    }

    pub fn split_thresholds(&self) -> &[f32] {
        &self.split_thresholds
    }

    pub fn left_children(&self) -> &[u32] {
        &self.left_children
    }

    pub fn right_children(&self) -> &[u32] {
        &self.right_children
    }

    pub fn default_left(&self) -> &[bool] {
        &self.default_left
    }

    pub fn leaf_flags(&self) -> &[bool] {
        &self.is_leaf
    }

    pub fn leaf_values(&self) -> &[f32] {
        &self.leaf_values
    }

    /// Walk from the root to the leaf reached by `row`.
    #[inline]
    pub fn traverse_to_leaf(&self, row: &[f32]) -> NodeId {
        let mut node = 0u32;
        while !self.is_leaf(node) {
            let idx = node as usize;
            let value = row[self.split_indices[idx] as usize];
            let go_left = if value.is_nan() {
                self.default_left[idx]
            } else {
                goes_left(value, self.split_thresholds[idx])
            };
            node = if go_left {
                self.left_children[idx]
            } else {
                self.right_children[idx]
            };
        }
        node
    }

    /// Leaf value reached by `row`.
    #[inline]
    pub fn predict_row(&self, row: &[f32]) -> f32 {
        self.leaf_values[self.traverse_to_leaf(row) as usize]
    }

    /// Depth of the deepest leaf (root-only tree = 0).
    pub fn max_depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0u32, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if self.is_leaf(node) {
                max_depth = max_depth.max(depth);
            } else {
                stack.push((self.left_children[node as usize], depth + 1));
                stack.push((self.right_children[node as usize], depth + 1));
            }
        }
        max_depth
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check that the tree is a proper binary tree over `n_features` inputs.
    ///
    /// Every node must be reachable from the root exactly once, children must
    /// be in bounds, split features must exist, and leaf values and used
    /// thresholds must be finite.
    pub fn validate(&self, n_features: usize) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }
        let lens = [
            self.split_indices.len(),
            self.split_thresholds.len(),
            self.left_children.len(),
            self.right_children.len(),
            self.default_left.len(),
            self.leaf_values.len(),
        ];
        if lens.iter().any(|&len| len != n_nodes) {
            return Err(TreeValidationError::LenMismatch);
        }

        let mut visited = vec![false; n_nodes];
        let mut stack: Vec<NodeId> = vec![0];

        while let Some(node) = stack.pop() {
            let idx = node as usize;
            if visited[idx] {
                return Err(TreeValidationError::DuplicateVisit { node });
            }
            visited[idx] = true;

            if self.is_leaf[idx] {
                if !self.leaf_values[idx].is_finite() {
                    return Err(TreeValidationError::NonFinite { node });
                }
                continue;
            }

            let feature = self.split_indices[idx];
            if feature as usize >= n_features {
                return Err(TreeValidationError::FeatureOutOfBounds {
                    node,
                    feature,
                    n_features,
                });
            }
            if self.split_thresholds[idx].is_nan() {
                return Err(TreeValidationError::NonFinite { node });
            }

            for (side, child) in [("left", self.left_children[idx]), ("right", self.right_children[idx])] {
                if child as usize >= n_nodes {
                    return Err(TreeValidationError::ChildOutOfBounds {
                        node,
                        side,
                        child,
                        n_nodes,
                    });
                }
                stack.push(child);
            }
        }

        match visited.iter().position(|&seen| !seen) {
            Some(node) => Err(TreeValidationError::UnreachableNode { node: node as NodeId }),
            None => Ok(()),
        }
    }
}

// ============================================================================
// MutableTree
// ============================================================================

/// Growable tree used while training.
///
/// Nodes start as leaves; [`MutableTree::split`] turns a leaf into a split
/// node and appends its two children.
#[derive(Debug, Clone, Default)]
pub struct MutableTree {
    split_indices: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<u32>,
    right_children: Vec<u32>,
    default_left: Vec<bool>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
}

impl MutableTree {
    /// A tree holding only its root leaf.
    pub fn with_root() -> Self {
        let mut tree = Self::default();
        tree.push_leaf();
        tree
    }

    fn push_leaf(&mut self) -> NodeId {
        let id = self.is_leaf.len() as NodeId;
        self.split_indices.push(0);
        self.split_thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.default_left.push(false);
        self.is_leaf.push(true);
        self.leaf_values.push(0.0);
        id
    }

    /// Split leaf `node`, returning `(left, right)` child ids.
    pub fn split(
        &mut self,
        node: NodeId,
        feature: u32,
        threshold: f32,
        default_left: bool,
    ) -> (NodeId, NodeId) {
        let left = self.push_leaf();
        let right = self.push_leaf();
        let idx = node as usize;
        self.split_indices[idx] = feature;
        self.split_thresholds[idx] = threshold;
        self.left_children[idx] = left;
        self.right_children[idx] = right;
        self.default_left[idx] = default_left;
        self.is_leaf[idx] = false;
        (left, right)
    }

    pub fn set_leaf_value(&mut self, node: NodeId, value: f32) {
        self.leaf_values[node as usize] = value;
    }

    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    pub fn freeze(self) -> Tree {
        Tree::new(
            self.split_indices,
            self.split_thresholds,
            self.left_children,
            self.right_children,
            self.default_left,
            self.is_leaf,
            self.leaf_values,
        )
    }
}
