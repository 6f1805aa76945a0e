//! Pipeline training configuration with builder pattern.
//!
//! [`PipelineConfig`] groups the boosting, tree, regularization and sampling
//! parameters. The builder is generated by `bon` and validates on `build()`.
//!
//! # Example
//!
//! ```
//! use boosters_serve::pipeline::{PipelineConfig, SamplingParams, TreeParams};
//!
//! // Defaults: 300 trees, depth 6, learning rate 0.1, 80% row/column sampling
//! let config = PipelineConfig::builder().build().unwrap();
//!
//! let config = PipelineConfig::builder()
//!     .n_trees(50)
//!     .tree(TreeParams { max_depth: 4, ..Default::default() })
//!     .sampling(SamplingParams { subsample: 1.0, colsample_bytree: 1.0 })
//!     .build()
//!     .unwrap();
//! assert_eq!(config.n_trees, 50);
//! ```

use std::num::NonZeroUsize;

use bon::Builder;
use thiserror::Error;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("learning_rate must be positive, got {0}")]
    InvalidLearningRate(f32),

    #[error("n_trees must be at least 1")]
    InvalidNTrees,

    #[error("max_depth must be in 1..=16, got {0}")]
    InvalidMaxDepth(u32),

    #[error("max_bins must be in 2..=255, got {0}")]
    InvalidMaxBins(u16),

    #[error("{field} must be in (0, 1], got {value}")]
    InvalidSamplingRatio { field: &'static str, value: f32 },

    #[error("{field} must be non-negative, got {value}")]
    InvalidRegularization { field: &'static str, value: f32 },
}

// =============================================================================
// Parameter groups
// =============================================================================

/// Tree structure parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    /// Maximum depth of each tree. Default: 6.
    pub max_depth: u32,
    /// Maximum number of histogram bins per feature. Default: 255.
    pub max_bins: u16,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 6,
            max_bins: 255,
        }
    }
}

/// Regularization parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularizationParams {
    /// L2 regularization on leaf weights. Default: 1.0.
    pub lambda: f32,
    /// Minimum sum of hessians required in a child. Default: 1.0.
    pub min_child_weight: f32,
    /// Minimum gain required to make a split. Default: 0.0.
    pub min_gain: f32,
}

impl Default for RegularizationParams {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            min_child_weight: 1.0,
            min_gain: 0.0,
        }
    }
}

/// Row and column subsampling rates.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Fraction of rows sampled per boosting round. Default: 0.8.
    pub subsample: f32,
    /// Fraction of features sampled per tree. Default: 0.8.
    pub colsample_bytree: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            subsample: 0.8,
            colsample_bytree: 0.8,
        }
    }
}

// =============================================================================
// PipelineConfig
// =============================================================================

/// Configuration for fitting a [`ClassificationPipeline`](super::ClassificationPipeline).
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct PipelineConfig {
    /// Number of boosting rounds. Default: 300.
    #[builder(default = 300)]
    pub n_trees: u32,

    /// Learning rate (shrinkage). Default: 0.1.
    #[builder(default = 0.1)]
    pub learning_rate: f32,

    #[builder(default)]
    pub tree: TreeParams,

    #[builder(default)]
    pub regularization: RegularizationParams,

    #[builder(default)]
    pub sampling: SamplingParams,

    /// Weight of the prior in the categorical target statistics. Default: 1.0.
    #[builder(default = 1.0)]
    pub encoder_prior_weight: f32,

    /// Number of threads. `None` uses all available cores.
    pub n_threads: Option<NonZeroUsize>,

    /// Random seed for row and column sampling. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,
}

impl<S: pipeline_config_builder::IsComplete> PipelineConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        if self.n_trees == 0 {
            return Err(ConfigError::InvalidNTrees);
        }
        if !(1..=16).contains(&self.tree.max_depth) {
            return Err(ConfigError::InvalidMaxDepth(self.tree.max_depth));
        }
        if !(2..=255).contains(&self.tree.max_bins) {
            return Err(ConfigError::InvalidMaxBins(self.tree.max_bins));
        }
        for (field, value) in [
            ("subsample", self.sampling.subsample),
            ("colsample_bytree", self.sampling.colsample_bytree),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidSamplingRatio { field, value });
            }
        }
        for (field, value) in [
            ("lambda", self.regularization.lambda),
            ("min_child_weight", self.regularization.min_child_weight),
            ("min_gain", self.regularization.min_gain),
            ("encoder_prior_weight", self.encoder_prior_weight),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::InvalidRegularization { field, value });
            }
        }
        Ok(())
    }

    /// Thread count with `0` meaning "auto".
    pub fn thread_count(&self) -> usize {
        self.n_threads.map_or(0, NonZeroUsize::get)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_training_job() {
        let config = PipelineConfig::default();
        assert_eq!(config.n_trees, 300);
        assert_eq!(config.tree.max_depth, 6);
        assert!((config.learning_rate - 0.1).abs() < 1e-6);
        assert!((config.sampling.subsample - 0.8).abs() < 1e-6);
        assert!((config.sampling.colsample_bytree - 0.8).abs() < 1e-6);
        assert_eq!(config.seed, 42);
        assert_eq!(config.thread_count(), 0);
    }

    #[test]
    fn invalid_learning_rate() {
        let result = PipelineConfig::builder().learning_rate(0.0).build();
        assert!(matches!(result, Err(ConfigError::InvalidLearningRate(_))));
        let result = PipelineConfig::builder().learning_rate(f32::NAN).build();
        assert!(matches!(result, Err(ConfigError::InvalidLearningRate(_))));
    }

    #[test]
    fn invalid_n_trees() {
        let result = PipelineConfig::builder().n_trees(0).build();
        assert_eq!(result.unwrap_err(), ConfigError::InvalidNTrees);
    }

    #[test]
    fn invalid_tree_params() {
        let result = PipelineConfig::builder()
            .tree(TreeParams { max_depth: 0, ..Default::default() })
            .build();
        assert_eq!(result.unwrap_err(), ConfigError::InvalidMaxDepth(0));

        let result = PipelineConfig::builder()
            .tree(TreeParams { max_bins: 1, ..Default::default() })
            .build();
        assert_eq!(result.unwrap_err(), ConfigError::InvalidMaxBins(1));
    }

    #[test]
    fn invalid_sampling() {
        let result = PipelineConfig::builder()
            .sampling(SamplingParams { subsample: 0.0, ..Default::default() })
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSamplingRatio { field: "subsample", .. })
        ));

        let result = PipelineConfig::builder()
            .sampling(SamplingParams { colsample_bytree: 1.5, ..Default::default() })
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSamplingRatio { field: "colsample_bytree", .. })
        ));
    }

    #[test]
    fn invalid_regularization() {
        let result = PipelineConfig::builder()
            .regularization(RegularizationParams { lambda: -1.0, ..Default::default() })
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRegularization { field: "lambda", .. })
        ));
    }

    #[test]
    fn threads_customization() {
        let config = PipelineConfig::builder()
            .n_threads(NonZeroUsize::new(4).unwrap())
            .build()
            .unwrap();
        assert_eq!(config.thread_count(), 4);
    }
}
