//! Prediction pipeline: column preprocessing followed by a boosted forest.
//!
//! The service only sees the [`Predictor`] trait. [`ClassificationPipeline`]
//! is the concrete implementation produced by the training job and stored
//! in artifacts.
//!
//! # Pipeline stages
//!
//! 1. [`ColumnTransform`]: numeric features pass through, categorical
//!    features are target-encoded ([`TargetEncoder`]).
//! 2. [`Forest`]: gradient boosted trees trained by [`GBDTTrainer`] on
//!    quantized features.
//! 3. Objective transform: sigmoid (two classes) or softmax (more), then
//!    argmax over class probabilities.

pub mod binning;
pub mod config;
pub mod encoder;
pub mod forest;
pub mod metrics;
pub mod objective;
pub mod trainer;
pub mod transform;
pub mod tree;

use std::collections::BTreeSet;
use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{FeatureContract, FeatureSpec};
use crate::table::{Column, ColumnData, NotNumeric, TabularTable};
use crate::utils::{Parallelism, run_with_threads};

pub use config::{ConfigError, PipelineConfig, RegularizationParams, SamplingParams, TreeParams};
pub use encoder::TargetEncoder;
pub use forest::{Forest, ForestValidationError};
pub use objective::{LogisticLoss, ObjectiveFn, SoftmaxLoss, objective_for};
pub use trainer::{GBDTParams, GBDTTrainer, GainParams};
pub use transform::ColumnTransform;
pub use tree::{Tree, TreeValidationError};

// =============================================================================
// Labels
// =============================================================================

/// A class label as it appears in the target column.
///
/// Serialized untagged, so JSON shows plain numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(v) => write!(f, "{v}"),
            Label::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Label::Int(value)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::Text(value.to_string())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failures while applying a fitted pipeline to a table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error("input is missing feature column `{0}`")]
    MissingColumn(String),

    #[error("feature column `{column}` is not numeric")]
    NotNumeric {
        column: String,
        #[source]
        source: NotNumeric,
    },

    #[error("prediction for row {row} is not finite")]
    NonFinite { row: usize },
}

/// Failures while fitting a pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("target column `{0}` not found")]
    MissingTarget(String),

    #[error("target value missing at row {row}")]
    MissingTargetValue { row: usize },

    #[error("target value {value} at row {row} is not a class label")]
    InvalidTargetValue { row: usize, value: f32 },

    #[error("training data has no rows")]
    EmptyTrainingSet,

    #[error("target has {0} distinct class(es), need at least 2")]
    TooFewClasses(usize),

    #[error(transparent)]
    Transform(#[from] PredictError),
}

/// Internal inconsistencies of a pipeline assembled from stored parts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineValidationError {
    #[error("pipeline needs at least 2 classes, has {0}")]
    TooFewClasses(usize),

    #[error("class labels are not unique and sorted")]
    UnorderedClasses,

    #[error("{n_classes} classes need {expected} forest groups, found {found}")]
    GroupCount {
        n_classes: usize,
        expected: u32,
        found: u32,
    },

    #[error("encoder has {found} feature tables for {expected} categorical features")]
    EncoderFeatures { expected: usize, found: usize },

    #[error("encoder has {found} outputs per feature, expected {expected}")]
    EncoderOutputs { expected: usize, found: usize },

    #[error("category `{category}` has {found} statistics, expected {expected}")]
    CategoryStats {
        category: String,
        expected: usize,
        found: usize,
    },

    #[error("contract lists feature `{0}` more than once")]
    DuplicateFeature(String),

    #[error(transparent)]
    Forest(#[from] ForestValidationError),
}

// =============================================================================
// Predictor
// =============================================================================

/// A fitted model that maps a validated table to one label per row.
///
/// Implementations are immutable and shared across requests.
pub trait Predictor: Send + Sync + fmt::Debug {
    /// Predict one label per input row, in input order.
    fn predict(&self, table: &TabularTable) -> Result<Vec<Label>, PredictError>;

    /// Input columns the predictor was fit against.
    fn contract(&self) -> &FeatureContract;
}

// =============================================================================
// ClassificationPipeline
// =============================================================================

/// Target-encoding preprocessor plus a boosted forest classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationPipeline {
    transform: ColumnTransform,
    forest: Forest,
    classes: Vec<Label>,
}

impl ClassificationPipeline {
    /// Fit on `table`, predicting `target_column` from every other column.
    ///
    /// Numeric columns become numeric features; text columns become
    /// categorical features.
    pub fn fit(table: &TabularTable, target_column: &str, config: &PipelineConfig) -> Result<Self, FitError> {
        let target = table
            .column(target_column)
            .ok_or_else(|| FitError::MissingTarget(target_column.to_string()))?;
        if table.n_rows() == 0 {
            return Err(FitError::EmptyTrainingSet);
        }

        let (classes, targets) = encode_target(target)?;
        if classes.len() < 2 {
            return Err(FitError::TooFewClasses(classes.len()));
        }

        let all = FeatureContract::from_table(table);
        let contract = FeatureContract::new(
            all.features()
                .iter()
                .filter(|f| f.name != target_column)
                .cloned()
                .collect::<Vec<FeatureSpec>>(),
        );

        tracing::info!(
            n_rows = table.n_rows(),
            n_features = contract.len(),
            n_categorical = contract.categorical().count(),
            n_classes = classes.len(),
            n_trees = config.n_trees,
            "fitting classification pipeline"
        );

        let n_classes = classes.len();
        let (transform, forest) = run_with_threads(config.thread_count(), |parallelism| {
            let (transform, features) = ColumnTransform::fit_transform(
                table,
                contract,
                &targets,
                n_classes,
                config.encoder_prior_weight,
            )?;
            let trainer = GBDTTrainer::new(objective_for(n_classes), GBDTParams::from(config));
            let forest = trainer.train(features.view(), &targets, parallelism);
            Ok::<_, FitError>((transform, forest))
        })?;

        tracing::info!(n_trees = forest.n_trees(), "pipeline fitted");
        Ok(Self {
            transform,
            forest,
            classes,
        })
    }

    /// Assemble a pipeline from stored parts and check their consistency.
    pub fn from_parts(
        transform: ColumnTransform,
        forest: Forest,
        classes: Vec<Label>,
    ) -> Result<Self, PipelineValidationError> {
        let pipeline = Self {
            transform,
            forest,
            classes,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Check internal consistency: class count vs forest groups, encoder
    /// tables vs categorical features, and tree structure vs feature width.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        let n_classes = self.classes.len();
        if n_classes < 2 {
            return Err(PipelineValidationError::TooFewClasses(n_classes));
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PipelineValidationError::UnorderedClasses);
        }

        let expected_groups = if n_classes == 2 { 1 } else { n_classes as u32 };
        if self.forest.n_groups() != expected_groups {
            return Err(PipelineValidationError::GroupCount {
                n_classes,
                expected: expected_groups,
                found: self.forest.n_groups(),
            });
        }

        let contract = self.transform.contract();
        let mut seen = BTreeSet::new();
        for name in contract.names() {
            if !seen.insert(name) {
                return Err(PipelineValidationError::DuplicateFeature(name.to_string()));
            }
        }

        let encoder = self.transform.encoder();
        let n_categorical = contract.categorical().count();
        if encoder.n_features() != n_categorical {
            return Err(PipelineValidationError::EncoderFeatures {
                expected: n_categorical,
                found: encoder.n_features(),
            });
        }
        let expected_outputs = encoder::outputs_for_classes(n_classes);
        if encoder.n_outputs() != expected_outputs {
            return Err(PipelineValidationError::EncoderOutputs {
                expected: expected_outputs,
                found: encoder.n_outputs(),
            });
        }
        for feature in encoder.features() {
            for (category, stats) in feature.categories() {
                if stats.sums.len() != expected_outputs {
                    return Err(PipelineValidationError::CategoryStats {
                        category: category.clone(),
                        expected: expected_outputs,
                        found: stats.sums.len(),
                    });
                }
            }
        }

        self.forest.validate(self.transform.n_model_features())?;
        Ok(())
    }

    pub fn transform(&self) -> &ColumnTransform {
        &self.transform
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// Class labels in model output order.
    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class probabilities, shape `[n_rows, n_classes]`.
    pub fn predict_proba(&self, table: &TabularTable) -> Result<Array2<f32>, PredictError> {
        let parallelism = Parallelism::from_threads(0);
        let features = self.transform.transform(table, parallelism)?;
        let margins = self.forest.predict(features.view(), parallelism);
        let probabilities = objective_for(self.n_classes()).class_probabilities(margins.view());

        if let Some((row, _)) = probabilities
            .rows()
            .into_iter()
            .enumerate()
            .find(|(_, row)| row.iter().any(|p| !p.is_finite()))
        {
            return Err(PredictError::NonFinite { row });
        }
        Ok(probabilities)
    }

    /// Predicted class index per row.
    pub fn predict_indices(&self, table: &TabularTable) -> Result<Vec<u32>, PredictError> {
        let probabilities = self.predict_proba(table)?;
        Ok(metrics::argmax_rows(probabilities.view()))
    }
}

impl Predictor for ClassificationPipeline {
    fn predict(&self, table: &TabularTable) -> Result<Vec<Label>, PredictError> {
        let indices = self.predict_indices(table)?;
        Ok(indices
            .into_iter()
            .map(|idx| self.classes[idx as usize].clone())
            .collect())
    }

    fn contract(&self) -> &FeatureContract {
        self.transform.contract()
    }
}

// =============================================================================
// Target encoding
// =============================================================================

/// Map a target column to sorted class labels and per-row class indices.
///
/// Numeric targets must hold integral values; text targets are used as-is
/// after trimming.
pub fn encode_target(column: &Column) -> Result<(Vec<Label>, Vec<u32>), FitError> {
    let labels: Vec<Label> = match column.data() {
        ColumnData::Numeric(values) => values
            .iter()
            .enumerate()
            .map(|(row, &value)| {
                if value.is_nan() {
                    Err(FitError::MissingTargetValue { row })
                } else if value.fract() != 0.0 || !value.is_finite() {
                    Err(FitError::InvalidTargetValue { row, value })
                } else {
                    Ok(Label::Int(value as i64))
                }
            })
            .collect::<Result<_, _>>()?,
        ColumnData::Text(values) => values
            .iter()
            .enumerate()
            .map(|(row, value)| match value.as_deref().map(str::trim) {
                None | Some("") => Err(FitError::MissingTargetValue { row }),
                Some(text) => Ok(Label::Text(text.to_string())),
            })
            .collect::<Result<_, _>>()?,
    };

    let classes: Vec<Label> = labels.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
    let indices = labels
        .iter()
        .map(|label| classes.binary_search(label).map_or(0, |idx| idx as u32))
        .collect();
    Ok((classes, indices))
}
