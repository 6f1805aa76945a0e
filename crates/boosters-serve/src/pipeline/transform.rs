//! Column preprocessing: numeric passthrough plus categorical target encoding.
//!
//! Model features are laid out in contract order. A numeric feature occupies
//! one model column; a categorical feature occupies
//! [`TargetEncoder::n_outputs`] columns.

use ndarray::Array2;

use super::PredictError;
use super::encoder::TargetEncoder;
use crate::schema::{FeatureContract, FeatureKind};
use crate::table::{ColumnData, TabularTable};
use crate::utils::Parallelism;

/// Fitted preprocessing step.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTransform {
    contract: FeatureContract,
    encoder: TargetEncoder,
}

impl ColumnTransform {
    /// Assemble from a contract and an encoder fitted on its categorical features.
    pub fn new(contract: FeatureContract, encoder: TargetEncoder) -> Self {
        Self { contract, encoder }
    }

    /// Fit the encoder and return the training feature matrix.
    ///
    /// Categorical features use ordered statistics, see [`TargetEncoder::fit_transform`].
    pub fn fit_transform(
        table: &TabularTable,
        contract: FeatureContract,
        targets: &[u32],
        n_classes: usize,
        prior_weight: f32,
    ) -> Result<(Self, Array2<f32>), PredictError> {
        let columns = resolve_columns(table, &contract)?;
        let categorical: Vec<&ColumnData> = contract
            .features()
            .iter()
            .zip(&columns)
            .filter(|(spec, _)| spec.kind.is_categorical())
            .map(|(_, column)| *column)
            .collect();

        let (encoder, encoded) =
            TargetEncoder::fit_transform(&categorical, targets, n_classes, prior_weight);

        let mut model_columns = Vec::new();
        let mut encoded_iter = encoded.into_iter();
        for (spec, column) in contract.features().iter().zip(&columns) {
            match spec.kind {
                FeatureKind::Numeric => model_columns.push(numeric_column(&spec.name, column)?),
                FeatureKind::Categorical => {
                    if let Some(outputs) = encoded_iter.next() {
                        model_columns.extend(outputs);
                    }
                }
            }
        }

        let features = assemble(table.n_rows(), &model_columns);
        Ok((Self { contract, encoder }, features))
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    pub fn encoder(&self) -> &TargetEncoder {
        &self.encoder
    }

    /// Number of model feature columns produced.
    pub fn n_model_features(&self) -> usize {
        let n_outputs = self.encoder.n_outputs();
        self.contract
            .features()
            .iter()
            .map(|spec| match spec.kind {
                FeatureKind::Numeric => 1,
                FeatureKind::Categorical => n_outputs,
            })
            .sum()
    }

    /// Model feature names: numeric names unchanged, categorical outputs
    /// suffixed with their output index when there are several.
    pub fn model_feature_names(&self) -> Vec<String> {
        let n_outputs = self.encoder.n_outputs();
        let mut names = Vec::with_capacity(self.n_model_features());
        for spec in self.contract.features() {
            match spec.kind {
                FeatureKind::Numeric => names.push(spec.name.clone()),
                FeatureKind::Categorical if n_outputs == 1 => names.push(spec.name.clone()),
                FeatureKind::Categorical => {
                    names.extend((0..n_outputs).map(|o| format!("{}__{o}", spec.name)))
                }
            }
        }
        names
    }

    /// Build the `[n_rows, n_model_features]` matrix for inference.
    pub fn transform(&self, table: &TabularTable, parallelism: Parallelism) -> Result<Array2<f32>, PredictError> {
        let columns = resolve_columns(table, &self.contract)?;

        let mut categorical_idx = 0usize;
        let jobs: Vec<(usize, Option<usize>, &ColumnData)> = self
            .contract
            .features()
            .iter()
            .zip(columns)
            .enumerate()
            .map(|(i, (spec, column))| {
                let cat = spec.kind.is_categorical().then(|| {
                    categorical_idx += 1;
                    categorical_idx - 1
                });
                (i, cat, column)
            })
            .collect();

        let per_feature = parallelism.maybe_par_map(jobs, |(i, cat, column)| match cat {
            None => numeric_column(&self.contract.features()[i].name, column).map(|c| vec![c]),
            Some(cat) => Ok(self.encoder.encode_column(cat, column)),
        });

        let mut model_columns = Vec::with_capacity(self.n_model_features());
        for columns in per_feature {
            model_columns.extend(columns?);
        }
        Ok(assemble(table.n_rows(), &model_columns))
    }
}

fn resolve_columns<'a>(
    table: &'a TabularTable,
    contract: &FeatureContract,
) -> Result<Vec<&'a ColumnData>, PredictError> {
    contract
        .features()
        .iter()
        .map(|spec| {
            table
                .column(&spec.name)
                .map(|c| c.data())
                .ok_or_else(|| PredictError::MissingColumn(spec.name.clone()))
        })
        .collect()
}

fn numeric_column(name: &str, column: &ColumnData) -> Result<Vec<f32>, PredictError> {
    match column {
        ColumnData::Numeric(values) => Ok(values.clone()),
        ColumnData::Text(_) => (0..column.len())
            .map(|row| {
                column.numeric_at(row).map_err(|source| PredictError::NotNumeric {
                    column: name.to_string(),
                    source,
                })
            })
            .collect(),
    }
}

fn assemble(n_rows: usize, columns: &[Vec<f32>]) -> Array2<f32> {
    Array2::from_shape_fn((n_rows, columns.len()), |(row, col)| columns[col][row])
}
