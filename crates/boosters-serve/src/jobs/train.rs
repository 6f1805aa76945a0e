//! Training job: fit the classification pipeline and store the artifact.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use super::JobError;
use super::features::MULTISIM_TARGET;
use super::split::stratified_split;
use crate::artifact::{ArtifactMetadata, ArtifactStore};
use crate::config::DEFAULT_ARTIFACT_PATH;
use crate::pipeline::metrics::{accuracy, argmax_rows, log_loss};
use crate::pipeline::{ClassificationPipeline, FitError, Label, PipelineConfig, encode_target};
use crate::table::TabularTable;
use crate::table::io::parquet::{ParquetReadOptions, load_parquet_file};

#[derive(Debug, Clone)]
pub struct TrainJobConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub target: String,
    /// Fraction of rows held out for evaluation.
    pub test_size: f64,
    /// Seed of the train/test split.
    pub seed: u64,
    pub pipeline: PipelineConfig,
}

impl Default for TrainJobConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/processed/multisim_dataset_fe3.parquet"),
            output: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            target: MULTISIM_TARGET.to_string(),
            test_size: 0.2,
            seed: 42,
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Evaluation summary on the held-out rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    pub n_train: usize,
    pub n_test: usize,
    pub classes: Vec<Label>,
    pub n_trees: usize,
    /// `None` when the test partition is empty.
    pub accuracy: Option<f64>,
    pub log_loss: Option<f64>,
}

/// Fit on the train partition of `table` and evaluate on the test partition.
pub fn fit_and_evaluate(
    table: &TabularTable,
    config: &TrainJobConfig,
) -> Result<(ClassificationPipeline, TrainReport), JobError> {
    if !(0.0..1.0).contains(&config.test_size) {
        return Err(JobError::InvalidConfig(format!(
            "test_size must be in [0, 1), got {}",
            config.test_size
        )));
    }

    let target = table
        .column(&config.target)
        .ok_or_else(|| JobError::MissingColumn(vec![config.target.clone()]))?;
    let (labels, targets) = encode_target(target)?;
    let (train_rows, test_rows) = stratified_split(&targets, config.test_size, config.seed);
    tracing::info!(
        n_train = train_rows.len(),
        n_test = test_rows.len(),
        n_classes = labels.len(),
        "split training data"
    );

    let pipeline = ClassificationPipeline::fit(&table.take_rows(&train_rows), &config.target, &config.pipeline)?;

    let (accuracy, log_loss) = if test_rows.is_empty() {
        (None, None)
    } else {
        let probabilities = pipeline
            .predict_proba(&table.take_rows(&test_rows))
            .map_err(FitError::from)?;
        let truth: Vec<u32> = test_rows
            .iter()
            .map(|&row| {
                let label = &labels[targets[row] as usize];
                pipeline.classes().binary_search(label).map_or(u32::MAX, |idx| idx as u32)
            })
            .collect();
        let predicted = argmax_rows(probabilities.view());
        (
            Some(accuracy(&truth, &predicted)),
            Some(log_loss(probabilities.view(), &truth)),
        )
    };

    let report = TrainReport {
        n_train: train_rows.len(),
        n_test: test_rows.len(),
        classes: pipeline.classes().to_vec(),
        n_trees: pipeline.forest().n_trees(),
        accuracy,
        log_loss,
    };
    tracing::info!(accuracy = ?report.accuracy, log_loss = ?report.log_loss, "evaluated on test partition");
    Ok((pipeline, report))
}

/// Read the feature table, train, evaluate and save the artifact.
pub fn run(config: &TrainJobConfig) -> Result<TrainReport, JobError> {
    let start = Instant::now();
    tracing::info!(input = %config.input.display(), "loading feature table");
    let table = load_parquet_file(&config.input, &ParquetReadOptions::default())?;

    let (pipeline, report) = fit_and_evaluate(&table, config)?;

    let mut metadata = ArtifactMetadata::new()
        .with_attribute("target", &config.target)
        .with_attribute("n_train", report.n_train)
        .with_attribute("n_test", report.n_test);
    if let (Some(acc), Some(loss)) = (report.accuracy, report.log_loss) {
        metadata = metadata.with_attribute("accuracy", acc).with_attribute("log_loss", loss);
    }
    ArtifactStore::default().write(&config.output, &pipeline, &metadata)?;

    tracing::info!(
        output = %config.output.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "training job finished"
    );
    Ok(report)
}
