//! Feature job: raw multi-SIM Parquet to a cleaned feature table.
//!
//! Steps, in order:
//!
//! 1. keep only the configured columns (projected at read time),
//! 2. keep the first `max_rows` rows,
//! 3. coerce the configured numeric columns, unparsable values become missing,
//! 4. apply the outlier rule (`age > 100` becomes missing by default).

use std::path::PathBuf;
use std::time::Instant;

use super::JobError;
use crate::table::io::parquet::{ParquetReadOptions, load_parquet_file, save_parquet_file};
use crate::table::{Column, ColumnData, TabularTable, parse_number};

/// Input columns of the multi-SIM subscriber dataset, in file order.
pub const MULTISIM_FEATURES: [&str; 13] = [
    "trf",
    "age",
    "gndr",
    "tenure",
    "age_dev",
    "dev_man",
    "device_os_name",
    "dev_num",
    "is_dualsim",
    "is_featurephone",
    "is_smartphone",
    "simcard_type",
    "region",
];

/// Label column of the multi-SIM dataset.
pub const MULTISIM_TARGET: &str = "target";

/// Values strictly above `max` in `column` are set to missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRule {
    pub column: String,
    pub max: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureJobConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Columns kept from the raw file, in output order.
    pub columns: Vec<String>,
    /// Row cap. `None` keeps everything.
    pub max_rows: Option<usize>,
    /// Columns coerced to numbers.
    pub numeric_columns: Vec<String>,
    pub clip: Option<ClipRule>,
}

impl Default for FeatureJobConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/raw/multisim_dataset.parquet"),
            output: PathBuf::from("data/processed/multisim_dataset_fe3.parquet"),
            columns: MULTISIM_FEATURES
                .iter()
                .chain(std::iter::once(&MULTISIM_TARGET))
                .map(|c| c.to_string())
                .collect(),
            max_rows: Some(1_000_000),
            numeric_columns: ["age", "tenure", "age_dev", "dev_num"].map(String::from).to_vec(),
            clip: Some(ClipRule {
                column: "age".to_string(),
                max: 100.0,
            }),
        }
    }
}

/// Apply the cleaning steps to an in-memory table.
pub fn engineer_features(table: &TabularTable, config: &FeatureJobConfig) -> Result<TabularTable, JobError> {
    let missing: Vec<String> = config
        .columns
        .iter()
        .filter(|name| !table.contains(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(JobError::MissingColumn(missing));
    }
    if let Some(name) = config
        .numeric_columns
        .iter()
        .chain(config.clip.as_ref().map(|rule| &rule.column))
        .find(|name| !config.columns.contains(name))
    {
        return Err(JobError::InvalidConfig(format!(
            "column `{name}` is transformed but not selected"
        )));
    }

    let n_rows = config.max_rows.map_or(table.n_rows(), |max| max.min(table.n_rows()));
    let rows: Vec<usize> = (0..n_rows).collect();

    let mut columns = Vec::with_capacity(config.columns.len());
    let mut n_coerced = 0usize;
    let mut n_clipped = 0usize;

    for name in &config.columns {
        let Some(column) = table.column(name) else {
            continue;
        };
        let mut data = column.data().take(&rows);

        let clip = config.clip.as_ref().filter(|rule| &rule.column == name);
        if config.numeric_columns.contains(name) || clip.is_some() {
            let (values, coerced) = coerce_numeric(data);
            n_coerced += coerced;
            data = ColumnData::Numeric(values);
        }
        if let (Some(rule), ColumnData::Numeric(values)) = (clip, &mut data) {
            for value in values.iter_mut().filter(|v| **v > rule.max) {
                *value = f32::NAN;
                n_clipped += 1;
            }
        }
        columns.push(Column::new(name.clone(), data));
    }

    tracing::debug!(n_rows, n_coerced, n_clipped, "engineered features");
    Ok(TabularTable::new(columns)?)
}

/// Numeric view of a column plus the count of values that failed to parse.
fn coerce_numeric(data: ColumnData) -> (Vec<f32>, usize) {
    match data {
        ColumnData::Numeric(values) => (values, 0),
        ColumnData::Text(values) => {
            let mut failed = 0;
            let numbers = values
                .iter()
                .map(|value| match value.as_deref().map(parse_number) {
                    None => f32::NAN,
                    Some(Some(number)) => number,
                    Some(None) => {
                        failed += 1;
                        f32::NAN
                    }
                })
                .collect();
            (numbers, failed)
        }
    }
}

/// Read the raw file, clean it, and write the feature table.
pub fn run(config: &FeatureJobConfig) -> Result<TabularTable, JobError> {
    let start = Instant::now();
    tracing::info!(input = %config.input.display(), "reading raw data");

    let options = ParquetReadOptions {
        columns: Some(config.columns.clone()),
        limit: config.max_rows,
    };
    let raw = load_parquet_file(&config.input, &options)?;
    let features = engineer_features(&raw, config)?;
    save_parquet_file(&features, &config.output)?;

    tracing::info!(
        output = %config.output.display(),
        n_rows = features.n_rows(),
        n_columns = features.n_columns(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "feature table written"
    );
    Ok(features)
}
