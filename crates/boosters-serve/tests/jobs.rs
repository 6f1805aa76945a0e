//! Offline jobs from raw Parquet to a servable artifact.

use boosters_serve::artifact::ArtifactStore;
use boosters_serve::jobs::{self, FeatureJobConfig, JobError, TrainJobConfig};
use boosters_serve::table::io::parquet::{ParquetReadOptions, load_parquet_file, save_parquet_file};
use boosters_serve::testing::{self, TARGET};
use boosters_serve::{Column, ColumnData, TabularTable};

/// Synthetic raw data with `age` stored as text, one unparsable value,
/// one outlier and an extra column the feature job must drop.
fn raw_table(n_rows: usize) -> TabularTable {
    let table = testing::synthetic_multisim(n_rows, 21);
    let mut columns = Vec::new();
    for column in table.into_columns() {
        if column.name() == "age" {
            let ColumnData::Numeric(values) = column.data() else {
                unreachable!("synthetic age is numeric");
            };
            let text: Vec<Option<String>> = values
                .iter()
                .enumerate()
                .map(|(row, v)| match row {
                    0 => Some("abc".to_string()),
                    1 => Some("130".to_string()),
                    _ if v.is_nan() => None,
                    _ => Some(v.to_string()),
                })
                .collect();
            columns.push(Column::new("age", ColumnData::Text(text)));
        } else {
            columns.push(column);
        }
    }
    columns.push(Column::numeric("subscriber_id", (0..n_rows).map(|i| i as f32).collect()));
    TabularTable::new(columns).unwrap()
}

#[test]
fn feature_job_then_training_job() {
    let dir = tempfile::tempdir().unwrap();
    let raw_path = dir.path().join("raw/multisim_dataset.parquet");
    let features_path = dir.path().join("processed/features.parquet");
    let artifact_path = dir.path().join("models/multisim_gbdt.bsrv");
    save_parquet_file(&raw_table(400), &raw_path).unwrap();

    let features = jobs::features::run(&FeatureJobConfig {
        input: raw_path,
        output: features_path.clone(),
        max_rows: Some(300),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(features.n_rows(), 300);
    assert!(!features.contains("subscriber_id"));

    let written = load_parquet_file(&features_path, &ParquetReadOptions::default()).unwrap();
    let ColumnData::Numeric(age) = written.column("age").unwrap().data() else {
        panic!("age should be numeric after the feature job");
    };
    assert!(age[0].is_nan(), "unparsable age becomes missing");
    assert!(age[1].is_nan(), "age above 100 becomes missing");
    assert!(age.iter().all(|a| a.is_nan() || *a <= 100.0));

    let report = jobs::train::run(&TrainJobConfig {
        input: features_path,
        output: artifact_path.clone(),
        pipeline: testing::small_config(),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(report.n_train + report.n_test, 300);
    assert!(report.accuracy.unwrap() > 0.7, "{report:?}");

    let loaded = ArtifactStore::default().load(&artifact_path).unwrap();
    assert_eq!(loaded.metadata.attribute("target"), Some(TARGET));
    assert_eq!(loaded.metadata.attribute("n_test"), Some(report.n_test.to_string().as_str()));
    assert!(
        !loaded
            .pipeline
            .transform()
            .contract()
            .names()
            .any(|name| name == TARGET)
    );
}

#[test]
fn feature_job_requires_configured_columns() {
    let dir = tempfile::tempdir().unwrap();
    let raw_path = dir.path().join("raw.parquet");
    let table = raw_table(20).split_column("region").0;
    save_parquet_file(&table, &raw_path).unwrap();

    let err = jobs::features::run(&FeatureJobConfig {
        input: raw_path,
        output: dir.path().join("out.parquet"),
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(&err, JobError::MissingColumn(missing) if missing == &vec!["region".to_string()]));
    assert!(!dir.path().join("out.parquet").exists());
}

#[test]
fn training_job_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let err = jobs::train::run(&TrainJobConfig {
        input: dir.path().join("absent.parquet"),
        output: dir.path().join("model.bsrv"),
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, JobError::Load(_)));
}
