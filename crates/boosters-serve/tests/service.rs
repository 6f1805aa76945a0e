//! End-to-end request scenarios against a stored artifact.

use std::sync::Arc;

use proptest::prelude::*;
use rust_xlsxwriter::Workbook;

use boosters_serve::artifact::ArtifactStore;
use boosters_serve::table::io::parquet::write_parquet;
use boosters_serve::testing::{self, MULTISIM_FEATURES, TARGET};
use boosters_serve::{
    ColumnData, InferenceService, Label, Predictor, ServeConfig, ServeError, StatusClass, TabularTable, UploadedBlob,
};

const THREE_ROWS: &str = "\
trf,age,gndr,tenure,age_dev,dev_man,device_os_name,dev_num,is_dualsim,is_featurephone,is_smartphone,simcard_type,region
basic,25,m,12,300,samsung,android,1,1,0,1,nano,north
smart,61,f,120,1500,apple,ios,2,0,0,1,micro,south
family,,m,48,800,nokia,other,1,0,1,0,nano,
";

fn stored_service() -> (tempfile::TempDir, InferenceService) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServeConfig {
        artifact_path: dir.path().join("multisim_gbdt.bsrv"),
        ..Default::default()
    };
    ArtifactStore::save(&config.artifact_path, &testing::fitted_pipeline()).unwrap();
    let service = InferenceService::from_config(&config).unwrap();
    (dir, service)
}

fn features(n_rows: usize, seed: u64) -> TabularTable {
    testing::synthetic_multisim(n_rows, seed).split_column(TARGET).0
}

fn parquet_bytes(table: &TabularTable) -> Vec<u8> {
    let mut bytes = Vec::new();
    write_parquet(table, &mut bytes).unwrap();
    bytes
}

fn xlsx_bytes(table: &TabularTable) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, column) in table.columns().iter().enumerate() {
        let col = col as u16;
        sheet.write_string(0, col, column.name()).unwrap();
        for row in 0..column.len() {
            let cell = row as u32 + 1;
            match column.data() {
                ColumnData::Numeric(values) if !values[row].is_nan() => {
                    sheet.write_number(cell, col, f64::from(values[row])).unwrap();
                }
                ColumnData::Text(values) => {
                    if let Some(value) = &values[row] {
                        sheet.write_string(cell, col, value).unwrap();
                    }
                }
                ColumnData::Numeric(_) => {}
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

#[test]
fn three_row_csv_gets_three_labels() {
    let (_dir, service) = stored_service();
    let result = service.handle(UploadedBlob::new(THREE_ROWS, "batch.csv")).unwrap();
    assert_eq!(result.len(), 3);
    for label in result.labels() {
        assert!(matches!(label, Label::Int(0) | Label::Int(1)), "{label:?}");
    }
}

#[test]
fn zero_byte_csv_is_empty_input() {
    let (_dir, service) = stored_service();
    let err = service.handle(UploadedBlob::new(Vec::new(), "data.csv")).unwrap_err();
    assert!(matches!(err, ServeError::EmptyInput));
    assert_eq!(err.status(), StatusClass::BadInput);
}

#[test]
fn json_upload_is_unsupported() {
    let (_dir, service) = stored_service();
    let err = service.handle(UploadedBlob::new("[]", "data.json")).unwrap_err();
    assert!(matches!(err, ServeError::UnsupportedFormat { .. }));
    let message = err.to_string();
    for ext in ["csv", "parquet", "xlsx"] {
        assert!(message.contains(ext), "{message}");
    }
}

#[test]
fn missing_columns_are_named() {
    let (_dir, service) = stored_service();
    let table = features(5, 1).split_column("region").0.split_column("tenure").0;
    let err = service
        .handle(UploadedBlob::new(parquet_bytes(&table), "batch.parquet"))
        .unwrap_err();
    let ServeError::SchemaMismatch { missing, .. } = &err else {
        panic!("expected SchemaMismatch, got {err:?}");
    };
    assert_eq!(missing, &vec!["tenure".to_string(), "region".to_string()]);
    assert_eq!(err.http_status(), 400);
}

#[test]
fn wrong_content_for_suffix_is_malformed() {
    let (_dir, service) = stored_service();
    let err = service.handle(UploadedBlob::new(THREE_ROWS, "batch.xlsx")).unwrap_err();
    assert!(matches!(err, ServeError::MalformedInput { .. }));
    assert_eq!(err.to_string(), "uploaded file could not be parsed as xlsx");
}

#[test]
fn formats_agree_with_direct_prediction() {
    let (_dir, service) = stored_service();
    let table = features(25, 5);
    let expected = testing::fitted_pipeline().predict(&table).unwrap();

    let from_parquet = service
        .handle(UploadedBlob::new(parquet_bytes(&table), "batch.parquet"))
        .unwrap();
    assert_eq!(from_parquet.labels(), expected.as_slice());

    let from_xlsx = service.handle(UploadedBlob::new(xlsx_bytes(&table), "batch.XLSX")).unwrap();
    assert_eq!(from_xlsx.labels(), expected.as_slice());
}

#[test]
fn extra_columns_and_column_order_are_ignored() {
    let (_dir, service) = stored_service();
    let table = testing::synthetic_multisim(30, 8);
    let with_target = service
        .handle(UploadedBlob::new(parquet_bytes(&table), "with_target.parquet"))
        .unwrap();

    let mut columns = features(30, 8).into_columns();
    columns.reverse();
    let reversed = TabularTable::new(columns).unwrap();
    let reordered = service
        .handle(UploadedBlob::new(parquet_bytes(&reversed), "reversed.parquet"))
        .unwrap();
    assert_eq!(with_target, reordered);
}

#[test]
fn repeated_requests_are_idempotent() {
    let (_dir, service) = stored_service();
    let first = service.handle(UploadedBlob::new(THREE_ROWS, "batch.csv")).unwrap();
    let second = service.clone().handle(UploadedBlob::new(THREE_ROWS, "batch.csv")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn concurrent_requests_share_the_predictor() {
    let (_dir, service) = stored_service();
    let expected = service.handle(UploadedBlob::new(THREE_ROWS, "batch.csv")).unwrap();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| service.handle(UploadedBlob::new(THREE_ROWS, "batch.csv")).unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn contract_lists_multisim_features() {
    let (_dir, service) = stored_service();
    let names: Vec<&str> = service.predictor().contract().names().collect();
    assert_eq!(names, MULTISIM_FEATURES.to_vec());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn one_label_per_row(n_rows in 1usize..60, seed: u64) {
        let service = InferenceService::new(Arc::new(testing::fitted_pipeline()));
        let table = features(n_rows, seed);
        let result = service.handle(UploadedBlob::new(parquet_bytes(&table), "rows.parquet")).unwrap();
        prop_assert_eq!(result.len(), n_rows);
    }
}
