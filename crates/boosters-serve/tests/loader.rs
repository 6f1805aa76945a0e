//! Tabular loader behaviour across formats.

use std::panic;

use rand::prelude::*;
use rstest::rstest;
use rust_xlsxwriter::Workbook;

use boosters_serve::table::io::parquet::write_parquet;
use boosters_serve::table::io::{LoadError, load};
use boosters_serve::table::ColumnKind;
use boosters_serve::testing::{self, MULTISIM_CATEGORICAL, MULTISIM_FEATURES, TARGET};
use boosters_serve::{ColumnData, TabularTable};

fn assert_same_values(left: &TabularTable, right: &TabularTable) {
    assert_eq!(left.n_rows(), right.n_rows());
    assert_eq!(
        left.column_names().collect::<Vec<_>>(),
        right.column_names().collect::<Vec<_>>()
    );
    for (a, b) in left.columns().iter().zip(right.columns()) {
        match (a.data(), b.data()) {
            (ColumnData::Numeric(x), ColumnData::Numeric(y)) => {
                for (row, (u, v)) in x.iter().zip(y).enumerate() {
                    assert!(u == v || (u.is_nan() && v.is_nan()), "{} row {row}: {u} vs {v}", a.name());
                }
            }
            (ColumnData::Text(x), ColumnData::Text(y)) => assert_eq!(x, y, "{}", a.name()),
            (x, y) => panic!("{}: kind changed from {:?} to {:?}", a.name(), x.kind(), y.kind()),
        }
    }
}

#[test]
fn csv_roundtrip_keeps_multisim_columns() {
    let table = testing::synthetic_multisim(80, 2);
    let loaded = load(&testing::to_csv(&table), "multisim.csv").unwrap();
    assert_same_values(&table, &loaded);

    for name in MULTISIM_CATEGORICAL {
        assert_eq!(loaded.column(name).unwrap().kind(), ColumnKind::Text, "{name}");
    }
    assert_eq!(loaded.column(TARGET).unwrap().kind(), ColumnKind::Numeric);
}

#[test]
fn parquet_roundtrip_is_lossless() {
    let table = testing::synthetic_multisim(80, 3);
    let mut bytes = Vec::new();
    write_parquet(&table, &mut bytes).unwrap();
    let loaded = load(&bytes, "multisim.PARQUET").unwrap();
    assert_same_values(&table, &loaded);
}

#[test]
fn workbook_uses_first_sheet_and_header_row() {
    let mut workbook = Workbook::new();
    let first = workbook.add_worksheet();
    for (col, name) in MULTISIM_FEATURES.iter().enumerate() {
        first.write_string(0, col as u16, *name).unwrap();
    }
    first.write_string(1, 0, "basic").unwrap();
    first.write_number(1, 1, 33.0).unwrap();
    let second = workbook.add_worksheet();
    second.write_string(0, 0, "ignored").unwrap();
    let bytes = workbook.save_to_buffer().unwrap();

    let table = load(&bytes, "upload.xlsx").unwrap();
    assert_eq!(table.n_rows(), 1);
    assert_eq!(table.n_columns(), MULTISIM_FEATURES.len());
    assert_eq!(table.column("age").unwrap().data().numeric_at(0).unwrap(), 33.0);
    assert!(!table.contains("ignored"));
}

#[rstest]
#[case("data.json")]
#[case("data.txt")]
#[case("data")]
#[case("archive.csv.gz")]
fn unsupported_suffixes(#[case] filename: &str) {
    let err = load(b"age\n1\n", filename).unwrap_err();
    let LoadError::UnsupportedFormat { filename: reported } = &err else {
        panic!("expected UnsupportedFormat, got {err:?}");
    };
    assert_eq!(reported, filename);
    assert!(err.to_string().contains("csv, parquet, xlsx, xls"));
}

#[rstest]
#[case(b"a,b\n1,2,3\n4\n".as_slice(), "ragged.csv")]
#[case(b"PAR1 not really".as_slice(), "fake.parquet")]
#[case(b"\x00\x01\x02".as_slice(), "binary.xlsx")]
#[case(b"age\n1\n".as_slice(), "text.xls")]
fn malformed_content_is_an_error(#[case] bytes: &[u8], #[case] filename: &str) {
    let err = load(bytes, filename).unwrap_err();
    assert!(!matches!(err, LoadError::UnsupportedFormat { .. }), "{err}");
}

#[rstest]
#[case(b"".as_slice())]
#[case(b"\n\n  \n".as_slice())]
fn blank_csv_is_an_empty_table(#[case] bytes: &[u8]) {
    let table = load(bytes, "data.csv").unwrap();
    assert_eq!(table.n_rows(), 0);
}

#[test]
fn csv_types_come_from_every_record() {
    let mut csv = String::from("region,age\n");
    for row in 0..10_050 {
        match row {
            10_020 => csv.push_str("north,25.5\n"),
            _ => csv.push_str(&format!("{},{}\n", row % 5, 20 + row % 40)),
        }
    }

    let table = load(csv.as_bytes(), "data.csv").unwrap();
    assert_eq!(table.n_rows(), 10_050);
    match table.column("region").unwrap().data() {
        ColumnData::Text(values) => {
            assert_eq!(values[0].as_deref(), Some("0"));
            assert_eq!(values[10_020].as_deref(), Some("north"));
        }
        other => panic!("region should widen to text, got {:?}", other.kind()),
    }
    let age = table.column("age").unwrap().data();
    assert_eq!(age.numeric_at(10_020).unwrap(), 25.5);
    assert_eq!(age.numeric_at(1).unwrap(), 21.0);
}

/// Flip random bits of a valid file and check the loader returns instead of unwinding.
fn assert_corruption_is_contained(valid: &[u8], filename: &str, n_flips: usize, rounds: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for round in 0..rounds {
        let mut bytes = valid.to_vec();
        for _ in 0..n_flips {
            let idx = rng.gen_range(0..bytes.len());
            bytes[idx] ^= 1u8 << rng.gen_range(0..8u32);
        }
        let outcome = panic::catch_unwind(|| load(&bytes, filename).map(|table| table.n_rows()));
        assert!(outcome.is_ok(), "round {round}: loading a corrupted {filename} unwound");
    }
}

#[test]
fn corrupted_parquet_never_unwinds() {
    let mut bytes = Vec::new();
    write_parquet(&testing::synthetic_multisim(50, 11), &mut bytes).unwrap();
    assert_corruption_is_contained(&bytes, "upload.parquet", 3, 600, 5);
}

#[test]
fn corrupted_workbook_never_unwinds() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in ["region", "age", "tenure"].iter().enumerate() {
        sheet.write_string(0, col as u16, *name).unwrap();
    }
    for row in 1..40u32 {
        sheet.write_string(row, 0, ["north", "south", "capital"][row as usize % 3]).unwrap();
        sheet.write_number(row, 1, f64::from(18 + row)).unwrap();
        sheet.write_number(row, 2, f64::from(row * 3)).unwrap();
    }
    let bytes = workbook.save_to_buffer().unwrap();
    assert_corruption_is_contained(&bytes, "upload.xlsx", 4, 400, 9);
}
