//! Shared Arrow `RecordBatch` conversion logic.
//!
//! This is used by both the CSV and Parquet codecs.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float32Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use super::LoadError;
use crate::table::{Column, ColumnData, TabularTable};

/// Convert decoded batches into a table.
///
/// Numeric and boolean arrays become numeric columns; every other type that
/// Arrow can cast to `Utf8` becomes a text column.
pub(super) fn batches_to_table(
    schema: &Schema,
    batches: &[RecordBatch],
) -> Result<TabularTable, LoadError> {
    let mut columns = Vec::with_capacity(schema.fields().len());

    for (idx, field) in schema.fields().iter().enumerate() {
        let data = if is_numeric_like(field.data_type()) {
            ColumnData::Numeric(extract_f32_column(batches, idx, field)?)
        } else {
            ColumnData::Text(extract_text_column(batches, idx, field)?)
        };
        columns.push(Column::new(field.name().clone(), data));
    }

    Ok(TabularTable::new(columns)?)
}

fn is_numeric_like(data_type: &DataType) -> bool {
    data_type.is_numeric() || matches!(data_type, DataType::Boolean)
}

fn extract_f32_column(
    batches: &[RecordBatch],
    idx: usize,
    field: &Field,
) -> Result<Vec<f32>, LoadError> {
    let mut values = Vec::new();
    for batch in batches {
        let casted = cast_column(batch.column(idx), field, &DataType::Float32)?;
        let arr = casted
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| unsupported(field))?;
        values.extend(arr.iter().map(|v| v.unwrap_or(f32::NAN)));
    }
    Ok(values)
}

fn extract_text_column(
    batches: &[RecordBatch],
    idx: usize,
    field: &Field,
) -> Result<Vec<Option<String>>, LoadError> {
    let mut values = Vec::new();
    for batch in batches {
        let casted = cast_column(batch.column(idx), field, &DataType::Utf8)?;
        let arr = casted
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| unsupported(field))?;
        values.extend(arr.iter().map(|v| v.map(str::to_owned)));
    }
    Ok(values)
}

fn cast_column(array: &ArrayRef, field: &Field, to: &DataType) -> Result<ArrayRef, LoadError> {
    cast(array, to).map_err(|_| unsupported(field))
}

fn unsupported(field: &Field) -> LoadError {
    LoadError::UnsupportedType {
        column: field.name().clone(),
        got: format!("{:?}", field.data_type()),
    }
}

/// Convert a table into a single record batch.
///
/// Numeric columns become nullable `Float32` (`NaN` → null), text columns
/// become nullable `Utf8`.
pub fn to_record_batch(table: &TabularTable) -> Result<RecordBatch, ArrowError> {
    let mut fields = Vec::with_capacity(table.n_columns());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.n_columns());

    for column in table.columns() {
        match column.data() {
            ColumnData::Numeric(values) => {
                fields.push(Field::new(column.name(), DataType::Float32, true));
                let arr: Float32Array = values
                    .iter()
                    .map(|&v| if v.is_nan() { None } else { Some(v) })
                    .collect();
                arrays.push(Arc::new(arr));
            }
            ColumnData::Text(values) => {
                fields.push(Field::new(column.name(), DataType::Utf8, true));
                let arr: StringArray = values.iter().map(|v| v.as_deref()).collect();
                arrays.push(Arc::new(arr));
            }
        }
    }

    let options = RecordBatchOptions::new().with_row_count(Some(table.n_rows()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BooleanArray, Int64Array};

    #[test]
    fn booleans_and_integers_become_numeric() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("flag", DataType::Boolean, true),
            Field::new("count", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(BooleanArray::from(vec![Some(true), None, Some(false)])) as ArrayRef,
                Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
            ],
        )
        .unwrap();

        let table = batches_to_table(&schema, &[batch.clone(), batch]).unwrap();
        assert_eq!(table.n_rows(), 6);
        match table.column("flag").unwrap().data() {
            ColumnData::Numeric(values) => {
                assert_eq!(values[0], 1.0);
                assert!(values[1].is_nan());
                assert_eq!(values[2], 0.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn table_to_batch_maps_missing_to_null() {
        let table = TabularTable::new(vec![
            Column::numeric("x", vec![1.0, f32::NAN]),
            Column::text("y", vec![None, Some("b")]),
        ])
        .unwrap();
        let batch = to_record_batch(&table).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column(0).null_count(), 1);
        assert_eq!(batch.column(1).null_count(), 1);
    }

    #[test]
    fn empty_table_to_batch() {
        let batch = to_record_batch(&TabularTable::empty()).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 0);
    }
}
