//! In-memory tabular data.
//!
//! A [`TabularTable`] is an ordered collection of named, typed columns that
//! share one row count. Tables are built once (by the loaders in [`io`] or by
//! the offline jobs) and are read-only afterwards.
//!
//! # Column types
//!
//! - [`ColumnData::Numeric`]: `f32` values, missing = `f32::NAN`
//! - [`ColumnData::Text`]: optional strings, missing = `None`
//!
//! Numbers stored in text columns can still be read through
//! [`ColumnData::numeric_at`], and numeric columns can be read as category keys
//! through [`ColumnData::category_at`]. Both accessors define the canonical
//! conversions used by the schema guard and the prediction pipeline.

pub mod io;

use std::borrow::Cow;
use std::collections::HashMap;

use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Structural errors raised when assembling a table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// Two columns share a name.
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    /// A column length differs from the first column.
    #[error("column `{column}` has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

/// A value in a text column could not be read as a number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value {value:?} at row {row} is not numeric")]
pub struct NotNumeric {
    pub row: usize,
    pub value: String,
}

// =============================================================================
// Columns
// =============================================================================

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Column storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Numeric values, `NaN` marks a missing value.
    Numeric(Vec<f32>),
    /// Text values, `None` marks a missing value.
    Text(Vec<Option<String>>),
}

impl ColumnData {
    /// Number of values in the column.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    /// Returns true if the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical type of the column.
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }

    /// Returns true if the value at `row` is missing.
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(values) => values[row].is_nan(),
            ColumnData::Text(values) => values[row].is_none(),
        }
    }

    /// Read the value at `row` as a number.
    ///
    /// Missing values and blank strings read as `NaN`.
    pub fn numeric_at(&self, row: usize) -> Result<f32, NotNumeric> {
        match self {
            ColumnData::Numeric(values) => Ok(values[row]),
            ColumnData::Text(values) => match values[row].as_deref() {
                None => Ok(f32::NAN),
                Some(raw) => parse_number(raw).ok_or_else(|| NotNumeric {
                    row,
                    value: raw.to_string(),
                }),
            },
        }
    }

    /// Read the value at `row` as a category key.
    ///
    /// Integral numbers render without a fractional part (`3.0` → `"3"`),
    /// so a category seen as text during training matches the same category
    /// loaded as a number later.
    pub fn category_at(&self, row: usize) -> Option<Cow<'_, str>> {
        match self {
            ColumnData::Numeric(values) => {
                let v = values[row];
                if v.is_nan() {
                    None
                } else {
                    Some(Cow::Owned(number_key(v)))
                }
            }
            ColumnData::Text(values) => values[row].as_deref().map(Cow::Borrowed),
        }
    }

    /// Returns the first row whose value cannot be read as a number.
    pub fn first_non_numeric(&self) -> Option<NotNumeric> {
        (0..self.len()).find_map(|row| self.numeric_at(row).err())
    }

    /// Gather the values at `indices` into a new column.
    pub fn take(&self, indices: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(values) => {
                ColumnData::Numeric(indices.iter().map(|&i| values[i]).collect())
            }
            ColumnData::Text(values) => {
                ColumnData::Text(indices.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }
}

/// Parse a text cell as a number. Blank cells are missing.
pub(crate) fn parse_number(raw: &str) -> Option<f32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(f32::NAN);
    }
    trimmed.parse::<f32>().ok()
}

/// Canonical text rendering of a numeric category.
pub(crate) fn number_key(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self::new(name, ColumnData::Numeric(values))
    }

    pub fn text<S: Into<String>>(name: impl Into<String>, values: Vec<Option<S>>) -> Self {
        Self::new(
            name,
            ColumnData::Text(values.into_iter().map(|v| v.map(Into::into)).collect()),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> ColumnData {
        self.data
    }
}

// =============================================================================
// TabularTable
// =============================================================================

/// Ordered, named, typed columns with a shared row count.
///
/// Construction validates that names are unique and lengths agree. A table
/// with zero rows is representable (an empty upload decodes to one) but the
/// schema guard rejects it before any inference work.
#[derive(Debug, Clone, Default)]
pub struct TabularTable {
    columns: Vec<Column>,
    n_rows: usize,
    name_index: HashMap<String, usize>,
}

impl TabularTable {
    /// Build a table from columns.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let n_rows = columns.first().map_or(0, Column::len);
        let mut name_index = HashMap::with_capacity(columns.len());

        for (idx, column) in columns.iter().enumerate() {
            if column.len() != n_rows {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: n_rows,
                    actual: column.len(),
                });
            }
            if name_index.insert(column.name.clone(), idx).is_some() {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }

        Ok(Self {
            columns,
            n_rows,
            name_index,
        })
    }

    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// All columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.name_index.get(name).map(|&idx| &self.columns[idx])
    }

    /// Returns true if a column with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    /// Gather rows at `indices` (in that order) into a new table.
    pub fn take_rows(&self, indices: &[usize]) -> TabularTable {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.data.take(indices)))
            .collect();
        Self {
            columns,
            n_rows: indices.len(),
            name_index: self.name_index.clone(),
        }
    }

    /// The first `len` rows (or all rows if the table is shorter).
    pub fn head(&self, len: usize) -> TabularTable {
        let indices: Vec<usize> = (0..self.n_rows.min(len)).collect();
        self.take_rows(&indices)
    }

    /// Split off one column, returning the remaining table and the column.
    pub fn split_column(self, name: &str) -> (TabularTable, Option<Column>) {
        let mut removed = None;
        let mut kept = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            if removed.is_none() && column.name == name {
                removed = Some(column);
            } else {
                kept.push(column);
            }
        }
        let n_rows = self.n_rows;
        let name_index = kept
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        (
            TabularTable {
                columns: kept,
                n_rows,
                name_index,
            },
            removed,
        )
    }

    /// Consume the table, returning its columns.
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

impl PartialEq for TabularTable {
    fn eq(&self, other: &Self) -> bool {
        self.n_rows == other.n_rows && self.columns == other.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TabularTable {
        TabularTable::new(vec![
            Column::numeric("age", vec![31.0, f32::NAN, 45.0]),
            Column::text("region", vec![Some("north"), None, Some("south")]),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = TabularTable::new(vec![
            Column::numeric("a", vec![1.0]),
            Column::numeric("a", vec![2.0]),
        ])
        .unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("a".into()));
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = TabularTable::new(vec![
            Column::numeric("a", vec![1.0, 2.0]),
            Column::numeric("b", vec![2.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { actual: 1, expected: 2, .. }));
    }

    #[test]
    fn lookup_by_name() {
        let table = sample();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.n_columns(), 2);
        assert_eq!(table.column("region").unwrap().kind(), ColumnKind::Text);
        assert!(table.column("tenure").is_none());
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["age", "region"]);
    }

    #[test]
    fn numeric_reads_from_text() {
        let col = ColumnData::Text(vec![Some(" 12 ".into()), Some("".into()), None, Some("x".into())]);
        assert_eq!(col.numeric_at(0), Ok(12.0));
        assert!(col.numeric_at(1).unwrap().is_nan());
        assert!(col.numeric_at(2).unwrap().is_nan());
        assert_eq!(col.first_non_numeric().map(|e| e.row), Some(3));
    }

    #[test]
    fn numeric_category_keys_are_canonical() {
        let col = ColumnData::Numeric(vec![3.0, 2.5, f32::NAN, -1.0]);
        assert_eq!(col.category_at(0).as_deref(), Some("3"));
        assert_eq!(col.category_at(1).as_deref(), Some("2.5"));
        assert_eq!(col.category_at(2), None);
        assert_eq!(col.category_at(3).as_deref(), Some("-1"));
    }

    #[test]
    fn take_rows_and_head() {
        let table = sample();
        let picked = table.take_rows(&[2, 0]);
        assert_eq!(picked.n_rows(), 2);
        match picked.column("region").unwrap().data() {
            ColumnData::Text(values) => {
                assert_eq!(values, &vec![Some("south".to_string()), Some("north".to_string())])
            }
            other => panic!("unexpected column {other:?}"),
        }
        assert_eq!(table.head(10).n_rows(), 3);
        assert_eq!(table.head(1).n_rows(), 1);
    }

    #[test]
    fn split_column_removes_target() {
        let (rest, target) = sample().split_column("age");
        assert_eq!(target.unwrap().name(), "age");
        assert_eq!(rest.n_columns(), 1);
        assert_eq!(rest.n_rows(), 3);
        assert!(rest.contains("region"));
        assert!(!rest.contains("age"));
    }

    #[test]
    fn empty_table_has_no_rows() {
        let table = TabularTable::empty();
        assert!(table.is_empty());
        assert_eq!(table.n_columns(), 0);
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn types_are_send_sync() {
        assert_send_sync::<TabularTable>();
        assert_send_sync::<Column>();
    }
}
