//! Spreadsheet decoding (`.xlsx` and legacy `.xls`).
//!
//! Only the first worksheet is read. Its first row is the header; empty header
//! cells get positional names (`column_0`, `column_1`, ...).

use std::io::{Cursor, Read, Seek};

use calamine::{Data, Range, Reader, Xls, Xlsx};

use super::{LoadError, TableFormat};
use crate::table::{Column, ColumnData, TabularTable};

/// Decode a workbook into a table.
///
/// `format` must be [`TableFormat::Xlsx`] or [`TableFormat::Xls`].
pub fn read_workbook(bytes: &[u8], format: TableFormat) -> Result<TabularTable, LoadError> {
    let cursor = Cursor::new(bytes);
    let range = match format {
        TableFormat::Xls => {
            let workbook: Xls<_> = Xls::new(cursor).map_err(calamine::Error::from)?;
            first_sheet(workbook)?
        }
        _ => {
            let workbook: Xlsx<_> = Xlsx::new(cursor).map_err(calamine::Error::from)?;
            first_sheet(workbook)?
        }
    };
    range_to_table(&range)
}

fn first_sheet<RS, R>(mut workbook: R) -> Result<Range<Data>, LoadError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    calamine::Error: From<R::Error>,
{
    let Some(name) = workbook.sheet_names().first().cloned() else {
        return Ok(Range::empty());
    };
    workbook
        .worksheet_range(&name)
        .map_err(|e| LoadError::Spreadsheet(e.into()))
}

fn range_to_table(range: &Range<Data>) -> Result<TabularTable, LoadError> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(TabularTable::empty());
    };
    let body: Vec<&[Data]> = rows.collect();

    let mut columns = Vec::with_capacity(header.len());
    for (idx, cell) in header.iter().enumerate() {
        let name = match cell {
            Data::Empty => format!("column_{idx}"),
            other => {
                let text = other.to_string();
                let text = text.trim();
                if text.is_empty() {
                    format!("column_{idx}")
                } else {
                    text.to_string()
                }
            }
        };
        let cells = body.iter().map(|row| row.get(idx).unwrap_or(&Data::Empty));
        columns.push(Column::new(name, column_data(cells)));
    }

    Ok(TabularTable::new(columns)?)
}

/// A column is numeric when all of its non-empty cells are numbers or booleans.
fn column_data<'a>(cells: impl Iterator<Item = &'a Data> + Clone) -> ColumnData {
    let all_numeric = cells.clone().all(|cell| {
        matches!(
            cell,
            Data::Int(_) | Data::Float(_) | Data::Bool(_) | Data::Empty | Data::Error(_)
        )
    });

    if all_numeric {
        ColumnData::Numeric(
            cells
                .map(|cell| match cell {
                    Data::Int(v) => *v as f32,
                    Data::Float(v) => *v as f32,
                    Data::Bool(v) => f32::from(u8::from(*v)),
                    _ => f32::NAN,
                })
                .collect(),
        )
    } else {
        ColumnData::Text(
            cells
                .map(|cell| match cell {
                    Data::Empty | Data::Error(_) => None,
                    Data::Int(v) => Some(v.to_string()),
                    Data::Float(v) => Some(crate::table::number_key(*v as f32)),
                    other => Some(other.to_string()),
                })
                .collect(),
        )
    }
}
