//! CSV decoding and encoding.
//!
//! The first row is the header. Column types are inferred from the content by
//! the arrow CSV reader and then mapped onto [`ColumnData`](crate::table::ColumnData)
//! by the shared record batch conversion.

use std::io::{Cursor, Write};
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};

use super::record_batches::{batches_to_table, to_record_batch};
use super::{LoadError, WriteError};
use crate::table::TabularTable;

/// Decode CSV bytes into a table.
///
/// Column types are inferred from every record, so a late value of a wider
/// type (text after integers, say) widens the column instead of failing.
/// Content that is empty or only whitespace decodes to an empty table.
pub fn read_csv(bytes: &[u8]) -> Result<TabularTable, LoadError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(TabularTable::empty());
    }

    let format = Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(Cursor::new(bytes), None)
        .map_err(LoadError::Csv)?;
    let schema = Arc::new(schema);

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .build(Cursor::new(bytes))
        .map_err(LoadError::Csv)?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(LoadError::Csv)?;

    batches_to_table(&schema, &batches)
}

/// Encode a table as CSV with a header row. Missing values are written as empty fields.
pub fn write_csv<W: Write>(table: &TabularTable, writer: W) -> Result<(), WriteError> {
    let batch = to_record_batch(table)?;
    let mut writer = WriterBuilder::new().with_header(true).build(writer);
    writer.write(&batch)?;
    Ok(())
}
