//! Parquet decoding and encoding.
//!
//! Parquet support reuses the Arrow conversion after reading Parquet into
//! Arrow `RecordBatch`es.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use ::parquet::arrow::{ArrowWriter, ProjectionMask};
use ::parquet::basic::{Compression, ZstdLevel};
use ::parquet::file::properties::WriterProperties;
use ::parquet::file::reader::ChunkReader;
use arrow::record_batch::RecordBatchReader;
use bytes::Bytes;

use super::record_batches::{batches_to_table, to_record_batch};
use super::{LoadError, WriteError};
use crate::table::TabularTable;

/// Options for partial reads.
#[derive(Debug, Clone, Default)]
pub struct ParquetReadOptions {
    /// Only read these columns (by leaf name). `None` reads all columns.
    pub columns: Option<Vec<String>>,
    /// Stop after this many rows.
    pub limit: Option<usize>,
}

// =============================================================================
// Public API
// =============================================================================

/// Decode Parquet bytes into a table.
pub fn read_parquet(bytes: &[u8]) -> Result<TabularTable, LoadError> {
    read_table(Bytes::copy_from_slice(bytes), &ParquetReadOptions::default())
}

/// Load a Parquet file, optionally projecting columns and limiting rows.
pub fn load_parquet_file(
    path: impl AsRef<Path>,
    options: &ParquetReadOptions,
) -> Result<TabularTable, LoadError> {
    let file = File::open(path.as_ref()).map_err(::parquet::errors::ParquetError::from)?;
    read_table(file, options)
}

/// Encode a table as a zstd-compressed Parquet stream.
pub fn write_parquet<W: Write + Send>(table: &TabularTable, writer: W) -> Result<(), WriteError> {
    let batch = to_record_batch(table)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();
    let mut writer = ArrowWriter::try_new(writer, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Write a table to a Parquet file, creating parent directories.
pub fn save_parquet_file(table: &TabularTable, path: impl AsRef<Path>) -> Result<(), WriteError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_parquet(table, File::create(path)?)
}

// =============================================================================
// Internal helpers
// =============================================================================

fn read_table<R: ChunkReader + 'static>(
    reader: R,
    options: &ParquetReadOptions,
) -> Result<TabularTable, LoadError> {
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(reader)?;

    if let Some(columns) = &options.columns {
        let mask = ProjectionMask::columns(builder.parquet_schema(), columns.iter().map(String::as_str));
        builder = builder.with_projection(mask);
    }
    if let Some(limit) = options.limit {
        builder = builder.with_limit(limit);
    }

    let reader = builder.build()?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    batches_to_table(&schema, &batches)
}
