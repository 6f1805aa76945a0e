//! Tabular file decoding and encoding.
//!
//! [`load`] turns an uploaded byte payload into a [`TabularTable`]. The format
//! is chosen from the file-name suffix alone (case-insensitive); the content is
//! never sniffed. Content that does not match the claimed format surfaces as a
//! [`LoadError`] other than [`LoadError::UnsupportedFormat`], never as a panic.
//!
//! | suffix            | decoder                        |
//! |-------------------|--------------------------------|
//! | `.csv`            | [`csv::read_csv`]              |
//! | `.parquet`        | [`parquet::read_parquet`]      |
//! | `.xlsx` / `.xls`  | [`excel::read_workbook`]       |
//!
//! Writers for CSV and Parquet are provided for the offline jobs.

pub mod csv;
pub mod excel;
pub mod parquet;
mod record_batches;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use super::{TableError, TabularTable};

pub use record_batches::to_record_batch;

/// File extensions accepted by [`load`].
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "parquet", "xlsx", "xls"];

// =============================================================================
// Format dispatch
// =============================================================================

/// A supported upload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
    Xlsx,
    Xls,
}

impl TableFormat {
    /// Pick a format from a file name's extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let name = filename.trim().to_ascii_lowercase();
        let (_, extension) = name.rsplit_once('.')?;
        match extension {
            "csv" => Some(Self::Csv),
            "parquet" => Some(Self::Parquet),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            _ => None,
        }
    }

    /// Canonical extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur while decoding a table.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file name does not end in a supported extension.
    #[error(
        "unsupported file format for `{filename}`: expected one of {expected}",
        expected = SUPPORTED_EXTENSIONS.join(", ")
    )]
    UnsupportedFormat { filename: String },

    #[error("CSV error: {0}")]
    Csv(#[source] arrow::error::ArrowError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("unsupported column type for {column}: {got}")]
    UnsupportedType { column: String, got: String },

    #[error(transparent)]
    Table(#[from] TableError),

    /// The underlying decoder panicked on corrupt input.
    #[error("{format} decoder failed on corrupt input: {message}")]
    DecoderPanic { format: TableFormat, message: String },
}

/// Errors that can occur while encoding a table.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),
}

// =============================================================================
// Public API
// =============================================================================

/// Decode `bytes` into a table, choosing the decoder from `filename`.
pub fn load(bytes: &[u8], filename: &str) -> Result<TabularTable, LoadError> {
    let format = TableFormat::from_filename(filename).ok_or_else(|| LoadError::UnsupportedFormat {
        filename: filename.to_string(),
    })?;
    load_as(bytes, format)
}

/// Decode `bytes` with an explicit format.
pub fn load_as(bytes: &[u8], format: TableFormat) -> Result<TabularTable, LoadError> {
    contain_panics(format, || match format {
        TableFormat::Csv => csv::read_csv(bytes),
        TableFormat::Parquet => parquet::read_parquet(bytes),
        TableFormat::Xlsx | TableFormat::Xls => excel::read_workbook(bytes, format),
    })
}

/// Run a decoder, turning a panic inside it into [`LoadError::DecoderPanic`].
///
/// The parquet, arrow and calamine readers can panic on corrupt files.
/// Decoders only read their input, so nothing is left half-updated on unwind.
fn contain_panics(
    format: TableFormat,
    decode: impl FnOnce() -> Result<TabularTable, LoadError>,
) -> Result<TabularTable, LoadError> {
    panic::catch_unwind(AssertUnwindSafe(decode)).unwrap_or_else(|payload| {
        Err(LoadError::DecoderPanic {
            format,
            message: panic_message(payload.as_ref()),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("data.csv", Some(TableFormat::Csv))]
    #[case("DATA.CSV", Some(TableFormat::Csv))]
    #[case("upload.v2.parquet", Some(TableFormat::Parquet))]
    #[case("book.xlsx", Some(TableFormat::Xlsx))]
    #[case("legacy.XLS", Some(TableFormat::Xls))]
    #[case("data.json", None)]
    #[case("data.txt", None)]
    #[case("csv", None)]
    #[case("", None)]
    fn format_from_filename(#[case] filename: &str, #[case] expected: Option<TableFormat>) {
        assert_eq!(TableFormat::from_filename(filename), expected);
    }

    #[test]
    fn decoder_panics_become_errors() {
        let err = contain_panics(TableFormat::Parquet, || panic!("index out of bounds")).unwrap_err();
        let LoadError::DecoderPanic { format, message } = &err else {
            panic!("expected DecoderPanic, got {err:?}");
        };
        assert_eq!(*format, TableFormat::Parquet);
        assert_eq!(message, "index out of bounds");

        let err = contain_panics(TableFormat::Xlsx, || panic!("row {} past end", 7)).unwrap_err();
        assert_eq!(err.to_string(), "xlsx decoder failed on corrupt input: row 7 past end");
    }

    #[test]
    fn unsupported_format_lists_alternatives() {
        let err = load(b"{}", "data.json").unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, LoadError::UnsupportedFormat { .. }));
        for ext in ["csv", "parquet", "xlsx", "xls"] {
            assert!(msg.contains(ext), "{msg}");
        }
    }

    #[test]
    fn mismatched_content_is_an_error() {
        assert!(load(b"a,b\n1,2\n", "data.parquet").is_err());
        assert!(load(b"a,b\n1,2\n", "data.xlsx").is_err());
    }
}
