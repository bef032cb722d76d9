//! Error types for dataset ingestion and report export

use thiserror::Error;

/// Failures caused by the uploaded purchase dataset.
///
/// Any of these aborts the current computation; no partial report is produced.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("record {record}: missing value in column '{column}'")]
    MissingField { record: usize, column: &'static str },

    #[error("record {record}: unparseable purchase date '{raw}'")]
    InvalidDate { record: usize, raw: String },

    #[error("record {record}: non-numeric transaction value '{raw}'")]
    InvalidValue { record: usize, raw: String },

    #[error("dataset contains no purchase records")]
    Empty,

    #[error("unsupported input format '{0}', expected a CSV or spreadsheet file")]
    UnsupportedFormat(String),

    #[error("purchase table operation failed: {0}")]
    Frame(#[from] polars::prelude::PolarsError),

    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

pub type DataResult<T> = Result<T, DataError>;

/// Failures while encoding a finished report for download.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] polars::prelude::PolarsError),

    #[error("spreadsheet encoding failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}
