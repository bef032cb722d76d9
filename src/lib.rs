//! rfvscore: RFV (Recency, Frequency, Value) customer segmentation
//!
//! Purchase logs are aggregated per customer, each metric is graded A-D against
//! its quartiles, and the three grades form a score that maps to a marketing
//! action. Results export as CSV or spreadsheet bytes.

pub mod actions;
pub mod cli;
pub mod data;
pub mod error;
pub mod export;
pub mod model;
pub mod viz;

// Re-export public items for easier access
pub use actions::{map_action, ActionTable};
pub use cli::Args;
pub use data::{
    aggregate, compute_reference_date, load_purchases, parse_purchases, InputFormat,
    PurchaseRecord,
};
pub use error::{DataError, DataResult, ExportError};
pub use export::{to_csv_bytes, to_xlsx_bytes};
pub use model::{
    classify_freq_or_value, classify_recency, compose_score, compute_quartiles, compute_rfv,
    summarize, CustomerRfv, Grade, RfvReport, Score,
};

/// Result type for the binary and presentation helpers
pub type Result<T> = anyhow::Result<T>;
