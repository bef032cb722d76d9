//! Download encodings for a finished report
//!
//! Both exporters return bytes; nothing is written to disk here.

use log::debug;
use polars::prelude::*;
use rust_xlsxwriter::{ColNum, RowNum, Workbook};

use crate::data::CUSTOMER_ID_COLUMN;
use crate::error::ExportError;
use crate::model::RfvReport;

pub const RECENCY_COLUMN: &str = "Recencia";
pub const FREQUENCY_COLUMN: &str = "Frequencia";
pub const VALUE_COLUMN: &str = "Valor";
pub const R_GRADE_COLUMN: &str = "R_quartil";
pub const F_GRADE_COLUMN: &str = "F_quartil";
pub const V_GRADE_COLUMN: &str = "V_quartil";
pub const SCORE_COLUMN: &str = "RFV_Score";
pub const ACTION_COLUMN: &str = "Ações de Marketing";

/// Column order shared by every export format
pub const EXPORT_COLUMNS: [&str; 9] = [
    CUSTOMER_ID_COLUMN,
    RECENCY_COLUMN,
    FREQUENCY_COLUMN,
    VALUE_COLUMN,
    R_GRADE_COLUMN,
    F_GRADE_COLUMN,
    V_GRADE_COLUMN,
    SCORE_COLUMN,
    ACTION_COLUMN,
];

pub const SHEET_NAME: &str = "Sheet1";

/// Build the result table as a DataFrame, one row per customer
pub fn report_frame(report: &RfvReport) -> PolarsResult<DataFrame> {
    let customers = &report.customers;

    df!(
        CUSTOMER_ID_COLUMN => customers.iter().map(|c| c.customer_id.clone()).collect::<Vec<_>>(),
        RECENCY_COLUMN => customers.iter().map(|c| c.recency_days).collect::<Vec<_>>(),
        FREQUENCY_COLUMN => customers.iter().map(|c| c.frequency).collect::<Vec<_>>(),
        VALUE_COLUMN => customers.iter().map(|c| c.value).collect::<Vec<_>>(),
        R_GRADE_COLUMN => customers.iter().map(|c| c.r_grade.to_string()).collect::<Vec<_>>(),
        F_GRADE_COLUMN => customers.iter().map(|c| c.f_grade.to_string()).collect::<Vec<_>>(),
        V_GRADE_COLUMN => customers.iter().map(|c| c.v_grade.to_string()).collect::<Vec<_>>(),
        SCORE_COLUMN => customers.iter().map(|c| c.score.to_string()).collect::<Vec<_>>(),
        ACTION_COLUMN => customers.iter().map(|c| c.action.clone()).collect::<Vec<_>>()
    )
}

/// UTF-8 CSV with a header row; absent actions are empty fields
pub fn to_csv_bytes(report: &RfvReport) -> Result<Vec<u8>, ExportError> {
    let mut frame = report_frame(report)?;
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut frame)?;

    debug!("Encoded {} customers as {} CSV bytes", frame.height(), buffer.len());
    Ok(buffer)
}

/// Single-sheet workbook with the same columns as the CSV export
pub fn to_xlsx_bytes(report: &RfvReport) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, title) in (0..).zip(EXPORT_COLUMNS) {
        let col: ColNum = col;
        sheet.write_string(0, col, title)?;
    }

    for (row, customer) in (1..).zip(&report.customers) {
        let row: RowNum = row;
        sheet.write_string(row, 0, &customer.customer_id)?;
        sheet.write_number(row, 1, customer.recency_days as f64)?;
        sheet.write_number(row, 2, customer.frequency as f64)?;
        sheet.write_number(row, 3, customer.value)?;
        sheet.write_string(row, 4, customer.r_grade.to_string())?;
        sheet.write_string(row, 5, customer.f_grade.to_string())?;
        sheet.write_string(row, 6, customer.v_grade.to_string())?;
        sheet.write_string(row, 7, customer.score.to_string())?;
        if let Some(action) = &customer.action {
            sheet.write_string(row, 8, action)?;
        }
    }

    let bytes = workbook.save_to_buffer()?;
    debug!(
        "Encoded {} customers as {} spreadsheet bytes",
        report.customers.len(),
        bytes.len()
    );
    Ok(bytes)
}
