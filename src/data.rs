//! Purchase log loading and per-customer aggregation
//!
//! CSV files are read with Polars, spreadsheets with calamine. Both paths end in
//! the same field parser so that every input row becomes a typed
//! [`PurchaseRecord`] or a [`DataError`] naming the offending record.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, DataType as _, Reader};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info};
use polars::prelude::*;

use crate::error::{DataError, DataResult};

pub const CUSTOMER_ID_COLUMN: &str = "ID_cliente";
pub const PURCHASE_DATE_COLUMN: &str = "DiaCompra";
pub const PURCHASE_ID_COLUMN: &str = "CodigoCompra";
pub const VALUE_COLUMN: &str = "ValorTotal";

const REQUIRED_COLUMNS: [&str; 4] = [
    CUSTOMER_ID_COLUMN,
    PURCHASE_DATE_COLUMN,
    PURCHASE_ID_COLUMN,
    VALUE_COLUMN,
];

const DATETIME_LAYOUTS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_LAYOUTS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

const LAST_PURCHASE_ALIAS: &str = "UltimaCompra";
const RECENCY_ALIAS: &str = "Recencia";
const FREQUENCY_ALIAS: &str = "Frequencia";
const MONETARY_ALIAS: &str = "Valor";
const MICROS_PER_DAY: i64 = 86_400_000_000;

/// One purchase transaction from the uploaded log
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRecord {
    pub customer_id: String,
    /// Midnight when the source only carries a calendar date
    pub purchase_date: NaiveDateTime,
    /// Only used for counting; may be blank in the source
    pub purchase_id: Option<String>,
    pub value: f64,
}

/// Per-customer totals before grading
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerAggregate {
    pub customer_id: String,
    /// Whole days between the dataset's latest purchase and this customer's latest
    pub recency_days: i64,
    pub frequency: u64,
    pub value: f64,
}

/// Layout of an uploaded purchase log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Spreadsheet,
}

impl InputFormat {
    /// Infer the format from the file extension
    pub fn from_path(path: &Path) -> DataResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Self::Spreadsheet),
            _ => Err(DataError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Load a purchase log from disk
///
/// # Arguments
/// * `path` - CSV or spreadsheet file
/// * `format` - Explicit format; inferred from the extension when `None`
pub fn load_purchases(
    path: impl AsRef<Path>,
    format: Option<InputFormat>,
) -> DataResult<Vec<PurchaseRecord>> {
    let path = path.as_ref();
    let format = match format {
        Some(format) => format,
        None => InputFormat::from_path(path)?,
    };

    info!("Reading {:?} purchase log from {}", format, path.display());
    let bytes = std::fs::read(path)?;
    parse_purchases(bytes, format)
}

/// Parse an in-memory upload into purchase records
pub fn parse_purchases(bytes: Vec<u8>, format: InputFormat) -> DataResult<Vec<PurchaseRecord>> {
    let records = match format {
        InputFormat::Csv => read_csv(bytes)?,
        InputFormat::Spreadsheet => read_spreadsheet(bytes)?,
    };
    debug!("Parsed {} purchase records", records.len());
    Ok(records)
}

fn read_csv(bytes: Vec<u8>) -> DataResult<Vec<PurchaseRecord>> {
    // Zero inference rows keeps every column as text; parsing happens per field below
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;

    records_from_frame(&df)
}

fn records_from_frame(df: &DataFrame) -> DataResult<Vec<PurchaseRecord>> {
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|name| df.get_column_index(name).is_none())
    {
        return Err(DataError::MissingColumn((*missing).to_string()));
    }

    let ids = text_column(df, CUSTOMER_ID_COLUMN)?;
    let dates = text_column(df, PURCHASE_DATE_COLUMN)?;
    let purchases = text_column(df, PURCHASE_ID_COLUMN)?;
    let values = text_column(df, VALUE_COLUMN)?;

    ids.iter()
        .zip(&dates)
        .zip(&purchases)
        .zip(&values)
        .enumerate()
        .map(|(index, (((id, date), purchase), value))| {
            parse_record(
                index + 1,
                id.as_deref(),
                date.as_deref(),
                purchase.as_deref(),
                value.as_deref(),
            )
        })
        .collect()
}

fn text_column(df: &DataFrame, name: &str) -> DataResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    let values = column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_owned))
        .collect();
    Ok(values)
}

fn read_spreadsheet(bytes: Vec<u8>) -> DataResult<Vec<PurchaseRecord>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook.worksheet_range_at(0).ok_or(DataError::Empty)??;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or(DataError::Empty)?
        .iter()
        .map(|cell| cell_text(cell).unwrap_or_default())
        .collect();

    let position = |name: &str| {
        header
            .iter()
            .position(|title| title == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    };
    let id_at = position(CUSTOMER_ID_COLUMN)?;
    let date_at = position(PURCHASE_DATE_COLUMN)?;
    let purchase_at = position(PURCHASE_ID_COLUMN)?;
    let value_at = position(VALUE_COLUMN)?;

    let mut records = Vec::new();
    for (index, row) in rows.enumerate() {
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        let field = |at: usize| row.get(at).and_then(cell_text);
        records.push(parse_record(
            index + 1,
            field(id_at).as_deref(),
            field(date_at).as_deref(),
            field(purchase_at).as_deref(),
            field(value_at).as_deref(),
        )?);
    }

    Ok(records)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Float(f) if f.fract() == 0.0 => Some(format!("{:.0}", f)),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Data::Error(e) => Some(format!("#{:?}", e)),
    }
}

fn parse_record(
    record: usize,
    customer_id: Option<&str>,
    purchase_date: Option<&str>,
    purchase_id: Option<&str>,
    value: Option<&str>,
) -> DataResult<PurchaseRecord> {
    let customer_id = required(record, CUSTOMER_ID_COLUMN, customer_id)?;
    let raw_date = required(record, PURCHASE_DATE_COLUMN, purchase_date)?;
    let raw_value = required(record, VALUE_COLUMN, value)?;

    let purchase_date = parse_purchase_date(raw_date).ok_or_else(|| DataError::InvalidDate {
        record,
        raw: raw_date.to_string(),
    })?;
    let value = parse_value(raw_value).ok_or_else(|| DataError::InvalidValue {
        record,
        raw: raw_value.to_string(),
    })?;

    Ok(PurchaseRecord {
        customer_id: customer_id.to_string(),
        purchase_date,
        purchase_id: purchase_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned),
        value,
    })
}

fn required<'a>(record: usize, column: &'static str, field: Option<&'a str>) -> DataResult<&'a str> {
    field
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(DataError::MissingField { record, column })
}

/// Parse a purchase date in any of the accepted layouts
///
/// Offsets in RFC 3339 timestamps are normalised to UTC before the offset is dropped.
pub fn parse_purchase_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.naive_utc());
    }
    if let Some(datetime) = DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
    {
        return Some(datetime);
    }
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(raw, layout).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Latest purchase date across the whole log
pub fn compute_reference_date(records: &[PurchaseRecord]) -> DataResult<NaiveDateTime> {
    records
        .iter()
        .map(|record| record.purchase_date)
        .max()
        .ok_or(DataError::Empty)
}

/// Group purchases by customer and compute recency, frequency and value
pub fn aggregate(records: &[PurchaseRecord]) -> DataResult<BTreeMap<String, CustomerAggregate>> {
    let reference_date = compute_reference_date(records)?;
    aggregate_against(records, reference_date)
}

pub(crate) fn aggregate_against(
    records: &[PurchaseRecord],
    reference_date: NaiveDateTime,
) -> DataResult<BTreeMap<String, CustomerAggregate>> {
    let reference_timestamp = reference_date.and_utc().timestamp_micros();

    let grouped = purchase_frame(records)?
        .lazy()
        .group_by([col(CUSTOMER_ID_COLUMN)])
        .agg([
            col(PURCHASE_DATE_COLUMN).max().alias(LAST_PURCHASE_ALIAS),
            len().cast(DataType::UInt64).alias(FREQUENCY_ALIAS),
            col(VALUE_COLUMN).sum().alias(MONETARY_ALIAS),
        ])
        .with_columns([(lit(reference_timestamp) - col(LAST_PURCHASE_ALIAS))
            .floor_div(lit(MICROS_PER_DAY))
            .alias(RECENCY_ALIAS)])
        .select([
            col(CUSTOMER_ID_COLUMN),
            col(RECENCY_ALIAS),
            col(FREQUENCY_ALIAS),
            col(MONETARY_ALIAS),
        ])
        .collect()?;

    let ids = grouped.column(CUSTOMER_ID_COLUMN)?.str()?;
    let recency = grouped.column(RECENCY_ALIAS)?.i64()?;
    let frequency = grouped.column(FREQUENCY_ALIAS)?.u64()?;
    let value = grouped.column(MONETARY_ALIAS)?.f64()?;

    let customers: BTreeMap<String, CustomerAggregate> = ids
        .into_no_null_iter()
        .zip(recency.into_no_null_iter())
        .zip(frequency.into_no_null_iter())
        .zip(value.into_no_null_iter())
        .map(|(((id, recency_days), frequency), value)| {
            let customer = CustomerAggregate {
                customer_id: id.to_string(),
                recency_days,
                frequency,
                value,
            };
            (customer.customer_id.clone(), customer)
        })
        .collect();

    debug!(
        "Aggregated {} records into {} customers (reference date {})",
        records.len(),
        customers.len(),
        reference_date
    );
    Ok(customers)
}

/// One row per purchase; dates as UTC microseconds
fn purchase_frame(records: &[PurchaseRecord]) -> PolarsResult<DataFrame> {
    df!(
        CUSTOMER_ID_COLUMN => records.iter().map(|r| r.customer_id.as_str()).collect::<Vec<_>>(),
        PURCHASE_DATE_COLUMN => records
            .iter()
            .map(|r| r.purchase_date.and_utc().timestamp_micros())
            .collect::<Vec<_>>(),
        VALUE_COLUMN => records.iter().map(|r| r.value).collect::<Vec<_>>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    const HEADER: &str = "ID_cliente,DiaCompra,CodigoCompra,ValorTotal";

    fn csv(rows: &[&str]) -> Vec<u8> {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text.push('\n');
        text.into_bytes()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_csv_records() {
        let bytes = csv(&[
            "C1,2024-01-01,O1,100",
            "C1,2024-01-10,O2,50.5",
            "C2,2024-01-05,,500",
        ]);

        let records = parse_purchases(bytes, InputFormat::Csv).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].customer_id, "C1");
        assert_eq!(records[1].purchase_date, day(2024, 1, 10));
        assert_eq!(records[1].value, 50.5);
        assert_eq!(records[0].purchase_id.as_deref(), Some("O1"));
        assert_eq!(records[2].purchase_id, None);
    }

    #[test]
    fn test_missing_column() {
        let bytes = b"ID_cliente,DiaCompra,ValorTotal\nC1,2024-01-01,10\n".to_vec();
        let err = parse_purchases(bytes, InputFormat::Csv).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(ref c) if c == PURCHASE_ID_COLUMN));
    }

    #[test]
    fn test_invalid_fields_name_the_record() {
        let err = parse_purchases(csv(&["C1,2024-01-01,O1,10", "C2,yesterday,O2,10"]), InputFormat::Csv)
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidDate { record: 2, ref raw } if raw == "yesterday"));

        let err = parse_purchases(csv(&["C1,2024-01-01,O1,ten"]), InputFormat::Csv).unwrap_err();
        assert!(matches!(err, DataError::InvalidValue { record: 1, .. }));

        let err = parse_purchases(csv(&["C1,2024-01-01,O1,NaN"]), InputFormat::Csv).unwrap_err();
        assert!(matches!(err, DataError::InvalidValue { record: 1, .. }));

        let err = parse_purchases(csv(&[",2024-01-01,O1,10"]), InputFormat::Csv).unwrap_err();
        assert!(matches!(
            err,
            DataError::MissingField { record: 1, column: CUSTOMER_ID_COLUMN }
        ));
    }

    #[test]
    fn test_date_layouts() {
        assert_eq!(parse_purchase_date("2024-01-10"), Some(day(2024, 1, 10)));
        assert_eq!(parse_purchase_date("01/10/2024"), Some(day(2024, 1, 10)));
        assert_eq!(
            parse_purchase_date("2024-01-10 08:30:00"),
            day(2024, 1, 10).date().and_hms_opt(8, 30, 0)
        );
        assert_eq!(
            parse_purchase_date("2024-01-10T08:30:00.250"),
            day(2024, 1, 10).date().and_hms_milli_opt(8, 30, 0, 250)
        );
        assert_eq!(
            parse_purchase_date("2024-01-10T02:00:00+03:00"),
            day(2024, 1, 9).date().and_hms_opt(23, 0, 0)
        );
        assert_eq!(parse_purchase_date("10 Jan"), None);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(InputFormat::from_path(Path::new("compras.CSV")).unwrap(), InputFormat::Csv);
        assert_eq!(
            InputFormat::from_path(Path::new("compras.xlsx")).unwrap(),
            InputFormat::Spreadsheet
        );
        assert!(InputFormat::from_path(Path::new("compras.json")).is_err());
        assert!(InputFormat::from_path(Path::new("compras")).is_err());
    }

    #[test]
    fn test_reference_date_and_aggregate() {
        let records = parse_purchases(
            csv(&[
                "C1,2024-01-01,O1,100",
                "C1,2024-01-10,O2,50",
                "C2,2024-01-05,O3,500",
            ]),
            InputFormat::Csv,
        )
        .unwrap();

        assert_eq!(compute_reference_date(&records).unwrap(), day(2024, 1, 10));

        let customers = aggregate(&records).unwrap();
        assert_eq!(customers.len(), 2);

        let c1 = &customers["C1"];
        assert_eq!((c1.recency_days, c1.frequency), (0, 2));
        assert!((c1.value - 150.0).abs() < 1e-9);

        let c2 = &customers["C2"];
        assert_eq!((c2.recency_days, c2.frequency), (5, 1));
        assert!((c2.value - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_recency_truncates_partial_days() {
        let records = parse_purchases(
            csv(&["C1,2024-01-10 20:00:00,O1,1", "C2,2024-01-09 22:00:00,O2,1"]),
            InputFormat::Csv,
        )
        .unwrap();
        let customers = aggregate(&records).unwrap();
        assert_eq!(customers["C2"].recency_days, 0);
    }

    #[test]
    fn test_empty_dataset() {
        assert!(matches!(compute_reference_date(&[]), Err(DataError::Empty)));
        assert!(matches!(aggregate(&[]), Err(DataError::Empty)));
    }

    #[test]
    fn test_parse_spreadsheet() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, title) in ["Loja", "ID_cliente", "DiaCompra", "CodigoCompra", "ValorTotal"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *title).unwrap();
        }
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let purchased = ExcelDateTime::from_ymd(2024, 1, 10).unwrap();

        sheet.write_string(1, 0, "Centro").unwrap();
        sheet.write_number(1, 1, 17850.0).unwrap();
        sheet
            .write_datetime_with_format(1, 2, &purchased, &date_format)
            .unwrap();
        sheet.write_string(1, 3, "536365").unwrap();
        sheet.write_number(1, 4, 15.3).unwrap();

        sheet.write_string(2, 0, "Centro").unwrap();
        sheet.write_string(2, 1, "13047").unwrap();
        sheet.write_string(2, 2, "2024-01-05").unwrap();
        sheet.write_number(2, 4, 22).unwrap();

        let bytes = workbook.save_to_buffer().unwrap();
        let records = parse_purchases(bytes, InputFormat::Spreadsheet).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].customer_id, "17850");
        assert_eq!(records[0].purchase_date, day(2024, 1, 10));
        assert!((records[0].value - 15.3).abs() < 1e-9);
        assert_eq!(records[1].purchase_id, None);
        assert_eq!(records[1].purchase_date, day(2024, 1, 5));
    }

    #[test]
    fn test_spreadsheet_missing_column() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "ID_cliente").unwrap();
        sheet.write_string(0, 1, "DiaCompra").unwrap();
        sheet.write_string(1, 0, "C1").unwrap();
        sheet.write_string(1, 1, "2024-01-01").unwrap();

        let bytes = workbook.save_to_buffer().unwrap();
        let err = parse_purchases(bytes, InputFormat::Spreadsheet).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(ref c) if c == PURCHASE_ID_COLUMN));
    }

    #[test]
    fn test_header_names_match_exactly_in_both_formats() {
        let padded = " ID_cliente,DiaCompra,CodigoCompra,ValorTotal\nC1,2024-01-01,O1,10\n";
        let err = parse_purchases(padded.as_bytes().to_vec(), InputFormat::Csv).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(ref c) if c == CUSTOMER_ID_COLUMN));

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, title) in [" ID_cliente", "DiaCompra", "CodigoCompra", "ValorTotal"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *title).unwrap();
        }
        sheet.write_string(1, 0, "C1").unwrap();
        sheet.write_string(1, 1, "2024-01-01").unwrap();
        sheet.write_string(1, 2, "O1").unwrap();
        sheet.write_number(1, 3, 10).unwrap();

        let bytes = workbook.save_to_buffer().unwrap();
        let err = parse_purchases(bytes, InputFormat::Spreadsheet).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(ref c) if c == CUSTOMER_ID_COLUMN));
    }

    #[test]
    fn test_aggregate_many_purchases_per_customer() {
        let records = parse_purchases(
            csv(&[
                "C2,2024-02-01 10:00:00,O1,10",
                "C1,2024-02-03 09:00:00,O2,1.5",
                "C2,2024-01-20,O3,20",
                "C1,2024-01-01,,2.5",
                "C2,2024-01-02,O5,30",
            ]),
            InputFormat::Csv,
        )
        .unwrap();
        let customers = aggregate(&records).unwrap();

        let ids: Vec<&str> = customers.keys().map(String::as_str).collect();
        assert_eq!(ids, ["C1", "C2"]);

        let c1 = &customers["C1"];
        assert_eq!((c1.recency_days, c1.frequency), (0, 2));
        assert!((c1.value - 4.0).abs() < 1e-9);

        // 1 day 23 hours before the reference
        let c2 = &customers["C2"];
        assert_eq!((c2.recency_days, c2.frequency), (1, 3));
        assert!((c2.value - 60.0).abs() < 1e-9);
    }
}
