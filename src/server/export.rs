//! CSV and Excel exports of the (optionally filtered) `data` table.
//!
//! Both formats share the count/fail-fast/window logic; they differ in row
//! ceiling and encoding. CSV is streamed batch by batch straight off the
//! engine. The workbook is assembled on the blocking pool and sent whole.

use crate::error::{ServerError, ServerResult};
use crate::server::executor;
use crate::server::filter::Predicate;
use crate::server::store::{DataStore, TableSnapshot};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Schema};
use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::Response;
use datafusion::arrow::array::RecordBatch;
use datafusion::prelude::DataFrame;
use futures::{stream, StreamExt};
use tracing::info;

/// Spreadsheet row limit (1,048,576) minus the header row
pub const EXCEL_MAX_ROWS: usize = 1_048_575;

/// Widest column the workbook will use, in character units
pub const MAX_COLUMN_WIDTH: usize = 50;

const MIN_COLUMN_WIDTH: usize = 10;

/// Export wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "xlsx",
        }
    }

    /// Structural row limit of the format, if any
    pub fn row_ceiling(self) -> Option<usize> {
        match self {
            Self::Csv => None,
            Self::Excel => Some(EXCEL_MAX_ROWS),
        }
    }
}

/// Rows an export will contain.
///
/// `limit` if given, else everything after `offset`; never more than what
/// remains after `offset`, and never more than `ceiling`.
pub fn export_row_count(
    total: usize,
    limit: Option<usize>,
    offset: usize,
    ceiling: Option<usize>,
) -> usize {
    let remaining = total.saturating_sub(offset);
    let rows = limit.map_or(remaining, |l| l.min(remaining));
    ceiling.map_or(rows, |c| rows.min(c))
}

pub fn export_filename(format: ExportFormat, rows: usize) -> String {
    format!("data_export_{}_rows.{}", rows, format.extension())
}

/// Count, fail on no match, then window the filtered frame
async fn plan_export(
    store: &DataStore,
    snapshot: &TableSnapshot,
    predicate: &Predicate,
    limit: Option<usize>,
    offset: usize,
    format: ExportFormat,
) -> ServerResult<(DataFrame, usize)> {
    let total = executor::total_count(store, snapshot, predicate).await?;
    if total == 0 {
        return Err(ServerError::NoData("No data found to export".to_string()));
    }

    let rows = export_row_count(total, limit, offset, format.row_ceiling());
    let df = executor::filtered_frame(store, snapshot, predicate)?.limit(offset, Some(rows))?;

    info!(
        format = format.extension(),
        predicate = %predicate,
        matched = total,
        offset,
        rows,
        "export planned"
    );
    Ok((df, rows))
}

fn attachment(format: ExportFormat, rows: usize, body: Body) -> ServerResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.media_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", export_filename(format, rows)),
        )
        .body(body)
        .map_err(|e| ServerError::Other(format!("Failed to build export response: {e}")))
}

// ─── CSV ─────────────────────────────────────────────────────────

/// Stream the header row followed by the windowed rows as CSV
pub async fn csv_export(
    store: &DataStore,
    snapshot: &TableSnapshot,
    predicate: &Predicate,
    limit: Option<usize>,
    offset: usize,
) -> ServerResult<Response> {
    ensure_csv_supported(&snapshot.schema())?;
    let (df, rows) = plan_export(store, snapshot, predicate, limit, offset, ExportFormat::Csv).await?;

    let header = csv_header(&snapshot.schema())?;
    let batches = df.execute_stream().await?;

    let body = stream::once(async move { Ok::<_, ServerError>(header) }).chain(batches.map(
        |batch| {
            let batch = batch?;
            encode_csv_rows(&batch)
        },
    ));

    attachment(ExportFormat::Csv, rows, Body::from_stream(body))
}

/// Reject column types the Arrow CSV writer cannot encode before the
/// response starts streaming.
fn ensure_csv_supported(schema: &Schema) -> ServerResult<()> {
    for field in schema.fields() {
        let nested = matches!(
            field.data_type(),
            DataType::List(_)
                | DataType::LargeList(_)
                | DataType::FixedSizeList(_, _)
                | DataType::Struct(_)
                | DataType::Map(_, _)
                | DataType::Union(_, _)
        );
        if nested {
            return Err(ServerError::Other(format!(
                "CSV export does not support column '{}' of type {}",
                field.name(),
                field.data_type()
            )));
        }
    }
    Ok(())
}

fn csv_header(schema: &Schema) -> ServerResult<Bytes> {
    let empty = RecordBatch::new_empty(std::sync::Arc::new(schema.clone()));
    let mut buf = Vec::new();
    {
        let mut writer = WriterBuilder::new().with_header(true).build(&mut buf);
        writer.write(&empty)?;
    }
    Ok(Bytes::from(buf))
}

fn encode_csv_rows(batch: &RecordBatch) -> ServerResult<Bytes> {
    let mut buf = Vec::new();
    {
        let mut writer = WriterBuilder::new().with_header(false).build(&mut buf);
        writer.write(batch)?;
    }
    Ok(Bytes::from(buf))
}

// ─── Excel ───────────────────────────────────────────────────────

/// Sheet holding the exported rows
pub const SHEET_NAME: &str = "Data";

/// Build a workbook of the windowed rows, capped at [`EXCEL_MAX_ROWS`]
#[cfg(feature = "excel")]
pub async fn excel_export(
    store: &DataStore,
    snapshot: &TableSnapshot,
    predicate: &Predicate,
    limit: Option<usize>,
    offset: usize,
) -> ServerResult<Response> {
    let (df, rows) =
        plan_export(store, snapshot, predicate, limit, offset, ExportFormat::Excel).await?;
    let batches = df.collect().await?;
    let columns = snapshot.columns();

    let bytes = tokio::task::spawn_blocking(move || xlsx::write_workbook(&columns, &batches))
        .await
        .map_err(|e| ServerError::Other(format!("Excel export task failed: {e}")))??;

    attachment(ExportFormat::Excel, rows, Body::from(bytes))
}

#[cfg(not(feature = "excel"))]
pub async fn excel_export(
    _store: &DataStore,
    _snapshot: &TableSnapshot,
    _predicate: &Predicate,
    _limit: Option<usize>,
    _offset: usize,
) -> ServerResult<Response> {
    Err(ServerError::ExportUnavailable("Excel"))
}

/// Display width for a column, from its header text
pub fn column_width(header: &str) -> usize {
    (header.chars().count() + 2).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
}

#[cfg(feature = "excel")]
mod xlsx {
    use super::{column_width, SHEET_NAME};
    use crate::error::ServerResult;
    use arrow::array::{Array, AsArray};
    use arrow::compute::cast;
    use arrow::datatypes::DataType;
    use arrow::util::display::{ArrayFormatter, FormatOptions};
    use datafusion::arrow::array::RecordBatch;
    use rust_xlsxwriter::{Color, Format, Workbook, Worksheet};

    const HEADER_FILL: u32 = 0xD9D9D9;

    pub(super) fn write_workbook(columns: &[String], batches: &[RecordBatch]) -> ServerResult<Vec<u8>> {
        let mut workbook = Workbook::new();
        let header_format = Format::new()
            .set_bold()
            .set_background_color(Color::RGB(HEADER_FILL));

        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;

        for (col, name) in columns.iter().enumerate() {
            let col = col as u16;
            sheet.write_string_with_format(0, col, name, &header_format)?;
            sheet.set_column_width(col, column_width(name) as f64)?;
        }

        let mut row: u32 = 1;
        for batch in batches {
            for (col, array) in batch.columns().iter().enumerate() {
                write_column(sheet, row, col as u16, array.as_ref())?;
            }
            row += batch.num_rows() as u32;
        }

        Ok(workbook.save_to_buffer()?)
    }

    /// Significant digits a spreadsheet number cell keeps
    const CELL_PRECISION: usize = 15;

    /// Write one column of a batch starting at `first_row`; nulls stay empty.
    ///
    /// Integers and decimals with more than [`CELL_PRECISION`] significant
    /// digits are written as text so no digits are lost.
    fn write_column(
        sheet: &mut Worksheet,
        first_row: u32,
        col: u16,
        array: &dyn Array,
    ) -> ServerResult<()> {
        let data_type = array.data_type();
        let options = FormatOptions::default();

        if data_type.is_floating() {
            let floats = cast(array, &DataType::Float64)?;
            let floats = floats.as_primitive::<arrow::datatypes::Float64Type>();
            for i in 0..floats.len() {
                if floats.is_null(i) {
                    continue;
                }
                let value = floats.value(i);
                let row = first_row + i as u32;
                if value.is_finite() {
                    sheet.write_number(row, col, value)?;
                } else {
                    sheet.write_string(row, col, value.to_string())?;
                }
            }
            return Ok(());
        }

        if data_type.is_numeric() {
            let formatter = ArrayFormatter::try_new(array, &options)?;
            for i in 0..array.len() {
                if array.is_null(i) {
                    continue;
                }
                let text = formatter.value(i).to_string();
                let row = first_row + i as u32;
                match exact_number(&text) {
                    Some(value) => sheet.write_number(row, col, value)?,
                    None => sheet.write_string(row, col, text)?,
                };
            }
            return Ok(());
        }

        if let DataType::Boolean = data_type {
            let bools = array.as_boolean();
            for i in 0..bools.len() {
                if !bools.is_null(i) {
                    sheet.write_boolean(first_row + i as u32, col, bools.value(i))?;
                }
            }
            return Ok(());
        }

        let formatter = ArrayFormatter::try_new(array, &options)?;
        for i in 0..array.len() {
            if !array.is_null(i) {
                sheet.write_string(first_row + i as u32, col, formatter.value(i).to_string())?;
            }
        }
        Ok(())
    }

    /// Plain decimal text as a number, if a cell can hold it exactly
    pub(super) fn exact_number(text: &str) -> Option<f64> {
        let unsigned = text.strip_prefix('-').unwrap_or(text);
        let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let digits = format!("{whole}{}", fraction.trim_end_matches('0'));
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if digits.trim_start_matches('0').len() > CELL_PRECISION {
            return None;
        }
        text.parse().ok()
    }
}
