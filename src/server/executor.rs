//! Query execution against the current table snapshot.
//!
//! Builds DataFusion plans for counts, pages and distinct-value lookups and
//! converts results to JSON.

use crate::error::{ServerError, ServerResult};
use crate::server::filter::Predicate;
use crate::server::store::{DataStore, TableSnapshot};
use arrow::json::writer::{LineDelimited, WriterBuilder};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use datafusion::arrow::array::RecordBatch;
use datafusion::logical_expr::ident;
use datafusion::prelude::DataFrame;
use std::time::Instant;
use tracing::debug;

/// One page of rows
#[derive(Debug, serde::Serialize)]
pub struct Page {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
}

/// Snapshot DataFrame with the predicate applied
pub fn filtered_frame(
    store: &DataStore,
    snapshot: &TableSnapshot,
    predicate: &Predicate,
) -> ServerResult<DataFrame> {
    let df = store.frame(snapshot)?;
    match predicate.to_expr(&snapshot.schema()) {
        Some(expr) => Ok(df.filter(expr)?),
        None => Ok(df),
    }
}

/// Number of rows matching `predicate`
pub async fn total_count(
    store: &DataStore,
    snapshot: &TableSnapshot,
    predicate: &Predicate,
) -> ServerResult<usize> {
    if predicate.is_empty() {
        return Ok(snapshot.row_count());
    }
    let count = filtered_frame(store, snapshot, predicate)?.count().await?;
    debug!(predicate = %predicate, count, "filtered count");
    Ok(count)
}

/// Storage-ordered slice of matching rows
pub async fn page(
    store: &DataStore,
    snapshot: &TableSnapshot,
    predicate: &Predicate,
    limit: Option<usize>,
    offset: usize,
) -> ServerResult<Page> {
    let start = Instant::now();
    let df = filtered_frame(store, snapshot, predicate)?.limit(offset, limit)?;
    let batches = df.collect().await?;
    let rows = batches_to_json(&batches)?;

    debug!(
        predicate = %predicate,
        offset,
        limit = ?limit,
        rows = rows.len(),
        execution_ms = start.elapsed().as_millis() as u64,
        "page fetched"
    );

    Ok(Page {
        columns: snapshot.columns(),
        rows,
    })
}

/// Distinct non-null values of `column`, ascending, rendered as text
pub async fn distinct_values(
    store: &DataStore,
    snapshot: &TableSnapshot,
    column: &str,
) -> ServerResult<Vec<String>> {
    if snapshot.row_count() == 0 {
        return Err(ServerError::NoData("No data loaded".to_string()));
    }
    if !snapshot.has_column(column) {
        return Err(ServerError::ColumnNotFound(column.to_string()));
    }

    let df = store
        .frame(snapshot)?
        .select(vec![ident(column)])?
        .filter(ident(column).is_not_null())?
        .distinct()?
        .sort(vec![ident(column).sort(true, false)])?;
    let batches = df.collect().await?;

    let options = FormatOptions::default();
    let mut values = Vec::new();
    for batch in &batches {
        let array = batch.column(0);
        let formatter = ArrayFormatter::try_new(array.as_ref(), &options)?;
        values.extend((0..array.len()).map(|i| formatter.value(i).to_string()));
    }

    Ok(values)
}

/// Convert Arrow RecordBatches to JSON rows using Arrow's JSON writer.
///
/// Nulls are written explicitly so every row object carries every column.
fn batches_to_json(batches: &[RecordBatch]) -> ServerResult<Vec<serde_json::Value>> {
    if batches.is_empty() {
        return Ok(vec![]);
    }

    let mut buf = Vec::new();
    {
        let mut writer = WriterBuilder::new()
            .with_explicit_nulls(true)
            .build::<_, LineDelimited>(&mut buf);
        for batch in batches {
            writer.write(batch)?;
        }
        writer.finish()?;
    }

    let output = String::from_utf8_lossy(&buf);
    let rows: Vec<serde_json::Value> = output
        .lines()
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
