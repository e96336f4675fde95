//! Parquet fixtures shared by the server unit tests.

use arrow::array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub const REGIONS: [&str; 5] = ["North", "South", "East", "West", "Central"];

/// `n` rows of `(id, region, customer, amount)`.
///
/// Every seventh row has a null region; every fifth customer is `O'Brien`.
pub fn sales_batch(n: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("region", DataType::Utf8, true),
        Field::new("customer", DataType::Utf8, false),
        Field::new("amount", DataType::Float64, true),
    ]));

    let ids: Vec<i64> = (0..n as i64).collect();
    let regions: Vec<Option<&str>> = (0..n)
        .map(|i| (i % 7 != 6).then(|| REGIONS[i % REGIONS.len()]))
        .collect();
    let customers: Vec<String> = (0..n)
        .map(|i| {
            if i % 5 == 0 {
                "O'Brien".to_string()
            } else {
                format!("customer_{i}")
            }
        })
        .collect();
    let amounts: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64 * 1.5)).collect();

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(regions)),
            Arc::new(StringArray::from(customers)),
            Arc::new(Float64Array::from(amounts)),
        ],
    )
    .unwrap()
}

pub fn write_parquet(path: &Path, batch: &RecordBatch) {
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}
