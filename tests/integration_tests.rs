//! Integration tests for mint-analytics
//!
//! Drive the full axum router in-process against Parquet fixtures written
//! to temporary directories.

use arrow::array::{Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::Router;
use mint_analytics::server::{build_router, AppState};
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const REGIONS: [&str; 4] = ["North", "South", "East", "West"];

/// `n` rows of `(order_id, region, customer)`; every tenth region is null
/// and every fourth customer is `O'Brien`.
fn orders(n: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("order_id", DataType::Int64, false),
        Field::new("region", DataType::Utf8, true),
        Field::new("customer", DataType::Utf8, false),
    ]));
    let regions: Vec<Option<&str>> = (0..n)
        .map(|i| (i % 10 != 9).then(|| REGIONS[i % REGIONS.len()]))
        .collect();
    let customers: Vec<String> = (0..n)
        .map(|i| if i % 4 == 0 { "O'Brien".to_string() } else { format!("c{i}") })
        .collect();

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from((0..n as i64).collect::<Vec<_>>())),
            Arc::new(StringArray::from(regions)),
            Arc::new(StringArray::from(customers)),
        ],
    )
    .unwrap()
}

fn write_parquet(path: &Path, batch: &RecordBatch) {
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}

fn create_test_app(data_dir: &Path) -> Router {
    let state = Arc::new(AppState::new(data_dir));
    build_router(state, HeaderValue::from_static("http://localhost:3000"))
}

/// App with `orders(n)` loaded from `<dir>/orders.parquet`
async fn loaded_app(n: usize) -> (TempDir, Router) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("orders.parquet");
    write_parquet(&path, &orders(n));
    let app = create_test_app(dir.path());

    let (status, body) = send(&app, "POST", &format!("/load-parquet?file_path={}", path.display())).await;
    assert_eq!(status, StatusCode::OK, "load failed: {body}");
    assert_eq!(body["rows"], n);
    (dir, app)
}

async fn request(app: &Router, method: &str, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = request(app, method, uri).await;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn encode(filters: &str) -> String {
    filters
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

#[tokio::test]
async fn test_root_and_health() {
    let dir = tempdir().unwrap();
    let app = create_test_app(dir.path());

    let (status, body) = send(&app, "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Mint Analytics API");

    let (status, body) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_data_before_load_is_internal_error() {
    let dir = tempdir().unwrap();
    let app = create_test_app(dir.path());

    for uri in ["/data", "/data/filtered", "/data/columns/region/values", "/export/csv"] {
        let (status, body) = send(&app, "GET", uri).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert!(body["detail"].as_str().unwrap().contains("data"));
    }
}

#[tokio::test]
async fn test_load_then_read() {
    let (_dir, app) = loaded_app(100).await;

    let (status, body) = send(&app, "GET", "/data?limit=5&offset=20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_rows"], 100);
    assert_eq!(body["columns"], serde_json::json!(["order_id", "region", "customer"]));

    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0]["order_id"], 20);
    assert_eq!(rows[4]["order_id"], 24);
}

#[tokio::test]
async fn test_data_default_limit() {
    let (_dir, app) = loaded_app(1_200).await;
    let (_, body) = send(&app, "GET", "/data").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1000);
    assert_eq!(body["total_rows"], 1_200);
}

#[tokio::test]
async fn test_load_missing_file_keeps_table() {
    let (dir, app) = loaded_app(40).await;
    let missing = dir.path().join("missing.parquet");

    let (status, body) = send(&app, "POST", &format!("/load-parquet?file_path={}", missing.display())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "File not found");

    let (_, body) = send(&app, "GET", "/data?limit=1").await;
    assert_eq!(body["total_rows"], 40);
}

#[tokio::test]
async fn test_load_invalid_parquet_is_internal_error() {
    let dir = tempdir().unwrap();
    let bad = dir.path().join("bad.parquet");
    std::fs::write(&bad, b"PAR1 but not really").unwrap();
    let app = create_test_app(dir.path());

    let (status, body) = send(&app, "POST", &format!("/load-parquet?file_path={}", bad.display())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_load_requires_file_path() {
    let dir = tempdir().unwrap();
    let app = create_test_app(dir.path());
    let (status, body) = send(&app, "POST", "/load-parquet").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_filtered_by_region() {
    let (_dir, app) = loaded_app(100).await;
    let filters = encode(r#"{"region": ["North", "South"]}"#);

    let (status, body) = send(&app, "GET", &format!("/data/filtered?filters={filters}&limit=1000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_rows"], 100);

    let rows = body["data"].as_array().unwrap();
    assert_eq!(body["filtered_rows"], rows.len());
    assert!(!rows.is_empty());
    for row in rows {
        let region = row["region"].as_str().unwrap();
        assert!(region == "North" || region == "South", "unexpected {region}");
    }
    assert_eq!(
        body["filters_applied"],
        serde_json::json!({"region": ["North", "South"]})
    );
}

#[tokio::test]
async fn test_empty_filter_returns_all_rows() {
    let (_dir, app) = loaded_app(30).await;
    let (status, body) = send(&app, "GET", &format!("/data/filtered?filters={}", encode("{}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filtered_rows"], 30);
    assert_eq!(body["data"].as_array().unwrap().len(), 30);
}

#[tokio::test]
async fn test_filter_value_with_quote() {
    let (_dir, app) = loaded_app(20).await;
    let filters = encode(r#"{"customer": ["O'Brien"]}"#);

    let (status, body) = send(&app, "GET", &format!("/data/filtered?filters={filters}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filtered_rows"], 5);
    for row in body["data"].as_array().unwrap() {
        assert_eq!(row["customer"], "O'Brien");
    }
}

#[tokio::test]
async fn test_integer_filter_accepts_any_numeric_spelling() {
    let (_dir, app) = loaded_app(20).await;
    let filters = encode(r#"{"order_id": ["3", 4, "5.0"]}"#);

    let (status, body) = send(&app, "GET", &format!("/data/filtered?filters={filters}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filtered_rows"], 3);
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["order_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 4, 5]);
}

#[tokio::test]
async fn test_malformed_filter_is_bad_request() {
    let (_dir, app) = loaded_app(5).await;
    let (status, body) = send(&app, "GET", &format!("/data/filtered?filters={}", encode("{region"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "invalid filter format");
}

#[tokio::test]
async fn test_unknown_filter_column_is_internal_error() {
    let (_dir, app) = loaded_app(5).await;
    let filters = encode(r#"{"no_such_column": ["x"]}"#);
    let (status, _) = send(&app, "GET", &format!("/data/filtered?filters={filters}")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_non_numeric_limit_is_bad_request() {
    let (_dir, app) = loaded_app(5).await;
    let (status, body) = send(&app, "GET", "/data?limit=ten").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_column_values_excludes_nulls() {
    let (_dir, app) = loaded_app(50).await;
    let (status, body) = send(&app, "GET", "/data/columns/region/values").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["column"], "region");
    assert_eq!(body["values"], serde_json::json!(["East", "North", "South", "West"]));
    assert_eq!(body["count"], 4);
}

#[tokio::test]
async fn test_column_values_unknown_column() {
    let (_dir, app) = loaded_app(5).await;
    let (status, body) = send(&app, "GET", "/data/columns/nope/values").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_column_values_empty_table() {
    let (_dir, app) = loaded_app(0).await;
    let (status, _) = send(&app, "GET", "/data/columns/region/values").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_csv_export_with_limit() {
    let (_dir, app) = loaded_app(100).await;
    let response = request(&app, "GET", "/export/csv?limit=10").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=data_export_10_rows.csv"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[0], "order_id,region,customer");
    assert!(lines[1].starts_with("0,North,"));
    assert!(lines[10].starts_with("9,,"));
}

#[tokio::test]
async fn test_csv_export_filtered_with_offset() {
    let (_dir, app) = loaded_app(100).await;
    let filters = encode(r#"{"region": ["East"]}"#);
    let response = request(&app, "GET", &format!("/export/csv?offset=5&filters={filters}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let data_rows: Vec<&str> = text.lines().skip(1).collect();

    assert!(data_rows.iter().all(|line| line.contains(",East,")));
    assert_eq!(
        disposition,
        format!("attachment; filename=data_export_{}_rows.csv", data_rows.len())
    );
}

#[tokio::test]
async fn test_csv_export_no_matches_is_not_found() {
    let (_dir, app) = loaded_app(10).await;
    let filters = encode(r#"{"region": ["Atlantis"]}"#);
    let (status, body) = send(&app, "GET", &format!("/export/csv?filters={filters}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "No data found to export");
}

#[cfg(feature = "excel")]
#[tokio::test]
async fn test_excel_export() {
    let (_dir, app) = loaded_app(60).await;
    let response = request(&app, "GET", "/export/excel?limit=25").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=data_export_25_rows.xlsx"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let mut workbook: calamine::Xlsx<_> =
        calamine::open_workbook_from_rs(std::io::Cursor::new(body.to_vec())).unwrap();
    let sheet = calamine::Reader::worksheet_range(&mut workbook, "Data").unwrap();
    assert_eq!(sheet.get_value((0, 0)).unwrap().to_string(), "order_id");
    // Header plus 25 data rows
    assert_eq!(sheet.end(), Some((25, 2)));
}

#[cfg(not(feature = "excel"))]
#[tokio::test]
async fn test_excel_export_unavailable() {
    let (_dir, app) = loaded_app(5).await;
    let (status, _) = send(&app, "GET", "/export/excel").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_list_parquet_files() {
    let dir = tempdir().unwrap();
    write_parquet(&dir.path().join("a.parquet"), &orders(3));
    std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();
    let app = create_test_app(dir.path());

    let (status, body) = send(&app, "GET", "/files/parquet").await;
    assert_eq!(status, StatusCode::OK);
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], "a.parquet");
    assert_eq!(files[0]["relative_path"], "a.parquet");
    assert!(files[0]["size"].as_u64().unwrap() > 0);
    assert!(files[0]["modified"].is_string());
}

#[tokio::test]
async fn test_list_parquet_files_missing_dir() {
    let dir = tempdir().unwrap();
    let app = create_test_app(&dir.path().join("does-not-exist"));
    let (status, body) = send(&app, "GET", "/files/parquet").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"], serde_json::json!([]));
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let dir = tempdir().unwrap();
    let app = create_test_app(dir.path());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
}
