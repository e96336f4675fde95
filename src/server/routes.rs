//! Axum HTTP routes for the analytics API.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::server::store::DataStore;
use crate::server::{executor, export, files, filter};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Rows returned by the read endpoints when no limit is given
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

/// Shared application state
pub struct AppState {
    pub store: DataStore,
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: DataStore::open(),
            data_dir: data_dir.into(),
        }
    }
}

// ─── Route builder ───────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>, cors_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/files/parquet", get(list_parquet_files))
        .route("/load-parquet", post(load_parquet))
        .route("/data", get(get_data))
        .route("/data/filtered", get(get_filtered_data))
        .route("/data/columns/:column/values", get(column_values))
        .route("/export/csv", get(export_csv))
        .route("/export/excel", get(export_excel))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ─── Query parameters ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoadParams {
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Debug, Deserialize)]
struct FilteredParams {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    filters: Option<String>,
}

/// Map axum's plain-text rejection onto the `{detail}` error body
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> ServerResult<T> {
    query
        .map(|Query(params)| params)
        .map_err(|e| ServerError::InvalidParameter(e.body_text()))
}

// ─── Handlers ────────────────────────────────────────────────────

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Mint Analytics API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn list_parquet_files(
    State(state): State<Arc<AppState>>,
) -> ServerResult<impl IntoResponse> {
    let dir = state.data_dir.clone();
    let files = tokio::task::spawn_blocking(move || files::list_inputs(&dir))
        .await
        .map_err(|e| ServerError::Other(format!("File listing task failed: {e}")))??;

    Ok(Json(serde_json::json!({ "files": files })))
}

async fn load_parquet(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LoadParams>, QueryRejection>,
) -> ServerResult<impl IntoResponse> {
    let params = query_params(query)?;
    let snapshot = state
        .store
        .load(std::path::Path::new(&params.file_path))
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Parquet file loaded successfully",
        "rows": snapshot.row_count(),
    })))
}

async fn get_data(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PageParams>, QueryRejection>,
) -> ServerResult<impl IntoResponse> {
    let params = query_params(query)?;
    let snapshot = state.store.snapshot().await?;
    let predicate = filter::Predicate::default();

    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let page = executor::page(&state.store, &snapshot, &predicate, Some(limit), params.offset).await?;

    Ok(Json(serde_json::json!({
        "data": page.rows,
        "columns": page.columns,
        "total_rows": snapshot.row_count(),
    })))
}

async fn get_filtered_data(
    State(state): State<Arc<AppState>>,
    query: Result<Query<FilteredParams>, QueryRejection>,
) -> ServerResult<impl IntoResponse> {
    let params = query_params(query)?;
    let predicate = filter::compile(params.filters.as_deref())?;
    let snapshot = state.store.snapshot().await?;

    let filtered_rows = executor::total_count(&state.store, &snapshot, &predicate).await?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let page = executor::page(&state.store, &snapshot, &predicate, Some(limit), params.offset).await?;

    Ok(Json(serde_json::json!({
        "data": page.rows,
        "columns": page.columns,
        "total_rows": snapshot.row_count(),
        "filtered_rows": filtered_rows,
        "filters_applied": predicate.applied(),
    })))
}

async fn column_values(
    State(state): State<Arc<AppState>>,
    Path(column): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let snapshot = state.store.snapshot().await?;
    let values = executor::distinct_values(&state.store, &snapshot, &column).await?;

    Ok(Json(serde_json::json!({
        "column": column,
        "count": values.len(),
        "values": values,
    })))
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    query: Result<Query<FilteredParams>, QueryRejection>,
) -> ServerResult<Response> {
    let params = query_params(query)?;
    let predicate = filter::compile(params.filters.as_deref())?;
    let snapshot = state.store.snapshot().await?;

    export::csv_export(&state.store, &snapshot, &predicate, params.limit, params.offset).await
}

async fn export_excel(
    State(state): State<Arc<AppState>>,
    query: Result<Query<FilteredParams>, QueryRejection>,
) -> ServerResult<Response> {
    let params = query_params(query)?;
    let predicate = filter::compile(params.filters.as_deref())?;
    let snapshot = state.store.snapshot().await?;

    export::excel_export(&state.store, &snapshot, &predicate, params.limit, params.offset).await
}

// ─── Server startup ──────────────────────────────────────────────

/// Start the analytics server
pub async fn serve(config: &ServerConfig) -> Result<(), ServerError> {
    let state = Arc::new(AppState::new(&config.data_dir));

    if !config.data_dir.is_dir() {
        warn!(
            data_dir = %config.data_dir.display(),
            "Data directory does not exist; /files/parquet will be empty"
        );
    }

    let router = build_router(state.clone(), config.cors_origin.clone());

    info!(addr = %config.addr, data_dir = %config.data_dir.display(), "Analytics server listening");
    info!("API endpoints:");
    info!("  GET  /health");
    info!("  GET  /files/parquet");
    info!("  POST /load-parquet?file_path=");
    info!("  GET  /data, /data/filtered, /data/columns/:column/values");
    info!("  GET  /export/csv, /export/excel");

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.store.close().await;
    served?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down gracefully..."),
        Err(e) => {
            warn!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    }
}
