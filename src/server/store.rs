//! DataFusion session and the swappable `data` table.
//!
//! The store owns one in-memory `SessionContext` for the lifetime of the
//! process. Loading a Parquet file materializes it into an immutable
//! [`TableSnapshot`]; publishing a load swaps the `Arc` under a short write
//! lock, so a reader holding a snapshot never sees a half-replaced table.

use crate::error::{ServerError, ServerResult};
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::datasource::MemTable;
use datafusion::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Name of the singleton table
pub const TABLE_NAME: &str = "data";

/// Immutable view of one loaded file
pub struct TableSnapshot {
    version: u64,
    source: PathBuf,
    schema: SchemaRef,
    table: Arc<MemTable>,
    row_count: usize,
}

impl TableSnapshot {
    /// Load generation, starting at 1 for the first successful load
    pub fn version(&self) -> u64 {
        self.version
    }

    /// File the snapshot was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Column names in table order
    pub fn columns(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema.fields().iter().any(|f| f.name() == name)
    }
}

/// Process-wide handle to the embedded engine
pub struct DataStore {
    ctx: SessionContext,
    current: RwLock<Option<Arc<TableSnapshot>>>,
    /// Serializes loads; readers never wait on it
    load_gate: Mutex<()>,
    next_version: AtomicU64,
    closed: AtomicBool,
}

impl DataStore {
    /// Create the in-memory session.
    ///
    /// A single target partition keeps scans, filters and limits in
    /// storage order.
    pub fn open() -> Self {
        let config = SessionConfig::new()
            .with_target_partitions(1)
            .with_information_schema(false);
        let ctx = SessionContext::new_with_config(config);
        debug!("DataFusion session opened");

        Self {
            ctx,
            current: RwLock::new(None),
            load_gate: Mutex::new(()),
            next_version: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Drop the loaded table and refuse further work. Closing twice is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.current.write().await.take();
        info!(
            had_table = dropped.is_some(),
            "Data store closed"
        );
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Current snapshot of the `data` table
    pub async fn snapshot(&self) -> ServerResult<Arc<TableSnapshot>> {
        if !self.is_open() {
            return Err(ServerError::StoreClosed);
        }
        self.current
            .read()
            .await
            .clone()
            .ok_or(ServerError::NoDataset)
    }

    /// Unfiltered DataFrame over a snapshot
    pub fn frame(&self, snapshot: &TableSnapshot) -> ServerResult<DataFrame> {
        Ok(self.ctx.read_table(snapshot.table.clone())?)
    }

    /// Replace the `data` table with the full contents of `path`.
    ///
    /// The previous snapshot stays published until the new one is fully
    /// materialized and counted, so a failed load changes nothing.
    pub async fn load(&self, path: &Path) -> ServerResult<Arc<TableSnapshot>> {
        if !self.is_open() {
            return Err(ServerError::StoreClosed);
        }
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ServerError::FileNotFound(path.to_path_buf()));
        }

        let _gate = self.load_gate.lock().await;
        let started = Instant::now();

        // Single-file reads are checked against the configured extension,
        // so pass the file's own one through.
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let options = ParquetReadOptions {
            file_extension: &extension,
            ..Default::default()
        };

        let path_str = path.to_string_lossy().to_string();
        let df = self.ctx.read_parquet(path_str.as_str(), options).await?;
        let declared: SchemaRef = Arc::new(df.schema().as_arrow().clone());
        let batches = df.collect().await?;
        let schema = batches
            .first()
            .map(|b| b.schema())
            .unwrap_or(declared);

        let table = Arc::new(MemTable::try_new(schema.clone(), vec![batches])?);
        let row_count = self.ctx.read_table(table.clone())?.count().await?;

        let snapshot = Arc::new(TableSnapshot {
            version: self.next_version.fetch_add(1, Ordering::SeqCst),
            source: path.to_path_buf(),
            schema,
            table,
            row_count,
        });

        *self.current.write().await = Some(snapshot.clone());

        info!(
            table = TABLE_NAME,
            path = %path.display(),
            rows = row_count,
            columns = snapshot.schema.fields().len(),
            version = snapshot.version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Parquet file loaded"
        );

        Ok(snapshot)
    }
}

impl std::fmt::Debug for TableSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSnapshot")
            .field("version", &self.version)
            .field("source", &self.source)
            .field("columns", &self.columns())
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("closed", &self.closed)
            .field("next_version", &self.next_version)
            .finish_non_exhaustive()
    }
}
