//! mint-analytics - Parquet exploration over HTTP
//!
//! Loads one Parquet file at a time into an embedded DataFusion engine and
//! serves paginated reads, equality filters, distinct-value lookups and
//! CSV/Excel exports over a small JSON API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      HTTP clients                            │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 axum router (server::routes)                 │
//! │   /files/parquet   /load-parquet   /data*   /export/*        │
//! └───────┬──────────────────┬───────────────────┬───────────────┘
//!         │                  │                   │
//!         ▼                  ▼                   ▼
//!  ┌─────────────┐   ┌───────────────┐   ┌──────────────────────┐
//!  │ File lister │   │    Loader     │   │ Filter compiler      │
//!  │ (data dir)  │   │ read_parquet  │   │ JSON → IN predicates │
//!  └─────────────┘   └───────┬───────┘   └──────────┬───────────┘
//!                            │ swap Arc             │
//!                            ▼                      ▼
//!                 ┌───────────────────────────────────────────┐
//!                 │ DataStore: SessionContext + TableSnapshot │
//!                 │   executor (count/page/distinct)          │
//!                 │   export (CSV stream / XLSX)              │
//!                 └───────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! mint-analytics --data-dir ./data --port 8000
//! curl -X POST 'http://localhost:8000/load-parquet?file_path=data/sales.parquet'
//! curl 'http://localhost:8000/data/filtered?filters={"region":["North"]}&limit=10'
//! ```

pub mod config;
pub mod error;
pub mod server;

pub use config::{CliArgs, ServerConfig};
pub use error::{ConfigError, ServerError};
