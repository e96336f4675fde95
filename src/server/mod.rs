//! Analytics server module.
//!
//! Provides a REST API backed by DataFusion over a single Parquet-loaded
//! table named `data`.

pub mod executor;
pub mod export;
pub mod files;
pub mod filter;
pub mod routes;
pub mod store;

#[cfg(test)]
pub(crate) mod test_util;

pub use routes::{build_router, serve, AppState};
pub use store::{DataStore, TableSnapshot, TABLE_NAME};
