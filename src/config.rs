//! Configuration types for mint-analytics
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros (with env fallbacks)
//! - Runtime configuration with validation

use crate::error::ConfigError;
use axum::http::HeaderValue;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Default directory scanned for Parquet inputs
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default browser origin allowed by CORS
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Parquet analytics API server
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mint-analytics",
    version,
    about = "Load a Parquet file into an embedded DataFusion engine and serve it over HTTP",
    long_about = "Serves paginated and filtered reads over a single in-memory table named \
                  'data', plus CSV and Excel exports.\n\n\
                  The table is replaced wholesale each time a file is loaded via \
                  POST /load-parquet.",
    after_help = "EXAMPLES:\n    \
        mint-analytics\n    \
        mint-analytics --data-dir /srv/parquet --port 9000\n    \
        PARQUET_DATA_DIR=./exports mint-analytics -v"
)]
pub struct CliArgs {
    /// Directory listed by GET /files/parquet
    #[arg(long, env = "PARQUET_DATA_DIR", default_value = DEFAULT_DATA_DIR, value_name = "DIR")]
    pub data_dir: PathBuf,

    /// Bind address
    #[arg(long, env = "MINT_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, env = "MINT_PORT", default_value = "8000")]
    pub port: u16,

    /// Single origin allowed to make cross-origin requests
    #[arg(long, env = "MINT_CORS_ORIGIN", default_value = DEFAULT_CORS_ORIGIN, value_name = "ORIGIN")]
    pub cors_origin: String,

    /// Verbose output (debug-level logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory scanned for input files
    pub data_dir: PathBuf,

    /// Socket address to listen on
    pub addr: SocketAddr,

    /// Allowed CORS origin
    pub cors_origin: HeaderValue,

    /// Verbose logging
    pub verbose: bool,
}

impl ServerConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.port == 0 {
            return Err(ConfigError::InvalidPort(args.port));
        }

        let ip: IpAddr = args
            .bind
            .trim()
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidBindAddress {
                addr: args.bind.clone(),
                reason: e.to_string(),
            })?;

        let cors_origin = HeaderValue::from_str(args.cors_origin.trim()).map_err(|e| {
            ConfigError::InvalidCorsOrigin {
                origin: args.cors_origin.clone(),
                reason: e.to_string(),
            }
        })?;

        // A missing directory is fine (the lister reports no files), but a
        // regular file in its place is a misconfiguration.
        if args.data_dir.exists() && !args.data_dir.is_dir() {
            return Err(ConfigError::InvalidDataDir {
                path: args.data_dir.clone(),
                reason: "not a directory".to_string(),
            });
        }

        Ok(Self {
            data_dir: args.data_dir,
            addr: SocketAddr::new(ip, args.port),
            cors_origin,
            verbose: args.verbose,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            cors_origin: HeaderValue::from_static(DEFAULT_CORS_ORIGIN),
            verbose: false,
        }
    }
}
