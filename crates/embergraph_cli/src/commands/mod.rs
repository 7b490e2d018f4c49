//! CLI command implementations.

pub mod log;
pub mod smoke;
pub mod status;

use embergraph_core::{Config, CoreError, GraphDatabase};
use embergraph_storage::MemorySink;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A `--param` argument without `=`.
    #[error("invalid parameter `{0}`, expected key=value")]
    InvalidParam(String),

    /// A command that needs a store directory was run without `--path`.
    #[error("store path required for {0}")]
    PathRequired(&'static str),

    /// Unknown output format.
    #[error("unknown output format `{0}`, expected text or json")]
    UnknownFormat(String),

    /// A smoke check did not hold.
    #[error("smoke check failed: {0}")]
    CheckFailed(String),

    /// Kernel error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// JSON output error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable.
    Text,
    /// One JSON document.
    Json,
}

impl Format {
    /// Parses `text` or `json`.
    pub fn parse(value: &str) -> CliResult<Self> {
        match value {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// Options shared by every command that boots a kernel.
#[derive(Debug, Clone, Default)]
pub struct KernelOptions {
    /// Store directory; `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Raw `key=value` parameters.
    pub params: Vec<String>,
    /// Forces read-only mode.
    pub read_only: bool,
}

impl KernelOptions {
    /// Builds the kernel configuration.
    pub fn config(&self) -> CliResult<Config> {
        let params = parse_params(&self.params)?;
        let store_dir = self.path.clone().unwrap_or_else(|| PathBuf::from(":memory:"));
        let mut config = Config::from_params(store_dir, params);
        if self.read_only {
            config = config.read_only(true);
        }
        Ok(config)
    }

    /// Starts a kernel.
    pub fn open(&self) -> CliResult<GraphDatabase> {
        let config = self.config()?;
        let db = match self.path {
            Some(_) => GraphDatabase::open(config)?,
            None => GraphDatabase::builder(config)
                .with_log_sink(MemorySink::new())
                .open()?,
        };
        Ok(db)
    }
}

/// Splits `key=value` arguments into a parameter map.
pub fn parse_params(raw: &[String]) -> CliResult<BTreeMap<String, String>> {
    raw.iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| CliError::InvalidParam(entry.clone()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::InvalidParam(entry.clone()));
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Prints `report` as JSON, or through `text` otherwise.
pub fn emit<T: Serialize>(format: Format, report: &T, text: impl FnOnce(&T)) -> CliResult<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
        Format::Text => text(report),
    }
    Ok(())
}
