//! Run configuration for `phasemeter attribute`
//!
//! Loaded from TOML; every field is optional in the file and falls back to
//! [`AttributionConfig::default`]. Command-line flags override file values.
//!
//! ```toml
//! worker_threads = 4
//! output_format = "json"
//! include_unused = true
//! precision = 2
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output format of attribution reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable table (default)
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
    /// CSV, one row per phase and metric
    Csv,
}

/// Configuration of an attribution run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttributionConfig {
    /// Threads used to build phase results
    ///
    /// Default: available parallelism of the host, `1` if unknown
    pub worker_threads: usize,

    /// Report format
    pub output_format: ReportFormat,

    /// List mapped metrics whose rule is `None` in reports
    pub include_unused: bool,

    /// Decimal places in text reports
    pub precision: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            output_format: ReportFormat::Text,
            include_unused: false,
            precision: 3,
        }
    }
}

impl AttributionConfig {
    /// Single-threaded configuration, useful for reproducible logs
    pub fn sequential() -> Self {
        Self {
            worker_threads: 1,
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Invalid attribution config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("In config file {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            anyhow::bail!("worker_threads must be at least 1");
        }
        Ok(())
    }
}
