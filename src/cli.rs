//! CLI argument parsing for phasemeter

use crate::config::ReportFormat;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Report format as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::Csv => ReportFormat::Csv,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "phasemeter")]
#[command(version)]
#[command(about = "Attribute shared-machine resource usage to execution phases", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output (to stderr)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run resource attribution over a scenario file and report the result
    Attribute {
        /// Scenario file (TOML, or JSON with a .json extension)
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Attribution config file (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output format, overriding the config file
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Worker threads, overriding the config file
        #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
        workers: Option<u16>,

        /// Persist the attribution result to FILE
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,

        /// List mapped metrics that are not attributed
        #[arg(long)]
        include_unused: bool,
    },

    /// Report a persisted attribution result against its scenario
    Inspect {
        /// Scenario the result was computed from
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Result file written by `attribute --save`
        #[arg(value_name = "RESULT")]
        result: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// List mapped metrics that are not attributed
        #[arg(long)]
        include_unused: bool,
    },

    /// Summarize per-host utilization from resource monitor output
    Monitor {
        /// Directory containing proc-stat-*, proc-net-dev-* and proc-diskstats-* files
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Print the full parsed series as JSON
        #[arg(long)]
        json: bool,
    },
}
