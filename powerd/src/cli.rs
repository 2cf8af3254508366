//! Command-line entry point for the controller binary.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "powerd", about = "Runtime power/frequency control core")]
pub struct Cli {
    /// Path to a TOML configuration file. Falls back to `POWERD_CONFIG`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides the configured tick period in seconds.
    #[arg(long)]
    pub period: Option<f64>,

    /// Overrides the configured trace output path.
    #[arg(long)]
    pub trace_path: Option<PathBuf>,

    /// Overrides the configured report output path.
    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

impl Cli {
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| std::env::var_os("POWERD_CONFIG").map(PathBuf::from))
    }
}
