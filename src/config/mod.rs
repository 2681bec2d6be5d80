pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::domain::model::ParcelRequest;
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "parcel-dxf")]
#[command(about = "Builds a georeferenced DXF drawing for a cadastral parcel")]
pub struct CliConfig {
    #[arg(long, help = "Parcel identifier, e.g. 123456_1.0001.12/3")]
    pub teryt: String,

    #[arg(long, default_value = "5", help = "Margin around the parcel in meters")]
    pub buffer: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, help = "Services configuration file (TOML)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Parallel layer requests (1 = sequential)")]
    pub concurrent_requests: Option<usize>,

    #[arg(long, help = "Per-request timeout for map services")]
    pub timeout_seconds: Option<u64>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per stage")]
    pub monitor: bool,

    #[arg(long, help = "Print the run report as JSON (logs go to stderr)")]
    pub json: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn parcel_request(&self) -> Result<ParcelRequest> {
        ParcelRequest::parse(&self.teryt, &self.buffer, &self.output_path)
    }
}
