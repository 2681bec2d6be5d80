pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::UldkClient;
pub use config::{cli::LocalStorage, toml_config::ServicesConfig};
pub use core::{
    engine::{ParcelEngine, PipelineReport},
    pipeline::{ParcelPipeline, PipelineContext, PipelineStage},
};
pub use domain::model::ParcelRequest;
pub use utils::error::{GeoError, Result};
