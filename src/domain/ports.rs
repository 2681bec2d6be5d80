use crate::core::layer_source::MapLayerSource;
use crate::core::pipeline::{PipelineContext, PipelineStage};
use crate::domain::model::ParcelRecord;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Where run artefacts (rasters, world files, the drawing) are kept.
/// Paths are relative names inside the run's output location.
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Full location of `path`, as referenced from the drawing and the report.
    fn location(&self, path: &str) -> PathBuf;
}

pub trait ConfigProvider: Send + Sync {
    fn parcel_lookup_endpoint(&self) -> &str;
    /// Ground units per pixel for every layer request.
    fn resolution(&self) -> f64;
    fn request_timeout(&self) -> Duration;
    fn concurrent_requests(&self) -> usize;
    fn layers(&self) -> &[MapLayerSource];
}

/// Resolves a TERYT parcel identifier to its boundary and attributes.
#[async_trait]
pub trait ParcelLookup: Send + Sync {
    /// Boundary only, in `srid`.
    async fn parcel_geometry(&self, teryt: &str, srid: u32) -> Result<geo::Polygon<f64>>;
    /// Boundary plus administrative attributes, in `srid`.
    async fn parcel_record(&self, teryt: &str, srid: u32) -> Result<ParcelRecord>;
}

/// A run split into stages; the engine drives the order.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn execute_stage(&self, stage: PipelineStage, ctx: &mut PipelineContext) -> Result<()>;
}
