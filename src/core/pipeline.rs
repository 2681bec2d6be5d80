use futures::stream::{self, StreamExt};
use geo::{Centroid, Polygon};
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::core::bbox::polygon_bbox;
use crate::core::crs::{select_crs, ZonedCrs};
use crate::core::drawing::{parcel_area, DrawingDocument};
use crate::core::geodesy::{Transformer, AUTHORITATIVE_EPSG, WGS84_EPSG};
use crate::core::reproject::reproject_raster;
use crate::domain::model::{
    BoundingBox, LayerOutcome, ParcelRecord, ParcelRequest, PixelSize, RasterFormat,
    ReprojectedRaster,
};
use crate::domain::ports::{ConfigProvider, ParcelLookup, Pipeline, Storage};
use crate::utils::error::{GeoError, Result};
use crate::utils::paths::{drawing_file_name, layer_file_name};

/// Run states, in order. A run only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PipelineStage {
    Created,
    FetchingParcel,
    SelectingCrs,
    ComputingBBoxes,
    FetchingLayers,
    Reprojecting,
    Assembling,
    Persisted,
}

impl PipelineStage {
    /// Stages that do work, in execution order.
    pub const ORDER: [PipelineStage; 7] = [
        PipelineStage::FetchingParcel,
        PipelineStage::SelectingCrs,
        PipelineStage::ComputingBBoxes,
        PipelineStage::FetchingLayers,
        PipelineStage::Reprojecting,
        PipelineStage::Assembling,
        PipelineStage::Persisted,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Created => "created",
            PipelineStage::FetchingParcel => "fetching parcel",
            PipelineStage::SelectingCrs => "selecting CRS",
            PipelineStage::ComputingBBoxes => "computing bounding boxes",
            PipelineStage::FetchingLayers => "fetching layers",
            PipelineStage::Reprojecting => "reprojecting",
            PipelineStage::Assembling => "assembling drawing",
            PipelineStage::Persisted => "persisting drawing",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A raw layer file written during [`PipelineStage::FetchingLayers`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedLayer {
    pub name: String,
    /// Storage key of the raw raster.
    pub key: String,
    pub path: PathBuf,
    pub format: RasterFormat,
    /// Pixel size sent to the service, after capping.
    pub requested_size: PixelSize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLayer {
    pub name: String,
    pub requested_size: PixelSize,
    /// Raw raster as the service returned it.
    pub source_path: PathBuf,
    pub raster: ReprojectedRaster,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedLayer {
    pub name: String,
    pub stage: PipelineStage,
    pub reason: String,
}

/// Everything a run has produced so far, threaded through the stages.
#[derive(Debug)]
pub struct PipelineContext {
    pub request: ParcelRequest,
    stage: PipelineStage,
    pub wgs84_geometry: Option<Polygon<f64>>,
    pub parcel: Option<ParcelRecord>,
    pub target_crs: Option<ZonedCrs>,
    pub source_bbox: Option<BoundingBox>,
    pub target_bbox: Option<BoundingBox>,
    pub target_polygon: Option<Polygon<f64>>,
    pub area: Option<f64>,
    pub saved_layers: Vec<SavedLayer>,
    pub placed_layers: Vec<PlacedLayer>,
    pub dropped_layers: Vec<DroppedLayer>,
    pub drawing: Option<DrawingDocument>,
    pub drawing_path: Option<PathBuf>,
}

fn required<'a, T>(value: &'a Option<T>, stage: PipelineStage, missing: &str) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| GeoError::PipelineStateError {
        stage: stage.label().to_string(),
        missing: missing.to_string(),
    })
}

impl PipelineContext {
    pub fn new(request: ParcelRequest) -> Self {
        Self {
            request,
            stage: PipelineStage::Created,
            wgs84_geometry: None,
            parcel: None,
            target_crs: None,
            source_bbox: None,
            target_bbox: None,
            target_polygon: None,
            area: None,
            saved_layers: Vec::new(),
            placed_layers: Vec::new(),
            dropped_layers: Vec::new(),
            drawing: None,
            drawing_path: None,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Moves to `next`; going backwards or repeating a stage is refused.
    pub fn enter(&mut self, next: PipelineStage) -> Result<()> {
        if next <= self.stage {
            return Err(GeoError::PipelineStateError {
                stage: next.label().to_string(),
                missing: format!("a state before '{}'", self.stage),
            });
        }
        tracing::debug!("Stage transition: {} -> {}", self.stage, next);
        self.stage = next;
        Ok(())
    }

    fn drop_layer(&mut self, name: &str, reason: String) {
        tracing::warn!("⚠️ Layer {} dropped while {}: {}", name, self.stage, reason);
        self.dropped_layers.push(DroppedLayer {
            name: name.to_string(),
            stage: self.stage,
            reason,
        });
    }
}

/// The parcel-to-drawing run, one method per stage.
pub struct ParcelPipeline<S: Storage, L: ParcelLookup, C: ConfigProvider> {
    storage: S,
    lookup: L,
    config: C,
    client: Client,
}

impl<S: Storage, L: ParcelLookup, C: ConfigProvider> ParcelPipeline<S, L, C> {
    pub fn new(storage: S, lookup: L, config: C) -> Self {
        Self::with_client(storage, lookup, config, Client::new())
    }

    pub fn with_client(storage: S, lookup: L, config: C, client: Client) -> Self {
        Self {
            storage,
            lookup,
            config,
            client,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Boundary in WGS84 (for zone selection) and the full record in the
    /// authoritative CRS.
    pub async fn fetch_parcel(&self, ctx: &mut PipelineContext) -> Result<()> {
        let teryt = ctx.request.teryt.clone();
        tracing::info!("🔎 Looking up parcel {}", teryt);

        let wgs84 = self.lookup.parcel_geometry(&teryt, WGS84_EPSG).await?;
        let record = self.lookup.parcel_record(&teryt, AUTHORITATIVE_EPSG).await?;
        if record.srid != AUTHORITATIVE_EPSG {
            return Err(GeoError::ParcelPayloadError {
                message: format!(
                    "expected geometry in EPSG:{}, got EPSG:{}",
                    AUTHORITATIVE_EPSG, record.srid
                ),
            });
        }

        ctx.wgs84_geometry = Some(wgs84);
        ctx.parcel = Some(record);
        Ok(())
    }

    pub fn select_crs(&self, ctx: &mut PipelineContext) -> Result<()> {
        let stage = ctx.stage;
        let geometry = required(&ctx.wgs84_geometry, stage, "the WGS84 parcel boundary")?;
        let centroid = geometry.centroid().ok_or_else(|| GeoError::GeometryError {
            message: "parcel boundary has no centroid".to_string(),
        })?;

        let longitude = centroid.x();
        let zone = select_crs(longitude)
            .ok_or(GeoError::OutsideSupportedTerritory { longitude })?;
        tracing::info!("🧭 Centroid longitude {:.5} -> EPSG:{}", longitude, zone.epsg());

        ctx.target_crs = Some(zone);
        Ok(())
    }

    /// Aligned boxes in both CRSes, the boundary in the drawing CRS and its area.
    pub fn compute_bboxes(&self, ctx: &mut PipelineContext) -> Result<()> {
        let stage = ctx.stage;
        let parcel = required(&ctx.parcel, stage, "the parcel record")?;
        let zone = *required(&ctx.target_crs, stage, "the target CRS")?;
        let buffer = ctx.request.buffer;
        let resolution = self.config.resolution();

        let source_bbox = polygon_bbox(&parcel.geometry, buffer, resolution, AUTHORITATIVE_EPSG)?;
        let transformer = Transformer::new(AUTHORITATIVE_EPSG, zone.epsg())?;
        let target_polygon = transformer.transform_polygon(&parcel.geometry)?;
        let target_bbox = polygon_bbox(&target_polygon, buffer, resolution, zone.epsg())?;
        let area = parcel_area(&target_polygon);

        tracing::info!(
            "📐 BBox EPSG:{} [{}], EPSG:{} [{}], area {:.2} m2",
            AUTHORITATIVE_EPSG,
            source_bbox.to_query_value(),
            zone.epsg(),
            target_bbox.to_query_value(),
            area
        );

        ctx.source_bbox = Some(source_bbox);
        ctx.target_bbox = Some(target_bbox);
        ctx.target_polygon = Some(target_polygon);
        ctx.area = Some(area);
        Ok(())
    }

    /// Requests every configured layer (bounded concurrency, order kept)
    /// and writes the ones that arrived.
    pub async fn fetch_layers(&self, ctx: &mut PipelineContext) -> Result<()> {
        let bbox = *required(&ctx.source_bbox, ctx.stage, "the authoritative bbox")?;
        let resolution = self.config.resolution();
        let timeout = self.config.request_timeout();
        let concurrency = self.config.concurrent_requests().max(1);

        // 先建好所有 future，串流只負責限制同時請求數
        let requests: Vec<_> = self
            .config
            .layers()
            .iter()
            .map(|source| source.fetch(&self.client, &bbox, resolution, timeout))
            .collect();
        let outcomes: Vec<LayerOutcome> = stream::iter(requests)
            .buffered(concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                LayerOutcome::Fetched(layer) => {
                    let key = layer_file_name(
                        &ctx.request.teryt,
                        &layer.name,
                        layer.format.extension(),
                    );
                    if let Err(e) = self.storage.write_file(&key, &layer.bytes).await {
                        ctx.drop_layer(&layer.name, format!("could not save raw raster: {}", e));
                        continue;
                    }
                    let path = self.storage.location(&key);
                    tracing::info!("💾 {} saved as {}", layer.name, path.display());

                    ctx.saved_layers.push(SavedLayer {
                        name: layer.name,
                        key,
                        path,
                        format: layer.format,
                        requested_size: layer.requested_size,
                    });
                }
                LayerOutcome::TransportFailure { layer, reason } => {
                    ctx.drop_layer(&layer, format!("transport failure: {}", reason));
                }
                LayerOutcome::ServiceFailure {
                    layer,
                    status,
                    reason,
                } => {
                    ctx.drop_layer(&layer, format!("service failure (HTTP {}): {}", status, reason));
                }
            }
        }

        tracing::info!(
            "🛰️ {} of {} layers fetched",
            ctx.saved_layers.len(),
            self.config.layers().len()
        );
        Ok(())
    }

    pub async fn reproject_layers(&self, ctx: &mut PipelineContext) -> Result<()> {
        let bbox = *required(&ctx.source_bbox, ctx.stage, "the authoritative bbox")?;
        let epsg = required(&ctx.target_crs, ctx.stage, "the target CRS")?.epsg();

        let saved = ctx.saved_layers.clone();
        for layer in saved {
            match reproject_raster(&self.storage, &layer.name, &layer.key, &bbox, epsg).await {
                Ok(raster) => ctx.placed_layers.push(PlacedLayer {
                    name: layer.name,
                    requested_size: layer.requested_size,
                    source_path: layer.path,
                    raster,
                }),
                Err(e) => ctx.drop_layer(&layer.name, e.to_string()),
            }
        }
        Ok(())
    }

    pub fn assemble(&self, ctx: &mut PipelineContext) -> Result<()> {
        let stage = ctx.stage;
        let parcel = required(&ctx.parcel, stage, "the parcel record")?;
        let zone = required(&ctx.target_crs, stage, "the target CRS")?;
        let polygon = required(&ctx.target_polygon, stage, "the reprojected boundary")?;
        let bbox = required(&ctx.target_bbox, stage, "the target bbox")?;
        let area = *required(&ctx.area, stage, "the parcel area")?;

        let mut drawing = DrawingDocument::new(zone.epsg());
        drawing.add_boundary(polygon)?;
        drawing.add_label(&parcel.attributes.parcel, polygon)?;
        drawing.add_attribute_block(&parcel.attributes, area, bbox);

        let mut rejected = Vec::new();
        for placed in &ctx.placed_layers {
            if let Err(e) = drawing.add_image(&placed.name, &placed.raster) {
                rejected.push((placed.name.clone(), e.to_string()));
            }
        }
        for (name, reason) in rejected {
            ctx.placed_layers.retain(|p| p.name != name);
            ctx.drop_layer(&name, reason);
        }

        tracing::info!("🖼️ Drawing assembled with {} image(s)", drawing.image_count());
        ctx.drawing = Some(drawing);
        Ok(())
    }

    pub async fn persist(&self, ctx: &mut PipelineContext) -> Result<()> {
        let drawing = required(&ctx.drawing, ctx.stage, "an assembled drawing")?;
        let path = drawing
            .save(&self.storage, &drawing_file_name(&ctx.request.teryt))
            .await?;
        ctx.drawing_path = Some(path);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: Storage, L: ParcelLookup, C: ConfigProvider> Pipeline for ParcelPipeline<S, L, C> {
    async fn execute_stage(&self, stage: PipelineStage, ctx: &mut PipelineContext) -> Result<()> {
        match stage {
            PipelineStage::Created => Ok(()),
            PipelineStage::FetchingParcel => self.fetch_parcel(ctx).await,
            PipelineStage::SelectingCrs => self.select_crs(ctx),
            PipelineStage::ComputingBBoxes => self.compute_bboxes(ctx),
            PipelineStage::FetchingLayers => self.fetch_layers(ctx).await,
            PipelineStage::Reprojecting => self.reproject_layers(ctx).await,
            PipelineStage::Assembling => self.assemble(ctx),
            PipelineStage::Persisted => self.persist(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layer_source::MapLayerSource;
    use crate::domain::model::ParcelAttributes;
    use async_trait::async_trait;
    use geo::polygon;
    use httpmock::prelude::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        /// Writes to keys containing this fragment fail.
        reject: Option<&'static str>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
                reject: None,
            }
        }

        fn rejecting(fragment: &'static str) -> Self {
            Self {
                reject: Some(fragment),
                ..Self::new()
            }
        }

        async fn file_names(&self) -> Vec<String> {
            let mut names: Vec<String> = self.files.lock().await.keys().cloned().collect();
            names.sort();
            names
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                GeoError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            if self.reject.is_some_and(|fragment| path.contains(fragment)) {
                return Err(GeoError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    path.to_string(),
                )));
            }
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        fn location(&self, path: &str) -> PathBuf {
            PathBuf::from("/mock").join(path)
        }
    }

    struct StaticLookup {
        wgs84: Polygon<f64>,
        record: ParcelRecord,
    }

    #[async_trait]
    impl ParcelLookup for StaticLookup {
        async fn parcel_geometry(&self, _teryt: &str, _srid: u32) -> Result<Polygon<f64>> {
            Ok(self.wgs84.clone())
        }

        async fn parcel_record(&self, _teryt: &str, _srid: u32) -> Result<ParcelRecord> {
            Ok(self.record.clone())
        }
    }

    struct TestConfig {
        layers: Vec<MapLayerSource>,
    }

    impl ConfigProvider for TestConfig {
        fn parcel_lookup_endpoint(&self) -> &str {
            "http://localhost/"
        }
        fn resolution(&self) -> f64 {
            0.05
        }
        fn request_timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        fn concurrent_requests(&self) -> usize {
            2
        }
        fn layers(&self) -> &[MapLayerSource] {
            &self.layers
        }
    }

    fn lookup(longitude: f64) -> StaticLookup {
        StaticLookup {
            wgs84: polygon![
                (x: longitude - 0.0001, y: 52.0),
                (x: longitude + 0.0001, y: 52.0),
                (x: longitude + 0.0001, y: 52.0002),
                (x: longitude - 0.0001, y: 52.0002),
                (x: longitude - 0.0001, y: 52.0),
            ],
            record: ParcelRecord {
                srid: 2180,
                geometry: polygon![
                    (x: 431000.0, y: 463000.0),
                    (x: 431020.0, y: 463000.0),
                    (x: 431020.0, y: 463020.0),
                    (x: 431000.0, y: 463020.0),
                    (x: 431000.0, y: 463000.0),
                ],
                attributes: ParcelAttributes {
                    teryt: "123456_1/2".to_string(),
                    voivodeship: "wielkopolskie".to_string(),
                    county: "poznański".to_string(),
                    commune: "Kórnik".to_string(),
                    region: "Bnin".to_string(),
                    parcel: "1/2".to_string(),
                },
            },
        }
    }

    fn pipeline(longitude: f64) -> ParcelPipeline<MockStorage, StaticLookup, TestConfig> {
        ParcelPipeline::new(
            MockStorage::new(),
            lookup(longitude),
            TestConfig { layers: Vec::new() },
        )
    }

    fn context() -> PipelineContext {
        PipelineContext::new(ParcelRequest::parse("123456_1/2", "5", "/tmp/out").unwrap())
    }

    async fn run_until(
        pipeline: &ParcelPipeline<MockStorage, StaticLookup, TestConfig>,
        ctx: &mut PipelineContext,
        last: PipelineStage,
    ) -> Result<()> {
        for stage in PipelineStage::ORDER.into_iter().filter(|s| *s <= last) {
            ctx.enter(stage)?;
            pipeline.execute_stage(stage, ctx).await?;
        }
        Ok(())
    }

    #[test]
    fn test_stage_order_only_moves_forward() {
        let mut ctx = context();
        assert_eq!(ctx.stage(), PipelineStage::Created);
        ctx.enter(PipelineStage::FetchingParcel).unwrap();
        ctx.enter(PipelineStage::ComputingBBoxes).unwrap();
        assert!(ctx.enter(PipelineStage::SelectingCrs).is_err());
        assert!(ctx.enter(PipelineStage::ComputingBBoxes).is_err());
    }

    #[test]
    fn test_stage_without_inputs_is_state_error() {
        let p = pipeline(18.0);
        let mut ctx = context();
        let err = p.compute_bboxes(&mut ctx).unwrap_err();
        assert!(matches!(err, GeoError::PipelineStateError { .. }));
    }

    #[tokio::test]
    async fn test_selects_zone_and_computes_boxes() {
        let p = pipeline(18.0);
        let mut ctx = context();
        run_until(&p, &mut ctx, PipelineStage::ComputingBBoxes).await.unwrap();

        assert_eq!(ctx.target_crs, Some(ZonedCrs::Zone6));
        let source = ctx.source_bbox.unwrap();
        assert_eq!(source.epsg, 2180);
        assert_eq!(source.west, 430995.0);
        assert_eq!(source.south, 462995.0);
        assert_eq!(source.pixel_size(0.05).width, 600);

        let target = ctx.target_bbox.unwrap();
        assert_eq!(target.epsg, 2177);
        assert!((ctx.area.unwrap() - 400.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_outside_territory_is_fatal_before_any_write() {
        let p = pipeline(12.0);
        let mut ctx = context();
        let err = run_until(&p, &mut ctx, PipelineStage::Persisted).await.unwrap_err();

        assert!(matches!(err, GeoError::OutsideSupportedTerritory { .. }));
        assert!(p.storage().file_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_without_layers_still_writes_drawing() {
        let p = pipeline(18.0);
        let mut ctx = context();
        run_until(&p, &mut ctx, PipelineStage::Persisted).await.unwrap();

        assert_eq!(p.storage().file_names().await, vec!["123456_1_2.dxf".to_string()]);
        assert_eq!(ctx.drawing_path, Some(PathBuf::from("/mock/123456_1_2.dxf")));
        let drawing = ctx.drawing.as_ref().unwrap();
        assert_eq!(drawing.image_count(), 0);
        assert_eq!(drawing.epsg(), 2177);
    }

    #[tokio::test]
    async fn test_unreadable_raster_is_dropped() {
        let p = pipeline(18.0);
        let mut ctx = context();
        run_until(&p, &mut ctx, PipelineStage::ComputingBBoxes).await.unwrap();

        p.storage()
            .write_file("123456_1_2_broken.png", b"not an image")
            .await
            .unwrap();
        ctx.saved_layers.push(SavedLayer {
            name: "broken".to_string(),
            key: "123456_1_2_broken.png".to_string(),
            path: PathBuf::from("/mock/123456_1_2_broken.png"),
            format: RasterFormat::Png,
            requested_size: PixelSize::new(600, 600),
        });
        ctx.enter(PipelineStage::Reprojecting).unwrap();
        p.reproject_layers(&mut ctx).await.unwrap();

        assert!(ctx.placed_layers.is_empty());
        assert_eq!(ctx.dropped_layers.len(), 1);
        assert_eq!(ctx.dropped_layers[0].name, "broken");
        assert_eq!(ctx.dropped_layers[0].stage, PipelineStage::Reprojecting);
    }

    fn png_bytes() -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 30, Rgba([0, 0, 255, 255])))
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_failed_raw_write_drops_only_that_layer() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200)
                    .header("Content-Type", "image/png")
                    .body(png_bytes());
            })
            .await;

        let layers = vec![
            MapLayerSource::rendered_map("kieg", &server.url("/kieg"), &["dzialki"]),
            MapLayerSource::rendered_map("mpzp", &server.url("/mpzp"), &["granice"]),
        ];
        let p = ParcelPipeline::new(
            MockStorage::rejecting("_mpzp."),
            lookup(18.0),
            TestConfig { layers },
        );
        let mut ctx = context();
        run_until(&p, &mut ctx, PipelineStage::FetchingLayers).await.unwrap();

        assert_eq!(ctx.saved_layers.len(), 1);
        let saved = &ctx.saved_layers[0];
        assert_eq!(saved.name, "kieg");
        assert_eq!(saved.key, "123456_1_2_kieg.png");
        assert_eq!(saved.path, PathBuf::from("/mock/123456_1_2_kieg.png"));
        assert_eq!(saved.requested_size, PixelSize::new(600, 600));

        assert_eq!(ctx.dropped_layers.len(), 1);
        assert_eq!(ctx.dropped_layers[0].name, "mpzp");
        assert_eq!(ctx.dropped_layers[0].stage, PipelineStage::FetchingLayers);
        assert!(ctx.dropped_layers[0].reason.contains("could not save"));

        // 其餘階段照常完成
        for stage in [
            PipelineStage::Reprojecting,
            PipelineStage::Assembling,
            PipelineStage::Persisted,
        ] {
            ctx.enter(stage).unwrap();
            p.execute_stage(stage, &mut ctx).await.unwrap();
        }
        assert_eq!(ctx.placed_layers.len(), 1);
        assert_eq!(ctx.placed_layers[0].requested_size, PixelSize::new(600, 600));
        assert_eq!(
            ctx.placed_layers[0].source_path,
            PathBuf::from("/mock/123456_1_2_kieg.png")
        );
        assert_eq!(ctx.drawing.as_ref().unwrap().image_count(), 1);
    }
}
