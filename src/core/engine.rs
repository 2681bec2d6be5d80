use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::core::pipeline::{DroppedLayer, PipelineContext, PipelineStage, PlacedLayer};
use crate::domain::model::{BoundingBox, ParcelRequest};
use crate::domain::ports::Pipeline;
use crate::utils::error::{GeoError, Result};
use crate::utils::monitor::SystemMonitor;

/// What a finished run produced, for humans (`summary`) or tools (JSON).
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub teryt: String,
    pub drawing_path: PathBuf,
    pub target_epsg: u32,
    pub source_bbox: BoundingBox,
    pub target_bbox: BoundingBox,
    pub area_m2: f64,
    pub placed_layers: Vec<PlacedLayer>,
    pub dropped_layers: Vec<DroppedLayer>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn from_context(
        ctx: &PipelineContext,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Result<Self> {
        let missing = |what: &str| GeoError::PipelineStateError {
            stage: ctx.stage().label().to_string(),
            missing: what.to_string(),
        };

        Ok(Self {
            teryt: ctx.request.teryt.clone(),
            drawing_path: ctx.drawing_path.clone().ok_or_else(|| missing("a saved drawing"))?,
            target_epsg: ctx.target_crs.ok_or_else(|| missing("the target CRS"))?.epsg(),
            source_bbox: ctx.source_bbox.ok_or_else(|| missing("the authoritative bbox"))?,
            target_bbox: ctx.target_bbox.ok_or_else(|| missing("the target bbox"))?,
            area_m2: ctx.area.ok_or_else(|| missing("the parcel area"))?,
            placed_layers: ctx.placed_layers.clone(),
            dropped_layers: ctx.dropped_layers.clone(),
            started_at,
            finished_at,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("📁 Drawing: {}", self.drawing_path.display()),
            format!("🧭 EPSG:{}, area {:.2} m2", self.target_epsg, self.area_m2),
        ];
        for placed in &self.placed_layers {
            lines.push(format!(
                "  ✅ {} ({}x{} px) -> {}",
                placed.name,
                placed.requested_size.width,
                placed.requested_size.height,
                placed.raster.path.display()
            ));
        }
        for dropped in &self.dropped_layers {
            lines.push(format!("  ⚠️ {} skipped: {}", dropped.name, dropped.reason));
        }
        lines.join("\n")
    }
}

pub struct ParcelEngine<P: Pipeline> {
    pipeline: P,
    monitor: Option<SystemMonitor>,
}

impl<P: Pipeline> ParcelEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor: None,
        }
    }

    pub fn new_with_monitoring(pipeline: P, enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: enabled.then(|| SystemMonitor::new(true)),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Runs every stage in order; the first error aborts the run.
    pub async fn run(&self, request: ParcelRequest) -> Result<PipelineReport> {
        let started_at = Utc::now();
        tracing::info!("🚀 Starting parcel run for {}", request.teryt);

        let mut ctx = PipelineContext::new(request);
        for stage in PipelineStage::ORDER {
            ctx.enter(stage)?;
            tracing::info!("▶️ {}", stage);
            self.pipeline.execute_stage(stage, &mut ctx).await?;

            if let Some(monitor) = &self.monitor {
                monitor.record_stage(stage.label());
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_summary();
        }

        let report = PipelineReport::from_context(&ctx, started_at, Utc::now())?;
        tracing::info!(
            "✅ Run finished: {} image(s) placed, {} layer(s) dropped",
            report.placed_layers.len(),
            report.dropped_layers.len()
        );
        Ok(report)
    }
}
