//! Raster reprojection from the authoritative CRS into the drawing CRS.
//!
//! The target grid follows the usual "default transform" rule: the source
//! extent is transformed (edges densified), the pixel size is chosen so the
//! diagonal keeps the same number of pixels, and pixels are square. Every
//! band is then resampled bilinearly by inverse mapping each target pixel
//! centre back into the source raster.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;

use crate::core::geodesy::Transformer;
use crate::domain::model::{BoundingBox, PixelSize, ReprojectedRaster};
use crate::domain::ports::Storage;
use crate::utils::error::{GeoError, Result};
use crate::utils::paths::{raster_sibling_path, world_file_path};

/// Points sampled along each bbox edge when transforming the extent.
const EDGE_DENSIFY: usize = 21;

/// Exact transforms are computed every `CONTROL_STEP` target pixels and
/// interpolated in between.
const CONTROL_STEP: u32 = 16;

/// Target raster geometry: square pixels anchored at the north-west corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    pub bbox: BoundingBox,
    pub size: PixelSize,
    pub resolution: f64,
}

/// Computes the default target grid for a source raster of `src_size`
/// covering `src_bbox`.
pub fn default_target_grid(
    transformer: &Transformer,
    src_bbox: &BoundingBox,
    src_size: PixelSize,
) -> Result<TargetGrid> {
    if src_size.width == 0 || src_size.height == 0 {
        return Err(GeoError::GeometryError {
            message: "source raster has no pixels".to_string(),
        });
    }

    let extent = transformer.transform_bounds(src_bbox, EDGE_DENSIFY)?;
    let diagonal = extent.width().hypot(extent.height());
    let pixel_diagonal = f64::from(src_size.width).hypot(f64::from(src_size.height));
    let resolution = diagonal / pixel_diagonal;

    if !(resolution > 0.0) || !resolution.is_finite() {
        return Err(GeoError::GeometryError {
            message: format!("degenerate target resolution {}", resolution),
        });
    }

    let width = ((extent.width() / resolution) + 0.5).floor().max(1.0) as u32;
    let height = ((extent.height() / resolution) + 0.5).floor().max(1.0) as u32;

    let bbox = BoundingBox::new(
        extent.west,
        extent.north - resolution * f64::from(height),
        extent.west + resolution * f64::from(width),
        extent.north,
        extent.epsg,
    );

    Ok(TargetGrid {
        bbox,
        size: PixelSize::new(width, height),
        resolution,
    })
}

/// Maps target pixel centres to (fractional) source pixel coordinates.
struct ControlGrid {
    columns: Vec<u32>,
    rows: Vec<u32>,
    /// Row-major, `rows.len() * columns.len()` source pixel positions.
    points: Vec<(f64, f64)>,
}

fn control_positions(length: u32) -> Vec<u32> {
    let mut positions: Vec<u32> = (0..length).step_by(CONTROL_STEP as usize).collect();
    if positions.last() != Some(&(length - 1)) {
        positions.push(length - 1);
    }
    positions
}

impl ControlGrid {
    fn build(
        inverse: &Transformer,
        grid: &TargetGrid,
        src_bbox: &BoundingBox,
        src_size: PixelSize,
    ) -> Result<Self> {
        let columns = control_positions(grid.size.width);
        let rows = control_positions(grid.size.height);
        let src_res_x = src_bbox.width() / f64::from(src_size.width);
        let src_res_y = src_bbox.height() / f64::from(src_size.height);

        let mut points = Vec::with_capacity(columns.len() * rows.len());
        for &row in &rows {
            let y = grid.bbox.north - (f64::from(row) + 0.5) * grid.resolution;
            for &col in &columns {
                let x = grid.bbox.west + (f64::from(col) + 0.5) * grid.resolution;
                let (sx, sy) = inverse.transform_point(x, y)?;
                points.push((
                    (sx - src_bbox.west) / src_res_x,
                    (src_bbox.north - sy) / src_res_y,
                ));
            }
        }

        Ok(Self {
            columns,
            rows,
            points,
        })
    }

    fn segment(positions: &[u32], value: u32) -> (usize, f64) {
        // 最後一段包含終點
        let idx = match positions.binary_search(&value) {
            Ok(i) => i.min(positions.len().saturating_sub(2)),
            Err(i) => i.saturating_sub(1).min(positions.len().saturating_sub(2)),
        };
        if positions.len() < 2 {
            return (0, 0.0);
        }
        let start = positions[idx];
        let end = positions[idx + 1];
        let t = f64::from(value - start) / f64::from(end - start);
        (idx, t)
    }

    fn source_position(&self, col: u32, row: u32) -> (f64, f64) {
        let (ci, tx) = Self::segment(&self.columns, col);
        let (ri, ty) = Self::segment(&self.rows, row);
        let stride = self.columns.len();
        let at = |r: usize, c: usize| {
            let r = r.min(self.rows.len() - 1);
            let c = c.min(stride - 1);
            self.points[r * stride + c]
        };

        let p00 = at(ri, ci);
        let p10 = at(ri, ci + 1);
        let p01 = at(ri + 1, ci);
        let p11 = at(ri + 1, ci + 1);

        let top = (p00.0 + (p10.0 - p00.0) * tx, p00.1 + (p10.1 - p00.1) * tx);
        let bottom = (p01.0 + (p11.0 - p01.0) * tx, p01.1 + (p11.1 - p01.1) * tx);
        (
            top.0 + (bottom.0 - top.0) * ty,
            top.1 + (bottom.1 - top.1) * ty,
        )
    }
}

/// Bilinear sample at fractional pixel position (pixel edges at integers).
/// Positions outside the raster footprint yield `None`.
fn sample_bilinear(src: &RgbaImage, px: f64, py: f64) -> Option<Rgba<u8>> {
    let (w, h) = src.dimensions();
    if px < 0.0 || py < 0.0 || px > f64::from(w) || py > f64::from(h) {
        return None;
    }

    // 像素中心位於 .5
    let cx = px - 0.5;
    let cy = py - 0.5;
    let x0 = cx.floor();
    let y0 = cy.floor();
    let fx = cx - x0;
    let fy = cy - y0;

    let clamp_x = |v: f64| v.clamp(0.0, f64::from(w - 1)) as u32;
    let clamp_y = |v: f64| v.clamp(0.0, f64::from(h - 1)) as u32;
    let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));
    let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));

    let p00 = src.get_pixel(xa, ya).0;
    let p10 = src.get_pixel(xb, ya).0;
    let p01 = src.get_pixel(xa, yb).0;
    let p11 = src.get_pixel(xb, yb).0;

    let mut out = [0u8; 4];
    for band in 0..4 {
        let top = f64::from(p00[band]) * (1.0 - fx) + f64::from(p10[band]) * fx;
        let bottom = f64::from(p01[band]) * (1.0 - fx) + f64::from(p11[band]) * fx;
        out[band] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgba(out))
}

/// Resamples `src` (covering `src_bbox`) into a new grid in `target_epsg`.
pub fn reproject_image(
    src: &DynamicImage,
    src_bbox: &BoundingBox,
    target_epsg: u32,
) -> Result<(RgbaImage, TargetGrid)> {
    let src_rgba = src.to_rgba8();
    let src_size = PixelSize::new(src_rgba.width(), src_rgba.height());

    let forward = Transformer::new(src_bbox.epsg, target_epsg)?;
    let inverse = Transformer::new(target_epsg, src_bbox.epsg)?;
    let grid = default_target_grid(&forward, src_bbox, src_size)?;
    let control = ControlGrid::build(&inverse, &grid, src_bbox, src_size)?;

    let mut out = RgbaImage::new(grid.size.width, grid.size.height);
    for (col, row, pixel) in out.enumerate_pixels_mut() {
        let (px, py) = control.source_position(col, row);
        if let Some(value) = sample_bilinear(&src_rgba, px, py) {
            *pixel = value;
        }
    }

    Ok((out, grid))
}

fn encode(image: RgbaImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    match format {
        // JPEG 沒有 alpha，超出範圍的像素變成黑色
        ImageFormat::Jpeg => DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .write_to(&mut cursor, format)?,
        _ => image.write_to(&mut cursor, format)?,
    }
    Ok(cursor.into_inner())
}

/// ESRI world file: pixel size, rotation terms, upper-left pixel centre.
pub fn world_file_contents(grid: &TargetGrid) -> String {
    format!(
        "{:.10}\n0.0000000000\n0.0000000000\n{:.10}\n{:.10}\n{:.10}\n",
        grid.resolution,
        -grid.resolution,
        grid.bbox.west + grid.resolution / 2.0,
        grid.bbox.north - grid.resolution / 2.0,
    )
}

/// Reads the saved raster `source_key`, reprojects it into `target_epsg`
/// and writes `<stem><epsg>.<ext>` plus a world file next to it.
pub async fn reproject_raster<S: Storage>(
    storage: &S,
    layer_name: &str,
    source_key: &str,
    src_bbox: &BoundingBox,
    target_epsg: u32,
) -> Result<ReprojectedRaster> {
    let wrap = |e: GeoError| GeoError::ReprojectionError {
        layer: layer_name.to_string(),
        message: e.to_string(),
    };

    let bytes = storage.read_file(source_key).await.map_err(wrap)?;
    let format = ImageFormat::from_path(source_key).unwrap_or(ImageFormat::Png);
    let target_key = raster_sibling_path(Path::new(source_key), target_epsg)
        .to_string_lossy()
        .into_owned();

    let bbox = *src_bbox;
    let (encoded, grid) = tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, TargetGrid)> {
        let src = image::load_from_memory(&bytes)?;
        let (reprojected, grid) = reproject_image(&src, &bbox, target_epsg)?;
        Ok((encode(reprojected, format)?, grid))
    })
    .await
    .map_err(|e| GeoError::ReprojectionError {
        layer: layer_name.to_string(),
        message: format!("reprojection task failed: {}", e),
    })?
    .map_err(wrap)?;

    storage.write_file(&target_key, &encoded).await.map_err(wrap)?;
    let world_key = world_file_path(Path::new(&target_key))
        .to_string_lossy()
        .into_owned();
    storage
        .write_file(&world_key, world_file_contents(&grid).as_bytes())
        .await
        .map_err(wrap)?;

    tracing::info!(
        "🗺️ {} reprojected to EPSG:{} ({}x{} px)",
        layer_name,
        target_epsg,
        grid.size.width,
        grid.size.height
    );

    Ok(ReprojectedRaster {
        path: storage.location(&target_key),
        bbox: grid.bbox,
        size: grid.size,
    })
}
