use geo::{BoundingRect, Polygon, Rect};

use crate::domain::model::BoundingBox;
use crate::utils::error::{GeoError, Result};

/// Absorbs float noise such as `30.0 / 0.05 = 599.999…` before truncating.
const ALIGN_EPSILON: f64 = 1e-9;

/// Padded box whose width and height are whole multiples of `resolution`.
///
/// The padded extent is truncated to whole ground units, then the east and
/// north edges are pulled back so both sides hold an integer number of
/// pixels. The result can be up to one pixel smaller than the requested
/// buffer on the east/north side.
pub fn aligned_bbox(extent: &Rect<f64>, buffer: u32, resolution: f64, epsg: u32) -> BoundingBox {
    let buffer = f64::from(buffer);
    let west = (extent.min().x - buffer).trunc();
    let south = (extent.min().y - buffer).trunc();
    let east = (extent.max().x + buffer).trunc();
    let north = (extent.max().y + buffer).trunc();

    let width_px = ((east - west) / resolution + ALIGN_EPSILON).trunc().max(0.0);
    let height_px = ((north - south) / resolution + ALIGN_EPSILON).trunc().max(0.0);

    BoundingBox::new(
        west,
        south,
        west + resolution * width_px,
        south + resolution * height_px,
        epsg,
    )
}

pub fn polygon_bbox(
    polygon: &Polygon<f64>,
    buffer: u32,
    resolution: f64,
    epsg: u32,
) -> Result<BoundingBox> {
    if !(resolution > 0.0) {
        return Err(GeoError::GeometryError {
            message: format!("resolution must be positive, got {}", resolution),
        });
    }
    let extent = polygon.bounding_rect().ok_or_else(|| GeoError::GeometryError {
        message: "parcel polygon has no vertices".to_string(),
    })?;
    Ok(aligned_bbox(&extent, buffer, resolution, epsg))
}
