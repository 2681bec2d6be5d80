//! Thin wrapper over proj4rs for the handful of CRSes a parcel run touches.
//!
//! Only the EPSG codes in [`SUPPORTED_EPSG`] are accepted: WGS84, PL-1992
//! (the cadastre's authoritative system) and the four PL-2000 zones.

use geo::{Coord, MapCoords, Polygon};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::domain::model::BoundingBox;
use crate::utils::error::{GeoError, Result};

pub const WGS84_EPSG: u32 = 4326;
pub const AUTHORITATIVE_EPSG: u32 = 2180;

/// EPSG codes a parcel run can touch.
pub const SUPPORTED_EPSG: [u32; 6] = [WGS84_EPSG, AUTHORITATIVE_EPSG, 2176, 2177, 2178, 2179];

/// PROJ4 definition from the crs-definitions database, for supported codes only.
pub fn proj_definition(epsg: u32) -> Option<&'static str> {
    if !SUPPORTED_EPSG.contains(&epsg) {
        return None;
    }
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

fn load_proj(epsg: u32, from: u32, to: u32) -> Result<Proj> {
    let definition = proj_definition(epsg).ok_or_else(|| GeoError::ProjectionError {
        from,
        to,
        message: format!("EPSG:{} is not a supported CRS", epsg),
    })?;
    Proj::from_proj_string(definition).map_err(|e| GeoError::ProjectionError {
        from,
        to,
        message: format!("invalid definition for EPSG:{}: {}", epsg, e),
    })
}

/// Coordinate transformer between two EPSG codes, always in x/y (easting,
/// northing or lon, lat) order.
pub struct Transformer {
    from: u32,
    to: u32,
    projs: Option<(Proj, Proj)>,
}

impl Transformer {
    pub fn new(from: u32, to: u32) -> Result<Self> {
        // Same CRS: identity, nothing to load
        let projs = if from == to {
            None
        } else {
            Some((load_proj(from, from, to)?, load_proj(to, from, to)?))
        };
        Ok(Self { from, to, projs })
    }

    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Some((src, dst)) = &self.projs else {
            return Ok((x, y));
        };

        // proj4rs 的地理座標使用弧度
        let mut point = if src.is_latlong() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(src, dst, &mut point).map_err(|e| GeoError::ProjectionError {
            from: self.from,
            to: self.to,
            message: format!("({}, {}): {}", x, y, e),
        })?;

        if dst.is_latlong() {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }

    /// Transforms every ring of a polygon, vertex by vertex.
    pub fn transform_polygon(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
        polygon.try_map_coords(|c: Coord<f64>| {
            self.transform_point(c.x, c.y)
                .map(|(x, y)| Coord { x, y })
        })
    }

    /// Extent of a box after transformation, sampling `densify` extra points
    /// along each edge so curved edges are not under-covered.
    pub fn transform_bounds(&self, bbox: &BoundingBox, densify: usize) -> Result<BoundingBox> {
        let steps = densify + 1;
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = bbox.west + t * bbox.width();
            let y = bbox.south + t * bbox.height();
            let edge_points = [
                (x, bbox.south),
                (x, bbox.north),
                (bbox.west, y),
                (bbox.east, y),
            ];
            for (px, py) in edge_points {
                let (tx, ty) = self.transform_point(px, py)?;
                min_x = min_x.min(tx);
                min_y = min_y.min(ty);
                max_x = max_x.max(tx);
                max_y = max_y.max(ty);
            }
        }

        Ok(BoundingBox::new(min_x, min_y, max_x, max_y, self.to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_identity_transform() {
        let t = Transformer::new(2180, 2180).unwrap();
        assert_eq!(t.transform_point(500000.0, 500000.0).unwrap(), (500000.0, 500000.0));
    }

    #[test]
    fn test_unsupported_epsg() {
        assert!(Transformer::new(2180, 3857).is_err());
    }

    #[test]
    fn test_definitions_come_from_database() {
        for epsg in SUPPORTED_EPSG {
            assert!(proj_definition(epsg).is_some(), "EPSG:{}", epsg);
        }
        let pl1992 = proj_definition(2180).unwrap();
        assert!(pl1992.contains("+lon_0=19"));
        assert!(pl1992.contains("+k=0.9993"));
        assert!(proj_definition(2177).unwrap().contains("+x_0=6500000"));
        assert!(proj_definition(4326).unwrap().contains("+proj=longlat"));
        // 資料庫裡有，但不在支援清單
        assert!(proj_definition(3857).is_none());
    }

    #[test]
    fn test_central_meridian_maps_to_false_easting() {
        // lon 19°E 是 PL-1992 的中央子午線
        let t = Transformer::new(4326, 2180).unwrap();
        let (x, _) = t.transform_point(19.0, 52.0).unwrap();
        assert!((x - 500000.0).abs() < 1e-3, "x = {}", x);

        let t = Transformer::new(4326, 2177).unwrap();
        let (x, y) = t.transform_point(18.0, 52.0).unwrap();
        assert!((x - 6500000.0).abs() < 1e-3, "x = {}", x);
        assert!(y > 5_700_000.0 && y < 5_800_000.0, "y = {}", y);
    }

    #[test]
    fn test_round_trip_between_zones() {
        let forward = Transformer::new(2180, 2177).unwrap();
        let inverse = Transformer::new(2177, 2180).unwrap();
        let (x, y) = forward.transform_point(431000.0, 463000.0).unwrap();
        let (bx, by) = inverse.transform_point(x, y).unwrap();
        assert!((bx - 431000.0).abs() < 1e-4);
        assert!((by - 463000.0).abs() < 1e-4);
    }

    #[test]
    fn test_transform_polygon_preserves_shape() {
        use geo::Area;

        let square = polygon![
            (x: 431000.0, y: 463000.0),
            (x: 431100.0, y: 463000.0),
            (x: 431100.0, y: 463100.0),
            (x: 431000.0, y: 463100.0),
            (x: 431000.0, y: 463000.0),
        ];
        let t = Transformer::new(2180, 2177).unwrap();
        let projected = t.transform_polygon(&square).unwrap();

        assert_eq!(projected.exterior().0.len(), 5);
        // PL-1992 在 18°E 的比例尺約 0.999358，PL-2000 中央子午線為 0.999923
        // 線比例 ≈ 1.000565，面積比 ≈ 1.00113
        let ratio = projected.unsigned_area() / square.unsigned_area();
        assert!((ratio - 1.00113).abs() < 1e-4, "ratio = {}", ratio);
    }

    #[test]
    fn test_transform_bounds_contains_corners() {
        let bbox = BoundingBox::new(431000.0, 463000.0, 431020.0, 463020.0, 2180);
        let t = Transformer::new(2180, 2177).unwrap();
        let out = t.transform_bounds(&bbox, 21).unwrap();
        assert_eq!(out.epsg, 2177);
        for (x, y) in [(431000.0, 463000.0), (431020.0, 463020.0)] {
            let (tx, ty) = t.transform_point(x, y).unwrap();
            assert!(tx >= out.west - 1e-6 && tx <= out.east + 1e-6);
            assert!(ty >= out.south - 1e-6 && ty <= out.north + 1e-6);
        }
        assert!((out.width() - 20.0).abs() < 0.5);
    }
}
