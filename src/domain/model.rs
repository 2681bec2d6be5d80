use geo::Polygon;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::error::Result;
use crate::utils::validation::{parse_buffer, validate_output_dir, validate_teryt};

/// One validated run request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelRequest {
    pub teryt: String,
    /// Margin around the parcel, whole ground units.
    pub buffer: u32,
    pub output_dir: PathBuf,
}

impl ParcelRequest {
    /// Validates raw user input, in the order a user would fix it.
    pub fn parse(teryt: &str, buffer: &str, output_dir: &str) -> Result<Self> {
        let teryt = teryt.trim();
        validate_teryt(teryt)?;
        let buffer = parse_buffer(buffer)?;
        validate_output_dir(output_dir)?;

        Ok(Self {
            teryt: teryt.to_string(),
            buffer,
            output_dir: PathBuf::from(output_dir),
        })
    }
}

/// Axis-aligned ground rectangle in one CRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub epsg: u32,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64, epsg: u32) -> Self {
        Self {
            west,
            south,
            east,
            north,
            epsg,
        }
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Pixel grid covering the box at `resolution` ground units per pixel.
    pub fn pixel_size(&self, resolution: f64) -> PixelSize {
        // 對齊過的 bbox 應該剛好整除，四捨五入只吸收浮點誤差
        PixelSize::new(
            (self.width() / resolution).round().max(0.0) as u32,
            (self.height() / resolution).round().max(0.0) as u32,
        )
    }

    /// `w,s,e,n` as used in OGC `BBOX` parameters.
    pub fn to_query_value(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Administrative attributes of a parcel as returned by the cadastre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelAttributes {
    pub teryt: String,
    pub voivodeship: String,
    pub county: String,
    pub commune: String,
    pub region: String,
    pub parcel: String,
}

/// A parcel fetched from the cadastre, boundary in `srid`.
#[derive(Debug, Clone)]
pub struct ParcelRecord {
    pub srid: u32,
    pub geometry: Polygon<f64>,
    pub attributes: ParcelAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    Jpeg,
    Png,
}

impl RasterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "jpeg",
            RasterFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "image/jpeg",
            RasterFormat::Png => "image/png",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            RasterFormat::Jpeg => image::ImageFormat::Jpeg,
            RasterFormat::Png => image::ImageFormat::Png,
        }
    }
}

/// One map layer as returned by a service.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Pixel size sent with the request, after capping.
    pub requested_size: PixelSize,
    pub format: RasterFormat,
}

/// A raster resampled into the drawing CRS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReprojectedRaster {
    pub path: PathBuf,
    pub bbox: BoundingBox,
    pub size: PixelSize,
}

/// Result of one layer request. Failures are values, not errors: the
/// pipeline drops the layer and carries on.
#[derive(Debug)]
pub enum LayerOutcome {
    Fetched(RasterLayer),
    /// Connection refused, DNS, timeout, broken body.
    TransportFailure { layer: String, reason: String },
    /// The service answered, but not with an image.
    ServiceFailure {
        layer: String,
        status: u16,
        reason: String,
    },
}
