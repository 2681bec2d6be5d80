use geo::{Area, Centroid, Polygon};
use std::path::PathBuf;

use crate::core::dxf;
use crate::domain::model::{BoundingBox, ParcelAttributes, PixelSize, ReprojectedRaster};
use crate::domain::ports::Storage;
use crate::utils::error::{GeoError, Result};

pub const BOUNDARY_LAYER: &str = "PZT_dzialka";
pub const TEXT_LAYER: &str = "PZT_text";
pub const LAYER_PREFIX: &str = "PZT_";
pub const BOUNDARY_COLOR: i16 = 5;
pub const DEFAULT_COLOR: i16 = 7;

pub const TEXT_STYLE: &str = "LiberationMono";
pub const TEXT_FONT: &str = "LiberationMono-Regular.ttf";
pub const TEXT_HEIGHT: f64 = 1.25;

/// Distance of the attribute block from the north-east corner of the box.
pub const ATTRIBUTE_OFFSET: f64 = 5.0;
/// IMAGE display flags.
pub const IMAGE_DISPLAY_FLAGS: u16 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub color: i16,
}

/// Raster file referenced by one or more IMAGE entities.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDefinition {
    pub name: String,
    /// Relative to the drawing; rasters are written next to it.
    pub file_name: String,
    pub size: PixelSize,
    pub pixel_world_size: (f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// Closed LWPOLYLINE, closing vertex not repeated.
    Boundary {
        layer: String,
        vertices: Vec<(f64, f64)>,
    },
    /// Single-line TEXT aligned middle-centre on `position`.
    Label {
        layer: String,
        position: (f64, f64),
        height: f64,
        text: String,
    },
    /// MTEXT anchored top-left at `insert`.
    AttributeBlock {
        layer: String,
        insert: (f64, f64),
        height: f64,
        lines: Vec<String>,
    },
    /// IMAGE with its lower-left corner at `insert`; `u_vector` / `v_vector`
    /// are the world size of one pixel along x / y.
    Image {
        layer: String,
        definition: usize,
        insert: (f64, f64),
        u_vector: (f64, f64),
        v_vector: (f64, f64),
        size: PixelSize,
        display_flags: u16,
    },
}

/// In-memory drawing: metric units, fixed layers, the parcel entities and
/// any number of georeferenced images. Serialized once with [`to_dxf`].
///
/// [`to_dxf`]: DrawingDocument::to_dxf
#[derive(Debug, Clone)]
pub struct DrawingDocument {
    epsg: u32,
    layers: Vec<Layer>,
    entities: Vec<Entity>,
    images: Vec<ImageDefinition>,
}

impl DrawingDocument {
    pub fn new(epsg: u32) -> Self {
        Self {
            epsg,
            layers: vec![
                Layer {
                    name: BOUNDARY_LAYER.to_string(),
                    color: BOUNDARY_COLOR,
                },
                Layer {
                    name: TEXT_LAYER.to_string(),
                    color: DEFAULT_COLOR,
                },
            ],
            entities: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn images(&self) -> &[ImageDefinition] {
        &self.images
    }

    fn ensure_layer(&mut self, name: &str, color: i16) {
        if !self.layers.iter().any(|l| l.name == name) {
            self.layers.push(Layer {
                name: name.to_string(),
                color,
            });
        }
    }

    /// Adds the parcel's exterior ring as a closed polyline.
    pub fn add_boundary(&mut self, polygon: &Polygon<f64>) -> Result<()> {
        let mut vertices: Vec<(f64, f64)> = polygon.exterior().0.iter().map(|c| (c.x, c.y)).collect();
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(GeoError::GeometryError {
                message: format!("boundary needs at least 3 vertices, got {}", vertices.len()),
            });
        }

        self.entities.push(Entity::Boundary {
            layer: BOUNDARY_LAYER.to_string(),
            vertices,
        });
        Ok(())
    }

    /// Places the parcel label middle-centre on the polygon centroid.
    pub fn add_label(&mut self, text: &str, polygon: &Polygon<f64>) -> Result<()> {
        let centroid = polygon.centroid().ok_or_else(|| GeoError::GeometryError {
            message: "parcel polygon has no centroid".to_string(),
        })?;

        // 地號標在邊界圖層上，跟邊界一起開關
        self.entities.push(Entity::Label {
            layer: BOUNDARY_LAYER.to_string(),
            position: (centroid.x(), centroid.y()),
            height: TEXT_HEIGHT,
            text: text.to_string(),
        });
        Ok(())
    }

    /// Attribute block beside the parcel; `anchor_bbox` is the drawing-CRS
    /// box and the block's top-left sits 5 m beyond its north-east corner.
    pub fn add_attribute_block(
        &mut self,
        attributes: &ParcelAttributes,
        area: f64,
        anchor_bbox: &BoundingBox,
    ) {
        self.entities.push(Entity::AttributeBlock {
            layer: TEXT_LAYER.to_string(),
            insert: (
                anchor_bbox.east + ATTRIBUTE_OFFSET,
                anchor_bbox.north + ATTRIBUTE_OFFSET,
            ),
            height: TEXT_HEIGHT,
            lines: attribute_lines(attributes, self.epsg, area),
        });
    }

    /// References a reprojected raster, stretched over its bbox.
    pub fn add_image(&mut self, layer_name: &str, raster: &ReprojectedRaster) -> Result<()> {
        if raster.size.width == 0 || raster.size.height == 0 {
            return Err(GeoError::GeometryError {
                message: format!("image for {} has no pixels", layer_name),
            });
        }
        let file_name = raster
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| GeoError::GeometryError {
                message: format!("image for {} has no file name: {:?}", layer_name, raster.path),
            })?;

        let layer = format!("{}{}", LAYER_PREFIX, layer_name);
        self.ensure_layer(&layer, DEFAULT_COLOR);

        let pixel_w = raster.bbox.width() / f64::from(raster.size.width);
        let pixel_h = raster.bbox.height() / f64::from(raster.size.height);

        let definition = self.images.len();
        self.images.push(ImageDefinition {
            name: layer_name.to_string(),
            file_name,
            size: raster.size,
            pixel_world_size: (pixel_w, pixel_h),
        });

        self.entities.push(Entity::Image {
            layer,
            definition,
            insert: (raster.bbox.west, raster.bbox.south),
            u_vector: (pixel_w, 0.0),
            v_vector: (0.0, pixel_h),
            size: raster.size,
            display_flags: IMAGE_DISPLAY_FLAGS,
        });
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.entities
            .iter()
            .filter(|e| matches!(e, Entity::Image { .. }))
            .count()
    }

    /// Lower-left and upper-right corners of everything placed so far.
    pub fn extents(&self) -> Option<((f64, f64), (f64, f64))> {
        let mut points: Vec<(f64, f64)> = Vec::new();
        for entity in &self.entities {
            match entity {
                Entity::Boundary { vertices, .. } => points.extend(vertices.iter().copied()),
                Entity::Label { position, .. } => points.push(*position),
                Entity::AttributeBlock { insert, .. } => points.push(*insert),
                Entity::Image {
                    insert,
                    u_vector,
                    v_vector,
                    size,
                    ..
                } => {
                    points.push(*insert);
                    points.push((
                        insert.0 + u_vector.0 * f64::from(size.width),
                        insert.1 + v_vector.1 * f64::from(size.height),
                    ));
                }
            }
        }

        let first = *points.first()?;
        Some(points.iter().fold((first, first), |(min, max), p| {
            ((min.0.min(p.0), min.1.min(p.1)), (max.0.max(p.0), max.1.max(p.1)))
        }))
    }

    pub fn to_dxf(&self) -> String {
        dxf::write_document(self)
    }

    /// Writes the drawing once, under `file_name`, and returns where it landed.
    pub async fn save<S: Storage>(&self, storage: &S, file_name: &str) -> Result<PathBuf> {
        storage.write_file(file_name, self.to_dxf().as_bytes()).await?;
        let path = storage.location(file_name);
        tracing::info!("💾 Drawing saved: {}", path.display());
        Ok(path)
    }
}

/// Planar area of the parcel in square metres.
pub fn parcel_area(polygon: &Polygon<f64>) -> f64 {
    polygon.unsigned_area()
}

/// Lines of the attribute block, in the cadastre's own language.
pub fn attribute_lines(attributes: &ParcelAttributes, epsg: u32, area: f64) -> Vec<String> {
    vec![
        format!("TERYT: {}", attributes.teryt),
        format!("Województwo {}", attributes.voivodeship),
        format!("Powiat {}", attributes.county),
        format!("Gmina {}", attributes.commune),
        format!("Obręb {}", attributes.region),
        format!("Numer ewidencyjny {}", attributes.parcel),
        format!("Układ odniesienia EPSG: {}", epsg),
        format!("Powierzchnia: {:.2} m2", area),
    ]
}
