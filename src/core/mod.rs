pub mod bbox;
pub mod crs;
pub mod drawing;
pub mod dxf;
pub mod engine;
pub mod geodesy;
pub mod layer_source;
pub mod pipeline;
pub mod reproject;

pub use crate::domain::model::{BoundingBox, LayerOutcome, ParcelRecord, ParcelRequest};
pub use crate::domain::ports::{ConfigProvider, ParcelLookup, Pipeline, Storage};
pub use crate::utils::error::Result;
