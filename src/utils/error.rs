use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}': {value} ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid input '{field}': {reason}")]
    InputError { field: String, reason: String },

    #[error("Parcel centroid longitude {longitude} lies outside the supported CRS zones")]
    OutsideSupportedTerritory { longitude: f64 },

    #[error("Parcel lookup failed (HTTP {status}): {message}")]
    ParcelLookupError { status: u16, message: String },

    #[error("Malformed parcel payload: {message}")]
    ParcelPayloadError { message: String },

    #[error("Coordinate transformation EPSG:{from} -> EPSG:{to} failed: {message}")]
    ProjectionError { from: u32, to: u32, message: String },

    #[error("Reprojection of '{layer}' failed: {message}")]
    ReprojectionError { layer: String, message: String },

    #[error("Geometry error: {message}")]
    GeometryError { message: String },

    #[error("Stage '{stage}' needs {missing}, which no earlier stage produced")]
    PipelineStateError { stage: String, missing: String },
}

pub type Result<T> = std::result::Result<T, GeoError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    ParcelLookup,
    Layer,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl GeoError {
    pub fn input(field: &str, reason: impl Into<String>) -> Self {
        GeoError::InputError {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            GeoError::InputError { .. }
            | GeoError::OutsideSupportedTerritory { .. }
            | GeoError::InvalidConfigValueError { .. } => ErrorCategory::Input,
            GeoError::HttpError(_)
            | GeoError::ParcelLookupError { .. }
            | GeoError::ParcelPayloadError { .. }
            | GeoError::ProjectionError { .. }
            | GeoError::GeometryError { .. } => ErrorCategory::ParcelLookup,
            GeoError::ImageError(_) | GeoError::ReprojectionError { .. } => ErrorCategory::Layer,
            GeoError::IoError(_)
            | GeoError::SerializationError(_)
            | GeoError::TomlError(_)
            | GeoError::PipelineStateError { .. }
            | GeoError::ConfigError { .. } => ErrorCategory::Output,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 單一圖層失敗只會被略過
            ErrorCategory::Layer => ErrorSeverity::Low,
            ErrorCategory::ParcelLookup => ErrorSeverity::Medium,
            ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Output => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            GeoError::InputError { .. } => {
                "Check the TERYT identifier (NNNNNN_...), the buffer (whole meters) and the output folder"
            }
            GeoError::OutsideSupportedTerritory { .. } => {
                "Only parcels between 14.14°E and 24.15°E (PL-2000 zones 5-8) are supported"
            }
            GeoError::HttpError(_) | GeoError::ParcelLookupError { .. } => {
                "The parcel service may be unavailable; try again later or check the network"
            }
            GeoError::ParcelPayloadError { .. } | GeoError::GeometryError { .. } => {
                "Verify that the parcel identifier exists in the cadastre"
            }
            GeoError::ProjectionError { .. } => {
                "The parcel geometry could not be moved into the drawing CRS; check its coordinates"
            }
            GeoError::ConfigError { .. }
            | GeoError::TomlError(_)
            | GeoError::InvalidConfigValueError { .. } => {
                "Fix the services configuration file and retry"
            }
            GeoError::IoError(_) | GeoError::SerializationError(_) => {
                "Check that the output folder exists and is writable"
            }
            GeoError::PipelineStateError { .. } => "This is a bug; please report it with the log",
            GeoError::ImageError(_) | GeoError::ReprojectionError { .. } => {
                "The layer was skipped; the drawing is still usable without it"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            GeoError::InputError { field, reason } => format!("Wrong {}: {}", field, reason),
            GeoError::OutsideSupportedTerritory { longitude } => format!(
                "Parcel lies outside supported territory (longitude {:.4})",
                longitude
            ),
            GeoError::ParcelLookupError { status, message } => {
                format!("Error!\nResponse from server: {}\n{}", message, status)
            }
            other => other.to_string(),
        }
    }
}
