use crate::adapters::uldk::DEFAULT_ULDK_ENDPOINT;
use crate::core::layer_source::{MapLayerSource, SourceKind};
use crate::domain::model::RasterFormat;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{GeoError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_unique,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

pub const DEFAULT_RESOLUTION: f64 = 0.05;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
pub const DEFAULT_CONCURRENT_REQUESTS: usize = 5;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

const ORTHOPHOTO_ENDPOINT: &str =
    "https://mapy.geoportal.gov.pl/wss/service/PZGIK/ORTO/WCS/HighResolution";
const CADASTRE_ENDPOINT: &str =
    "https://integracja.gugik.gov.pl/cgi-bin/KrajowaIntegracjaEwidencjiGruntow";
const UTILITIES_ENDPOINT: &str =
    "https://integracja.gugik.gov.pl/cgi-bin/KrajowaIntegracjaUzbrojeniaTerenu";
const TOPOGRAPHY_ENDPOINT: &str =
    "https://integracja.gugik.gov.pl/cgi-bin/KrajowaIntegracjaBazDanychObiektowTopograficznych";
const ZONING_ENDPOINT: &str =
    "https://mapy.geoportal.gov.pl/wss/ext/KrajowaIntegracjaMiejscowychPlanowZagospodarowaniaPrzestrzennego";

/// Services a run talks to and how it talks to them.
///
/// Every section is optional in the file; missing parts fall back to the
/// national services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub parcel_lookup: ParcelLookupConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default = "default_layers")]
    pub layers: Vec<MapLayerSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelLookupConfig {
    pub endpoint: String,
}

impl Default for ParcelLookupConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ULDK_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Ground units per pixel.
    pub resolution: f64,
    pub timeout_seconds: u64,
    pub concurrent_requests: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            concurrent_requests: DEFAULT_CONCURRENT_REQUESTS,
        }
    }
}

/// Orthophoto coverage plus four rendered overlays, in drawing order.
pub fn default_layers() -> Vec<MapLayerSource> {
    vec![
        MapLayerSource::coverage(
            "ortofotoHQ",
            ORTHOPHOTO_ENDPOINT,
            "Orthoimagery_High_Resolution",
            RasterFormat::Jpeg,
        ),
        MapLayerSource::rendered_map(
            "dzialki_i_budynki",
            CADASTRE_ENDPOINT,
            &["dzialki", "numery_dzialek", "budynki"],
        ),
        MapLayerSource::rendered_map(
            "sieci",
            UTILITIES_ENDPOINT,
            &[
                "przewod_urzadzenia",
                "przewod_niezidentyfikowany",
                "przewod_specjalny",
                "przewod_telekomunikacyjny",
                "przewod_gazowy",
                "przewod_cieplowniczy",
                "przewod_wodociagowy",
                "przewod_kanalizacyjny",
                "przewod_gazowy",
                "przewod_elektroenergetyczny",
            ],
        ),
        MapLayerSource::rendered_map("obiekty_topo", TOPOGRAPHY_ENDPOINT, &["bdot"]),
        MapLayerSource::rendered_map(
            "mpzp",
            ZONING_ENDPOINT,
            &[
                "granice",
                "plany_granice",
                "raster",
                "wektor-str",
                "wektor-lzb",
                "wektor-pow",
                "wektor-lin",
                "wektor-pkt",
                "granice",
            ],
        ),
    ]
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            parcel_lookup: ParcelLookupConfig::default(),
            request: RequestConfig::default(),
            layers: default_layers(),
        }
    }
}

impl ServicesConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);
        let config: ServicesConfig = toml::from_str(&processed_content)?;
        Ok(config)
    }

    /// 替換環境變數 (例如 ${ULDK_ENDPOINT})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_PATTERN
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// Applies command-line overrides on top of the file settings.
    pub fn with_overrides(
        mut self,
        concurrent_requests: Option<usize>,
        timeout_seconds: Option<u64>,
    ) -> Self {
        if let Some(concurrent) = concurrent_requests {
            self.request.concurrent_requests = concurrent;
        }
        if let Some(timeout) = timeout_seconds {
            self.request.timeout_seconds = timeout;
        }
        self
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_url("parcel_lookup.endpoint", &self.parcel_lookup.endpoint)?;

        if !(self.request.resolution > 0.0) || !self.request.resolution.is_finite() {
            return Err(GeoError::InvalidConfigValueError {
                field: "request.resolution".to_string(),
                value: self.request.resolution.to_string(),
                reason: "Resolution must be a positive number".to_string(),
            });
        }
        validate_range("request.timeout_seconds", self.request.timeout_seconds, 1, 3600)?;
        validate_positive_number(
            "request.concurrent_requests",
            self.request.concurrent_requests,
            1,
        )?;

        validate_unique("layers.name", self.layers.iter().map(|l| l.name.as_str()))?;
        for layer in &self.layers {
            validate_non_empty_string("layers.name", &layer.name)?;
            validate_url(&format!("layers.{}.endpoint", layer.name), &layer.endpoint)?;

            if let Some(cap) = layer.max_pixels {
                validate_range(&format!("layers.{}.max_pixels", layer.name), cap, 1, 10_000)?;
            }
            if layer.kind == SourceKind::Coverage && !layer.parameters.contains_key("COVERAGE") {
                return Err(GeoError::ConfigError {
                    message: format!("coverage layer '{}' needs a COVERAGE parameter", layer.name),
                });
            }
        }

        Ok(())
    }
}

impl ConfigProvider for ServicesConfig {
    fn parcel_lookup_endpoint(&self) -> &str {
        &self.parcel_lookup.endpoint
    }

    fn resolution(&self) -> f64 {
        self.request.resolution
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request.timeout_seconds)
    }

    fn concurrent_requests(&self) -> usize {
        self.request.concurrent_requests
    }

    fn layers(&self) -> &[MapLayerSource] {
        &self.layers
    }
}

impl Validate for ServicesConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_reproduce_national_services() {
        let config = ServicesConfig::default();
        let names: Vec<&str> = config.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["ortofotoHQ", "dzialki_i_budynki", "sieci", "obiekty_topo", "mpzp"]
        );
        assert_eq!(config.layers[0].kind, SourceKind::Coverage);
        assert_eq!(config.layers[0].format, RasterFormat::Jpeg);
        assert_eq!(config.resolution(), 0.05);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.concurrent_requests(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ServicesConfig::from_toml_str("").unwrap();
        assert_eq!(config.layers.len(), 5);
        assert_eq!(config.parcel_lookup_endpoint(), "https://uldk.gugik.gov.pl/");
    }

    #[test]
    fn test_parse_custom_layers() {
        let toml_content = r#"
[parcel_lookup]
endpoint = "http://localhost:8080/"

[request]
resolution = 0.1
concurrent_requests = 2

[[layers]]
name = "orto"
endpoint = "http://localhost:8080/wcs"
kind = "coverage"
format = "jpeg"
max_pixels = 2000

[layers.parameters]
COVERAGE = "Ortho"
FORMAT = "image/jpeg"

[[layers]]
name = "plan"
endpoint = "http://localhost:8080/wms"
kind = "rendered_map"
format = "png"

[layers.parameters]
LAYERS = "a,b"
"#;

        let config = ServicesConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.resolution(), 0.1);
        assert_eq!(config.concurrent_requests(), 2);
        assert_eq!(config.request.timeout_seconds, 120);
        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.layers[0].pixel_cap(), 2000);
        assert_eq!(config.layers[1].kind, SourceKind::RenderedMap);
        assert_eq!(config.layers[1].parameters["LAYERS"], "a,b");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("PARCEL_DXF_TEST_ULDK", "https://uldk.test.example");

        let toml_content = r#"
[parcel_lookup]
endpoint = "${PARCEL_DXF_TEST_ULDK}"
"#;
        let config = ServicesConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.parcel_lookup.endpoint, "https://uldk.test.example");

        std::env::remove_var("PARCEL_DXF_TEST_ULDK");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ServicesConfig::default();
        config.request.resolution = 0.0;
        assert!(config.validate().is_err());

        let mut config = ServicesConfig::default();
        config.layers.push(config.layers[0].clone());
        assert!(config.validate().is_err());

        let mut config = ServicesConfig::default();
        config.layers[0].parameters.remove("COVERAGE");
        assert!(matches!(config.validate(), Err(GeoError::ConfigError { .. })));

        let mut config = ServicesConfig::default();
        config.parcel_lookup.endpoint = "ftp://uldk".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = ServicesConfig::default().with_overrides(Some(1), Some(10));
        assert_eq!(config.concurrent_requests(), 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_file_and_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[request]\ntimeout_seconds = 30").unwrap();
        let config = ServicesConfig::from_file(file.path()).unwrap();
        assert_eq!(config.request.timeout_seconds, 30);

        let err = ServicesConfig::from_toml_str("[request\nbroken").unwrap_err();
        assert!(matches!(err, GeoError::TomlError(_)));
    }
}
