use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::core::geodesy::AUTHORITATIVE_EPSG;
use crate::domain::model::{BoundingBox, LayerOutcome, PixelSize, RasterFormat, RasterLayer};
use crate::utils::error::{GeoError, Result};

pub const COVERAGE_MAX_PIXELS: u32 = 4000;
pub const RENDERED_MAP_MAX_PIXELS: u32 = 3840;

/// The two request shapes a map service can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// WCS 1.0.0 `GetCoverage`, imagery.
    Coverage,
    /// WMS 1.1.1 `GetMap`, rendered named sublayers.
    RenderedMap,
}

impl SourceKind {
    pub fn default_max_pixels(&self) -> u32 {
        match self {
            SourceKind::Coverage => COVERAGE_MAX_PIXELS,
            SourceKind::RenderedMap => RENDERED_MAP_MAX_PIXELS,
        }
    }
}

/// One configured map service; adding a service means adding one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayerSource {
    pub name: String,
    pub endpoint: String,
    pub kind: SourceKind,
    pub format: RasterFormat,
    /// Service-specific parameters, e.g. `LAYERS` or `COVERAGE`.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub max_pixels: Option<u32>,
}

impl MapLayerSource {
    pub fn coverage(name: &str, endpoint: &str, coverage: &str, format: RasterFormat) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("FORMAT".to_string(), format.mime_type().to_string());
        parameters.insert("COVERAGE".to_string(), coverage.to_string());
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            kind: SourceKind::Coverage,
            format,
            parameters,
            max_pixels: None,
        }
    }

    pub fn rendered_map(name: &str, endpoint: &str, layers: &[&str]) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("LAYERS".to_string(), layers.join(","));
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            kind: SourceKind::RenderedMap,
            format: RasterFormat::Png,
            parameters,
            max_pixels: None,
        }
    }

    pub fn pixel_cap(&self) -> u32 {
        self.max_pixels.unwrap_or_else(|| self.kind.default_max_pixels())
    }

    /// Full GET URL for a box in the authoritative CRS.
    pub fn request_url(&self, bbox: &BoundingBox, size: PixelSize) -> Result<Url> {
        let crs = format!("EPSG:{}", AUTHORITATIVE_EPSG);
        let mut query: Vec<(String, String)> = match self.kind {
            SourceKind::Coverage => vec![
                ("SERVICE".into(), "WCS".into()),
                ("VERSION".into(), "1.0.0".into()),
                ("REQUEST".into(), "GetCoverage".into()),
            ],
            SourceKind::RenderedMap => vec![
                ("VERSION".into(), "1.1.1".into()),
                ("SERVICE".into(), "WMS".into()),
                ("REQUEST".into(), "GetMap".into()),
                ("TRANSPARENT".into(), "TRUE".into()),
                ("FORMAT".into(), self.format.mime_type().into()),
                ("SRS".into(), crs.clone()),
            ],
        };

        for (key, value) in &self.parameters {
            // 模板已帶的參數不可被覆蓋
            if !query.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
                query.push((key.clone(), value.clone()));
            }
        }

        query.push(("BBOX".into(), bbox.to_query_value()));
        if self.kind == SourceKind::Coverage {
            query.push(("CRS".into(), crs.clone()));
            query.push(("RESPONSE_CRS".into(), crs));
        }
        query.push(("WIDTH".into(), size.width.to_string()));
        query.push(("HEIGHT".into(), size.height.to_string()));

        Url::parse_with_params(&self.endpoint, &query).map_err(|e| {
            GeoError::InvalidConfigValueError {
                field: format!("layers.{}.endpoint", self.name),
                value: self.endpoint.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Requests the layer for `bbox`. Every failure comes back as a
    /// [`LayerOutcome`] variant; this never aborts the run.
    pub async fn fetch(
        &self,
        client: &Client,
        bbox: &BoundingBox,
        resolution: f64,
        timeout: Duration,
    ) -> LayerOutcome {
        let requested = bbox.pixel_size(resolution);
        let size = cap_pixel_size(requested, self.pixel_cap());

        tracing::info!("🛰️ Asking server for: {} ({})", self.name, self.endpoint);
        tracing::debug!(
            "Imagesize_px: {}x{} (uncapped {}x{}), Imagesize_m: {}x{}",
            size.width,
            size.height,
            requested.width,
            requested.height,
            bbox.width(),
            bbox.height()
        );

        let url = match self.request_url(bbox, size) {
            Ok(url) => url,
            Err(e) => {
                return LayerOutcome::TransportFailure {
                    layer: self.name.clone(),
                    reason: e.to_string(),
                }
            }
        };
        tracing::debug!("Request URL: {}", url);

        let response = match client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("timed out after {:?}", timeout)
                } else {
                    e.to_string()
                };
                return LayerOutcome::TransportFailure {
                    layer: self.name.clone(),
                    reason,
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            return LayerOutcome::ServiceFailure {
                layer: self.name.clone(),
                status: status.as_u16(),
                reason: format!("server responded with {}", status),
            };
        }

        // OGC 服務出錯時常以 200 + XML ServiceException 回應
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.contains("xml") || content_type.contains("html") {
            let body = response.text().await.unwrap_or_default();
            return LayerOutcome::ServiceFailure {
                layer: self.name.clone(),
                status: status.as_u16(),
                reason: format!(
                    "service exception ({}): {}",
                    content_type,
                    body.chars().take(200).collect::<String>()
                ),
            };
        }

        match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => LayerOutcome::ServiceFailure {
                layer: self.name.clone(),
                status: status.as_u16(),
                reason: "empty response body".to_string(),
            },
            Ok(bytes) => {
                tracing::info!("✅ {} downloaded ({} bytes)", self.name, bytes.len());
                LayerOutcome::Fetched(RasterLayer {
                    name: self.name.clone(),
                    bytes: bytes.to_vec(),
                    requested_size: size,
                    format: self.format,
                })
            }
            Err(e) => LayerOutcome::TransportFailure {
                layer: self.name.clone(),
                reason: e.to_string(),
            },
        }
    }
}

/// Limits the larger side to `cap`, scaling the other to keep the aspect ratio.
pub fn cap_pixel_size(size: PixelSize, cap: u32) -> PixelSize {
    if size.width <= cap && size.height <= cap {
        return size;
    }
    if size.width == 0 || size.height == 0 {
        return PixelSize::new(size.width.min(cap), size.height.min(cap));
    }

    let ratio = f64::from(size.width) / f64::from(size.height);
    if size.width >= size.height {
        let height = (f64::from(cap) / ratio).round().max(1.0) as u32;
        PixelSize::new(cap, height)
    } else {
        let width = (f64::from(cap) * ratio).round().max(1.0) as u32;
        PixelSize::new(width, cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn bbox() -> BoundingBox {
        BoundingBox::new(430995.0, 462995.0, 431025.0, 463025.0, 2180)
    }

    #[test]
    fn test_cap_leaves_small_sizes_alone() {
        let size = PixelSize::new(600, 400);
        assert_eq!(cap_pixel_size(size, 4000), size);
        assert_eq!(cap_pixel_size(PixelSize::new(4000, 4000), 4000), PixelSize::new(4000, 4000));
    }

    #[test]
    fn test_cap_preserves_aspect_ratio() {
        let cases = [
            (PixelSize::new(8000, 6000), 4000),
            (PixelSize::new(6000, 8000), 4000),
            (PixelSize::new(10001, 333), 3840),
            (PixelSize::new(4500, 4500), 3840),
            (PixelSize::new(3841, 17), 3840),
        ];
        for (size, cap) in cases {
            let capped = cap_pixel_size(size, cap);
            assert_eq!(capped.width.max(capped.height), cap, "{:?}", size);

            let before = f64::from(size.width) / f64::from(size.height);
            let after = f64::from(capped.width) / f64::from(capped.height);
            // 四捨五入最多差半個像素
            let short_side = f64::from(capped.width.min(capped.height));
            let relative_error = (after / before - 1.0).abs();
            assert!(relative_error <= 0.5 / short_side + 1e-9, "{:?} -> {:?}", size, capped);
        }
    }

    #[test]
    fn test_cap_example_values() {
        assert_eq!(cap_pixel_size(PixelSize::new(8000, 6000), 4000), PixelSize::new(4000, 3000));
        assert_eq!(cap_pixel_size(PixelSize::new(3000, 7680), 3840), PixelSize::new(1500, 3840));
    }

    #[test]
    fn test_default_caps_per_kind() {
        let wcs = MapLayerSource::coverage("orto", "https://example.com/wcs", "Ortho", RasterFormat::Jpeg);
        let wms = MapLayerSource::rendered_map("mpzp", "https://example.com/wms", &["a", "b"]);
        assert_eq!(wcs.pixel_cap(), 4000);
        assert_eq!(wms.pixel_cap(), 3840);

        let custom = MapLayerSource {
            max_pixels: Some(2048),
            ..wms
        };
        assert_eq!(custom.pixel_cap(), 2048);
    }

    #[test]
    fn test_coverage_request_url() {
        let source = MapLayerSource::coverage(
            "ortofotoHQ",
            "https://example.com/wcs",
            "Orthoimagery_High_Resolution",
            RasterFormat::Jpeg,
        );
        let url = source.request_url(&bbox(), PixelSize::new(600, 600)).unwrap();
        let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["SERVICE"], "WCS");
        assert_eq!(pairs["REQUEST"], "GetCoverage");
        assert_eq!(pairs["COVERAGE"], "Orthoimagery_High_Resolution");
        assert_eq!(pairs["FORMAT"], "image/jpeg");
        assert_eq!(pairs["BBOX"], "430995,462995,431025,463025");
        assert_eq!(pairs["CRS"], "EPSG:2180");
        assert_eq!(pairs["RESPONSE_CRS"], "EPSG:2180");
        assert_eq!(pairs["WIDTH"], "600");
        assert_eq!(pairs["HEIGHT"], "600");
    }

    #[test]
    fn test_rendered_map_request_url() {
        let source = MapLayerSource::rendered_map(
            "dzialki_i_budynki",
            "https://example.com/cgi-bin/wms",
            &["dzialki", "numery_dzialek", "budynki"],
        );
        let url = source.request_url(&bbox(), PixelSize::new(600, 600)).unwrap();
        let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/cgi-bin/wms");
        assert_eq!(pairs["SERVICE"], "WMS");
        assert_eq!(pairs["VERSION"], "1.1.1");
        assert_eq!(pairs["REQUEST"], "GetMap");
        assert_eq!(pairs["TRANSPARENT"], "TRUE");
        assert_eq!(pairs["FORMAT"], "image/png");
        assert_eq!(pairs["SRS"], "EPSG:2180");
        assert_eq!(pairs["LAYERS"], "dzialki,numery_dzialek,budynki");
        assert!(!pairs.contains_key("CRS"));
    }

    #[test]
    fn test_template_parameters_cannot_be_overridden() {
        let mut source = MapLayerSource::rendered_map("x", "https://example.com/wms", &["a"]);
        source
            .parameters
            .insert("request".to_string(), "GetFeatureInfo".to_string());
        let url = source.request_url(&bbox(), PixelSize::new(10, 10)).unwrap();
        let requests: Vec<_> = url
            .query_pairs()
            .filter(|(k, _)| k.eq_ignore_ascii_case("request"))
            .collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, "GetMap");
    }

    #[tokio::test]
    async fn test_fetch_sends_capped_size() {
        let server = MockServer::start_async().await;
        let wcs_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/wcs")
                    .query_param("WIDTH", "4000")
                    .query_param("HEIGHT", "1333");
                then.status(200)
                    .header("Content-Type", "image/jpeg")
                    .body(b"jpeg bytes");
            })
            .await;
        let wms_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/wms")
                    .query_param("WIDTH", "3840")
                    .query_param("HEIGHT", "1280");
                then.status(200)
                    .header("Content-Type", "image/png")
                    .body(b"png bytes");
            })
            .await;

        // 300 m x 100 m 在 0.05 m/px 下是 6000 x 2000 px
        let wide = BoundingBox::new(430995.0, 462995.0, 431295.0, 463095.0, 2180);
        let client = Client::new();
        let timeout = Duration::from_secs(5);

        let wcs = MapLayerSource::coverage("ortofotoHQ", &server.url("/wcs"), "Ortho", RasterFormat::Jpeg);
        match wcs.fetch(&client, &wide, 0.05, timeout).await {
            LayerOutcome::Fetched(layer) => {
                assert_eq!(layer.requested_size, PixelSize::new(4000, 1333));
                assert_eq!(layer.bytes, b"jpeg bytes".to_vec());
                assert_eq!(layer.format, RasterFormat::Jpeg);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let wms = MapLayerSource::rendered_map("mpzp", &server.url("/wms"), &["granice"]);
        match wms.fetch(&client, &wide, 0.05, timeout).await {
            LayerOutcome::Fetched(layer) => {
                assert_eq!(layer.requested_size, PixelSize::new(3840, 1280));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        wcs_mock.assert_async().await;
        wms_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_reports_empty_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/wms");
                then.status(200).header("Content-Type", "image/png");
            })
            .await;

        let source = MapLayerSource::rendered_map("mpzp", &server.url("/wms"), &["granice"]);
        let outcome = source
            .fetch(&Client::new(), &bbox(), 0.05, Duration::from_secs(5))
            .await;
        assert!(matches!(
            outcome,
            LayerOutcome::ServiceFailure { status: 200, ref reason, .. } if reason.contains("empty")
        ));
    }
}
