//! Client for the national parcel lookup service (ULDK, `GetParcelById`).

use async_trait::async_trait;
use geo::{Area, Geometry, Polygon};
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;
use wkt::TryFromWkt;

use crate::domain::model::{ParcelAttributes, ParcelRecord};
use crate::domain::ports::ParcelLookup;
use crate::utils::error::{GeoError, Result};

pub const DEFAULT_ULDK_ENDPOINT: &str = "https://uldk.gugik.gov.pl/";

/// Fields requested for the full parcel record, in response order.
pub const RECORD_FIELDS: &str = "geom_wkt,geom_extent,voivodeship,county,commune,region,parcel";

static FIELD_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;|]+").expect("separator pattern is valid"));

#[derive(Debug, Clone)]
pub struct UldkClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl UldkClient {
    pub fn new(client: Client, endpoint: &str, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            timeout,
        }
    }

    pub fn request_url(&self, teryt: &str, srid: u32, result: &str) -> Result<Url> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("request", "GetParcelById"),
                ("id", teryt),
                ("srid", &srid.to_string()),
                ("result", result),
            ],
        )
        .map_err(|e| GeoError::InvalidConfigValueError {
            field: "parcel_lookup_endpoint".to_string(),
            value: self.endpoint.clone(),
            reason: e.to_string(),
        })
    }

    async fn query(&self, teryt: &str, srid: u32, result: &str) -> Result<Vec<String>> {
        let url = self.request_url(teryt, srid, result)?;
        tracing::debug!("ULDK request: {}", url);

        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(GeoError::ParcelLookupError {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }
        if !body.starts_with('0') {
            return Err(GeoError::ParcelLookupError {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        split_payload(&body)
    }
}

#[async_trait]
impl ParcelLookup for UldkClient {
    async fn parcel_geometry(&self, teryt: &str, srid: u32) -> Result<Polygon<f64>> {
        let fields = self.query(teryt, srid, "geom_wkt").await?;
        let wkt = fields.get(1).ok_or_else(|| GeoError::ParcelPayloadError {
            message: format!("expected SRID and geometry, got {} field(s)", fields.len()),
        })?;
        parse_polygon(wkt)
    }

    async fn parcel_record(&self, teryt: &str, srid: u32) -> Result<ParcelRecord> {
        let fields = self.query(teryt, srid, RECORD_FIELDS).await?;
        let record = parcel_record_from_fields(teryt, &fields)?;
        tracing::info!(
            "📍 Parcel {} found: {} / {} / {}",
            teryt,
            record.attributes.commune,
            record.attributes.region,
            record.attributes.parcel
        );
        Ok(record)
    }
}

/// Strips the leading status line and splits the rest on `;` / `|` runs.
pub fn split_payload(body: &str) -> Result<Vec<String>> {
    let data = body
        .strip_prefix("0\n")
        .or_else(|| body.strip_prefix("0\r\n"))
        .ok_or_else(|| GeoError::ParcelPayloadError {
            message: format!("unexpected status line: {:?}", body.lines().next().unwrap_or("")),
        })?;
    let data = data.trim_end_matches(['\n', '\r']);

    Ok(FIELD_SEPARATOR
        .split(data)
        .map(|field| field.to_string())
        .collect())
}

/// Parses `SRID=2180` into `2180`.
pub fn parse_srid(field: &str) -> Result<u32> {
    field
        .trim()
        .strip_prefix("SRID=")
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| GeoError::ParcelPayloadError {
            message: format!("invalid SRID field {:?}", field),
        })
}

/// Parcel boundary from WKT; a multipolygon contributes its largest part.
pub fn parse_polygon(wkt: &str) -> Result<Polygon<f64>> {
    let geometry = Geometry::<f64>::try_from_wkt_str(wkt.trim()).map_err(|e| {
        GeoError::ParcelPayloadError {
            message: format!("invalid WKT geometry: {}", e),
        }
    })?;

    match geometry {
        Geometry::Polygon(polygon) => Ok(polygon),
        Geometry::MultiPolygon(multi) => multi
            .0
            .into_iter()
            .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .ok_or_else(|| GeoError::ParcelPayloadError {
                message: "empty multipolygon".to_string(),
            }),
        other => Err(GeoError::ParcelPayloadError {
            message: format!("expected a polygon, got {:?}", other),
        }),
    }
}

/// `[srid, geom_wkt, geom_extent, voivodeship, county, commune, region, parcel]`
pub fn parcel_record_from_fields(teryt: &str, fields: &[String]) -> Result<ParcelRecord> {
    if fields.len() < 8 {
        return Err(GeoError::ParcelPayloadError {
            message: format!("expected 8 fields, got {}", fields.len()),
        });
    }

    tracing::debug!("Parcel extent: {}", fields[2]);

    Ok(ParcelRecord {
        srid: parse_srid(&fields[0])?,
        geometry: parse_polygon(&fields[1])?,
        attributes: ParcelAttributes {
            teryt: teryt.to_string(),
            voivodeship: fields[3].clone(),
            county: fields[4].clone(),
            commune: fields[5].clone(),
            region: fields[6].clone(),
            parcel: fields[7].clone(),
        },
    })
}
