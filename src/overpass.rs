//! Overpass QL construction and the HTTP client for the interpreter.

use reqwest::Client;
use thiserror::Error;

use geojson::FeatureCollection;

use crate::aoi::close_ring;
use crate::api_types::{LatLng, LayerType, OverpassResponse};
use crate::convert;

/// Base URL for the public Overpass API.
const BASE_URL: &str = "https://overpass-api.de/api";

/// Server-side query timeout embedded in every query.
const QUERY_TIMEOUT_SECS: u32 = 25;

/// Errors that can occur when talking to the Overpass API.
#[derive(Debug, Error)]
pub enum OverpassError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Failed to parse JSON response: {0}")]
    JsonParseError(#[from] serde_json::Error),
}

/// Serialize a ring as the space-separated "lat lng" pair list Overpass
/// expects inside a `poly` filter.
fn poly_string(ring: &[LatLng]) -> String {
    ring.iter()
        .map(|p| format!("{} {}", p.lat, p.lng))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the Overpass QL text for one layer type over a polygon ring.
///
/// Pure: the same (layer, ring) always yields the same query. The ring is
/// closed defensively; closing is idempotent so pre-closed rings pass
/// through unchanged. Only `roads` restricts output to way geometry; the
/// other types return the full body plus referenced node geometry.
pub fn build_query(layer: LayerType, ring: &[LatLng]) -> String {
    let ring = close_ring(ring.to_vec());
    let poly = poly_string(&ring);

    let roads = format!(r#"way["highway"](poly:"{poly}");"#);
    let buildings = format!(r#"way["building"](poly:"{poly}");"#);
    let shops = format!(r#"node["shop"](poly:"{poly}");"#);

    let body = match layer {
        LayerType::Roads => roads,
        LayerType::Buildings => buildings,
        LayerType::Shops => shops,
        LayerType::All => format!("{roads}{buildings}{shops}"),
    };

    let output = match layer {
        LayerType::Roads => "out geom qt;",
        _ => "out body;>;out skel qt;",
    };

    format!("[out:json][timeout:{QUERY_TIMEOUT_SECS}];({body});{output}")
}

/// Client for the Overpass interpreter.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: Client,
    base_url: String,
}

impl Default for OverpassClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OverpassClient {
    /// Create a client against the configured endpoint (`OVERPASS_URL` env
    /// override, public instance otherwise).
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: resolve_base_url(),
        }
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Run a query and convert the response to GeoJSON.
    pub async fn query(&self, query: &str) -> Result<FeatureCollection, OverpassError> {
        let url = format!("{}/interpreter", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("data", query)])
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        println!("Overpass response length: {} bytes", text.len());

        let parsed: OverpassResponse = serde_json::from_str(&text)?;
        println!("Overpass returned {} raw elements", parsed.elements.len());

        Ok(convert::elements_to_geojson(parsed))
    }

    /// Check that the interpreter endpoint is reachable. Used by the startup
    /// warmup that gates fetching.
    pub async fn probe(&self) -> Result<(), OverpassError> {
        let url = format!("{}/status", self.base_url);
        self.client.get(&url).send().await?.error_for_status()?;
        Ok(())
    }
}

fn resolve_base_url() -> String {
    if let Ok(url) = std::env::var("OVERPASS_URL") {
        let trimmed = url.trim();
        if !trimmed.is_empty() {
            return trimmed.trim_end_matches('/').to_string();
        }
    }
    BASE_URL.to_string()
}

// ============================================================
// Unit Tests
// ============================================================
