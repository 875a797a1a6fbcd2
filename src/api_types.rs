//! Types for the AOI fetch API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A geographic coordinate in the order Leaflet uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned bounding box the frontend can hand to `fitBounds`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLngBounds {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl LatLngBounds {
    /// A bounds covering a single point, to be grown with `extend`.
    pub fn of(lat: f64, lng: f64) -> Self {
        Self {
            min_lat: lat,
            min_lng: lng,
            max_lat: lat,
            max_lng: lng,
        }
    }

    pub fn extend(&mut self, lat: f64, lng: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.min_lng = self.min_lng.min(lng);
        self.max_lat = self.max_lat.max(lat);
        self.max_lng = self.max_lng.max(lng);
    }

    /// Bounds of a vertex ring, `None` for an empty ring.
    pub fn from_ring(ring: &[LatLng]) -> Option<Self> {
        let mut points = ring.iter();
        let first = points.next()?;
        let mut bounds = Self::of(first.lat, first.lng);
        for p in points {
            bounds.extend(p.lat, p.lng);
        }
        Some(bounds)
    }
}

/// Which sub-query to issue against Overpass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Roads,
    Buildings,
    Shops,
    All,
}

/// One on-map layer switch. `enabled` mirrors whether the control may be
/// used at all, `checked` whether the layer is currently shown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Toggle {
    pub enabled: bool,
    pub checked: bool,
}

impl Toggle {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            checked: false,
        }
    }

    pub fn on() -> Self {
        Self {
            enabled: true,
            checked: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToggleStates {
    pub aoi: Toggle,
    pub fetched: Toggle,
    pub uploaded: Toggle,
}

impl Default for ToggleStates {
    fn default() -> Self {
        Self {
            aoi: Toggle::disabled(),
            fetched: Toggle::disabled(),
            uploaded: Toggle::disabled(),
        }
    }
}

// ============================================================
// Overpass API Response Types (internal deserialization)
// ============================================================

/// Root response from the Overpass interpreter.
#[derive(Debug, Deserialize)]
pub(crate) struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

/// A coordinate pair as Overpass emits it inside way geometry.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct OverpassPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A single OSM element from the Overpass response. Relations are never
/// requested by our queries but are tolerated and skipped during conversion.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum OverpassElement {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    Way {
        id: i64,
        #[serde(default)]
        nodes: Vec<i64>,
        /// Present when the query asked for `out geom`.
        #[serde(default)]
        geometry: Option<Vec<OverpassPoint>>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    Relation {
        #[allow(dead_code)]
        id: i64,
    },
}

// ============================================================
// Web API Types
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawRequest {
    pub ring: Vec<LatLng>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub layer: LayerType,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub vertex_count: usize,
    pub bounds: Option<LatLngBounds>,
    /// The parsed upload, for the frontend's uploaded-AOI display layer
    /// (shapefile uploads only exist as GeoJSON after server-side decoding).
    pub collection: geojson::GeoJson,
}

/// The control a toggle request addresses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToggleTarget {
    Aoi,
    Fetched,
    Uploaded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub control: ToggleTarget,
    pub checked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub converter_ready: bool,
    pub has_drawn_aoi: bool,
    pub has_uploaded_aoi: bool,
    pub fetch_enabled: bool,
    pub download_enabled: bool,
    pub feature_count: usize,
    pub toggles: ToggleStates,
}

pub const EMPTY_RESULT_MESSAGE: &str = "No OSM data found for the selected area and type.";
pub const OVERWRITE_CONFIRM_PROMPT: &str =
    "There is already fetched data on the map. Overwrite it with new data?";
pub const EXPORT_CONFIRM_PROMPT: &str = "Download the current GeoJSON data?";

/// Terminal result of one fetch round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Fetched {
        feature_count: usize,
        bounds: Option<LatLngBounds>,
        max_zoom: u8,
    },
    Empty {
        message: String,
    },
    ConfirmationRequired {
        message: String,
    },
}

impl FetchOutcome {
    pub fn empty() -> Self {
        FetchOutcome::Empty {
            message: EMPTY_RESULT_MESSAGE.to_string(),
        }
    }

    pub fn confirmation_required() -> Self {
        FetchOutcome::ConfirmationRequired {
            message: OVERWRITE_CONFIRM_PROMPT.to_string(),
        }
    }
}

/// Progress events published over SSE while a fetch is running. `Started`
/// shows the loading indicator; every other variant is terminal and hides it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchEvent {
    Started { layer: LayerType },
    Fetched { feature_count: usize },
    Empty,
    Error { message: String },
}

// ============================================================
// Unit Tests
// ============================================================
