//! The fetch controller: all state the map page needs between requests.
//!
//! Exactly one AOI is active for a fetch, the uploaded one winning over the
//! drawn one when both exist. The last fetched collection is replaced
//! wholesale per fetch and only cleared by an explicit clear. Fetching is
//! single-flight: a guard rejects overlapping requests and completions carry
//! a generation tag so a stale response can never clobber newer state.

use geojson::FeatureCollection;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::aoi::{self, AoiError, UploadedAoi};
use crate::api_types::{
    FetchEvent, FetchOutcome, LatLng, LayerType, StatusResponse, Toggle, ToggleStates,
    ToggleTarget, UploadResponse, EXPORT_CONFIRM_PROMPT,
};
use crate::convert;
use crate::overpass::{build_query, OverpassClient, OverpassError};

/// Zoom cap applied when the frontend refits to fetched data.
pub const MAX_FIT_ZOOM: u8 = 17;

/// Fixed name of the exported artifact.
pub const EXPORT_FILENAME: &str = "osm_data.geojson";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Please draw an AOI or upload a file, and select a layer type first.")]
    MissingAoi,
    #[error("The OSM data converter is not ready yet. Try again in a moment.")]
    ConverterNotReady,
    #[error("A fetch is already in progress.")]
    FetchInFlight,
    #[error("Stale fetch completion discarded.")]
    StaleFetch,
    #[error("Cannot toggle a disabled layer control.")]
    ToggleDisabled,
    #[error("{0}")]
    Upload(#[from] AoiError),
    #[error("Error fetching OSM data: {0}")]
    Fetch(#[from] OverpassError),
    #[error("Failed to serialize GeoJSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What `begin_fetch` decided.
#[derive(Debug)]
pub enum BeginFetch {
    /// Gate passed; run this query and report back with the generation tag.
    Started { query: String, generation: u64 },
    /// A non-empty result would be overwritten; ask the user first.
    NeedsConfirmation,
}

#[derive(Debug)]
pub enum ExportOutcome {
    /// Nothing fetched yet: no dialog, no file.
    NoData,
    ConfirmationRequired { message: String },
    Ready { filename: &'static str, body: String },
}

pub struct FetchController {
    overpass: OverpassClient,
    drawn_aoi: Option<Vec<LatLng>>,
    uploaded: Option<UploadedAoi>,
    last_result: Option<FeatureCollection>,
    converter_ready: bool,
    in_flight: bool,
    generation: u64,
    toggles: ToggleStates,
    events: broadcast::Sender<FetchEvent>,
}

impl FetchController {
    pub fn new(overpass: OverpassClient) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            overpass,
            drawn_aoi: None,
            uploaded: None,
            last_result: None,
            converter_ready: false,
            in_flight: false,
            generation: 0,
            toggles: ToggleStates::default(),
            events,
        }
    }

    pub fn overpass(&self) -> &OverpassClient {
        &self.overpass
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> {
        self.events.subscribe()
    }

    pub fn mark_converter_ready(&mut self) {
        self.converter_ready = true;
        println!("OSM converter ready, fetch unlocked");
    }

    /// The fetch gate: an AOI exists and the converter finished loading.
    pub fn fetch_enabled(&self) -> bool {
        (self.drawn_aoi.is_some() || self.uploaded.is_some()) && self.converter_ready
    }

    /// Replace any existing drawn AOI (single AOI at a time).
    pub fn set_drawn_aoi(&mut self, ring: Vec<LatLng>) {
        self.drawn_aoi = Some(aoi::close_ring(ring));
        self.toggles.aoi = Toggle::on();
    }

    /// Parse and store an upload. Failure leaves the prior upload untouched.
    pub fn set_upload(
        &mut self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadResponse, ControllerError> {
        let uploaded = aoi::parse_upload(filename, bytes)?;
        let response = UploadResponse {
            vertex_count: uploaded.ring.len(),
            bounds: uploaded.bounds,
            collection: uploaded.display.clone(),
        };
        self.uploaded = Some(uploaded);
        self.toggles.uploaded = Toggle::on();
        Ok(response)
    }

    pub fn remove_upload(&mut self) {
        self.uploaded = None;
        self.toggles.uploaded = Toggle::disabled();
    }

    /// The ring the next fetch will use; uploaded wins over drawn.
    fn active_ring(&self) -> Option<&Vec<LatLng>> {
        self.uploaded
            .as_ref()
            .map(|u| &u.ring)
            .or(self.drawn_aoi.as_ref())
    }

    pub fn begin_fetch(
        &mut self,
        layer: LayerType,
        confirm: bool,
    ) -> Result<BeginFetch, ControllerError> {
        if !self.converter_ready {
            return Err(ControllerError::ConverterNotReady);
        }
        if self.in_flight {
            return Err(ControllerError::FetchInFlight);
        }
        let ring = self.active_ring().ok_or(ControllerError::MissingAoi)?;
        if !confirm {
            if let Some(result) = &self.last_result {
                if !result.features.is_empty() {
                    return Ok(BeginFetch::NeedsConfirmation);
                }
            }
        }
        let query = build_query(layer, ring);
        self.generation += 1;
        self.in_flight = true;
        let _ = self.events.send(FetchEvent::Started { layer });
        Ok(BeginFetch::Started {
            query,
            generation: self.generation,
        })
    }

    /// Apply the result of the fetch started under `generation`. A terminal
    /// event is published whatever the outcome, so the loading indicator
    /// always comes down.
    pub fn complete_fetch(
        &mut self,
        generation: u64,
        result: Result<FeatureCollection, OverpassError>,
    ) -> Result<FetchOutcome, ControllerError> {
        if generation != self.generation {
            println!(
                "Discarding stale fetch completion (generation {generation}, current {})",
                self.generation
            );
            return Err(ControllerError::StaleFetch);
        }
        self.in_flight = false;

        match result {
            Ok(collection) => {
                let feature_count = collection.features.len();
                if feature_count == 0 {
                    // Discard; the frontend clears the layer and keeps its framing.
                    self.last_result = None;
                    self.toggles.fetched = Toggle::disabled();
                    let _ = self.events.send(FetchEvent::Empty);
                    println!("Overpass returned no features for the selected area");
                    Ok(FetchOutcome::empty())
                } else {
                    let bounds = convert::collection_bounds(&collection);
                    self.last_result = Some(collection);
                    self.toggles.fetched = Toggle::on();
                    let _ = self.events.send(FetchEvent::Fetched { feature_count });
                    println!("Fetched {} features", feature_count);
                    Ok(FetchOutcome::Fetched {
                        feature_count,
                        bounds,
                        max_zoom: MAX_FIT_ZOOM,
                    })
                }
            }
            Err(err) => {
                // A failed refresh must not wipe valid displayed data; the
                // previous result and its controls stay as they were.
                let error = ControllerError::Fetch(err);
                let _ = self.events.send(FetchEvent::Error {
                    message: error.to_string(),
                });
                eprintln!("{error}");
                Err(error)
            }
        }
    }

    pub fn clear_selection(&mut self) {
        self.last_result = None;
        self.toggles.fetched = Toggle::disabled();
    }

    pub fn export(&self, confirm: bool) -> Result<ExportOutcome, ControllerError> {
        let Some(result) = &self.last_result else {
            return Ok(ExportOutcome::NoData);
        };
        if !confirm {
            return Ok(ExportOutcome::ConfirmationRequired {
                message: EXPORT_CONFIRM_PROMPT.to_string(),
            });
        }
        let body = serde_json::to_string_pretty(result)?;
        Ok(ExportOutcome::Ready {
            filename: EXPORT_FILENAME,
            body,
        })
    }

    /// Flip one layer switch. Pure presentation: data is never touched.
    pub fn set_toggle(
        &mut self,
        target: ToggleTarget,
        checked: bool,
    ) -> Result<ToggleStates, ControllerError> {
        let toggle = match target {
            ToggleTarget::Aoi => &mut self.toggles.aoi,
            ToggleTarget::Fetched => &mut self.toggles.fetched,
            ToggleTarget::Uploaded => &mut self.toggles.uploaded,
        };
        if !toggle.enabled {
            return Err(ControllerError::ToggleDisabled);
        }
        toggle.checked = checked;
        Ok(self.toggles)
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            converter_ready: self.converter_ready,
            has_drawn_aoi: self.drawn_aoi.is_some(),
            has_uploaded_aoi: self.uploaded.is_some(),
            fetch_enabled: self.fetch_enabled(),
            download_enabled: self.last_result.is_some(),
            feature_count: self.last_result.as_ref().map_or(0, |c| c.features.len()),
            toggles: self.toggles,
        }
    }
}

// ============================================================
// Unit Tests
// ============================================================
