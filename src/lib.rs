pub mod aoi;
pub mod api_types;
pub mod controller;
pub mod convert;
pub mod overpass;
pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
};

use controller::FetchController;
use overpass::OverpassClient;
use routes::SharedController;

pub fn create_router() -> Router {
    create_router_with_frontend_dist(resolve_frontend_dist_dir())
}

fn create_router_with_frontend_dist(frontend_dist_dir: Option<PathBuf>) -> Router {
    let state: SharedController =
        Arc::new(RwLock::new(FetchController::new(OverpassClient::new())));

    tokio::spawn(warm_up_converter(state.clone()));

    let router = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/status", get(routes::status))
        .route("/api/aoi/draw", post(routes::draw_aoi))
        .route("/api/aoi/upload/{filename}", post(routes::upload_aoi))
        .route("/api/aoi/remove", post(routes::remove_upload))
        .route("/api/fetch", post(routes::fetch_data))
        .route("/api/fetch/events", get(routes::fetch_events))
        .route("/api/selection/clear", post(routes::clear_selection))
        .route("/api/export", get(routes::export_geojson))
        .route("/api/toggles", post(routes::set_toggle))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));

    if let Some(dist_dir) = frontend_dist_dir {
        let index_file = dist_dir.join("index.html");
        let static_assets = ServeDir::new(dist_dir).not_found_service(ServeFile::new(index_file));
        return router.fallback_service(static_assets);
    }

    router
}

const WARMUP_ATTEMPTS: u32 = 3;

/// Flip the converter gate once the Overpass endpoint answers. Until then
/// the fetch gate stays closed and the frontend keeps its button disabled.
async fn warm_up_converter(state: SharedController) {
    let client = { state.read().await.overpass().clone() };

    for attempt in 1..=WARMUP_ATTEMPTS {
        match client.probe().await {
            Ok(()) => {
                state.write().await.mark_converter_ready();
                return;
            }
            Err(e) => {
                eprintln!("Overpass warmup attempt {attempt} failed: {e}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }

    eprintln!("Overpass warmup gave up; fetch stays disabled");
}

fn resolve_frontend_dist_dir() -> Option<PathBuf> {
    if let Ok(dist_dir) = std::env::var("FRONTEND_DIST") {
        let trimmed = dist_dir.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let default_dist = PathBuf::from("dist");
    if default_dist.exists() {
        return Some(default_dist);
    }

    None
}
