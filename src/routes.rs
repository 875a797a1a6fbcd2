use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::StatusCode,
    response::{sse::Event, IntoResponse, Response, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;

use futures::stream::Stream;
use tokio::sync::RwLock;

use crate::api_types::{
    DrawRequest, ExportQuery, FetchOutcome, FetchRequest, StatusResponse, ToggleRequest,
    ToggleStates, UploadResponse,
};
use crate::controller::{BeginFetch, ExportOutcome, FetchController};

pub type SharedController = Arc<RwLock<FetchController>>;

pub async fn health() -> &'static str {
    "OK"
}

pub async fn status(State(state): State<SharedController>) -> Json<StatusResponse> {
    Json(state.read().await.status())
}

pub async fn draw_aoi(
    State(state): State<SharedController>,
    Json(req): Json<DrawRequest>,
) -> Json<StatusResponse> {
    println!("Drawn AOI with {} vertices", req.ring.len());
    let mut controller = state.write().await;
    controller.set_drawn_aoi(req.ring);
    Json(controller.status())
}

pub async fn upload_aoi(
    State(state): State<SharedController>,
    Path(filename): Path<String>,
    body: Bytes,
) -> Result<Json<UploadResponse>, String> {
    println!("Upload request: {} ({} bytes)", filename, body.len());

    let mut controller = state.write().await;
    let response = controller.set_upload(&filename, &body).map_err(|e| {
        eprintln!("Upload error: {e}");
        e.to_string()
    })?;

    println!("Uploaded AOI with {} vertices", response.vertex_count);
    Ok(Json(response))
}

pub async fn remove_upload(State(state): State<SharedController>) -> Json<StatusResponse> {
    let mut controller = state.write().await;
    controller.remove_upload();
    Json(controller.status())
}

pub async fn fetch_data(
    State(state): State<SharedController>,
    Json(req): Json<FetchRequest>,
) -> Result<Json<FetchOutcome>, String> {
    let (query, generation, client) = {
        let mut controller = state.write().await;
        match controller
            .begin_fetch(req.layer, req.confirm)
            .map_err(|e| e.to_string())?
        {
            BeginFetch::NeedsConfirmation => {
                return Ok(Json(FetchOutcome::confirmation_required()))
            }
            BeginFetch::Started { query, generation } => {
                (query, generation, controller.overpass().clone())
            }
        }
    };

    println!("Overpass query: {}", query);

    // Detached task: a dropped connection must not strand the in-flight
    // guard, and the terminal event still fires for the SSE indicator.
    let job_state = state.clone();
    let job = tokio::spawn(async move {
        let result = client.query(&query).await;
        let mut controller = job_state.write().await;
        controller.complete_fetch(generation, result)
    });

    match job.await {
        Ok(outcome) => outcome.map(Json).map_err(|e| e.to_string()),
        Err(join_err) => Err(join_err.to_string()),
    }
}

pub async fn fetch_events(
    State(state): State<SharedController>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.read().await.subscribe();

    let stream = async_stream::stream! {
        while let Ok(event) = rx.recv().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(json));
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

pub async fn clear_selection(State(state): State<SharedController>) -> Json<StatusResponse> {
    let mut controller = state.write().await;
    controller.clear_selection();
    Json(controller.status())
}

pub async fn export_geojson(
    State(state): State<SharedController>,
    Query(params): Query<ExportQuery>,
) -> Result<Response, String> {
    let outcome = state
        .read()
        .await
        .export(params.confirm)
        .map_err(|e| e.to_string())?;

    match outcome {
        ExportOutcome::NoData => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .map_err(|e| e.to_string()),
        ExportOutcome::ConfirmationRequired { message } => {
            let body = serde_json::json!({
                "outcome": "confirmation_required",
                "message": message,
            });
            Ok(Json(body).into_response())
        }
        ExportOutcome::Ready { filename, body } => Response::builder()
            .header("Content-Type", "application/geo+json")
            .header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", filename),
            )
            .body(Body::from(body))
            .map_err(|e| e.to_string()),
    }
}

pub async fn set_toggle(
    State(state): State<SharedController>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<ToggleStates>, String> {
    let mut controller = state.write().await;
    controller
        .set_toggle(req.control, req.checked)
        .map(Json)
        .map_err(|e| e.to_string())
}
