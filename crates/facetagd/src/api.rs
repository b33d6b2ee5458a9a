//! HTTP surface: detect, reset, status, health, and the optional browser client.

use crate::frame;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use facetag_core::{BoundingBox, RelativeBox};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;

/// Uploads are webcam frames; anything larger is a client bug.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

const INVALID_FORMAT: &str = "invalid_format";
const INVALID_IMAGE: &str = "invalid_image";

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec![header::CONTENT_TYPE, header::ACCEPT]);

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/detect", post(detect))
        .route("/api/reset", post(reset))
        .route("/api/status", get(status));

    if let Some(dir) = &state.config.static_dir {
        tracing::info!(dir = %dir.display(), "serving static client");
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    /// Frame as a `data:image/...;base64,` URL.
    #[serde(default)]
    pub image: String,
    /// Face detections in frame-relative coordinates.
    #[serde(default)]
    pub faces: Vec<RelativeBox>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentitiesResponse {
    pub identities: Vec<String>,
}

fn identities(status: StatusCode, labels: Vec<String>) -> (StatusCode, Json<IdentitiesResponse>) {
    (status, Json(IdentitiesResponse { identities: labels }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn detect(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> (StatusCode, Json<IdentitiesResponse>) {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            tracing::info!(error = %rejection, "rejecting malformed detect body");
            return identities(StatusCode::BAD_REQUEST, vec![INVALID_FORMAT.to_string()]);
        }
    };
    let (width, height) = (state.config.frame_width, state.config.frame_height);

    let frame = match frame::decode_frame(&req.image, width, height) {
        Ok(f) => f,
        Err(e) => {
            tracing::info!(error = %e, "rejecting upload");
            let label = if e.is_format() { INVALID_FORMAT } else { INVALID_IMAGE };
            return identities(StatusCode::BAD_REQUEST, vec![label.to_string()]);
        }
    };

    let boxes: Vec<BoundingBox> = req
        .faces
        .iter()
        .map(|rel| BoundingBox::from_relative(rel, width, height))
        .collect();

    let resolver = Arc::clone(&state.resolver);
    let faces = boxes.len();
    let result = tokio::task::spawn_blocking(move || resolver.resolve_identities(&frame, &boxes)).await;

    match result {
        Ok(Ok(labels)) => {
            tracing::debug!(faces, ?labels, "frame resolved");
            identities(StatusCode::OK, labels)
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "model initialization failed");
            identities(StatusCode::INTERNAL_SERVER_ERROR, vec![format!("model_error: {e}")])
        }
        Err(e) => {
            tracing::error!(error = %e, "resolution task failed");
            identities(StatusCode::INTERNAL_SERVER_ERROR, vec![state.config.sentinels.error.clone()])
        }
    }
}

async fn reset(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let cleared = state.memory().reset();
    tracing::info!(cleared, "identity memory reset");
    Json(serde_json::json!({ "status": "ok", "cleared": cleared }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let ready = state.models().get();
    let memory = state.memory();
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "models_ready": ready.is_some(),
        "strategy": ready.map(|r| r.strategy().as_str()).unwrap_or("uninitialized"),
        "known_identities": ready.map(|r| r.database().len()).unwrap_or(0),
        "memory": {
            "entries": memory.len(),
            "capacity": memory.capacity(),
        },
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
