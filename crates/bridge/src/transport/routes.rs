use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::accessory::{AccessoryInfo, AccessorySet, BridgeInfo, CameraAccessory};
use crate::assets::{AssetInfo, AssetStore};
use crate::error::{AssetError, MediaError};
use crate::media::{StreamRequest, StreamSessionInfo, StreamingEndpoints};
use crate::metrics::{self, SNAPSHOTS_TOTAL, SNAPSHOT_FAILURES};

pub const PAIRING_PIN_HEADER: &str = "x-pairing-pin";

#[derive(Clone)]
pub struct AppState {
    bridge: Arc<BridgeInfo>,
    accessories: Arc<AccessorySet>,
    assets: Arc<AssetStore>,
    pairing_pin: Arc<str>,
}

impl AppState {
    pub fn new(
        bridge: BridgeInfo,
        accessories: Arc<AccessorySet>,
        assets: AssetStore,
        pairing_pin: &str,
    ) -> Self {
        Self {
            bridge: Arc::new(bridge),
            accessories,
            assets: Arc::new(assets),
            pairing_pin: Arc::from(pairing_pin),
        }
    }

    fn camera(&self, id: u64) -> Result<&CameraAccessory, ApiError> {
        self.accessories
            .get(id)
            .ok_or_else(|| ApiError::not_found(format!("camera {} not found", id)))
    }
}

pub fn router(state: AppState) -> Router {
    let paired = Router::new()
        .route("/accessories", get(list_accessories))
        .route("/resource", post(take_snapshot))
        .route("/accessories/:id/streams", get(list_streams).post(start_stream))
        .route("/accessories/:id/streams/:session_id", delete(stop_stream))
        .route(
            "/accessories/:id/assets",
            get(list_assets).post(save_asset).delete(delete_assets),
        )
        .route("/accessories/:id/assets/:asset_id", get(get_asset))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_pairing_pin));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(|| async { metrics::render() }))
        .merge(paired)
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::InvalidId(_) => ApiError::BadRequest(err.to_string()),
            AssetError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AssetError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Busy(_) => ApiError::Conflict(err.to_string()),
            MediaError::StreamNotFound(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

async fn require_pairing_pin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(PAIRING_PIN_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(pin) if pin == &*state.pairing_pin => Ok(next.run(request).await),
        Some(_) => Err(ApiError::Unauthorized("pairing pin mismatch".into())),
        None => Err(ApiError::Unauthorized(format!("missing {} header", PAIRING_PIN_HEADER))),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct AccessoryView {
    #[serde(flatten)]
    pub info: AccessoryInfo,
    pub streaming: Option<StreamingEndpoints>,
}

#[derive(Debug, Serialize)]
pub struct AccessoriesResponse {
    pub bridge: BridgeInfo,
    pub accessories: Vec<AccessoryView>,
}

async fn list_accessories(State(state): State<AppState>) -> Json<AccessoriesResponse> {
    let accessories = state
        .accessories
        .iter()
        .map(|a| AccessoryView {
            info: a.info().clone(),
            streaming: a.streaming_endpoints().cloned(),
        })
        .collect();

    Json(AccessoriesResponse {
        bridge: (*state.bridge).clone(),
        accessories,
    })
}

/// Snapshot request body, using the HomeKit `/resource` field names.
#[derive(Debug, Deserialize)]
pub struct ResourceRequest {
    #[serde(alias = "aid")]
    pub camera_id: u64,
    #[serde(rename = "resource-type", default = "default_resource_type")]
    pub resource_type: String,
    #[serde(rename = "image-width", default)]
    pub image_width: u32,
    #[serde(rename = "image-height", default)]
    pub image_height: u32,
}

fn default_resource_type() -> String {
    "image".to_string()
}

async fn take_snapshot(
    State(state): State<AppState>,
    Json(req): Json<ResourceRequest>,
) -> Result<Response, ApiError> {
    if req.resource_type != "image" {
        return Err(ApiError::bad_request(format!(
            "unsupported resource-type '{}'",
            req.resource_type
        )));
    }

    let camera = state.camera(req.camera_id)?;
    SNAPSHOTS_TOTAL.inc();

    match camera
        .snapshot()
        .take_snapshot(req.image_width, req.image_height)
        .await
    {
        Ok(snap) => Ok(([(header::CONTENT_TYPE, snap.content_type)], snap.data).into_response()),
        Err(e) => {
            SNAPSHOT_FAILURES.inc();
            warn!(camera_id = req.camera_id, error = %e, "snapshot request failed");
            Err(e.into())
        }
    }
}

async fn list_streams(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<StreamSessionInfo>>, ApiError> {
    let camera = state.camera(id)?;
    Ok(Json(camera.streaming().active_streams().await))
}

async fn start_stream(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<StreamRequest>,
) -> Result<(StatusCode, Json<StreamSessionInfo>), ApiError> {
    let camera = state.camera(id)?;
    let session = camera.streaming().start_stream(request).await?;
    info!(camera_id = id, stream_id = %session.id, "stream session started");
    Ok((StatusCode::CREATED, Json(session)))
}

async fn stop_stream(
    State(state): State<AppState>,
    Path((id, session_id)): Path<(u64, String)>,
) -> Result<StatusCode, ApiError> {
    let camera = state.camera(id)?;
    camera.streaming().stop_stream(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveAssetRequest {
    #[serde(rename = "image-width", default)]
    pub image_width: u32,
    #[serde(rename = "image-height", default)]
    pub image_height: u32,
}

/// Take a snapshot and keep it as an asset. The body is optional.
async fn save_asset(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: Option<Json<SaveAssetRequest>>,
) -> Result<(StatusCode, Json<AssetInfo>), ApiError> {
    let camera = state.camera(id)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();

    SNAPSHOTS_TOTAL.inc();
    let snap = match camera
        .snapshot()
        .take_snapshot(req.image_width, req.image_height)
        .await
    {
        Ok(snap) => snap,
        Err(e) => {
            SNAPSHOT_FAILURES.inc();
            warn!(camera_id = id, error = %e, "snapshot for asset failed");
            return Err(e.into());
        }
    };

    let asset = state.assets.save(id, &snap).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

async fn list_assets(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<AssetInfo>>, ApiError> {
    state.camera(id)?;
    Ok(Json(state.assets.list(id).await?))
}

async fn get_asset(
    State(state): State<AppState>,
    Path((id, asset_id)): Path<(u64, String)>,
) -> Result<Response, ApiError> {
    state.camera(id)?;
    let data = state.assets.get(id, &asset_id).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], data).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DeleteAssetsRequest {
    pub ids: Vec<String>,
}

async fn delete_assets(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<DeleteAssetsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.camera(id)?;
    let deleted = state.assets.delete(id, &req.ids).await?;
    info!(camera_id = id, deleted, "assets deleted");
    Ok(Json(json!({ "deleted": deleted })))
}
