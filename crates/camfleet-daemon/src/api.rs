//! HTTP control surface
//!
//! Thin axum handlers over [`FleetState`]. Short operations run on the
//! blocking pool and answer with their result; scan, reset and download are
//! claimed through their flag, detached onto their own thread and
//! acknowledged immediately. Errors are reported as `{"error": ...}` with
//! HTTP 200 so the UI polls a single shape.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use camfleet_core::{DeviceCommand, FleetStatus, MediaSlot};

use crate::discovery::scan_and_connect;
use crate::fleet::{CommandTally, FleetState};
use crate::transfer::run_bulk_transfer;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Busy")]
    Busy,

    #[error("Download in progress")]
    DownloadInProgress,

    #[error("Download already in progress")]
    DownloadAlreadyRunning,

    #[error("Scan already in progress")]
    ScanInProgress,

    #[error("Missing path")]
    MissingPath,

    #[error("No cameras connected")]
    NoCameras,

    #[error("No connected camera")]
    NoConnectedCamera,

    #[error("Failed to save preset")]
    PresetSave,

    #[error("No preset file found at {}", .0.display())]
    NoPreset(PathBuf),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T = Json<Value>> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct PathRequest {
    #[serde(default)]
    path: String,
}

/// `path` from a JSON body; absent, empty and unparsable bodies give `None`
fn requested_path(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<PathRequest>(body)
        .ok()
        .map(|r| r.path)
        .filter(|p| !p.is_empty())
}

async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn detach(name: &str, work: impl FnOnce() + Send + 'static) -> ApiResult<()> {
    thread::Builder::new()
        .name(name.into())
        .spawn(work)
        .map(|_| ())
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub fn router(fleet: Arc<FleetState>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/start", post(start_recording))
        .route("/api/stop", post(stop_recording))
        .route("/api/scan", post(scan))
        .route("/api/reset", post(reset))
        .route("/api/format", post(format_media))
        .route("/api/preset", get(get_preset))
        .route("/api/preset/save", post(save_preset))
        .route("/api/preset/apply", post(apply_preset))
        .route("/api/download", post(download))
        .route("/api/set-download-path", post(set_download_path))
        .with_state(fleet)
}

/// Serve the control surface until `shutdown` resolves
pub async fn serve(
    fleet: Arc<FleetState>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(fleet)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Control surface listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// GET /api/status
pub async fn status(State(fleet): State<Arc<FleetState>>) -> ApiResult<Json<FleetStatus>> {
    let snapshot = blocking(move || fleet.snapshot()).await?;
    Ok(Json(snapshot))
}

async fn broadcast(fleet: Arc<FleetState>, command: DeviceCommand) -> ApiResult<Json<CommandTally>> {
    let tally = blocking(move || fleet.lock_registry().broadcast(command)).await?;
    info!(ok = tally.ok, failed = tally.failed, "{:?} sent to fleet", command);
    Ok(Json(tally))
}

/// POST /api/start
pub async fn start_recording(State(fleet): State<Arc<FleetState>>) -> ApiResult<Json<CommandTally>> {
    if fleet.downloading().is_set() {
        return Err(ApiError::DownloadInProgress);
    }
    broadcast(fleet, DeviceCommand::RecordStart).await
}

/// POST /api/stop
pub async fn stop_recording(State(fleet): State<Arc<FleetState>>) -> ApiResult<Json<CommandTally>> {
    if fleet.downloading().is_set() {
        return Err(ApiError::DownloadInProgress);
    }
    broadcast(fleet, DeviceCommand::RecordStop).await
}

/// POST /api/format: quick format of slot 1 on every camera
pub async fn format_media(State(fleet): State<Arc<FleetState>>) -> ApiResult<Json<CommandTally>> {
    if fleet.downloading().is_set() || fleet.scanning().is_set() {
        return Err(ApiError::Busy);
    }
    broadcast(fleet, DeviceCommand::QuickFormat(MediaSlot::Slot1)).await
}

/// POST /api/scan
pub async fn scan(State(fleet): State<Arc<FleetState>>) -> ApiResult {
    if fleet.downloading().is_set() {
        return Err(ApiError::DownloadInProgress);
    }
    let claimed = fleet.scanning().claim().ok_or(ApiError::ScanInProgress)?;

    detach("camfleet-scan", move || {
        let _claimed = claimed;
        let mut registry = fleet.lock_registry();
        scan_and_connect(&fleet, &mut registry, false);
    })?;
    Ok(Json(json!({ "status": "scan started" })))
}

/// POST /api/reset: drop every connection, reset the bus, rediscover
pub async fn reset(State(fleet): State<Arc<FleetState>>) -> ApiResult {
    if fleet.downloading().is_set() {
        return Err(ApiError::DownloadInProgress);
    }
    let claimed = fleet.scanning().claim().ok_or(ApiError::ScanInProgress)?;

    detach("camfleet-reset", move || {
        let _claimed = claimed;
        let mut registry = fleet.lock_registry();
        registry.disconnect_all();
        scan_and_connect(&fleet, &mut registry, true);
    })?;
    Ok(Json(json!({ "status": "reset started" })))
}

/// POST /api/preset/save: sample the first connected camera
pub async fn save_preset(State(fleet): State<Arc<FleetState>>) -> ApiResult {
    blocking(move || {
        let registry = fleet.lock_registry();
        if registry.is_empty() {
            return Err(ApiError::NoCameras);
        }
        let device = registry.first_connected().ok_or(ApiError::NoConnectedCamera)?;
        let store = fleet.presets();
        match store.save(device) {
            Ok(_) => Ok(Json(json!({
                "status": format!("Preset saved to {}", store.path().display())
            }))),
            Err(e) => {
                warn!("Preset save from {} failed: {}", device.identity(), e);
                Err(ApiError::PresetSave)
            }
        }
    })
    .await?
}

/// POST /api/preset/apply
pub async fn apply_preset(State(fleet): State<Arc<FleetState>>) -> ApiResult {
    blocking(move || {
        let registry = fleet.lock_registry();
        let store = fleet.presets();
        let entries = store
            .load()
            .map_err(|_| ApiError::NoPreset(store.path().to_path_buf()))?;
        let applied: usize = registry
            .connected()
            .map(|device| store.apply(device, &entries))
            .sum();
        Ok(Json(json!({ "applied": applied })))
    })
    .await?
}

/// GET /api/preset: parsed JSON when possible, raw text otherwise
pub async fn get_preset(State(fleet): State<Arc<FleetState>>) -> ApiResult {
    let store = fleet.presets();
    let preset = match store.read_raw() {
        Some(text) => serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text)),
        None => Value::Null,
    };
    Ok(Json(json!({
        "preset": preset,
        "path": store.path().display().to_string(),
    })))
}

/// POST /api/download `{path?}`
pub async fn download(State(fleet): State<Arc<FleetState>>, body: Bytes) -> ApiResult {
    let claimed = fleet
        .downloading()
        .claim()
        .ok_or(ApiError::DownloadAlreadyRunning)?;
    if let Some(path) = requested_path(&body) {
        fleet.set_download_path(path);
    }

    detach("camfleet-download", move || {
        let _claimed = claimed;
        if let Err(e) = run_bulk_transfer(&fleet) {
            warn!("Download aborted: {}", e);
        }
    })?;
    Ok(Json(json!({ "status": "download started" })))
}

/// POST /api/set-download-path `{path}`
pub async fn set_download_path(State(fleet): State<Arc<FleetState>>, body: Bytes) -> ApiResult {
    let path = requested_path(&body).ok_or(ApiError::MissingPath)?;
    fleet.set_download_path(&path);
    Ok(Json(json!({ "downloadPath": path })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use camfleet_core::PropertyCode;

    use crate::fleet::tests::fleet_with;
    use crate::sim::SimBank;

    fn connected(cameras: usize, dir: &std::path::Path) -> (Arc<SimBank>, Arc<FleetState>) {
        let bank = Arc::new(SimBank::with_cameras(cameras, "FX30"));
        let fleet = fleet_with(&bank, dir);
        {
            let mut registry = fleet.lock_registry();
            scan_and_connect(&fleet, &mut registry, false);
        }
        (bank, fleet)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..300 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_status_lists_cameras() {
        let dir = tempfile::tempdir().unwrap();
        let (_bank, fleet) = connected(2, dir.path());

        let Json(status) = status(State(fleet)).await.unwrap();
        assert_eq!(status.cameras.len(), 2);
        assert!(status.cameras.iter().all(|c| c.connected));
        assert!(!status.downloading);
        assert_eq!(status.cameras[0].iso, "ISO 400");
    }

    #[tokio::test]
    async fn test_start_and_stop_tally() {
        let dir = tempfile::tempdir().unwrap();
        let (bank, fleet) = connected(2, dir.path());

        let Json(tally) = start_recording(State(Arc::clone(&fleet))).await.unwrap();
        assert_eq!(tally, CommandTally { ok: 2, failed: 0 });
        assert_eq!(bank.property(1, PropertyCode::RecordingState), Some(1));

        let Json(tally) = stop_recording(State(fleet)).await.unwrap();
        assert_eq!(tally.ok, 2);
        assert_eq!(bank.property(1, PropertyCode::RecordingState), Some(0));
    }

    #[tokio::test]
    async fn test_actions_rejected_while_downloading() {
        let dir = tempfile::tempdir().unwrap();
        let (bank, fleet) = connected(1, dir.path());
        let _downloading = fleet.downloading().claim().unwrap();

        let start = start_recording(State(Arc::clone(&fleet))).await;
        assert!(matches!(start, Err(ApiError::DownloadInProgress)));
        let scan_result = scan(State(Arc::clone(&fleet))).await;
        assert!(matches!(scan_result, Err(ApiError::DownloadInProgress)));
        let format = format_media(State(Arc::clone(&fleet))).await;
        assert!(matches!(format, Err(ApiError::Busy)));
        let again = download(State(fleet), Bytes::new()).await;
        assert!(matches!(again, Err(ApiError::DownloadAlreadyRunning)));
        assert!(bank.commands().is_empty());
    }

    #[tokio::test]
    async fn test_scan_while_scanning_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let (bank, fleet) = connected(1, dir.path());
        let attempts = bank.open_attempts();

        let held = fleet.scanning().claim().unwrap();
        assert!(matches!(
            scan(State(Arc::clone(&fleet))).await,
            Err(ApiError::ScanInProgress)
        ));
        assert!(matches!(
            reset(State(Arc::clone(&fleet))).await,
            Err(ApiError::ScanInProgress)
        ));
        drop(held);

        scan(State(Arc::clone(&fleet))).await.unwrap();
        assert!(wait_until(|| !fleet.scanning().is_set()).await);
        // already connected, nothing reopened
        assert_eq!(bank.open_attempts(), attempts);
    }

    #[tokio::test]
    async fn test_reset_rebuilds_fleet() {
        let dir = tempfile::tempdir().unwrap();
        let (bank, fleet) = connected(2, dir.path());

        let Json(body) = reset(State(Arc::clone(&fleet))).await.unwrap();
        assert_eq!(body["status"], "reset started");
        assert!(wait_until(|| !fleet.scanning().is_set()).await);
        assert_eq!(bank.resets(), 1);
        assert_eq!(fleet.lock_registry().connected_count(), 2);
    }

    #[tokio::test]
    async fn test_preset_save_then_apply() {
        let dir = tempfile::tempdir().unwrap();
        let (_bank, fleet) = connected(2, dir.path());

        let Json(preset) = get_preset(State(Arc::clone(&fleet))).await.unwrap();
        assert_eq!(preset["preset"], Value::Null);

        let Json(saved) = save_preset(State(Arc::clone(&fleet))).await.unwrap();
        assert!(saved["status"]
            .as_str()
            .unwrap()
            .starts_with("Preset saved to "));

        let Json(preset) = get_preset(State(Arc::clone(&fleet))).await.unwrap();
        assert_eq!(preset["preset"]["iso"], 400);

        let Json(applied) = apply_preset(State(fleet)).await.unwrap();
        assert_eq!(applied["applied"], 0);
    }

    #[tokio::test]
    async fn test_preset_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(SimBank::new());
        let fleet = fleet_with(&bank, dir.path());

        assert!(matches!(
            save_preset(State(Arc::clone(&fleet))).await,
            Err(ApiError::NoCameras)
        ));
        assert!(matches!(
            apply_preset(State(Arc::clone(&fleet))).await,
            Err(ApiError::NoPreset(_))
        ));

        std::fs::write(fleet.presets().path(), "not json").unwrap();
        let Json(preset) = get_preset(State(fleet)).await.unwrap();
        assert_eq!(preset["preset"], "not json");
    }

    #[tokio::test]
    async fn test_download_uses_requested_path() {
        let dir = tempfile::tempdir().unwrap();
        let (_bank, fleet) = connected(1, dir.path());
        let target = dir.path().join("clips");
        let body = serde_json::to_vec(&json!({ "path": target })).unwrap();

        let Json(started) = download(State(Arc::clone(&fleet)), Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(started["status"], "download started");
        assert!(wait_until(|| !fleet.downloading().is_set()).await);

        assert_eq!(fleet.download_path(), target);
        assert!(target.join("C0001.MP4").exists());
        assert!(fleet.download_status().starts_with("Download complete."));
    }

    #[tokio::test]
    async fn test_set_download_path() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(SimBank::new());
        let fleet = fleet_with(&bank, dir.path());

        let missing = set_download_path(State(Arc::clone(&fleet)), Bytes::from_static(b"{}")).await;
        assert!(matches!(missing, Err(ApiError::MissingPath)));

        let Json(body) = set_download_path(
            State(Arc::clone(&fleet)),
            Bytes::from_static(br#"{"path":"/mnt/cards"}"#),
        )
        .await
        .unwrap();
        assert_eq!(body["downloadPath"], "/mnt/cards");
        assert_eq!(fleet.download_path(), PathBuf::from("/mnt/cards"));
    }

    #[tokio::test]
    async fn test_error_renders_json_with_ok_status() {
        let response = ApiError::Busy.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "error": "Busy" }));
    }
}
