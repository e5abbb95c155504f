//! Camera accessories and the builder that wires them to media sessions.

use common::CameraSpec;
use serde::Serialize;
use std::{fmt, sync::Arc};
use tracing::{debug, info};

use crate::error::{BridgeError, MediaError};
use crate::media::{
    MediaService, MediaSession, Snapshot, StreamRequest, StreamSessionInfo, StreamingEndpoints,
};

pub const MANUFACTURER: &str = "hkcambridge";
pub const FIRMWARE_REVISION: &str = "0.0.9";
pub const BRIDGE_NAME: &str = "Homekit IP Camera Bridge";

/// Identity of one accessory as shown to controllers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessoryInfo {
    pub id: u64,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_revision: String,
    pub serial_number: String,
}

impl AccessoryInfo {
    pub fn for_camera(spec: &CameraSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name.clone(),
            manufacturer: MANUFACTURER.into(),
            model: "Camera".into(),
            firmware_revision: FIRMWARE_REVISION.into(),
            serial_number: format!("CAM-{:08}", spec.id),
        }
    }
}

/// The aggregate accessory every camera hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_revision: String,
}

impl Default for BridgeInfo {
    fn default() -> Self {
        Self {
            name: BRIDGE_NAME.into(),
            manufacturer: MANUFACTURER.into(),
            model: "Bridge".into(),
            firmware_revision: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Live video delivery. Everything is delegated to the media session.
#[derive(Clone)]
pub struct StreamingCapability {
    session: Arc<dyn MediaSession>,
}

impl StreamingCapability {
    pub fn new(session: Arc<dyn MediaSession>) -> Self {
        Self { session }
    }

    pub async fn start_stream(&self, request: StreamRequest) -> Result<StreamSessionInfo, MediaError> {
        self.session.start_stream(request).await
    }

    pub async fn stop_stream(&self, session_id: &str) -> Result<(), MediaError> {
        self.session.stop_stream(session_id).await
    }

    pub async fn active_streams(&self) -> Vec<StreamSessionInfo> {
        self.session.active_streams().await
    }

    pub async fn stop_all(&self) {
        self.session.stop_all().await
    }
}

impl fmt::Debug for StreamingCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingCapability").finish_non_exhaustive()
    }
}

/// Pass-through adapter over the session's snapshot operation. Results are
/// returned exactly as the session produced them.
#[derive(Clone)]
pub struct SnapshotCapability {
    session: Arc<dyn MediaSession>,
}

impl SnapshotCapability {
    pub fn new(session: Arc<dyn MediaSession>) -> Self {
        Self { session }
    }

    pub async fn take_snapshot(&self, width: u32, height: u32) -> Result<Snapshot, MediaError> {
        self.session.snapshot(width, height).await
    }
}

impl fmt::Debug for SnapshotCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCapability").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct CameraAccessory {
    info: AccessoryInfo,
    endpoints: Option<StreamingEndpoints>,
    streaming: StreamingCapability,
    snapshot: SnapshotCapability,
}

impl CameraAccessory {
    pub fn new(info: AccessoryInfo, session: Arc<dyn MediaSession>) -> Self {
        Self {
            info,
            endpoints: None,
            streaming: StreamingCapability::new(Arc::clone(&session)),
            snapshot: SnapshotCapability::new(session),
        }
    }

    pub fn id(&self) -> u64 {
        self.info.id
    }

    pub fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    pub fn streaming_endpoints(&self) -> Option<&StreamingEndpoints> {
        self.endpoints.as_ref()
    }

    pub fn set_streaming_endpoints(&mut self, endpoints: StreamingEndpoints) {
        self.endpoints = Some(endpoints);
    }

    pub fn streaming(&self) -> &StreamingCapability {
        &self.streaming
    }

    pub fn snapshot(&self) -> &SnapshotCapability {
        &self.snapshot
    }
}

/// Ordered accessories built at startup. There is no way to add or remove
/// entries once the set exists.
#[derive(Debug, Default)]
pub struct AccessorySet {
    accessories: Vec<CameraAccessory>,
}

impl AccessorySet {
    pub fn len(&self) -> usize {
        self.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraAccessory> {
        self.accessories.iter()
    }

    pub fn get(&self, id: u64) -> Option<&CameraAccessory> {
        self.accessories.iter().find(|a| a.id() == id)
    }

    pub fn ids(&self) -> Vec<u64> {
        self.accessories.iter().map(CameraAccessory::id).collect()
    }
}

impl FromIterator<CameraAccessory> for AccessorySet {
    fn from_iter<I: IntoIterator<Item = CameraAccessory>>(iter: I) -> Self {
        Self {
            accessories: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AccessorySet {
    type Item = &'a CameraAccessory;
    type IntoIter = std::slice::Iter<'a, CameraAccessory>;

    fn into_iter(self) -> Self::IntoIter {
        self.accessories.iter()
    }
}

/// Turns a defaulted [`CameraSpec`] into a [`CameraAccessory`].
#[derive(Clone)]
pub struct CameraAccessoryBuilder {
    media: Arc<dyn MediaService>,
}

impl CameraAccessoryBuilder {
    pub fn new(media: Arc<dyn MediaService>) -> Self {
        Self { media }
    }

    pub async fn build(&self, spec: &CameraSpec) -> Result<CameraAccessory, BridgeError> {
        info!(camera_id = spec.id, name = %spec.name, "adding camera");

        let session = self
            .media
            .open_session(&spec.stream_params())
            .await
            .map_err(|source| BridgeError::MediaSetupFailed {
                camera_id: spec.id,
                source,
            })?;

        let mut accessory = CameraAccessory::new(AccessoryInfo::for_camera(spec), Arc::clone(&session));
        session.attach_streaming_endpoints(&mut accessory);

        debug!(camera_id = spec.id, input_device = %spec.input_device, "camera accessory wired");
        Ok(accessory)
    }
}
