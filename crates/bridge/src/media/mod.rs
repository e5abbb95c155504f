//! Media collaborator contracts.
//!
//! A [`MediaService`] opens one [`MediaSession`] per camera. The session owns
//! capture, encoding and snapshot extraction; accessories only hold it.

pub mod ffmpeg;

pub use ffmpeg::{FfmpegConfig, FfmpegMediaService, FfmpegSession};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::StreamParams;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

use crate::accessory::CameraAccessory;
use crate::error::MediaError;

#[async_trait]
pub trait MediaService: Send + Sync {
    async fn open_session(&self, params: &StreamParams) -> Result<Arc<dyn MediaSession>, MediaError>;
}

#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Grab a single still frame scaled to `width` x `height` (0 keeps aspect).
    async fn snapshot(&self, width: u32, height: u32) -> Result<Snapshot, MediaError>;

    /// Describe the streaming endpoints this session serves on `accessory`.
    fn attach_streaming_endpoints(&self, accessory: &mut CameraAccessory);

    async fn start_stream(&self, request: StreamRequest) -> Result<StreamSessionInfo, MediaError>;

    async fn stop_stream(&self, session_id: &str) -> Result<(), MediaError>;

    async fn active_streams(&self) -> Vec<StreamSessionInfo>;

    /// Stop every live stream and any helper process.
    async fn stop_all(&self);
}

/// An encoded still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Streaming configuration advertised to controllers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamingEndpoints {
    pub codec: String,
    pub resolutions: Vec<Resolution>,
    pub multi_stream: bool,
    pub min_video_bitrate: u32,
}

pub const SUPPORTED_RESOLUTIONS: [Resolution; 6] = [
    Resolution { width: 1920, height: 1080, fps: 30 },
    Resolution { width: 1280, height: 720, fps: 30 },
    Resolution { width: 640, height: 360, fps: 30 },
    Resolution { width: 480, height: 270, fps: 30 },
    Resolution { width: 320, height: 240, fps: 15 },
    Resolution { width: 320, height: 180, fps: 15 },
];

/// A controller's request to receive live video over RTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub address: IpAddr,
    pub video_port: u16,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub max_bitrate_kbps: u32,
}

fn default_fps() -> u32 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSessionInfo {
    pub id: String,
    pub request: StreamRequest,
    pub bitrate_kbps: u32,
    pub started_at: DateTime<Utc>,
}
