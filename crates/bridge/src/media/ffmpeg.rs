//! ffmpeg-backed media sessions
//!
//! Snapshots and live streams are produced by spawning the `ffmpeg` binary.
//! When a camera allows several viewers and has a loopback device configured,
//! a feeder process copies the capture device into the loopback device once
//! and every viewer reads the loopback device instead.

use async_trait::async_trait;
use chrono::Utc;
use common::StreamParams;
use std::{collections::HashMap, path::Path, process::Stdio, sync::Arc};
use tokio::{
    process::{Child, Command},
    sync::Mutex,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    MediaService, MediaSession, Snapshot, StreamRequest, StreamSessionInfo, StreamingEndpoints,
    SUPPORTED_RESOLUTIONS,
};
use crate::accessory::CameraAccessory;
use crate::error::MediaError;
use crate::metrics::ACTIVE_STREAMS;

/// RTP payload type used for H.264 video
const VIDEO_PAYLOAD_TYPE: u8 = 99;

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// Path or name of the ffmpeg binary
    pub binary: String,
    /// Let ffmpeg log at info level instead of errors only
    pub verbose: bool,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            verbose: false,
        }
    }
}

pub struct FfmpegMediaService {
    config: FfmpegConfig,
}

impl FfmpegMediaService {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MediaService for FfmpegMediaService {
    async fn open_session(&self, params: &StreamParams) -> Result<Arc<dyn MediaSession>, MediaError> {
        if params.input_device.trim().is_empty() {
            return Err(MediaError::SetupFailed("input device is not set".into()));
        }

        if params.input_device == "v4l2" {
            ensure_device(&params.source_filename)?;
            if uses_loopback(params) {
                ensure_device(&params.loopback_filename)?;
            }
        }

        debug!(
            input_device = %params.input_device,
            source = %params.source_filename,
            multi_stream = params.multi_stream,
            "media session opened"
        );
        Ok(Arc::new(FfmpegSession::new(params.clone(), self.config.clone())))
    }
}

fn ensure_device(path: &str) -> Result<(), MediaError> {
    if Path::new(path).exists() {
        Ok(())
    } else {
        Err(MediaError::SetupFailed(format!(
            "capture device {} is not available",
            path
        )))
    }
}

fn uses_loopback(params: &StreamParams) -> bool {
    params.multi_stream && !params.loopback_filename.is_empty()
}

pub struct FfmpegSession {
    params: StreamParams,
    config: FfmpegConfig,
    streams: Mutex<HashMap<String, (StreamSessionInfo, Child)>>,
    feeder: Mutex<Option<Child>>,
}

impl FfmpegSession {
    pub fn new(params: StreamParams, config: FfmpegConfig) -> Self {
        Self {
            params,
            config,
            streams: Mutex::new(HashMap::new()),
            feeder: Mutex::new(None),
        }
    }

    fn loglevel_args(&self) -> Vec<String> {
        let level = if self.config.verbose { "info" } else { "error" };
        vec!["-hide_banner".into(), "-loglevel".into(), level.into()]
    }

    fn input_args(&self, source: &str) -> Vec<String> {
        let mut args = vec!["-f".to_string(), self.params.input_device.clone()];
        if !self.params.h264_decoder.is_empty() {
            args.push("-c:v".into());
            args.push(self.params.h264_decoder.clone());
        }
        args.push("-i".into());
        args.push(source.to_string());
        args
    }

    /// Device viewers read from.
    fn viewer_source(&self) -> &str {
        if uses_loopback(&self.params) {
            &self.params.loopback_filename
        } else {
            &self.params.source_filename
        }
    }

    fn snapshot_args(&self, width: u32, height: u32) -> Vec<String> {
        let mut args = self.loglevel_args();
        args.extend(self.input_args(self.viewer_source()));
        args.extend(["-frames:v".to_string(), "1".to_string()]);
        if let Some(filter) = scale_filter(width, height) {
            args.push("-vf".into());
            args.push(filter);
        }
        args.extend(
            ["-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }

    fn stream_bitrate(&self, request: &StreamRequest) -> u32 {
        request.max_bitrate_kbps.max(self.params.min_video_bitrate)
    }

    fn stream_args(&self, request: &StreamRequest) -> Vec<String> {
        let mut args = self.loglevel_args();
        args.extend(self.input_args(self.viewer_source()));
        args.push("-an".into());
        if !self.params.h264_encoder.is_empty() {
            args.push("-vcodec".into());
            args.push(self.params.h264_encoder.clone());
        }
        args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
        args.push("-r".into());
        args.push(request.fps.to_string());
        if let Some(filter) = scale_filter(request.width, request.height) {
            args.push("-vf".into());
            args.push(filter);
        }
        let bitrate = self.stream_bitrate(request);
        if bitrate > 0 {
            args.push("-b:v".into());
            args.push(format!("{}k", bitrate));
        }
        args.push("-payload_type".into());
        args.push(VIDEO_PAYLOAD_TYPE.to_string());
        args.push("-f".into());
        args.push("rtp".into());
        args.push(format!(
            "rtp://{}:{}?pkt_size=1316",
            request.address, request.video_port
        ));
        args
    }

    fn feeder_args(&self) -> Vec<String> {
        let mut args = self.loglevel_args();
        args.extend(self.input_args(&self.params.source_filename));
        args.extend(
            ["-vcodec", "rawvideo", "-pix_fmt", "yuv420p", "-f", "v4l2"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(self.params.loopback_filename.clone());
        args
    }

    fn spawn(&self, args: &[String]) -> Result<Child, MediaError> {
        Command::new(&self.config.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::StreamFailed(format!("spawn {} failed: {}", self.config.binary, e)))
    }

    async fn ensure_feeder(&self) -> Result<(), MediaError> {
        if !uses_loopback(&self.params) {
            return Ok(());
        }
        let mut feeder = self.feeder.lock().await;
        let running = match feeder.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        if !running {
            info!(
                source = %self.params.source_filename,
                loopback = %self.params.loopback_filename,
                "starting loopback feeder"
            );
            *feeder = Some(self.spawn(&self.feeder_args())?);
        }
        Ok(())
    }

    fn prune_exited(streams: &mut HashMap<String, (StreamSessionInfo, Child)>) {
        let exited: Vec<String> = streams
            .iter_mut()
            .filter_map(|(id, (_, child))| match child.try_wait() {
                Ok(Some(_)) | Err(_) => Some(id.clone()),
                Ok(None) => None,
            })
            .collect();
        for id in exited {
            streams.remove(&id);
            ACTIVE_STREAMS.dec();
            warn!(stream_id = %id, "stream process exited");
        }
    }
}

#[async_trait]
impl MediaSession for FfmpegSession {
    async fn snapshot(&self, width: u32, height: u32) -> Result<Snapshot, MediaError> {
        self.ensure_feeder()
            .await
            .map_err(|e| MediaError::SnapshotFailed(e.to_string()))?;

        let args = self.snapshot_args(width, height);
        debug!(args = ?args, "spawning ffmpeg for snapshot");

        let output = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MediaError::SnapshotFailed(format!("failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            error!(
                source = %self.viewer_source(),
                status = ?output.status,
                "ffmpeg snapshot failed"
            );
            return Err(MediaError::SnapshotFailed(format!(
                "ffmpeg exited with {}",
                output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(MediaError::SnapshotFailed("ffmpeg produced no image".into()));
        }

        Ok(Snapshot {
            width,
            height,
            content_type: "image/jpeg".into(),
            data: output.stdout,
        })
    }

    fn attach_streaming_endpoints(&self, accessory: &mut CameraAccessory) {
        accessory.set_streaming_endpoints(StreamingEndpoints {
            codec: "h264".into(),
            resolutions: SUPPORTED_RESOLUTIONS.to_vec(),
            multi_stream: self.params.multi_stream,
            min_video_bitrate: self.params.min_video_bitrate,
        });
    }

    async fn start_stream(&self, request: StreamRequest) -> Result<StreamSessionInfo, MediaError> {
        let mut streams = self.streams.lock().await;
        Self::prune_exited(&mut streams);

        if !self.params.multi_stream && !streams.is_empty() {
            return Err(MediaError::Busy(format!(
                "{} already serves a viewer",
                self.params.source_filename
            )));
        }

        self.ensure_feeder().await?;

        let args = self.stream_args(&request);
        info!(address = %request.address, port = request.video_port, args = ?args, "starting stream");
        let child = self.spawn(&args)?;

        let info = StreamSessionInfo {
            id: Uuid::new_v4().to_string(),
            bitrate_kbps: self.stream_bitrate(&request),
            request,
            started_at: Utc::now(),
        };
        streams.insert(info.id.clone(), (info.clone(), child));
        ACTIVE_STREAMS.inc();
        Ok(info)
    }

    async fn stop_stream(&self, session_id: &str) -> Result<(), MediaError> {
        let mut streams = self.streams.lock().await;
        let Some((_, mut child)) = streams.remove(session_id) else {
            return Err(MediaError::StreamNotFound(session_id.to_string()));
        };
        ACTIVE_STREAMS.dec();
        if let Err(e) = child.kill().await {
            warn!(stream_id = %session_id, "kill stream process failed: {e}");
        }
        info!(stream_id = %session_id, "stream stopped");
        Ok(())
    }

    async fn active_streams(&self) -> Vec<StreamSessionInfo> {
        let mut streams = self.streams.lock().await;
        Self::prune_exited(&mut streams);
        streams.values().map(|(info, _)| info.clone()).collect()
    }

    async fn stop_all(&self) {
        let mut streams = self.streams.lock().await;
        for (id, (_, mut child)) in streams.drain() {
            ACTIVE_STREAMS.dec();
            if let Err(e) = child.kill().await {
                warn!(stream_id = %id, "kill stream process failed: {e}");
            }
        }
        if let Some(mut feeder) = self.feeder.lock().await.take() {
            if let Err(e) = feeder.kill().await {
                warn!("kill loopback feeder failed: {e}");
            }
        }
    }
}

/// ffmpeg scale filter; a zero dimension keeps the aspect ratio
fn scale_filter(width: u32, height: u32) -> Option<String> {
    match (width, height) {
        (0, 0) => None,
        (w, 0) => Some(format!("scale={}:-1", w)),
        (0, h) => Some(format!("scale=-1:{}", h)),
        (w, h) => Some(format!("scale={}:{}", w, h)),
    }
}
