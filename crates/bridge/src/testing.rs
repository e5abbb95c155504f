//! In-crate fakes for the media collaborator.

use async_trait::async_trait;
use chrono::Utc;
use common::StreamParams;
use std::sync::{Arc, Mutex};

use crate::accessory::CameraAccessory;
use crate::error::MediaError;
use crate::media::{
    MediaService, MediaSession, Snapshot, StreamRequest, StreamSessionInfo, StreamingEndpoints,
};

#[derive(Default)]
pub(crate) struct FakeSession {
    pub fail_snapshot: bool,
    pub multi_stream: bool,
    pub streams: Mutex<Vec<StreamSessionInfo>>,
    pub stopped_all: Mutex<bool>,
}

#[async_trait]
impl MediaSession for FakeSession {
    async fn snapshot(&self, width: u32, height: u32) -> Result<Snapshot, MediaError> {
        if self.fail_snapshot {
            return Err(MediaError::SnapshotFailed("no frame".into()));
        }
        Ok(Snapshot {
            width,
            height,
            content_type: "image/jpeg".into(),
            data: vec![0xff, 0xd8, width as u8, height as u8],
        })
    }

    fn attach_streaming_endpoints(&self, accessory: &mut CameraAccessory) {
        accessory.set_streaming_endpoints(StreamingEndpoints {
            codec: "h264".into(),
            resolutions: Vec::new(),
            multi_stream: self.multi_stream,
            min_video_bitrate: 0,
        });
    }

    async fn start_stream(&self, request: StreamRequest) -> Result<StreamSessionInfo, MediaError> {
        let mut streams = self.streams.lock().unwrap();
        if !self.multi_stream && !streams.is_empty() {
            return Err(MediaError::Busy("fake camera".into()));
        }
        let info = StreamSessionInfo {
            id: format!("stream-{}", streams.len() + 1),
            bitrate_kbps: request.max_bitrate_kbps,
            request,
            started_at: Utc::now(),
        };
        streams.push(info.clone());
        Ok(info)
    }

    async fn stop_stream(&self, session_id: &str) -> Result<(), MediaError> {
        let mut streams = self.streams.lock().unwrap();
        let before = streams.len();
        streams.retain(|s| s.id != session_id);
        if streams.len() == before {
            return Err(MediaError::StreamNotFound(session_id.into()));
        }
        Ok(())
    }

    async fn active_streams(&self) -> Vec<StreamSessionInfo> {
        self.streams.lock().unwrap().clone()
    }

    async fn stop_all(&self) {
        self.streams.lock().unwrap().clear();
        *self.stopped_all.lock().unwrap() = true;
    }
}

#[derive(Default)]
pub(crate) struct FakeMedia {
    pub opened: Mutex<Vec<StreamParams>>,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
    pub fail: bool,
    pub fail_snapshot: bool,
}

#[async_trait]
impl MediaService for FakeMedia {
    async fn open_session(&self, params: &StreamParams) -> Result<Arc<dyn MediaSession>, MediaError> {
        self.opened.lock().unwrap().push(params.clone());
        if self.fail {
            return Err(MediaError::SetupFailed("device unavailable".into()));
        }
        let session = Arc::new(FakeSession {
            fail_snapshot: self.fail_snapshot,
            multi_stream: params.multi_stream,
            ..FakeSession::default()
        });
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(session)
    }
}
