use thiserror::Error;

/// Failures reported by a media session.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media setup failed: {0}")]
    SetupFailed(String),

    #[error("snapshot failed: {0}")]
    SnapshotFailed(String),

    #[error("stream failed: {0}")]
    StreamFailed(String),

    #[error("camera is busy: {0}")]
    Busy(String),

    #[error("stream session '{0}' not found")]
    StreamNotFound(String),
}

/// Failures of the saved-snapshot store.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid asset id '{0}'")]
    InvalidId(String),

    #[error("asset '{0}' not found")]
    NotFound(String),

    #[error("asset storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bridge-level failures. Everything except `MediaSetupFailed` under the
/// skip policy stops startup.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to load camera configuration '{name}': {reason}")]
    ConfigLoadFailed { name: String, reason: String },

    #[error("invalid camera configuration: {0:#}")]
    InvalidConfig(anyhow::Error),

    #[error("{0} platform is not supported")]
    UnsupportedPlatform(String),

    #[error("media setup failed for camera {camera_id}: {source}")]
    MediaSetupFailed {
        camera_id: u64,
        #[source]
        source: MediaError,
    },

    #[error("no camera accessories could be built")]
    NoCameras,

    #[error("transport failed to start: {0}")]
    TransportStartFailed(String),

    #[error("transport failed to stop: {0}")]
    TransportStopFailed(String),
}

impl BridgeError {
    pub fn config_load(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoadFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn transport_start(reason: impl Into<String>) -> Self {
        Self::TransportStartFailed(reason.into())
    }
}
