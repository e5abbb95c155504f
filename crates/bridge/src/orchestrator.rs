//! Bridge lifecycle.
//!
//! `Loading -> Building -> Serving -> Stopping -> Stopped`. Every transition is
//! published on a watch channel and logged. Any fatal error before Serving
//! moves straight to `Stopped` and is returned to the caller.

use clap::ValueEnum;
use common::{validation::validate_cameras, CameraSpec};
use futures::future::join_all;
use serde::Serialize;
use std::{fmt, future::Future, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::accessory::{AccessorySet, BridgeInfo, CameraAccessory, CameraAccessoryBuilder};
use crate::error::BridgeError;
use crate::loader::ConfigSource;
use crate::media::MediaService;
use crate::metrics::{CAMERAS_REGISTERED, CAMERA_BUILD_FAILURES};
use crate::platform::HostPlatform;
use crate::transport::{TransportConfig, TransportHandle, TransportService};

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Loading,
    Building,
    Serving,
    Stopping,
    Stopped,
}

impl BridgeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Building => "building",
            Self::Serving => "serving",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when one camera's media session cannot be set up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CameraFailurePolicy {
    /// Leave the camera out and keep going
    #[default]
    Skip,
    /// Treat the first failure as fatal
    Abort,
}

/// What to do when Building ends with no accessories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptySetPolicy {
    #[default]
    Serve,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The transport acknowledged the stop request in time
    Clean,
    /// The stop request timed out or failed
    Forced,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub config_name: String,
    pub camera_failure_policy: CameraFailurePolicy,
    pub empty_set_policy: EmptySetPolicy,
    pub shutdown_timeout: Duration,
    pub transport: TransportConfig,
    /// OS name used to pick platform defaults
    pub host_os: String,
}

impl OrchestratorSettings {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            config_name: "cameras".to_string(),
            camera_failure_policy: CameraFailurePolicy::default(),
            empty_set_policy: EmptySetPolicy::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            transport,
            host_os: std::env::consts::OS.to_string(),
        }
    }

    pub fn with_config_name(mut self, name: impl Into<String>) -> Self {
        self.config_name = name.into();
        self
    }

    pub fn with_camera_failure_policy(mut self, policy: CameraFailurePolicy) -> Self {
        self.camera_failure_policy = policy;
        self
    }

    pub fn with_empty_set_policy(mut self, policy: EmptySetPolicy) -> Self {
        self.empty_set_policy = policy;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_host_os(mut self, os: impl Into<String>) -> Self {
        self.host_os = os.into();
        self
    }
}

/// Result of the Building phase.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub accessories: AccessorySet,
    /// Ids left out under the skip policy, in load order
    pub skipped: Vec<u64>,
}

pub struct BridgeOrchestrator {
    settings: OrchestratorSettings,
    source: Arc<dyn ConfigSource>,
    builder: CameraAccessoryBuilder,
    transport: Arc<dyn TransportService>,
    state: watch::Sender<BridgeState>,
}

impl BridgeOrchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        source: Arc<dyn ConfigSource>,
        media: Arc<dyn MediaService>,
        transport: Arc<dyn TransportService>,
    ) -> Self {
        let (state, _) = watch::channel(BridgeState::Loading);
        Self {
            settings,
            source,
            builder: CameraAccessoryBuilder::new(media),
            transport,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    fn transition(&self, next: BridgeState) {
        let previous = self.state.send_replace(next);
        info!(state = %next, previous = %previous, "bridge state changed");
    }

    /// Read and validate the camera list.
    pub async fn load(&self) -> Result<Vec<CameraSpec>, BridgeError> {
        self.transition(BridgeState::Loading);

        let specs = self.source.load(&self.settings.config_name).await?;
        validate_cameras(&specs).map_err(BridgeError::InvalidConfig)?;

        info!(cameras = specs.len(), config = %self.settings.config_name, "camera configuration loaded");
        Ok(specs)
    }

    /// Default and build every camera. Builds run concurrently, results are
    /// collected in load order.
    pub async fn build(&self, specs: &[CameraSpec]) -> Result<BuildReport, BridgeError> {
        self.transition(BridgeState::Building);

        let platform = HostPlatform::from_os(&self.settings.host_os)?;

        let results = join_all(specs.iter().map(|spec| {
            let defaulted = platform.apply_defaults(spec);
            let builder = self.builder.clone();
            async move { builder.build(&defaulted).await }
        }))
        .await;

        let mut built: Vec<CameraAccessory> = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();

        for (spec, result) in specs.iter().zip(results) {
            match result {
                Ok(accessory) => built.push(accessory),
                Err(e) => {
                    CAMERA_BUILD_FAILURES.inc();
                    match self.settings.camera_failure_policy {
                        CameraFailurePolicy::Skip => {
                            warn!(camera_id = spec.id, name = %spec.name, error = %e, "skipping camera");
                            skipped.push(spec.id);
                        }
                        CameraFailurePolicy::Abort => {
                            error!(camera_id = spec.id, name = %spec.name, error = %e, "camera setup failed, aborting");
                            return Err(e);
                        }
                    }
                }
            }
        }

        if built.is_empty() {
            match self.settings.empty_set_policy {
                EmptySetPolicy::Serve => warn!("no camera accessories, serving the bridge alone"),
                EmptySetPolicy::Fail => return Err(BridgeError::NoCameras),
            }
        }

        info!(built = built.len(), skipped = skipped.len(), "camera accessories built");
        Ok(BuildReport {
            accessories: built.into_iter().collect(),
            skipped,
        })
    }

    /// Run the whole lifecycle. Returns once `shutdown` resolves and the
    /// transport has stopped, or immediately on a startup failure.
    pub async fn run<F>(&self, shutdown: F) -> Result<ShutdownOutcome, BridgeError>
    where
        F: Future<Output = ()> + Send,
    {
        match self.start_up().await {
            Ok(mut handle) => {
                shutdown.await;
                self.transition(BridgeState::Stopping);

                let outcome =
                    match tokio::time::timeout(self.settings.shutdown_timeout, handle.stop()).await {
                        Ok(Ok(())) => ShutdownOutcome::Clean,
                        Ok(Err(e)) => {
                            error!(error = %e, "transport stop failed");
                            ShutdownOutcome::Forced
                        }
                        Err(_) => {
                            error!(
                                timeout_secs = self.settings.shutdown_timeout.as_secs_f64(),
                                "transport did not acknowledge stop in time"
                            );
                            ShutdownOutcome::Forced
                        }
                    };

                self.transition(BridgeState::Stopped);
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, state = %self.state(), "bridge startup failed");
                self.transition(BridgeState::Stopped);
                Err(e)
            }
        }
    }

    async fn start_up(&self) -> Result<Box<dyn TransportHandle>, BridgeError> {
        let specs = self.load().await?;
        let report = self.build(&specs).await?;

        let accessories = Arc::new(report.accessories);
        CAMERAS_REGISTERED.set(accessories.len() as i64);

        let handle = self
            .transport
            .start(BridgeInfo::default(), Arc::clone(&accessories), &self.settings.transport)
            .await?;

        self.transition(BridgeState::Serving);
        info!(
            accessories = accessories.len(),
            addr = ?handle.local_addr(),
            "bridge serving"
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMedia;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct StaticSource(Vec<CameraSpec>);

    #[async_trait]
    impl ConfigSource for StaticSource {
        async fn load(&self, _name: &str) -> Result<Vec<CameraSpec>, BridgeError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        started_with: Mutex<Option<Vec<u64>>>,
    }

    struct NoopHandle;

    #[async_trait]
    impl TransportHandle for NoopHandle {
        async fn stop(&mut self) -> Result<(), BridgeError> {
            Ok(())
        }
    }

    #[async_trait]
    impl TransportService for RecordingTransport {
        async fn start(
            &self,
            _bridge: BridgeInfo,
            accessories: Arc<AccessorySet>,
            _config: &TransportConfig,
        ) -> Result<Box<dyn TransportHandle>, BridgeError> {
            *self.started_with.lock().unwrap() = Some(accessories.ids());
            Ok(Box::new(NoopHandle))
        }
    }

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings::new(TransportConfig {
            pairing_pin: "11112222".into(),
            port: 0,
            bind_host: "127.0.0.1".into(),
            storage_path: PathBuf::from("camera"),
        })
        .with_host_os("linux")
    }

    fn orchestrator(specs: Vec<CameraSpec>, media: FakeMedia) -> BridgeOrchestrator {
        BridgeOrchestrator::new(
            settings(),
            Arc::new(StaticSource(specs)),
            Arc::new(media),
            Arc::new(RecordingTransport::default()),
        )
    }

    #[tokio::test]
    async fn load_rejects_duplicate_ids() {
        let orch = orchestrator(
            vec![CameraSpec::new(7, "a"), CameraSpec::new(7, "b")],
            FakeMedia::default(),
        );
        let err = orch.load().await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig(_)));
        assert!(err.to_string().contains("duplicate camera id 7"));
    }

    #[tokio::test]
    async fn build_applies_platform_defaults() {
        let media = Arc::new(FakeMedia::default());
        let orch = BridgeOrchestrator::new(
            settings().with_host_os("macos"),
            Arc::new(StaticSource(Vec::new())),
            media.clone(),
            Arc::new(RecordingTransport::default()),
        );

        let report = orch.build(&[CameraSpec::new(1, "Front")]).await.unwrap();
        assert_eq!(report.accessories.ids(), vec![1]);

        let opened = media.opened.lock().unwrap();
        assert_eq!(opened[0].input_device, "avfoundation");
        assert_eq!(opened[0].source_filename, "default");
        assert_eq!(opened[0].h264_decoder, "h264");
        assert_eq!(opened[0].h264_encoder, "libx264");
    }

    #[tokio::test]
    async fn empty_build_follows_policy() {
        let orch = orchestrator(Vec::new(), FakeMedia::default());
        let report = orch.build(&[]).await.unwrap();
        assert!(report.accessories.is_empty());

        let strict = BridgeOrchestrator::new(
            settings().with_empty_set_policy(EmptySetPolicy::Fail),
            Arc::new(StaticSource(Vec::new())),
            Arc::new(FakeMedia::default()),
            Arc::new(RecordingTransport::default()),
        );
        assert!(matches!(strict.build(&[]).await, Err(BridgeError::NoCameras)));
    }

    #[tokio::test]
    async fn every_failed_camera_is_reported_once() {
        let media = FakeMedia {
            fail: true,
            ..FakeMedia::default()
        };
        let orch = orchestrator(Vec::new(), media);
        let specs = [CameraSpec::new(1, "a"), CameraSpec::new(2, "b")];

        let report = orch.build(&specs).await.unwrap();
        assert!(report.accessories.is_empty());
        assert_eq!(report.skipped, vec![1, 2]);
    }

    #[tokio::test]
    async fn run_walks_every_state() {
        let orch = orchestrator(vec![CameraSpec::new(1, "Front")], FakeMedia::default());
        let mut states = orch.subscribe();

        let outcome = orch.run(async {}).await.unwrap();
        assert_eq!(outcome, ShutdownOutcome::Clean);
        assert_eq!(orch.state(), BridgeState::Stopped);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), BridgeState::Stopped);
    }

    #[tokio::test]
    async fn startup_failure_ends_stopped() {
        let orch = BridgeOrchestrator::new(
            settings().with_host_os("plan9"),
            Arc::new(StaticSource(Vec::new())),
            Arc::new(FakeMedia::default()),
            Arc::new(RecordingTransport::default()),
        );
        let err = orch.run(async {}).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedPlatform(os) if os == "plan9"));
        assert_eq!(orch.state(), BridgeState::Stopped);
    }

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!(serde_json::to_string(&BridgeState::Stopping).unwrap(), "\"stopping\"");
        assert_eq!(BridgeState::Serving.to_string(), "serving");
    }
}
