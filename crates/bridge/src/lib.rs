//! Camera accessory bridge.
//!
//! Loads a list of cameras, fills in host defaults, wires each camera to a
//! media session and serves the resulting accessories behind one bridge.

pub mod accessory;
pub mod assets;
pub mod config;
pub mod error;
pub mod loader;
pub mod media;
pub mod metrics;
pub mod orchestrator;
pub mod platform;
pub mod transport;

#[cfg(test)]
mod testing;

pub use accessory::{AccessoryInfo, AccessorySet, BridgeInfo, CameraAccessory, CameraAccessoryBuilder};
pub use error::{AssetError, BridgeError, MediaError};
pub use loader::{ConfigSource, FileConfigSource};
pub use orchestrator::{
    BridgeOrchestrator, BridgeState, BuildReport, CameraFailurePolicy, EmptySetPolicy,
    OrchestratorSettings, ShutdownOutcome,
};
pub use platform::{apply_defaults, HostPlatform};
