use async_trait::async_trait;
use common::{cameras::parse_camera_document, CameraSpec};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::BridgeError;

/// Where the camera list comes from. Called once at startup.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load(&self, name: &str) -> Result<Vec<CameraSpec>, BridgeError>;
}

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Reads `<name>.yaml`, `<name>.yml` or `<name>.json` from the first search
/// directory that has one.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    search_dirs: Vec<PathBuf>,
}

impl FileConfigSource {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs.iter().find_map(|dir| probe_dir(dir, name))
    }
}

fn probe_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|candidate| candidate.is_file())
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn load(&self, name: &str) -> Result<Vec<CameraSpec>, BridgeError> {
        let path = self.resolve(name).ok_or_else(|| {
            BridgeError::config_load(
                name,
                format!(
                    "no {name}.{{yaml,yml,json}} found in {:?}",
                    self.search_dirs
                ),
            )
        })?;
        debug!(path = %path.display(), "reading camera configuration");

        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| BridgeError::config_load(name, format!("{}: {}", path.display(), e)))?;

        let cameras = parse_camera_document(&raw)
            .map_err(|e| BridgeError::config_load(name, format!("{}: {:#}", path.display(), e)))?;

        info!(path = %path.display(), cameras = cameras.len(), "camera configuration loaded");
        Ok(cameras)
    }
}
