//! Saved snapshots.
//!
//! Each camera gets its own directory under `<storage>/assets/<camera id>`.
//! Asset ids start with a UTC timestamp so listing them in name order is
//! listing them in capture order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AssetError;
use crate::media::Snapshot;

const ASSET_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetInfo {
    pub id: String,
    pub camera_id: u64,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(storage_path: impl AsRef<Path>) -> Self {
        Self {
            root: storage_path.as_ref().join("assets"),
        }
    }

    fn camera_dir(&self, camera_id: u64) -> PathBuf {
        self.root.join(camera_id.to_string())
    }

    fn asset_path(&self, camera_id: u64, asset_id: &str) -> Result<PathBuf, AssetError> {
        if !is_valid_asset_id(asset_id) {
            return Err(AssetError::InvalidId(asset_id.to_string()));
        }
        Ok(self
            .camera_dir(camera_id)
            .join(format!("{}.{}", asset_id, ASSET_EXTENSION)))
    }

    /// Persist `snapshot` as a new asset of `camera_id`.
    pub async fn save(&self, camera_id: u64, snapshot: &Snapshot) -> Result<AssetInfo, AssetError> {
        let dir = self.camera_dir(camera_id);
        tokio::fs::create_dir_all(&dir).await?;

        let created_at = Utc::now();
        let id = format!(
            "{}-{}",
            created_at.format("%Y%m%dT%H%M%S%3fZ"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let path = self.asset_path(camera_id, &id)?;
        tokio::fs::write(&path, &snapshot.data).await?;

        info!(camera_id, asset_id = %id, bytes = snapshot.data.len(), "snapshot saved");
        Ok(AssetInfo {
            id,
            camera_id,
            size: snapshot.data.len() as u64,
            created_at,
        })
    }

    /// Assets of `camera_id`, oldest first. A camera without any saved
    /// snapshot has an empty list.
    pub async fn list(&self, camera_id: u64) -> Result<Vec<AssetInfo>, AssetError> {
        let mut entries = match tokio::fs::read_dir(self.camera_dir(camera_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut assets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ASSET_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            assets.push(AssetInfo {
                id: id.to_string(),
                camera_id,
                size: metadata.len(),
                created_at: metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now()),
            });
        }
        assets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(assets)
    }

    pub async fn get(&self, camera_id: u64, asset_id: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.asset_path(camera_id, asset_id)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(asset_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the given assets. Ids that do not exist are ignored; the
    /// number of files actually removed is returned.
    pub async fn delete(&self, camera_id: u64, asset_ids: &[String]) -> Result<usize, AssetError> {
        let mut removed = 0;
        for asset_id in asset_ids {
            let path = self.asset_path(camera_id, asset_id)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(camera_id, asset_id = %asset_id, "asset already gone");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

/// Asset ids are generated here; anything else, and in particular anything
/// that could leave the camera directory, is refused.
fn is_valid_asset_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
