//! HTTP transport
//!
//! Serves the accessory routes with axum and keeps a small state file in the
//! storage directory so a restart can tell whether the previous run stopped
//! cleanly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::routes::{router, AppState};
use super::{TransportConfig, TransportHandle, TransportService};
use crate::accessory::{AccessorySet, BridgeInfo};
use crate::assets::AssetStore;
use crate::error::BridgeError;

pub const STATE_FILE: &str = "bridge.json";

/// Snapshot of the bridge written to `STATE_FILE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub bridge: String,
    pub port: u16,
    pub accessory_ids: Vec<u64>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub clean_shutdown: bool,
}

impl PersistedState {
    pub async fn read(dir: &Path) -> Option<Self> {
        let raw = tokio::fs::read(dir.join(STATE_FILE)).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }

    async fn write(&self, dir: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = dir.join(format!("{}.tmp", STATE_FILE));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, dir.join(STATE_FILE)).await
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransport;

impl HttpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportService for HttpTransport {
    async fn start(
        &self,
        bridge: BridgeInfo,
        accessories: Arc<AccessorySet>,
        config: &TransportConfig,
    ) -> Result<Box<dyn TransportHandle>, BridgeError> {
        tokio::fs::create_dir_all(&config.storage_path)
            .await
            .map_err(|e| {
                BridgeError::transport_start(format!(
                    "cannot create storage dir {}: {}",
                    config.storage_path.display(),
                    e
                ))
            })?;

        if let Some(previous) = PersistedState::read(&config.storage_path).await {
            if !previous.clean_shutdown {
                warn!(started_at = %previous.started_at, "previous run did not shut down cleanly");
            }
        }

        let bind = format!("{}:{}", config.bind_host, config.port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|e| BridgeError::transport_start(format!("cannot bind {}: {}", bind, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BridgeError::transport_start(e.to_string()))?;

        let state = PersistedState {
            bridge: bridge.name.clone(),
            port: local_addr.port(),
            accessory_ids: accessories.ids(),
            started_at: Utc::now(),
            stopped_at: None,
            clean_shutdown: false,
        };
        state
            .write(&config.storage_path)
            .await
            .map_err(|e| BridgeError::transport_start(format!("cannot persist state: {}", e)))?;

        let app = router(AppState::new(
            bridge,
            Arc::clone(&accessories),
            AssetStore::new(&config.storage_path),
            &config.pairing_pin,
        ));
        let token = CancellationToken::new();
        let shutdown = token.clone();

        let server = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        info!(addr = %local_addr, accessories = accessories.len(), "transport listening");

        Ok(Box::new(HttpTransportHandle {
            local_addr,
            token,
            server: Some(server),
            accessories,
            storage_path: config.storage_path.clone(),
            state,
        }))
    }
}

pub struct HttpTransportHandle {
    local_addr: SocketAddr,
    token: CancellationToken,
    server: Option<JoinHandle<std::io::Result<()>>>,
    accessories: Arc<AccessorySet>,
    storage_path: PathBuf,
    state: PersistedState,
}

#[async_trait]
impl TransportHandle for HttpTransportHandle {
    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    async fn stop(&mut self) -> Result<(), BridgeError> {
        self.token.cancel();

        if let Some(server) = self.server.take() {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "server exited with error"),
                Err(e) => return Err(BridgeError::TransportStopFailed(e.to_string())),
            }
        }

        for accessory in self.accessories.iter() {
            accessory.streaming().stop_all().await;
        }

        self.state.stopped_at = Some(Utc::now());
        self.state.clean_shutdown = true;
        self.state
            .write(&self.storage_path)
            .await
            .map_err(|e| BridgeError::TransportStopFailed(format!("cannot persist state: {}", e)))?;

        info!(addr = %self.local_addr, "transport stopped");
        Ok(())
    }
}
