//! Transport collaborator contracts.
//!
//! The transport exposes the bridge and its accessories to controllers. The
//! orchestrator is the only owner of the returned handle and the only caller
//! of [`TransportHandle::stop`].

pub mod http;
pub mod routes;

pub use http::HttpTransport;

use async_trait::async_trait;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use crate::accessory::{AccessorySet, BridgeInfo};
use crate::error::BridgeError;

/// Runtime parameters handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub pairing_pin: String,
    pub port: u16,
    pub bind_host: String,
    /// Directory for persisted pairing/session state
    pub storage_path: PathBuf,
}

#[async_trait]
pub trait TransportService: Send + Sync {
    async fn start(
        &self,
        bridge: BridgeInfo,
        accessories: Arc<AccessorySet>,
        config: &TransportConfig,
    ) -> Result<Box<dyn TransportHandle>, BridgeError>;
}

#[async_trait]
pub trait TransportHandle: Send {
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Stop serving and flush persisted state. Returning is the
    /// acknowledgement that shutdown completed.
    async fn stop(&mut self) -> Result<(), BridgeError>;
}
