// SPDX-License-Identifier: GPL-3.0-or-later
//! Uniform adapter over external download clients.

mod qbittorrent;
mod sabnzbd;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use mediarr_config::{DownloadClientConfig, DownloadClientKind};
use mediarr_domain::{DownloadProtocol, QueueStatus, ReleaseInfo};
use thiserror::Error;
use tracing::{debug, info};

pub use qbittorrent::QBittorrentClient;
pub use sabnzbd::SabnzbdClient;

/// One download as reported by a client, already mapped to queue vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDownloadItem {
    pub download_id: String,
    pub title: String,
    pub category: Option<String>,
    pub total_size: u64,
    pub remaining_size: u64,
    /// `None` when the client cannot estimate it.
    pub remaining_time: Option<chrono::Duration>,
    pub status: QueueStatus,
    pub output_path: Option<PathBuf>,
    pub message: Option<String>,
}

#[derive(Debug, Error)]
pub enum DownloadClientError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("authentication failed")]
    Authentication,
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error("download client responded with status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("deserialization failed: {0}")]
    Deserialization(String),
    #[error("release '{0}' has no info hash or magnet link")]
    MissingInfoHash(String),
    #[error("download client rejected the request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait DownloadClient: Send + Sync {
    fn name(&self) -> &str;

    fn protocol(&self) -> DownloadProtocol;

    async fn test_connection(&self) -> Result<(), DownloadClientError>;

    async fn get_items(&self) -> Result<Vec<ClientDownloadItem>, DownloadClientError>;

    async fn remove_item(
        &self,
        item: &ClientDownloadItem,
        delete_data: bool,
    ) -> Result<(), DownloadClientError>;

    /// Hand a release to the client. Returns the id the client tracks it by.
    async fn add_release(&self, release: &ReleaseInfo) -> Result<String, DownloadClientError>;
}

/// The configured, enabled download clients.
#[derive(Clone, Default)]
pub struct DownloadClientRegistry {
    clients: Vec<Arc<dyn DownloadClient>>,
}

impl DownloadClientRegistry {
    pub fn new(clients: Vec<Arc<dyn DownloadClient>>) -> Self {
        Self { clients }
    }

    pub fn from_config(configs: &[DownloadClientConfig]) -> Self {
        let mut clients: Vec<Arc<dyn DownloadClient>> = Vec::new();
        for config in configs {
            if !config.enabled {
                debug!(target: "download_client", client = %config.name, "skipping disabled client");
                continue;
            }
            let client: Arc<dyn DownloadClient> = match config.kind {
                DownloadClientKind::Qbittorrent => Arc::new(QBittorrentClient::new(
                    config.name.clone(),
                    config.base_url.clone(),
                    config.username.clone(),
                    config.password.clone(),
                    config.category.clone(),
                )),
                DownloadClientKind::Sabnzbd => Arc::new(SabnzbdClient::new(
                    config.name.clone(),
                    config.base_url.clone(),
                    config.api_key.clone(),
                    config.category.clone(),
                )),
            };
            info!(
                target: "download_client",
                client = %config.name,
                protocol = %client.protocol(),
                "download client registered"
            );
            clients.push(client);
        }
        Self { clients }
    }

    pub fn all(&self) -> &[Arc<dyn DownloadClient>] {
        &self.clients
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn DownloadClient>> {
        self.clients
            .iter()
            .find(|client| client.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// First registered client able to fetch `protocol`.
    pub fn for_protocol(&self, protocol: DownloadProtocol) -> Option<Arc<dyn DownloadClient>> {
        self.clients
            .iter()
            .find(|client| client.protocol() == protocol)
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn request_error(err: reqwest::Error) -> DownloadClientError {
    DownloadClientError::Request(err.to_string())
}

/// Status check shared by the HTTP adapters; yields the body on success.
async fn read_body(response: reqwest::Response) -> Result<String, DownloadClientError> {
    let status = response.status();
    let body = response.text().await.map_err(request_error)?;
    if !status.is_success() {
        return Err(DownloadClientError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, kind: DownloadClientKind, enabled: bool) -> DownloadClientConfig {
        DownloadClientConfig {
            name: name.to_string(),
            kind,
            base_url: "http://localhost:8080".to_string(),
            username: None,
            password: None,
            api_key: Some("key".to_string()),
            category: None,
            enabled,
        }
    }

    #[test]
    fn registry_skips_disabled_and_resolves_by_protocol() {
        let registry = DownloadClientRegistry::from_config(&[
            config("qbit", DownloadClientKind::Qbittorrent, true),
            config("sab", DownloadClientKind::Sabnzbd, true),
            config("old-qbit", DownloadClientKind::Qbittorrent, false),
        ]);

        assert_eq!(registry.all().len(), 2);
        assert!(registry.by_name("OLD-QBIT").is_none());
        assert_eq!(
            registry
                .for_protocol(DownloadProtocol::Usenet)
                .map(|c| c.name().to_string()),
            Some("sab".to_string())
        );
        assert_eq!(
            registry.by_name("QBIT").map(|c| c.protocol()),
            Some(DownloadProtocol::Torrent)
        );
    }
}
