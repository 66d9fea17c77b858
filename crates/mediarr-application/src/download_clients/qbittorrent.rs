// SPDX-License-Identifier: GPL-3.0-or-later
use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use mediarr_domain::{DownloadProtocol, QueueStatus, ReleaseInfo};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info};

use super::{read_body, request_error, ClientDownloadItem, DownloadClient, DownloadClientError};

/// qBittorrent reports this ETA when it has no estimate.
const UNKNOWN_ETA_SECONDS: i64 = 8_640_000;

pub struct QBittorrentClient {
    client: Client,
    name: String,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    category: Option<String>,
}

impl QBittorrentClient {
    pub fn new(
        name: String,
        base_url: String,
        username: Option<String>,
        password: Option<String>,
        category: Option<String>,
    ) -> Self {
        Self {
            // Session cookie from auth/login is reused on later calls.
            client: Client::builder()
                .cookie_store(true)
                .build()
                .unwrap_or_else(|_| Client::new()),
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            category,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, DownloadClientError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| DownloadClientError::InvalidBaseUrl(err.to_string()))
    }

    async fn authenticate_if_configured(&self) -> Result<(), DownloadClientError> {
        let Some(username) = self.username.as_deref() else {
            return Ok(());
        };
        let Some(password) = self.password.as_deref() else {
            return Ok(());
        };

        let url = self.endpoint("/api/v2/auth/login")?;
        let response = self
            .client
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(request_error)?;

        let body = read_body(response).await?;
        if body.trim() != "Ok." {
            return Err(DownloadClientError::Authentication);
        }
        Ok(())
    }

    async fn post_form(
        &self,
        path: &str,
        form: &HashMap<&str, String>,
    ) -> Result<String, DownloadClientError> {
        self.authenticate_if_configured().await?;
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(request_error)?;
        read_body(response).await
    }
}

#[async_trait]
impl DownloadClient for QBittorrentClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> DownloadProtocol {
        DownloadProtocol::Torrent
    }

    async fn test_connection(&self) -> Result<(), DownloadClientError> {
        self.authenticate_if_configured().await?;
        let url = self.endpoint("/api/v2/app/version")?;
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let version = read_body(response).await?;
        debug!(target: "download_client", client = %self.name, version = %version.trim(), "connection ok");
        Ok(())
    }

    async fn get_items(&self) -> Result<Vec<ClientDownloadItem>, DownloadClientError> {
        self.authenticate_if_configured().await?;
        let mut url = self.endpoint("/api/v2/torrents/info")?;
        if let Some(category) = &self.category {
            url.query_pairs_mut().append_pair("category", category);
        }

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let body = read_body(response).await?;
        let torrents: Vec<QBittorrentTorrent> = serde_json::from_str(&body)
            .map_err(|e| DownloadClientError::Deserialization(e.to_string()))?;

        Ok(torrents.into_iter().map(QBittorrentTorrent::into_item).collect())
    }

    async fn remove_item(
        &self,
        item: &ClientDownloadItem,
        delete_data: bool,
    ) -> Result<(), DownloadClientError> {
        let mut form = HashMap::new();
        form.insert("hashes", item.download_id.to_lowercase());
        form.insert("deleteFiles", delete_data.to_string());
        self.post_form("/api/v2/torrents/delete", &form).await?;
        info!(
            target: "download_client",
            client = %self.name,
            download_id = %item.download_id,
            delete_data,
            "torrent removed"
        );
        Ok(())
    }

    async fn add_release(&self, release: &ReleaseInfo) -> Result<String, DownloadClientError> {
        let hash = magnet_info_hash(&release.download_url)
            .or_else(|| release.info_hash.clone())
            .ok_or_else(|| DownloadClientError::MissingInfoHash(release.title.clone()))?;

        let mut form = HashMap::new();
        form.insert("urls", release.download_url.clone());
        if let Some(category) = &self.category {
            form.insert("category", category.clone());
        }

        let body = self.post_form("/api/v2/torrents/add", &form).await?;
        if body.trim() == "Fails." {
            return Err(DownloadClientError::Rejected(release.title.clone()));
        }
        info!(target: "download_client", client = %self.name, release = %release.title, %hash, "torrent added");
        Ok(hash.to_lowercase())
    }
}

fn magnet_info_hash(url: &str) -> Option<String> {
    let query = url.strip_prefix("magnet:?")?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "xt")
        .and_then(|(_, value)| value.strip_prefix("urn:btih:"))
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct QBittorrentTorrent {
    hash: String,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    amount_left: u64,
    #[serde(default)]
    eta: i64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    content_path: Option<String>,
}

impl QBittorrentTorrent {
    fn into_item(self) -> ClientDownloadItem {
        let status = map_qbittorrent_state(&self.state);
        let remaining_time = (self.eta >= 0 && self.eta < UNKNOWN_ETA_SECONDS)
            .then(|| chrono::Duration::seconds(self.eta));
        let message = match status {
            QueueStatus::Failed | QueueStatus::Warning => Some(format!("qBittorrent state: {}", self.state)),
            _ => None,
        };
        ClientDownloadItem {
            download_id: self.hash.to_lowercase(),
            title: self.name,
            category: self.category.filter(|v| !v.trim().is_empty()),
            total_size: self.size,
            remaining_size: self.amount_left,
            remaining_time,
            status,
            output_path: self.content_path.map(PathBuf::from),
            message,
        }
    }
}

fn map_qbittorrent_state(state: &str) -> QueueStatus {
    let state = state.to_lowercase();
    if state.contains("error") || state.contains("missingfiles") {
        QueueStatus::Failed
    } else if state == "stalleddl" {
        QueueStatus::Warning
    } else if state.ends_with("up") || state == "uploading" || state.contains("completed") {
        QueueStatus::Completed
    } else if state.contains("paused") || state.contains("stopped") {
        QueueStatus::Paused
    } else if state.contains("downloading") || state.contains("meta") || state == "forceddl" {
        QueueStatus::Downloading
    } else {
        QueueStatus::Queued
    }
}
