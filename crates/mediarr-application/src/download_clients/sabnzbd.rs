// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::PathBuf;

use async_trait::async_trait;
use mediarr_domain::{DownloadProtocol, QueueStatus, ReleaseInfo};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info};

use super::{read_body, request_error, ClientDownloadItem, DownloadClient, DownloadClientError};

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

pub struct SabnzbdClient {
    client: Client,
    name: String,
    base_url: String,
    api_key: Option<String>,
    category: Option<String>,
}

impl SabnzbdClient {
    pub fn new(name: String, base_url: String, api_key: Option<String>, category: Option<String>) -> Self {
        Self {
            client: Client::new(),
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            category,
        }
    }

    fn api_url(&self, mode: &str, params: &[(&str, &str)]) -> Result<Url, DownloadClientError> {
        let mut url = Url::parse(&format!("{}/api", self.base_url))
            .map_err(|err| DownloadClientError::InvalidBaseUrl(err.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("mode", mode).append_pair("output", "json");
            if let Some(api_key) = &self.api_key {
                query.append_pair("apikey", api_key);
            }
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn call<T>(&self, mode: &str, params: &[(&str, &str)]) -> Result<T, DownloadClientError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = self.api_url(mode, params)?;
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let body = read_body(response).await?;
        if let Ok(error) = serde_json::from_str::<SabError>(&body) {
            if error.error.to_lowercase().contains("api key") {
                return Err(DownloadClientError::Authentication);
            }
            return Err(DownloadClientError::Rejected(error.error));
        }
        serde_json::from_str(&body).map_err(|e| DownloadClientError::Deserialization(e.to_string()))
    }

    fn category_params(&self) -> Vec<(&str, &str)> {
        self.category
            .as_deref()
            .map(|category| vec![("category", category)])
            .unwrap_or_default()
    }
}

#[async_trait]
impl DownloadClient for SabnzbdClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> DownloadProtocol {
        DownloadProtocol::Usenet
    }

    async fn test_connection(&self) -> Result<(), DownloadClientError> {
        let version: SabVersion = self.call("version", &[]).await?;
        debug!(target: "download_client", client = %self.name, version = %version.version, "connection ok");
        Ok(())
    }

    async fn get_items(&self) -> Result<Vec<ClientDownloadItem>, DownloadClientError> {
        let params = self.category_params();
        let queue: SabQueueResponse = self.call("queue", &params).await?;
        let history: SabHistoryResponse = self.call("history", &params).await?;

        let mut items: Vec<ClientDownloadItem> = queue
            .queue
            .slots
            .into_iter()
            .map(SabQueueSlot::into_item)
            .collect();
        items.extend(history.history.slots.into_iter().map(SabHistorySlot::into_item));
        Ok(items)
    }

    async fn remove_item(
        &self,
        item: &ClientDownloadItem,
        delete_data: bool,
    ) -> Result<(), DownloadClientError> {
        // Finished jobs live in history, everything else in the queue.
        let mode = if matches!(item.status, QueueStatus::Completed | QueueStatus::Failed) {
            "history"
        } else {
            "queue"
        };
        let del_files = if delete_data { "1" } else { "0" };
        let _: SabStatus = self
            .call(
                mode,
                &[
                    ("name", "delete"),
                    ("value", item.download_id.as_str()),
                    ("del_files", del_files),
                ],
            )
            .await?;
        info!(
            target: "download_client",
            client = %self.name,
            download_id = %item.download_id,
            delete_data,
            "nzb removed"
        );
        Ok(())
    }

    async fn add_release(&self, release: &ReleaseInfo) -> Result<String, DownloadClientError> {
        let mut params = vec![
            ("name", release.download_url.as_str()),
            ("nzbname", release.title.as_str()),
        ];
        if let Some(category) = &self.category {
            params.push(("cat", category.as_str()));
        }
        let added: SabAddResponse = self.call("addurl", &params).await?;
        let id = added
            .nzo_ids
            .into_iter()
            .next()
            .filter(|_| added.status)
            .ok_or_else(|| DownloadClientError::Rejected(release.title.clone()))?;
        info!(target: "download_client", client = %self.name, release = %release.title, download_id = %id, "nzb added");
        Ok(id)
    }
}

/// SABnzbd time left is `[D:]H:MM:SS`.
fn parse_time_left(value: &str) -> Option<chrono::Duration> {
    let mut seconds = 0i64;
    let multipliers = [1i64, 60, 3_600, 86_400];
    let parts: Vec<&str> = value.split(':').collect();
    if parts.is_empty() || parts.len() > multipliers.len() {
        return None;
    }
    for (part, multiplier) in parts.iter().rev().zip(multipliers) {
        seconds += part.trim().parse::<i64>().ok()? * multiplier;
    }
    Some(chrono::Duration::seconds(seconds))
}

fn megabytes(value: &str) -> u64 {
    value
        .trim()
        .parse::<f64>()
        .map(|mb| (mb * BYTES_PER_MEGABYTE).round() as u64)
        .unwrap_or(0)
}

fn map_queue_status(status: &str) -> QueueStatus {
    match status.to_lowercase().as_str() {
        "downloading" | "fetching" | "grabbing" | "propagating" => QueueStatus::Downloading,
        "paused" => QueueStatus::Paused,
        _ => QueueStatus::Queued,
    }
}

fn map_history_status(status: &str) -> QueueStatus {
    match status.to_lowercase().as_str() {
        "completed" => QueueStatus::Completed,
        "failed" => QueueStatus::Failed,
        // Post-processing stages: verifying, repairing, extracting, moving, running.
        _ => QueueStatus::Downloading,
    }
}

#[derive(Debug, Deserialize)]
struct SabError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct SabVersion {
    version: String,
}

#[derive(Debug, Deserialize)]
struct SabStatus {
    #[allow(dead_code)]
    #[serde(default)]
    status: bool,
}

#[derive(Debug, Deserialize)]
struct SabAddResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    nzo_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SabQueueResponse {
    queue: SabQueue,
}

#[derive(Debug, Deserialize)]
struct SabQueue {
    #[serde(default)]
    slots: Vec<SabQueueSlot>,
}

#[derive(Debug, Deserialize)]
struct SabQueueSlot {
    nzo_id: String,
    filename: String,
    #[serde(default)]
    cat: Option<String>,
    #[serde(default)]
    mb: String,
    #[serde(default)]
    mbleft: String,
    #[serde(default)]
    timeleft: String,
    #[serde(default)]
    status: String,
}

impl SabQueueSlot {
    fn into_item(self) -> ClientDownloadItem {
        let status = map_queue_status(&self.status);
        let remaining_time = match status {
            QueueStatus::Paused => None,
            _ => parse_time_left(&self.timeleft),
        };
        ClientDownloadItem {
            download_id: self.nzo_id,
            title: self.filename,
            category: self.cat.filter(|c| !c.is_empty() && c != "*"),
            total_size: megabytes(&self.mb),
            remaining_size: megabytes(&self.mbleft),
            remaining_time,
            status,
            output_path: None,
            message: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SabHistoryResponse {
    history: SabHistory,
}

#[derive(Debug, Deserialize)]
struct SabHistory {
    #[serde(default)]
    slots: Vec<SabHistorySlot>,
}

#[derive(Debug, Deserialize)]
struct SabHistorySlot {
    nzo_id: String,
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    fail_message: String,
    #[serde(default)]
    storage: Option<String>,
}

impl SabHistorySlot {
    fn into_item(self) -> ClientDownloadItem {
        let status = map_history_status(&self.status);
        let remaining_size = if status == QueueStatus::Completed { 0 } else { self.bytes };
        ClientDownloadItem {
            download_id: self.nzo_id,
            title: self.name,
            category: self.category.filter(|c| !c.is_empty() && c != "*"),
            total_size: self.bytes,
            remaining_size,
            remaining_time: None,
            status,
            output_path: self.storage.filter(|s| !s.is_empty()).map(PathBuf::from),
            message: (!self.fail_message.is_empty()).then_some(self.fail_message),
        }
    }
}
