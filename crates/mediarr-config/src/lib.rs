// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub max_concurrent_jobs: usize,
    pub queue_refresh_interval_seconds: u64,
    pub pending_release_interval_seconds: u64,
    pub broadcast_tick_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
            queue_refresh_interval_seconds: 30,
            pending_release_interval_seconds: 60,
            broadcast_tick_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Folder-name prefixes download clients use while extracting.
    pub download_client_working_folders: Vec<String>,
    pub download_propers_and_repacks: bool,
    pub enable_completed_download_handling: bool,
    /// Usenet releases younger than this are held back.
    pub minimum_age_minutes: u32,
    pub unpacking_grace_minutes: u32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            download_client_working_folders: vec!["_UNPACK_".to_string(), "_FAILED_".to_string()],
            download_propers_and_repacks: true,
            enable_completed_download_handling: true,
            minimum_age_minutes: 0,
            unpacking_grace_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub broadcast_debounce_seconds: u64,
    pub default_page_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            broadcast_debounce_seconds: 5,
            default_page_size: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadClientKind {
    Qbittorrent,
    Sabnzbd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadClientConfig {
    pub name: String,
    pub kind: DownloadClientKind,
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Quality names are ordered worst first; every listed quality is allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityProfileConfig {
    pub id: u32,
    pub name: String,
    pub qualities: Vec<String>,
    pub cutoff: String,
    #[serde(default = "default_true")]
    pub upgrade_allowed: bool,
}

impl Default for QualityProfileConfig {
    fn default() -> Self {
        Self {
            id: 1,
            name: "HD-1080p".to_string(),
            qualities: vec![
                "HDTV-720p".to_string(),
                "WEBDL-720p".to_string(),
                "Bluray-720p".to_string(),
                "HDTV-1080p".to_string(),
                "WEBDL-1080p".to_string(),
                "Bluray-1080p".to_string(),
            ],
            cutoff: "Bluray-1080p".to_string(),
            upgrade_allowed: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayProfileConfig {
    pub id: u32,
    pub order: u32,
    pub preferred_protocol: String,
    pub usenet_delay_minutes: u32,
    pub torrent_delay_minutes: u32,
    /// Empty for the untagged fallback profile.
    #[serde(default)]
    pub tags: Vec<u32>,
}

impl Default for DelayProfileConfig {
    fn default() -> Self {
        Self {
            id: 1,
            order: u32::MAX,
            preferred_protocol: "usenet".to_string(),
            usenet_delay_minutes: 0,
            torrent_delay_minutes: 0,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub scheduler: SchedulerConfig,
    pub decision: DecisionConfig,
    pub queue: QueueConfig,
    pub download_clients: Vec<DownloadClientConfig>,
    pub profiles: Vec<QualityProfileConfig>,
    pub delay_profiles: Vec<DelayProfileConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            scheduler: SchedulerConfig::default(),
            decision: DecisionConfig::default(),
            queue: QueueConfig::default(),
            download_clients: Vec::new(),
            profiles: vec![QualityProfileConfig::default()],
            delay_profiles: vec![DelayProfileConfig::default()],
        }
    }
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: MEDIARR_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("MEDIARR_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(
        target: "config",
        download_clients = config.download_clients.len(),
        profiles = config.profiles.len(),
        "configuration loaded"
    );
    Ok(config)
}
