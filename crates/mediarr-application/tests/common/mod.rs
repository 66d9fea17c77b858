// SPDX-License-Identifier: GPL-3.0-or-later
//! Shared fixtures for the scenario tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediarr_application::{
    build_candidate, ClientDownloadItem, DownloadClient, DownloadClientError, InMemoryProfileStore,
    ProfileStore,
};
use mediarr_domain::{
    DelayProfile, DownloadProtocol, Media, MediaFile, Profile, ProfileId, ProfileQualityItem,
    Quality, QualityModel, QueueStatus, ReleaseInfo, RemoteCandidate,
};

pub fn sd_hd_profile() -> Profile {
    Profile::new(
        ProfileId(1),
        "HD",
        vec![
            ProfileQualityItem::allowed(Quality::SDTV),
            ProfileQualityItem::allowed(Quality::HDTV_720P),
            ProfileQualityItem::allowed(Quality::HDTV_1080P),
        ],
        Quality::HDTV_1080P,
    )
    .expect("valid profile")
}

pub fn profiles(usenet_delay_minutes: u32) -> Arc<dyn ProfileStore> {
    Arc::new(
        InMemoryProfileStore::new(
            vec![sd_hd_profile()],
            vec![DelayProfile::global(usenet_delay_minutes, usenet_delay_minutes)],
        )
        .expect("valid profile store"),
    )
}

pub fn media(library: impl Into<PathBuf>) -> Media {
    Media::new("Movie Title", library, ProfileId(1))
}

pub fn media_with_file(library: impl Into<PathBuf>, quality: QualityModel) -> Media {
    let mut media = media(library);
    media.media_file = Some(MediaFile::new(
        media.id,
        media.path.join("Movie.Title.2020.mkv"),
        1_000,
        quality,
    )
    .with_release_group("GRP"));
    media
}

pub fn usenet_candidate(
    title: &str,
    published: DateTime<Utc>,
    media: Media,
    profiles: &dyn ProfileStore,
) -> RemoteCandidate {
    let release = ReleaseInfo::new(title, "indexer-a", DownloadProtocol::Usenet, published);
    build_candidate(release, media, profiles).expect("candidate")
}

pub fn write_file(dir: &Path, relative: &str, bytes: usize) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create directories");
    }
    fs::write(&path, vec![0u8; bytes]).expect("write file");
    path
}

pub fn client_item(download_id: &str, title: &str, status: QueueStatus) -> ClientDownloadItem {
    ClientDownloadItem {
        download_id: download_id.to_string(),
        title: title.to_string(),
        category: None,
        total_size: 1_000,
        remaining_size: 400,
        remaining_time: Some(chrono::Duration::minutes(5)),
        status,
        output_path: None,
        message: None,
    }
}

/// A download client whose queue is set by the test.
pub struct ScriptedClient {
    name: &'static str,
    protocol: DownloadProtocol,
    items: Mutex<Vec<ClientDownloadItem>>,
    offline: AtomicBool,
    pub added: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(name: &'static str, protocol: DownloadProtocol) -> Arc<Self> {
        Arc::new(Self {
            name,
            protocol,
            items: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            added: Mutex::new(Vec::new()),
        })
    }

    pub fn set_items(&self, items: Vec<ClientDownloadItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl DownloadClient for ScriptedClient {
    fn name(&self) -> &str {
        self.name
    }

    fn protocol(&self) -> DownloadProtocol {
        self.protocol
    }

    async fn test_connection(&self) -> Result<(), DownloadClientError> {
        Ok(())
    }

    async fn get_items(&self) -> Result<Vec<ClientDownloadItem>, DownloadClientError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DownloadClientError::Request("connection refused".into()));
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn remove_item(
        &self,
        item: &ClientDownloadItem,
        _delete_data: bool,
    ) -> Result<(), DownloadClientError> {
        self.items
            .lock()
            .unwrap()
            .retain(|existing| existing.download_id != item.download_id);
        Ok(())
    }

    async fn add_release(&self, release: &ReleaseInfo) -> Result<String, DownloadClientError> {
        let download_id = format!("{}-{}", self.name, self.added.lock().unwrap().len() + 1);
        self.added.lock().unwrap().push(release.title.clone());
        self.items.lock().unwrap().push(client_item(
            &download_id,
            &release.title,
            QueueStatus::Queued,
        ));
        Ok(download_id)
    }
}
