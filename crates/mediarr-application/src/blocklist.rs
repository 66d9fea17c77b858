// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use mediarr_domain::{DownloadProtocol, MediaId, QualityModel, ReleaseInfo};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlocklistEntry {
    pub id: Uuid,
    pub media_id: MediaId,
    pub source_title: String,
    pub indexer: Option<String>,
    pub protocol: Option<DownloadProtocol>,
    pub quality: QualityModel,
    pub guid: Option<String>,
    pub download_id: Option<String>,
    pub date: DateTime<Utc>,
    pub message: String,
}

/// Releases and downloads that must never be grabbed again.
#[derive(Default)]
pub struct BlocklistService {
    entries: RwLock<Vec<BlocklistEntry>>,
}

impl BlocklistService {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<BlocklistEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(target: "blocklist", "blocklist lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<BlocklistEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!(target: "blocklist", "blocklist lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Block a release that was never handed to a download client.
    pub fn block_release(
        &self,
        media_id: MediaId,
        release: &ReleaseInfo,
        quality: QualityModel,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let message = message.into();
        info!(target: "blocklist", release = %release.title, %message, "blocklisting release");
        self.write().push(BlocklistEntry {
            id: Uuid::new_v4(),
            media_id,
            source_title: release.title.clone(),
            indexer: Some(release.indexer.clone()),
            protocol: Some(release.protocol),
            quality,
            guid: Some(release.guid.clone()),
            download_id: release.info_hash.clone(),
            date: now,
            message,
        });
    }

    /// Block a download a client already knows about.
    #[allow(clippy::too_many_arguments)]
    pub fn block_download(
        &self,
        media_id: MediaId,
        source_title: impl Into<String>,
        indexer: Option<String>,
        protocol: DownloadProtocol,
        quality: QualityModel,
        download_id: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let source_title = source_title.into();
        let message = message.into();
        info!(target: "blocklist", release = %source_title, %message, "blocklisting download");
        self.write().push(BlocklistEntry {
            id: Uuid::new_v4(),
            media_id,
            source_title,
            indexer,
            protocol: Some(protocol),
            quality,
            guid: None,
            download_id: Some(download_id.into()),
            date: now,
            message,
        });
    }

    pub fn is_blocklisted(&self, media_id: MediaId, release: &ReleaseInfo) -> bool {
        self.read().iter().any(|entry| {
            if entry.media_id != media_id {
                return false;
            }
            if entry.guid.as_deref() == Some(release.guid.as_str()) {
                return true;
            }
            if let (Some(blocked), Some(hash)) = (&entry.download_id, &release.info_hash) {
                if blocked.eq_ignore_ascii_case(hash) {
                    return true;
                }
            }
            entry.source_title.eq_ignore_ascii_case(&release.title)
                && entry.indexer.as_deref() == Some(release.indexer.as_str())
        })
    }

    pub fn all(&self) -> Vec<BlocklistEntry> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediarr_domain::Quality;

    fn release(title: &str) -> ReleaseInfo {
        ReleaseInfo::new(title, "indexer-a", DownloadProtocol::Torrent, Utc::now())
    }

    #[test]
    fn blocks_by_guid_for_same_media_only() {
        let service = BlocklistService::new();
        let media_id = MediaId::new();
        let r = release("Movie.2020.720p.HDTV-GRP");
        service.block_release(media_id, &r, QualityModel::new(Quality::HDTV_720P), "bad", Utc::now());

        assert!(service.is_blocklisted(media_id, &r));
        assert!(!service.is_blocklisted(MediaId::new(), &r));
    }

    #[test]
    fn blocks_same_title_from_same_indexer() {
        let service = BlocklistService::new();
        let media_id = MediaId::new();
        service.block_release(
            media_id,
            &release("Movie.2020.720p.HDTV-GRP"),
            QualityModel::new(Quality::HDTV_720P),
            "bad",
            Utc::now(),
        );

        assert!(service.is_blocklisted(media_id, &release("movie.2020.720p.hdtv-grp")));
        let mut other_indexer = release("Movie.2020.720p.HDTV-GRP");
        other_indexer.indexer = "indexer-b".into();
        assert!(!service.is_blocklisted(media_id, &other_indexer));
    }

    #[test]
    fn blocks_download_by_info_hash() {
        let service = BlocklistService::new();
        let media_id = MediaId::new();
        service.block_download(
            media_id,
            "Movie.2020.1080p.WEB-DL",
            None,
            DownloadProtocol::Torrent,
            QualityModel::new(Quality::WEBDL_1080P),
            "ABCDEF",
            "failed",
            Utc::now(),
        );
        let mut r = release("Different.Title");
        r.info_hash = Some("abcdef".into());
        assert!(service.is_blocklisted(media_id, &r));
        assert_eq!(service.len(), 1);
    }
}
