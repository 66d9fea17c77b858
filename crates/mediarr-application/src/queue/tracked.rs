// SPDX-License-Identifier: GPL-3.0-or-later
//! Downloads observed on the configured clients.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use mediarr_domain::{
    DownloadProtocol, HistoryEventType, Language, MediaId, QualityModel, QueueStatus,
    TrackedDownloadState,
};
use tracing::{debug, warn};

use super::QueueItemId;
use crate::download_clients::ClientDownloadItem;
use crate::history::HistoryService;
use crate::parsing::parse_release_title;
use crate::specifications::grab::{QueuedRelease, QueuedReleases};

#[derive(Debug, Clone)]
pub struct TrackedDownload {
    pub id: QueueItemId,
    pub download_client: String,
    pub protocol: DownloadProtocol,
    pub item: ClientDownloadItem,
    pub status: QueueStatus,
    pub state: TrackedDownloadState,
    pub media_id: Option<MediaId>,
    pub quality: QualityModel,
    pub languages: Vec<Language>,
    pub indexer: Option<String>,
    pub added: DateTime<Utc>,
}

impl TrackedDownload {
    /// Shown in the queue: still on the client and not already handled.
    pub fn is_visible(&self) -> bool {
        self.status != QueueStatus::Deleted
            && !matches!(
                self.state,
                TrackedDownloadState::Imported | TrackedDownloadState::Ignored
            )
    }
}

type TrackingKey = (String, String);

fn key(client: &str, download_id: &str) -> TrackingKey {
    (client.to_lowercase(), download_id.to_lowercase())
}

pub struct TrackedDownloadService {
    history: Arc<dyn HistoryService>,
    downloads: RwLock<HashMap<TrackingKey, TrackedDownload>>,
}

impl TrackedDownloadService {
    pub fn new(history: Arc<dyn HistoryService>) -> Self {
        Self {
            history,
            downloads: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TrackingKey, TrackedDownload>> {
        self.downloads.read().unwrap_or_else(|poisoned| {
            warn!(target: "queue", "tracked downloads lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TrackingKey, TrackedDownload>> {
        self.downloads.write().unwrap_or_else(|poisoned| {
            warn!(target: "queue", "tracked downloads lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Applies one successful poll of `client`. Returns whether anything changed.
    ///
    /// Downloads the client no longer reports become `Deleted`. A client whose
    /// poll failed must not be passed here, so its last known items survive.
    pub fn apply_poll(
        &self,
        client: &str,
        protocol: DownloadProtocol,
        items: Vec<ClientDownloadItem>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut changed = false;
        let mut seen = HashSet::new();
        // History lookups happen before taking the write lock.
        let resolved: Vec<_> = items
            .into_iter()
            .map(|item| {
                let tracking_key = key(client, &item.download_id);
                let known = self.read().contains_key(&tracking_key);
                let origin = (!known).then(|| self.resolve_origin(&item));
                (tracking_key, item, origin)
            })
            .collect();

        let mut downloads = self.write();
        for (tracking_key, item, origin) in resolved {
            seen.insert(tracking_key.clone());
            match downloads.get_mut(&tracking_key) {
                Some(tracked) => {
                    if tracked.status.can_transition_to(item.status) {
                        if tracked.status != item.status {
                            debug!(
                                target: "queue",
                                download_id = %item.download_id,
                                from = %tracked.status,
                                to = %item.status,
                                "download status changed"
                            );
                            tracked.status = item.status;
                            changed = true;
                        }
                    } else {
                        debug!(
                            target: "queue",
                            download_id = %item.download_id,
                            from = %tracked.status,
                            to = %item.status,
                            "ignoring invalid status transition"
                        );
                    }
                    if tracked.item != item {
                        changed = true;
                    }
                    tracked.item = item;
                }
                None => {
                    let origin = origin.unwrap_or_else(|| Origin::from_title(&item.title));
                    debug!(
                        target: "queue",
                        client,
                        download_id = %item.download_id,
                        state = ?origin.state,
                        "tracking new download"
                    );
                    downloads.insert(
                        tracking_key,
                        TrackedDownload {
                            id: QueueItemId::new(),
                            download_client: client.to_string(),
                            protocol,
                            status: item.status,
                            item,
                            state: origin.state,
                            media_id: origin.media_id,
                            quality: origin.quality,
                            languages: origin.languages,
                            indexer: origin.indexer,
                            added: now,
                        },
                    );
                    changed = true;
                }
            }
        }

        let client_key = client.to_lowercase();
        for (tracking_key, tracked) in downloads.iter_mut() {
            if tracking_key.0 == client_key
                && !seen.contains(tracking_key)
                && tracked.status != QueueStatus::Deleted
            {
                debug!(target: "queue", download_id = %tracked.item.download_id, "download gone from client");
                tracked.status = QueueStatus::Deleted;
                changed = true;
            }
        }
        changed
    }

    fn resolve_origin(&self, item: &ClientDownloadItem) -> Origin {
        let records = match self.history.find_by_download_id(&item.download_id) {
            Ok(records) => records,
            Err(err) => {
                warn!(target: "queue", download_id = %item.download_id, %err, "history lookup failed");
                return Origin::from_title(&item.title);
            }
        };
        let Some(latest) = records.first() else {
            return Origin::from_title(&item.title);
        };
        let grabbed = records
            .iter()
            .find(|record| record.event_type == HistoryEventType::Grabbed)
            .unwrap_or(latest);
        Origin {
            state: TrackedDownloadState::from_history(latest.event_type),
            media_id: Some(grabbed.media_id),
            quality: grabbed.quality,
            languages: grabbed.languages.clone(),
            indexer: grabbed.indexer.clone(),
        }
    }

    pub fn all(&self) -> Vec<TrackedDownload> {
        self.read().values().cloned().collect()
    }

    pub fn visible(&self) -> Vec<TrackedDownload> {
        self.read()
            .values()
            .filter(|tracked| tracked.is_visible())
            .cloned()
            .collect()
    }

    pub fn find(&self, id: QueueItemId) -> Option<TrackedDownload> {
        self.read().values().find(|tracked| tracked.id == id).cloned()
    }

    pub fn find_by_download_id(&self, download_id: &str) -> Option<TrackedDownload> {
        self.read()
            .values()
            .find(|tracked| tracked.item.download_id.eq_ignore_ascii_case(download_id))
            .cloned()
    }

    pub fn set_state(&self, id: QueueItemId, state: TrackedDownloadState) -> bool {
        match self.write().values_mut().find(|tracked| tracked.id == id) {
            Some(tracked) => {
                tracked.state = state;
                true
            }
            None => false,
        }
    }

    pub fn stop_tracking(&self, id: QueueItemId) -> Option<TrackedDownload> {
        let mut downloads = self.write();
        let tracking_key = downloads
            .iter()
            .find(|(_, tracked)| tracked.id == id)
            .map(|(tracking_key, _)| tracking_key.clone())?;
        downloads.remove(&tracking_key)
    }
}

impl QueuedReleases for TrackedDownloadService {
    fn queued_for(&self, media_id: MediaId) -> Vec<QueuedRelease> {
        self.read()
            .values()
            .filter(|tracked| tracked.is_visible() && tracked.media_id == Some(media_id))
            .map(|tracked| QueuedRelease {
                title: tracked.item.title.clone(),
                quality: tracked.quality,
                failed: tracked.state == TrackedDownloadState::Failed
                    || tracked.status == QueueStatus::Failed,
            })
            .collect()
    }
}

struct Origin {
    state: TrackedDownloadState,
    media_id: Option<MediaId>,
    quality: QualityModel,
    languages: Vec<Language>,
    indexer: Option<String>,
}

impl Origin {
    /// Download not started by us; only the title is known.
    fn from_title(title: &str) -> Self {
        let parsed = parse_release_title(title);
        Self {
            state: TrackedDownloadState::Downloading,
            media_id: None,
            quality: parsed.quality,
            languages: parsed.languages,
            indexer: None,
        }
    }
}
