// SPDX-License-Identifier: GPL-3.0-or-later
//! Merged view over client downloads and pending releases.

pub mod pending;
pub mod sort;
pub mod tracked;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use mediarr_domain::{
    Clock, DomainEvent, DownloadProtocol, DownloadRemovedPayload, HistoryEventType, HistoryRecord,
    Language, MediaId, QualityModel, QueueStatus, TrackedDownloadState,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blocklist::BlocklistService;
use crate::download_clients::{DownloadClientError, DownloadClientRegistry};
use crate::events::{EventPublisher, InMemoryEventBus};
use crate::history::HistoryLog;
use crate::profiles::ProfileStore;

pub use pending::{PendingRelease, PendingReleaseService};
pub use sort::{paginate, sort_queue, Page, PagingSpec, QueueFilter, QueueSortKey, SortDirection};
pub use tracked::{TrackedDownload, TrackedDownloadService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemId(pub Uuid);

impl QueueItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub id: QueueItemId,
    /// `None` for releases that have not been sent to a client yet.
    pub download_id: Option<String>,
    pub title: String,
    pub media_id: Option<MediaId>,
    pub quality: QualityModel,
    pub languages: Vec<Language>,
    pub protocol: DownloadProtocol,
    pub indexer: Option<String>,
    pub download_client: Option<String>,
    pub status: QueueStatus,
    pub tracked_state: Option<TrackedDownloadState>,
    pub size: u64,
    pub size_left: u64,
    pub time_left: Option<Duration>,
    pub estimated_completion_time: Option<DateTime<Utc>>,
    pub added: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub output_path: Option<PathBuf>,
}

impl QueueItem {
    /// Percentage complete; 0 for items of unknown size.
    pub fn progress(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        100.0 - (self.size_left as f64 / self.size as f64 * 100.0)
    }

    fn from_tracked(tracked: TrackedDownload, now: DateTime<Utc>) -> Self {
        let remaining_time = tracked.item.remaining_time;
        Self {
            id: tracked.id,
            download_id: Some(tracked.item.download_id),
            title: tracked.item.title,
            media_id: tracked.media_id,
            quality: tracked.quality,
            languages: tracked.languages,
            protocol: tracked.protocol,
            indexer: tracked.indexer,
            download_client: Some(tracked.download_client),
            status: tracked.status,
            tracked_state: Some(tracked.state),
            size: tracked.item.total_size,
            size_left: tracked.item.remaining_size,
            time_left: remaining_time,
            estimated_completion_time: remaining_time.map(|left| now + left),
            added: Some(tracked.added),
            message: tracked.item.message,
            output_path: tracked.item.output_path,
        }
    }

    fn from_pending(pending: PendingRelease, release_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let candidate = pending.candidate;
        let time_left = (release_time - now).max(Duration::zero());
        Self {
            id: pending.id,
            download_id: None,
            title: candidate.release.title,
            media_id: Some(candidate.media.id),
            quality: candidate.parsed.quality,
            languages: candidate.parsed.languages,
            protocol: candidate.release.protocol,
            indexer: Some(candidate.release.indexer),
            download_client: None,
            status: QueueStatus::Delay,
            tracked_state: None,
            size: candidate.release.size,
            size_left: candidate.release.size,
            time_left: Some(time_left),
            estimated_completion_time: Some(release_time),
            added: Some(pending.added),
            message: Some(pending.rejection.message),
            output_path: None,
        }
    }
}

/// Told whenever the queue view may have changed.
pub trait QueueObserver: Send + Sync {
    fn queue_changed(&self);
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue item {0} not found")]
    NotFound(QueueItemId),
    #[error("download client '{0}' is not configured")]
    UnknownClient(String),
    #[error("download {0} is not linked to a media item and cannot be ignored")]
    UnknownMedia(String),
    #[error(transparent)]
    DownloadClient(#[from] DownloadClientError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub clients_polled: usize,
    pub clients_failed: usize,
    pub changed: bool,
}

pub struct QueueService<P: EventPublisher = InMemoryEventBus> {
    clients: DownloadClientRegistry,
    tracked: Arc<TrackedDownloadService>,
    pending: Arc<PendingReleaseService>,
    blocklist: Arc<BlocklistService>,
    history: Arc<HistoryLog>,
    profiles: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
    publisher: Arc<P>,
    observers: RwLock<Vec<Arc<dyn QueueObserver>>>,
}

impl<P: EventPublisher> QueueService<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clients: DownloadClientRegistry,
        tracked: Arc<TrackedDownloadService>,
        pending: Arc<PendingReleaseService>,
        blocklist: Arc<BlocklistService>,
        history: Arc<HistoryLog>,
        profiles: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
        publisher: Arc<P>,
    ) -> Self {
        Self {
            clients,
            tracked,
            pending,
            blocklist,
            history,
            profiles,
            clock,
            publisher,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn QueueObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(observer);
    }

    pub fn notify_changed(&self) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for observer in observers.iter() {
            observer.queue_changed();
        }
    }

    /// Polls every client. A client that fails keeps its last known items.
    pub async fn refresh(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        for client in self.clients.all() {
            report.clients_polled += 1;
            match client.get_items().await {
                Ok(items) => {
                    let count = items.len();
                    let changed =
                        self.tracked
                            .apply_poll(client.name(), client.protocol(), items, self.clock.now());
                    debug!(target: "queue", client = client.name(), items = count, changed, "client polled");
                    report.changed |= changed;
                }
                Err(err) => {
                    report.clients_failed += 1;
                    warn!(
                        target: "queue",
                        client = client.name(),
                        error = %err,
                        "download client poll failed, keeping last known state"
                    );
                }
            }
        }
        if report.changed {
            self.notify_changed();
        }
        report
    }

    /// Every visible tracked download followed by every pending release.
    pub fn get_queue(&self) -> Vec<QueueItem> {
        let now = self.clock.now();
        let mut items: Vec<QueueItem> = self
            .tracked
            .visible()
            .into_iter()
            .map(|tracked| QueueItem::from_tracked(tracked, now))
            .collect();
        items.extend(self.pending.all().into_iter().map(|pending| {
            let release_time = self.pending.release_time(&pending);
            QueueItem::from_pending(pending, release_time, now)
        }));
        items
    }

    pub fn get_queue_page(&self, paging: &PagingSpec, filter: &QueueFilter) -> Page<QueueItem> {
        let mut items: Vec<QueueItem> = self
            .get_queue()
            .into_iter()
            .filter(|item| filter.matches(item))
            .collect();
        let profile = self.profiles.default_profile();
        sort_queue(&mut items, paging.sort_key, paging.sort_direction, &profile);
        paginate(items, paging.page, paging.page_size)
    }

    pub fn find(&self, id: QueueItemId) -> Option<QueueItem> {
        self.get_queue().into_iter().find(|item| item.id == id)
    }

    /// Removes a queue entry.
    ///
    /// Pending releases never touch a client. Tracked downloads are optionally
    /// deleted from their client and optionally marked failed; with neither
    /// flag the download is ignored so later polls keep it hidden.
    pub async fn remove(
        &self,
        id: QueueItemId,
        remove_from_client: bool,
        blocklist: bool,
    ) -> Result<(), QueueError> {
        let now = self.clock.now();

        if let Some(pending) = self.pending.find(id) {
            if blocklist {
                self.blocklist.block_release(
                    pending.candidate.media.id,
                    &pending.candidate.release,
                    pending.candidate.parsed.quality,
                    "Pending release manually blocklisted",
                    now,
                );
            }
            self.pending.remove(id);
            info!(target: "queue", release = %pending.candidate.release.title, blocklist, "pending release removed");
            self.notify_changed();
            return Ok(());
        }

        let tracked = self.tracked.find(id).ok_or(QueueError::NotFound(id))?;
        let download_id = tracked.item.download_id.clone();

        if !remove_from_client && !blocklist {
            let media_id = tracked
                .media_id
                .ok_or_else(|| QueueError::UnknownMedia(download_id.clone()))?;
            self.record(&tracked, media_id, HistoryEventType::DownloadIgnored, "Manually ignored", now);
        }

        if remove_from_client {
            let client = self
                .clients
                .by_name(&tracked.download_client)
                .ok_or_else(|| QueueError::UnknownClient(tracked.download_client.clone()))?;
            client.remove_item(&tracked.item, true).await?;
        }

        if blocklist {
            match tracked.media_id {
                Some(media_id) => {
                    self.record(
                        &tracked,
                        media_id,
                        HistoryEventType::DownloadFailed,
                        "Manually marked as failed",
                        now,
                    );
                    self.blocklist.block_download(
                        media_id,
                        tracked.item.title.clone(),
                        tracked.indexer.clone(),
                        tracked.protocol,
                        tracked.quality,
                        download_id.clone(),
                        "Manually marked as failed",
                        now,
                    );
                }
                None => warn!(
                    target: "queue",
                    %download_id,
                    "download is not linked to a media item, skipping blocklist"
                ),
            }
        }

        self.tracked.stop_tracking(id);
        self.publisher.publish(&DomainEvent::new(
            DownloadRemovedPayload {
                download_id: download_id.clone(),
                download_client: tracked.download_client.clone(),
                removed_from_client: remove_from_client,
                blocklisted: blocklist,
            },
            self.clock.now(),
        ));
        info!(
            target: "queue",
            %download_id,
            client = %tracked.download_client,
            remove_from_client,
            blocklist,
            "download removed from queue"
        );
        self.notify_changed();
        Ok(())
    }

    fn record(
        &self,
        tracked: &TrackedDownload,
        media_id: MediaId,
        event_type: HistoryEventType,
        message: &str,
        now: DateTime<Utc>,
    ) {
        let mut record = HistoryRecord::new(media_id, event_type, tracked.quality, now)
            .with_download_id(tracked.item.download_id.clone())
            .with_source_title(tracked.item.title.clone());
        record.languages = tracked.languages.clone();
        record.indexer = tracked.indexer.clone();
        record.protocol = Some(tracked.protocol);
        record.message = Some(message.to_string());
        self.history.append(record);
    }
}
