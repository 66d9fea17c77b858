// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::RwLock;

use mediarr_domain::{HistoryEventType, HistoryRecord, MediaId};
use tracing::{debug, warn};

use crate::error::CollaboratorError;

/// Read side of the history log. Results are ordered newest first.
pub trait HistoryService: Send + Sync {
    fn find_by_download_id(&self, download_id: &str) -> Result<Vec<HistoryRecord>, CollaboratorError>;

    fn get_by_media_id(&self, media_id: MediaId) -> Result<Vec<HistoryRecord>, CollaboratorError>;

    fn latest_of_type(
        &self,
        media_id: MediaId,
        event_type: HistoryEventType,
    ) -> Result<Option<HistoryRecord>, CollaboratorError> {
        Ok(self
            .get_by_media_id(media_id)?
            .into_iter()
            .find(|record| record.event_type == event_type))
    }

    fn latest_for_download(
        &self,
        download_id: &str,
        event_type: HistoryEventType,
    ) -> Result<Option<HistoryRecord>, CollaboratorError> {
        Ok(self
            .find_by_download_id(download_id)?
            .into_iter()
            .find(|record| record.event_type == event_type))
    }
}

/// In-memory append-only event log.
#[derive(Default)]
pub struct HistoryLog {
    records: RwLock<Vec<HistoryRecord>>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: HistoryRecord) {
        debug!(
            target: "history",
            media_id = %record.media_id,
            event_type = ?record.event_type,
            download_id = record.download_id.as_deref().unwrap_or("-"),
            "appending history record"
        );
        self.records
            .write()
            .unwrap_or_else(|poisoned| {
                warn!(target: "history", "history lock poisoned, recovering");
                poisoned.into_inner()
            })
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<HistoryRecord>> {
        self.records.read().unwrap_or_else(|poisoned| {
            warn!(target: "history", "history lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn newest_first<F>(&self, predicate: F) -> Vec<HistoryRecord>
    where
        F: Fn(&HistoryRecord) -> bool,
    {
        let mut matches: Vec<HistoryRecord> =
            self.read().iter().filter(|r| predicate(r)).cloned().collect();
        // Ties keep the most recent append first.
        matches.reverse();
        matches.sort_by(|a, b| b.date.cmp(&a.date));
        matches
    }
}

impl HistoryService for HistoryLog {
    fn find_by_download_id(&self, download_id: &str) -> Result<Vec<HistoryRecord>, CollaboratorError> {
        Ok(self.newest_first(|record| {
            record
                .download_id
                .as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(download_id))
        }))
    }

    fn get_by_media_id(&self, media_id: MediaId) -> Result<Vec<HistoryRecord>, CollaboratorError> {
        Ok(self.newest_first(|record| record.media_id == media_id))
    }
}
