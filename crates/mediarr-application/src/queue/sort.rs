// SPDX-License-Identifier: GPL-3.0-or-later
//! Filtering, ordering and paging of the merged queue view.

use std::cmp::Ordering;

use mediarr_domain::{DownloadProtocol, Language, MediaId, Profile, Quality};
use serde::{Deserialize, Serialize};

use super::QueueItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueSortKey {
    #[default]
    Timeleft,
    EstimatedCompletionTime,
    Quality,
    Languages,
    Title,
    Status,
    Protocol,
    Indexer,
    DownloadClient,
    Size,
    Progress,
    Added,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingSpec {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub sort_key: QueueSortKey,
    pub sort_direction: SortDirection,
}

impl PagingSpec {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            sort_key: QueueSortKey::default(),
            sort_direction: SortDirection::default(),
        }
    }

    pub fn sorted_by(mut self, sort_key: QueueSortKey, sort_direction: SortDirection) -> Self {
        self.sort_key = sort_key;
        self.sort_direction = sort_direction;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub page: usize,
    pub page_size: usize,
    pub total_records: usize,
    pub records: Vec<T>,
}

/// Narrows the queue view. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueFilter {
    #[serde(default)]
    pub media_ids: Vec<MediaId>,
    #[serde(default)]
    pub protocol: Option<DownloadProtocol>,
    #[serde(default)]
    pub languages: Vec<Language>,
    #[serde(default)]
    pub qualities: Vec<Quality>,
    /// Keep downloads that could not be linked to a media item.
    #[serde(default)]
    pub include_unknown_media: bool,
}

impl QueueFilter {
    pub fn matches(&self, item: &QueueItem) -> bool {
        match item.media_id {
            None if !self.include_unknown_media => return false,
            Some(media_id) if !self.media_ids.is_empty() && !self.media_ids.contains(&media_id) => {
                return false
            }
            None if !self.media_ids.is_empty() => return false,
            _ => {}
        }
        if self.protocol.is_some_and(|protocol| protocol != item.protocol) {
            return false;
        }
        if !self.languages.is_empty()
            && !item.languages.iter().any(|language| self.languages.contains(language))
        {
            return false;
        }
        if !self.qualities.is_empty() && !self.qualities.contains(&item.quality.quality) {
            return false;
        }
        true
    }
}

/// Unknown values sort after known ones.
fn compare_known<T: Ord>(left: Option<T>, right: Option<T>) -> Ordering {
    match (left, right) {
        (Some(l), Some(r)) => l.cmp(&r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// An empty download has no meaningful estimate.
fn known_time_left(item: &QueueItem) -> Option<chrono::Duration> {
    if item.size == 0 {
        None
    } else {
        item.time_left
    }
}

fn compare_languages(left: &[Language], right: &[Language]) -> Ordering {
    let first = |languages: &[Language]| languages.first().map(Language::name).unwrap_or_default();
    first(left)
        .cmp(&first(right))
        .then_with(|| left.len().cmp(&right.len()))
}

fn compare_text(left: Option<&str>, right: Option<&str>) -> Ordering {
    compare_known(
        left.map(str::to_lowercase),
        right.map(str::to_lowercase),
    )
}

fn compare_by_key(key: QueueSortKey, profile: &Profile, left: &QueueItem, right: &QueueItem) -> Ordering {
    match key {
        QueueSortKey::Timeleft => compare_known(known_time_left(left), known_time_left(right)),
        QueueSortKey::EstimatedCompletionTime => {
            compare_known(left.estimated_completion_time, right.estimated_completion_time)
        }
        QueueSortKey::Quality => profile.comparer().compare(&left.quality, &right.quality),
        QueueSortKey::Languages => compare_languages(&left.languages, &right.languages),
        QueueSortKey::Title => compare_text(Some(left.title.as_str()), Some(right.title.as_str())),
        QueueSortKey::Status => left.status.to_string().cmp(&right.status.to_string()),
        QueueSortKey::Protocol => left.protocol.to_string().cmp(&right.protocol.to_string()),
        QueueSortKey::Indexer => compare_text(left.indexer.as_deref(), right.indexer.as_deref()),
        QueueSortKey::DownloadClient => {
            compare_text(left.download_client.as_deref(), right.download_client.as_deref())
        }
        QueueSortKey::Size => left.size.cmp(&right.size),
        QueueSortKey::Progress => left.progress().total_cmp(&right.progress()),
        QueueSortKey::Added => compare_known(left.added, right.added),
    }
}

/// Sorts in place. Quality is ranked by `profile`; ties go to the most complete item.
pub fn sort_queue(items: &mut [QueueItem], key: QueueSortKey, direction: SortDirection, profile: &Profile) {
    items.sort_by(|left, right| {
        let primary = compare_by_key(key, profile, left, right);
        let primary = match direction {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary.then_with(|| right.progress().total_cmp(&left.progress()))
    });
}

/// Slices an already sorted list. Pages past the end clamp to the last page.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_records = items.len();
    let last_page = total_records.div_ceil(page_size).max(1);
    let page = page.clamp(1, last_page);
    let records = items
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();
    Page {
        page,
        page_size,
        total_records,
        records,
    }
}
