// SPDX-License-Identifier: GPL-3.0-or-later
//! Releases accepted in principle but held back by a temporary rejection.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use mediarr_domain::{MediaId, Rejection, RemoteCandidate};
use tracing::{debug, info, warn};

use super::QueueItemId;
use crate::profiles::ProfileStore;

#[derive(Debug, Clone)]
pub struct PendingRelease {
    pub id: QueueItemId,
    pub candidate: RemoteCandidate,
    pub rejection: Rejection,
    pub added: DateTime<Utc>,
}

impl PendingRelease {
    fn same_release(&self, other: &RemoteCandidate) -> bool {
        let mine = &self.candidate;
        mine.media.id == other.media.id
            && mine.release.title == other.release.title
            && mine.release.indexer == other.release.indexer
            && mine.release.publish_date == other.release.publish_date
    }
}

pub struct PendingReleaseService {
    profiles: Arc<dyn ProfileStore>,
    releases: RwLock<Vec<PendingRelease>>,
}

impl PendingReleaseService {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            profiles,
            releases: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<PendingRelease>> {
        self.releases.read().unwrap_or_else(|poisoned| {
            warn!(target: "queue", "pending releases lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<PendingRelease>> {
        self.releases.write().unwrap_or_else(|poisoned| {
            warn!(target: "queue", "pending releases lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Adds a held-back release. Returns `false` when the same release is already
    /// pending, in which case only its rejection is refreshed.
    pub fn add(&self, candidate: RemoteCandidate, rejection: Rejection, now: DateTime<Utc>) -> bool {
        let mut releases = self.write();
        if let Some(existing) = releases.iter_mut().find(|pending| pending.same_release(&candidate)) {
            debug!(target: "queue", release = %candidate.release.title, "release already pending");
            existing.rejection = rejection;
            return false;
        }
        info!(
            target: "queue",
            release = %candidate.release.title,
            reason = %rejection.message,
            "adding release to pending"
        );
        releases.push(PendingRelease {
            id: QueueItemId::new(),
            candidate,
            rejection,
            added: now,
        });
        true
    }

    pub fn all(&self) -> Vec<PendingRelease> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: QueueItemId) -> Option<PendingRelease> {
        self.read().iter().find(|pending| pending.id == id).cloned()
    }

    pub fn remove(&self, id: QueueItemId) -> Option<PendingRelease> {
        let mut releases = self.write();
        let index = releases.iter().position(|pending| pending.id == id)?;
        Some(releases.remove(index))
    }

    /// Drops everything pending for `media_id`, typically after a grab.
    pub fn remove_for_media(&self, media_id: MediaId) -> usize {
        let mut releases = self.write();
        let before = releases.len();
        releases.retain(|pending| pending.candidate.media.id != media_id);
        before - releases.len()
    }

    /// Drops the entry for this exact release, if any.
    pub fn remove_release(&self, candidate: &RemoteCandidate) -> bool {
        let mut releases = self.write();
        let before = releases.len();
        releases.retain(|pending| !pending.same_release(candidate));
        before != releases.len()
    }

    /// When the delay for `pending` runs out: publish date plus the resolved delay.
    pub fn release_time(&self, pending: &PendingRelease) -> DateTime<Utc> {
        let release = &pending.candidate.release;
        let delay = self
            .profiles
            .delay_profile_for_tags(&pending.candidate.media.tags)
            .delay_for(release.protocol);
        release.publish_date + Duration::minutes(i64::from(delay))
    }
}
