// SPDX-License-Identifier: GPL-3.0-or-later
//! Rules evaluated against a remote release before it is grabbed.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Duration;
use mediarr_domain::{
    Clock, Decision, DownloadProtocol, HistoryEventType, MediaId, QualityModel, RejectionKind,
    RemoteCandidate, SearchContext,
};

use super::{collaborator_unavailable, Priority, Rule};
use crate::blocklist::BlocklistService;
use crate::history::HistoryService;
use crate::upgrade::UpgradePolicy;

/// Identity a client would use for this release, if it is known before grabbing.
pub(crate) fn remote_download_id(candidate: &RemoteCandidate) -> Option<&str> {
    candidate
        .download_id
        .as_deref()
        .or(candidate.release.info_hash.as_deref())
}

/// Tags on the indexer and on the media must overlap when both are set.
pub struct TagRestrictionSpecification;

impl Rule<RemoteCandidate> for TagRestrictionSpecification {
    fn name(&self) -> &'static str {
        "tag-restriction"
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        let indexer_tags = &candidate.release.indexer_tags;
        let media_tags = &candidate.media.tags;
        if indexer_tags.is_empty() || media_tags.is_empty() {
            return Decision::accept();
        }
        if indexer_tags.is_disjoint(media_tags) {
            return Decision::reject(
                RejectionKind::TagMismatch,
                format!(
                    "Media tags do not match any tags on indexer {}",
                    candidate.release.indexer
                ),
            );
        }
        Decision::accept()
    }
}

pub struct QualityAllowedByProfileSpecification;

impl Rule<RemoteCandidate> for QualityAllowedByProfileSpecification {
    fn name(&self) -> &'static str {
        "quality-allowed-by-profile"
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        let quality = candidate.quality().quality;
        if candidate.profile.is_allowed(quality) {
            Decision::accept()
        } else {
            Decision::reject(
                RejectionKind::QualityNotWanted,
                format!("{quality} is not wanted in profile {}", candidate.profile.name),
            )
        }
    }
}

/// Holds back fresh usenet posts until they have propagated.
pub struct MinimumAgeSpecification {
    minimum_age_minutes: u32,
    clock: Arc<dyn Clock>,
}

impl MinimumAgeSpecification {
    pub fn new(minimum_age_minutes: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            minimum_age_minutes,
            clock,
        }
    }
}

impl Rule<RemoteCandidate> for MinimumAgeSpecification {
    fn name(&self) -> &'static str {
        "minimum-age"
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        if candidate.release.protocol != DownloadProtocol::Usenet || self.minimum_age_minutes == 0 {
            return Decision::accept();
        }
        let age = candidate.release.age(self.clock.now());
        if age < Duration::minutes(i64::from(self.minimum_age_minutes)) {
            return Decision::reject_temporarily(
                RejectionKind::MinimumAge,
                format!(
                    "Only {} minutes old, minimum age is {} minutes",
                    age.num_minutes(),
                    self.minimum_age_minutes
                ),
            );
        }
        Decision::accept()
    }
}

/// A file already on disk must be beaten.
pub struct UpgradeDiskSpecification {
    policy: UpgradePolicy,
}

impl UpgradeDiskSpecification {
    pub fn new(policy: UpgradePolicy) -> Self {
        Self { policy }
    }
}

impl Rule<RemoteCandidate> for UpgradeDiskSpecification {
    fn name(&self) -> &'static str {
        "upgrade-disk"
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        let Some(file) = &candidate.media.media_file else {
            return Decision::accept();
        };
        if self
            .policy
            .is_upgrade(&candidate.profile, &file.quality, candidate.quality())
        {
            Decision::accept()
        } else {
            Decision::reject(
                RejectionKind::NotUpgrade,
                format!("Existing file on disk is of equal or higher quality: {}", file.quality),
            )
        }
    }
}

/// A proper or repack only replaces a file from the same release group.
pub struct RepackSpecification {
    policy: UpgradePolicy,
}

impl RepackSpecification {
    pub fn new(policy: UpgradePolicy) -> Self {
        Self { policy }
    }
}

impl Rule<RemoteCandidate> for RepackSpecification {
    fn name(&self) -> &'static str {
        "repack"
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        if !candidate.quality().revision.is_proper() {
            return Decision::accept();
        }
        let Some(file) = &candidate.media.media_file else {
            return Decision::accept();
        };
        if file.quality.quality != candidate.quality().quality {
            return Decision::accept();
        }
        if !self.policy.download_propers_and_repacks() {
            return Decision::reject(
                RejectionKind::UpgradeNotAllowed,
                "Proper and repack downloads are disabled",
            );
        }
        let Some(file_group) = file.release_group.as_deref().filter(|g| !g.trim().is_empty()) else {
            return Decision::reject(
                RejectionKind::ReleaseGroupMismatch,
                "Unable to determine release group for the existing file",
            );
        };
        let Some(release_group) = candidate
            .parsed
            .release_group
            .as_deref()
            .filter(|g| !g.trim().is_empty())
        else {
            return Decision::reject(
                RejectionKind::ReleaseGroupMismatch,
                "Unable to determine release group for this release",
            );
        };
        if !file_group.eq_ignore_ascii_case(release_group) {
            return Decision::reject(
                RejectionKind::ReleaseGroupMismatch,
                format!(
                    "Release is a repack for a different release group. Release group: {release_group}. File release group: {file_group}"
                ),
            );
        }
        Decision::accept()
    }
}

pub struct UpgradeAllowedSpecification {
    policy: UpgradePolicy,
}

impl UpgradeAllowedSpecification {
    pub fn new(policy: UpgradePolicy) -> Self {
        Self { policy }
    }
}

impl Rule<RemoteCandidate> for UpgradeAllowedSpecification {
    fn name(&self) -> &'static str {
        "upgrade-allowed"
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        let Some(file) = &candidate.media.media_file else {
            return Decision::accept();
        };
        if self
            .policy
            .is_upgrade_allowed(&candidate.profile, &file.quality, candidate.quality())
        {
            Decision::accept()
        } else {
            Decision::reject(
                RejectionKind::UpgradeNotAllowed,
                "Profile does not allow upgrades",
            )
        }
    }
}

pub struct CutoffSpecification {
    policy: UpgradePolicy,
}

impl CutoffSpecification {
    pub fn new(policy: UpgradePolicy) -> Self {
        Self { policy }
    }
}

impl Rule<RemoteCandidate> for CutoffSpecification {
    fn name(&self) -> &'static str {
        "cutoff"
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        let Some(file) = &candidate.media.media_file else {
            return Decision::accept();
        };
        if self
            .policy
            .cutoff_blocks(&candidate.profile, &file.quality, candidate.quality())
        {
            return Decision::reject(
                RejectionKind::CutoffMet,
                format!("Existing file meets cutoff: {}", candidate.profile.cutoff),
            );
        }
        Decision::accept()
    }
}

pub struct BlocklistSpecification {
    blocklist: Arc<BlocklistService>,
}

impl BlocklistSpecification {
    pub fn new(blocklist: Arc<BlocklistService>) -> Self {
        Self { blocklist }
    }
}

impl Rule<RemoteCandidate> for BlocklistSpecification {
    fn name(&self) -> &'static str {
        "blocklist"
    }

    fn priority(&self) -> Priority {
        Priority::Database
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        if self
            .blocklist
            .is_blocklisted(candidate.media.id, &candidate.release)
        {
            Decision::reject(RejectionKind::Blocklisted, "Release is blocklisted")
        } else {
            Decision::accept()
        }
    }
}

/// A download that was grabbed before must keep the quality it was grabbed at.
pub struct AlreadyGrabbedDifferentQualitySpecification {
    history: Arc<dyn HistoryService>,
}

impl AlreadyGrabbedDifferentQualitySpecification {
    pub fn new(history: Arc<dyn HistoryService>) -> Self {
        Self { history }
    }
}

impl Rule<RemoteCandidate> for AlreadyGrabbedDifferentQualitySpecification {
    fn name(&self) -> &'static str {
        "already-grabbed-different-quality"
    }

    fn priority(&self) -> Priority {
        Priority::Database
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        let Some(download_id) = remote_download_id(candidate) else {
            return Decision::accept();
        };
        let grabbed = match self
            .history
            .latest_for_download(download_id, HistoryEventType::Grabbed)
        {
            Ok(grabbed) => grabbed,
            Err(err) => return collaborator_unavailable(self.name(), &err),
        };
        let Some(grabbed) = grabbed else {
            return Decision::accept();
        };
        if candidate
            .profile
            .comparer()
            .compare(&grabbed.quality, candidate.quality())
            != Ordering::Equal
        {
            return Decision::reject(
                RejectionKind::QualityMismatch,
                format!(
                    "Quality mismatch with prior grab: grabbed {}, release is {}",
                    grabbed.quality,
                    candidate.quality()
                ),
            );
        }
        Decision::accept()
    }
}

/// A release already handed to a download client.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRelease {
    pub title: String,
    pub quality: QualityModel,
    /// The client gave up on it; it no longer blocks anything.
    pub failed: bool,
}

/// Read-only view of the downloads in flight for a media item.
pub trait QueuedReleases: Send + Sync {
    fn queued_for(&self, media_id: MediaId) -> Vec<QueuedRelease>;
}

/// Something already downloading must be beaten, and only when upgrades are allowed.
pub struct QueueSpecification {
    queue: Arc<dyn QueuedReleases>,
    policy: UpgradePolicy,
}

impl QueueSpecification {
    pub fn new(queue: Arc<dyn QueuedReleases>, policy: UpgradePolicy) -> Self {
        Self { queue, policy }
    }
}

impl Rule<RemoteCandidate> for QueueSpecification {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn priority(&self) -> Priority {
        Priority::Database
    }

    fn evaluate(&self, candidate: &RemoteCandidate, _context: Option<&SearchContext>) -> Decision {
        let profile = &candidate.profile;
        for queued in self.queue.queued_for(candidate.media.id) {
            if queued.failed {
                continue;
            }
            if self
                .policy
                .cutoff_blocks(profile, &queued.quality, candidate.quality())
            {
                return Decision::reject(
                    RejectionKind::AlreadyQueued,
                    format!("Release in queue already meets cutoff: {}", queued.quality),
                );
            }
            if !self.policy.is_upgrade(profile, &queued.quality, candidate.quality()) {
                return Decision::reject(
                    RejectionKind::AlreadyQueued,
                    format!(
                        "Release in queue is of equal or higher preference: {}",
                        queued.quality
                    ),
                );
            }
            if !self
                .policy
                .is_upgrade_allowed(profile, &queued.quality, candidate.quality())
            {
                return Decision::reject(
                    RejectionKind::UpgradeNotAllowed,
                    format!(
                        "Another release is queued and upgrades are not allowed: {}",
                        queued.title
                    ),
                );
            }
        }
        Decision::accept()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::error::CollaboratorError;
    use crate::history::HistoryLog;
    use chrono::Utc;
    use mediarr_domain::{
        HistoryRecord, ManualClock, MediaId, Profile, ProfileId, ProfileQualityItem, Quality,
        QualityModel, Revision,
    };

    #[test]
    fn tags_must_intersect_when_both_sides_have_them() {
        let rule = TagRestrictionSpecification;
        let mut c = candidate(QualityModel::new(Quality::HDTV_720P), Utc::now());
        assert!(rule.evaluate(&c, None).is_accepted());

        c.release.indexer_tags = tags(&[1]);
        assert!(rule.evaluate(&c, None).is_accepted());

        c.media.tags = tags(&[2]);
        let decision = rule.evaluate(&c, None);
        assert_eq!(decision.rejection().map(|r| r.kind), Some(RejectionKind::TagMismatch));

        c.media.tags = tags(&[1, 2]);
        assert!(rule.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn quality_must_be_allowed() {
        let rule = QualityAllowedByProfileSpecification;
        let c = candidate(QualityModel::new(Quality::BLURAY_2160P), Utc::now());
        assert_eq!(
            rule.evaluate(&c, None).rejection().map(|r| r.kind),
            Some(RejectionKind::QualityNotWanted)
        );
    }

    #[test]
    fn minimum_age_applies_to_usenet_only() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let rule = MinimumAgeSpecification::new(30, clock);
        let mut c = candidate(QualityModel::new(Quality::HDTV_720P), now - Duration::minutes(10));

        let decision = rule.evaluate(&c, None);
        assert!(decision.is_temporarily_rejected());

        c.release.protocol = DownloadProtocol::Torrent;
        assert!(rule.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn upgrade_disk_rejects_equal_quality() {
        let rule = UpgradeDiskSpecification::new(UpgradePolicy::default());
        let q = QualityModel::new(Quality::HDTV_720P);
        let c = with_file(candidate(q, Utc::now()), q);
        assert_eq!(
            rule.evaluate(&c, None).rejection().map(|r| r.kind),
            Some(RejectionKind::NotUpgrade)
        );

        let better = with_file(
            candidate(QualityModel::new(Quality::HDTV_1080P), Utc::now()),
            q,
        );
        assert!(rule.evaluate(&better, None).is_accepted());
    }

    #[test]
    fn cutoff_met_blocks_non_revision_candidates() {
        let rule = CutoffSpecification::new(UpgradePolicy::default());
        let existing = QualityModel::new(Quality::HDTV_1080P);
        let c = with_file(candidate(QualityModel::new(Quality::SDTV), Utc::now()), existing);
        assert_eq!(
            rule.evaluate(&c, None).rejection().map(|r| r.kind),
            Some(RejectionKind::CutoffMet)
        );

        let proper = with_file(
            candidate(
                QualityModel::with_revision(Quality::HDTV_1080P, Revision::new(2, 0)),
                Utc::now(),
            ),
            existing,
        );
        assert!(rule.evaluate(&proper, None).is_accepted());
    }

    #[test]
    fn upgrade_not_allowed_by_profile() {
        let rule = UpgradeAllowedSpecification::new(UpgradePolicy::default());
        let mut c = with_file(
            candidate(QualityModel::new(Quality::HDTV_1080P), Utc::now()),
            QualityModel::new(Quality::SDTV),
        );
        assert!(rule.evaluate(&c, None).is_accepted());

        c.profile = Arc::new((*c.profile).clone().with_upgrades(false));
        assert_eq!(
            rule.evaluate(&c, None).rejection().map(|r| r.kind),
            Some(RejectionKind::UpgradeNotAllowed)
        );
    }

    #[test]
    fn blocklisted_release_is_rejected() {
        let blocklist = Arc::new(BlocklistService::new());
        let rule = BlocklistSpecification::new(blocklist.clone());
        let c = candidate(QualityModel::new(Quality::HDTV_720P), Utc::now());
        assert!(rule.evaluate(&c, None).is_accepted());

        blocklist.block_release(c.media.id, &c.release, *c.quality(), "manual", Utc::now());
        assert_eq!(
            rule.evaluate(&c, None).rejection().map(|r| r.kind),
            Some(RejectionKind::Blocklisted)
        );
    }

    #[test]
    fn prior_grab_with_other_quality_is_rejected() {
        let history = Arc::new(HistoryLog::new());
        let rule = AlreadyGrabbedDifferentQualitySpecification::new(history.clone());
        let mut c = candidate(QualityModel::new(Quality::HDTV_1080P), Utc::now());

        assert!(rule.evaluate(&c, None).is_accepted());

        c.download_id = Some("HASH1".into());
        assert!(rule.evaluate(&c, None).is_accepted());

        history.append(
            HistoryRecord::new(
                c.media.id,
                HistoryEventType::Grabbed,
                QualityModel::new(Quality::HDTV_720P),
                Utc::now(),
            )
            .with_download_id("HASH1"),
        );
        assert_eq!(
            rule.evaluate(&c, None).rejection().map(|r| r.kind),
            Some(RejectionKind::QualityMismatch)
        );

        c.parsed.quality = QualityModel::new(Quality::HDTV_720P);
        assert!(rule.evaluate(&c, None).is_accepted());
    }

    struct BrokenHistory;

    impl HistoryService for BrokenHistory {
        fn find_by_download_id(
            &self,
            _download_id: &str,
        ) -> Result<Vec<HistoryRecord>, CollaboratorError> {
            Err(CollaboratorError::History("offline".into()))
        }

        fn get_by_media_id(&self, _media_id: MediaId) -> Result<Vec<HistoryRecord>, CollaboratorError> {
            Err(CollaboratorError::History("offline".into()))
        }
    }

    #[test]
    fn history_failure_surfaces_as_distinct_rejection() {
        let rule = AlreadyGrabbedDifferentQualitySpecification::new(Arc::new(BrokenHistory));
        let mut c = candidate(QualityModel::new(Quality::HDTV_720P), Utc::now());
        c.download_id = Some("HASH".into());
        assert_eq!(
            rule.evaluate(&c, None).rejection().map(|r| r.kind),
            Some(RejectionKind::CollaboratorUnavailable)
        );
    }

    fn proper(quality: Quality) -> QualityModel {
        QualityModel::with_revision(quality, Revision::new(2, 0))
    }

    fn with_grouped_file(
        candidate: RemoteCandidate,
        quality: QualityModel,
        group: Option<&str>,
    ) -> RemoteCandidate {
        let mut candidate = with_file(candidate, quality);
        if let Some(file) = candidate.media.media_file.as_mut() {
            file.release_group = group.map(str::to_string);
        }
        candidate
    }

    #[test]
    fn repack_needs_a_same_tier_file_to_matter() {
        let rule = RepackSpecification::new(UpgradePolicy::default());
        let plain = with_grouped_file(
            candidate(QualityModel::new(Quality::HDTV_720P), Utc::now()),
            QualityModel::new(Quality::HDTV_720P),
            Some("OTHER"),
        );
        assert!(rule.evaluate(&plain, None).is_accepted());

        let no_file = candidate(proper(Quality::HDTV_720P), Utc::now());
        assert!(rule.evaluate(&no_file, None).is_accepted());

        let other_tier = with_grouped_file(
            candidate(proper(Quality::HDTV_1080P), Utc::now()),
            QualityModel::new(Quality::HDTV_720P),
            Some("OTHER"),
        );
        assert!(rule.evaluate(&other_tier, None).is_accepted());
    }

    #[test]
    fn repack_must_come_from_the_file_release_group() {
        let rule = RepackSpecification::new(UpgradePolicy::default());
        let existing = QualityModel::new(Quality::HDTV_720P);

        let same = with_grouped_file(candidate(proper(Quality::HDTV_720P), Utc::now()), existing, Some("grp"));
        assert!(rule.evaluate(&same, None).is_accepted());

        let different = with_grouped_file(
            candidate(proper(Quality::HDTV_720P), Utc::now()),
            existing,
            Some("NotGRP"),
        );
        assert_eq!(
            different.media.media_file.as_ref().and_then(|f| f.release_group.as_deref()),
            Some("NotGRP")
        );
        assert_eq!(
            rule.evaluate(&different, None).rejection().map(|r| r.kind),
            Some(RejectionKind::ReleaseGroupMismatch)
        );
    }

    #[test]
    fn repack_with_unknown_group_is_rejected() {
        let rule = RepackSpecification::new(UpgradePolicy::default());
        let existing = QualityModel::new(Quality::HDTV_720P);

        let unknown_file = with_grouped_file(candidate(proper(Quality::HDTV_720P), Utc::now()), existing, None);
        let decision = rule.evaluate(&unknown_file, None);
        assert_eq!(decision.rejection().map(|r| r.kind), Some(RejectionKind::ReleaseGroupMismatch));
        assert!(decision
            .rejection()
            .is_some_and(|r| r.message.contains("existing file")));

        let mut unknown_release =
            with_grouped_file(candidate(proper(Quality::HDTV_720P), Utc::now()), existing, Some("GRP"));
        unknown_release.parsed.release_group = None;
        let decision = rule.evaluate(&unknown_release, None);
        assert_eq!(decision.rejection().map(|r| r.kind), Some(RejectionKind::ReleaseGroupMismatch));
        assert!(decision
            .rejection()
            .is_some_and(|r| r.message.contains("this release")));
    }

    #[test]
    fn repack_is_rejected_when_propers_are_disabled() {
        let rule = RepackSpecification::new(UpgradePolicy::new(false));
        let c = with_grouped_file(
            candidate(proper(Quality::HDTV_720P), Utc::now()),
            QualityModel::new(Quality::HDTV_720P),
            Some("GRP"),
        );
        assert_eq!(
            rule.evaluate(&c, None).rejection().map(|r| r.kind),
            Some(RejectionKind::UpgradeNotAllowed)
        );
    }

    struct StaticQueue(Vec<(MediaId, QueuedRelease)>);

    impl QueuedReleases for StaticQueue {
        fn queued_for(&self, media_id: MediaId) -> Vec<QueuedRelease> {
            self.0
                .iter()
                .filter(|(id, _)| *id == media_id)
                .map(|(_, queued)| queued.clone())
                .collect()
        }
    }

    fn queued(media_id: MediaId, quality: QualityModel, failed: bool) -> (MediaId, QueuedRelease) {
        (
            media_id,
            QueuedRelease {
                title: "Movie.Title.2020.queued-GRP".into(),
                quality,
                failed,
            },
        )
    }

    fn queue_rule(entries: Vec<(MediaId, QueuedRelease)>, policy: UpgradePolicy) -> QueueSpecification {
        QueueSpecification::new(Arc::new(StaticQueue(entries)), policy)
    }

    fn queue_kind(rule: &QueueSpecification, c: &RemoteCandidate) -> Option<RejectionKind> {
        rule.evaluate(c, None).rejection().map(|r| r.kind)
    }

    #[test]
    fn empty_or_unrelated_queue_is_accepted() {
        let c = candidate(QualityModel::new(Quality::HDTV_720P), Utc::now());
        assert!(queue_rule(vec![], UpgradePolicy::default()).evaluate(&c, None).is_accepted());

        let other = queue_rule(
            vec![queued(MediaId::new(), QualityModel::new(Quality::HDTV_1080P), false)],
            UpgradePolicy::default(),
        );
        assert!(other.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn lower_queued_quality_is_accepted() {
        let c = candidate(QualityModel::new(Quality::HDTV_720P), Utc::now());
        let rule = queue_rule(
            vec![queued(c.media.id, QualityModel::new(Quality::SDTV), false)],
            UpgradePolicy::default(),
        );
        assert!(rule.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn same_or_better_queued_quality_is_rejected() {
        let c = candidate(QualityModel::new(Quality::HDTV_720P), Utc::now());
        let same = queue_rule(
            vec![queued(c.media.id, QualityModel::new(Quality::HDTV_720P), false)],
            UpgradePolicy::default(),
        );
        assert_eq!(queue_kind(&same, &c), Some(RejectionKind::AlreadyQueued));

        let sd = candidate(QualityModel::new(Quality::SDTV), Utc::now());
        let better = queue_rule(
            vec![queued(sd.media.id, QualityModel::new(Quality::HDTV_720P), false)],
            UpgradePolicy::default(),
        );
        assert_eq!(queue_kind(&better, &sd), Some(RejectionKind::AlreadyQueued));
    }

    #[test]
    fn queued_release_meeting_cutoff_blocks_upgrades() {
        let mut c = candidate(QualityModel::new(Quality::HDTV_1080P), Utc::now());
        c.profile = Arc::new(
            Profile::new(
                ProfileId(1),
                "HD",
                vec![
                    ProfileQualityItem::allowed(Quality::SDTV),
                    ProfileQualityItem::allowed(Quality::HDTV_720P),
                    ProfileQualityItem::allowed(Quality::HDTV_1080P),
                ],
                Quality::HDTV_720P,
            )
            .expect("valid profile"),
        );
        let rule = queue_rule(
            vec![queued(c.media.id, QualityModel::new(Quality::HDTV_720P), false)],
            UpgradePolicy::default(),
        );
        let decision = rule.evaluate(&c, None);
        assert_eq!(decision.rejection().map(|r| r.kind), Some(RejectionKind::AlreadyQueued));
        assert!(decision.rejection().is_some_and(|r| r.message.contains("cutoff")));
    }

    #[test]
    fn queued_release_blocks_when_upgrades_are_disabled() {
        let mut c = candidate(QualityModel::new(Quality::HDTV_720P), Utc::now());
        c.profile = Arc::new((*c.profile).clone().with_upgrades(false));
        let rule = queue_rule(
            vec![queued(c.media.id, QualityModel::new(Quality::SDTV), false)],
            UpgradePolicy::default(),
        );
        assert_eq!(queue_kind(&rule, &c), Some(RejectionKind::UpgradeNotAllowed));
    }

    #[test]
    fn failed_download_does_not_block() {
        let c = candidate(QualityModel::new(Quality::HDTV_720P), Utc::now());
        let rule = queue_rule(
            vec![queued(c.media.id, QualityModel::new(Quality::HDTV_720P), true)],
            UpgradePolicy::default(),
        );
        assert!(rule.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn proper_over_queued_release_follows_the_propers_setting() {
        let c = candidate(proper(Quality::HDTV_720P), Utc::now());
        let entries = vec![queued(c.media.id, QualityModel::new(Quality::HDTV_720P), false)];

        assert!(queue_rule(entries.clone(), UpgradePolicy::default())
            .evaluate(&c, None)
            .is_accepted());
        assert_eq!(
            queue_kind(&queue_rule(entries, UpgradePolicy::new(false)), &c),
            Some(RejectionKind::UpgradeNotAllowed)
        );
    }
}
