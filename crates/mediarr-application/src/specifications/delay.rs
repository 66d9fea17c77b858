// SPDX-License-Identifier: GPL-3.0-or-later
//! Time gate applied to automatic grabs.
//!
//! A release is held back until it is older than the delay configured for
//! its protocol, giving better releases a chance to appear. The gate is
//! skipped for user searches, zero delays, releases at the top of the
//! profile, and proper/real replacements of a file already on disk.

use std::sync::Arc;

use chrono::Duration;
use mediarr_domain::{Clock, Decision, RejectionKind, RemoteCandidate, SearchContext};
use tracing::debug;

use super::{Priority, Rule};
use crate::profiles::ProfileStore;
use crate::upgrade::UpgradePolicy;

pub struct DelaySpecification {
    profiles: Arc<dyn ProfileStore>,
    policy: UpgradePolicy,
    clock: Arc<dyn Clock>,
}

impl DelaySpecification {
    pub fn new(profiles: Arc<dyn ProfileStore>, policy: UpgradePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            profiles,
            policy,
            clock,
        }
    }

    /// Minutes `candidate` must wait, or 0 when it may be grabbed now.
    pub fn delay_minutes(&self, candidate: &RemoteCandidate) -> u32 {
        self.profiles
            .delay_profile_for_tags(&candidate.media.tags)
            .delay_for(candidate.release.protocol)
    }
}

impl Rule<RemoteCandidate> for DelaySpecification {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn priority(&self) -> Priority {
        Priority::Database
    }

    fn evaluate(&self, candidate: &RemoteCandidate, context: Option<&SearchContext>) -> Decision {
        if context.is_some_and(SearchContext::is_user_invoked) {
            debug!(target: "decision", release = %candidate.release.title, "user search, skipping delay");
            return Decision::accept();
        }

        let delay = self.delay_minutes(candidate);
        if delay == 0 {
            return Decision::accept();
        }

        let quality = candidate.quality();
        if candidate.profile.last_allowed_quality() == Some(quality.quality) {
            debug!(target: "decision", %quality, "highest quality in profile, skipping delay");
            return Decision::accept();
        }

        if let Some(file) = &candidate.media.media_file {
            if self.policy.is_revision_upgrade(&file.quality, quality)
                && self
                    .policy
                    .is_upgrade_allowed(&candidate.profile, &file.quality, quality)
            {
                debug!(
                    target: "decision",
                    existing = %file.quality,
                    %quality,
                    "revision upgrade of existing file, skipping delay"
                );
                return Decision::accept();
            }
        }

        let age = candidate.release.age(self.clock.now());
        if age >= Duration::minutes(i64::from(delay)) {
            return Decision::accept();
        }

        Decision::reject_temporarily(
            RejectionKind::DelayWindow,
            format!(
                "Release is still within the configured delay window ({} of {delay} minutes)",
                age.num_minutes().max(0)
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::InMemoryProfileStore;
    use crate::specifications::grab::test_support::{candidate, sd_hd_profile, tags, with_file};
    use chrono::Utc;
    use mediarr_domain::{
        DelayProfile, DownloadProtocol, ManualClock, Quality, QualityModel, Revision,
    };

    fn delay_rule(delay_minutes: u32, clock: Arc<ManualClock>) -> DelaySpecification {
        let store = InMemoryProfileStore::new(
            vec![(*sd_hd_profile()).clone()],
            vec![DelayProfile::global(delay_minutes, delay_minutes)],
        )
        .expect("valid store");
        DelaySpecification::new(Arc::new(store), UpgradePolicy::default(), clock)
    }

    #[test]
    fn user_search_always_passes() {
        let now = Utc::now();
        let rule = delay_rule(720, Arc::new(ManualClock::new(now)));
        let c = candidate(QualityModel::new(Quality::SDTV), now);
        assert!(rule
            .evaluate(&c, Some(&SearchContext::UserInvoked))
            .is_accepted());
        assert!(!rule.evaluate(&c, Some(&SearchContext::Rss)).is_accepted());
    }

    #[test]
    fn zero_delay_passes() {
        let now = Utc::now();
        let rule = delay_rule(0, Arc::new(ManualClock::new(now)));
        let c = candidate(QualityModel::new(Quality::SDTV), now + Duration::hours(1));
        assert!(rule.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn age_boundary() {
        let now = Utc::now();
        let rule = delay_rule(720, Arc::new(ManualClock::new(now)));

        let young = candidate(QualityModel::new(Quality::HDTV_720P), now - Duration::hours(10));
        let decision = rule.evaluate(&young, None);
        assert_eq!(
            decision.rejection().map(|r| r.kind),
            Some(RejectionKind::DelayWindow)
        );
        assert!(decision.is_temporarily_rejected());

        let old = candidate(QualityModel::new(Quality::HDTV_720P), now - Duration::hours(13));
        assert!(rule.evaluate(&old, None).is_accepted());

        let exact = candidate(QualityModel::new(Quality::HDTV_720P), now - Duration::hours(12));
        assert!(rule.evaluate(&exact, None).is_accepted());
    }

    #[test]
    fn advancing_the_clock_releases_the_hold() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let rule = delay_rule(60, clock.clone());
        let c = candidate(QualityModel::new(Quality::SDTV), now);
        assert!(!rule.evaluate(&c, None).is_accepted());

        clock.advance(Duration::minutes(61));
        assert!(rule.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn best_quality_in_profile_skips_delay() {
        let now = Utc::now();
        let rule = delay_rule(720, Arc::new(ManualClock::new(now)));
        let c = candidate(QualityModel::new(Quality::HDTV_1080P), now);
        assert!(rule.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn proper_for_existing_file_bypasses_delay() {
        let now = Utc::now();
        let rule = delay_rule(720, Arc::new(ManualClock::new(now)));
        let c = with_file(
            candidate(
                QualityModel::with_revision(Quality::HDTV_720P, Revision::new(2, 0)),
                now,
            ),
            QualityModel::new(Quality::HDTV_720P),
        );
        assert!(rule.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn proper_waits_when_propers_are_disabled() {
        let now = Utc::now();
        let store = InMemoryProfileStore::new(
            vec![(*sd_hd_profile()).clone()],
            vec![DelayProfile::global(720, 720)],
        )
        .expect("valid store");
        let rule = DelaySpecification::new(
            Arc::new(store),
            UpgradePolicy::new(false),
            Arc::new(ManualClock::new(now)),
        );
        let c = with_file(
            candidate(
                QualityModel::with_revision(Quality::HDTV_720P, Revision::new(2, 0)),
                now,
            ),
            QualityModel::new(Quality::HDTV_720P),
        );
        assert!(!rule.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn tagged_profile_overrides_global() {
        let now = Utc::now();
        let tagged = DelayProfile {
            id: 2,
            order: 1,
            preferred_protocol: DownloadProtocol::Usenet,
            usenet_delay_minutes: 0,
            torrent_delay_minutes: 0,
            tags: tags(&[7]),
        };
        let store = InMemoryProfileStore::new(
            vec![(*sd_hd_profile()).clone()],
            vec![DelayProfile::global(720, 720), tagged],
        )
        .expect("valid store");
        let rule = DelaySpecification::new(
            Arc::new(store),
            UpgradePolicy::default(),
            Arc::new(ManualClock::new(now)),
        );

        let mut c = candidate(QualityModel::new(Quality::SDTV), now);
        assert!(!rule.evaluate(&c, None).is_accepted());
        c.media.tags = tags(&[7]);
        assert!(rule.evaluate(&c, None).is_accepted());
    }
}
