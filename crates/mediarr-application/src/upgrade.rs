// SPDX-License-Identifier: GPL-3.0-or-later
use std::cmp::Ordering;

use mediarr_config::DecisionConfig;
use mediarr_domain::{Profile, QualityModel};

/// Upgrade rules shared by the grab-time and import-time rule sets.
#[derive(Debug, Clone, Copy)]
pub struct UpgradePolicy {
    download_propers_and_repacks: bool,
}

impl UpgradePolicy {
    pub fn new(download_propers_and_repacks: bool) -> Self {
        Self {
            download_propers_and_repacks,
        }
    }

    pub fn from_config(config: &DecisionConfig) -> Self {
        Self::new(config.download_propers_and_repacks)
    }

    pub fn download_propers_and_repacks(&self) -> bool {
        self.download_propers_and_repacks
    }

    /// `candidate` ranks strictly above `existing` under `profile`.
    pub fn is_upgrade(&self, profile: &Profile, existing: &QualityModel, candidate: &QualityModel) -> bool {
        profile.comparer().compare(candidate, existing) == Ordering::Greater
    }

    /// Same tier, higher revision. Profile position is irrelevant.
    pub fn is_revision_upgrade(&self, existing: &QualityModel, candidate: &QualityModel) -> bool {
        existing.quality == candidate.quality && candidate.revision > existing.revision
    }

    /// Whether replacing `existing` with `candidate` is permitted at all.
    pub fn is_upgrade_allowed(
        &self,
        profile: &Profile,
        existing: &QualityModel,
        candidate: &QualityModel,
    ) -> bool {
        if self.is_revision_upgrade(existing, candidate) {
            return self.download_propers_and_repacks;
        }
        let quality_upgrade = profile
            .comparer()
            .compare_quality(candidate.quality, existing.quality)
            == Ordering::Greater;
        !quality_upgrade || profile.upgrade_allowed
    }

    /// `candidate` would replace a file that already satisfies the cutoff.
    pub fn cutoff_blocks(&self, profile: &Profile, existing: &QualityModel, candidate: &QualityModel) -> bool {
        profile.cutoff_met(existing.quality) && !self.is_revision_upgrade(existing, candidate)
    }
}

impl Default for UpgradePolicy {
    fn default() -> Self {
        Self::new(true)
    }
}
