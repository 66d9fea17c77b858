// SPDX-License-Identifier: GPL-3.0-or-later
//! Rules evaluated against a file on disk before it is moved into the library.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Duration;
use mediarr_config::DecisionConfig;
use mediarr_domain::{
    Clock, Decision, HistoryEventType, LocalCandidate, RejectionKind, SearchContext,
};
use tracing::debug;

use super::{collaborator_unavailable, Priority, Rule};
use crate::disk::{DiskProvider, SampleDetector, SampleResult};
use crate::history::HistoryService;

/// Files still inside a download client's scratch folder are mid-extraction.
pub struct NotUnpackingSpecification {
    disk: Arc<dyn DiskProvider>,
    clock: Arc<dyn Clock>,
    working_folders: Vec<String>,
    grace_minutes: u32,
}

impl NotUnpackingSpecification {
    pub fn new(disk: Arc<dyn DiskProvider>, clock: Arc<dyn Clock>, config: &DecisionConfig) -> Self {
        Self {
            disk,
            clock,
            working_folders: config.download_client_working_folders.clone(),
            grace_minutes: config.unpacking_grace_minutes,
        }
    }

    fn working_folder_of<'a>(&'a self, candidate: &LocalCandidate) -> Option<&'a str> {
        candidate
            .path
            .ancestors()
            .skip(1)
            .filter_map(|dir| dir.file_name().and_then(|name| name.to_str()))
            .find_map(|name| {
                self.working_folders
                    .iter()
                    .find(|prefix| name.starts_with(prefix.as_str()))
                    .map(String::as_str)
            })
    }
}

impl Rule<LocalCandidate> for NotUnpackingSpecification {
    fn name(&self) -> &'static str {
        "not-unpacking"
    }

    fn priority(&self) -> Priority {
        Priority::Disk
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        if candidate.existing_file {
            return Decision::accept();
        }
        let Some(folder) = self.working_folder_of(candidate) else {
            return Decision::accept();
        };

        if self.disk.is_case_insensitive() {
            let last_write = match self.disk.last_write_time(&candidate.path) {
                Ok(last_write) => last_write,
                Err(err) => return collaborator_unavailable(self.name(), &err),
            };
            if self.clock.now() - last_write > Duration::minutes(i64::from(self.grace_minutes)) {
                debug!(
                    target: "import",
                    path = %candidate.path.display(),
                    "working folder untouched past grace period, treating as unpacked"
                );
                return Decision::accept();
            }
        }

        Decision::reject_temporarily(
            RejectionKind::Unpacking,
            format!("File is still being unpacked ({folder})"),
        )
    }
}

pub struct NotSampleSpecification {
    detector: Arc<dyn SampleDetector>,
}

impl NotSampleSpecification {
    pub fn new(detector: Arc<dyn SampleDetector>) -> Self {
        Self { detector }
    }
}

impl Rule<LocalCandidate> for NotSampleSpecification {
    fn name(&self) -> &'static str {
        "not-sample"
    }

    fn priority(&self) -> Priority {
        Priority::Disk
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        if candidate.existing_file {
            return Decision::accept();
        }
        match self.detector.is_sample(&candidate.media, &candidate.path) {
            Ok(SampleResult::NotSample) => Decision::accept(),
            Ok(SampleResult::Sample) => Decision::reject(RejectionKind::Sample, "Sample"),
            Ok(SampleResult::Indeterminate) => Decision::reject(
                RejectionKind::SampleIndeterminate,
                "Unable to determine if file is a sample",
            ),
            Err(err) => {
                debug!(target: "import", %err, "sample detection failed");
                Decision::reject(
                    RejectionKind::SampleIndeterminate,
                    format!("Unable to determine if file is a sample: {err}"),
                )
            }
        }
    }
}

pub struct SameFileSpecification;

impl Rule<LocalCandidate> for SameFileSpecification {
    fn name(&self) -> &'static str {
        "same-file"
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        if candidate.existing_file {
            return Decision::accept();
        }
        match &candidate.media.media_file {
            Some(file) if file.size == candidate.size => Decision::reject(
                RejectionKind::SameFile,
                format!("Same file already present: {}", file.path.display()),
            ),
            _ => Decision::accept(),
        }
    }
}

/// Accepts when media info is missing, since the stream count is unknown.
pub struct HasAudioTrackSpecification;

impl Rule<LocalCandidate> for HasAudioTrackSpecification {
    fn name(&self) -> &'static str {
        "has-audio-track"
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        match &candidate.media_info {
            Some(info) if info.audio_stream_count == 0 => {
                Decision::reject(RejectionKind::NoAudio, "No audio tracks detected")
            }
            _ => Decision::accept(),
        }
    }
}

pub struct UpgradeVsExistingSpecification;

impl Rule<LocalCandidate> for UpgradeVsExistingSpecification {
    fn name(&self) -> &'static str {
        "upgrade-vs-existing"
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        let Some(file) = &candidate.media.media_file else {
            return Decision::accept();
        };
        if candidate
            .profile
            .comparer()
            .compare(&file.quality, &candidate.quality)
            == Ordering::Greater
        {
            return Decision::reject(
                RejectionKind::NotUpgrade,
                format!("Not an upgrade for existing file: {}", file.quality),
            );
        }
        Decision::accept()
    }
}

pub struct MatchesGrabSpecification;

impl Rule<LocalCandidate> for MatchesGrabSpecification {
    fn name(&self) -> &'static str {
        "matches-grab"
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        if candidate.existing_file {
            return Decision::accept();
        }
        let Some(release) = &candidate.source_release else {
            return Decision::accept();
        };
        if release.media_ids.is_empty() || release.media_ids.contains(&candidate.media.id) {
            return Decision::accept();
        }
        Decision::reject(
            RejectionKind::MediaNotFoundInRelease,
            format!("Unexpected media in file: {}", candidate.media.title),
        )
    }
}

pub struct AlreadyImportedSpecification {
    history: Arc<dyn HistoryService>,
    enabled: bool,
}

impl AlreadyImportedSpecification {
    pub fn new(history: Arc<dyn HistoryService>, config: &DecisionConfig) -> Self {
        Self {
            history,
            enabled: config.enable_completed_download_handling,
        }
    }
}

impl Rule<LocalCandidate> for AlreadyImportedSpecification {
    fn name(&self) -> &'static str {
        "already-imported"
    }

    fn priority(&self) -> Priority {
        Priority::Database
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        if !self.enabled || !candidate.media.has_file() {
            return Decision::accept();
        }

        let media_id = candidate.media.id;
        let imported = match self
            .history
            .latest_of_type(media_id, HistoryEventType::DownloadFolderImported)
        {
            Ok(record) => record,
            Err(err) => return collaborator_unavailable(self.name(), &err),
        };
        let Some(imported) = imported else {
            return Decision::accept();
        };
        let grabbed = match self.history.latest_of_type(media_id, HistoryEventType::Grabbed) {
            Ok(record) => record,
            Err(err) => return collaborator_unavailable(self.name(), &err),
        };

        if grabbed.is_some_and(|grab| grab.date > imported.date) {
            debug!(target: "import", %media_id, "media re-grabbed since last import");
            return Decision::accept();
        }

        let same_download = match (&imported.download_id, &candidate.download_id) {
            (Some(previous), Some(current)) => previous.eq_ignore_ascii_case(current),
            _ => false,
        };
        if same_download {
            return Decision::reject(
                RejectionKind::AlreadyImported,
                "Already imported from this download",
            );
        }
        Decision::accept()
    }
}

pub struct DifferentQualitySpecification {
    history: Arc<dyn HistoryService>,
}

impl DifferentQualitySpecification {
    pub fn new(history: Arc<dyn HistoryService>) -> Self {
        Self { history }
    }
}

impl Rule<LocalCandidate> for DifferentQualitySpecification {
    fn name(&self) -> &'static str {
        "different-quality"
    }

    fn priority(&self) -> Priority {
        Priority::Database
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        let Some(download_id) = candidate.download_id.as_deref() else {
            return Decision::accept();
        };
        let grabbed = match self
            .history
            .latest_for_download(download_id, HistoryEventType::Grabbed)
        {
            Ok(Some(record)) => record,
            Ok(None) => return Decision::accept(),
            Err(err) => return collaborator_unavailable(self.name(), &err),
        };
        if candidate
            .profile
            .comparer()
            .compare(&grabbed.quality, &candidate.quality)
            != Ordering::Equal
        {
            return Decision::reject(
                RejectionKind::QualityMismatch,
                "Not an upgrade for existing file(s), quality mismatch",
            );
        }
        Decision::accept()
    }
}

/// Exact match against every grab of this download with a known quality.
pub struct GrabbedReleaseQualitySpecification {
    history: Arc<dyn HistoryService>,
}

impl GrabbedReleaseQualitySpecification {
    pub fn new(history: Arc<dyn HistoryService>) -> Self {
        Self { history }
    }
}

impl Rule<LocalCandidate> for GrabbedReleaseQualitySpecification {
    fn name(&self) -> &'static str {
        "grabbed-release-quality"
    }

    fn priority(&self) -> Priority {
        Priority::Database
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        let Some(download_id) = candidate.download_id.as_deref() else {
            return Decision::accept();
        };
        let records = match self.history.find_by_download_id(download_id) {
            Ok(records) => records,
            Err(err) => return collaborator_unavailable(self.name(), &err),
        };
        let mismatch = records
            .iter()
            .filter(|record| record.event_type == HistoryEventType::Grabbed)
            .filter(|record| !record.quality.quality.is_unknown())
            .find(|record| record.quality != candidate.quality);
        match mismatch {
            Some(record) => Decision::reject(
                RejectionKind::QualityMismatch,
                format!(
                    "File quality {} does not match grabbed release quality {}",
                    candidate.quality, record.quality
                ),
            ),
            None => Decision::accept(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use mediarr_domain::{LocalCandidate, Media, QualityModel};

    use crate::specifications::grab::test_support::sd_hd_profile;

    pub fn local(path: &str, quality: QualityModel) -> LocalCandidate {
        let profile = sd_hd_profile();
        LocalCandidate {
            path: PathBuf::from(path),
            size: 2_000,
            quality,
            languages: vec![],
            media_info: None,
            existing_file: false,
            parsed: None,
            source_release: None,
            download_id: Some("DL-1".into()),
            media: Media::new("Movie Title", "/library/Movie Title (2020)", profile.id),
            profile,
        }
    }
}
