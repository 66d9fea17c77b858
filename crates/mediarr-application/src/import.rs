// SPDX-License-Identifier: GPL-3.0-or-later
//! Import pipeline for files a download client has finished writing.
//!
//! Each path is turned into a [`LocalCandidate`], run through the import-time
//! rule set and, when approved, handed to a [`MediaFileOrganizer`]. Two
//! attempts on the same path never overlap: evaluation and the hand-off both
//! happen while the path's advisory lock is held, so the history-based rules
//! see a stable view.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use mediarr_config::DecisionConfig;
use mediarr_domain::{
    Clock, ConfigurationError, Decision, DomainEvent, HistoryEventType, HistoryRecord,
    LocalCandidate, Media, MediaFile, MediaFileImportedPayload, Profile, QualityModel,
    RejectionKind, ReleaseInfo,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::disk::{DiskProvider, MediaInfoProbe, SampleDetector};
use crate::error::CollaboratorError;
use crate::events::{EventPublisher, InMemoryEventBus};
use crate::history::{HistoryLog, HistoryService};
use crate::parsing::{parse_path, parse_release_title};
use crate::profiles::ProfileStore;
use crate::specifications::import::{
    AlreadyImportedSpecification, DifferentQualitySpecification, GrabbedReleaseQualitySpecification,
    HasAudioTrackSpecification, MatchesGrabSpecification, NotSampleSpecification,
    NotUnpackingSpecification, SameFileSpecification, UpgradeVsExistingSpecification,
};
use crate::specifications::multipart::{NotMultiDiscSpecification, NotMultiPartSpecification};
use crate::specifications::{collaborator_unavailable, DecisionEngine, RuleOutcome};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("organizer failed for {path}: {source}")]
    Organizer {
        path: PathBuf,
        #[source]
        source: CollaboratorError,
    },
}

/// Moves an approved file into the library.
pub trait MediaFileOrganizer: Send + Sync {
    fn import_file(&self, candidate: &LocalCandidate) -> Result<MediaFile, CollaboratorError>;
}

/// What to import and where it came from.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub media: Media,
    pub download_id: Option<String>,
    pub source_release: Option<ReleaseInfo>,
}

impl ImportRequest {
    pub fn new(media: Media) -> Self {
        Self {
            media,
            download_id: None,
            source_release: None,
        }
    }

    pub fn with_download_id(mut self, download_id: impl Into<String>) -> Self {
        self.download_id = Some(download_id.into());
        self
    }

    pub fn with_source_release(mut self, release: ReleaseInfo) -> Self {
        self.source_release = Some(release);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ImportDecision {
    pub candidate: LocalCandidate,
    pub decision: Decision,
}

impl ImportDecision {
    pub fn is_accepted(&self) -> bool {
        self.decision.is_accepted()
    }
}

// ============================================================================
// Path locks
// ============================================================================

#[derive(Default)]
pub struct PathLocks {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

/// Releases its path when dropped.
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: PathBuf,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.held.lock().unwrap_or_else(|poisoned| {
            warn!(target: "import", "path lock table poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Blocks until no other guard holds `path`.
    pub fn lock(&self, path: &Path) -> PathGuard<'_> {
        let mut held = self.held();
        while held.contains(path) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(path.to_path_buf());
        PathGuard {
            locks: self,
            path: path.to_path_buf(),
        }
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.held().contains(path)
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.path);
        self.locks.released.notify_all();
    }
}

// ============================================================================
// Decision maker
// ============================================================================

pub struct ImportDecisionMaker {
    engine: DecisionEngine<LocalCandidate>,
    disk: Arc<dyn DiskProvider>,
    probe: Arc<dyn MediaInfoProbe>,
    profiles: Arc<dyn ProfileStore>,
    locks: PathLocks,
}

impl ImportDecisionMaker {
    pub fn new(
        engine: DecisionEngine<LocalCandidate>,
        disk: Arc<dyn DiskProvider>,
        probe: Arc<dyn MediaInfoProbe>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            engine,
            disk,
            probe,
            profiles,
            locks: PathLocks::new(),
        }
    }

    /// The full import-time rule set.
    pub fn standard(
        disk: Arc<dyn DiskProvider>,
        probe: Arc<dyn MediaInfoProbe>,
        samples: Arc<dyn SampleDetector>,
        history: Arc<dyn HistoryService>,
        profiles: Arc<dyn ProfileStore>,
        config: &DecisionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = DecisionEngine::new(vec![
            Box::new(SameFileSpecification),
            Box::new(HasAudioTrackSpecification),
            Box::new(UpgradeVsExistingSpecification),
            Box::new(MatchesGrabSpecification),
            Box::new(NotMultiDiscSpecification),
            Box::new(AlreadyImportedSpecification::new(history.clone(), config)),
            Box::new(DifferentQualitySpecification::new(history.clone())),
            Box::new(GrabbedReleaseQualitySpecification::new(history)),
            Box::new(NotUnpackingSpecification::new(disk.clone(), clock, config)),
            Box::new(NotSampleSpecification::new(samples)),
            Box::new(NotMultiPartSpecification::new(disk.clone())),
        ]);
        Self::new(engine, disk, probe, profiles)
    }

    pub fn engine(&self) -> &DecisionEngine<LocalCandidate> {
        &self.engine
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Evaluates each path under its advisory lock.
    pub fn evaluate(
        &self,
        request: &ImportRequest,
        paths: &[PathBuf],
    ) -> Result<Vec<ImportDecision>, ImportError> {
        let profile = self.profiles.profile(request.media.profile_id)?;
        Ok(paths
            .iter()
            .map(|path| {
                let _guard = self.locks.lock(path);
                self.decide(request, &profile, path)
            })
            .collect())
    }

    /// Same as [`evaluate`](Self::evaluate) for callers already holding the locks.
    pub(crate) fn evaluate_locked(
        &self,
        request: &ImportRequest,
        paths: &[PathBuf],
    ) -> Result<Vec<ImportDecision>, ImportError> {
        let profile = self.profiles.profile(request.media.profile_id)?;
        Ok(paths
            .iter()
            .map(|path| self.decide(request, &profile, path))
            .collect())
    }

    pub fn explain(&self, candidate: &LocalCandidate) -> Vec<RuleOutcome> {
        self.engine.explain(candidate, None)
    }

    fn decide(
        &self,
        request: &ImportRequest,
        profile: &Arc<Profile>,
        path: &Path,
    ) -> ImportDecision {
        let mut candidate = LocalCandidate {
            path: path.to_path_buf(),
            size: 0,
            quality: QualityModel::unknown(),
            languages: Vec::new(),
            media_info: None,
            existing_file: path.starts_with(&request.media.path),
            parsed: None,
            source_release: request.source_release.clone(),
            download_id: request.download_id.clone(),
            media: request.media.clone(),
            profile: profile.clone(),
        };

        let Some(parsed) = parse_path(path) else {
            debug!(target: "import", path = %path.display(), "unable to parse file name");
            let decision = Decision::reject(
                RejectionKind::Unparseable,
                format!("Unable to parse file: {}", path.display()),
            );
            return ImportDecision { candidate, decision };
        };
        candidate.quality = parsed.quality;
        candidate.languages = parsed.languages.clone();
        candidate.parsed = Some(parsed);

        candidate.size = match self.disk.file_size(path) {
            Ok(size) => size,
            Err(err) => {
                let decision = collaborator_unavailable("file-size", &err);
                return ImportDecision { candidate, decision };
            }
        };
        candidate.media_info = match self.probe.probe(path) {
            Ok(info) => info,
            Err(err) => {
                warn!(target: "import", path = %path.display(), %err, "media info probe failed");
                None
            }
        };

        let decision = self.engine.decide(&candidate, None);
        match decision.rejection() {
            None => debug!(target: "import", path = %path.display(), "file approved for import"),
            Some(rejection) => debug!(
                target: "import",
                path = %path.display(),
                reason = %rejection,
                "file rejected for import"
            ),
        }
        ImportDecision { candidate, decision }
    }
}

// ============================================================================
// Import service
// ============================================================================

#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<MediaFile>,
    pub rejected: Vec<ImportDecision>,
    /// Approved but superseded by a better file from the same request.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<ImportError>,
}

pub struct ImportService<P: EventPublisher = InMemoryEventBus> {
    maker: Arc<ImportDecisionMaker>,
    organizer: Arc<dyn MediaFileOrganizer>,
    history: Arc<HistoryLog>,
    clock: Arc<dyn Clock>,
    publisher: Arc<P>,
}

impl<P: EventPublisher> ImportService<P> {
    pub fn new(
        maker: Arc<ImportDecisionMaker>,
        organizer: Arc<dyn MediaFileOrganizer>,
        history: Arc<HistoryLog>,
        clock: Arc<dyn Clock>,
        publisher: Arc<P>,
    ) -> Self {
        Self {
            maker,
            organizer,
            history,
            clock,
            publisher,
        }
    }

    /// Imports the best approved file among `paths` for the request's media.
    pub fn import(&self, request: &ImportRequest, paths: &[PathBuf]) -> Result<ImportReport, ImportError> {
        let mut ordered: Vec<PathBuf> = paths.to_vec();
        ordered.sort();
        ordered.dedup();
        // Sorted acquisition so overlapping requests cannot deadlock.
        let _guards: Vec<PathGuard<'_>> = ordered
            .iter()
            .map(|path| self.maker.locks().lock(path))
            .collect();

        let decisions = self.maker.evaluate_locked(request, &ordered)?;
        let (mut approved, rejected): (Vec<_>, Vec<_>) =
            decisions.into_iter().partition(ImportDecision::is_accepted);
        approved.sort_by(|a, b| compare_for_import(&b.candidate, &a.candidate));

        let mut report = ImportReport {
            rejected,
            ..ImportReport::default()
        };
        let mut approved = approved.into_iter();
        for decision in approved.by_ref() {
            match self.import_one(&decision.candidate) {
                Ok(file) => {
                    report.imported.push(file);
                    break;
                }
                Err(err) => {
                    warn!(target: "import", path = %decision.candidate.path.display(), %err, "import failed");
                    report.failed.push(err);
                }
            }
        }
        report
            .skipped
            .extend(approved.map(|decision| decision.candidate.path));

        info!(
            target: "import",
            media = %request.media.title,
            imported = report.imported.len(),
            rejected = report.rejected.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "import finished"
        );
        Ok(report)
    }

    fn import_one(&self, candidate: &LocalCandidate) -> Result<MediaFile, ImportError> {
        let mut file = self
            .organizer
            .import_file(candidate)
            .map_err(|source| ImportError::Organizer {
                path: candidate.path.clone(),
                source,
            })?;
        if file.release_group.is_none() {
            file.release_group = release_group(candidate);
        }

        let source_title = candidate
            .source_release
            .as_ref()
            .map(|release| release.title.clone())
            .or_else(|| candidate.parsed.as_ref().map(|parsed| parsed.title.clone()))
            .unwrap_or_else(|| candidate.path.display().to_string());
        let mut record = HistoryRecord::new(
            candidate.media.id,
            HistoryEventType::DownloadFolderImported,
            candidate.quality,
            self.clock.now(),
        )
        .with_source_title(source_title);
        if let Some(download_id) = &candidate.download_id {
            record = record.with_download_id(download_id.clone());
        }
        record.languages = candidate.languages.clone();
        if let Some(release) = &candidate.source_release {
            record.indexer = Some(release.indexer.clone());
            record.protocol = Some(release.protocol);
        }
        self.history.append(record);

        self.publisher.publish(&DomainEvent::new(
            MediaFileImportedPayload {
                media_id: candidate.media.id,
                media_file_id: file.id,
                path: file.path.display().to_string(),
                release_group: file.release_group.clone(),
                download_id: candidate.download_id.clone(),
            },
            self.clock.now(),
        ));
        info!(
            target: "import",
            path = %candidate.path.display(),
            destination = %file.path.display(),
            quality = %candidate.quality,
            "file imported"
        );
        Ok(file)
    }
}

/// The grabbed release names the group more reliably than a renamed file.
fn release_group(candidate: &LocalCandidate) -> Option<String> {
    candidate
        .source_release
        .as_ref()
        .and_then(|release| parse_release_title(&release.title).release_group)
        .or_else(|| candidate.parsed.as_ref().and_then(|parsed| parsed.release_group.clone()))
}

/// Quality first, then size.
fn compare_for_import(left: &LocalCandidate, right: &LocalCandidate) -> Ordering {
    left.profile
        .comparer()
        .compare(&left.quality, &right.quality)
        .then_with(|| left.size.cmp(&right.size))
}
