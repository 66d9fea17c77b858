// SPDX-License-Identifier: GPL-3.0-or-later
//! Grab pipeline: evaluate remote releases, rank the approved ones and send
//! the best per media item to a download client.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mediarr_config::DecisionConfig;
use mediarr_domain::{
    Clock, ConfigurationError, Decision, DomainEvent, DownloadProtocol, HistoryEventType,
    HistoryRecord, Media, MediaId, ReleaseGrabbedPayload, ReleaseInfo, RemoteCandidate,
    SearchContext,
};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::blocklist::BlocklistService;
use crate::download_clients::{DownloadClientError, DownloadClientRegistry};
use crate::events::{EventPublisher, InMemoryEventBus};
use crate::history::{HistoryLog, HistoryService};
use crate::parsing::parse_release_title;
use crate::profiles::ProfileStore;
use crate::queue::PendingReleaseService;
use crate::specifications::delay::DelaySpecification;
use crate::specifications::grab::{
    AlreadyGrabbedDifferentQualitySpecification, BlocklistSpecification, CutoffSpecification,
    MinimumAgeSpecification, QualityAllowedByProfileSpecification, QueueSpecification,
    QueuedReleases, RepackSpecification, TagRestrictionSpecification, UpgradeAllowedSpecification,
    UpgradeDiskSpecification,
};
use crate::specifications::{DecisionEngine, RuleOutcome};
use crate::upgrade::UpgradePolicy;

const SIZE_BUCKET_BYTES: u64 = 200 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DownloadDecision {
    pub candidate: RemoteCandidate,
    pub decision: Decision,
}

impl DownloadDecision {
    pub fn is_accepted(&self) -> bool {
        self.decision.is_accepted()
    }

    pub fn is_temporarily_rejected(&self) -> bool {
        self.decision.is_temporarily_rejected()
    }
}

/// Parses `release` and binds it to `media` and its profile.
pub fn build_candidate(
    release: ReleaseInfo,
    media: Media,
    profiles: &dyn ProfileStore,
) -> Result<RemoteCandidate, ConfigurationError> {
    let profile = profiles.profile(media.profile_id)?;
    let parsed = parse_release_title(&release.title);
    let download_id = release.info_hash.clone();
    Ok(RemoteCandidate {
        release,
        parsed,
        media,
        profile,
        download_id,
    })
}

pub struct DownloadDecisionMaker {
    engine: DecisionEngine<RemoteCandidate>,
}

impl DownloadDecisionMaker {
    pub fn new(engine: DecisionEngine<RemoteCandidate>) -> Self {
        Self { engine }
    }

    /// The full grab-time rule set.
    pub fn standard(
        profiles: Arc<dyn ProfileStore>,
        history: Arc<dyn HistoryService>,
        blocklist: Arc<BlocklistService>,
        queue: Arc<dyn QueuedReleases>,
        config: &DecisionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = UpgradePolicy::from_config(config);
        Self::new(DecisionEngine::new(vec![
            Box::new(TagRestrictionSpecification),
            Box::new(QualityAllowedByProfileSpecification),
            Box::new(MinimumAgeSpecification::new(config.minimum_age_minutes, clock.clone())),
            Box::new(UpgradeDiskSpecification::new(policy)),
            Box::new(RepackSpecification::new(policy)),
            Box::new(UpgradeAllowedSpecification::new(policy)),
            Box::new(CutoffSpecification::new(policy)),
            Box::new(BlocklistSpecification::new(blocklist)),
            Box::new(AlreadyGrabbedDifferentQualitySpecification::new(history)),
            Box::new(QueueSpecification::new(queue, policy)),
            Box::new(DelaySpecification::new(profiles, policy, clock)),
        ]))
    }

    pub fn engine(&self) -> &DecisionEngine<RemoteCandidate> {
        &self.engine
    }

    /// Evaluates every candidate. Input order is preserved.
    pub fn evaluate(
        &self,
        candidates: Vec<RemoteCandidate>,
        context: Option<SearchContext>,
    ) -> Vec<DownloadDecision> {
        let decisions: Vec<DownloadDecision> = candidates
            .into_par_iter()
            .map(|candidate| {
                let decision = self.engine.decide(&candidate, context.as_ref());
                DownloadDecision { candidate, decision }
            })
            .collect();

        for decision in &decisions {
            match decision.decision.rejection() {
                None => debug!(
                    target: "decision",
                    release = %decision.candidate.release.title,
                    "release accepted"
                ),
                Some(rejection) => debug!(
                    target: "decision",
                    release = %decision.candidate.release.title,
                    reason = %rejection,
                    "release rejected"
                ),
            }
        }
        let accepted = decisions.iter().filter(|d| d.is_accepted()).count();
        info!(
            target: "decision",
            total = decisions.len(),
            accepted,
            "evaluated releases"
        );
        decisions
    }

    pub fn explain(&self, candidate: &RemoteCandidate, context: Option<&SearchContext>) -> Vec<RuleOutcome> {
        self.engine.explain(candidate, context)
    }
}

fn round_log10(value: Option<u32>) -> i64 {
    match value {
        Some(v) if v > 0 => (f64::from(v)).log10().round() as i64,
        _ => 0,
    }
}

fn usenet_age_score(release: &ReleaseInfo, now: DateTime<Utc>) -> u32 {
    let age = release.age(now);
    if age < Duration::hours(1) {
        1000
    } else if age <= Duration::hours(24) {
        100
    } else if age <= Duration::days(7) {
        10
    } else {
        1
    }
}

/// Ordering of two approved releases for the same media; `Greater` is preferred.
fn compare_candidates(
    profiles: &dyn ProfileStore,
    now: DateTime<Utc>,
    left: &RemoteCandidate,
    right: &RemoteCandidate,
) -> Ordering {
    let comparer = left.profile.comparer();
    comparer
        .compare(left.quality(), right.quality())
        .then_with(|| {
            let preferred = profiles
                .delay_profile_for_tags(&left.media.tags)
                .preferred_protocol;
            let score = |c: &RemoteCandidate| u8::from(c.release.protocol == preferred);
            score(left).cmp(&score(right))
        })
        .then_with(|| match (left.release.protocol, right.release.protocol) {
            (DownloadProtocol::Torrent, DownloadProtocol::Torrent) => {
                round_log10(left.release.seeders)
                    .cmp(&round_log10(right.release.seeders))
                    .then_with(|| round_log10(left.release.peers).cmp(&round_log10(right.release.peers)))
            }
            (DownloadProtocol::Usenet, DownloadProtocol::Usenet) => {
                usenet_age_score(&left.release, now).cmp(&usenet_age_score(&right.release, now))
            }
            _ => Ordering::Equal,
        })
        .then_with(|| {
            let bucket = |c: &RemoteCandidate| (c.release.size + SIZE_BUCKET_BYTES / 2) / SIZE_BUCKET_BYTES;
            bucket(left).cmp(&bucket(right))
        })
}

/// Accepted decisions best first, grouped per media item, followed by the rest.
pub fn prioritize(
    decisions: Vec<DownloadDecision>,
    profiles: &dyn ProfileStore,
    now: DateTime<Utc>,
) -> Vec<DownloadDecision> {
    let (accepted, rejected): (Vec<_>, Vec<_>) =
        decisions.into_iter().partition(DownloadDecision::is_accepted);

    let mut media_order: Vec<MediaId> = Vec::new();
    for decision in &accepted {
        if !media_order.contains(&decision.candidate.media.id) {
            media_order.push(decision.candidate.media.id);
        }
    }

    let mut prioritized = Vec::with_capacity(accepted.len() + rejected.len());
    for media_id in media_order {
        let mut group: Vec<DownloadDecision> = accepted
            .iter()
            .filter(|d| d.candidate.media.id == media_id)
            .cloned()
            .collect();
        group.sort_by(|a, b| compare_candidates(profiles, now, &b.candidate, &a.candidate));
        prioritized.extend(group);
    }
    prioritized.extend(rejected);
    prioritized
}

#[derive(Debug, Error)]
pub enum GrabError {
    #[error("no download client is configured for {0}")]
    NoClient(DownloadProtocol),
    #[error(transparent)]
    DownloadClient(#[from] DownloadClientError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrabReport {
    /// `(media, download id)` for every release sent to a client.
    pub grabbed: Vec<(MediaId, String)>,
    pub pending: usize,
    pub rejected: usize,
    pub failed: usize,
}

pub struct GrabService<P: EventPublisher = InMemoryEventBus> {
    maker: Arc<DownloadDecisionMaker>,
    clients: DownloadClientRegistry,
    history: Arc<HistoryLog>,
    pending: Arc<PendingReleaseService>,
    profiles: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
    publisher: Arc<P>,
}

impl<P: EventPublisher> GrabService<P> {
    pub fn new(
        maker: Arc<DownloadDecisionMaker>,
        clients: DownloadClientRegistry,
        history: Arc<HistoryLog>,
        pending: Arc<PendingReleaseService>,
        profiles: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
        publisher: Arc<P>,
    ) -> Self {
        Self {
            maker,
            clients,
            history,
            pending,
            profiles,
            clock,
            publisher,
        }
    }

    /// Evaluates `candidates` and acts on the outcome.
    pub async fn evaluate_and_grab(
        &self,
        candidates: Vec<RemoteCandidate>,
        context: Option<SearchContext>,
    ) -> GrabReport {
        let decisions = self.evaluate(candidates, context).await;
        self.process_decisions(decisions).await
    }

    /// Runs the rule batch on the blocking pool so the rayon fan-out does not
    /// hold a runtime worker.
    async fn evaluate(
        &self,
        candidates: Vec<RemoteCandidate>,
        context: Option<SearchContext>,
    ) -> Vec<DownloadDecision> {
        let maker = self.maker.clone();
        match tokio::task::spawn_blocking(move || maker.evaluate(candidates, context)).await {
            Ok(decisions) => decisions,
            Err(err) => {
                error!(target: "decision", error = %err, "release evaluation task failed");
                Vec::new()
            }
        }
    }

    /// Grabs the best approved release per media item. Temporary rejections
    /// for media that was not grabbed are parked as pending releases.
    pub async fn process_decisions(&self, decisions: Vec<DownloadDecision>) -> GrabReport {
        let now = self.clock.now();
        let mut report = GrabReport::default();
        let mut grabbed_media: HashSet<MediaId> = HashSet::new();

        for decision in prioritize(decisions, self.profiles.as_ref(), now) {
            let media_id = decision.candidate.media.id;
            if decision.is_accepted() {
                if grabbed_media.contains(&media_id) {
                    continue;
                }
                match self.grab(&decision.candidate).await {
                    Ok(download_id) => {
                        grabbed_media.insert(media_id);
                        report.grabbed.push((media_id, download_id));
                    }
                    Err(err) => {
                        warn!(
                            target: "decision",
                            release = %decision.candidate.release.title,
                            error = %err,
                            "grab failed, trying next release"
                        );
                        report.failed += 1;
                    }
                }
            } else if decision.is_temporarily_rejected() {
                if grabbed_media.contains(&media_id) {
                    continue;
                }
                let Some(rejection) = decision.decision.rejection().cloned() else {
                    continue;
                };
                self.pending.add(decision.candidate, rejection, now);
                report.pending += 1;
            } else {
                report.rejected += 1;
            }
        }
        report
    }

    /// Sends one release to the client for its protocol and records the grab.
    pub async fn grab(&self, candidate: &RemoteCandidate) -> Result<String, GrabError> {
        let release = &candidate.release;
        let client = self
            .clients
            .for_protocol(release.protocol)
            .ok_or(GrabError::NoClient(release.protocol))?;
        let download_id = client.add_release(release).await?;

        let mut record = HistoryRecord::new(
            candidate.media.id,
            HistoryEventType::Grabbed,
            *candidate.quality(),
            self.clock.now(),
        )
        .with_download_id(download_id.clone())
        .with_source_title(release.title.clone());
        record.languages = candidate.parsed.languages.clone();
        record.indexer = Some(release.indexer.clone());
        record.protocol = Some(release.protocol);
        self.history.append(record);

        self.pending.remove_for_media(candidate.media.id);
        self.publisher.publish(&DomainEvent::new(
            ReleaseGrabbedPayload {
                media_id: candidate.media.id,
                release_title: release.title.clone(),
                indexer: release.indexer.clone(),
                download_client: client.name().to_string(),
                download_id: download_id.clone(),
                quality: *candidate.quality(),
            },
            self.clock.now(),
        ));
        info!(
            target: "decision",
            release = %release.title,
            client = client.name(),
            %download_id,
            "release grabbed"
        );
        Ok(download_id)
    }

    /// Re-evaluates every pending release as a feed-driven search.
    ///
    /// Releases stay in the pending set until they are grabbed or rejected for
    /// good, so the queue keeps showing them while this runs.
    pub async fn process_pending(&self) -> GrabReport {
        let snapshot = self.pending.all();
        if snapshot.is_empty() {
            return GrabReport::default();
        }
        debug!(target: "decision", count = snapshot.len(), "re-evaluating pending releases");
        let candidates = snapshot.into_iter().map(|p| p.candidate).collect();
        let decisions = self.evaluate(candidates, Some(SearchContext::Rss)).await;
        for decision in &decisions {
            if !decision.is_accepted() && !decision.is_temporarily_rejected() {
                self.pending.remove_release(&decision.candidate);
            }
        }
        self.process_decisions(decisions).await
    }
}
