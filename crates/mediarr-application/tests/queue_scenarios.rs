// SPDX-License-Identifier: GPL-3.0-or-later
//! Queue merging across clients, pending releases and grabs.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{client_item, media, profiles, usenet_candidate, ScriptedClient};
use mediarr_application::{
    BlocklistService, DownloadClient, DownloadClientRegistry, DownloadDecisionMaker, GrabService,
    HistoryLog, HistoryService, InMemoryEventBus, PagingSpec, PendingReleaseService, ProfileStore,
    QueueFilter, QueueService, QueueSortKey, SortDirection, TrackedDownloadService,
};
use mediarr_config::DecisionConfig;
use mediarr_domain::{
    Clock, DownloadProtocol, EventTopic, HistoryEventType, ManualClock, QueueStatus,
    SearchContext, TrackedDownloadState,
};

struct Stack {
    clock: Arc<ManualClock>,
    profiles: Arc<dyn ProfileStore>,
    qbit: Arc<ScriptedClient>,
    sab: Arc<ScriptedClient>,
    history: Arc<HistoryLog>,
    pending: Arc<PendingReleaseService>,
    bus: Arc<InMemoryEventBus>,
    grab: GrabService,
    queue: QueueService,
}

fn stack(delay_minutes: u32) -> Stack {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let profiles = profiles(delay_minutes);
    let qbit = ScriptedClient::new("qbit", DownloadProtocol::Torrent);
    let sab = ScriptedClient::new("sab", DownloadProtocol::Usenet);
    let clients = DownloadClientRegistry::new(vec![
        qbit.clone() as Arc<dyn DownloadClient>,
        sab.clone() as Arc<dyn DownloadClient>,
    ]);
    let history = Arc::new(HistoryLog::new());
    let blocklist = Arc::new(BlocklistService::new());
    let pending = Arc::new(PendingReleaseService::new(profiles.clone()));
    let bus = Arc::new(InMemoryEventBus::new());
    let tracked = Arc::new(TrackedDownloadService::new(history.clone()));

    let maker = Arc::new(DownloadDecisionMaker::standard(
        profiles.clone(),
        history.clone(),
        blocklist.clone(),
        tracked.clone(),
        &DecisionConfig::default(),
        clock.clone(),
    ));
    let grab = GrabService::new(
        maker,
        clients.clone(),
        history.clone(),
        pending.clone(),
        profiles.clone(),
        clock.clone(),
        bus.clone(),
    );
    let queue = QueueService::new(
        clients,
        tracked,
        pending.clone(),
        blocklist,
        history.clone(),
        profiles.clone(),
        clock.clone(),
        bus.clone(),
    );
    Stack {
        clock,
        profiles,
        qbit,
        sab,
        history,
        pending,
        bus,
        grab,
        queue,
    }
}

#[tokio::test]
async fn queue_merges_every_client_and_pending_release() {
    let s = stack(60);
    s.qbit.set_items(vec![
        client_item("HASH1", "Other.Movie.2019.1080p.BluRay.x264-GRP", QueueStatus::Downloading),
        client_item("HASH2", "Third.Movie.2018.720p.WEB-DL-GRP", QueueStatus::Paused),
    ]);
    s.sab.set_items(vec![client_item("SAB_nzo_1", "Fourth.Movie.2017.SDTV-GRP", QueueStatus::Queued)]);

    let delayed = usenet_candidate(
        "Movie.Title.2020.720p.HDTV.x264-GRP",
        s.clock.now(),
        media("/library/Movie Title (2020)"),
        s.profiles.as_ref(),
    );
    let report = s.grab.evaluate_and_grab(vec![delayed], Some(SearchContext::Rss)).await;
    assert_eq!(report.pending, 1);

    let refresh = s.queue.refresh().await;
    assert_eq!(refresh.clients_polled, 2);
    assert!(refresh.changed);

    let queue = s.queue.get_queue();
    assert_eq!(queue.len(), 4);
    let delay_items: Vec<_> = queue.iter().filter(|i| i.status == QueueStatus::Delay).collect();
    assert_eq!(delay_items.len(), 1);
    assert_eq!(
        delay_items[0].estimated_completion_time,
        Some(s.pending.all()[0].candidate.release.publish_date + Duration::minutes(60))
    );

    s.sab.set_offline(true);
    let refresh = s.queue.refresh().await;
    assert_eq!(refresh.clients_failed, 1);
    assert_eq!(s.queue.get_queue().len(), 4);

    s.qbit.set_items(vec![client_item(
        "HASH2",
        "Third.Movie.2018.720p.WEB-DL-GRP",
        QueueStatus::Downloading,
    )]);
    s.queue.refresh().await;
    let titles: Vec<_> = s.queue.get_queue().into_iter().map(|i| i.title).collect();
    assert_eq!(titles.len(), 3);
    assert!(!titles.iter().any(|t| t.starts_with("Other.Movie")));
}

#[tokio::test]
async fn grabbed_release_is_linked_to_its_media_in_the_queue() {
    let s = stack(0);
    let media = media("/library/Movie Title (2020)");
    let candidate = usenet_candidate(
        "Movie.Title.2020.1080p.HDTV.x264-GRP",
        s.clock.now() - Duration::hours(2),
        media.clone(),
        s.profiles.as_ref(),
    );
    let report = s.grab.evaluate_and_grab(vec![candidate], Some(SearchContext::Rss)).await;
    assert_eq!(report.grabbed.len(), 1);
    assert_eq!(s.bus.count(EventTopic::ReleaseGrabbed), 1);

    s.queue.refresh().await;
    let page = s.queue.get_queue_page(&PagingSpec::new(1, 10), &QueueFilter::default());
    assert_eq!(page.total_records, 1);
    let item = &page.records[0];
    assert_eq!(item.media_id, Some(media.id));
    assert_eq!(item.indexer.as_deref(), Some("indexer-a"));
    assert_eq!(item.tracked_state, Some(TrackedDownloadState::Downloading));
}

#[tokio::test]
async fn download_on_a_client_blocks_releases_that_do_not_beat_it() {
    let s = stack(0);
    let media = media("/library/Movie Title (2020)");
    let published = s.clock.now() - Duration::hours(2);
    let first = usenet_candidate("Movie.Title.2020.720p.HDTV.x264-GRP", published, media.clone(), s.profiles.as_ref());
    let report = s.grab.evaluate_and_grab(vec![first], Some(SearchContext::Rss)).await;
    assert_eq!(report.grabbed.len(), 1);
    s.queue.refresh().await;

    let same = usenet_candidate("Movie.Title.2020.720p.HDTV.x264-OTHER", published, media.clone(), s.profiles.as_ref());
    let report = s.grab.evaluate_and_grab(vec![same], Some(SearchContext::Rss)).await;
    assert!(report.grabbed.is_empty());
    assert_eq!(report.rejected, 1);

    let better = usenet_candidate("Movie.Title.2020.1080p.HDTV.x264-OTHER", published, media, s.profiles.as_ref());
    let report = s.grab.evaluate_and_grab(vec![better], Some(SearchContext::Rss)).await;
    assert_eq!(report.grabbed.len(), 1);
}

#[tokio::test]
async fn ignoring_a_download_keeps_it_hidden_after_repoll() {
    let s = stack(0);
    let candidate = usenet_candidate(
        "Movie.Title.2020.1080p.HDTV.x264-GRP",
        s.clock.now() - Duration::hours(2),
        media("/library/Movie Title (2020)"),
        s.profiles.as_ref(),
    );
    s.grab.evaluate_and_grab(vec![candidate], None).await;
    s.queue.refresh().await;
    let id = s.queue.get_queue()[0].id;

    s.queue.remove(id, false, false).await.expect("ignore");
    assert!(s.queue.get_queue().is_empty());
    let download_id = s.sab.added.lock().unwrap().len();
    assert_eq!(download_id, 1);
    let ignored = s
        .history
        .find_by_download_id("sab-1")
        .expect("history")
        .into_iter()
        .filter(|r| r.event_type == HistoryEventType::DownloadIgnored)
        .count();
    assert_eq!(ignored, 1);

    s.queue.refresh().await;
    assert!(s.queue.get_queue().is_empty());
}

#[tokio::test]
async fn paging_sorts_and_clamps() {
    let s = stack(0);
    let mut items = Vec::new();
    for (index, minutes) in [30, 10, 20].into_iter().enumerate() {
        let mut item = client_item(
            &format!("HASH{index}"),
            &format!("Movie.{index}.2020.720p.HDTV-GRP"),
            QueueStatus::Downloading,
        );
        item.remaining_time = Some(Duration::minutes(minutes));
        items.push(item);
    }
    s.qbit.set_items(items);
    s.queue.refresh().await;

    let filter = QueueFilter {
        include_unknown_media: true,
        ..QueueFilter::default()
    };
    let first = s.queue.get_queue_page(
        &PagingSpec::new(1, 2).sorted_by(QueueSortKey::Timeleft, SortDirection::Ascending),
        &filter,
    );
    assert_eq!(first.total_records, 3);
    let titles: Vec<_> = first.records.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, ["Movie.1.2020.720p.HDTV-GRP", "Movie.2.2020.720p.HDTV-GRP"]);

    let past_end = s.queue.get_queue_page(&PagingSpec::new(7, 2), &filter);
    assert_eq!(past_end.page, 2);
    assert_eq!(past_end.records.len(), 1);
}
