// SPDX-License-Identifier: GPL-3.0-or-later
pub mod blocklist;
pub mod disk;
pub mod download_clients;
pub mod error;
pub mod events;
pub mod grab;
pub mod history;
pub mod import;
pub mod parsing;
pub mod profiles;
pub mod queue;
pub mod specifications;
pub mod upgrade;

pub use blocklist::{BlocklistEntry, BlocklistService};
pub use disk::{
    DiskProvider, FsDiskProvider, MediaInfoProbe, NoMediaInfo, RuntimeSampleDetector, SampleDetector,
    SampleResult,
};
pub use download_clients::{
    ClientDownloadItem, DownloadClient, DownloadClientError, DownloadClientRegistry,
    QBittorrentClient, SabnzbdClient,
};
pub use error::CollaboratorError;
pub use events::{EventPublisher, InMemoryEventBus, RecordedEvent};
pub use grab::{
    build_candidate, prioritize, DownloadDecision, DownloadDecisionMaker, GrabError, GrabReport,
    GrabService,
};
pub use history::{HistoryLog, HistoryService};
pub use import::{
    ImportDecision, ImportDecisionMaker, ImportError, ImportReport, ImportRequest, ImportService,
    MediaFileOrganizer, PathLocks,
};
pub use profiles::{InMemoryProfileStore, ProfileStore};
pub use queue::{
    Page, PagingSpec, PendingRelease, PendingReleaseService, QueueError, QueueFilter, QueueItem,
    QueueItemId, QueueObserver, QueueService, QueueSortKey, RefreshReport, SortDirection,
    TrackedDownload, TrackedDownloadService,
};
pub use specifications::grab::{QueuedRelease, QueuedReleases};
pub use specifications::{DecisionEngine, Priority, Rule, RuleOutcome};
pub use upgrade::UpgradePolicy;
