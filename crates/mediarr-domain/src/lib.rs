// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Value Objects & IDs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaId(pub Uuid);

impl MediaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaFileId(pub Uuid);

impl MediaFileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MediaFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MediaFileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryId(pub Uuid);

impl HistoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HistoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HistoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Profiles are declared in configuration, so their ids are small and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileId(pub u32);

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type Tag = u32;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadProtocol {
    Usenet,
    Torrent,
}

impl std::fmt::Display for DownloadProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usenet => write!(f, "usenet"),
            Self::Torrent => write!(f, "torrent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Unknown,
    English,
    French,
    German,
    Spanish,
    Italian,
    Japanese,
    Dutch,
    Portuguese,
    Russian,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::English => "English",
            Self::French => "French",
            Self::German => "German",
            Self::Spanish => "Spanish",
            Self::Italian => "Italian",
            Self::Japanese => "Japanese",
            Self::Dutch => "Dutch",
            Self::Portuguese => "Portuguese",
            Self::Russian => "Russian",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a candidate release came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchContext {
    /// Periodic feed sync.
    Rss,
    /// Search triggered by the system (missing or cutoff-unmet media).
    Automatic,
    /// Search explicitly requested by a user.
    UserInvoked,
}

impl SearchContext {
    pub fn is_user_invoked(&self) -> bool {
        matches!(self, Self::UserInvoked)
    }
}

// ============================================================================
// Quality Model
// ============================================================================

/// A discrete quality tier. Identity is the numeric id; the name is only for display.
///
/// The declaration order of the catalogue carries no meaning. Ordering is always
/// resolved against a [`Profile`].
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(into = "u32")]
pub struct Quality {
    id: u32,
    name: &'static str,
}

impl Quality {
    pub const UNKNOWN: Quality = Quality::custom(0, "Unknown");
    pub const SDTV: Quality = Quality::custom(1, "SDTV");
    pub const DVD: Quality = Quality::custom(2, "DVD");
    pub const WEBDL_1080P: Quality = Quality::custom(3, "WEBDL-1080p");
    pub const HDTV_720P: Quality = Quality::custom(4, "HDTV-720p");
    pub const WEBDL_720P: Quality = Quality::custom(5, "WEBDL-720p");
    pub const BLURAY_720P: Quality = Quality::custom(6, "Bluray-720p");
    pub const BLURAY_1080P: Quality = Quality::custom(7, "Bluray-1080p");
    pub const WEBDL_480P: Quality = Quality::custom(8, "WEBDL-480p");
    pub const HDTV_1080P: Quality = Quality::custom(9, "HDTV-1080p");
    pub const HDTV_2160P: Quality = Quality::custom(16, "HDTV-2160p");
    pub const WEBDL_2160P: Quality = Quality::custom(18, "WEBDL-2160p");
    pub const BLURAY_2160P: Quality = Quality::custom(19, "Bluray-2160p");
    pub const REMUX_1080P: Quality = Quality::custom(30, "Remux-1080p");
    pub const REMUX_2160P: Quality = Quality::custom(31, "Remux-2160p");
    pub const MP3_320: Quality = Quality::custom(100, "MP3-320");
    pub const FLAC: Quality = Quality::custom(101, "FLAC");

    const CATALOGUE: [Quality; 17] = [
        Quality::UNKNOWN,
        Quality::SDTV,
        Quality::DVD,
        Quality::WEBDL_480P,
        Quality::HDTV_720P,
        Quality::WEBDL_720P,
        Quality::BLURAY_720P,
        Quality::HDTV_1080P,
        Quality::WEBDL_1080P,
        Quality::BLURAY_1080P,
        Quality::REMUX_1080P,
        Quality::HDTV_2160P,
        Quality::WEBDL_2160P,
        Quality::BLURAY_2160P,
        Quality::REMUX_2160P,
        Quality::MP3_320,
        Quality::FLAC,
    ];

    /// Declare a quality tier outside the built-in catalogue.
    pub const fn custom(id: u32, name: &'static str) -> Self {
        Self { id, name }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_unknown(&self) -> bool {
        self.id == Self::UNKNOWN.id
    }

    pub fn all() -> &'static [Quality] {
        &Self::CATALOGUE
    }

    pub fn find_by_id(id: u32) -> Option<Quality> {
        Self::CATALOGUE.iter().copied().find(|q| q.id == id)
    }

    pub fn find_by_name(name: &str) -> Option<Quality> {
        Self::CATALOGUE
            .iter()
            .copied()
            .find(|q| q.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl PartialEq for Quality {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Quality {}

impl std::hash::Hash for Quality {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl From<Quality> for u32 {
    fn from(quality: Quality) -> Self {
        quality.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown quality id {0}")]
pub struct UnknownQualityId(pub u32);

impl TryFrom<u32> for Quality {
    type Error = UnknownQualityId;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Quality::find_by_id(id).ok_or(UnknownQualityId(id))
    }
}

// The name is `&'static str`, so deserialization goes through the catalogue id.
impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = u32::deserialize(deserializer)?;
        Quality::try_from(id).map_err(serde::de::Error::custom)
    }
}

/// Release revision. `real` outranks `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision {
    pub version: u32,
    pub real: u32,
}

impl Revision {
    pub fn new(version: u32, real: u32) -> Self {
        Self { version, real }
    }

    pub fn is_proper(&self) -> bool {
        self.version > 1
    }

    pub fn is_real(&self) -> bool {
        self.real > 0
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self {
            version: 1,
            real: 0,
        }
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.real
            .cmp(&other.real)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualityModel {
    pub quality: Quality,
    pub revision: Revision,
}

impl QualityModel {
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            revision: Revision::default(),
        }
    }

    pub fn with_revision(quality: Quality, revision: Revision) -> Self {
        Self { quality, revision }
    }

    pub fn unknown() -> Self {
        Self::new(Quality::UNKNOWN)
    }
}

impl std::fmt::Display for QualityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}", self.quality, self.revision.version)?;
        if self.revision.real > 0 {
            write!(f, " REAL")?;
        }
        Ok(())
    }
}

// ============================================================================
// Profiles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileQualityItem {
    pub quality: Quality,
    pub allowed: bool,
}

impl ProfileQualityItem {
    pub fn allowed(quality: Quality) -> Self {
        Self {
            quality,
            allowed: true,
        }
    }

    pub fn disallowed(quality: Quality) -> Self {
        Self {
            quality,
            allowed: false,
        }
    }
}

/// Ordered quality preferences, worst first. The only source of "is A better than B".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub items: Vec<ProfileQualityItem>,
    pub cutoff: Quality,
    pub upgrade_allowed: bool,
}

impl Profile {
    /// Build a profile, rejecting configurations the comparer cannot order.
    pub fn new(
        id: ProfileId,
        name: impl Into<String>,
        items: Vec<ProfileQualityItem>,
        cutoff: Quality,
    ) -> Result<Self, ConfigurationError> {
        let profile = Self {
            id,
            name: name.into(),
            items,
            cutoff,
            upgrade_allowed: true,
        };
        profile.validate().map_err(|errors| ConfigurationError::Invalid {
            entity: "profile",
            name: profile.name.clone(),
            message: errors
                .into_iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; "),
        })?;
        Ok(profile)
    }

    pub fn with_upgrades(mut self, upgrade_allowed: bool) -> Self {
        self.upgrade_allowed = upgrade_allowed;
        self
    }

    /// Position of `quality` in the item list, or -1 when it is absent or not allowed.
    pub fn index_of(&self, quality: Quality) -> i32 {
        self.items
            .iter()
            .position(|item| item.allowed && item.quality == quality)
            .map(|index| index as i32)
            .unwrap_or(-1)
    }

    pub fn is_allowed(&self, quality: Quality) -> bool {
        self.index_of(quality) >= 0
    }

    /// The best quality this profile accepts; nothing ranks above it.
    pub fn last_allowed_quality(&self) -> Option<Quality> {
        self.items
            .iter()
            .rev()
            .find(|item| item.allowed)
            .map(|item| item.quality)
    }

    pub fn cutoff_met(&self, quality: Quality) -> bool {
        self.index_of(quality) >= self.index_of(self.cutoff)
    }

    pub fn comparer(&self) -> QualityModelComparer<'_> {
        QualityModelComparer::new(self)
    }
}

impl Validate for Profile {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(ValidationError {
                field: "name",
                message: "name cannot be empty".into(),
            });
        }
        if !self.items.iter().any(|item| item.allowed) {
            errors.push(ValidationError {
                field: "items",
                message: "at least one quality must be allowed".into(),
            });
        }
        let mut seen = BTreeSet::new();
        for item in &self.items {
            if !seen.insert(item.quality.id()) {
                errors.push(ValidationError {
                    field: "items",
                    message: format!("quality {} is listed more than once", item.quality),
                });
            }
        }
        if !self
            .items
            .iter()
            .any(|item| item.allowed && item.quality == self.cutoff)
        {
            errors.push(ValidationError {
                field: "cutoff",
                message: format!("cutoff {} must be an allowed quality", self.cutoff),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Total order over [`QualityModel`]s relative to one profile.
#[derive(Debug, Clone, Copy)]
pub struct QualityModelComparer<'a> {
    profile: &'a Profile,
}

impl<'a> QualityModelComparer<'a> {
    pub fn new(profile: &'a Profile) -> Self {
        Self { profile }
    }

    pub fn compare_quality(&self, left: Quality, right: Quality) -> Ordering {
        self.profile
            .index_of(left)
            .cmp(&self.profile.index_of(right))
    }

    pub fn compare(&self, left: &QualityModel, right: &QualityModel) -> Ordering {
        self.compare_quality(left.quality, right.quality)
            .then_with(|| left.revision.cmp(&right.revision))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayProfile {
    pub id: u32,
    /// Lower order wins when two profiles match the same number of tags.
    pub order: u32,
    pub preferred_protocol: DownloadProtocol,
    pub usenet_delay_minutes: u32,
    pub torrent_delay_minutes: u32,
    pub tags: BTreeSet<Tag>,
}

impl DelayProfile {
    /// The untagged fallback profile.
    pub fn global(usenet_delay_minutes: u32, torrent_delay_minutes: u32) -> Self {
        Self {
            id: 1,
            order: u32::MAX,
            preferred_protocol: DownloadProtocol::Usenet,
            usenet_delay_minutes,
            torrent_delay_minutes,
            tags: BTreeSet::new(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn delay_for(&self, protocol: DownloadProtocol) -> u32 {
        match protocol {
            DownloadProtocol::Usenet => self.usenet_delay_minutes,
            DownloadProtocol::Torrent => self.torrent_delay_minutes,
        }
    }
}

// ============================================================================
// Media & Candidates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: MediaFileId,
    pub media_id: MediaId,
    pub path: PathBuf,
    pub size: u64,
    pub quality: QualityModel,
    pub languages: Vec<Language>,
    pub release_group: Option<String>,
    pub date_added: DateTime<Utc>,
}

impl MediaFile {
    pub fn new(media_id: MediaId, path: impl Into<PathBuf>, size: u64, quality: QualityModel) -> Self {
        Self {
            id: MediaFileId::new(),
            media_id,
            path: path.into(),
            size,
            quality,
            languages: vec![],
            release_group: None,
            date_added: Utc::now(),
        }
    }

    pub fn with_release_group(mut self, group: impl Into<String>) -> Self {
        self.release_group = Some(group.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub title: String,
    pub year: Option<u16>,
    /// Library folder the media's files live in.
    pub path: PathBuf,
    pub profile_id: ProfileId,
    pub tags: BTreeSet<Tag>,
    pub monitored: bool,
    pub media_file: Option<MediaFile>,
}

impl Media {
    pub fn new(title: impl Into<String>, path: impl Into<PathBuf>, profile_id: ProfileId) -> Self {
        Self {
            id: MediaId::new(),
            title: title.into(),
            year: None,
            path: path.into(),
            profile_id,
            tags: BTreeSet::new(),
            monitored: true,
            media_file: None,
        }
    }

    pub fn has_file(&self) -> bool {
        self.media_file.is_some()
    }
}

/// A release as reported by an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub guid: String,
    pub title: String,
    pub indexer: String,
    pub indexer_tags: BTreeSet<Tag>,
    pub publish_date: DateTime<Utc>,
    pub protocol: DownloadProtocol,
    pub size: u64,
    pub download_url: String,
    pub info_hash: Option<String>,
    pub seeders: Option<u32>,
    pub peers: Option<u32>,
    /// Media the indexer associated with this release, when it reports any.
    pub media_ids: Vec<MediaId>,
}

impl ReleaseInfo {
    pub fn new(
        title: impl Into<String>,
        indexer: impl Into<String>,
        protocol: DownloadProtocol,
        publish_date: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        Self {
            guid: format!("{}-{}", protocol, Uuid::new_v4()),
            title,
            indexer: indexer.into(),
            indexer_tags: BTreeSet::new(),
            publish_date,
            protocol,
            size: 0,
            download_url: String::new(),
            info_hash: None,
            seeders: None,
            peers: None,
            media_ids: vec![],
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.publish_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReleaseInfo {
    pub title: String,
    pub media_title: Option<String>,
    pub year: Option<u16>,
    pub quality: QualityModel,
    pub languages: Vec<Language>,
    pub release_group: Option<String>,
}

/// A release under grab evaluation. Built per search or feed cycle.
#[derive(Debug, Clone)]
pub struct RemoteCandidate {
    pub release: ReleaseInfo,
    pub parsed: ParsedReleaseInfo,
    pub media: Media,
    pub profile: Arc<Profile>,
    /// Set when the release is already known to a download client.
    pub download_id: Option<String>,
}

impl RemoteCandidate {
    pub fn quality(&self) -> &QualityModel {
        &self.parsed.quality
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub audio_stream_count: u32,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub run_time_seconds: Option<u32>,
}

/// A file on disk under import evaluation.
#[derive(Debug, Clone)]
pub struct LocalCandidate {
    pub path: PathBuf,
    pub size: u64,
    pub quality: QualityModel,
    pub languages: Vec<Language>,
    pub media_info: Option<MediaInfo>,
    /// The file already lives inside the media's library folder.
    pub existing_file: bool,
    pub parsed: Option<ParsedReleaseInfo>,
    pub source_release: Option<ReleaseInfo>,
    pub download_id: Option<String>,
    pub media: Media,
    pub profile: Arc<Profile>,
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    Grabbed,
    DownloadFolderImported,
    DownloadFailed,
    DownloadIgnored,
    FileDeleted,
}

/// Append-only log entry. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: HistoryId,
    pub media_id: MediaId,
    pub event_type: HistoryEventType,
    pub download_id: Option<String>,
    pub quality: QualityModel,
    pub languages: Vec<Language>,
    pub source_title: String,
    pub indexer: Option<String>,
    pub protocol: Option<DownloadProtocol>,
    pub date: DateTime<Utc>,
    pub message: Option<String>,
}

impl HistoryRecord {
    pub fn new(
        media_id: MediaId,
        event_type: HistoryEventType,
        quality: QualityModel,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryId::new(),
            media_id,
            event_type,
            download_id: None,
            quality,
            languages: vec![],
            source_title: String::new(),
            indexer: None,
            protocol: None,
            date,
            message: None,
        }
    }

    pub fn with_download_id(mut self, download_id: impl Into<String>) -> Self {
        self.download_id = Some(download_id.into());
        self
    }

    pub fn with_source_title(mut self, source_title: impl Into<String>) -> Self {
        self.source_title = source_title.into();
        self
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Lifecycle of a download as reported by its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Downloading,
    Paused,
    Completed,
    Failed,
    Warning,
    /// Held back by a delay or minimum-age rule; never reported by a client.
    Delay,
    /// Gone from the client. Absorbing and never shown.
    Deleted,
}

impl QueueStatus {
    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Deleted, _) => false,
            (_, Deleted) => true,
            (Queued, Downloading | Paused | Completed | Failed | Warning) => true,
            (Downloading, Paused | Completed | Failed | Warning) => true,
            (Paused, Queued | Downloading | Failed) => true,
            (Warning, Downloading | Completed | Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Deleted)
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Warning => "warning",
            Self::Delay => "delay",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// What history says happened to a tracked download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackedDownloadState {
    Downloading,
    Imported,
    Failed,
    Ignored,
}

impl TrackedDownloadState {
    pub fn from_history(event_type: HistoryEventType) -> Self {
        match event_type {
            HistoryEventType::DownloadFolderImported => Self::Imported,
            HistoryEventType::DownloadFailed => Self::Failed,
            HistoryEventType::DownloadIgnored => Self::Ignored,
            HistoryEventType::Grabbed | HistoryEventType::FileDeleted => Self::Downloading,
        }
    }
}

// ============================================================================
// Decisions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    TagMismatch,
    QualityMismatch,
    QualityNotWanted,
    DelayWindow,
    MinimumAge,
    NotUpgrade,
    CutoffMet,
    UpgradeNotAllowed,
    AlreadyQueued,
    ReleaseGroupMismatch,
    Blocklisted,
    AlreadyImported,
    MediaNotFoundInRelease,
    MultiDisc,
    MultiPart,
    Sample,
    SampleIndeterminate,
    Unpacking,
    SameFile,
    NoAudio,
    Unparseable,
    CollaboratorUnavailable,
}

/// Temporary rejections may pass on a later evaluation without any data changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionType {
    Permanent,
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
    pub rejection_type: RejectionType,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected(Rejection),
}

impl Decision {
    pub fn accept() -> Self {
        Self::Accepted
    }

    pub fn reject(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self::Rejected(Rejection {
            kind,
            message: message.into(),
            rejection_type: RejectionType::Permanent,
        })
    }

    pub fn reject_temporarily(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self::Rejected(Rejection {
            kind,
            message: message.into(),
            rejection_type: RejectionType::Temporary,
        })
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }

    pub fn is_temporarily_rejected(&self) -> bool {
        self.rejection()
            .is_some_and(|r| r.rejection_type == RejectionType::Temporary)
    }
}

// ============================================================================
// Time
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Domain Validation
// ============================================================================

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Result<(), Vec<ValidationError>>;
}

impl Validate for DelayProfile {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.is_global() && self.order != u32::MAX {
            errors.push(ValidationError {
                field: "order",
                message: "the untagged profile must be ordered last".into(),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Policy that cannot be resolved. Raised before any candidate is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("{entity} '{name}' is invalid: {message}")]
    Invalid {
        entity: &'static str,
        name: String,
        message: String,
    },
    #[error("unknown quality '{0}'")]
    UnknownQuality(String),
    #[error("no profile with id {0}")]
    UnknownProfile(ProfileId),
    #[error("no untagged delay profile is configured")]
    MissingGlobalDelayProfile,
}

// ============================================================================
// Domain Events
// ============================================================================

/// Where an event is published. Subscribers select on this, never on payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    #[serde(rename = "release.grabbed")]
    ReleaseGrabbed,
    #[serde(rename = "media.file.imported")]
    MediaFileImported,
    #[serde(rename = "download.removed")]
    DownloadRemoved,
}

impl EventTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReleaseGrabbed => "release.grabbed",
            Self::MediaFileImported => "media.file.imported",
            Self::DownloadRemoved => "download.removed",
        }
    }
}

impl std::fmt::Display for EventTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload belongs to exactly one topic.
pub trait EventPayload: Serialize + Send + Sync + 'static {
    const TOPIC: EventTopic;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<P> {
    pub topic: EventTopic,
    pub occurred_at: DateTime<Utc>,
    pub payload: P,
}

impl<P: EventPayload> DomainEvent<P> {
    pub fn new(payload: P, occurred_at: DateTime<Utc>) -> Self {
        Self {
            topic: P::TOPIC,
            occurred_at,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseGrabbedPayload {
    pub media_id: MediaId,
    pub release_title: String,
    pub indexer: String,
    pub download_client: String,
    pub download_id: String,
    pub quality: QualityModel,
}

impl EventPayload for ReleaseGrabbedPayload {
    const TOPIC: EventTopic = EventTopic::ReleaseGrabbed;
}

pub type ReleaseGrabbed = DomainEvent<ReleaseGrabbedPayload>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFileImportedPayload {
    pub media_id: MediaId,
    pub media_file_id: MediaFileId,
    pub path: String,
    pub release_group: Option<String>,
    pub download_id: Option<String>,
}

impl EventPayload for MediaFileImportedPayload {
    const TOPIC: EventTopic = EventTopic::MediaFileImported;
}

pub type MediaFileImported = DomainEvent<MediaFileImportedPayload>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRemovedPayload {
    pub download_id: String,
    pub download_client: String,
    pub removed_from_client: bool,
    pub blocklisted: bool,
}

impl EventPayload for DownloadRemovedPayload {
    const TOPIC: EventTopic = EventTopic::DownloadRemoved;
}

pub type DownloadRemoved = DomainEvent<DownloadRemovedPayload>;

// ============================================================================
// Tests
// ============================================================================
