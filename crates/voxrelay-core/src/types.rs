// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the collaborator traits and the relay engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::RelayError;
use crate::timefmt;

/// Identifier of a chat whose group call the relay feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a relay account in the assistant pool (1..=N).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssistantId(pub usize);

impl fmt::Display for AssistantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable identity of a queued item, used to detect stale stream events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub uuid::Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a status message posted to a chat, used for later edits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Transport,
    Store,
    Resolver,
    Reencoder,
    Notifier,
}

/// Whether a stream carries video or only audio.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    #[default]
    Audio,
    Video,
}

/// Which external resolution a tagged source needs before it can be streamed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResolveTag {
    /// Live stream: ask the resolver for a current playable URL.
    Live,
    /// Download the media to local disk first.
    Download,
    /// Look the entry up in an external catalog.
    Catalog,
}

/// Where a queued item's media comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MediaSource {
    LocalFile(PathBuf),
    DirectUrl(String),
    LiveResolve(String),
    DownloadResolve(String),
    CatalogIndex(String),
}

impl MediaSource {
    /// Classify a raw reference in the legacy tagged-string form.
    ///
    /// `live_<id>`, `vid_<id>` and `index_<ref>` map to the resolver-backed
    /// variants, `http(s)://` to a direct URL, anything else to a local path.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RelayError::MalformedQueueEntry {
                reason: "empty source reference".to_string(),
            });
        }

        let source = if let Some(id) = raw.strip_prefix("live_") {
            MediaSource::LiveResolve(id.to_string())
        } else if let Some(id) = raw.strip_prefix("vid_") {
            MediaSource::DownloadResolve(id.to_string())
        } else if let Some(id) = raw.strip_prefix("index_") {
            MediaSource::CatalogIndex(id.to_string())
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            MediaSource::DirectUrl(raw.to_string())
        } else {
            MediaSource::LocalFile(PathBuf::from(raw))
        };

        source.validate()?;
        Ok(source)
    }

    /// Check that the variant carries a usable reference.
    pub fn validate(&self) -> Result<(), RelayError> {
        let reason = match self {
            MediaSource::LocalFile(path) if path.as_os_str().is_empty() => "empty file path",
            MediaSource::DirectUrl(url)
                if !(url.starts_with("http://") || url.starts_with("https://")) =>
            {
                "direct url without http(s) scheme"
            }
            MediaSource::LiveResolve(id)
            | MediaSource::DownloadResolve(id)
            | MediaSource::CatalogIndex(id)
                if id.trim().is_empty() =>
            {
                "tagged source without an id"
            }
            _ => return Ok(()),
        };
        Err(RelayError::MalformedQueueEntry {
            reason: reason.to_string(),
        })
    }

    /// The resolver tag and id for sources that need live resolution.
    pub fn resolve_tag(&self) -> Option<(ResolveTag, &str)> {
        match self {
            MediaSource::LiveResolve(id) => Some((ResolveTag::Live, id)),
            MediaSource::DownloadResolve(id) => Some((ResolveTag::Download, id)),
            MediaSource::CatalogIndex(id) => Some((ResolveTag::Catalog, id)),
            MediaSource::LocalFile(_) | MediaSource::DirectUrl(_) => None,
        }
    }

    /// The playable location for sources that need no resolution.
    pub fn direct_location(&self) -> Option<String> {
        match self {
            MediaSource::LocalFile(path) => Some(path.display().to_string()),
            MediaSource::DirectUrl(url) => Some(url.clone()),
            _ => None,
        }
    }
}

/// Supported playback speeds with their fixed re-encode parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpeedFactor {
    Half,
    ThreeQuarters,
    #[default]
    Normal,
    OneAndHalf,
    Double,
}

impl SpeedFactor {
    pub const ALL: [SpeedFactor; 5] = [
        SpeedFactor::Half,
        SpeedFactor::ThreeQuarters,
        SpeedFactor::Normal,
        SpeedFactor::OneAndHalf,
        SpeedFactor::Double,
    ];

    pub fn as_f32(self) -> f32 {
        match self {
            SpeedFactor::Half => 0.5,
            SpeedFactor::ThreeQuarters => 0.75,
            SpeedFactor::Normal => 1.0,
            SpeedFactor::OneAndHalf => 1.5,
            SpeedFactor::Double => 2.0,
        }
    }

    pub fn is_normal(self) -> bool {
        self == SpeedFactor::Normal
    }

    /// Video presentation-timestamp multiplier passed to `setpts`.
    pub fn pts_scale(self) -> f32 {
        match self {
            SpeedFactor::Half => 2.0,
            SpeedFactor::ThreeQuarters => 1.35,
            SpeedFactor::Normal => 1.0,
            SpeedFactor::OneAndHalf => 0.68,
            SpeedFactor::Double => 0.5,
        }
    }

    /// Audio tempo passed to `atempo`.
    pub fn tempo(self) -> f32 {
        self.as_f32()
    }

    /// Map an elapsed offset in the original media onto the re-encoded timeline.
    pub fn convert_offset(self, secs: u64) -> u64 {
        match self {
            SpeedFactor::Half => secs * 2,
            SpeedFactor::ThreeQuarters => secs + (50 * secs) / 100,
            SpeedFactor::Normal => secs,
            SpeedFactor::OneAndHalf => secs - (25 * secs) / 100,
            SpeedFactor::Double => secs - (50 * secs) / 100,
        }
    }

    /// Inverse of [`convert_offset`](Self::convert_offset): map an offset on the
    /// re-encoded timeline back onto the original media.
    pub fn revert_offset(self, secs: u64) -> u64 {
        match self {
            SpeedFactor::Half => secs / 2,
            SpeedFactor::ThreeQuarters => (secs * 100) / 150,
            SpeedFactor::Normal => secs,
            SpeedFactor::OneAndHalf => (secs * 100) / 75,
            SpeedFactor::Double => secs * 2,
        }
    }
}

impl fmt::Display for SpeedFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpeedFactor::Half => "0.5",
            SpeedFactor::ThreeQuarters => "0.75",
            SpeedFactor::Normal => "1.0",
            SpeedFactor::OneAndHalf => "1.5",
            SpeedFactor::Double => "2.0",
        };
        f.write_str(s)
    }
}

impl FromStr for SpeedFactor {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s
            .trim()
            .parse()
            .map_err(|_| RelayError::UnsupportedSpeed(s.to_string()))?;
        SpeedFactor::try_from(value)
    }
}

impl TryFrom<f32> for SpeedFactor {
    type Error = RelayError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        SpeedFactor::ALL
            .into_iter()
            .find(|f| (f.as_f32() - value).abs() < 0.001)
            .ok_or_else(|| RelayError::UnsupportedSpeed(value.to_string()))
    }
}

/// Timing recorded before the first non-normal speed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSnapshot {
    pub duration_secs: u64,
    pub duration_label: String,
    pub played_secs: u64,
}

/// Which status-message layout was used for the current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum StatusTemplate {
    #[strum(serialize = "tg")]
    Telegram,
    #[strum(serialize = "stream")]
    Stream,
}

/// One entry of a chat's playback queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackItem {
    pub id: ItemId,
    pub source: MediaSource,
    pub title: String,
    pub requested_by: String,
    /// Chat that receives status messages (may differ from the call's chat).
    pub origin_chat: ChatId,
    pub kind: StreamKind,
    pub duration_secs: u64,
    pub duration_label: String,
    pub played_secs: u64,
    pub speed: SpeedFactor,
    /// Re-encoded file currently streamed instead of the original.
    pub speed_path: Option<PathBuf>,
    /// Location produced by the resolver the last time this item was started.
    pub resolved_location: Option<String>,
    pub pre_speed: Option<TimingSnapshot>,
    pub status_message: Option<MessageHandle>,
    pub template: Option<StatusTemplate>,
}

impl PlaybackItem {
    pub fn new(
        source: MediaSource,
        title: impl Into<String>,
        requested_by: impl Into<String>,
        origin_chat: ChatId,
        kind: StreamKind,
        duration_secs: u64,
    ) -> Self {
        Self {
            id: ItemId::new(),
            source,
            title: title.into(),
            requested_by: requested_by.into(),
            origin_chat,
            kind,
            duration_secs,
            duration_label: timefmt::format_clock(duration_secs),
            played_secs: 0,
            speed: SpeedFactor::Normal,
            speed_path: None,
            resolved_location: None,
            pre_speed: None,
            status_message: None,
            template: None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.source.validate().is_err()
    }

    /// The unmodified media location: the resolved location if the item was
    /// resolved, otherwise the source's own path or URL.
    pub fn base_location(&self) -> Option<String> {
        self.resolved_location
            .clone()
            .or_else(|| self.source.direct_location())
    }

    /// Reset timing when the item (re)starts from the beginning.
    ///
    /// Restores any pre-speed snapshot and drops the derived file.
    pub fn reset_for_replay(&mut self) {
        self.played_secs = 0;
        if let Some(snapshot) = self.pre_speed.take() {
            self.duration_secs = snapshot.duration_secs;
            self.duration_label = snapshot.duration_label;
        }
        self.speed = SpeedFactor::Normal;
        self.speed_path = None;
    }

    /// Whether `location` names the file this item currently streams from.
    pub fn matches_location(&self, location: &Path) -> bool {
        self.base_location()
            .is_some_and(|base| Path::new(&base) == location)
    }
}

/// Audio encoding preset requested from the transport.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Studio,
    #[default]
    High,
    Medium,
    Low,
}

/// Video encoding preset requested from the transport.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    High,
    #[default]
    Medium,
    Low,
}

/// Playback bounds inside a media file, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_secs: u64,
    pub end_secs: u64,
}

impl TimeWindow {
    /// Input options a piped ffmpeg source uses to honour the window.
    pub fn ffmpeg_args(&self) -> String {
        format!(
            "-ss {} -to {}",
            timefmt::format_clock(self.start_secs),
            timefmt::format_clock(self.end_secs)
        )
    }
}

/// Everything the transport needs to start streaming one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub item: ItemId,
    pub location: String,
    pub kind: StreamKind,
    pub audio_quality: AudioQuality,
    /// Present only for video streams.
    pub video_quality: Option<VideoQuality>,
    pub window: Option<TimeWindow>,
    /// Echoed back by the transport in [`TransportEvent::StreamEnded`].
    pub generation: u64,
}

/// Asynchronous notifications raised by a call transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stream started with `generation` played to its natural end.
    StreamEnded { chat: ChatId, generation: u64 },
    /// The number of participants in the chat's call changed.
    ParticipantsChanged { chat: ChatId, count: usize },
}

impl TransportEvent {
    pub fn chat(&self) -> ChatId {
        match self {
            TransportEvent::StreamEnded { chat, .. }
            | TransportEvent::ParticipantsChanged { chat, .. } => *chat,
        }
    }
}

/// Outcome of a media resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Local path or URL ready for streaming.
    Ready(String),
    /// The resolver answered but the media is not available.
    Unavailable,
}

/// A status message the engine asks the notifier to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    NowPlaying {
        lang: String,
        title: String,
        duration_label: String,
        requested_by: String,
        template: StatusTemplate,
    },
    Downloading {
        lang: String,
    },
    PlaybackFailed {
        lang: String,
    },
}

impl StatusUpdate {
    /// Longest title shown in a now-playing caption.
    pub const TITLE_LIMIT: usize = 23;

    pub fn now_playing(item: &PlaybackItem, lang: &str, template: StatusTemplate) -> Self {
        StatusUpdate::NowPlaying {
            lang: lang.to_string(),
            title: item.title.chars().take(Self::TITLE_LIMIT).collect(),
            duration_label: item.duration_label.clone(),
            requested_by: item.requested_by.clone(),
            template,
        }
    }
}
