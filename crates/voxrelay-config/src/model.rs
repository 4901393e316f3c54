// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Voxrelay media relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use voxrelay_core::types::{AudioQuality, VideoQuality};

/// Maximum number of relay accounts a deployment may configure.
pub const MAX_ASSISTANTS: usize = 5;

/// Top-level Voxrelay configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub relay: RelaySection,

    /// Relay accounts, in pool index order (1..=5).
    #[serde(default)]
    pub assistants: Vec<AssistantConfig>,

    /// Assistant selection settings.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Call transport timeouts.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Stream quality presets.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Speed re-encode settings.
    #[serde(default)]
    pub speed: SpeedConfig,

    /// Idle auto-leave settings.
    #[serde(default)]
    pub autoend: AutoEndConfig,

    /// Transport event routing settings.
    #[serde(default)]
    pub router: RouterConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    /// Display name used in logs.
    #[serde(default = "default_relay_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            name: default_relay_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_relay_name() -> String {
    "voxrelay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One relay account ("assistant").
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantConfig {
    /// Unique name of the account.
    pub name: String,

    /// Session credential. An assistant without one is skipped by the pool.
    #[serde(default)]
    pub session: Option<String>,
}

impl AssistantConfig {
    pub fn is_configured(&self) -> bool {
        self.session
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

/// How the pool picks an assistant for a chat that has none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentPolicyKind {
    /// Free assistant with the fewest chats served so far.
    #[default]
    LeastLoaded,
    /// Cycle through assistants in index order.
    RoundRobin,
}

/// Assistant pool configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    #[serde(default)]
    pub policy: AssignmentPolicyKind,
}

/// Call transport timeouts. Distinct from stream durations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    #[serde(default = "default_leave_timeout_secs")]
    pub leave_timeout_secs: u64,

    /// Timeout for change-stream, pause and resume.
    #[serde(default = "default_change_timeout_secs")]
    pub change_timeout_secs: u64,
}

impl TransportConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn leave_timeout(&self) -> Duration {
        Duration::from_secs(self.leave_timeout_secs)
    }

    pub fn change_timeout(&self) -> Duration {
        Duration::from_secs(self.change_timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            join_timeout_secs: default_join_timeout_secs(),
            leave_timeout_secs: default_leave_timeout_secs(),
            change_timeout_secs: default_change_timeout_secs(),
        }
    }
}

fn default_join_timeout_secs() -> u64 {
    15
}

fn default_leave_timeout_secs() -> u64 {
    10
}

fn default_change_timeout_secs() -> u64 {
    15
}

/// Quality presets forwarded in every stream descriptor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    #[serde(default)]
    pub audio_quality: AudioQuality,

    #[serde(default)]
    pub video_quality: VideoQuality,
}

/// Speed re-encode configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpeedConfig {
    /// Root directory for derived files (`<cache_dir>/<speed>/<stem>-<path digest>.<ext>`).
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Upper bound for one re-encode.
    #[serde(default = "default_reencode_timeout_secs")]
    pub reencode_timeout_secs: u64,

    /// ffmpeg executable.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// ffprobe executable.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
}

impl SpeedConfig {
    pub fn reencode_timeout(&self) -> Duration {
        Duration::from_secs(self.reencode_timeout_secs)
    }
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            reencode_timeout_secs: default_reencode_timeout_secs(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

fn default_cache_dir() -> String {
    "playback".to_string()
}

fn default_reencode_timeout_secs() -> u64 {
    600
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

/// Idle auto-leave configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AutoEndConfig {
    /// Grace period after the relay is left alone in a call.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// How often the sweeper checks deadlines.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl AutoEndConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for AutoEndConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_grace_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    15
}

/// Transport event routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Idle lifetime of a per-chat event worker.
    #[serde(default = "default_worker_idle_secs")]
    pub worker_idle_secs: u64,
}

impl RouterConfig {
    pub fn worker_idle(&self) -> Duration {
        Duration::from_secs(self.worker_idle_secs)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            worker_idle_secs: default_worker_idle_secs(),
        }
    }
}

fn default_worker_idle_secs() -> u64 {
    300
}
