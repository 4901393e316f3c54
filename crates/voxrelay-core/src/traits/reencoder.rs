// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Re-encoder trait used to derive speed-changed copies of media files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;

/// A single speed re-encode request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReencodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Video presentation-timestamp multiplier.
    pub pts_scale: f32,
    /// Audio tempo multiplier.
    pub tempo: f32,
}

/// Adapter wrapping an external encoder process.
#[async_trait]
pub trait Reencoder: PluginAdapter {
    /// Writes the re-encoded media to `job.output`.
    async fn reencode(&self, job: &ReencodeJob) -> Result<(), RelayError>;

    /// Returns the media duration in whole seconds.
    async fn probe_duration(&self, path: &Path) -> Result<u64, RelayError>;
}
