// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-through cache of speed-adjusted media files.
//!
//! Derived files live at `<root>/<speed>/<stem>-<path digest>.<ext>`. A (source, speed)
//! pair is encoded at most once at a time: concurrent callers share one
//! in-flight encode through a per-key [`OnceCell`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use voxrelay_core::error::RelayError;
use voxrelay_core::types::SpeedFactor;
use voxrelay_core::{ReencodeJob, Reencoder};

/// A derived file and its probed duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedEntry {
    pub path: PathBuf,
    pub duration_secs: u64,
}

type CacheKey = (PathBuf, SpeedFactor);

pub struct SpeedCache {
    root: PathBuf,
    reencoder: Arc<dyn Reencoder + Send + Sync>,
    timeout: Duration,
    entries: DashMap<CacheKey, Arc<OnceCell<SpeedEntry>>>,
}

impl SpeedCache {
    pub fn new(
        root: impl Into<PathBuf>,
        reencoder: Arc<dyn Reencoder + Send + Sync>,
        timeout: Duration,
    ) -> Self {
        Self {
            root: root.into(),
            reencoder,
            timeout,
            entries: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reencoder(&self) -> &Arc<dyn Reencoder + Send + Sync> {
        &self.reencoder
    }

    /// Where the derived file for `source` at `factor` is stored.
    ///
    /// The name is `<stem>-<digest>.<ext>`, where the digest covers the full
    /// source path, so same-named files in different directories never share
    /// a derived file.
    pub fn derived_path(&self, source: &Path, factor: SpeedFactor) -> Result<PathBuf, RelayError> {
        let stem = source.file_stem().ok_or_else(|| RelayError::Reencode {
            message: format!("source `{}` has no file name", source.display()),
            source: None,
        })?;
        let mut name = stem.to_os_string();
        name.push("-");
        name.push(source_digest(source));
        if let Some(ext) = source.extension() {
            name.push(".");
            name.push(ext);
        }
        Ok(self.root.join(factor.to_string()).join(name))
    }

    /// Returns the derived file for (`source`, `factor`), encoding it on a miss.
    ///
    /// A cached entry whose file has disappeared from disk is dropped and
    /// encoded again. The encode is bounded by the configured timeout.
    pub async fn get_or_encode(
        &self,
        source: &Path,
        factor: SpeedFactor,
    ) -> Result<SpeedEntry, RelayError> {
        if factor.is_normal() {
            return Err(RelayError::UnsupportedSpeed(
                "1.0 plays the original file".to_string(),
            ));
        }

        let key: CacheKey = (source.to_path_buf(), factor);
        let mut cell = self.cell(&key);

        if let Some(entry) = cell.get() {
            if path_exists(&entry.path).await {
                debug!(path = %entry.path.display(), speed = %factor, "speed cache hit");
                return Ok(entry.clone());
            }
            debug!(path = %entry.path.display(), "derived file missing, encoding again");
            self.entries
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
            cell = self.cell(&key);
        }

        let entry = cell
            .get_or_try_init(|| self.encode(source, factor))
            .await?;
        Ok(entry.clone())
    }

    /// The cached entry for (`source`, `factor`), if one has been produced.
    pub fn cached(&self, source: &Path, factor: SpeedFactor) -> Option<SpeedEntry> {
        self.entries
            .get(&(source.to_path_buf(), factor))
            .and_then(|cell| cell.get().cloned())
    }

    fn cell(&self, key: &CacheKey) -> Arc<OnceCell<SpeedEntry>> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    async fn encode(&self, source: &Path, factor: SpeedFactor) -> Result<SpeedEntry, RelayError> {
        let output = self.derived_path(source, factor)?;

        if path_exists(&output).await {
            let duration_secs = self.reencoder.probe_duration(&output).await?;
            info!(path = %output.display(), "reusing derived file left on disk");
            return Ok(SpeedEntry {
                path: output,
                duration_secs,
            });
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RelayError::Reencode {
                    message: format!("cannot create `{}`", parent.display()),
                    source: Some(Box::new(e)),
                })?;
        }

        let job = ReencodeJob {
            input: source.to_path_buf(),
            output: output.clone(),
            pts_scale: factor.pts_scale(),
            tempo: factor.tempo(),
        };

        info!(source = %source.display(), speed = %factor, "re-encoding for speed change");
        match tokio::time::timeout(self.timeout, self.reencoder.reencode(&job)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                remove_partial(&output).await;
                return Err(e);
            }
            Err(_) => {
                warn!(source = %source.display(), speed = %factor, timeout = ?self.timeout, "re-encode timed out");
                remove_partial(&output).await;
                return Err(RelayError::ReencodeTimeout {
                    duration: self.timeout,
                });
            }
        }

        let duration_secs = self.reencoder.probe_duration(&output).await?;
        Ok(SpeedEntry {
            path: output,
            duration_secs,
        })
    }
}

/// First 16 hex digits of the SHA-256 of the source path.
fn source_digest(source: &Path) -> String {
    let digest = Sha256::digest(source.as_os_str().as_encoded_bytes());
    hex::encode(&digest[..8])
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        debug!(path = %path.display(), error = %e, "could not remove partial output");
    }
}
