// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock re-encoder that writes placeholder files and counts encodes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use voxrelay_core::error::RelayError;
use voxrelay_core::traits::adapter::PluginAdapter;
use voxrelay_core::traits::reencoder::{ReencodeJob, Reencoder};
use voxrelay_core::types::{AdapterType, HealthStatus};

/// A mock re-encoder.
///
/// Unknown inputs are treated as `DEFAULT_DURATION` seconds long. A finished
/// job registers the output's duration as the input's scaled by `pts_scale`.
pub struct MockReencoder {
    encodes: AtomicUsize,
    delay_ms: AtomicU64,
    hang: AtomicBool,
    fail: AtomicBool,
    durations: Mutex<HashMap<PathBuf, u64>>,
    jobs: Mutex<Vec<ReencodeJob>>,
}

impl MockReencoder {
    pub const DEFAULT_DURATION: u64 = 100;

    pub fn new() -> Self {
        Self {
            encodes: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
            hang: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            durations: Mutex::new(HashMap::new()),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Number of encodes started.
    pub fn encode_count(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make encodes never finish while set.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn set_duration(&self, path: impl Into<PathBuf>, secs: u64) {
        self.durations.lock().await.insert(path.into(), secs);
    }

    pub async fn jobs(&self) -> Vec<ReencodeJob> {
        self.jobs.lock().await.clone()
    }

    async fn duration_of(&self, path: &Path) -> u64 {
        self.durations
            .lock()
            .await
            .get(path)
            .copied()
            .unwrap_or(Self::DEFAULT_DURATION)
    }
}

impl Default for MockReencoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockReencoder {
    fn name(&self) -> &str {
        "mock-reencoder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Reencoder
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl Reencoder for MockReencoder {
    async fn reencode(&self, job: &ReencodeJob) -> Result<(), RelayError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().await.push(job.clone());

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::Reencode {
                message: "mock encoder failure".to_string(),
                source: None,
            });
        }

        tokio::fs::write(&job.output, b"derived")
            .await
            .map_err(|e| RelayError::Reencode {
                message: format!("cannot write `{}`", job.output.display()),
                source: Some(Box::new(e)),
            })?;
        let input = self.duration_of(&job.input).await;
        let output = (input as f64 * f64::from(job.pts_scale)).round() as u64;
        self.durations
            .lock()
            .await
            .insert(job.output.clone(), output);
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<u64, RelayError> {
        Ok(self.duration_of(path).await)
    }
}
