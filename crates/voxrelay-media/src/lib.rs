// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ffmpeg/ffprobe-backed [`Reencoder`].
//!
//! Speed changes scale video timestamps with `setpts` and audio tempo with
//! `atempo`. Durations come from `ffprobe`'s container metadata.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use voxrelay_core::error::RelayError;
use voxrelay_core::traits::adapter::PluginAdapter;
use voxrelay_core::traits::reencoder::{ReencodeJob, Reencoder};
use voxrelay_core::types::{AdapterType, HealthStatus};

/// Runs ffmpeg and ffprobe as child processes.
///
/// Children are killed when the calling future is dropped, so a caller-side
/// timeout stops the encode.
pub struct FfmpegReencoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegReencoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe(&self) -> &Path {
        &self.ffprobe
    }
}

/// ffmpeg arguments for `job`. The output is overwritten if present.
pub fn encode_args(job: &ReencodeJob) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        job.input.clone().into_os_string(),
        "-filter:v".into(),
        format!("setpts={}*PTS", job.pts_scale).into(),
        "-filter:a".into(),
        format!("atempo={}", job.tempo).into(),
        job.output.clone().into_os_string(),
    ]
}

/// ffprobe arguments that print only the container duration.
pub fn probe_args(path: &Path) -> Vec<OsString> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path.as_os_str().to_owned(),
    ]
}

/// Parses ffprobe's duration output into whole seconds.
pub fn parse_duration(stdout: &str) -> Option<u64> {
    let secs: f64 = stdout.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| secs.round() as u64)
}

async fn run(program: &Path, args: Vec<OsString>) -> Result<Output, RelayError> {
    debug!(program = %program.display(), ?args, "spawning media tool");
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| RelayError::Reencode {
            message: format!("failed to run {}: {e}", program.display()),
            source: Some(Box::new(e)),
        })
}

fn failure(program: &Path, output: &Output) -> RelayError {
    let exit_code = output.status.code().unwrap_or(-1);
    let stderr = String::from_utf8_lossy(&output.stderr);
    RelayError::Reencode {
        message: format!(
            "{} exited with code {exit_code}: {}",
            program.display(),
            stderr.trim()
        ),
        source: None,
    }
}

#[async_trait]
impl PluginAdapter for FfmpegReencoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Reencoder
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        match run(&self.ffmpeg, vec!["-version".into()]).await {
            Ok(output) if output.status.success() => Ok(HealthStatus::Healthy),
            Ok(output) => Ok(HealthStatus::Unhealthy(
                failure(&self.ffmpeg, &output).to_string(),
            )),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl Reencoder for FfmpegReencoder {
    async fn reencode(&self, job: &ReencodeJob) -> Result<(), RelayError> {
        let output = run(&self.ffmpeg, encode_args(job)).await?;
        if !output.status.success() {
            return Err(failure(&self.ffmpeg, &output));
        }
        debug!(output = %job.output.display(), "re-encode finished");
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<u64, RelayError> {
        let output = run(&self.ffprobe, probe_args(path)).await?;
        if !output.status.success() {
            return Err(failure(&self.ffprobe, &output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_duration(&stdout).ok_or_else(|| RelayError::Reencode {
            message: format!(
                "unexpected ffprobe output for `{}`: {}",
                path.display(),
                stdout.trim()
            ),
            source: None,
        })
    }
}
