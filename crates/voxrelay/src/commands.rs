// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand bodies, kept free of process exit and printing.

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use voxrelay_config::RelayConfig;
use voxrelay_core::{AssistantId, RelayError, Reencoder, SpeedFactor};
use voxrelay_engine::speed::{SpeedCache, SpeedEntry};

/// One line per configured identity, in pool index order.
pub fn roster(config: &RelayConfig) -> Vec<String> {
    let mut lines: Vec<String> = config
        .assistants
        .iter()
        .enumerate()
        .map(|(i, assistant)| {
            let state = if assistant.is_configured() {
                "ready"
            } else {
                "no session"
            };
            format!("{} {}: {state}", AssistantId(i + 1), assistant.name)
        })
        .collect();
    if lines.is_empty() {
        lines.push("no assistants configured".to_string());
    }
    lines
}

/// Encode (or reuse) the derived copy of `file` at `factor` under the
/// configured cache directory.
pub async fn run_speed(
    config: &RelayConfig,
    reencoder: Arc<dyn Reencoder + Send + Sync>,
    file: &Path,
    factor: SpeedFactor,
) -> Result<SpeedEntry, RelayError> {
    let cache = SpeedCache::new(
        &config.speed.cache_dir,
        reencoder,
        config.speed.reencode_timeout(),
    );
    let entry = cache.get_or_encode(file, factor).await?;
    info!(path = %entry.path.display(), speed = %factor, "derived file ready");
    Ok(entry)
}

pub async fn run_probe(
    reencoder: Arc<dyn Reencoder + Send + Sync>,
    file: &Path,
) -> Result<u64, RelayError> {
    reencoder.probe_duration(file).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxrelay_config::model::AssistantConfig;
    use voxrelay_test_utils::MockReencoder;

    #[test]
    fn roster_marks_identities_without_session() {
        let mut config = RelayConfig::default();
        config.assistants = vec![
            AssistantConfig {
                name: "alpha".into(),
                session: Some("s".into()),
            },
            AssistantConfig {
                name: "beta".into(),
                session: None,
            },
        ];
        let lines = roster(&config);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "#1 alpha: ready");
        assert_eq!(lines[1], "#2 beta: no session");
    }

    #[test]
    fn roster_reports_empty_pool() {
        let lines = roster(&RelayConfig::default());
        assert_eq!(lines, vec!["no assistants configured".to_string()]);
    }

    #[tokio::test]
    async fn speed_writes_into_configured_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RelayConfig::default();
        config.speed.cache_dir = dir.path().join("playback").display().to_string();
        let reencoder = Arc::new(MockReencoder::new());

        let entry = run_speed(
            &config,
            reencoder.clone(),
            Path::new("/media/song.mp3"),
            SpeedFactor::Double,
        )
        .await
        .unwrap();

        assert_eq!(entry.path.parent(), Some(dir.path().join("playback/2.0").as_path()));
        assert!(entry.path.exists());
        assert_eq!(entry.duration_secs, MockReencoder::DEFAULT_DURATION / 2);
        assert_eq!(reencoder.encode_count(), 1);
    }

    #[tokio::test]
    async fn speed_rejects_normal_factor() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RelayConfig::default();
        config.speed.cache_dir = dir.path().display().to_string();
        let err = run_speed(
            &config,
            Arc::new(MockReencoder::new()),
            Path::new("/media/song.mp3"),
            SpeedFactor::Normal,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedSpeed(_)));
    }

    #[tokio::test]
    async fn probe_reports_duration() {
        let reencoder = Arc::new(MockReencoder::new());
        reencoder.set_duration("/media/song.mp3", 245).await;
        let secs = run_probe(reencoder, Path::new("/media/song.mp3")).await.unwrap();
        assert_eq!(secs, 245);
    }
}
