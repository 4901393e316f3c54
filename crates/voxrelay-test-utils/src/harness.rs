// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine scenarios.
//!
//! `TestHarness` assembles a [`RelayEngine`] over mock collaborators and a
//! temporary speed-cache directory.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use voxrelay_config::model::{AssignmentPolicyKind, AssistantConfig, RelayConfig};
use voxrelay_core::error::RelayError;
use voxrelay_core::types::{AssistantId, ChatId, MediaSource, PlaybackItem, StreamKind};
use voxrelay_engine::RelayEngine;
use voxrelay_engine::session::CallSession;

use crate::mock_notifier::MockNotifier;
use crate::mock_reencoder::MockReencoder;
use crate::mock_resolver::MockResolver;
use crate::mock_store::MockStore;
use crate::mock_transport::MockTransport;

/// Duration given to items built by [`TestHarness::item`].
pub const ITEM_DURATION: u64 = 200;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    assistants: usize,
    unconfigured: Vec<usize>,
    policy: AssignmentPolicyKind,
    grace_secs: u64,
    sweep_interval_secs: u64,
    reencode_timeout_secs: u64,
    worker_idle_secs: u64,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            assistants: 2,
            unconfigured: Vec::new(),
            policy: AssignmentPolicyKind::LeastLoaded,
            grace_secs: 60,
            sweep_interval_secs: 1,
            reencode_timeout_secs: 5,
            worker_idle_secs: 60,
        }
    }

    /// Number of assistant identities (at most 5).
    pub fn with_assistants(mut self, count: usize) -> Self {
        self.assistants = count;
        self
    }

    /// Leave the identity at `index` without a session credential.
    pub fn with_unconfigured(mut self, index: usize) -> Self {
        self.unconfigured.push(index);
        self
    }

    pub fn with_policy(mut self, policy: AssignmentPolicyKind) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_grace_secs(mut self, secs: u64) -> Self {
        self.grace_secs = secs;
        self
    }

    pub fn with_reencode_timeout_secs(mut self, secs: u64) -> Self {
        self.reencode_timeout_secs = secs;
        self
    }

    pub fn with_worker_idle_secs(mut self, secs: u64) -> Self {
        self.worker_idle_secs = secs;
        self
    }

    /// Build the harness, creating the engine and every mock.
    pub fn build(self) -> Result<TestHarness, RelayError> {
        let cache_dir = tempfile::TempDir::new()
            .map_err(|e| RelayError::Internal(format!("cannot create temp dir: {e}")))?;

        let mut config = RelayConfig::default();
        config.assistants = (0..self.assistants)
            .map(|i| AssistantConfig {
                name: format!("assistant-{i}"),
                session: (!self.unconfigured.contains(&i)).then(|| format!("session-{i}")),
            })
            .collect();
        config.pool.policy = self.policy;
        config.transport.join_timeout_secs = 1;
        config.transport.leave_timeout_secs = 1;
        config.transport.change_timeout_secs = 1;
        config.speed.cache_dir = cache_dir.path().join("playback").display().to_string();
        config.speed.reencode_timeout_secs = self.reencode_timeout_secs;
        config.autoend.grace_secs = self.grace_secs;
        config.autoend.sweep_interval_secs = self.sweep_interval_secs;
        config.router.worker_idle_secs = self.worker_idle_secs;

        let transports: Vec<Arc<MockTransport>> = (0..self.assistants)
            .map(|i| Arc::new(MockTransport::new(format!("transport-{i}"))))
            .collect();
        let store = Arc::new(MockStore::new());
        let resolver = Arc::new(MockResolver::new());
        let reencoder = Arc::new(MockReencoder::new());
        let notifier = Arc::new(MockNotifier::new());

        let mut builder = RelayEngine::builder(config)
            .store(store.clone())
            .resolver(resolver.clone())
            .reencoder(reencoder.clone())
            .notifier(notifier.clone());
        for transport in &transports {
            builder = builder.transport(transport.clone());
        }
        let engine = builder.build()?;

        Ok(TestHarness {
            engine,
            transports,
            store,
            resolver,
            reencoder,
            notifier,
            cache_dir,
        })
    }
}

/// A relay engine wired to mock collaborators.
pub struct TestHarness {
    pub engine: RelayEngine,
    /// One transport per assistant, in index order; `transports[0]` backs
    /// `AssistantId(1)`.
    pub transports: Vec<Arc<MockTransport>>,
    pub store: Arc<MockStore>,
    pub resolver: Arc<MockResolver>,
    pub reencoder: Arc<MockReencoder>,
    pub notifier: Arc<MockNotifier>,
    /// Kept alive so the speed cache is cleaned up on drop.
    cache_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn session(&self, chat: ChatId) -> CallSession {
        self.engine.session(chat)
    }

    /// A local-file audio item requested from `chat`.
    pub fn item(&self, chat: ChatId, name: &str) -> PlaybackItem {
        PlaybackItem::new(
            MediaSource::LocalFile(PathBuf::from(format!("/media/{name}.mp3"))),
            name,
            "tester",
            chat,
            StreamKind::Audio,
            ITEM_DURATION,
        )
    }

    /// Speed-cache root inside the harness temp directory.
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir.path().join("playback")
    }

    /// The mock transport of the assistant currently bound to `chat`.
    pub async fn transport_for(&self, chat: ChatId) -> Option<Arc<MockTransport>> {
        let assistant = self.engine.pool().bound(chat).await?;
        self.transport(assistant.id())
    }

    /// The mock transport behind assistant `id` (ids start at 1).
    pub fn transport(&self, id: AssistantId) -> Option<Arc<MockTransport>> {
        let index = id.0.checked_sub(1)?;
        self.transports.get(index).cloned()
    }

    /// Spawns the event router and sweeper; cancel the token to stop them.
    pub fn start(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.engine.start(cancel.clone());
        cancel
    }
}
