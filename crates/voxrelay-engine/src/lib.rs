// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session engine for the Voxrelay media relay.
//!
//! The [`RelayEngine`] owns every piece of shared state:
//! - the [`AssistantPool`](pool::AssistantPool) and its chat bindings
//! - per-chat [`PlaybackQueues`](queue::PlaybackQueues)
//! - the [`SpeedCache`](speed::SpeedCache) of re-encoded files
//! - the [`AutoEndMonitor`](autoend::AutoEndMonitor) deadlines
//!
//! Callers work with a chat through [`RelayEngine::session`], which returns a
//! [`CallSession`](session::CallSession) handle. Transport events reach the
//! sessions through the [`StreamEventRouter`](router::StreamEventRouter).

pub mod autoend;
pub mod pool;
pub mod queue;
pub mod router;
pub mod session;
pub mod shutdown;
pub mod speed;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use voxrelay_config::model::RelayConfig;
use voxrelay_core::error::RelayError;
use voxrelay_core::types::{AssistantId, ChatId, HealthStatus, PlaybackItem};
use voxrelay_core::{CallTransport, MediaResolver, Reencoder, SettingsStore, StatusNotifier};

use crate::autoend::AutoEndMonitor;
use crate::pool::{Assistant, AssignmentPolicy, AssistantPool, policy_for};
use crate::queue::PlaybackQueues;
use crate::router::StreamEventRouter;
use crate::session::{CallSession, CallState, SessionRecord};
use crate::speed::SpeedCache;

/// State shared by every session handle.
pub(crate) struct EngineShared {
    pub(crate) config: RelayConfig,
    pub(crate) pool: AssistantPool,
    pub(crate) queues: PlaybackQueues,
    pub(crate) speed: SpeedCache,
    pub(crate) autoend: AutoEndMonitor,
    pub(crate) store: Arc<dyn SettingsStore + Send + Sync>,
    pub(crate) resolver: Arc<dyn MediaResolver + Send + Sync>,
    pub(crate) notifier: Arc<dyn StatusNotifier + Send + Sync>,
    pub(crate) sessions: DashMap<ChatId, SessionRecord>,
    pub(crate) locks: DashMap<ChatId, Arc<Mutex<()>>>,
    generation: AtomicU64,
}

impl EngineShared {
    /// Next stream generation. Unique across all chats.
    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// The relay engine. Cheap to clone.
#[derive(Clone)]
pub struct RelayEngine {
    shared: Arc<EngineShared>,
}

impl RelayEngine {
    pub fn builder(config: RelayConfig) -> RelayEngineBuilder {
        RelayEngineBuilder::new(config)
    }

    /// Handle to `chat`'s call session. Creating a handle has no side effects.
    pub fn session(&self, chat: ChatId) -> CallSession {
        CallSession::new(chat, Arc::clone(&self.shared))
    }

    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }

    pub fn pool(&self) -> &AssistantPool {
        &self.shared.pool
    }

    pub fn queues(&self) -> &PlaybackQueues {
        &self.shared.queues
    }

    pub fn speed_cache(&self) -> &SpeedCache {
        &self.shared.speed
    }

    pub fn autoend(&self) -> &AutoEndMonitor {
        &self.shared.autoend
    }

    /// Appends `item` to `chat`'s queue without touching the call.
    ///
    /// Returns the item's position (0 = current).
    pub fn enqueue(&self, chat: ChatId, item: PlaybackItem) -> Result<usize, RelayError> {
        item.source.validate()?;
        Ok(self.shared.queues.enqueue(chat, item))
    }

    /// Chats with a session in any non-idle state, in ascending order.
    pub fn live_chats(&self) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self
            .shared
            .sessions
            .iter()
            .filter(|r| r.state != CallState::Idle)
            .map(|r| *r.key())
            .collect();
        chats.sort();
        chats
    }

    /// Aggregated health of the configured assistants' transports.
    pub async fn health(&self) -> HealthStatus {
        let configured: Vec<&Arc<Assistant>> = self
            .shared
            .pool
            .assistants()
            .iter()
            .filter(|a| a.is_configured())
            .collect();
        if configured.is_empty() {
            return HealthStatus::Unhealthy("no configured assistants".to_string());
        }

        let mut reasons = Vec::new();
        for assistant in configured {
            match assistant.transport().health_check().await {
                Ok(HealthStatus::Healthy) => {}
                Ok(HealthStatus::Degraded(reason)) | Ok(HealthStatus::Unhealthy(reason)) => {
                    reasons.push(format!("{}: {reason}", assistant.name()));
                }
                Err(e) => reasons.push(format!("{}: {e}", assistant.name())),
            }
        }

        if reasons.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(reasons.join("; "))
        }
    }

    pub fn router(&self) -> StreamEventRouter {
        StreamEventRouter::new(self.clone(), self.shared.config.router.worker_idle())
    }

    /// Spawns the event router and the auto-end sweeper.
    ///
    /// Both stop when `cancel` fires.
    pub fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let router = tokio::spawn(self.router().run(cancel.clone()));
        let sweeper = tokio::spawn(AutoEndMonitor::run_sweeper(
            self.clone(),
            self.shared.config.autoend.sweep_interval(),
            cancel,
        ));
        info!("relay engine started");
        vec![router, sweeper]
    }
}

/// Assembles a [`RelayEngine`] from config and collaborators.
///
/// Transports pair with `config.assistants` by index.
pub struct RelayEngineBuilder {
    config: RelayConfig,
    transports: Vec<Arc<dyn CallTransport + Send + Sync>>,
    store: Option<Arc<dyn SettingsStore + Send + Sync>>,
    resolver: Option<Arc<dyn MediaResolver + Send + Sync>>,
    notifier: Option<Arc<dyn StatusNotifier + Send + Sync>>,
    reencoder: Option<Arc<dyn Reencoder + Send + Sync>>,
    policy: Option<Box<dyn AssignmentPolicy>>,
}

impl RelayEngineBuilder {
    fn new(config: RelayConfig) -> Self {
        Self {
            config,
            transports: Vec::new(),
            store: None,
            resolver: None,
            notifier: None,
            reencoder: None,
            policy: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn CallTransport + Send + Sync>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn SettingsStore + Send + Sync>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn MediaResolver + Send + Sync>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn StatusNotifier + Send + Sync>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn reencoder(mut self, reencoder: Arc<dyn Reencoder + Send + Sync>) -> Self {
        self.reencoder = Some(reencoder);
        self
    }

    /// Overrides the policy named in `config.pool.policy`.
    pub fn policy(mut self, policy: Box<dyn AssignmentPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<RelayEngine, RelayError> {
        let config = self.config;
        if self.transports.len() != config.assistants.len() {
            return Err(RelayError::Config(format!(
                "{} assistants configured but {} transports supplied",
                config.assistants.len(),
                self.transports.len()
            )));
        }
        let store = self
            .store
            .ok_or_else(|| RelayError::Config("settings store is required".to_string()))?;
        let resolver = self
            .resolver
            .ok_or_else(|| RelayError::Config("media resolver is required".to_string()))?;
        let notifier = self
            .notifier
            .ok_or_else(|| RelayError::Config("status notifier is required".to_string()))?;
        let reencoder = self
            .reencoder
            .ok_or_else(|| RelayError::Config("re-encoder is required".to_string()))?;

        let assistants: Vec<Assistant> = config
            .assistants
            .iter()
            .zip(self.transports)
            .enumerate()
            .map(|(index, (entry, transport))| {
                Assistant::new(AssistantId(index + 1), &entry.name, entry.is_configured(), transport)
            })
            .collect();
        if !assistants.iter().any(Assistant::is_configured) {
            warn!("no assistant has a session credential, every join will fail");
        }

        let policy = self.policy.unwrap_or_else(|| policy_for(config.pool.policy));
        let speed = SpeedCache::new(
            PathBuf::from(&config.speed.cache_dir),
            reencoder,
            config.speed.reencode_timeout(),
        );
        let autoend = AutoEndMonitor::new(config.autoend.grace());

        info!(
            relay = config.relay.name.as_str(),
            assistants = assistants.len(),
            "relay engine initialized"
        );

        Ok(RelayEngine {
            shared: Arc::new(EngineShared {
                pool: AssistantPool::new(assistants, policy),
                queues: PlaybackQueues::new(),
                speed,
                autoend,
                store,
                resolver,
                notifier,
                sessions: DashMap::new(),
                locks: DashMap::new(),
                generation: AtomicU64::new(0),
                config,
            }),
        })
    }
}
