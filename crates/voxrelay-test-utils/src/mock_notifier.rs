// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock status notifier that captures posted updates.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use voxrelay_core::error::RelayError;
use voxrelay_core::traits::adapter::PluginAdapter;
use voxrelay_core::traits::notifier::StatusNotifier;
use voxrelay_core::types::{AdapterType, ChatId, HealthStatus, MessageHandle, StatusUpdate};

/// A mock notifier with an outbox for assertions.
pub struct MockNotifier {
    outbox: Mutex<Vec<(ChatId, StatusUpdate)>>,
    deleted: Mutex<Vec<(ChatId, MessageHandle)>>,
    next: AtomicUsize,
    fail: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            outbox: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            next: AtomicUsize::new(1),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every post and delete fail while set.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn outbox(&self) -> Vec<(ChatId, StatusUpdate)> {
        self.outbox.lock().await.clone()
    }

    pub async fn deleted(&self) -> Vec<(ChatId, MessageHandle)> {
        self.deleted.lock().await.clone()
    }

    /// Titles of every now-playing update, oldest first.
    pub async fn now_playing_titles(&self) -> Vec<String> {
        self.outbox
            .lock()
            .await
            .iter()
            .filter_map(|(_, update)| match update {
                StatusUpdate::NowPlaying { title, .. } => Some(title.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockNotifier {
    fn name(&self) -> &str {
        "mock-notifier"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl StatusNotifier for MockNotifier {
    async fn post(&self, chat: ChatId, update: StatusUpdate) -> Result<MessageHandle, RelayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::Notify {
                message: "mock notifier failure".to_string(),
            });
        }
        self.outbox.lock().await.push((chat, update));
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(MessageHandle(format!("msg-{n}")))
    }

    async fn delete(&self, chat: ChatId, handle: &MessageHandle) -> Result<(), RelayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::Notify {
                message: "mock notifier failure".to_string(),
            });
        }
        self.deleted.lock().await.push((chat, handle.clone()));
        Ok(())
    }
}
