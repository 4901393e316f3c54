// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory settings store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use voxrelay_core::error::RelayError;
use voxrelay_core::traits::adapter::PluginAdapter;
use voxrelay_core::traits::store::SettingsStore;
use voxrelay_core::types::{AdapterType, ChatId, HealthStatus};

/// A mock settings store whose flags can be inspected and whose calls can be
/// made to fail.
pub struct MockStore {
    loops: Mutex<HashMap<ChatId, u32>>,
    langs: Mutex<HashMap<ChatId, String>>,
    autoend: AtomicBool,
    active: Mutex<HashSet<ChatId>>,
    active_video: Mutex<HashSet<ChatId>>,
    music: Mutex<HashMap<ChatId, bool>>,
    failing: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            loops: Mutex::new(HashMap::new()),
            langs: Mutex::new(HashMap::new()),
            autoend: AtomicBool::new(false),
            active: Mutex::new(HashSet::new()),
            active_video: Mutex::new(HashSet::new()),
            music: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_autoend(&self, enabled: bool) {
        self.autoend.store(enabled, Ordering::SeqCst);
    }

    /// Make every call fail while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn set_lang(&self, chat: ChatId, lang: impl Into<String>) {
        self.langs.lock().await.insert(chat, lang.into());
    }

    pub async fn is_active(&self, chat: ChatId) -> bool {
        self.active.lock().await.contains(&chat)
    }

    pub async fn is_active_video(&self, chat: ChatId) -> bool {
        self.active_video.lock().await.contains(&chat)
    }

    pub async fn music_on(&self, chat: ChatId) -> bool {
        self.music.lock().await.get(&chat).copied().unwrap_or(false)
    }

    pub async fn stored_loop(&self, chat: ChatId) -> u32 {
        self.loops.lock().await.get(&chat).copied().unwrap_or(0)
    }

    fn check(&self) -> Result<(), RelayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayError::storage("mock store unavailable"));
        }
        Ok(())
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockStore {
    fn name(&self) -> &str {
        "mock-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MockStore {
    async fn get_loop(&self, chat: ChatId) -> Result<u32, RelayError> {
        self.check()?;
        Ok(self.stored_loop(chat).await)
    }

    async fn set_loop(&self, chat: ChatId, count: u32) -> Result<(), RelayError> {
        self.check()?;
        self.loops.lock().await.insert(chat, count);
        Ok(())
    }

    async fn get_lang(&self, chat: ChatId) -> Result<String, RelayError> {
        self.check()?;
        Ok(self
            .langs
            .lock()
            .await
            .get(&chat)
            .cloned()
            .unwrap_or_else(|| "en".to_string()))
    }

    async fn is_autoend_enabled(&self) -> Result<bool, RelayError> {
        self.check()?;
        Ok(self.autoend.load(Ordering::SeqCst))
    }

    async fn add_active_chat(&self, chat: ChatId) -> Result<(), RelayError> {
        self.check()?;
        self.active.lock().await.insert(chat);
        Ok(())
    }

    async fn remove_active_chat(&self, chat: ChatId) -> Result<(), RelayError> {
        self.check()?;
        self.active.lock().await.remove(&chat);
        Ok(())
    }

    async fn add_active_video_chat(&self, chat: ChatId) -> Result<(), RelayError> {
        self.check()?;
        self.active_video.lock().await.insert(chat);
        Ok(())
    }

    async fn remove_active_video_chat(&self, chat: ChatId) -> Result<(), RelayError> {
        self.check()?;
        self.active_video.lock().await.remove(&chat);
        Ok(())
    }

    async fn is_music_on(&self, chat: ChatId) -> Result<bool, RelayError> {
        self.check()?;
        Ok(self.music_on(chat).await)
    }

    async fn set_music_on(&self, chat: ChatId, on: bool) -> Result<(), RelayError> {
        self.check()?;
        self.music.lock().await.insert(chat, on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flags_round_trip() {
        let store = MockStore::new();
        store.add_active_chat(ChatId(1)).await.unwrap();
        store.set_music_on(ChatId(1), true).await.unwrap();
        assert!(store.is_active(ChatId(1)).await);
        assert!(store.is_music_on(ChatId(1)).await.unwrap());

        store.remove_active_chat(ChatId(1)).await.unwrap();
        assert!(!store.is_active(ChatId(1)).await);
    }

    #[tokio::test]
    async fn failing_store_rejects_calls() {
        let store = MockStore::new();
        store.set_failing(true);
        assert!(store.get_loop(ChatId(1)).await.is_err());
        assert!(store.add_active_chat(ChatId(1)).await.is_err());
    }

    #[tokio::test]
    async fn language_defaults_to_english() {
        let store = MockStore::new();
        assert_eq!(store.get_lang(ChatId(1)).await.unwrap(), "en");
        store.set_lang(ChatId(1), "de").await;
        assert_eq!(store.get_lang(ChatId(1)).await.unwrap(), "de");
    }
}
