// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Settings store trait for per-chat flags kept in an external document store.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ChatId;

/// Accessors for chat settings persisted outside the engine.
///
/// All calls are remote and fallible; the engine never assumes success.
#[async_trait]
pub trait SettingsStore: PluginAdapter {
    /// Remaining loop repetitions for the chat's current item.
    async fn get_loop(&self, chat: ChatId) -> Result<u32, RelayError>;

    async fn set_loop(&self, chat: ChatId, count: u32) -> Result<(), RelayError>;

    /// Language code used to localize status messages.
    async fn get_lang(&self, chat: ChatId) -> Result<String, RelayError>;

    /// Whether idle auto-leave is enabled globally.
    async fn is_autoend_enabled(&self) -> Result<bool, RelayError>;

    async fn add_active_chat(&self, chat: ChatId) -> Result<(), RelayError>;

    async fn remove_active_chat(&self, chat: ChatId) -> Result<(), RelayError>;

    async fn add_active_video_chat(&self, chat: ChatId) -> Result<(), RelayError>;

    async fn remove_active_video_chat(&self, chat: ChatId) -> Result<(), RelayError>;

    /// Whether the chat's stream is currently playing (not paused).
    async fn is_music_on(&self, chat: ChatId) -> Result<bool, RelayError>;

    async fn set_music_on(&self, chat: ChatId, on: bool) -> Result<(), RelayError>;
}
