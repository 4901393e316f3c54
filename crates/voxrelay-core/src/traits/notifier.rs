// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status notifier trait for posting playback status to chats.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChatId, MessageHandle, StatusUpdate};

/// Adapter that renders and posts status messages.
///
/// The engine treats every call as best-effort: failures are logged, never propagated.
#[async_trait]
pub trait StatusNotifier: PluginAdapter {
    /// Posts a status message and returns a handle for later edits.
    async fn post(&self, chat: ChatId, update: StatusUpdate) -> Result<MessageHandle, RelayError>;

    /// Deletes a previously posted message.
    async fn delete(&self, chat: ChatId, handle: &MessageHandle) -> Result<(), RelayError>;
}
