// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call transport trait: one relay account's connection to group calls.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChatId, StreamDescriptor, TransportEvent};

/// Adapter for the group-call transport bound to a single relay account.
///
/// Join failures are reported with the typed variants
/// [`RelayError::NoActiveCallEndpoint`], [`RelayError::AlreadyJoined`] and
/// [`RelayError::TransportServerError`]. Every method may block on the network.
#[async_trait]
pub trait CallTransport: PluginAdapter {
    /// Joins the chat's call and starts streaming `stream`.
    async fn join(&self, chat: ChatId, stream: &StreamDescriptor) -> Result<(), RelayError>;

    /// Leaves the chat's call.
    async fn leave(&self, chat: ChatId) -> Result<(), RelayError>;

    /// Switches the running stream without leaving the call.
    async fn change_stream(
        &self,
        chat: ChatId,
        stream: &StreamDescriptor,
    ) -> Result<(), RelayError>;

    /// Pauses the running stream.
    async fn pause(&self, chat: ChatId) -> Result<(), RelayError>;

    /// Resumes a paused stream.
    async fn resume(&self, chat: ChatId) -> Result<(), RelayError>;

    /// Returns the number of participants currently in the chat's call, the relay included.
    async fn participant_count(&self, chat: ChatId) -> Result<usize, RelayError>;

    /// Waits for the next asynchronous event.
    ///
    /// Returns [`RelayError::TransportClosed`] once no further events will arrive.
    async fn next_event(&self) -> Result<TransportEvent, RelayError>;
}
