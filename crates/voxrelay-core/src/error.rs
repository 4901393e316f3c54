// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Voxrelay media relay.

use std::time::Duration;

use thiserror::Error;

use crate::types::{ChatId, ResolveTag};

/// The primary error type used across all Voxrelay collaborator traits and engine operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No configured assistant is free to serve the chat.
    #[error("no assistant available for chat {chat}")]
    NoAssistantAvailable { chat: ChatId },

    /// The chat has no voice/video call running that the assistant could join.
    #[error("no active call endpoint in chat {chat}")]
    NoActiveCallEndpoint { chat: ChatId },

    /// The assistant is already present in the chat's call.
    #[error("assistant already joined the call in chat {chat}")]
    AlreadyJoined { chat: ChatId },

    /// The platform reported a server-side failure while handling a call operation.
    #[error("transport server error: {message}")]
    TransportServerError { message: String },

    /// Any other transport failure (connection reset, protocol error, not in call).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The transport's event stream has ended.
    #[error("transport event stream closed")]
    TransportClosed,

    /// A speed re-encode did not finish within its budget.
    #[error("re-encode timed out after {duration:?}")]
    ReencodeTimeout { duration: Duration },

    /// The external encoder failed.
    #[error("re-encode failed: {message}")]
    Reencode {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The chat's queue has no current item.
    #[error("no active item in chat {chat}")]
    NoActiveItem { chat: ChatId },

    /// A queue entry whose source reference cannot be classified.
    #[error("malformed queue entry: {reason}")]
    MalformedQueueEntry { reason: String },

    /// A tagged source could not be turned into a playable location.
    #[error("could not resolve {tag} source `{id}`")]
    ResolutionFailed { tag: ResolveTag, id: String },

    /// The playing item changed while a speed request was in flight.
    #[error("assistant busy: item playing in chat {chat} no longer matches the request")]
    AssistantBusy { chat: ChatId },

    /// The operation is not valid in the session's current state.
    #[error("chat {chat} is {state}, operation requires {required}")]
    InvalidState {
        chat: ChatId,
        state: String,
        required: &'static str,
    },

    /// Requested playback speed is not in the supported table.
    #[error("unsupported playback speed {0}")]
    UnsupportedSpeed(String),

    /// Seek target lies outside the current item.
    #[error("seek to {offset_secs}s is outside the item duration of {duration_secs}s")]
    SeekOutOfRange { offset_secs: u64, duration_secs: u64 },

    /// Settings store errors (connection failure, missing document, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Status notification could not be delivered.
    #[error("notify error: {message}")]
    Notify { message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration errors surfaced at runtime.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Shorthand for a transport error with no underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        RelayError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a storage error from any displayable cause.
    pub fn storage(message: impl Into<String>) -> Self {
        RelayError::Storage {
            source: message.into().into(),
        }
    }

    /// Whether this error came from the call transport's join contract.
    ///
    /// These are the failures the command layer translates into user-facing text.
    pub fn is_join_rejection(&self) -> bool {
        matches!(
            self,
            RelayError::NoActiveCallEndpoint { .. }
                | RelayError::AlreadyJoined { .. }
                | RelayError::TransportServerError { .. }
        )
    }
}
