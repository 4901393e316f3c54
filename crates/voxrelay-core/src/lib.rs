// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Voxrelay media relay.
//!
//! This crate provides the collaborator trait definitions, error types, and
//! common types used throughout the Voxrelay workspace. Transports, stores,
//! resolvers, encoders and notifiers all implement traits defined here.

pub mod error;
pub mod timefmt;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::RelayError;
pub use types::{
    AdapterType, AssistantId, ChatId, HealthStatus, ItemId, MediaSource, PlaybackItem,
    SpeedFactor, StreamDescriptor, StreamKind, TransportEvent,
};

// Re-export all adapter traits at crate root.
pub use traits::{
    CallTransport, MediaResolver, PluginAdapter, ReencodeJob, Reencoder, SettingsStore,
    StatusNotifier,
};
