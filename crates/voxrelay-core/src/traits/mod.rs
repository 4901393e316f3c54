// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod notifier;
pub mod reencoder;
pub mod resolver;
pub mod store;
pub mod transport;

pub use adapter::PluginAdapter;
pub use notifier::StatusNotifier;
pub use reencoder::{ReencodeJob, Reencoder};
pub use resolver::MediaResolver;
pub use store::SettingsStore;
pub use transport::CallTransport;
