// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Voxrelay engine tests.
//!
//! Provides mock collaborators and a test harness for fast, deterministic
//! tests without a real call transport, store or ffmpeg.
//!
//! # Components
//!
//! - [`MockTransport`] - call transport with a call log, scripted failures and injectable events
//! - [`MockStore`] - in-memory settings store
//! - [`MockResolver`] - scripted media resolver
//! - [`MockReencoder`] - re-encoder that writes placeholder files and counts encodes
//! - [`MockNotifier`] - status notifier with an outbox
//! - [`TestHarness`] - a relay engine wired to all of the above

pub mod harness;
pub mod mock_notifier;
pub mod mock_reencoder;
pub mod mock_resolver;
pub mod mock_store;
pub mod mock_transport;

pub use harness::TestHarness;
pub use mock_notifier::MockNotifier;
pub use mock_reencoder::MockReencoder;
pub use mock_resolver::{MockResolver, ResolverScript};
pub use mock_store::MockStore;
pub use mock_transport::{MockTransport, ScriptedFailure, TransportCall};
