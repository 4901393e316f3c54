// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media resolver trait for tagged sources (download, live lookup, catalog).

use async_trait::async_trait;

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Resolution, ResolveTag, StreamKind};

/// Adapter that turns a tagged media id into a playable location.
#[async_trait]
pub trait MediaResolver: PluginAdapter {
    /// Resolves `id` according to `tag`.
    ///
    /// `kind` lets downloaders pick an audio-only or audio+video format.
    async fn resolve(
        &self,
        tag: ResolveTag,
        id: &str,
        kind: StreamKind,
    ) -> Result<Resolution, RelayError>;
}
