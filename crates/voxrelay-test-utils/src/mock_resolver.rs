// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted media resolver.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use voxrelay_core::error::RelayError;
use voxrelay_core::traits::adapter::PluginAdapter;
use voxrelay_core::traits::resolver::MediaResolver;
use voxrelay_core::types::{AdapterType, HealthStatus, Resolution, ResolveTag, StreamKind};

/// What the resolver answers for one id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverScript {
    Ready(String),
    Unavailable,
    Fail,
}

/// A mock resolver. Ids without a script resolve to `/downloads/<id>`.
pub struct MockResolver {
    scripts: Mutex<HashMap<String, ResolverScript>>,
    calls: Mutex<Vec<(ResolveTag, String, StreamKind)>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn script(&self, id: impl Into<String>, script: ResolverScript) {
        self.scripts.lock().await.insert(id.into(), script);
    }

    pub async fn calls(&self) -> Vec<(ResolveTag, String, StreamKind)> {
        self.calls.lock().await.clone()
    }
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockResolver {
    fn name(&self) -> &str {
        "mock-resolver"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Resolver
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl MediaResolver for MockResolver {
    async fn resolve(
        &self,
        tag: ResolveTag,
        id: &str,
        kind: StreamKind,
    ) -> Result<Resolution, RelayError> {
        self.calls.lock().await.push((tag, id.to_string(), kind));
        let script = self.scripts.lock().await.get(id).cloned();
        match script {
            None => Ok(Resolution::Ready(format!("/downloads/{id}"))),
            Some(ResolverScript::Ready(location)) => Ok(Resolution::Ready(location)),
            Some(ResolverScript::Unavailable) => Ok(Resolution::Unavailable),
            Some(ResolverScript::Fail) => Err(RelayError::ResolutionFailed {
                tag,
                id: id.to_string(),
            }),
        }
    }
}
