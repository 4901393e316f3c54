// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock call transport for deterministic testing.
//!
//! `MockTransport` records every call, fails on demand, and yields injected
//! events from `next_event()`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use voxrelay_core::error::RelayError;
use voxrelay_core::traits::adapter::PluginAdapter;
use voxrelay_core::traits::transport::CallTransport;
use voxrelay_core::types::{AdapterType, ChatId, HealthStatus, StreamDescriptor, TransportEvent};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Join { chat: ChatId, stream: StreamDescriptor },
    Leave { chat: ChatId },
    ChangeStream { chat: ChatId, stream: StreamDescriptor },
    Pause { chat: ChatId },
    Resume { chat: ChatId },
}

impl TransportCall {
    pub fn chat(&self) -> ChatId {
        match self {
            TransportCall::Join { chat, .. }
            | TransportCall::Leave { chat }
            | TransportCall::ChangeStream { chat, .. }
            | TransportCall::Pause { chat }
            | TransportCall::Resume { chat } => *chat,
        }
    }

    /// The descriptor handed over by a join or stream change.
    pub fn stream(&self) -> Option<&StreamDescriptor> {
        match self {
            TransportCall::Join { stream, .. } | TransportCall::ChangeStream { stream, .. } => {
                Some(stream)
            }
            _ => None,
        }
    }
}

/// A failure to return from the next join or stream change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    NoActiveCallEndpoint,
    AlreadyJoined,
    ServerError,
    Transport,
    /// Never completes; exercises the caller's timeout.
    Hang,
}

impl ScriptedFailure {
    fn into_error(self, chat: ChatId) -> RelayError {
        match self {
            ScriptedFailure::NoActiveCallEndpoint => RelayError::NoActiveCallEndpoint { chat },
            ScriptedFailure::AlreadyJoined => RelayError::AlreadyJoined { chat },
            ScriptedFailure::ServerError => RelayError::TransportServerError {
                message: "mock server error".to_string(),
            },
            ScriptedFailure::Transport | ScriptedFailure::Hang => {
                RelayError::transport("mock transport failure")
            }
        }
    }
}

/// A mock call transport for testing.
pub struct MockTransport {
    name: String,
    calls: Arc<Mutex<Vec<TransportCall>>>,
    join_failures: Arc<Mutex<VecDeque<ScriptedFailure>>>,
    change_failures: Arc<Mutex<VecDeque<ScriptedFailure>>>,
    fail_leave: AtomicBool,
    participants: Arc<Mutex<HashMap<ChatId, usize>>>,
    events: Arc<Mutex<VecDeque<TransportEvent>>>,
    notify: Arc<Notify>,
    closed: AtomicBool,
    health: std::sync::Mutex<HealthStatus>,
}

impl MockTransport {
    /// Default participant count for chats without an explicit one.
    pub const DEFAULT_PARTICIPANTS: usize = 2;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
            join_failures: Arc::new(Mutex::new(VecDeque::new())),
            change_failures: Arc::new(Mutex::new(VecDeque::new())),
            fail_leave: AtomicBool::new(false),
            participants: Arc::new(Mutex::new(HashMap::new())),
            events: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            health: std::sync::Mutex::new(HealthStatus::Healthy),
        }
    }

    /// Make the next `join()` fail with `failure`.
    pub async fn fail_next_join(&self, failure: ScriptedFailure) {
        self.join_failures.lock().await.push_back(failure);
    }

    /// Make the next `change_stream()` fail with `failure`.
    pub async fn fail_next_change(&self, failure: ScriptedFailure) {
        self.change_failures.lock().await.push_back(failure);
    }

    /// Make every `leave()` fail while set.
    pub fn fail_leave(&self, fail: bool) {
        self.fail_leave.store(fail, Ordering::SeqCst);
    }

    pub async fn set_participants(&self, chat: ChatId, count: usize) {
        self.participants.lock().await.insert(chat, count);
    }

    /// Queue an event for `next_event()`.
    pub async fn push_event(&self, event: TransportEvent) {
        self.events.lock().await.push_back(event);
        self.notify.notify_one();
    }

    /// End the event stream once queued events are consumed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn set_health(&self, status: HealthStatus) {
        if let Ok(mut health) = self.health.lock() {
            *health = status;
        }
    }

    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    /// Recorded calls for one chat.
    pub async fn calls_for(&self, chat: ChatId) -> Vec<TransportCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.chat() == chat)
            .cloned()
            .collect()
    }

    pub async fn join_count(&self, chat: ChatId) -> usize {
        self.count(chat, |c| matches!(c, TransportCall::Join { .. }))
            .await
    }

    pub async fn leave_count(&self, chat: ChatId) -> usize {
        self.count(chat, |c| matches!(c, TransportCall::Leave { .. }))
            .await
    }

    pub async fn change_count(&self, chat: ChatId) -> usize {
        self.count(chat, |c| matches!(c, TransportCall::ChangeStream { .. }))
            .await
    }

    /// The descriptor of the most recent join or stream change for `chat`.
    pub async fn last_descriptor(&self, chat: ChatId) -> Option<StreamDescriptor> {
        self.calls
            .lock()
            .await
            .iter()
            .rev()
            .filter(|c| c.chat() == chat)
            .find_map(|c| c.stream().cloned())
    }

    pub async fn last_generation(&self, chat: ChatId) -> Option<u64> {
        self.last_descriptor(chat).await.map(|d| d.generation)
    }

    async fn count(&self, chat: ChatId, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.chat() == chat && pred(c))
            .count()
    }

    async fn record(&self, call: TransportCall) {
        self.calls.lock().await.push(call);
    }

    async fn scripted(
        queue: &Mutex<VecDeque<ScriptedFailure>>,
        chat: ChatId,
    ) -> Result<(), RelayError> {
        let failure = queue.lock().await.pop_front();
        match failure {
            None => Ok(()),
            Some(ScriptedFailure::Hang) => {
                std::future::pending::<()>().await;
                Err(ScriptedFailure::Hang.into_error(chat))
            }
            Some(failure) => Err(failure.into_error(chat)),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new("mock-transport")
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        self.health
            .lock()
            .map(|h| h.clone())
            .map_err(|_| RelayError::Internal("mock health lock poisoned".to_string()))
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        self.close();
        Ok(())
    }
}

#[async_trait]
impl CallTransport for MockTransport {
    async fn join(&self, chat: ChatId, stream: &StreamDescriptor) -> Result<(), RelayError> {
        self.record(TransportCall::Join {
            chat,
            stream: stream.clone(),
        })
        .await;
        Self::scripted(&self.join_failures, chat).await
    }

    async fn leave(&self, chat: ChatId) -> Result<(), RelayError> {
        self.record(TransportCall::Leave { chat }).await;
        if self.fail_leave.load(Ordering::SeqCst) {
            return Err(RelayError::transport("not in call"));
        }
        Ok(())
    }

    async fn change_stream(
        &self,
        chat: ChatId,
        stream: &StreamDescriptor,
    ) -> Result<(), RelayError> {
        self.record(TransportCall::ChangeStream {
            chat,
            stream: stream.clone(),
        })
        .await;
        Self::scripted(&self.change_failures, chat).await
    }

    async fn pause(&self, chat: ChatId) -> Result<(), RelayError> {
        self.record(TransportCall::Pause { chat }).await;
        Ok(())
    }

    async fn resume(&self, chat: ChatId) -> Result<(), RelayError> {
        self.record(TransportCall::Resume { chat }).await;
        Ok(())
    }

    async fn participant_count(&self, chat: ChatId) -> Result<usize, RelayError> {
        Ok(self
            .participants
            .lock()
            .await
            .get(&chat)
            .copied()
            .unwrap_or(Self::DEFAULT_PARTICIPANTS))
    }

    async fn next_event(&self) -> Result<TransportEvent, RelayError> {
        loop {
            {
                let mut events = self.events.lock().await;
                if let Some(event) = events.pop_front() {
                    return Ok(event);
                }
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(RelayError::TransportClosed);
            }
            self.notify.notified().await;
        }
    }
}
