// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assistant pool and the chat binding table.
//!
//! Each assistant owns one call transport and serves at most one chat at a
//! time. The binding table is the only cross-chat shared state in the engine;
//! it lives behind a single mutex that is never held across a transport call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use voxrelay_config::model::AssignmentPolicyKind;
use voxrelay_core::error::RelayError;
use voxrelay_core::types::{AssistantId, ChatId};
use voxrelay_core::CallTransport;

/// A relay account together with its call transport.
pub struct Assistant {
    id: AssistantId,
    name: String,
    configured: bool,
    transport: Arc<dyn CallTransport + Send + Sync>,
}

impl Assistant {
    pub fn new(
        id: AssistantId,
        name: impl Into<String>,
        configured: bool,
        transport: Arc<dyn CallTransport + Send + Sync>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            configured,
            transport,
        }
    }

    pub fn id(&self) -> AssistantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the identity has credentials. Unconfigured identities never get chats.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn transport(&self) -> &Arc<dyn CallTransport + Send + Sync> {
        &self.transport
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("configured", &self.configured)
            .finish()
    }
}

/// A free assistant offered to an [`AssignmentPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub id: AssistantId,
    /// Number of chats this assistant has been bound to since startup.
    pub served: u64,
}

/// Chooses an assistant for a chat that has none.
///
/// `candidates` holds only free, configured assistants in index order and is
/// never empty.
pub trait AssignmentPolicy: Send + Sync {
    fn pick(&self, candidates: &[Candidate]) -> AssistantId;
}

/// Picks the candidate that has served the fewest chats, lowest index first.
#[derive(Debug, Default)]
pub struct LeastLoaded;

impl AssignmentPolicy for LeastLoaded {
    fn pick(&self, candidates: &[Candidate]) -> AssistantId {
        candidates
            .iter()
            .min_by_key(|c| (c.served, c.id))
            .map(|c| c.id)
            .unwrap_or(AssistantId(1))
    }
}

/// Cycles through the candidates in index order.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl AssignmentPolicy for RoundRobin {
    fn pick(&self, candidates: &[Candidate]) -> AssistantId {
        let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
        candidates
            .get(turn % candidates.len().max(1))
            .map(|c| c.id)
            .unwrap_or(AssistantId(1))
    }
}

/// Build the policy named in configuration.
pub fn policy_for(kind: AssignmentPolicyKind) -> Box<dyn AssignmentPolicy> {
    match kind {
        AssignmentPolicyKind::LeastLoaded => Box::new(LeastLoaded),
        AssignmentPolicyKind::RoundRobin => Box::new(RoundRobin::default()),
    }
}

#[derive(Debug, Default)]
struct Bindings {
    by_chat: HashMap<ChatId, AssistantId>,
    by_assistant: HashMap<AssistantId, ChatId>,
    served: HashMap<AssistantId, u64>,
}

/// Fixed set of assistants plus the chat binding table.
pub struct AssistantPool {
    assistants: Vec<Arc<Assistant>>,
    policy: Box<dyn AssignmentPolicy>,
    bindings: Mutex<Bindings>,
}

impl AssistantPool {
    pub fn new(assistants: Vec<Assistant>, policy: Box<dyn AssignmentPolicy>) -> Self {
        info!(
            total = assistants.len(),
            configured = assistants.iter().filter(|a| a.is_configured()).count(),
            "assistant pool initialized"
        );
        Self {
            assistants: assistants.into_iter().map(Arc::new).collect(),
            policy,
            bindings: Mutex::new(Bindings::default()),
        }
    }

    /// All assistants, configured or not, in index order.
    pub fn assistants(&self) -> &[Arc<Assistant>] {
        &self.assistants
    }

    pub fn get(&self, id: AssistantId) -> Option<Arc<Assistant>> {
        self.assistants.iter().find(|a| a.id == id).cloned()
    }

    /// Returns the assistant bound to `chat`, binding a free one if needed.
    ///
    /// Lookups are stable until [`release`](Self::release) is called for the chat.
    pub async fn assistant_for(&self, chat: ChatId) -> Result<Arc<Assistant>, RelayError> {
        let mut bindings = self.bindings.lock().await;

        if let Some(id) = bindings.by_chat.get(&chat).copied() {
            return self
                .get(id)
                .ok_or_else(|| RelayError::Internal(format!("binding to unknown assistant {id}")));
        }

        let candidates: Vec<Candidate> = self
            .assistants
            .iter()
            .filter(|a| a.is_configured() && !bindings.by_assistant.contains_key(&a.id))
            .map(|a| Candidate {
                id: a.id,
                served: bindings.served.get(&a.id).copied().unwrap_or(0),
            })
            .collect();

        if candidates.is_empty() {
            warn!(chat_id = %chat, "no free configured assistant");
            return Err(RelayError::NoAssistantAvailable { chat });
        }

        let picked = self.policy.pick(&candidates);
        if !candidates.iter().any(|c| c.id == picked) {
            return Err(RelayError::Internal(format!(
                "assignment policy picked unavailable assistant {picked}"
            )));
        }

        bindings.by_chat.insert(chat, picked);
        bindings.by_assistant.insert(picked, chat);
        *bindings.served.entry(picked).or_insert(0) += 1;
        debug!(chat_id = %chat, assistant = %picked, "assistant bound");

        self.get(picked)
            .ok_or_else(|| RelayError::Internal(format!("binding to unknown assistant {picked}")))
    }

    /// The assistant currently bound to `chat`, without binding one.
    pub async fn bound(&self, chat: ChatId) -> Option<Arc<Assistant>> {
        let id = self.bindings.lock().await.by_chat.get(&chat).copied()?;
        self.get(id)
    }

    /// The chat `assistant` is currently serving.
    pub async fn chat_of(&self, assistant: AssistantId) -> Option<ChatId> {
        self.bindings
            .lock()
            .await
            .by_assistant
            .get(&assistant)
            .copied()
    }

    /// Drops the binding for `chat`, returning the assistant that held it.
    pub async fn release(&self, chat: ChatId) -> Option<AssistantId> {
        let mut bindings = self.bindings.lock().await;
        let id = bindings.by_chat.remove(&chat)?;
        bindings.by_assistant.remove(&id);
        debug!(chat_id = %chat, assistant = %id, "assistant released");
        Some(id)
    }

    /// Current bindings, ordered by chat.
    pub async fn bindings(&self) -> Vec<(ChatId, AssistantId)> {
        let bindings = self.bindings.lock().await;
        let mut pairs: Vec<_> = bindings.by_chat.iter().map(|(c, a)| (*c, *a)).collect();
        pairs.sort();
        pairs
    }

    /// Leaves `chat` on every configured assistant regardless of binding.
    ///
    /// Per-assistant failures ("not in call" included) are logged and ignored.
    /// Returns how many assistants acknowledged the leave.
    pub async fn force_leave_all(&self, chat: ChatId, timeout: Duration) -> usize {
        let attempts = self
            .assistants
            .iter()
            .filter(|a| a.is_configured())
            .map(|assistant| async move {
                match tokio::time::timeout(timeout, assistant.transport.leave(chat)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        debug!(chat_id = %chat, assistant = %assistant.id, error = %e, "force leave ignored");
                        false
                    }
                    Err(_) => {
                        debug!(chat_id = %chat, assistant = %assistant.id, "force leave timed out");
                        false
                    }
                }
            });

        let left = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        info!(chat_id = %chat, left, "forced leave on all assistants");
        left
    }
}
