// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes transport events to the session that owns the chat.
//!
//! One pump task per configured assistant forwards transport events into a
//! shared channel. The dispatcher drops events whose assistant is not bound
//! to the event's chat, then hands the rest to a per-chat worker. A worker
//! handles its chat's events strictly in arrival order and exits after an
//! idle period. A per-chat gate keeps a replacement worker from starting
//! before the old one has drained.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voxrelay_core::error::RelayError;
use voxrelay_core::types::{AssistantId, ChatId, TransportEvent};

use crate::RelayEngine;
use crate::pool::Assistant;

const EVENT_BUFFER: usize = 512;
const WORKER_BUFFER: usize = 64;
const PUMP_RETRY_DELAY: Duration = Duration::from_millis(500);

struct Worker {
    id: u64,
    tx: mpsc::Sender<TransportEvent>,
}

#[derive(Clone)]
pub struct StreamEventRouter {
    engine: RelayEngine,
    idle: Duration,
    workers: Arc<DashMap<ChatId, Worker>>,
    gates: Arc<DashMap<ChatId, Arc<Mutex<()>>>>,
    next_worker: Arc<AtomicU64>,
}

impl StreamEventRouter {
    pub fn new(engine: RelayEngine, idle: Duration) -> Self {
        Self {
            engine,
            idle,
            workers: Arc::new(DashMap::new()),
            gates: Arc::new(DashMap::new()),
            next_worker: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of chats with a running worker.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Number of chats with a worker gate, including workers still draining.
    pub fn tracked_chats(&self) -> usize {
        self.gates.len()
    }

    /// Pumps every configured assistant's events until `cancel` fires or
    /// all transports have closed.
    pub async fn run(self, cancel: CancellationToken) {
        let (tx, mut rx) = mpsc::channel::<(AssistantId, TransportEvent)>(EVENT_BUFFER);
        let mut pumps = 0;
        for assistant in self
            .engine
            .pool()
            .assistants()
            .iter()
            .filter(|a| a.is_configured())
        {
            tokio::spawn(pump(Arc::clone(assistant), tx.clone(), cancel.clone()));
            pumps += 1;
        }
        drop(tx);
        info!(pumps, "stream event router running");

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some((assistant, event)) => self.dispatch(assistant, event).await,
                    None => {
                        info!("all transports closed, router stopping");
                        break;
                    }
                },
                _ = cancel.cancelled() => {
                    debug!("stream event router stopped");
                    break;
                }
            }
        }
    }

    /// Hands one event from `assistant` to its chat's worker.
    ///
    /// Events from an assistant that is not bound to the event's chat are
    /// dropped.
    pub async fn dispatch(&self, assistant: AssistantId, event: TransportEvent) {
        let chat = event.chat();
        if self.engine.pool().chat_of(assistant).await != Some(chat) {
            debug!(chat_id = %chat, assistant = %assistant, ?event, "event from unbound assistant dropped");
            return;
        }

        let mut event = event;
        for _ in 0..2 {
            let (id, tx) = self.worker_for(chat);
            match tx.send(event).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    self.workers.remove_if(&chat, |_, worker| worker.id == id);
                    event = returned;
                }
            }
        }
        warn!(chat_id = %chat, ?event, "no worker accepted event, dropped");
    }

    fn worker_for(&self, chat: ChatId) -> (u64, mpsc::Sender<TransportEvent>) {
        let worker = self
            .workers
            .entry(chat)
            .or_insert_with(|| self.spawn_worker(chat));
        (worker.id, worker.tx.clone())
    }

    fn spawn_worker(&self, chat: ChatId) -> Worker {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(WORKER_BUFFER);
        let gate = self.gates.entry(chat).or_default().clone();
        tokio::spawn(self.clone().run_worker(chat, id, rx, gate));
        debug!(chat_id = %chat, worker = id, "chat worker started");
        Worker { id, tx }
    }

    async fn run_worker(
        self,
        chat: ChatId,
        id: u64,
        mut rx: mpsc::Receiver<TransportEvent>,
        gate: Arc<Mutex<()>>,
    ) {
        let held = gate.lock_owned().await;
        loop {
            match tokio::time::timeout(self.idle, rx.recv()).await {
                Ok(Some(event)) => handle(&self.engine, event).await,
                Ok(None) => break,
                Err(_) => {
                    self.workers.remove_if(&chat, |_, worker| worker.id == id);
                    rx.close();
                    while let Some(event) = rx.recv().await {
                        handle(&self.engine, event).await;
                    }
                    break;
                }
            }
        }
        drop(held);
        self.gates
            .remove_if(&chat, |_, gate| Arc::strong_count(gate) == 1);
        debug!(chat_id = %chat, worker = id, "chat worker exited");
    }
}

async fn pump(
    assistant: Arc<Assistant>,
    tx: mpsc::Sender<(AssistantId, TransportEvent)>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            event = assistant.transport().next_event() => event,
            _ = cancel.cancelled() => break,
        };
        match event {
            Ok(event) => {
                if tx.send((assistant.id(), event)).await.is_err() {
                    break;
                }
            }
            Err(RelayError::TransportClosed) => {
                info!(assistant = %assistant.id(), "transport closed, stopping event pump");
                break;
            }
            Err(e) => {
                warn!(assistant = %assistant.id(), error = %e, "transport event error");
                tokio::time::sleep(PUMP_RETRY_DELAY).await;
            }
        }
    }
}

async fn handle(engine: &RelayEngine, event: TransportEvent) {
    match event {
        TransportEvent::StreamEnded { chat, generation } => {
            let outcome = engine.session(chat).on_stream_end(generation).await;
            debug!(chat_id = %chat, generation, ?outcome, "stream end handled");
        }
        TransportEvent::ParticipantsChanged { chat, count } => {
            engine.session(chat).on_participants_changed(count).await;
        }
    }
}
