// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-chat call session state machine.
//!
//! Each chat goes through states: Idle -> Joining -> Live -> Leaving -> Idle.
//! `Live` carries a paused flag that mirrors the transport.
//!
//! A [`CallSession`] is a cheap handle; the session record, the queue and the
//! assistant binding live in the engine. Every public operation takes the
//! chat's async lock, so operations on one chat are serialized while other
//! chats proceed in parallel.
//!
//! Failures on the automatic stream-end path never escape: the chat is told
//! (best effort) and the session is torn down through [`CallSession::stop`]'s
//! terminal path.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use voxrelay_core::error::RelayError;
use voxrelay_core::timefmt;
use voxrelay_core::types::{
    AssistantId, ChatId, ItemId, MediaSource, MessageHandle, PlaybackItem, Resolution,
    ResolveTag, SpeedFactor, StatusTemplate, StatusUpdate, StreamDescriptor, StreamKind,
    TimeWindow, TimingSnapshot,
};

use crate::pool::Assistant;
use crate::queue::Advance;
use crate::EngineShared;

/// States in the call session FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// No call. The chat has no assistant and no queue.
    Idle,
    /// An assistant is bound and the transport join is in flight.
    Joining,
    /// Streaming. `paused` mirrors the transport's pause flag.
    Live { paused: bool },
    /// Teardown in progress.
    Leaving,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallState::Idle => write!(f, "idle"),
            CallState::Joining => write!(f, "joining"),
            CallState::Live { paused: false } => write!(f, "live"),
            CallState::Live { paused: true } => write!(f, "paused"),
            CallState::Leaving => write!(f, "leaving"),
        }
    }
}

impl CallState {
    pub fn is_live(self) -> bool {
        matches!(self, CallState::Live { .. })
    }
}

/// Engine-side bookkeeping for one chat's call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub state: CallState,
    pub assistant: AssistantId,
    /// Generation of the stream the transport is currently playing.
    pub generation: u64,
    /// Queue head the current stream was started for.
    pub current_item: Option<ItemId>,
    pub video: bool,
}

/// Result of handling an end-of-stream notification.
#[derive(Debug)]
pub enum StreamEndOutcome {
    /// Stale or duplicate notification; nothing changed.
    Ignored,
    /// The next queued item is now streaming.
    Continued(ItemId),
    /// The looped head item started again.
    Repeated(ItemId),
    /// The queue ran out and the call was left.
    Ended,
    /// Starting the next item failed; the chat was told and the call was left.
    Failed(RelayError),
}

/// Result of a manual skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    Playing(ItemId),
    Ended,
}

/// Result of [`CallSession::enqueue_and_continue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The item was first in line and the call was joined with it.
    Started(ItemId),
    /// The item waits at `position` (1 = next).
    Queued { position: usize },
}

/// Handle to one chat's call session.
#[derive(Clone)]
pub struct CallSession {
    chat: ChatId,
    shared: Arc<EngineShared>,
}

/// Held for the duration of one session operation.
///
/// On release the chat's mutex is dropped from the lock map when nobody else
/// holds or waits on it.
struct ChatLock {
    guard: Option<OwnedMutexGuard<()>>,
    chat: ChatId,
    shared: Arc<EngineShared>,
}

impl Drop for ChatLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.shared
            .locks
            .remove_if(&self.chat, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl CallSession {
    pub(crate) fn new(chat: ChatId, shared: Arc<EngineShared>) -> Self {
        Self { chat, shared }
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    /// Returns the current session state.
    pub fn state(&self) -> CallState {
        self.shared
            .sessions
            .get(&self.chat)
            .map(|r| r.state)
            .unwrap_or(CallState::Idle)
    }

    pub fn record(&self) -> Option<SessionRecord> {
        self.shared.sessions.get(&self.chat).map(|r| r.value().clone())
    }

    /// The queue head, i.e. the item being streamed while live.
    pub fn current_item(&self) -> Option<PlaybackItem> {
        self.shared.queues.current(self.chat)
    }

    /// Joins the chat's call with `item` as the current stream.
    ///
    /// Valid only from `Idle`. On failure the binding is released and the
    /// session stays `Idle`; transport rejections come back as
    /// [`RelayError::NoActiveCallEndpoint`], [`RelayError::AlreadyJoined`] or
    /// [`RelayError::TransportServerError`].
    pub async fn join(&self, item: PlaybackItem, want_video: bool) -> Result<(), RelayError> {
        let _guard = self.lock().await;
        self.join_locked(item, want_video).await
    }

    /// Enqueues `item`, joining the call with it when the chat is idle.
    ///
    /// Entries left in an idle chat's queue belong to no call and are
    /// dropped first, so `item` always becomes current.
    pub async fn enqueue_and_continue(
        &self,
        item: PlaybackItem,
        want_video: bool,
    ) -> Result<EnqueueOutcome, RelayError> {
        item.source.validate()?;
        let _guard = self.lock().await;

        let id = item.id;
        if self.state() == CallState::Idle {
            self.discard_stale_queue();
            self.shared.queues.enqueue(self.chat, item.clone());
            self.join_locked(item, want_video).await?;
            return Ok(EnqueueOutcome::Started(id));
        }

        let position = self.shared.queues.enqueue(self.chat, item);

        debug!(chat_id = %self.chat, position, "item queued");
        Ok(EnqueueOutcome::Queued { position })
    }

    pub async fn pause(&self) -> Result<(), RelayError> {
        let _guard = self.lock().await;
        let (_, assistant) = self.require_live()?;
        bounded(
            self.shared.config.transport.change_timeout(),
            assistant.transport().pause(self.chat),
        )
        .await?;
        self.set_paused(true);
        self.best_effort("set_music_on", self.shared.store.set_music_on(self.chat, false))
            .await;
        info!(chat_id = %self.chat, "stream paused");
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), RelayError> {
        let _guard = self.lock().await;
        let (_, assistant) = self.require_live()?;
        bounded(
            self.shared.config.transport.change_timeout(),
            assistant.transport().resume(self.chat),
        )
        .await?;
        self.set_paused(false);
        self.best_effort("set_music_on", self.shared.store.set_music_on(self.chat, true))
            .await;
        info!(chat_id = %self.chat, "stream resumed");
        Ok(())
    }

    /// Switches the transport to `new_item` without touching the queue.
    ///
    /// Transport failures propagate; the caller decides whether to retry or stop.
    pub async fn change_stream(&self, new_item: PlaybackItem) -> Result<(), RelayError> {
        let _guard = self.lock().await;
        let (record, assistant) = self.require_live()?;

        let mut item = new_item;
        item.source.validate()?;
        let location = self.resolve(&mut item, false).await?;
        let current = record.current_item.unwrap_or(item.id);
        self.start_stream(&assistant, &item, location, resume_window(&item), current)
            .await?;
        Ok(())
    }

    /// Advances the queue as if the current stream had just ended.
    pub async fn advance_on_stream_end(&self) -> StreamEndOutcome {
        let _guard = self.lock().await;
        self.advance_locked(None).await
    }

    /// Handles a transport end-of-stream notification for `generation`.
    ///
    /// Notifications for any other generation are ignored, which makes
    /// duplicate delivery harmless.
    pub async fn on_stream_end(&self, generation: u64) -> StreamEndOutcome {
        let _guard = self.lock().await;
        self.advance_locked(Some(generation)).await
    }

    /// Skips the current item, ignoring any loop counter.
    ///
    /// Unlike the automatic path, a failure to start the next item is
    /// returned to the caller after the session has been torn down.
    pub async fn skip(&self) -> Result<SkipOutcome, RelayError> {
        let _guard = self.lock().await;
        let (_, assistant) = self.require_live()?;

        if self.shared.queues.loop_count(self.chat) > 0 {
            let _ = self.shared.queues.set_loop(self.chat, 0);
            self.mirror_loop(0).await;
        }

        match self.shared.queues.advance(self.chat) {
            Advance::Exhausted { .. } => {
                self.terminate("skipped past the end", true).await;
                Ok(SkipOutcome::Ended)
            }
            Advance::Next { .. } | Advance::Repeat { .. } => {
                match self.play_current(&assistant).await {
                    Ok(id) => Ok(SkipOutcome::Playing(id)),
                    Err(e) => {
                        warn!(chat_id = %self.chat, error = %e, "skip failed, leaving call");
                        self.terminate("skip failed", true).await;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Sets the loop counter for the current item.
    pub async fn set_loop(&self, count: u32) -> Result<(), RelayError> {
        let _guard = self.lock().await;
        self.shared.queues.set_loop(self.chat, count)?;
        self.mirror_loop(count).await;
        Ok(())
    }

    /// Changes the playback speed of the current item.
    ///
    /// `expected` names the file the caller believes is playing. If the
    /// queue head no longer streams from it, before or after the re-encode,
    /// the request fails with [`RelayError::AssistantBusy`]. The re-encode
    /// runs outside the chat lock. On a re-encode timeout the running stream
    /// is left untouched.
    pub async fn speed_change(&self, factor: SpeedFactor, expected: &Path) -> Result<(), RelayError> {
        let chat = self.chat;
        let (item, base) = {
            let _guard = self.lock().await;
            self.require_live()?;
            let item = self
                .shared
                .queues
                .current(chat)
                .ok_or(RelayError::NoActiveItem { chat })?;
            if !item.matches_location(expected) {
                return Err(RelayError::AssistantBusy { chat });
            }
            let base = item
                .base_location()
                .ok_or(RelayError::NoActiveItem { chat })?;
            (item, base)
        };

        if factor == item.speed {
            return Ok(());
        }

        let derived = if factor.is_normal() {
            None
        } else {
            Some(
                self.shared
                    .speed
                    .get_or_encode(Path::new(&base), factor)
                    .await?,
            )
        };

        let _guard = self.lock().await;
        let (_, assistant) = self.require_live()?;
        let current = self
            .shared
            .queues
            .current(chat)
            .ok_or(RelayError::NoActiveItem { chat })?;
        if current.id != item.id || !current.matches_location(expected) {
            return Err(RelayError::AssistantBusy { chat });
        }

        match derived {
            None => {
                let snapshot = current.pre_speed.clone().unwrap_or_else(|| TimingSnapshot {
                    duration_secs: current.duration_secs,
                    duration_label: current.duration_label.clone(),
                    played_secs: current.speed.revert_offset(current.played_secs),
                });
                let window = window_from(snapshot.played_secs, snapshot.duration_secs);
                self.start_stream(&assistant, &current, base, window, current.id)
                    .await?;
                self.shared.queues.with_current(chat, |head| {
                    head.duration_secs = snapshot.duration_secs;
                    head.duration_label = snapshot.duration_label;
                    head.played_secs = snapshot.played_secs;
                    head.speed = SpeedFactor::Normal;
                    head.speed_path = None;
                    head.pre_speed = None;
                })?;
            }
            Some(entry) => {
                let source_offset = current.speed.revert_offset(current.played_secs);
                let played = factor
                    .convert_offset(source_offset)
                    .min(entry.duration_secs);
                let window = window_from(played, entry.duration_secs);
                self.start_stream(
                    &assistant,
                    &current,
                    entry.path.display().to_string(),
                    window,
                    current.id,
                )
                .await?;
                self.shared.queues.with_current(chat, |head| {
                    if head.pre_speed.is_none() {
                        head.pre_speed = Some(TimingSnapshot {
                            duration_secs: head.duration_secs,
                            duration_label: head.duration_label.clone(),
                            played_secs: head.played_secs,
                        });
                    }
                    head.duration_secs = entry.duration_secs;
                    head.duration_label = timefmt::format_clock(entry.duration_secs);
                    head.played_secs = played;
                    head.speed = factor;
                    head.speed_path = Some(entry.path.clone());
                })?;
            }
        }

        info!(chat_id = %chat, speed = %factor, "playback speed changed");
        Ok(())
    }

    /// Restarts the current item's stream over `[offset, offset + window]`.
    ///
    /// The window end is capped at the item's duration.
    pub async fn seek(&self, offset_secs: u64, window_secs: u64) -> Result<(), RelayError> {
        let chat = self.chat;
        let _guard = self.lock().await;
        let (_, assistant) = self.require_live()?;
        let item = self
            .shared
            .queues
            .current(chat)
            .ok_or(RelayError::NoActiveItem { chat })?;

        if offset_secs >= item.duration_secs {
            return Err(RelayError::SeekOutOfRange {
                offset_secs,
                duration_secs: item.duration_secs,
            });
        }

        let location = match &item.speed_path {
            Some(path) => path.display().to_string(),
            None => item
                .base_location()
                .ok_or(RelayError::NoActiveItem { chat })?,
        };
        let window = TimeWindow {
            start_secs: offset_secs,
            end_secs: offset_secs.saturating_add(window_secs).min(item.duration_secs),
        };
        self.start_stream(&assistant, &item, location, Some(window), item.id)
            .await?;
        self.shared
            .queues
            .with_current(chat, |head| head.played_secs = offset_secs)?;
        debug!(chat_id = %chat, offset_secs, "seeked");
        Ok(())
    }

    /// Clears the queue and flags, then leaves the call.
    ///
    /// Transport errors while leaving are ignored.
    pub async fn stop(&self) {
        let _guard = self.lock().await;
        self.terminate("stopped", true).await;
    }

    /// Leaves the chat on every assistant, then clears state.
    ///
    /// For recovery when the chat/assistant binding may be stale. Returns how
    /// many assistants acknowledged the leave.
    pub async fn force_stop_everywhere(&self) -> usize {
        let _guard = self.lock().await;
        let left = self
            .shared
            .pool
            .force_leave_all(self.chat, self.shared.config.transport.leave_timeout())
            .await;
        self.terminate("forced stop", false).await;
        left
    }

    /// Applies a participant-count change to the auto-end deadline.
    pub async fn on_participants_changed(&self, count: usize) {
        let _guard = self.lock().await;
        if !self.state().is_live() || !self.shared.queues.is_auto_end_eligible(self.chat) {
            return;
        }
        if count <= 1 {
            self.shared.autoend.arm(self.chat, Instant::now()).await;
        } else {
            self.shared.autoend.cancel_pending(self.chat);
        }
    }

    async fn lock(&self) -> ChatLock {
        let mutex = self.shared.locks.entry(self.chat).or_default().clone();
        ChatLock {
            guard: Some(mutex.lock_owned().await),
            chat: self.chat,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Joins from `Idle`. Any failure after the state check leaves the chat
    /// without a queue, since no call will ever advance it.
    async fn join_locked(&self, item: PlaybackItem, want_video: bool) -> Result<(), RelayError> {
        let state = self.state();
        if state != CallState::Idle {
            return Err(RelayError::InvalidState {
                chat: self.chat,
                state: state.to_string(),
                required: "idle",
            });
        }
        let result = self.join_idle(item, want_video).await;
        if result.is_err() {
            self.discard_stale_queue();
        }
        result
    }

    fn discard_stale_queue(&self) {
        let dropped = self.shared.queues.clear(self.chat);
        if !dropped.is_empty() {
            debug!(chat_id = %self.chat, dropped = dropped.len(), "dropped queue of idle chat");
        }
    }

    async fn join_idle(&self, mut item: PlaybackItem, want_video: bool) -> Result<(), RelayError> {
        let chat = self.chat;
        item.source.validate()?;
        item.kind = if want_video {
            StreamKind::Video
        } else {
            StreamKind::Audio
        };

        let assistant = self.shared.pool.assistant_for(chat).await?;
        self.shared.sessions.insert(
            chat,
            SessionRecord {
                state: CallState::Joining,
                assistant: assistant.id(),
                generation: 0,
                current_item: None,
                video: want_video,
            },
        );
        info!(chat_id = %chat, assistant = %assistant.id(), "joining call");

        let generation = match self.connect(&assistant, &mut item).await {
            Ok(generation) => generation,
            Err(e) => {
                self.shared.sessions.remove(&chat);
                self.shared.pool.release(chat).await;
                warn!(chat_id = %chat, assistant = %assistant.id(), error = %e, "join failed");
                return Err(e);
            }
        };

        let item_id = item.id;
        self.shared.queues.ensure_current(chat, item);
        let loop_count = match self.shared.store.get_loop(chat).await {
            Ok(count) => count,
            Err(e) => {
                debug!(chat_id = %chat, error = %e, "loop counter unavailable, assuming 0");
                0
            }
        };
        if loop_count > 0 {
            let _ = self.shared.queues.set_loop(chat, loop_count);
        }

        if let Some(mut record) = self.shared.sessions.get_mut(&chat) {
            record.state = CallState::Live { paused: false };
            record.generation = generation;
            record.current_item = Some(item_id);
        }

        self.shared.autoend.clear(chat).await;
        self.best_effort("add_active_chat", self.shared.store.add_active_chat(chat))
            .await;
        self.best_effort("set_music_on", self.shared.store.set_music_on(chat, true))
            .await;
        if want_video {
            self.best_effort(
                "add_active_video_chat",
                self.shared.store.add_active_video_chat(chat),
            )
            .await;
        }
        self.check_autoend(&assistant).await;

        info!(chat_id = %chat, assistant = %assistant.id(), item = %item_id, video = want_video, "call live");
        Ok(())
    }

    async fn connect(&self, assistant: &Assistant, item: &mut PlaybackItem) -> Result<u64, RelayError> {
        let location = self.resolve(item, false).await?;
        let generation = self.shared.next_generation();
        let descriptor = self.descriptor(item, location, resume_window(item), generation);
        bounded(
            self.shared.config.transport.join_timeout(),
            assistant.transport().join(self.chat, &descriptor),
        )
        .await?;
        Ok(generation)
    }

    async fn check_autoend(&self, assistant: &Assistant) {
        let enabled = match self.shared.store.is_autoend_enabled().await {
            Ok(enabled) => enabled,
            Err(e) => {
                debug!(chat_id = %self.chat, error = %e, "auto-end flag unavailable");
                false
            }
        };
        self.shared.queues.set_auto_end_eligible(self.chat, enabled);
        if !enabled {
            return;
        }

        match bounded(
            self.shared.config.transport.change_timeout(),
            assistant.transport().participant_count(self.chat),
        )
        .await
        {
            Ok(count) if count <= 1 => {
                self.shared.autoend.arm(self.chat, Instant::now()).await;
            }
            Ok(_) => {}
            Err(e) => debug!(chat_id = %self.chat, error = %e, "participant count unavailable"),
        }
    }

    async fn advance_locked(&self, generation: Option<u64>) -> StreamEndOutcome {
        let chat = self.chat;
        let Some(record) = self.record() else {
            debug!(chat_id = %chat, "stream end for chat without session");
            return StreamEndOutcome::Ignored;
        };
        if !record.state.is_live() {
            return StreamEndOutcome::Ignored;
        }
        if let Some(generation) = generation
            && generation != record.generation
        {
            debug!(chat_id = %chat, event = generation, current = record.generation, "stale stream end ignored");
            return StreamEndOutcome::Ignored;
        }
        if let (Some(head), Some(expected)) = (self.shared.queues.current(chat), record.current_item)
            && head.id != expected
        {
            debug!(chat_id = %chat, "queue head changed, stream end ignored");
            return StreamEndOutcome::Ignored;
        }

        let Some(assistant) = self.shared.pool.get(record.assistant) else {
            self.terminate("assistant vanished", false).await;
            return StreamEndOutcome::Ended;
        };

        match self.shared.queues.advance(chat) {
            Advance::Exhausted { .. } => {
                self.terminate("queue exhausted", true).await;
                StreamEndOutcome::Ended
            }
            Advance::Repeat { remaining, .. } => {
                self.mirror_loop(remaining).await;
                match self.play_current(&assistant).await {
                    Ok(id) => StreamEndOutcome::Repeated(id),
                    Err(e) => self.fail(e).await,
                }
            }
            Advance::Next { .. } => match self.play_current(&assistant).await {
                Ok(id) => StreamEndOutcome::Continued(id),
                Err(e) => self.fail(e).await,
            },
        }
    }

    /// Starts the queue head from the beginning and announces it.
    async fn play_current(&self, assistant: &Assistant) -> Result<ItemId, RelayError> {
        let chat = self.chat;
        let mut item = self.shared.queues.with_current(chat, |head| {
            head.reset_for_replay();
            head.clone()
        })?;

        let location = self.resolve(&mut item, true).await?;
        let template = match item.source {
            MediaSource::DownloadResolve(_) => StatusTemplate::Stream,
            _ => StatusTemplate::Telegram,
        };
        self.start_stream(assistant, &item, location, None, item.id)
            .await?;

        let lang = self.lang().await;
        let handle = self
            .post(item.origin_chat, StatusUpdate::now_playing(&item, &lang, template))
            .await;
        let resolved = item.resolved_location.clone();
        let _ = self.shared.queues.with_current(chat, |head| {
            if head.id == item.id {
                head.resolved_location = resolved;
                head.status_message = handle;
                head.template = Some(template);
            }
        });

        info!(chat_id = %chat, item = %item.id, title = %item.title, "now playing");
        Ok(item.id)
    }

    async fn fail(&self, err: RelayError) -> StreamEndOutcome {
        error!(chat_id = %self.chat, error = %err, "could not start next item, leaving call");
        let origin = self
            .shared
            .queues
            .current(self.chat)
            .map(|item| item.origin_chat)
            .unwrap_or(self.chat);
        let lang = self.lang().await;
        self.post(origin, StatusUpdate::PlaybackFailed { lang }).await;
        self.terminate("advance failed", true).await;
        StreamEndOutcome::Failed(err)
    }

    /// The single terminal path: clear queue and flags, leave, unbind.
    async fn terminate(&self, reason: &'static str, leave: bool) {
        let chat = self.chat;
        let record = self.shared.sessions.get_mut(&chat).map(|mut r| {
            r.state = CallState::Leaving;
            r.value().clone()
        });

        self.shared.queues.clear(chat);
        self.shared.autoend.clear(chat).await;
        self.best_effort("set_loop", self.shared.store.set_loop(chat, 0))
            .await;
        self.best_effort("remove_active_chat", self.shared.store.remove_active_chat(chat))
            .await;
        self.best_effort(
            "remove_active_video_chat",
            self.shared.store.remove_active_video_chat(chat),
        )
        .await;
        self.best_effort("set_music_on", self.shared.store.set_music_on(chat, false))
            .await;

        if leave
            && let Some(assistant) = record.as_ref().and_then(|r| self.shared.pool.get(r.assistant))
            && let Err(e) = bounded(
                self.shared.config.transport.leave_timeout(),
                assistant.transport().leave(chat),
            )
            .await
        {
            debug!(chat_id = %chat, assistant = %assistant.id(), error = %e, "leave failed during teardown");
        }

        self.shared.pool.release(chat).await;
        self.shared.sessions.remove(&chat);
        info!(chat_id = %chat, reason, "session ended");
    }

    /// Hands `item` to the transport and records the new generation.
    async fn start_stream(
        &self,
        assistant: &Assistant,
        item: &PlaybackItem,
        location: String,
        window: Option<TimeWindow>,
        current: ItemId,
    ) -> Result<u64, RelayError> {
        let generation = self.shared.next_generation();
        let descriptor = self.descriptor(item, location, window, generation);
        bounded(
            self.shared.config.transport.change_timeout(),
            assistant.transport().change_stream(self.chat, &descriptor),
        )
        .await?;

        if let Some(mut record) = self.shared.sessions.get_mut(&self.chat) {
            record.generation = generation;
            record.current_item = Some(current);
        }
        Ok(generation)
    }

    /// Turns a source reference into a playable location.
    ///
    /// With `announce`, a download posts a notice that is removed once the
    /// resolver answers.
    async fn resolve(&self, item: &mut PlaybackItem, announce: bool) -> Result<String, RelayError> {
        if let Some(location) = item.source.direct_location() {
            return Ok(location);
        }
        let (tag, id) = item
            .source
            .resolve_tag()
            .map(|(tag, id)| (tag, id.to_string()))
            .ok_or_else(|| RelayError::MalformedQueueEntry {
                reason: "source has neither a location nor a resolver tag".to_string(),
            })?;

        let notice = if announce && tag == ResolveTag::Download {
            let lang = self.lang().await;
            self.post(item.origin_chat, StatusUpdate::Downloading { lang })
                .await
        } else {
            None
        };

        let resolution = self.shared.resolver.resolve(tag, &id, item.kind).await;
        if let Some(handle) = notice {
            self.delete_status(item.origin_chat, &handle).await;
        }

        match resolution? {
            Resolution::Ready(location) => {
                item.resolved_location = Some(location.clone());
                Ok(location)
            }
            Resolution::Unavailable => Err(RelayError::ResolutionFailed { tag, id }),
        }
    }

    fn descriptor(
        &self,
        item: &PlaybackItem,
        location: String,
        window: Option<TimeWindow>,
        generation: u64,
    ) -> StreamDescriptor {
        let stream = &self.shared.config.stream;
        StreamDescriptor {
            item: item.id,
            location,
            kind: item.kind,
            audio_quality: stream.audio_quality,
            video_quality: (item.kind == StreamKind::Video).then_some(stream.video_quality),
            window,
            generation,
        }
    }

    fn require_live(&self) -> Result<(SessionRecord, Arc<Assistant>), RelayError> {
        let record = self
            .record()
            .filter(|r| r.state.is_live())
            .ok_or_else(|| RelayError::InvalidState {
                chat: self.chat,
                state: self.state().to_string(),
                required: "live",
            })?;
        let assistant = self.shared.pool.get(record.assistant).ok_or_else(|| {
            RelayError::Internal(format!("session bound to unknown assistant {}", record.assistant))
        })?;
        Ok((record, assistant))
    }

    fn set_paused(&self, paused: bool) {
        if let Some(mut record) = self.shared.sessions.get_mut(&self.chat)
            && record.state.is_live()
        {
            record.state = CallState::Live { paused };
        }
    }

    async fn mirror_loop(&self, count: u32) {
        self.best_effort("set_loop", self.shared.store.set_loop(self.chat, count))
            .await;
    }

    async fn lang(&self) -> String {
        match self.shared.store.get_lang(self.chat).await {
            Ok(lang) => lang,
            Err(e) => {
                debug!(chat_id = %self.chat, error = %e, "language unavailable, using default");
                "en".to_string()
            }
        }
    }

    async fn post(&self, chat: ChatId, update: StatusUpdate) -> Option<MessageHandle> {
        match self.shared.notifier.post(chat, update).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                debug!(chat_id = %chat, error = %e, "status message not delivered");
                None
            }
        }
    }

    async fn delete_status(&self, chat: ChatId, handle: &MessageHandle) {
        if let Err(e) = self.shared.notifier.delete(chat, handle).await {
            debug!(chat_id = %chat, error = %e, "status message not deleted");
        }
    }

    async fn best_effort(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<(), RelayError>>,
    ) {
        if let Err(e) = fut.await {
            debug!(chat_id = %self.chat, op, error = %e, "settings store update failed");
        }
    }
}

/// Awaits `fut` for at most `timeout`.
async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, RelayError>>,
) -> Result<T, RelayError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| RelayError::Timeout { duration: timeout })?
}

/// Window that resumes an item from its elapsed offset, if any.
fn resume_window(item: &PlaybackItem) -> Option<TimeWindow> {
    (item.played_secs > 0 && item.played_secs < item.duration_secs).then_some(TimeWindow {
        start_secs: item.played_secs,
        end_secs: item.duration_secs,
    })
}

fn window_from(start_secs: u64, end_secs: u64) -> Option<TimeWindow> {
    (end_secs > 0).then_some(TimeWindow {
        start_secs: start_secs.min(end_secs),
        end_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_state_display() {
        assert_eq!(CallState::Idle.to_string(), "idle");
        assert_eq!(CallState::Joining.to_string(), "joining");
        assert_eq!(CallState::Live { paused: false }.to_string(), "live");
        assert_eq!(CallState::Live { paused: true }.to_string(), "paused");
        assert_eq!(CallState::Leaving.to_string(), "leaving");
    }

    #[test]
    fn only_live_states_are_live() {
        assert!(CallState::Live { paused: true }.is_live());
        assert!(!CallState::Joining.is_live());
        assert!(!CallState::Leaving.is_live());
    }

    #[test]
    fn resume_window_only_when_partially_played() {
        let mut item = PlaybackItem::new(
            MediaSource::LocalFile("/a.mp3".into()),
            "a",
            "u",
            ChatId(1),
            StreamKind::Audio,
            100,
        );
        assert_eq!(resume_window(&item), None);
        item.played_secs = 40;
        assert_eq!(
            resume_window(&item),
            Some(TimeWindow {
                start_secs: 40,
                end_secs: 100
            })
        );
        item.played_secs = 100;
        assert_eq!(resume_window(&item), None);
    }

    #[test]
    fn window_from_clamps_start() {
        assert_eq!(window_from(10, 0), None);
        assert_eq!(
            window_from(500, 400),
            Some(TimeWindow {
                start_secs: 400,
                end_secs: 400
            })
        );
    }

    #[tokio::test]
    async fn bounded_maps_elapsed_to_timeout() {
        let result: Result<(), RelayError> = bounded(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RelayError::Timeout { .. })));
    }
}
