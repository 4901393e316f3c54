// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-chat playback queues.
//!
//! The head of a chat's queue is the item currently playing. Every operation
//! here is synchronous; the settings-store side effects of clearing and
//! looping are driven by the call session.

use std::collections::VecDeque;

use dashmap::DashMap;
use tracing::{debug, warn};

use voxrelay_core::error::RelayError;
use voxrelay_core::types::{ChatId, PlaybackItem};

/// One chat's queue.
#[derive(Debug, Default, Clone)]
pub struct ChatQueue {
    items: VecDeque<PlaybackItem>,
    /// Remaining repetitions of the head item.
    loop_count: u32,
    auto_end_eligible: bool,
}

/// What [`PlaybackQueues::advance`] did.
#[derive(Debug, Clone)]
pub enum Advance {
    /// The loop counter was positive: the head stays and plays again.
    Repeat {
        item: PlaybackItem,
        remaining: u32,
    },
    /// The head was popped and a well-formed item is now current.
    Next {
        finished: PlaybackItem,
        next: PlaybackItem,
    },
    /// Nothing left to play. The queue entry is gone.
    Exhausted { finished: Option<PlaybackItem> },
}

/// All chats' queues.
#[derive(Debug, Default)]
pub struct PlaybackQueues {
    queues: DashMap<ChatId, ChatQueue>,
}

impl PlaybackQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item` and returns its position; 0 means it is now current.
    pub fn enqueue(&self, chat: ChatId, item: PlaybackItem) -> usize {
        let mut queue = self.queues.entry(chat).or_default();
        queue.items.push_back(item);
        queue.items.len() - 1
    }

    /// Makes `item` the head, replacing a head with the same id.
    pub fn ensure_current(&self, chat: ChatId, item: PlaybackItem) {
        let mut queue = self.queues.entry(chat).or_default();
        match queue.items.front_mut() {
            Some(head) if head.id == item.id => *head = item,
            _ => queue.items.push_front(item),
        }
    }

    /// Moves the queue forward after the head finished playing.
    ///
    /// A positive loop counter is decremented and the head repeats. Otherwise
    /// the head is popped and malformed entries behind it are discarded; the
    /// scan is bounded by the queue length.
    pub fn advance(&self, chat: ChatId) -> Advance {
        let Some(mut queue) = self.queues.get_mut(&chat) else {
            return Advance::Exhausted { finished: None };
        };

        if queue.loop_count > 0
            && let Some(head) = queue.items.front().cloned()
        {
            queue.loop_count -= 1;
            return Advance::Repeat {
                item: head,
                remaining: queue.loop_count,
            };
        }

        queue.loop_count = 0;
        let Some(finished) = queue.items.pop_front() else {
            drop(queue);
            self.queues.remove(&chat);
            return Advance::Exhausted { finished: None };
        };

        let pending = queue.items.len();
        for _ in 0..pending {
            let Some(head) = queue.items.front() else {
                break;
            };
            if !head.is_malformed() {
                return Advance::Next {
                    finished,
                    next: head.clone(),
                };
            }
            if let Some(dropped) = queue.items.pop_front() {
                warn!(chat_id = %chat, item = %dropped.id, title = %dropped.title, "discarding malformed queue entry");
            }
        }

        drop(queue);
        self.queues.remove(&chat);
        debug!(chat_id = %chat, "queue exhausted");
        Advance::Exhausted {
            finished: Some(finished),
        }
    }

    /// Sets the loop counter for the current item.
    pub fn set_loop(&self, chat: ChatId, count: u32) -> Result<(), RelayError> {
        let mut queue = self
            .queues
            .get_mut(&chat)
            .filter(|q| !q.items.is_empty())
            .ok_or(RelayError::NoActiveItem { chat })?;
        queue.loop_count = count;
        Ok(())
    }

    pub fn loop_count(&self, chat: ChatId) -> u32 {
        self.queues.get(&chat).map(|q| q.loop_count).unwrap_or(0)
    }

    /// Snapshot of the current item.
    pub fn current(&self, chat: ChatId) -> Option<PlaybackItem> {
        self.queues.get(&chat)?.items.front().cloned()
    }

    /// Mutates the current item in place.
    pub fn with_current<R>(
        &self,
        chat: ChatId,
        f: impl FnOnce(&mut PlaybackItem) -> R,
    ) -> Result<R, RelayError> {
        let mut queue = self
            .queues
            .get_mut(&chat)
            .ok_or(RelayError::NoActiveItem { chat })?;
        let head = queue
            .items
            .front_mut()
            .ok_or(RelayError::NoActiveItem { chat })?;
        Ok(f(head))
    }

    /// Adds `secs` to the current item's elapsed offset, capped at its duration.
    ///
    /// Returns the new offset.
    pub fn record_progress(&self, chat: ChatId, secs: u64) -> Result<u64, RelayError> {
        self.with_current(chat, |item| {
            let played = item.played_secs.saturating_add(secs);
            item.played_secs = if item.duration_secs > 0 {
                played.min(item.duration_secs)
            } else {
                played
            };
            item.played_secs
        })
    }

    /// Removes the chat's queue, returning the dropped items.
    pub fn clear(&self, chat: ChatId) -> Vec<PlaybackItem> {
        self.queues
            .remove(&chat)
            .map(|(_, q)| q.items.into_iter().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the whole queue, head first.
    pub fn items(&self, chat: ChatId) -> Vec<PlaybackItem> {
        self.queues
            .get(&chat)
            .map(|q| q.items.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, chat: ChatId) -> usize {
        self.queues.get(&chat).map(|q| q.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, chat: ChatId) -> bool {
        self.len(chat) == 0
    }

    pub fn set_auto_end_eligible(&self, chat: ChatId, eligible: bool) {
        if let Some(mut queue) = self.queues.get_mut(&chat) {
            queue.auto_end_eligible = eligible;
        }
    }

    pub fn is_auto_end_eligible(&self, chat: ChatId) -> bool {
        self.queues
            .get(&chat)
            .map(|q| q.auto_end_eligible)
            .unwrap_or(false)
    }

    /// Chats that currently have a queue.
    pub fn chats(&self) -> Vec<ChatId> {
        self.queues.iter().map(|e| *e.key()).collect()
    }
}
