// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idle auto-leave deadlines.
//!
//! A deadline is armed at most once per session, the first time the relay is
//! left alone in the call. If listeners come back before it passes the
//! deadline is cancelled and is not armed again for that session.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use voxrelay_core::types::ChatId;

use crate::RelayEngine;

pub struct AutoEndMonitor {
    grace: Duration,
    deadlines: DashMap<ChatId, Instant>,
    armed: Mutex<HashSet<ChatId>>,
}

impl AutoEndMonitor {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            deadlines: DashMap::new(),
            armed: Mutex::new(HashSet::new()),
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Records `now + grace` for `chat` unless this session already armed once.
    ///
    /// Returns whether a deadline was set.
    pub async fn arm(&self, chat: ChatId, now: Instant) -> bool {
        if !self.armed.lock().await.insert(chat) {
            return false;
        }
        self.deadlines.insert(chat, now + self.grace);
        debug!(chat_id = %chat, grace = ?self.grace, "auto-end armed");
        true
    }

    /// Drops a pending deadline without resetting the armed-once marker.
    pub fn cancel_pending(&self, chat: ChatId) -> bool {
        let cancelled = self.deadlines.remove(&chat).is_some();
        if cancelled {
            debug!(chat_id = %chat, "auto-end cancelled, listeners returned");
        }
        cancelled
    }

    /// Forgets everything about `chat`. Called on join and teardown.
    pub async fn clear(&self, chat: ChatId) {
        self.deadlines.remove(&chat);
        self.armed.lock().await.remove(&chat);
    }

    pub fn deadline(&self, chat: ChatId) -> Option<Instant> {
        self.deadlines.get(&chat).map(|d| *d)
    }

    /// Chats whose deadline is at or before `now`.
    pub fn expired(&self, now: Instant) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self
            .deadlines
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| *entry.key())
            .collect();
        chats.sort();
        chats
    }

    /// Periodically stops every chat whose deadline has passed.
    ///
    /// Runs until `cancel` fires.
    pub async fn run_sweeper(engine: RelayEngine, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?interval, "auto-end sweeper running");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = engine.autoend().expired(Instant::now());
                    for chat in expired {
                        info!(chat_id = %chat, "auto-end deadline passed, leaving call");
                        engine.session(chat).stop().await;
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("auto-end sweeper stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn arming_is_logged() {
        let monitor = AutoEndMonitor::new(Duration::from_secs(5));
        monitor.arm(ChatId(3), Instant::now()).await;
        assert!(logs_contain("auto-end armed"));
    }

    #[tokio::test]
    async fn arms_only_once_per_session() {
        let monitor = AutoEndMonitor::new(Duration::from_secs(60));
        let now = Instant::now();
        assert!(monitor.arm(ChatId(1), now).await);
        assert_eq!(monitor.deadline(ChatId(1)), Some(now + Duration::from_secs(60)));

        assert!(monitor.cancel_pending(ChatId(1)));
        assert!(!monitor.arm(ChatId(1), now).await);
        assert!(monitor.deadline(ChatId(1)).is_none());
    }

    #[tokio::test]
    async fn clear_allows_rearming() {
        let monitor = AutoEndMonitor::new(Duration::from_secs(60));
        let now = Instant::now();
        monitor.arm(ChatId(2), now).await;
        monitor.clear(ChatId(2)).await;
        assert!(monitor.deadline(ChatId(2)).is_none());
        assert!(monitor.arm(ChatId(2), now).await);
    }

    #[tokio::test]
    async fn expired_lists_only_past_deadlines() {
        let monitor = AutoEndMonitor::new(Duration::from_secs(60));
        let now = Instant::now();
        monitor.arm(ChatId(1), now).await;
        monitor.arm(ChatId(2), now + Duration::from_secs(30)).await;

        assert!(monitor.expired(now).is_empty());
        assert_eq!(monitor.expired(now + Duration::from_secs(60)), vec![ChatId(1)]);
        assert_eq!(
            monitor.expired(now + Duration::from_secs(120)),
            vec![ChatId(1), ChatId(2)]
        );
    }
}
