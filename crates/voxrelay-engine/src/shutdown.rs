// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C), triggering a
//! [`CancellationToken`] that the router and the auto-end sweeper monitor.
//! Live calls are left before the process exits.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::RelayEngine;

/// Spawns a task that cancels the returned token on SIGTERM or Ctrl+C.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!(signal, "shutdown requested");
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl+C"
}

/// Stops every live call, waiting up to `timeout` in total.
///
/// Returns how many sessions were still open when the timeout hit.
pub async fn drain_sessions(engine: &RelayEngine, timeout: Duration) -> usize {
    let chats = engine.live_chats();
    if chats.is_empty() {
        info!("no live calls to drain");
        return 0;
    }

    info!(count = chats.len(), "leaving live calls");
    let stops = chats.iter().map(|chat| {
        let session = engine.session(*chat);
        async move { session.stop().await }
    });

    if tokio::time::timeout(timeout, futures::future::join_all(stops))
        .await
        .is_err()
    {
        let remaining = engine.live_chats().len();
        warn!(remaining, "timeout reached, some calls were not left cleanly");
        return remaining;
    }

    info!("all calls left");
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_signal_handler_returns_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        token.cancel();
    }
}
